//! Job bookkeeping and cleanup
//!
//! Every job the engine submits is recorded in a `JobLedger`. A
//! `CleanupGuard` removes the completed ones when the run ends, however it
//! ends.

use super::types::CleanupReport;
use crate::error::Error;
use crate::report::{ReportController, ReportJob};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{info, warn};

#[derive(Debug)]
struct LedgerEntry {
    job: ReportJob,
    removal_taken: bool,
}

/// Jobs created during a run
#[derive(Debug, Clone, Default)]
pub struct JobLedger {
    entries: Arc<Mutex<Vec<LedgerEntry>>>,
}

impl JobLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a job, or refresh the recorded copy of a known one
    pub fn record(&self, job: &ReportJob) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        match entries.iter_mut().find(|e| e.job.job_id == job.job_id) {
            Some(entry) => entry.job = job.clone(),
            None => entries.push(LedgerEntry {
                job: job.clone(),
                removal_taken: false,
            }),
        }
    }

    /// Snapshot of every recorded job
    pub fn jobs(&self) -> Vec<ReportJob> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|e| e.job.clone())
            .collect()
    }

    /// Number of recorded jobs
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no job was recorded
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Completed jobs not handed out before. Each job is returned at most once.
    pub fn take_completed(&self) -> Vec<ReportJob> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries
            .iter_mut()
            .filter(|e| !e.removal_taken && e.job.status.is_completed())
            .map(|e| {
                e.removal_taken = true;
                e.job.clone()
            })
            .collect()
    }
}

/// Removes completed jobs when the run ends.
///
/// `finish` performs the cleanup inline. A guard dropped without `finish`
/// (the run future was dropped) spawns the cleanup on the current runtime.
#[derive(Debug)]
pub struct CleanupGuard {
    controller: ReportController,
    ledger: JobLedger,
    armed: bool,
}

impl CleanupGuard {
    /// Guard the jobs in `ledger`
    pub fn new(controller: ReportController, ledger: JobLedger) -> Self {
        Self {
            controller,
            ledger,
            armed: true,
        }
    }

    /// Remove every completed job now
    pub async fn finish(mut self) -> CleanupReport {
        self.armed = false;
        remove_jobs(&self.controller, self.ledger.take_completed()).await
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let jobs = self.ledger.take_completed();
        if jobs.is_empty() {
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!(jobs = jobs.len(), "Sync interrupted, removing completed report jobs in background");
                let controller = self.controller.clone();
                handle.spawn(async move {
                    remove_jobs(&controller, jobs).await;
                });
            }
            Err(_) => {
                let ids: Vec<_> = jobs.iter().map(|j| j.job_id.as_str()).collect();
                warn!(jobs = ?ids, "No runtime available, completed report jobs were not removed");
            }
        }
    }
}

/// Remove jobs one by one. Failures are logged and reported, never raised.
pub async fn remove_jobs(controller: &ReportController, jobs: Vec<ReportJob>) -> CleanupReport {
    let mut report = CleanupReport::default();

    for job in jobs {
        let sent = current_token(controller).await;
        let mut result = controller.remove(&job).await;
        if let Err(e) = &result {
            if reauthorize(controller, e, sent.as_deref()).await {
                result = controller.remove(&job).await;
            }
        }

        match result {
            Ok(true) => report.removed.push(job.job_id),
            Ok(false) => {
                warn!(job_id = %job.job_id, "Report job removal not confirmed");
                report
                    .failed
                    .push((job.job_id, "removal not confirmed".to_string()));
            }
            Err(e) => {
                warn!(job_id = %job.job_id, error = %e, "Failed to remove report job");
                report.failed.push((job.job_id, e.to_string()));
            }
        }
    }

    if !report.removed.is_empty() || !report.failed.is_empty() {
        info!(
            removed = report.removed.len(),
            failed = report.failed.len(),
            "Report job cleanup finished"
        );
    }
    report
}

/// Token the next request will carry
pub async fn current_token(controller: &ReportController) -> Option<String> {
    match controller.client().auth() {
        Some(auth) => auth.bearer().await.ok(),
        None => None,
    }
}

/// Refresh the access token after a 401 on a request sent with `sent`.
/// Returns whether the caller should retry.
///
/// When another task already replaced `sent`, the retry uses that token and
/// no grant is made.
pub async fn reauthorize(controller: &ReportController, err: &Error, sent: Option<&str>) -> bool {
    if !err.is_unauthorized() {
        return false;
    }
    let Some(auth) = controller.client().auth() else {
        return false;
    };
    if !auth.can_refresh() {
        return false;
    }

    match auth.refresh_rejected(sent).await {
        Ok(_) => {
            info!("Access token renewed after 401");
            true
        }
        Err(e) => {
            warn!(error = %e, "Access token refresh failed");
            false
        }
    }
}
