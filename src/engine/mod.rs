//! Execution engine module
//!
//! Drives report specs through the job lifecycle and forwards rows to a sink.
//!
//! # Overview
//!
//! The engine module provides:
//! - `SyncEngine` - Runs specs submit → poll → download → decode → sink
//! - `JobLedger` / `CleanupGuard` - Removal of completed jobs on every exit path
//! - `SyncConfig` - Configuration for sync operations
//! - `SyncReport` - Per-report outcomes, cleanup result and totals

mod ledger;
mod types;

pub use ledger::{current_token, reauthorize, remove_jobs, CleanupGuard, JobLedger};
pub use types::{CleanupReport, OutcomeResult, ReportOutcome, SyncConfig, SyncReport, SyncStats};

use crate::decode::CsvDecoder;
use crate::error::{Error, Result};
use crate::output::RowSink;
use crate::report::ReportController;
use crate::types::ReportSpec;
use futures::{FutureExt, StreamExt};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Instant;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

type SharedSink<'a> = Mutex<&'a mut dyn RowSink>;

/// Sync engine for orchestrating report extraction
#[derive(Debug, Clone)]
pub struct SyncEngine {
    /// Report job controller
    controller: ReportController,
    /// CSV decoder
    decoder: CsvDecoder,
    /// Sync configuration
    config: SyncConfig,
}

impl SyncEngine {
    /// Create a new sync engine
    pub fn new(controller: ReportController) -> Self {
        Self {
            controller,
            decoder: CsvDecoder::new(),
            config: SyncConfig::default(),
        }
    }

    /// Set sync configuration
    #[must_use]
    pub fn with_config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the CSV decoder
    #[must_use]
    pub fn with_decoder(mut self, decoder: CsvDecoder) -> Self {
        self.decoder = decoder;
        self
    }

    /// Get the controller
    pub fn controller(&self) -> &ReportController {
        &self.controller
    }

    /// Get the sync configuration
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Run every spec and clean up completed jobs.
    ///
    /// A failing report is recorded and the run moves on. The run itself
    /// fails only when every report failed (`SyncFailed`) or `cancel` fired
    /// (`Cancelled`). Completed jobs are removed before either is returned,
    /// and also when the sink panics.
    #[instrument(skip_all, fields(reports = specs.len()))]
    pub async fn run(
        &self,
        specs: &[ReportSpec],
        sink: &mut dyn RowSink,
        cancel: CancellationToken,
    ) -> Result<SyncReport> {
        let start = Instant::now();
        let ledger = JobLedger::new();
        let guard = CleanupGuard::new(self.controller.clone(), ledger.clone());
        let sink: SharedSink<'_> = Mutex::new(sink);
        let concurrency = self
            .config
            .effective_concurrency(self.controller.client().config().pool_size);

        info!(concurrency, "Starting sync");

        let processed = AssertUnwindSafe(
            futures::stream::iter(specs)
                .map(|spec| self.process_report(spec, &sink, &ledger, &cancel))
                .buffered(concurrency)
                .collect::<Vec<_>>(),
        )
        .catch_unwind()
        .await;

        let cleanup = guard.finish().await;

        let outcomes = match processed {
            Ok(outcomes) => outcomes,
            Err(panic) => {
                warn!("Sink panicked, completed jobs were cleaned up");
                std::panic::resume_unwind(panic);
            }
        };

        let stats = SyncStats::from_outcomes(&outcomes, start.elapsed().as_millis() as u64);
        let report = SyncReport {
            outcomes,
            cleanup,
            stats,
        };

        info!(
            rows = report.stats.rows,
            succeeded = report.stats.reports_succeeded,
            failed = report.stats.reports_failed,
            removed = report.cleanup.removed.len(),
            duration_ms = report.stats.duration_ms,
            "Sync finished"
        );

        if cancel.is_cancelled() {
            warn!("Sync cancelled");
            return Err(Error::Cancelled);
        }

        if !report.outcomes.is_empty() && report.stats.reports_succeeded == 0 {
            return Err(Error::SyncFailed {
                failed: report.failures(),
            });
        }

        Ok(report)
    }

    /// Run one spec to an outcome
    async fn process_report(
        &self,
        spec: &ReportSpec,
        sink: &SharedSink<'_>,
        ledger: &JobLedger,
        cancel: &CancellationToken,
    ) -> ReportOutcome {
        let stream = spec.stream_name();
        let mut job_id = None;

        let result = if cancel.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            self.extract(spec, sink, ledger, cancel, &mut job_id).await
        };

        let result = match result {
            Ok(rows) => {
                info!(stream = %stream, rows, "Report extracted");
                OutcomeResult::Succeeded { rows }
            }
            Err(e) => {
                warn!(stream = %stream, job_id = ?job_id, error = %e, "Report failed");
                OutcomeResult::Failed {
                    reason: e.to_string(),
                }
            }
        };

        ReportOutcome {
            stream,
            account_id: spec.account_id.clone(),
            job_id,
            result,
        }
    }

    async fn extract(
        &self,
        spec: &ReportSpec,
        sink: &SharedSink<'_>,
        ledger: &JobLedger,
        cancel: &CancellationToken,
        job_id: &mut Option<String>,
    ) -> Result<u64> {
        let mut job = self
            .with_reauth(cancel, || self.controller.submit(spec))
            .await?;
        *job_id = Some(job.job_id.clone());
        ledger.record(&job);

        let sent = current_token(&self.controller).await;
        let mut polled = cancellable(cancel, self.controller.await_completion(&mut job)).await;
        if let Err(e) = &polled {
            if reauthorize(&self.controller, e, sent.as_deref()).await {
                polled = cancellable(cancel, self.controller.await_completion(&mut job)).await;
            }
        }
        ledger.record(&job);
        let status = polled?;

        if !status.is_completed() {
            return Err(Error::Download {
                job_id: job.job_id.clone(),
                status: status.to_string(),
            });
        }

        let body = self
            .with_reauth(cancel, || self.controller.download(&job))
            .await?;
        let mut rows = self.decoder.decode(body);

        sink.lock().await.begin_report(spec).await?;
        let mut count = 0u64;
        while let Some(row) = cancellable(cancel, rows.next_row()).await? {
            sink.lock().await.write_row(spec, &row).await?;
            count += 1;
        }
        sink.lock().await.end_report(spec, count).await?;

        debug!(job_id = %job.job_id, rows = count, "Report body consumed");
        Ok(count)
    }

    /// Run a step, retrying once after a token refresh if it hit a 401
    async fn with_reauth<T, F, Fut>(&self, cancel: &CancellationToken, op: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let sent = current_token(&self.controller).await;
        match cancellable(cancel, op()).await {
            Err(e) if e.is_unauthorized() => {
                if reauthorize(&self.controller, &e, sent.as_deref()).await {
                    cancellable(cancel, op()).await
                } else {
                    Err(e)
                }
            }
            other => other,
        }
    }
}

/// Race a step against cancellation
async fn cancellable<T>(
    cancel: &CancellationToken,
    step: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(Error::Cancelled),
        result = step => result,
    }
}
