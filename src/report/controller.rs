//! Report job controller
//!
//! Drives a single report job through submit, poll, download and remove
//! against the platform's report definition service.

use super::types::{platform_id, ApiResponse, Endpoints, JobStatus, OperationValue, PollConfig, ReportJob};
use crate::catalog::FieldCatalog;
use crate::decode::ByteStream;
use crate::error::{parse_platform_errors, Error, Result};
use crate::http::HttpClient;
use crate::types::ReportSpec;
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Sleeps between status polls
#[async_trait]
pub trait Sleeper: Send + Sync {
    /// Suspend for `duration`
    async fn sleep(&self, duration: Duration);
}

/// Sleeper backed by the tokio timer
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Report job controller
#[derive(Clone)]
pub struct ReportController {
    client: HttpClient,
    endpoints: Endpoints,
    catalog: FieldCatalog,
    poll: PollConfig,
    sleeper: Arc<dyn Sleeper>,
}

impl ReportController {
    /// Create a controller with the standard catalog and default polling
    pub fn new(client: HttpClient, endpoints: Endpoints) -> Self {
        Self {
            client,
            endpoints,
            catalog: FieldCatalog::standard(),
            poll: PollConfig::default(),
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Use a different field catalog
    #[must_use]
    pub fn with_catalog(mut self, catalog: FieldCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Use different polling bounds
    #[must_use]
    pub fn with_poll_config(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    /// Use a different sleeper between polls
    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// The HTTP client
    pub fn client(&self) -> &HttpClient {
        &self.client
    }

    /// The field catalog
    pub fn catalog(&self) -> &FieldCatalog {
        &self.catalog
    }

    /// The polling bounds
    pub fn poll_config(&self) -> &PollConfig {
        &self.poll
    }

    /// Build the `add` request body for a report.
    ///
    /// Fails without touching the network when the pair is unregistered or
    /// the field list is empty or contains unknown fields.
    pub fn build_add_request(&self, spec: &ReportSpec, suffix: &str) -> Result<Value> {
        self.catalog
            .validate_fields(spec.ad_product, spec.report_type, &spec.fields)?;

        let end = spec.date_range.platform_end();
        let mut operand = json!({
            "dateRange": {
                "startDate": spec.date_range.platform_start(),
                "endDate": end,
            },
            "fields": spec.fields,
            "reportDateRangeType": "CUSTOM_DATE",
            "reportDownloadEncode": "UTF8",
            "reportDownloadFormat": "CSV",
            "reportLanguage": "JA",
            "reportName": format!(
                "Report_{}_{}_{}_{}",
                spec.ad_product, spec.report_type, end, suffix
            ),
            "reportSkipReportSummary": "TRUE",
        });

        if let Some(report_type) = self
            .catalog
            .platform_report_type(spec.ad_product, spec.report_type)
        {
            operand["reportType"] = Value::from(report_type);
        }

        Ok(json!({
            "accountId": platform_id(&spec.account_id),
            "operand": [operand],
        }))
    }

    /// Submit a report job under a unique report name
    pub async fn submit(&self, spec: &ReportSpec) -> Result<ReportJob> {
        self.submit_with_suffix(spec, &Uuid::new_v4().to_string())
            .await
    }

    /// Submit a report job, using `suffix` to make the report name unique
    #[instrument(skip(self, spec), fields(stream = %spec.stream_name(), account_id = %spec.account_id))]
    pub async fn submit_with_suffix(&self, spec: &ReportSpec, suffix: &str) -> Result<ReportJob> {
        let body = self.build_add_request(spec, suffix)?;
        let report_name = body["operand"][0]["reportName"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        let url = self.endpoints.url(spec.ad_product, "add");

        let response: ApiResponse = self
            .client
            .post_json_for(&url, body)
            .await
            .map_err(into_submission_error)?;
        let mut value = response.into_first()?;

        if !value.operation_succeeded {
            let platform_errors = value.take_errors();
            warn!(errors = ?platform_errors, "Report submission rejected");
            return Err(Error::ReportSubmission { platform_errors });
        }

        let job_id = value
            .job_id()
            .ok_or_else(|| Error::unexpected("add response carries no reportJobId"))?;
        let status = value.job_status().unwrap_or(JobStatus::Pending);

        info!(job_id = %job_id, status = %status, "Report job submitted");

        Ok(ReportJob {
            job_id,
            account_id: spec.account_id.clone(),
            ad_product: spec.ad_product,
            report_type: spec.report_type,
            report_name,
            status,
            next_poll_delay: self.poll.cap(self.poll.initial_delay),
            polls: 0,
        })
    }

    /// Query the job status once and record it on the job
    pub async fn poll_once(&self, job: &mut ReportJob) -> Result<JobStatus> {
        let url = self.endpoints.url(job.ad_product, "get");
        let body = json!({
            "accountId": platform_id(&job.account_id),
            "reportJobIds": [job.job_id],
        });

        let response: ApiResponse = self.client.post_json_for(&url, body).await?;
        job.polls += 1;
        let mut value = response.into_first()?;

        if !value.operation_succeeded {
            return Err(Error::unexpected(format!(
                "status query for job {} failed: {:?}",
                job.job_id,
                value.take_errors()
            )));
        }

        let status = status_of(&value);
        debug!(job_id = %job.job_id, status = %status, polls = job.polls, "Polled report job");
        job.status = status;
        Ok(status)
    }

    /// Poll until the job leaves PENDING/IN_PROGRESS.
    ///
    /// The first poll is immediate; each further poll waits `next_poll_delay`
    /// and then multiplies it. FAILED and UNKNOWN end the loop like
    /// COMPLETED does; callers decide what to do with them.
    #[instrument(skip(self, job), fields(job_id = %job.job_id))]
    pub async fn await_completion(&self, job: &mut ReportJob) -> Result<JobStatus> {
        let mut waited = Duration::ZERO;

        loop {
            let status = self.poll_once(job).await?;
            if status.is_terminal() {
                info!(status = %status, polls = job.polls, "Report job finished");
                return Ok(status);
            }

            let delay = self.poll.cap(job.next_poll_delay);
            let over_polls = self.poll.max_polls.is_some_and(|max| job.polls >= max);
            let over_wait = self
                .poll
                .max_wait
                .is_some_and(|max| waited.saturating_add(delay) > max);

            if over_polls || over_wait {
                warn!(waited = ?waited, polls = job.polls, "Report job polling limit reached");
                return Err(Error::PollTimeout {
                    job_id: job.job_id.clone(),
                    waited_secs: waited.as_secs(),
                    polls: job.polls,
                });
            }

            debug!(delay = ?delay, "Report job still running");
            self.sleeper.sleep(delay).await;
            waited = waited.saturating_add(delay);
            job.next_poll_delay = self.poll.next_delay(delay);
        }
    }

    /// Stream the body of a completed report
    #[instrument(skip(self, job), fields(job_id = %job.job_id))]
    pub async fn download(&self, job: &ReportJob) -> Result<ByteStream> {
        if !job.status.is_completed() {
            return Err(Error::Download {
                job_id: job.job_id.clone(),
                status: job.status.to_string(),
            });
        }

        let url = self.endpoints.url(job.ad_product, "download");
        let body = json!({
            "accountId": platform_id(&job.account_id),
            "reportJobId": job.job_id,
        });

        let response = self.client.post_json(&url, body).await?;
        debug!(status = response.status().as_u16(), "Report download started");

        Ok(response.bytes_stream().map_err(Error::from).boxed())
    }

    /// Delete the job on the platform. `Ok(true)` means the platform
    /// confirmed the removal; a refusal is `ReportRemoval`.
    #[instrument(skip(self, job), fields(job_id = %job.job_id))]
    pub async fn remove(&self, job: &ReportJob) -> Result<bool> {
        let url = self.endpoints.url(job.ad_product, "remove");
        let body = json!({
            "accountId": platform_id(&job.account_id),
            "operand": [{ "reportJobId": job.job_id }],
        });

        let response: ApiResponse = self.client.post_json_for(&url, body).await?;
        let mut value = response.into_first()?;

        if !value.operation_succeeded {
            return Err(Error::ReportRemoval {
                job_id: job.job_id.clone(),
                platform_errors: value.take_errors(),
            });
        }

        info!("Report job removed");
        Ok(true)
    }
}

impl std::fmt::Debug for ReportController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportController")
            .field("endpoints", &self.endpoints)
            .field("catalog", &self.catalog.version())
            .field("poll", &self.poll)
            .finish_non_exhaustive()
    }
}

fn status_of(value: &OperationValue) -> JobStatus {
    value.job_status().unwrap_or(JobStatus::Unknown)
}

/// Client errors on `add` carry the platform's error list in the body
fn into_submission_error(err: Error) -> Error {
    match &err {
        Error::HttpStatus { status, body } if (400..500).contains(status) && *status != 401 => {
            let platform_errors = parse_platform_errors(body);
            if platform_errors.is_empty() {
                err
            } else {
                Error::ReportSubmission { platform_errors }
            }
        }
        _ => err,
    }
}
