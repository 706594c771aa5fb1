//! Report job types and platform wire envelopes

use crate::error::{Error, PlatformError, Result};
use crate::types::{AdProduct, ReportType};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

/// Production endpoint of the search report service
pub const DEFAULT_SEARCH_BASE_URL: &str =
    "https://ads-search.yahooapis.jp/api/v10/ReportDefinitionService/";

/// Production endpoint of the display report service
pub const DEFAULT_DISPLAY_BASE_URL: &str =
    "https://ads-display.yahooapis.jp/api/v10/ReportDefinitionService/";

// ============================================================================
// Job Status
// ============================================================================

/// Status of a server-side report job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Queued (`WAIT` on the wire)
    Pending,
    /// Being generated
    InProgress,
    /// Ready for download
    Completed,
    /// Generation failed
    Failed,
    /// Status the platform could not determine, or one we do not recognise
    Unknown,
}

impl JobStatus {
    /// Map a platform `reportJobStatus` value
    pub fn from_platform(value: &str) -> Self {
        match value {
            "WAIT" | "PENDING" => JobStatus::Pending,
            "IN_PROGRESS" => JobStatus::InProgress,
            "COMPLETED" => JobStatus::Completed,
            "FAILED" => JobStatus::Failed,
            _ => JobStatus::Unknown,
        }
    }

    /// Whether polling should continue
    pub fn is_running(self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::InProgress)
    }

    /// Whether the job reached a final state
    pub fn is_terminal(self) -> bool {
        !self.is_running()
    }

    /// Whether the report can be downloaded
    pub fn is_completed(self) -> bool {
        self == JobStatus::Completed
    }

    /// Canonical upper-case name
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::InProgress => "IN_PROGRESS",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
            JobStatus::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Report Job
// ============================================================================

/// One server-side report job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportJob {
    /// Platform-issued job id
    pub job_id: String,
    /// Owning account
    pub account_id: String,
    /// Advertising surface
    pub ad_product: AdProduct,
    /// Report shape
    pub report_type: ReportType,
    /// Name the report was submitted under
    pub report_name: String,
    /// Last known status
    pub status: JobStatus,
    /// Delay before the next poll
    pub next_poll_delay: Duration,
    /// Status polls issued so far
    pub polls: u32,
}

impl ReportJob {
    /// Stream name of the report this job produces
    pub fn stream_name(&self) -> String {
        format!(
            "{}_{}",
            self.ad_product.as_str().to_ascii_lowercase(),
            self.report_type.as_str().to_ascii_lowercase()
        )
    }
}

// ============================================================================
// Poll Config
// ============================================================================

/// Bounds for the status polling loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollConfig {
    /// Delay after the first non-terminal poll
    pub initial_delay: Duration,
    /// Growth factor applied after every non-terminal poll
    pub multiplier: u32,
    /// Cap for a single delay
    pub max_delay: Option<Duration>,
    /// Total time allowed for sleeping between polls
    pub max_wait: Option<Duration>,
    /// Maximum number of status polls
    pub max_polls: Option<u32>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            multiplier: 2,
            max_delay: Some(Duration::from_secs(15 * 60)),
            max_wait: Some(Duration::from_secs(3 * 60 * 60)),
            max_polls: None,
        }
    }
}

impl PollConfig {
    /// Unbounded doubling backoff
    pub fn unbounded() -> Self {
        Self {
            max_delay: None,
            max_wait: None,
            max_polls: None,
            ..Self::default()
        }
    }

    /// Set the initial delay
    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the delay cap
    #[must_use]
    pub fn with_max_delay(mut self, delay: Option<Duration>) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the total wait budget
    #[must_use]
    pub fn with_max_wait(mut self, wait: Option<Duration>) -> Self {
        self.max_wait = wait;
        self
    }

    /// Set the poll limit
    #[must_use]
    pub fn with_max_polls(mut self, polls: Option<u32>) -> Self {
        self.max_polls = polls;
        self
    }

    /// Delay to use after `delay`, capped by `max_delay`
    pub fn next_delay(&self, delay: Duration) -> Duration {
        let grown = delay
            .checked_mul(self.multiplier.max(1))
            .unwrap_or(Duration::MAX);
        self.cap(grown)
    }

    /// Apply `max_delay`
    pub fn cap(&self, delay: Duration) -> Duration {
        match self.max_delay {
            Some(max) => delay.min(max),
            None => delay,
        }
    }
}

// ============================================================================
// Endpoints
// ============================================================================

/// Report service base URLs per ad product
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// Search report service
    pub search_base_url: String,
    /// Display report service
    pub display_base_url: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            search_base_url: DEFAULT_SEARCH_BASE_URL.to_string(),
            display_base_url: DEFAULT_DISPLAY_BASE_URL.to_string(),
        }
    }
}

impl Endpoints {
    /// Both products served from the same base URL (tests, proxies)
    pub fn single(base_url: impl Into<String>) -> Self {
        let base = base_url.into();
        Self {
            search_base_url: base.clone(),
            display_base_url: base,
        }
    }

    /// Base URL for an ad product
    pub fn base_url(&self, ad_product: AdProduct) -> &str {
        match ad_product {
            AdProduct::Search => &self.search_base_url,
            AdProduct::Display => &self.display_base_url,
        }
    }

    /// Full URL of an operation (`add`, `get`, `download`, `remove`)
    pub fn url(&self, ad_product: AdProduct, operation: &str) -> String {
        format!(
            "{}/{}",
            self.base_url(ad_product).trim_end_matches('/'),
            operation
        )
    }
}

// ============================================================================
// Wire Envelopes
// ============================================================================

/// `{ "rval": { "values": [...] } }`
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse {
    /// Return value
    pub rval: ReturnValue,
}

/// Operation results
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReturnValue {
    /// One entry per operand
    #[serde(default)]
    pub values: Vec<OperationValue>,
}

/// Result of a single operand
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationValue {
    /// Whether the platform accepted the operand
    pub operation_succeeded: bool,
    /// Report definition, present on success
    #[serde(default)]
    pub report_definition: Option<ReportDefinitionValue>,
    /// Errors, present on failure
    #[serde(default)]
    pub errors: Option<Vec<PlatformError>>,
}

/// Report definition fields we rely on
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportDefinitionValue {
    /// Job id; numeric or string depending on the service
    #[serde(default)]
    pub report_job_id: Option<Value>,
    /// Job status
    #[serde(default)]
    pub report_job_status: Option<String>,
}

impl ApiResponse {
    /// First operation result, as every request carries a single operand
    pub fn into_first(self) -> Result<OperationValue> {
        self.rval
            .values
            .into_iter()
            .next()
            .ok_or_else(|| Error::unexpected("response contains no values"))
    }
}

impl OperationValue {
    /// Errors reported for this operand
    pub fn take_errors(&mut self) -> Vec<PlatformError> {
        self.errors.take().unwrap_or_default()
    }

    /// Job id as a string
    pub fn job_id(&self) -> Option<String> {
        match self.report_definition.as_ref()?.report_job_id.as_ref()? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Job status, if reported
    pub fn job_status(&self) -> Option<JobStatus> {
        self.report_definition
            .as_ref()?
            .report_job_status
            .as_deref()
            .map(JobStatus::from_platform)
    }
}

/// Platform ids are 64-bit integers; send numeric ids as JSON numbers and
/// anything else verbatim.
pub fn platform_id(id: &str) -> Value {
    id.parse::<i64>()
        .map_or_else(|_| Value::String(id.to_string()), Value::from)
}
