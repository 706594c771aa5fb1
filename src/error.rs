//! Error types for the report connector
//!
//! This module defines the error hierarchy for the entire crate.
//! All public APIs return `Result<T, Error>` where Error is defined here.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single error entry as reported by the platform.
///
/// The platform returns these either as a bare JSON array in non-2xx bodies
/// or inside the `errors` field of an operation result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformError {
    /// Machine readable code, e.g. `REQUEST_LIMIT_EXCEEDED`
    #[serde(default)]
    pub error_code: String,
    /// Human readable message
    #[serde(default)]
    pub message: String,
    /// Optional structured details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl std::fmt::Display for PlatformError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error_code, self.message)
    }
}

/// Join platform errors for display
fn join_errors(errors: &[PlatformError]) -> String {
    if errors.is_empty() {
        return "no error details".to_string();
    }
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// The main error type for the report connector
#[derive(Error, Debug)]
pub enum Error {
    // ============================================================================
    // Configuration Errors
    // ============================================================================
    /// Configuration is unusable as a whole
    #[error("Configuration error: {message}")]
    Config {
        /// What is wrong
        message: String,
    },

    /// A required setting is absent
    #[error("Missing required config field: {field}")]
    MissingConfigField {
        /// Setting name
        field: String,
    },

    /// A setting holds a value that cannot be used
    #[error("Invalid config value for '{field}': {message}")]
    InvalidConfigValue {
        /// Setting name
        field: String,
        /// Why the value was refused
        message: String,
    },

    /// Config file is not valid YAML
    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    /// Config file or response body is not valid JSON
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    // ============================================================================
    // Authentication Errors
    // ============================================================================
    /// No usable bearer token
    #[error("Authentication failed: {message}")]
    Auth {
        /// What is wrong
        message: String,
    },

    /// The token endpoint refused the refresh grant
    #[error("Token refresh failed: {message}")]
    TokenRefresh {
        /// Endpoint answer or transport failure
        message: String,
    },

    // ============================================================================
    // HTTP Errors
    // ============================================================================
    /// Transport failure from reqwest
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status that is not retried
    #[error("HTTP {status}: {body}")]
    HttpStatus {
        /// Status code
        status: u16,
        /// Response body as text
        body: String,
    },

    /// The platform throttled the request
    #[error("Rate limited, retry after {retry_after_seconds}s")]
    RateLimited {
        /// Wait the platform asked for
        retry_after_seconds: u64,
    },

    /// The request did not finish in time
    #[error("Request timeout after {timeout_ms}ms")]
    Timeout {
        /// Configured request timeout
        timeout_ms: u64,
    },

    /// Every retry attempt failed
    #[error("Max attempts ({max_attempts}) exceeded")]
    MaxRetriesExceeded {
        /// Attempts made
        max_attempts: u32,
    },

    /// An endpoint URL does not parse
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // ============================================================================
    // Catalog Errors
    // ============================================================================
    /// The catalog has no table for this product and report type
    #[error("Report type {report_type} is not registered for {ad_product}")]
    UnknownReportType {
        /// Ad product name
        ad_product: String,
        /// Report type name
        report_type: String,
    },

    /// A requested field is not in the catalog table
    #[error("Field '{field}' is not available for {ad_product}/{report_type}")]
    UnknownField {
        /// Ad product name
        ad_product: String,
        /// Report type name
        report_type: String,
        /// Offending field
        field: String,
    },

    /// A report asks for no fields at all
    #[error("Report {ad_product}/{report_type} requests no fields")]
    EmptyFieldList {
        /// Ad product name
        ad_product: String,
        /// Report type name
        report_type: String,
    },

    // ============================================================================
    // Report Job Errors
    // ============================================================================
    /// The platform refused to create the report job
    #[error("Report submission rejected: {}", join_errors(.platform_errors))]
    ReportSubmission {
        /// Errors the platform returned
        platform_errors: Vec<PlatformError>,
    },

    /// The job did not finish within the poll budget
    #[error("Report job {job_id} still running after {waited_secs}s ({polls} polls)")]
    PollTimeout {
        /// Platform job id
        job_id: String,
        /// Total time slept between polls
        waited_secs: u64,
        /// Status requests made
        polls: u32,
    },

    /// Download asked for a job that is not completed
    #[error("Cannot download report job {job_id} with status {status}")]
    Download {
        /// Platform job id
        job_id: String,
        /// Last known job status
        status: String,
    },

    /// The platform refused to remove the job
    #[error("Removing report job {job_id} failed: {}", join_errors(.platform_errors))]
    ReportRemoval {
        /// Platform job id
        job_id: String,
        /// Errors the platform returned
        platform_errors: Vec<PlatformError>,
    },

    /// A response envelope is missing what every answer carries
    #[error("Unexpected response from platform: {message}")]
    UnexpectedResponse {
        /// What was missing or malformed
        message: String,
    },

    // ============================================================================
    // Data Processing Errors
    // ============================================================================
    /// A report row could not be decoded
    #[error("CSV decode error at line {line_number}: {message} (raw: {raw_line:?})")]
    CsvDecode {
        /// Physical line the record starts on (1-based)
        line_number: u64,
        /// Record text as received
        raw_line: String,
        /// What is wrong with the record
        message: String,
    },

    /// The row sink failed
    #[error("Sink error: {message}")]
    Sink {
        /// Sink failure
        message: String,
    },

    // ============================================================================
    // Orchestration Errors
    // ============================================================================
    /// The run was cancelled
    #[error("Sync cancelled")]
    Cancelled,

    /// Every report in the run failed
    #[error("Sync failed: all {} report(s) failed", .failed.len())]
    SyncFailed {
        /// Stream name and failure reason per report
        failed: Vec<(String, String)>,
    },

    // ============================================================================
    // I/O Errors
    // ============================================================================
    /// File or stream I/O failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A named file does not exist
    #[error("File not found: {path}")]
    FileNotFound {
        /// Path as given
        path: String,
    },

    // ============================================================================
    // Generic Errors
    // ============================================================================
    /// Anything else, as text
    #[error("{0}")]
    Other(String),

    /// Error raised by user code such as a custom sink
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a missing field error
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingConfigField {
            field: field.into(),
        }
    }

    /// Create an invalid value error
    pub fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfigValue {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create an auth error
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    /// Create an HTTP status error
    pub fn http_status(status: u16, body: impl Into<String>) -> Self {
        Self::HttpStatus {
            status,
            body: body.into(),
        }
    }

    /// Create an unexpected response error
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::UnexpectedResponse {
            message: message.into(),
        }
    }

    /// Create a CSV decode error
    pub fn csv(line_number: u64, raw_line: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CsvDecode {
            line_number,
            raw_line: raw_line.into(),
            message: message.into(),
        }
    }

    /// Create a sink error
    pub fn sink(message: impl Into<String>) -> Self {
        Self::Sink {
            message: message.into(),
        }
    }

    /// Check if this error is retryable at the transport level
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Http(e) => e.is_connect() || e.is_timeout(),
            Error::RateLimited { .. } | Error::Timeout { .. } => true,
            Error::HttpStatus { status, .. } => is_retryable_status(*status),
            _ => false,
        }
    }

    /// Check if the platform rejected the bearer token
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Error::HttpStatus { status: 401, .. })
    }

    /// Parse the platform error array carried in an HTTP status body
    pub fn platform_errors(&self) -> Vec<PlatformError> {
        match self {
            Error::HttpStatus { body, .. } => parse_platform_errors(body),
            Error::ReportSubmission { platform_errors }
            | Error::ReportRemoval {
                platform_errors, ..
            } => platform_errors.clone(),
            _ => Vec::new(),
        }
    }
}

/// Parse a platform error body.
///
/// Accepts a bare array or an object with an `errors` array; anything else
/// yields no entries.
pub fn parse_platform_errors(body: &str) -> Vec<PlatformError> {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return Vec::new();
    };
    let list = match &value {
        serde_json::Value::Array(_) => value,
        serde_json::Value::Object(map) => match map.get("errors") {
            Some(errors) => errors.clone(),
            None => return Vec::new(),
        },
        _ => return Vec::new(),
    };
    serde_json::from_value(list).unwrap_or_default()
}

/// Check if an HTTP status code is retryable
fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

/// Result type alias for the report connector
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            Error::Other(format!("{}: {}", message.into(), inner))
        })
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            Error::Other(format!("{}: {}", f(), inner))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::config("test message");
        assert_eq!(err.to_string(), "Configuration error: test message");

        let err = Error::missing_field("start_date");
        assert_eq!(err.to_string(), "Missing required config field: start_date");

        let err = Error::http_status(404, "Not found");
        assert_eq!(err.to_string(), "HTTP 404: Not found");

        let err = Error::csv(3, "1,\"2", "unterminated quoted field");
        assert!(err.to_string().contains("line 3"));
    }

    #[test]
    fn test_submission_error_lists_platform_errors() {
        let err = Error::ReportSubmission {
            platform_errors: vec![PlatformError {
                error_code: "L0001".to_string(),
                message: "Invalid field".to_string(),
                details: None,
            }],
        };
        assert_eq!(
            err.to_string(),
            "Report submission rejected: L0001: Invalid field"
        );

        let err = Error::ReportSubmission {
            platform_errors: vec![],
        };
        assert!(err.to_string().contains("no error details"));
    }

    #[test]
    fn test_is_retryable() {
        assert!(Error::RateLimited {
            retry_after_seconds: 60
        }
        .is_retryable());
        assert!(Error::Timeout { timeout_ms: 1000 }.is_retryable());
        assert!(Error::http_status(429, "").is_retryable());
        assert!(Error::http_status(500, "").is_retryable());
        assert!(Error::http_status(503, "").is_retryable());

        assert!(!Error::http_status(400, "").is_retryable());
        assert!(!Error::http_status(401, "").is_retryable());
        assert!(!Error::http_status(404, "").is_retryable());
        assert!(!Error::config("test").is_retryable());
        assert!(!Error::Cancelled.is_retryable());
    }

    #[test]
    fn test_is_unauthorized() {
        assert!(Error::http_status(401, "").is_unauthorized());
        assert!(!Error::http_status(403, "").is_unauthorized());
        assert!(!Error::Cancelled.is_unauthorized());
    }

    #[test]
    fn test_parse_platform_errors_array() {
        let body = r#"[{"errorCode":"REQUEST_LIMIT_EXCEEDED","message":"too many"}]"#;
        let errors = parse_platform_errors(body);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].error_code, "REQUEST_LIMIT_EXCEEDED");

        let err = Error::http_status(403, body);
        assert_eq!(err.platform_errors(), errors);
    }

    #[test]
    fn test_parse_platform_errors_object_and_garbage() {
        let body = r#"{"errors":[{"errorCode":"E1","message":"m","details":[{"k":"v"}]}]}"#;
        let errors = parse_platform_errors(body);
        assert_eq!(errors[0].error_code, "E1");
        assert!(errors[0].details.is_some());

        assert!(parse_platform_errors("<html>oops</html>").is_empty());
        assert!(parse_platform_errors(r#"{"rval":{}}"#).is_empty());
    }

    #[test]
    fn test_result_context() {
        let result: Result<()> = Err(Error::config("inner"));
        let with_context = result.context("outer");
        assert!(with_context
            .unwrap_err()
            .to_string()
            .contains("outer: Configuration error: inner"));
    }
}
