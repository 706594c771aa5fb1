//! Report job lifecycle
//!
//! A report is materialized server-side as an asynchronous job:
//!
//! ```text
//! submit ──► PENDING ──poll──► PENDING / IN_PROGRESS ──poll──► ...
//!                                   │
//!                                   └──► COMPLETED ──► download ──► remove
//!                                   └──► FAILED / UNKNOWN (left to expire)
//! ```
//!
//! `ReportController` drives one job through these states. Polling backs off
//! by doubling the delay after every non-terminal poll, bounded by
//! `PollConfig`.

mod controller;
mod types;

pub use controller::{ReportController, Sleeper, TokioSleeper};
pub use types::{
    platform_id, ApiResponse, Endpoints, JobStatus, OperationValue, PollConfig, ReturnValue,
    ReportDefinitionValue, ReportJob, DEFAULT_DISPLAY_BASE_URL, DEFAULT_SEARCH_BASE_URL,
};
