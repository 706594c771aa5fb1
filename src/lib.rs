//! # Ads Report Connector
//!
//! Extracts advertising-performance reports from an asynchronous report-job
//! API and streams them as rows.
//!
//! ## Features
//!
//! - **Report Jobs**: Submit, poll with bounded doubling backoff, download, remove
//! - **Field Catalog**: Fixed field lists per ad product and report type
//! - **Streaming CSV**: Incremental decoding of the downloaded body, no full buffering
//! - **Guaranteed Cleanup**: Completed jobs are removed on every exit path
//! - **Resilient HTTP**: Retry with exponential backoff, rate limiting, token refresh
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ads_report_connector::{catalog::FieldCatalog, config::ConnectorConfig, output::MemorySink};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> ads_report_connector::Result<()> {
//!     let config = ConnectorConfig::load("config.yaml")?;
//!     let specs = config.report_specs(&FieldCatalog::standard())?;
//!     let engine = config.build_engine()?;
//!
//!     let mut sink = MemorySink::new();
//!     let report = engine.run(&specs, &mut sink, CancellationToken::new()).await?;
//!     println!("{} rows", report.stats.rows);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          SyncEngine                             │
//! │  specs → submit → poll → download → decode → sink → cleanup     │
//! └─────────────────────────────────────────────────────────────────┘
//!                                │
//! ┌──────────┬───────────┬───────┴───────┬───────────┬─────────────┐
//! │   Auth   │   HTTP    │    Report     │  Decode   │   Output    │
//! ├──────────┼───────────┼───────────────┼───────────┼─────────────┤
//! │ Bearer   │ POST JSON │ add / get     │ CSV split │ RowSink     │
//! │ OAuth2   │ Retry     │ download      │ Header    │ JSON lines  │
//! │ Refresh  │ Rate Limit│ remove        │ Rows      │ Memory      │
//! │          │ Backoff   │ Field catalog │           │             │
//! └──────────┴───────────┴───────────────┴───────────┴─────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
// Allow common clippy pedantic lints
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::unused_self)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::unnecessary_wraps)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::unused_async)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

// ============================================================================
// Module declarations
// ============================================================================

/// Error types for the connector
pub mod error;

/// Common types and type aliases
pub mod types;

/// Bearer tokens and OAuth2 refresh
pub mod auth;

/// HTTP client with retry and rate limiting
pub mod http;

/// Report field catalog
pub mod catalog;

/// Report job controller
pub mod report;

/// Incremental CSV decoding
pub mod decode;

/// Row sinks
pub mod output;

/// Main execution engine
pub mod engine;

/// Connector configuration
pub mod config;

/// Command-line interface
pub mod cli;

// ============================================================================
// Re-exports
// ============================================================================

pub use error::{Error, Result};
pub use types::*;

// Re-export commonly used types
pub use config::ConnectorConfig;
pub use engine::{SyncEngine, SyncReport};
pub use report::ReportController;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
