//! CLI module
//!
//! Command-line interface for the report connector.
//!
//! # Commands
//!
//! - `check` - Obtain an access token with the configured credentials
//! - `fields` - Print the report field catalog
//! - `read` - Extract reports and emit their rows as JSON lines

mod commands;
mod runner;

pub use commands::{parse_report_selection, Cli, Commands, OutputFormat};
pub use runner::Runner;
