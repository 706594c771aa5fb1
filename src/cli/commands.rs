//! CLI commands and argument parsing

use crate::error::{Error, Result};
use crate::types::{AdProduct, ReportType};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Advertising report connector CLI
#[derive(Parser, Debug)]
#[command(name = "ads-report-connector")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (JSON, or YAML by extension)
    #[arg(short = 'C', long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format for status and summary messages
    #[arg(short, long, global = true, default_value = "json")]
    pub format: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Command to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Test the credentials by obtaining an access token
    Check,

    /// Print the report field catalog
    Fields {
        /// Only this ad product (SEARCH or DISPLAY)
        #[arg(long)]
        product: Option<AdProduct>,

        /// Only this report type (AD, AD_CONVERSION or KEYWORDS)
        #[arg(long)]
        report_type: Option<ReportType>,
    },

    /// Extract reports and emit their rows
    Read {
        /// Reports to run, e.g. `SEARCH:AD,DISPLAY:AD` (empty = all configured)
        #[arg(long)]
        reports: Option<String>,

        /// Write records to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Key records by field identifier instead of the CSV header label
        #[arg(long)]
        logical_names: bool,
    },
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output (one message per line)
    Json,
    /// Human-readable output
    Pretty,
}

/// Parse a `PRODUCT:TYPE[,PRODUCT:TYPE...]` selection
pub fn parse_report_selection(value: &str) -> Result<Vec<(AdProduct, ReportType)>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            let (product, report_type) = item.split_once(':').ok_or_else(|| {
                Error::invalid_value("reports", format!("expected PRODUCT:TYPE, got '{item}'"))
            })?;
            Ok((product.parse()?, report_type.parse()?))
        })
        .collect()
}
