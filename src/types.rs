//! Common types used throughout the report connector
//!
//! Report descriptors, ad-product and report-type enums, date ranges and
//! the shared backoff strategy enum.

use crate::error::{Error, Result};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Date format the platform expects in report requests
pub const PLATFORM_DATE_FORMAT: &str = "%Y%m%d";

// ============================================================================
// Ad Product
// ============================================================================

/// Advertising surface a report covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdProduct {
    /// Search ads
    Search,
    /// Display ads
    Display,
}

impl AdProduct {
    /// All ad products, in catalog order
    pub const ALL: [AdProduct; 2] = [AdProduct::Search, AdProduct::Display];

    /// Canonical upper-case name
    pub fn as_str(self) -> &'static str {
        match self {
            AdProduct::Search => "SEARCH",
            AdProduct::Display => "DISPLAY",
        }
    }
}

impl fmt::Display for AdProduct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdProduct {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SEARCH" | "YSS" => Ok(AdProduct::Search),
            "DISPLAY" | "YDN" => Ok(AdProduct::Display),
            other => Err(Error::invalid_value(
                "ad_product",
                format!("expected SEARCH or DISPLAY, got '{other}'"),
            )),
        }
    }
}

// ============================================================================
// Report Type
// ============================================================================

/// Shape of a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportType {
    /// Per-ad performance
    Ad,
    /// Per-ad conversions
    AdConversion,
    /// Per-keyword performance
    Keywords,
}

impl ReportType {
    /// All report types, in catalog order
    pub const ALL: [ReportType; 3] = [
        ReportType::Ad,
        ReportType::AdConversion,
        ReportType::Keywords,
    ];

    /// Canonical upper-case name
    pub fn as_str(self) -> &'static str {
        match self {
            ReportType::Ad => "AD",
            ReportType::AdConversion => "AD_CONVERSION",
            ReportType::Keywords => "KEYWORDS",
        }
    }
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AD" => Ok(ReportType::Ad),
            "AD_CONVERSION" => Ok(ReportType::AdConversion),
            "KEYWORDS" => Ok(ReportType::Keywords),
            other => Err(Error::invalid_value(
                "report_type",
                format!("expected AD, AD_CONVERSION or KEYWORDS, got '{other}'"),
            )),
        }
    }
}

// ============================================================================
// Date Range
// ============================================================================

/// Inclusive report date range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    /// First day included
    pub start: NaiveDate,
    /// Last day included
    pub end: NaiveDate,
}

impl DateRange {
    /// Create a date range, rejecting ranges that end before they start
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if end < start {
            return Err(Error::invalid_value(
                "end_date",
                format!("{end} is before start date {start}"),
            ));
        }
        Ok(Self { start, end })
    }

    /// Start date in platform format (`YYYYMMDD`)
    pub fn platform_start(&self) -> String {
        self.start.format(PLATFORM_DATE_FORMAT).to_string()
    }

    /// End date in platform format (`YYYYMMDD`)
    pub fn platform_end(&self) -> String {
        self.end.format(PLATFORM_DATE_FORMAT).to_string()
    }
}

/// Parse `YYYY-MM-DD` or `YYYYMMDD`
pub fn parse_date(field: &str, value: &str) -> Result<NaiveDate> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(value, PLATFORM_DATE_FORMAT))
        .map_err(|_| Error::invalid_value(field, format!("invalid date '{value}'")))
}

/// Yesterday in Japan Standard Time (UTC+9)
pub fn yesterday_jst() -> NaiveDate {
    let jst_now = Utc::now() + chrono::Duration::hours(9);
    jst_now.date_naive() - chrono::Duration::days(1)
}

// ============================================================================
// Report Spec
// ============================================================================

/// Immutable description of one report to extract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSpec {
    /// Advertising surface
    pub ad_product: AdProduct,
    /// Report shape
    pub report_type: ReportType,
    /// Account the report is run for
    pub account_id: String,
    /// Inclusive date range
    pub date_range: DateRange,
    /// Ordered field identifiers requested from the platform
    pub fields: Vec<String>,
}

impl ReportSpec {
    /// Create a new report spec
    pub fn new(
        ad_product: AdProduct,
        report_type: ReportType,
        account_id: impl Into<String>,
        date_range: DateRange,
        fields: Vec<String>,
    ) -> Self {
        Self {
            ad_product,
            report_type,
            account_id: account_id.into(),
            date_range,
            fields,
        }
    }

    /// Output stream name, e.g. `search_ad_conversion`
    pub fn stream_name(&self) -> String {
        format!(
            "{}_{}",
            self.ad_product.as_str().to_ascii_lowercase(),
            self.report_type.as_str().to_ascii_lowercase()
        )
    }
}

// ============================================================================
// Backoff Type
// ============================================================================

/// Backoff strategy for retries
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum BackoffType {
    /// Constant delay between retries
    Constant,
    /// Linear increase in delay
    Linear,
    /// Exponential increase in delay: `initial * factor^attempt`
    Exponential {
        /// Growth factor per attempt
        factor: u32,
    },
    /// Exponential with the platform's default factor of 5
    #[default]
    Platform,
}

impl BackoffType {
    /// Growth factor of the exponential variants
    pub fn factor(self) -> Option<u32> {
        match self {
            BackoffType::Exponential { factor } => Some(factor),
            BackoffType::Platform => Some(5),
            BackoffType::Constant | BackoffType::Linear => None,
        }
    }
}
