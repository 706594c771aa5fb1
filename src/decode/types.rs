//! Decoder types

use crate::error::Result;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Body of a download, chunk by chunk
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// CSV dialect of report downloads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsvDialect {
    /// Field delimiter
    pub delimiter: u8,
    /// Quote character
    pub quote: u8,
    /// Escape character inside quoted fields
    pub escape: Option<u8>,
    /// Whether `""` inside a quoted field is a literal quote
    pub double_quote: bool,
    /// Skip spaces directly after a delimiter
    pub skip_initial_space: bool,
}

impl Default for CsvDialect {
    fn default() -> Self {
        Self {
            delimiter: b',',
            quote: b'"',
            escape: Some(b'\\'),
            double_quote: true,
            skip_initial_space: true,
        }
    }
}

/// One data row of a report, keyed by the header row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedRow {
    columns: Arc<[String]>,
    values: Vec<String>,
    line_number: u64,
}

impl DecodedRow {
    pub(crate) fn new(columns: Arc<[String]>, values: Vec<String>, line_number: u64) -> Self {
        Self {
            columns,
            values,
            line_number,
        }
    }

    /// Header labels, in file order
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Values, in file order
    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// Physical line the row starts on (1-based, header is line 1)
    pub fn line_number(&self) -> u64 {
        self.line_number
    }

    /// Value of a column by header label
    pub fn get(&self, column: &str) -> Option<&str> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|i| self.values[i].as_str())
    }

    /// `(label, value)` pairs in file order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().map(String::as_str))
    }

    /// JSON object of string values, optionally renaming columns
    pub fn to_json_with<F>(&self, mut rename: F) -> Value
    where
        F: FnMut(&str) -> String,
    {
        let map: Map<String, Value> = self
            .iter()
            .map(|(k, v)| (rename(k), Value::String(v.to_string())))
            .collect();
        Value::Object(map)
    }

    /// JSON object of string values keyed by header label
    pub fn to_json(&self) -> Value {
        self.to_json_with(str::to_string)
    }
}
