//! Row sink trait and in-memory sink

use crate::decode::DecodedRow;
use crate::error::Result;
use crate::types::ReportSpec;
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Receives the rows of each report.
///
/// For one report the engine calls `begin_report`, then `write_row` for every
/// row in source order, then `end_report`. A report that fails midway gets no
/// `end_report` call.
#[async_trait]
pub trait RowSink: Send {
    /// A report is about to stream rows
    async fn begin_report(&mut self, _spec: &ReportSpec) -> Result<()> {
        Ok(())
    }

    /// One decoded row
    async fn write_row(&mut self, spec: &ReportSpec, row: &DecodedRow) -> Result<()>;

    /// All rows of a report were written
    async fn end_report(&mut self, _spec: &ReportSpec, _rows: u64) -> Result<()> {
        Ok(())
    }
}

/// Collects rows in memory, keyed by stream name
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    rows: BTreeMap<String, Vec<DecodedRow>>,
    completed: Vec<(String, u64)>,
}

impl MemorySink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows received for a stream
    pub fn rows(&self, stream: &str) -> &[DecodedRow] {
        self.rows.get(stream).map_or(&[], Vec::as_slice)
    }

    /// Streams that received at least a `begin_report`
    pub fn streams(&self) -> impl Iterator<Item = &str> {
        self.rows.keys().map(String::as_str)
    }

    /// Total rows across all streams
    pub fn total_rows(&self) -> usize {
        self.rows.values().map(Vec::len).sum()
    }

    /// `(stream, rows)` for every report that reached `end_report`
    pub fn completed(&self) -> &[(String, u64)] {
        &self.completed
    }
}

#[async_trait]
impl RowSink for MemorySink {
    async fn begin_report(&mut self, spec: &ReportSpec) -> Result<()> {
        self.rows.entry(spec.stream_name()).or_default();
        Ok(())
    }

    async fn write_row(&mut self, spec: &ReportSpec, row: &DecodedRow) -> Result<()> {
        self.rows
            .entry(spec.stream_name())
            .or_default()
            .push(row.clone());
        Ok(())
    }

    async fn end_report(&mut self, spec: &ReportSpec, rows: u64) -> Result<()> {
        self.completed.push((spec.stream_name(), rows));
        Ok(())
    }
}
