//! JSON lines writer
//!
//! Writes one record message per row:
//!
//! ```json
//! {"type":"RECORD","record":{"stream":"search_ad","data":{...},"emitted_at":1704067200000}}
//! ```

use super::sink::RowSink;
use crate::catalog::FieldCatalog;
use crate::decode::DecodedRow;
use crate::error::Result;
use crate::types::ReportSpec;
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::io::Write;
use tracing::debug;

/// A single output line
#[derive(Debug, Clone, Serialize)]
pub struct RecordMessage<'a> {
    /// Always `RECORD`
    #[serde(rename = "type")]
    pub kind: &'static str,
    /// Payload
    pub record: RecordBody<'a>,
}

/// Payload of a record message
#[derive(Debug, Clone, Serialize)]
pub struct RecordBody<'a> {
    /// Stream name, e.g. `search_ad`
    pub stream: &'a str,
    /// Row values keyed by column
    pub data: Value,
    /// Milliseconds since the epoch
    pub emitted_at: i64,
}

impl<'a> RecordMessage<'a> {
    /// Wrap row data for `stream`
    pub fn new(stream: &'a str, data: Value) -> Self {
        Self {
            kind: "RECORD",
            record: RecordBody {
                stream,
                data,
                emitted_at: Utc::now().timestamp_millis(),
            },
        }
    }
}

/// Writes rows as JSON lines
pub struct JsonLinesSink<W> {
    writer: W,
    catalog: Option<FieldCatalog>,
    rows: u64,
}

impl<W: Write + Send> JsonLinesSink<W> {
    /// Create a sink keyed by the CSV header labels
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            catalog: None,
            rows: 0,
        }
    }

    /// Key rows by field identifier instead of header label
    #[must_use]
    pub fn with_logical_names(mut self, catalog: FieldCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Rows written so far
    pub fn rows_written(&self) -> u64 {
        self.rows
    }

    /// Recover the writer
    pub fn into_inner(self) -> W {
        self.writer
    }

    fn row_data(&self, spec: &ReportSpec, row: &DecodedRow) -> Value {
        match &self.catalog {
            Some(catalog) => row.to_json_with(|label| {
                catalog
                    .request_name_for_label(spec.ad_product, spec.report_type, label)
                    .map_or_else(|| label.to_string(), str::to_string)
            }),
            None => row.to_json(),
        }
    }
}

#[async_trait]
impl<W: Write + Send> RowSink for JsonLinesSink<W> {
    async fn write_row(&mut self, spec: &ReportSpec, row: &DecodedRow) -> Result<()> {
        let stream = spec.stream_name();
        let message = RecordMessage::new(&stream, self.row_data(spec, row));
        serde_json::to_writer(&mut self.writer, &message)?;
        self.writer.write_all(b"\n")?;
        self.rows += 1;
        Ok(())
    }

    async fn end_report(&mut self, spec: &ReportSpec, rows: u64) -> Result<()> {
        self.writer.flush()?;
        debug!(stream = %spec.stream_name(), rows, "Report written");
        Ok(())
    }
}

impl<W> std::fmt::Debug for JsonLinesSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonLinesSink")
            .field("logical_names", &self.catalog.is_some())
            .field("rows", &self.rows)
            .finish_non_exhaustive()
    }
}
