//! CSV decoder implementation

use super::splitter::{RawRecord, RecordSplitter};
use super::types::{ByteStream, CsvDialect, DecodedRow};
use crate::error::{Error, Result};
use futures::{Stream, StreamExt};
use std::sync::Arc;
use tracing::{debug, trace};

// ============================================================================
// CSV Decoder
// ============================================================================

/// Decodes report bodies into rows keyed by the header
#[derive(Debug, Clone, Default)]
pub struct CsvDecoder {
    dialect: CsvDialect,
}

impl CsvDecoder {
    /// Create a decoder for the platform's CSV dialect
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a decoder with a custom dialect
    pub fn with_dialect(dialect: CsvDialect) -> Self {
        Self { dialect }
    }

    /// The dialect in use
    pub fn dialect(&self) -> &CsvDialect {
        &self.dialect
    }

    /// Decode a byte stream lazily
    pub fn decode(&self, source: ByteStream) -> RowStream {
        RowStream {
            source,
            splitter: RecordSplitter::new(self.dialect),
            assembler: RowAssembler::new(self.dialect),
            exhausted: false,
        }
    }

    /// Decode a complete body eagerly
    pub fn decode_bytes(&self, body: &[u8]) -> Result<Vec<DecodedRow>> {
        let mut splitter = RecordSplitter::new(self.dialect);
        let mut assembler = RowAssembler::new(self.dialect);

        splitter.feed(body)?;
        splitter.finish()?;

        let mut rows = Vec::with_capacity(splitter.pending());
        while let Some(record) = splitter.pop() {
            if let Some(row) = assembler.push(&record)? {
                rows.push(row);
            }
        }
        Ok(rows)
    }
}

// ============================================================================
// Row Stream
// ============================================================================

/// Rows decoded from a byte stream, pulled one at a time
pub struct RowStream {
    source: ByteStream,
    splitter: RecordSplitter,
    assembler: RowAssembler,
    exhausted: bool,
}

impl RowStream {
    /// Header labels, once the header has been read
    pub fn columns(&self) -> Option<&[String]> {
        self.assembler.columns.as_deref()
    }

    /// Data rows produced so far
    pub fn rows_decoded(&self) -> u64 {
        self.assembler.rows
    }

    /// Next data row, or `None` at end of input
    pub async fn next_row(&mut self) -> Result<Option<DecodedRow>> {
        loop {
            while let Some(record) = self.splitter.pop() {
                if let Some(row) = self.assembler.push(&record)? {
                    return Ok(Some(row));
                }
            }

            if self.exhausted {
                return Ok(None);
            }

            match self.source.next().await {
                Some(chunk) => {
                    let chunk = chunk?;
                    trace!(bytes = chunk.len(), "Decoding chunk");
                    self.splitter.feed(&chunk)?;
                }
                None => {
                    self.exhausted = true;
                    self.splitter.finish()?;
                    debug!(rows = self.assembler.rows, "Report body fully decoded");
                }
            }
        }
    }

    /// Adapt into a `Stream`; the stream ends after the first error
    pub fn into_stream(self) -> impl Stream<Item = Result<DecodedRow>> + Send {
        futures::stream::try_unfold(self, |mut rows| async move {
            Ok(rows.next_row().await?.map(|row| (row, rows)))
        })
    }
}

impl std::fmt::Debug for RowStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowStream")
            .field("columns", &self.assembler.columns)
            .field("rows", &self.assembler.rows)
            .field("exhausted", &self.exhausted)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Row Assembler
// ============================================================================

/// Parses raw records and pairs them with the header
#[derive(Debug)]
struct RowAssembler {
    dialect: CsvDialect,
    columns: Option<Arc<[String]>>,
    rows: u64,
}

impl RowAssembler {
    fn new(dialect: CsvDialect) -> Self {
        Self {
            dialect,
            columns: None,
            rows: 0,
        }
    }

    /// Returns `None` for the header record
    fn push(&mut self, record: &RawRecord) -> Result<Option<DecodedRow>> {
        let values = self.parse(record)?;

        let columns = match &self.columns {
            Some(columns) => Arc::clone(columns),
            None => {
                debug!(columns = values.len(), "Read report header");
                self.columns = Some(values.into());
                return Ok(None);
            }
        };

        if values.len() != columns.len() {
            return Err(Error::csv(
                record.line_number,
                record.lossy(),
                format!(
                    "expected {} fields, found {}",
                    columns.len(),
                    values.len()
                ),
            ));
        }

        self.rows += 1;
        Ok(Some(DecodedRow::new(columns, values, record.line_number)))
    }

    fn parse(&self, record: &RawRecord) -> Result<Vec<String>> {
        let text = std::str::from_utf8(&record.bytes).map_err(|e| {
            Error::csv(record.line_number, record.lossy(), format!("invalid UTF-8: {e}"))
        })?;

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(self.dialect.delimiter)
            .quote(self.dialect.quote)
            .escape(self.dialect.escape)
            .double_quote(self.dialect.double_quote)
            .from_reader(text.as_bytes());

        let mut fields = csv::StringRecord::new();
        match reader.read_record(&mut fields) {
            Ok(true) => Ok(fields.iter().map(str::to_string).collect()),
            Ok(false) => Ok(Vec::new()),
            Err(e) => Err(Error::csv(record.line_number, record.lossy(), e.to_string())),
        }
    }
}
