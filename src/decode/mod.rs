//! Streaming CSV decoder
//!
//! # Overview
//!
//! Report bodies arrive as a stream of byte chunks. `RecordSplitter` finds
//! record boundaries incrementally (quoted fields may contain newlines and
//! records may straddle chunks), and each complete record is parsed by the
//! `csv` crate. The first record is the header; every following record is
//! zipped with it into a `DecodedRow`.
//!
//! ```text
//! ByteStream ──► RecordSplitter ──► csv::Reader ──► DecodedRow
//! ```

mod decoders;
mod splitter;
mod types;

pub use decoders::{CsvDecoder, RowStream};
pub use splitter::{RawRecord, RecordSplitter};
pub use types::{ByteStream, CsvDialect, DecodedRow};
