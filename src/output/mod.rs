//! Output module
//!
//! Destinations for decoded report rows.
//!
//! # Overview
//!
//! - `RowSink`: the trait the sync engine forwards rows to
//! - `JsonLinesSink`: one `RECORD` message per line on any `io::Write`
//! - `MemorySink`: collects rows per stream (tests, embedding)

mod sink;
mod writer;

pub use sink::{MemorySink, RowSink};
pub use writer::{JsonLinesSink, RecordBody, RecordMessage};
