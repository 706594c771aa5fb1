//! Incremental record splitter
//!
//! Tracks quoting state byte by byte so that record boundaries are found
//! correctly no matter where chunk boundaries fall.

use super::types::CsvDialect;
use crate::error::{Error, Result};
use std::collections::VecDeque;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// One complete record, without its line terminator
///
/// `bytes` is what the field parser reads. It equals `raw` except when an
/// unquoted field carries an escape byte: such a field is rewritten as a
/// quoted field so the escape keeps its meaning there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    /// Record bytes ready for field parsing
    pub bytes: Vec<u8>,
    /// Record bytes as received
    pub raw: Vec<u8>,
    /// Physical line the record starts on (1-based)
    pub line_number: u64,
}

impl RawRecord {
    /// Record text for error messages
    pub fn lossy(&self) -> String {
        String::from_utf8_lossy(&self.raw).into_owned()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    StartRecord,
    StartField,
    InField,
    InFieldEscape,
    InQuoted,
    InQuotedEscape,
    QuoteInQuoted,
}

/// Splits a byte stream into CSV records
#[derive(Debug)]
pub struct RecordSplitter {
    dialect: CsvDialect,
    state: State,
    current: Vec<u8>,
    raw: Vec<u8>,
    // start of the open field in `current`
    field_start: usize,
    // open unquoted field was rewritten as a quoted one
    requoted: bool,
    // `current` up to here ends in an escaped byte and is never trimmed
    protected: usize,
    line: u64,
    record_line: u64,
    ready: VecDeque<RawRecord>,
    head: Option<Vec<u8>>,
}

impl RecordSplitter {
    /// Create a splitter for `dialect`
    pub fn new(dialect: CsvDialect) -> Self {
        Self {
            dialect,
            state: State::StartRecord,
            current: Vec::new(),
            raw: Vec::new(),
            field_start: 0,
            requoted: false,
            protected: 0,
            line: 1,
            record_line: 1,
            ready: VecDeque::new(),
            head: Some(Vec::with_capacity(UTF8_BOM.len())),
        }
    }

    /// Feed the next chunk
    pub fn feed(&mut self, chunk: &[u8]) -> Result<()> {
        // Hold back the first bytes until a BOM can be ruled out
        if let Some(mut head) = self.head.take() {
            head.extend_from_slice(chunk);
            if head.len() < UTF8_BOM.len() && UTF8_BOM.starts_with(&head) {
                self.head = Some(head);
                return Ok(());
            }
            let body = head.strip_prefix(UTF8_BOM).unwrap_or(&head[..]);
            return self.scan(body);
        }
        self.scan(chunk)
    }

    /// Signal end of input
    pub fn finish(&mut self) -> Result<()> {
        if let Some(head) = self.head.take() {
            let body = head.strip_prefix(UTF8_BOM).unwrap_or(&head[..]);
            self.scan(body)?;
        }

        match self.state {
            State::InQuoted | State::InQuotedEscape => Err(Error::csv(
                self.record_line,
                String::from_utf8_lossy(&self.raw),
                "unexpected end of data inside quoted field",
            )),
            State::StartRecord => Ok(()),
            State::InFieldEscape => {
                // an escape at end of data reads as a line feed
                self.current.push(b'\n');
                self.protected = self.current.len();
                self.end_record();
                Ok(())
            }
            _ => {
                self.end_record();
                Ok(())
            }
        }
    }

    /// Next complete record, if any
    pub fn pop(&mut self) -> Option<RawRecord> {
        self.ready.pop_front()
    }

    /// Number of complete records waiting
    pub fn pending(&self) -> usize {
        self.ready.len()
    }

    fn scan(&mut self, bytes: &[u8]) -> Result<()> {
        let CsvDialect {
            delimiter,
            quote,
            escape,
            double_quote,
            skip_initial_space,
        } = self.dialect;

        for &b in bytes {
            self.raw.push(b);
            match self.state {
                State::StartRecord | State::StartField => {
                    if self.state == State::StartRecord {
                        if b == b'\n' {
                            // blank line
                            self.current.clear();
                            self.raw.clear();
                            self.line += 1;
                            continue;
                        }
                        self.record_line = self.line;
                    }
                    self.field_start = self.current.len();
                    if b == quote {
                        self.state = State::InQuoted;
                        self.current.push(b);
                    } else if b == delimiter {
                        self.state = State::StartField;
                        self.current.push(b);
                    } else if b == b'\n' {
                        self.end_line();
                    } else if b == b' ' && skip_initial_space {
                        self.state = State::StartField;
                    } else if Some(b) == escape {
                        self.requote_field(b);
                        self.state = State::InFieldEscape;
                    } else {
                        self.state = State::InField;
                        self.current.push(b);
                    }
                }
                State::InField => {
                    if b == delimiter {
                        self.close_field();
                        self.state = State::StartField;
                        self.current.push(b);
                    } else if b == b'\n' {
                        self.end_line();
                    } else if Some(b) == escape {
                        self.requote_field(b);
                        self.state = State::InFieldEscape;
                    } else if b == quote && self.requoted {
                        self.current.extend_from_slice(&[escape.unwrap_or(quote), b]);
                    } else {
                        self.current.push(b);
                    }
                }
                State::InFieldEscape => {
                    if b == b'\n' {
                        self.line += 1;
                    }
                    self.state = State::InField;
                    self.current.push(b);
                    self.protected = self.current.len();
                }
                State::InQuoted => {
                    if Some(b) == escape {
                        self.state = State::InQuotedEscape;
                    } else if b == quote {
                        self.state = State::QuoteInQuoted;
                    } else if b == b'\n' {
                        self.line += 1;
                    }
                    self.current.push(b);
                }
                State::InQuotedEscape => {
                    if b == b'\n' {
                        self.line += 1;
                    }
                    self.state = State::InQuoted;
                    self.current.push(b);
                }
                State::QuoteInQuoted => {
                    if b == quote && double_quote {
                        self.state = State::InQuoted;
                        self.current.push(b);
                    } else if b == delimiter {
                        self.state = State::StartField;
                        self.current.push(b);
                    } else if b == b'\n' {
                        self.end_line();
                    } else if b == b'\r' {
                        self.current.push(b);
                    } else {
                        return Err(Error::csv(
                            self.record_line,
                            String::from_utf8_lossy(&self.raw),
                            format!(
                                "'{}' expected after '{}'",
                                char::from(delimiter),
                                char::from(quote)
                            ),
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    /// Turn the open unquoted field into a quoted one and append `escape`
    ///
    /// The field parser only honours escapes inside quotes, so an escape
    /// outside them is carried over by quoting the field it appears in.
    fn requote_field(&mut self, escape: u8) {
        if !self.requoted {
            let quote = self.dialect.quote;
            let field = self.current.split_off(self.field_start);
            self.current.push(quote);
            for byte in field {
                if byte == quote {
                    self.current.push(escape);
                }
                self.current.push(byte);
            }
            self.requoted = true;
        }
        self.current.push(escape);
    }

    fn close_field(&mut self) {
        if self.requoted {
            self.trim_cr();
            self.current.push(self.dialect.quote);
            self.requoted = false;
        }
    }

    fn trim_cr(&mut self) {
        while self.current.len() > self.protected && self.current.last() == Some(&b'\r') {
            self.current.pop();
        }
    }

    // record ended by a line feed, which is not part of the record
    fn end_line(&mut self) {
        self.raw.pop();
        self.end_record();
    }

    fn end_record(&mut self) {
        self.close_field();
        self.trim_cr();
        while self.raw.last() == Some(&b'\r') {
            self.raw.pop();
        }
        let bytes = std::mem::take(&mut self.current);
        let raw = std::mem::take(&mut self.raw);
        if !bytes.is_empty() {
            self.ready.push_back(RawRecord {
                bytes,
                raw,
                line_number: self.record_line,
            });
        }
        self.protected = 0;
        self.state = State::StartRecord;
        self.line += 1;
    }
}

impl Default for RecordSplitter {
    fn default() -> Self {
        Self::new(CsvDialect::default())
    }
}
