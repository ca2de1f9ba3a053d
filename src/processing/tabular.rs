//! Strict comma-separated record reading and writing
//!
//! Reading is hand-rolled so that malformed quoting is reported instead of
//! being silently repaired. Writing goes through the `csv` crate, which quotes
//! fields only when necessary.
//!
//! Reader rules:
//! - fields are separated by `,` and records end at `\n` or `\r\n`
//! - a field beginning with `"` is quoted; inside it `""` is a literal quote
//!   and delimiters or line breaks are literal text
//! - line breaks inside a quoted field are normalized to `\n`
//! - completely empty lines are not records

use std::io::{self, BufRead, Write};
use thiserror::Error;

/// Errors produced while reading records
#[derive(Debug, Error)]
pub enum TabularError {
    #[error("failed to read input: {0}")]
    Io(#[from] io::Error),

    #[error("line {line}: {kind}")]
    Parse { line: u64, kind: ParseErrorKind },
}

/// What exactly was wrong with a malformed record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    #[error("bare \" in non-quoted field")]
    BareQuote,

    #[error("extraneous or missing \" in quoted field")]
    ExtraneousQuote,

    #[error("quoted field is never closed")]
    UnterminatedQuote,

    #[error("field is not valid UTF-8")]
    InvalidUtf8,
}

/// Streaming record reader holding at most one physical line at a time
/// (plus the continuation lines of a quoted field)
pub struct RecordReader<R> {
    inner: R,
    line: u64,
    buf: Vec<u8>,
}

impl<R: BufRead> RecordReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            line: 0,
            buf: Vec::with_capacity(1024),
        }
    }

    /// Number of physical lines consumed so far
    pub fn line(&self) -> u64 {
        self.line
    }

    /// Read the next record into `record`, reusing its allocation.
    ///
    /// Returns `Ok(false)` at end of stream.
    pub fn read_record(&mut self, record: &mut Vec<String>) -> Result<bool, TabularError> {
        record.clear();

        if !self.next_non_empty_line()? {
            return Ok(false);
        }

        let start_line = self.line;
        let mut field: Vec<u8> = Vec::new();
        let mut pos = 0usize;

        loop {
            let end = content_len(&self.buf);

            if pos < end && self.buf[pos] == b'"' {
                pos += 1;
                field.clear();

                // Scan the quoted section, pulling in further lines until it closes
                loop {
                    let end = content_len(&self.buf);
                    match self.buf[pos..end].iter().position(|&b| b == b'"') {
                        Some(offset) => {
                            field.extend_from_slice(&self.buf[pos..pos + offset]);
                            pos += offset + 1;
                            if pos < end && self.buf[pos] == b'"' {
                                field.push(b'"');
                                pos += 1;
                                continue;
                            }
                            break;
                        }
                        None => {
                            field.extend_from_slice(&self.buf[pos..end]);
                            if !self.buf.ends_with(b"\n") || !self.next_line()? {
                                return Err(TabularError::Parse {
                                    line: start_line,
                                    kind: ParseErrorKind::UnterminatedQuote,
                                });
                            }
                            field.push(b'\n');
                            pos = 0;
                        }
                    }
                }

                record.push(self.decode(&field)?);

                let end = content_len(&self.buf);
                if pos == end {
                    return Ok(true);
                }
                if self.buf[pos] != b',' {
                    return Err(TabularError::Parse {
                        line: self.line,
                        kind: ParseErrorKind::ExtraneousQuote,
                    });
                }
                pos += 1;
            } else {
                let rest = &self.buf[pos..end];
                let stop = rest.iter().position(|&b| b == b',').unwrap_or(rest.len());
                let raw = &rest[..stop];

                if raw.contains(&b'"') {
                    return Err(TabularError::Parse {
                        line: self.line,
                        kind: ParseErrorKind::BareQuote,
                    });
                }

                record.push(self.decode(raw)?);
                pos += stop;
                if pos == end {
                    return Ok(true);
                }
                pos += 1;
            }
        }
    }

    /// Load the next physical line into the buffer
    fn next_line(&mut self) -> Result<bool, TabularError> {
        self.buf.clear();
        let read = self.inner.read_until(b'\n', &mut self.buf)?;
        if read == 0 {
            return Ok(false);
        }
        self.line += 1;
        Ok(true)
    }

    fn next_non_empty_line(&mut self) -> Result<bool, TabularError> {
        while self.next_line()? {
            if content_len(&self.buf) > 0 {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn decode(&self, bytes: &[u8]) -> Result<String, TabularError> {
        String::from_utf8(bytes.to_vec()).map_err(|_| TabularError::Parse {
            line: self.line,
            kind: ParseErrorKind::InvalidUtf8,
        })
    }
}

/// Length of a line without its terminator
fn content_len(line: &[u8]) -> usize {
    if line.ends_with(b"\r\n") {
        line.len() - 2
    } else if line.ends_with(b"\n") {
        line.len() - 1
    } else {
        line.len()
    }
}

/// Writer used for transformed output. Record lengths may vary from row to row.
pub fn record_writer<W: Write>(output: W) -> csv::Writer<W> {
    csv::WriterBuilder::new().flexible(true).from_writer(output)
}
