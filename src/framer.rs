//! Line framing: raw bytes to an ordered sequence of logical lines.
//!
//! The framer pulls from any [`BufRead`] one line at a time, so memory use is
//! bounded by the longest line rather than by the input size. It
//!
//! - strips the record terminator (`\n`, plus a preceding `\r` if present),
//! - skips lines that are empty once the terminator is gone,
//! - treats the first non-empty line as the header (see [`LineFramer::header`]),
//! - yields every later non-empty line as a [`FramedLine`] data record.
//!
//! Bytes that are not valid UTF-8 cannot be framed into a record, so they
//! end the stream with [`CleanseError::Framing`] instead of being rejected.

use crate::error::{CleanseError, CleanseResult};
use std::io::BufRead;

const UTF8_BOM: &str = "\u{feff}";

/// One framed data line, terminator removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramedLine {
    /// 1-based physical line number in the input, counting blank lines.
    pub line_no: u64,
    pub text: String,
}

/// Forward-only framer over a buffered byte source.
pub struct LineFramer<R> {
    reader: R,
    buf: Vec<u8>,
    physical_line: u64,
    header: Option<String>,
    header_read: bool,
    finished: bool,
}

impl<R: BufRead> LineFramer<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::with_capacity(256),
            physical_line: 0,
            header: None,
            header_read: false,
            finished: false,
        }
    }

    /// The header line, reading it from the source on first call.
    ///
    /// Returns `Ok(None)` for an input with no non-empty lines at all.
    ///
    /// # Errors
    /// Propagates read and decoding failures of the header line.
    pub fn header(&mut self) -> CleanseResult<Option<&str>> {
        self.ensure_header()?;
        Ok(self.header.as_deref())
    }

    /// Physical lines consumed so far, blank lines included.
    #[must_use]
    pub fn lines_read(&self) -> u64 {
        self.physical_line
    }

    fn ensure_header(&mut self) -> CleanseResult<()> {
        if self.header_read {
            return Ok(());
        }
        self.header_read = true;
        if let Some(first) = self.next_non_empty()? {
            let text = first
                .text
                .strip_prefix(UTF8_BOM)
                .map(str::to_owned)
                .unwrap_or(first.text);
            self.header = Some(text);
        }
        Ok(())
    }

    fn next_non_empty(&mut self) -> CleanseResult<Option<FramedLine>> {
        loop {
            if self.finished {
                return Ok(None);
            }
            self.buf.clear();
            let n = match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(n) => n,
                Err(e) => {
                    self.finished = true;
                    return Err(CleanseError::Io(e));
                }
            };
            if n == 0 {
                self.finished = true;
                return Ok(None);
            }
            self.physical_line += 1;

            let mut end = self.buf.len();
            if end > 0 && self.buf[end - 1] == b'\n' {
                end -= 1;
                if end > 0 && self.buf[end - 1] == b'\r' {
                    end -= 1;
                }
            }
            if end == 0 {
                continue;
            }

            let text = match std::str::from_utf8(&self.buf[..end]) {
                Ok(s) => s.to_owned(),
                Err(e) => {
                    self.finished = true;
                    return Err(CleanseError::Framing {
                        line: self.physical_line,
                        message: format!("invalid UTF-8 at byte {}", e.valid_up_to()),
                    });
                }
            };
            return Ok(Some(FramedLine {
                line_no: self.physical_line,
                text,
            }));
        }
    }
}

impl<R: BufRead> Iterator for LineFramer<R> {
    type Item = CleanseResult<FramedLine>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Err(e) = self.ensure_header() {
            return Some(Err(e));
        }
        self.next_non_empty().transpose()
    }
}
