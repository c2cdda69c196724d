//! Forward-only line cursor over a readable stream

use std::io::{self, BufRead};

/// Single-pass cursor yielding text lines with the line terminator removed
pub struct LineStream<R> {
    reader: R,
    lines_read: usize,
    buf: String,
}

impl<R: BufRead> LineStream<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            lines_read: 0,
            buf: String::new(),
        }
    }

    /// Next raw line, or `None` at end of stream
    pub fn next_line(&mut self) -> io::Result<Option<String>> {
        self.buf.clear();
        if self.reader.read_line(&mut self.buf)? == 0 {
            return Ok(None);
        }
        self.lines_read += 1;

        let line = self.buf.strip_suffix('\n').unwrap_or(&self.buf);
        let line = line.strip_suffix('\r').unwrap_or(line);
        Ok(Some(line.to_string()))
    }

    /// Discard up to `n` lines. Returns how many were actually skipped.
    pub fn skip_lines(&mut self, n: usize) -> io::Result<usize> {
        let mut skipped = 0;
        while skipped < n {
            if self.next_line()?.is_none() {
                break;
            }
            skipped += 1;
        }
        Ok(skipped)
    }

    /// Lines consumed so far, header and skipped lines included
    pub fn lines_read(&self) -> usize {
        self.lines_read
    }
}

impl<R: BufRead> Iterator for LineStream<R> {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_line().transpose()
    }
}

/// Blank lines carry no row and are dropped by the batcher
pub fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}
