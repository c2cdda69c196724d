//! Partitioning of the data lines into load batches

use std::io::{self, BufRead};

use crate::source::{is_blank, LineStream};

/// Consecutive non-blank data lines loaded by one statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// Position of this batch in source order, starting at 0
    pub sequence: usize,
    pub lines: Vec<String>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Lazily cuts a [`LineStream`] into batches of up to `batch_size` lines.
///
/// Blank lines are dropped and do not count toward the batch size. Iteration
/// ends once the stream has no non-blank line left. A read error is yielded
/// once and ends iteration.
pub struct Batcher<R> {
    lines: LineStream<R>,
    batch_size: usize,
    next_sequence: usize,
    done: bool,
}

impl<R: BufRead> Batcher<R> {
    pub fn new(lines: LineStream<R>, batch_size: usize) -> Self {
        Self {
            lines,
            batch_size: batch_size.max(1),
            next_sequence: 0,
            done: false,
        }
    }

    /// Batches produced so far
    pub fn produced(&self) -> usize {
        self.next_sequence
    }
}

impl<R: BufRead> Iterator for Batcher<R> {
    type Item = io::Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut lines = Vec::with_capacity(self.batch_size);
        while lines.len() < self.batch_size {
            match self.lines.next_line() {
                Ok(Some(line)) if is_blank(&line) => continue,
                Ok(Some(line)) => lines.push(line),
                Ok(None) => {
                    self.done = true;
                    break;
                },
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                },
            }
        }

        if lines.is_empty() {
            return None;
        }

        let batch = Batch {
            sequence: self.next_sequence,
            lines,
        };
        self.next_sequence += 1;
        Some(Ok(batch))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn batches(input: &str, batch_size: usize) -> Vec<Batch> {
        Batcher::new(LineStream::new(Cursor::new(input.to_string())), batch_size)
            .collect::<io::Result<_>>()
            .unwrap()
    }

    fn numbered_lines(n: usize) -> String {
        (0..n).map(|i| format!("{i},{i}\n")).collect()
    }

    #[test]
    fn test_batch_count_is_ceiling_division() {
        for (n, size) in [(0, 3), (1, 3), (3, 3), (7, 3), (10, 1), (5, 10)] {
            let result = batches(&numbered_lines(n), size);
            assert_eq!(result.len(), n.div_ceil(size), "n={n} size={size}");

            for batch in result.iter().take(result.len().saturating_sub(1)) {
                assert_eq!(batch.len(), size);
            }
            let total: usize = result.iter().map(Batch::len).sum();
            assert_eq!(total, n);
        }
    }

    #[test]
    fn test_blank_lines_are_not_counted() {
        let result = batches("1\n\n2\n   \n\n3\n4\n\n", 2);
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].lines, vec!["1", "2"]);
        assert_eq!(result[1].lines, vec!["3", "4"]);
    }

    #[test]
    fn test_trailing_blank_padding_ends_stream() {
        let result = batches("1,2\n\n\n\n\n\n", 2);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].lines, vec!["1,2"]);
    }

    #[test]
    fn test_all_blank_input_produces_nothing() {
        assert!(batches("\n\n \n", 4).is_empty());
    }

    #[test]
    fn test_sequences_follow_source_order() {
        let result = batches(&numbered_lines(5), 2);
        let sequences: Vec<usize> = result.iter().map(|b| b.sequence).collect();
        assert_eq!(sequences, vec![0, 1, 2]);
        assert_eq!(result[2].lines, vec!["4,4"]);
    }

    #[test]
    fn test_read_error_ends_iteration() {
        let mut data = b"1,2\n3,4\n".to_vec();
        data.extend_from_slice(&[0xff, b'\n', b'5', b'\n']);
        let mut batcher = Batcher::new(LineStream::new(Cursor::new(data)), 2);

        assert_eq!(batcher.next().unwrap().unwrap().lines, vec!["1,2", "3,4"]);
        assert!(batcher.next().unwrap().is_err());
        assert!(batcher.next().is_none());
        assert_eq!(batcher.produced(), 1);
    }
}
