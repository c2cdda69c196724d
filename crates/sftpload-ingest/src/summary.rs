//! Per-run load statistics

use serde::{Deserialize, Serialize};

use crate::dispatcher::BatchOutcome;

/// One failed batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchFailure {
    pub sequence: usize,
    pub lines: usize,
    pub error: String,
}

/// What a run did, aggregated over every batch outcome
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadSummary {
    pub columns: Vec<String>,
    pub batches_dispatched: usize,
    pub batches_succeeded: usize,
    pub batches_failed: usize,
    /// Data lines handed to the loader, failed batches included
    pub rows_submitted: u64,
    pub rows_inserted: u64,
    /// Rows of successful batches that already existed in the table
    pub rows_skipped: u64,
    /// Failed batches in source order
    pub failures: Vec<BatchFailure>,
    pub duration_ms: u64,
}

impl LoadSummary {
    pub fn from_outcomes(columns: Vec<String>, outcomes: &[BatchOutcome]) -> Self {
        let mut summary = Self {
            columns,
            batches_dispatched: outcomes.len(),
            ..Default::default()
        };

        for outcome in outcomes {
            let lines = outcome.lines as u64;
            summary.rows_submitted += lines;

            match &outcome.result {
                Ok(inserted) => {
                    summary.batches_succeeded += 1;
                    summary.rows_inserted += inserted;
                    summary.rows_skipped += lines.saturating_sub(*inserted);
                },
                Err(e) => {
                    summary.batches_failed += 1;
                    summary.failures.push(BatchFailure {
                        sequence: outcome.sequence,
                        lines: outcome.lines,
                        error: e.to_string(),
                    });
                },
            }
        }

        summary.failures.sort_by_key(|f| f.sequence);
        summary
    }

    pub fn with_duration(mut self, duration: std::time::Duration) -> Self {
        self.duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// True when every dispatched batch loaded
    pub fn is_complete(&self) -> bool {
        self.batches_failed == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LoadError;

    fn outcome(sequence: usize, lines: usize, result: Result<u64, LoadError>) -> BatchOutcome {
        BatchOutcome {
            sequence,
            lines,
            result,
        }
    }

    #[test]
    fn test_summary_counts() {
        let outcomes = vec![
            outcome(2, 3, Err(LoadError::Aborted("boom".into()))),
            outcome(0, 10, Ok(10)),
            outcome(1, 10, Ok(7)),
            outcome(
                3,
                1,
                Err(LoadError::FieldCount {
                    line: 1,
                    expected: 2,
                    actual: 3,
                }),
            ),
        ];

        let summary = LoadSummary::from_outcomes(vec!["a".into(), "b".into()], &outcomes);
        assert_eq!(summary.batches_dispatched, 4);
        assert_eq!(summary.batches_succeeded, 2);
        assert_eq!(summary.batches_failed, 2);
        assert_eq!(summary.rows_submitted, 24);
        assert_eq!(summary.rows_inserted, 17);
        assert_eq!(summary.rows_skipped, 3);
        assert_eq!(
            summary.failures.iter().map(|f| f.sequence).collect::<Vec<_>>(),
            vec![2, 3]
        );
        assert!(!summary.is_complete());
    }

    #[test]
    fn test_empty_run_is_complete() {
        let summary = LoadSummary::from_outcomes(vec!["a".into()], &[]);
        assert!(summary.is_complete());
        assert_eq!(summary.batches_dispatched, 0);
    }
}
