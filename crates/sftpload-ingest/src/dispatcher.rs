//! Bounded concurrent dispatch of batch loads
//!
//! Every batch pulled from the input stream is loaded on its own tokio task.
//! At most `concurrency` loads are in flight; the next batch is only pulled
//! once a slot frees up, so a slow database throttles the producer through the
//! bounded hand-off channel in front of this stage. Outcomes are collected in
//! completion order, which need not match source order.

use std::sync::Arc;

use futures::stream::{Stream, StreamExt};
use tracing::{error, info};

use crate::batcher::Batch;
use crate::error::LoadError;
use crate::loader::BatchSink;
use crate::schema::Header;

/// Result of loading one batch
#[derive(Debug)]
pub struct BatchOutcome {
    pub sequence: usize,
    /// Data lines in the batch
    pub lines: usize,
    /// Rows inserted, or why the batch failed
    pub result: Result<u64, LoadError>,
}

impl BatchOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Fans batches out to a [`BatchSink`] with bounded concurrency
#[derive(Debug, Clone, Copy)]
pub struct Dispatcher {
    concurrency: usize,
}

impl Dispatcher {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }

    /// Load every batch of `batches` and wait for all of them to finish
    pub async fn run<St, S>(
        &self,
        batches: St,
        header: Arc<Header>,
        sink: Arc<S>,
    ) -> Vec<BatchOutcome>
    where
        St: Stream<Item = Batch>,
        S: BatchSink,
    {
        info!(concurrency = self.concurrency, "Dispatching batches");

        batches
            .map(|batch| {
                let sink = Arc::clone(&sink);
                let header = Arc::clone(&header);
                let sequence = batch.sequence;
                let lines = batch.len();

                async move {
                    let task = tokio::spawn(async move { sink.load(&batch, &header).await });
                    let result = match task.await {
                        Ok(result) => result,
                        Err(e) => Err(LoadError::Aborted(e.to_string())),
                    };

                    match &result {
                        Ok(inserted) => info!(
                            batch = sequence,
                            lines,
                            inserted,
                            skipped = (lines as u64).saturating_sub(*inserted),
                            "Batch loaded"
                        ),
                        Err(e) => error!(batch = sequence, lines, error = %e, "Batch failed"),
                    }

                    BatchOutcome {
                        sequence,
                        lines,
                        result,
                    }
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await
    }
}
