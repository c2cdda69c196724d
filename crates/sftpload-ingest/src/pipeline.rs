//! End-to-end run: remote file → header → batches → concurrent loads
//!
//! 1. Connect the database pool (sized to the load concurrency)
//! 2. Open the remote file on the blocking pool
//! 3. Resolve the header and skip leading lines
//! 4. Cut batches on a blocking producer task and hand them over a bounded
//!    channel to the [`Dispatcher`]
//! 5. Collect every outcome into a [`LoadSummary`]
//!
//! The pool is closed and the remote session dropped on every exit path.

use std::io::{BufRead, BufReader};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, instrument, warn};

use crate::batcher::Batcher;
use crate::config::{BatchConfig, TargetConfig, TransportConfig};
use crate::dispatcher::Dispatcher;
use crate::error::{IngestError, Result};
use crate::loader::{BatchSink, PgBatchLoader};
use crate::schema::SchemaConfig;
use crate::source::LineStream;
use crate::summary::LoadSummary;
use crate::transport::RemoteFile;

/// Everything one run needs
#[derive(Debug, Clone, Serialize)]
pub struct PipelineConfig {
    pub transport: TransportConfig,
    pub schema: SchemaConfig,
    pub batching: BatchConfig,
    pub target: TargetConfig,
}

/// Open a pool with one connection slot per concurrent load
pub async fn connect(target: &TargetConfig, batching: &BatchConfig) -> Result<PgPool> {
    let max_connections = u32::try_from(batching.concurrency).unwrap_or(u32::MAX);

    info!(
        host = %target.host,
        port = target.port,
        database = %target.database,
        max_connections,
        "Connecting to database"
    );

    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(target.connect_timeout())
        .connect_with(target.connect_options())
        .await
        .map_err(IngestError::Connection)
}

/// Run the whole pipeline against the configured remote file and table
#[instrument(
    skip_all,
    fields(remote = %config.transport.remote_path, table = %config.target.table)
)]
pub async fn run(config: &PipelineConfig) -> Result<LoadSummary> {
    let pool = connect(&config.target, &config.batching).await?;
    let loader = Arc::new(PgBatchLoader::new(pool.clone(), config.target.table.clone()));

    let result = load_remote(config, loader).await;

    pool.close().await;
    result
}

async fn load_remote(config: &PipelineConfig, loader: Arc<PgBatchLoader>) -> Result<LoadSummary> {
    let transport = config.transport.clone();
    let remote = tokio::task::spawn_blocking(move || RemoteFile::open(&transport)).await??;
    ingest(BufReader::new(remote), &config.schema, config.batching, loader).await
}

/// Stream `reader` through header resolution and batching into `sink`.
///
/// Fatal errors (unreadable source, unresolvable header) are returned as
/// `Err`. Per-batch load failures are not; they are listed in the summary.
/// A source that fails after loading started yields
/// [`IngestError::Interrupted`] carrying the summary of what was dispatched.
pub async fn ingest<R, S>(
    reader: R,
    schema: &SchemaConfig,
    batching: BatchConfig,
    sink: Arc<S>,
) -> Result<LoadSummary>
where
    R: BufRead + Send + 'static,
    S: BatchSink,
{
    let started = Instant::now();

    let schema = schema.clone();
    let (header, lines) = tokio::task::spawn_blocking(move || {
        let mut lines = LineStream::new(reader);
        let header = schema.resolve(&mut lines)?;
        Ok::<_, IngestError>((header, lines))
    })
    .await??;
    let header = Arc::new(header);

    let (tx, rx) = mpsc::channel(batching.concurrency);
    let batch_size = batching.batch_size;
    let producer = tokio::task::spawn_blocking(move || -> Result<usize> {
        let mut batcher = Batcher::new(lines, batch_size);
        for batch in batcher.by_ref() {
            let batch =
                batch.map_err(|e| IngestError::transport("Failed to read remote file", e))?;
            if tx.blocking_send(batch).is_err() {
                warn!("Dispatcher went away; stopping batch production");
                break;
            }
        }
        Ok(batcher.produced())
    });

    let outcomes = Dispatcher::new(batching.concurrency)
        .run(ReceiverStream::new(rx), Arc::clone(&header), sink)
        .await;

    let summary = LoadSummary::from_outcomes(header.columns().to_vec(), &outcomes)
        .with_duration(started.elapsed());

    match producer.await? {
        Ok(produced) => {
            info!(
                batches = produced,
                succeeded = summary.batches_succeeded,
                failed = summary.batches_failed,
                inserted = summary.rows_inserted,
                skipped = summary.rows_skipped,
                duration_ms = summary.duration_ms,
                "Load finished"
            );
            Ok(summary)
        },
        Err(e) => {
            warn!(
                succeeded = summary.batches_succeeded,
                failed = summary.batches_failed,
                inserted = summary.rows_inserted,
                error = %e,
                "Source failed mid-stream; batches already loaded stay committed"
            );
            Err(IngestError::interrupted(e, summary))
        },
    }
}
