//! sftpload Ingest Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Streams a comma-delimited file from an SFTP (or FTP) server into a
//! PostgreSQL table in fixed-size batches, loading batches concurrently and
//! skipping rows that already exist.
//!
//! # Pipeline
//!
//! - [`transport`]: remote session and readable file handle
//! - [`source`]: forward-only line cursor
//! - [`schema`]: header resolution and leading-line skipping
//! - [`batcher`]: partitioning of data lines into batches
//! - [`dispatcher`]: bounded concurrent loading with outcome collection
//! - [`loader`]: idempotent multi-row insert per batch
//! - [`pipeline`]: wiring and resource lifetime
//!
//! # Example
//!
//! ```no_run
//! use sftpload_ingest::config::{BatchConfig, Credential, Protocol, TargetConfig, TransportConfig};
//! use sftpload_ingest::pipeline::{run, PipelineConfig};
//! use sftpload_ingest::schema::SchemaConfig;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = PipelineConfig {
//!         transport: TransportConfig::new(
//!             Protocol::Sftp,
//!             "files.example.com",
//!             None,
//!             "etl",
//!             Credential::Password("secret".into()),
//!             "/data/example.csv",
//!         )?,
//!         schema: SchemaConfig::new(0, None, true, true)?,
//!         batching: BatchConfig::new(500, 4)?,
//!         target: TargetConfig::new("localhost", None, "warehouse", "etl", "pw", "events")?,
//!     };
//!
//!     let summary = run(&config).await?;
//!     println!("{} rows inserted", summary.rows_inserted);
//!     Ok(())
//! }
//! ```

pub mod batcher;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod loader;
pub mod pipeline;
pub mod schema;
pub mod source;
pub mod summary;
pub mod transport;

pub use error::{IngestError, LoadError, Result};
