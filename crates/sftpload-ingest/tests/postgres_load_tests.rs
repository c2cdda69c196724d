//! Loader tests against a real PostgreSQL instance
//!
//! Tests that loading:
//! 1. Inserts every row of a well-formed file
//! 2. Skips rows that already exist when the same file is loaded again
//! 3. Isolates a batch the database rejects from its neighbours
//!
//! Run with: cargo test -p sftpload-ingest -- --ignored

use std::io::Cursor;
use std::sync::Arc;

use anyhow::Result;
use sftpload_ingest::config::{BatchConfig, TargetConfig};
use sftpload_ingest::loader::PgBatchLoader;
use sftpload_ingest::pipeline::{connect, ingest};
use sftpload_ingest::schema::SchemaConfig;
use sqlx::PgPool;
use testcontainers::{runners::AsyncRunner, ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tracing::info;

/// Initialize tracing for tests
fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,sftpload_ingest=debug,sqlx=warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Start PostgreSQL and create the `events` table with a unique constraint
/// over every column
async fn setup(concurrency: usize) -> Result<(ContainerAsync<Postgres>, PgPool)> {
    let container = Postgres::default().with_tag("16-alpine").start().await?;
    let host = container.get_host().await?.to_string();
    let port = container.get_host_port_ipv4(5432).await?;

    let target = TargetConfig::new(host, Some(port), "postgres", "postgres", "postgres", "events")?;
    let pool = connect(&target, &BatchConfig::new(1, concurrency)?).await?;

    sqlx::query(
        "CREATE TABLE events (
            a TEXT NOT NULL,
            b INTEGER NOT NULL,
            c TEXT NOT NULL,
            UNIQUE (a, b, c)
        )",
    )
    .execute(&pool)
    .await?;

    Ok((container, pool))
}

async fn count_rows(pool: &PgPool) -> Result<i64> {
    Ok(sqlx::query_scalar("SELECT count(*) FROM events")
        .fetch_one(pool)
        .await?)
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_reload_is_idempotent() -> Result<()> {
    init_tracing();
    let (_container, pool) = setup(3).await?;
    let loader = Arc::new(PgBatchLoader::new(pool.clone(), "events"));
    let schema = SchemaConfig::new(0, None, true, true)?;

    let mut input = String::from("a,b,c\n");
    for i in 0..50 {
        input.push_str(&format!("row{i},{i},x\n"));
    }

    let first = ingest(
        Cursor::new(input.clone().into_bytes()),
        &schema,
        BatchConfig::new(7, 3)?,
        loader.clone(),
    )
    .await?;
    info!(inserted = first.rows_inserted, "First load");
    assert!(first.is_complete());
    assert_eq!(first.batches_dispatched, 8);
    assert_eq!(first.rows_inserted, 50);
    assert_eq!(count_rows(&pool).await?, 50);

    let second = ingest(
        Cursor::new(input.into_bytes()),
        &schema,
        BatchConfig::new(7, 3)?,
        loader,
    )
    .await?;
    assert!(second.is_complete());
    assert_eq!(second.rows_inserted, 0);
    assert_eq!(second.rows_skipped, 50);
    assert_eq!(count_rows(&pool).await?, 50);

    pool.close().await;
    Ok(())
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_duplicate_rows_within_file_are_skipped() -> Result<()> {
    init_tracing();
    let (_container, pool) = setup(2).await?;
    let loader = Arc::new(PgBatchLoader::new(pool.clone(), "events"));
    let schema = SchemaConfig::new(0, None, true, true)?;

    let input = "a,b,c\np,1,q\np,1,q\np,2,q\n";
    let summary = ingest(
        Cursor::new(input.as_bytes().to_vec()),
        &schema,
        BatchConfig::new(10, 2)?,
        loader,
    )
    .await?;

    assert!(summary.is_complete());
    assert_eq!(summary.rows_inserted, 2);
    assert_eq!(summary.rows_skipped, 1);
    assert_eq!(count_rows(&pool).await?, 2);

    pool.close().await;
    Ok(())
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_rejected_batch_is_isolated() -> Result<()> {
    init_tracing();
    let (_container, pool) = setup(2).await?;
    let loader = Arc::new(PgBatchLoader::new(pool.clone(), "events"));
    let schema = SchemaConfig::new(0, None, true, true)?;

    // Batch 1 has a non-integer `b`, batch 2 has a missing field
    let input = "a,b,c\nr0,0,x\nr1,1,x\nr2,two,x\nr3,3,x\nr4,4\nr5,5,x\nr6,6,x\nr7,7,x\n";
    let summary = ingest(
        Cursor::new(input.as_bytes().to_vec()),
        &schema,
        BatchConfig::new(2, 2)?,
        loader,
    )
    .await?;

    assert_eq!(summary.batches_dispatched, 4);
    assert_eq!(summary.batches_failed, 2);
    let failed: Vec<usize> = summary.failures.iter().map(|f| f.sequence).collect();
    assert_eq!(failed, vec![1, 2]);
    assert!(summary.failures[1].error.contains("has 2 fields"));

    let loaded: Vec<String> = sqlx::query_scalar("SELECT a FROM events ORDER BY b")
        .fetch_all(&pool)
        .await?;
    assert_eq!(loaded, vec!["r0", "r1", "r6", "r7"]);

    pool.close().await;
    Ok(())
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_mixed_case_header_targets_folded_columns() -> Result<()> {
    init_tracing();
    let (_container, pool) = setup(1).await?;
    let loader = Arc::new(PgBatchLoader::new(pool.clone(), "public.events"));
    let schema = SchemaConfig::new(0, None, true, true)?;

    let input = "A, B ,C\nm,1,n\n";
    let summary = ingest(
        Cursor::new(input.as_bytes().to_vec()),
        &schema,
        BatchConfig::new(10, 1)?,
        loader,
    )
    .await?;

    assert!(summary.is_complete(), "{:?}", summary.failures);
    assert_eq!(count_rows(&pool).await?, 1);

    pool.close().await;
    Ok(())
}
