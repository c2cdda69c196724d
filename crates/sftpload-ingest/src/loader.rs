//! Batch loading into PostgreSQL
//!
//! Each batch becomes a single multi-row insert whose conflict target is the
//! full header column list, so a row that already exists (matching on every
//! column) is skipped instead of failing the batch:
//!
//! ```sql
//! INSERT INTO "events" ("a", "b") VALUES ('1', '2'), ('3', '4')
//! ON CONFLICT ("a", "b") DO NOTHING
//! ```
//!
//! The destination table needs a unique constraint or index spanning exactly
//! those columns, otherwise PostgreSQL rejects the conflict clause.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::{debug, instrument};

use crate::batcher::Batch;
use crate::error::LoadError;
use crate::schema::{column_key, Header, DELIMITER};

/// Destination for batches; one call per batch, possibly concurrently
#[async_trait]
pub trait BatchSink: Send + Sync + 'static {
    /// Load `batch` into the columns named by `header`, returning the number
    /// of rows actually inserted
    async fn load(&self, batch: &Batch, header: &Header) -> Result<u64, LoadError>;
}

/// Loads batches through a connection pool, one pooled connection per batch
#[derive(Debug, Clone)]
pub struct PgBatchLoader {
    pool: PgPool,
    table: String,
}

impl PgBatchLoader {
    pub fn new(pool: PgPool, table: impl Into<String>) -> Self {
        Self {
            pool,
            table: table.into(),
        }
    }
}

#[async_trait]
impl BatchSink for PgBatchLoader {
    #[instrument(skip_all, fields(batch = batch.sequence, lines = batch.len()))]
    async fn load(&self, batch: &Batch, header: &Header) -> Result<u64, LoadError> {
        if batch.is_empty() {
            return Ok(0);
        }
        let rows = split_rows(batch, header)?;

        let mut statement = insert_statement(&self.table, header, &rows);

        let mut tx = self.pool.begin().await?;
        let result = statement.build().persistent(false).execute(&mut *tx).await?;
        tx.commit().await?;

        debug!(inserted = result.rows_affected(), "Batch committed");
        Ok(result.rows_affected())
    }
}

/// Split every line on the delimiter, rejecting rows whose width differs
/// from the header
pub fn split_rows<'b>(batch: &'b Batch, header: &Header) -> Result<Vec<Vec<&'b str>>, LoadError> {
    batch
        .lines
        .iter()
        .enumerate()
        .map(|(index, line)| {
            let fields: Vec<&str> = line.split(DELIMITER).collect();
            if fields.len() != header.len() {
                return Err(LoadError::FieldCount {
                    line: index + 1,
                    expected: header.len(),
                    actual: fields.len(),
                });
            }
            Ok(fields)
        })
        .collect()
}

/// Build the idempotent multi-row insert for `rows`
pub fn insert_statement(
    table: &str,
    header: &Header,
    rows: &[Vec<&str>],
) -> QueryBuilder<'static, Postgres> {
    let columns = header
        .columns()
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");

    let mut builder =
        QueryBuilder::new(format!("INSERT INTO {} ({}) ", quote_table(table), columns));
    builder.push_values(rows, |mut tuple, row| {
        for value in row {
            tuple.push(quote_literal(value));
        }
    });
    builder.push(format_args!(" ON CONFLICT ({}) DO NOTHING", columns));
    builder
}

/// Render a value as a SQL string literal; PostgreSQL coerces it to the
/// column type
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Double-quote an identifier. Plain names are folded to lower case first,
/// matching how PostgreSQL treats the same name written unquoted.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", column_key(name).replace('"', "\"\""))
}

/// Quote each part of a possibly schema-qualified table name
pub fn quote_table(table: &str) -> String {
    table.split('.').map(quote_ident).collect::<Vec<_>>().join(".")
}
