//! sftpload - load a remote CSV file into a PostgreSQL table

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser};
use sftpload_common::logging::{init_logging, LogConfig, LogLevel};
use sftpload_ingest::config::{
    BatchConfig, Credential, Protocol, TargetConfig, TransportConfig,
    DEFAULT_BATCH_SIZE, DEFAULT_CONCURRENCY, DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
};
use sftpload_ingest::pipeline::{self, PipelineConfig};
use sftpload_ingest::schema::SchemaConfig;
use sftpload_ingest::summary::LoadSummary;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "sftpload")]
#[command(author, version, about = "Stream a remote CSV file into a PostgreSQL table")]
struct Cli {
    #[command(flatten)]
    remote: RemoteArgs,

    #[command(flatten)]
    schema: SchemaArgs,

    #[command(flatten)]
    batching: BatchArgs,

    #[command(flatten)]
    target: TargetArgs,

    /// Print the run summary as JSON on stdout
    #[arg(long)]
    json: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Args, Debug)]
#[command(next_help_heading = "Remote file")]
struct RemoteArgs {
    /// Transfer protocol (sftp or ftp)
    #[arg(long, env = "SFTPLOAD_PROTOCOL", default_value_t = Protocol::Sftp)]
    protocol: Protocol,

    /// Remote host
    #[arg(long, env = "SFTPLOAD_HOST")]
    host: String,

    /// Remote port (defaults to 22 for sftp, 21 for ftp)
    #[arg(long, env = "SFTPLOAD_PORT")]
    port: Option<u16>,

    /// Remote user name
    #[arg(long, env = "SFTPLOAD_USER")]
    user: String,

    /// Password, or key passphrase when --private-key is given
    #[arg(long, env = "SFTPLOAD_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Private key file for SSH public-key authentication
    #[arg(long, env = "SFTPLOAD_PRIVATE_KEY")]
    private_key: Option<PathBuf>,

    /// Path of the CSV file on the server
    #[arg(long, env = "SFTPLOAD_REMOTE_PATH")]
    remote_path: String,
}

#[derive(Args, Debug)]
#[command(next_help_heading = "Schema")]
struct SchemaArgs {
    /// Lines to skip after the header has been resolved
    #[arg(long, env = "SFTPLOAD_SKIP_LINES", default_value_t = 0)]
    skip_lines: usize,

    /// Explicit column names, comma separated
    #[arg(long, env = "SFTPLOAD_HEADER", value_delimiter = ',')]
    header: Option<Vec<String>>,

    /// Whether the file starts with a header row
    #[arg(long, env = "SFTPLOAD_HAS_HEADER", default_value_t = true, action = ArgAction::Set)]
    has_header: bool,

    /// Derive column names from the file instead of --header
    #[arg(long, env = "SFTPLOAD_AUTO_SCHEMA", default_value_t = true, action = ArgAction::Set)]
    auto_generate_schema: bool,
}

#[derive(Args, Debug)]
#[command(next_help_heading = "Batching")]
struct BatchArgs {
    /// Rows per insert statement
    #[arg(long, env = "SFTPLOAD_BATCH_SIZE", default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Maximum concurrent insert statements
    #[arg(long, env = "SFTPLOAD_CONCURRENCY", default_value_t = DEFAULT_CONCURRENCY)]
    concurrency: usize,
}

#[derive(Args, Debug)]
#[command(next_help_heading = "Target database")]
struct TargetArgs {
    #[arg(long, env = "PGHOST", default_value = "localhost")]
    db_host: String,

    #[arg(long, env = "PGPORT")]
    db_port: Option<u16>,

    #[arg(long, env = "PGDATABASE")]
    db_name: String,

    #[arg(long, env = "PGUSER")]
    db_user: String,

    #[arg(long, env = "PGPASSWORD", hide_env_values = true, default_value = "")]
    db_password: String,

    /// Destination table, optionally schema-qualified
    #[arg(long, env = "SFTPLOAD_TABLE")]
    table: String,

    /// Connection timeout in seconds
    #[arg(
        long,
        env = "SFTPLOAD_DB_CONNECT_TIMEOUT",
        default_value_t = DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS
    )]
    db_connect_timeout: u64,
}

impl Cli {
    fn pipeline_config(self) -> Result<PipelineConfig> {
        let credential = match (self.remote.private_key, self.remote.password) {
            (Some(path), passphrase) => Credential::PrivateKey { path, passphrase },
            (None, Some(password)) => Credential::Password(password),
            (None, None) => anyhow::bail!("either --password or --private-key is required"),
        };

        Ok(PipelineConfig {
            transport: TransportConfig::new(
                self.remote.protocol,
                self.remote.host,
                self.remote.port,
                self.remote.user,
                credential,
                self.remote.remote_path,
            )?,
            schema: SchemaConfig::new(
                self.schema.skip_lines,
                self.schema.header,
                self.schema.has_header,
                self.schema.auto_generate_schema,
            )?,
            batching: BatchConfig::new(self.batching.batch_size, self.batching.concurrency)?,
            target: TargetConfig::new(
                self.target.db_host,
                self.target.db_port,
                self.target.db_name,
                self.target.db_user,
                self.target.db_password,
                self.target.table,
            )?
            .with_connect_timeout(self.target.db_connect_timeout),
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("sftpload")
        .build()
        .merge_env()?;
    let _log_guard = init_logging(&log_config)?;

    let json = cli.json;
    let config = cli.pipeline_config().context("Invalid configuration")?;

    let summary = match pipeline::run(&config).await {
        Ok(summary) => summary,
        Err(e) => {
            if let Some(partial) = e.partial_summary() {
                report(partial, json)?;
            }
            return Err(e).context("Load aborted");
        },
    };

    report(&summary, json)?;

    if !summary.is_complete() {
        anyhow::bail!(
            "{} of {} batches failed to load",
            summary.batches_failed,
            summary.batches_dispatched
        );
    }

    info!(inserted = summary.rows_inserted, skipped = summary.rows_skipped, "Load complete");
    Ok(())
}

/// Log every failed batch and optionally print the summary as JSON
fn report(summary: &LoadSummary, json: bool) -> Result<()> {
    for failure in &summary.failures {
        error!(
            batch = failure.sequence,
            lines = failure.lines,
            error = %failure.error,
            "Batch not loaded"
        );
    }

    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
    }
    Ok(())
}
