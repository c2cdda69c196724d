//! Error types for the ingestion pipeline

use thiserror::Error;

use crate::summary::LoadSummary;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Fatal errors that abort a whole run
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Database connection error: {0}")]
    Connection(#[source] sqlx::Error),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// The source failed after loading started; `summary` holds the outcome
    /// of every batch dispatched before that point
    #[error("Run interrupted after {} batches: {source}", .summary.batches_dispatched)]
    Interrupted {
        #[source]
        source: Box<IngestError>,
        summary: Box<LoadSummary>,
    },
}

impl IngestError {
    pub fn config(message: impl Into<String>) -> Self {
        IngestError::Configuration(message.into())
    }

    pub fn transport<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        IngestError::Transport {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn transport_msg(message: impl Into<String>) -> Self {
        IngestError::Transport {
            message: message.into(),
            source: None,
        }
    }

    pub fn interrupted(source: IngestError, summary: LoadSummary) -> Self {
        IngestError::Interrupted {
            source: Box::new(source),
            summary: Box::new(summary),
        }
    }

    /// Outcomes of the batches loaded before a mid-stream failure
    pub fn partial_summary(&self) -> Option<&LoadSummary> {
        match self {
            IngestError::Interrupted { summary, .. } => Some(summary.as_ref()),
            _ => None,
        }
    }
}

/// Failure of a single batch load; never aborts sibling batches
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("line {line} has {actual} fields, header has {expected}")]
    FieldCount {
        line: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Load task aborted: {0}")]
    Aborted(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = IngestError::transport("Failed to open /data/in.csv", io);

        assert_eq!(err.to_string(), "Transport error: Failed to open /data/in.csv");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_interrupted_error_carries_summary() {
        let summary = LoadSummary {
            batches_dispatched: 2,
            batches_succeeded: 2,
            ..Default::default()
        };
        let err = IngestError::interrupted(
            IngestError::transport_msg("Failed to read remote file"),
            summary,
        );

        assert_eq!(
            err.to_string(),
            "Run interrupted after 2 batches: Transport error: Failed to read remote file"
        );
        assert_eq!(err.partial_summary().map(|s| s.batches_succeeded), Some(2));
        assert!(IngestError::config("bad").partial_summary().is_none());
    }

    #[test]
    fn test_field_count_message() {
        let err = LoadError::FieldCount {
            line: 2,
            expected: 3,
            actual: 4,
        };
        assert_eq!(err.to_string(), "line 2 has 4 fields, header has 3");
    }
}
