//! Run configuration
//!
//! Plain validated structs for the transport, batching and target groups.
//! Schema options live next to the resolver in [`crate::schema`].

use serde::{Deserialize, Serialize};
use sqlx::postgres::PgConnectOptions;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{IngestError, Result};

// ============================================================================
// Defaults
// ============================================================================

/// Default SSH port for SFTP sessions.
pub const DEFAULT_SFTP_PORT: u16 = 22;

/// Default control port for FTP sessions.
pub const DEFAULT_FTP_PORT: u16 = 21;

/// Default PostgreSQL port.
pub const DEFAULT_DATABASE_PORT: u16 = 5432;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default rows per batch.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Default number of concurrently executing loads.
pub const DEFAULT_CONCURRENCY: usize = 4;

// ============================================================================
// Transport
// ============================================================================

/// File-transfer protocol used to reach the remote file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Sftp,
    Ftp,
}

impl Protocol {
    pub fn default_port(self) -> u16 {
        match self {
            Protocol::Sftp => DEFAULT_SFTP_PORT,
            Protocol::Ftp => DEFAULT_FTP_PORT,
        }
    }
}

impl std::str::FromStr for Protocol {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "sftp" | "ssh" => Ok(Protocol::Sftp),
            "ftp" => Ok(Protocol::Ftp),
            _ => Err(IngestError::config(format!("Unknown protocol: {}", s))),
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Sftp => write!(f, "sftp"),
            Protocol::Ftp => write!(f, "ftp"),
        }
    }
}

/// How the remote session authenticates
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Credential {
    Password(String),
    PrivateKey {
        path: PathBuf,
        passphrase: Option<String>,
    },
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::Password(_) => f.write_str("Password(***)"),
            Credential::PrivateKey { path, .. } => {
                f.debug_struct("PrivateKey").field("path", path).finish_non_exhaustive()
            },
        }
    }
}

/// Remote session parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    pub protocol: Protocol,
    pub host: String,
    pub port: u16,
    pub username: String,
    #[serde(skip_serializing)]
    pub credential: Credential,
    pub remote_path: String,
}

impl TransportConfig {
    pub fn new(
        protocol: Protocol,
        host: impl Into<String>,
        port: Option<u16>,
        username: impl Into<String>,
        credential: Credential,
        remote_path: impl Into<String>,
    ) -> Result<Self> {
        let config = Self {
            protocol,
            host: host.into(),
            port: port.unwrap_or_else(|| protocol.default_port()),
            username: username.into(),
            credential,
            remote_path: remote_path.into(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(IngestError::config("Remote host cannot be empty"));
        }
        if self.port == 0 {
            return Err(IngestError::config("Remote port must be greater than 0"));
        }
        if self.username.is_empty() {
            return Err(IngestError::config("Remote username cannot be empty"));
        }
        if self.remote_path.trim().is_empty() {
            return Err(IngestError::config("Remote path cannot be empty"));
        }
        let key_auth = matches!(self.credential, Credential::PrivateKey { .. });
        if self.protocol == Protocol::Ftp && key_auth {
            return Err(IngestError::config(
                "FTP sessions authenticate with a password, not a private key",
            ));
        }
        Ok(())
    }

    /// `host:port` for socket connects
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// ============================================================================
// Batching
// ============================================================================

/// Batch partitioning and load parallelism
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Non-blank rows per batch
    pub batch_size: usize,
    /// Maximum simultaneously executing loads
    pub concurrency: usize,
}

impl BatchConfig {
    pub fn new(batch_size: usize, concurrency: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(IngestError::config("batch_size must be greater than 0"));
        }
        if concurrency == 0 {
            return Err(IngestError::config("concurrency must be greater than 0"));
        }
        Ok(Self {
            batch_size,
            concurrency,
        })
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

// ============================================================================
// Target
// ============================================================================

/// Destination database and table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    #[serde(skip_serializing)]
    pub password: String,
    /// Table name, optionally schema-qualified (`schema.table`)
    pub table: String,
    pub connect_timeout_secs: u64,
}

impl TargetConfig {
    pub fn new(
        host: impl Into<String>,
        port: Option<u16>,
        database: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
        table: impl Into<String>,
    ) -> Result<Self> {
        let config = Self {
            host: host.into(),
            port: port.unwrap_or(DEFAULT_DATABASE_PORT),
            database: database.into(),
            user: user.into(),
            password: password.into(),
            table: table.into(),
            connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_connect_timeout(mut self, secs: u64) -> Self {
        self.connect_timeout_secs = secs;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(IngestError::config("Database host cannot be empty"));
        }
        if self.database.trim().is_empty() {
            return Err(IngestError::config("Database name cannot be empty"));
        }
        if self.user.is_empty() {
            return Err(IngestError::config("Database user cannot be empty"));
        }
        if self.table.split('.').any(|part| part.trim().is_empty()) {
            return Err(IngestError::config(format!(
                "Invalid target table name: '{}'",
                self.table
            )));
        }
        Ok(())
    }

    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.database)
            .username(&self.user)
            .password(&self.password)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn password() -> Credential {
        Credential::Password("secret".to_string())
    }

    #[test]
    fn test_transport_default_ports() {
        let sftp =
            TransportConfig::new(Protocol::Sftp, "files", None, "etl", password(), "/in.csv")
                .unwrap();
        assert_eq!(sftp.port, 22);
        assert_eq!(sftp.address(), "files:22");

        let ftp =
            TransportConfig::new(Protocol::Ftp, "files", None, "etl", password(), "/in.csv")
                .unwrap();
        assert_eq!(ftp.port, 21);
    }

    #[test]
    fn test_ftp_rejects_private_key() {
        let key = Credential::PrivateKey {
            path: PathBuf::from("/home/etl/.ssh/id_rsa"),
            passphrase: None,
        };
        let err = TransportConfig::new(Protocol::Ftp, "files", None, "etl", key, "/in.csv")
            .unwrap_err();
        assert!(matches!(err, IngestError::Configuration(_)));
    }

    #[test]
    fn test_transport_requires_path() {
        let err = TransportConfig::new(Protocol::Sftp, "files", None, "etl", password(), " ")
            .unwrap_err();
        assert!(matches!(err, IngestError::Configuration(_)));
    }

    #[test]
    fn test_credential_debug_hides_secret() {
        let rendered = format!("{:?}", password());
        assert!(!rendered.contains("secret"));
    }

    #[test]
    fn test_batch_config_rejects_zero() {
        assert!(BatchConfig::new(0, 1).is_err());
        assert!(BatchConfig::new(1, 0).is_err());
        assert_eq!(
            BatchConfig::new(10, 2).unwrap(),
            BatchConfig {
                batch_size: 10,
                concurrency: 2
            }
        );
    }

    #[test]
    fn test_target_table_validation() {
        assert!(TargetConfig::new("db", None, "warehouse", "etl", "pw", "public.events").is_ok());
        assert!(TargetConfig::new("db", None, "warehouse", "etl", "pw", "public.").is_err());
        assert!(TargetConfig::new("db", None, "warehouse", "etl", "pw", "").is_err());
    }

    #[test]
    fn test_target_serialization_skips_password() {
        let target =
            TargetConfig::new("db", Some(6543), "warehouse", "etl", "hunter2", "events").unwrap();
        let json = serde_json::to_string(&target).unwrap();
        assert!(!json.contains("hunter2"));
        assert!(json.contains("6543"));
    }

    #[test]
    fn test_protocol_from_str() {
        assert_eq!("SFTP".parse::<Protocol>().unwrap(), Protocol::Sftp);
        assert_eq!("ftp".parse::<Protocol>().unwrap(), Protocol::Ftp);
        assert!("scp".parse::<Protocol>().is_err());
    }
}
