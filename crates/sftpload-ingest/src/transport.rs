//! Remote file sessions
//!
//! Opens the configured remote path over SFTP (`ssh2`) or FTP (`suppaftp`) and
//! hands back a blocking [`Read`] handle. Run these calls on the blocking pool
//! (`tokio::task::spawn_blocking`), never on an async worker thread.
//!
//! SFTP reads stream straight from the server. FTP retrieves the file into
//! memory first and closes the control session before the first read.

use std::io::{self, Cursor, Read};
use std::net::TcpStream;
use std::path::Path;

use ssh2::Session;
use suppaftp::FtpStream;
use tracing::{debug, info, warn};

use crate::config::{Credential, Protocol, TransportConfig};
use crate::error::{IngestError, Result};

/// Readable handle on one remote file; the session closes when it is dropped
pub struct RemoteFile {
    path: String,
    reader: RemoteReader,
}

enum RemoteReader {
    Sftp {
        file: Option<ssh2::File>,
        session: Session,
    },
    Ftp(Cursor<Vec<u8>>),
}

impl RemoteFile {
    /// Connect, authenticate and open `config.remote_path` for reading
    pub fn open(config: &TransportConfig) -> Result<Self> {
        info!(
            protocol = %config.protocol,
            host = %config.host,
            port = config.port,
            path = %config.remote_path,
            "Opening remote file"
        );

        let reader = match config.protocol {
            Protocol::Sftp => open_sftp(config)?,
            Protocol::Ftp => open_ftp(config)?,
        };

        Ok(Self {
            path: config.remote_path.clone(),
            reader,
        })
    }
}

impl Read for RemoteFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.reader {
            RemoteReader::Sftp { file: Some(file), .. } => file.read(buf),
            RemoteReader::Sftp { file: None, .. } => Ok(0),
            RemoteReader::Ftp(cursor) => cursor.read(buf),
        }
    }
}

impl Drop for RemoteFile {
    fn drop(&mut self) {
        if let RemoteReader::Sftp { file, session } = &mut self.reader {
            // Close the remote handle before tearing down the session under it
            drop(file.take());
            if let Err(e) = session.disconnect(None, "transfer complete", None) {
                warn!(path = %self.path, error = %e, "Failed to close SFTP session gracefully");
            } else {
                debug!(path = %self.path, "SFTP session closed");
            }
        }
    }
}

fn open_sftp(config: &TransportConfig) -> Result<RemoteReader> {
    debug!("Connecting to SSH server: {}", config.address());
    let tcp = TcpStream::connect(config.address()).map_err(|e| {
        IngestError::transport(format!("Failed to connect to {}", config.address()), e)
    })?;

    let mut session =
        Session::new().map_err(|e| IngestError::transport("Failed to create SSH session", e))?;
    session.set_tcp_stream(tcp);
    session
        .handshake()
        .map_err(|e| IngestError::transport("SSH handshake failed", e))?;

    debug!("Authenticating as: {}", config.username);
    let auth = match &config.credential {
        Credential::Password(password) => session.userauth_password(&config.username, password),
        Credential::PrivateKey { path, passphrase } => session.userauth_pubkey_file(
            &config.username,
            None,
            path,
            passphrase.as_deref(),
        ),
    };
    auth.map_err(|e| {
        IngestError::transport(format!("Authentication failed for user {}", config.username), e)
    })?;

    if !session.authenticated() {
        return Err(IngestError::transport_msg(format!(
            "Server did not accept credentials for user {}",
            config.username
        )));
    }

    let sftp = session
        .sftp()
        .map_err(|e| IngestError::transport("Failed to start SFTP subsystem", e))?;
    let file = sftp.open(Path::new(&config.remote_path)).map_err(|e| {
        IngestError::transport(format!("Failed to open remote file {}", config.remote_path), e)
    })?;

    Ok(RemoteReader::Sftp {
        file: Some(file),
        session,
    })
}

fn open_ftp(config: &TransportConfig) -> Result<RemoteReader> {
    let Credential::Password(password) = &config.credential else {
        return Err(IngestError::config(
            "FTP sessions authenticate with a password, not a private key",
        ));
    };

    debug!("Connecting to FTP server: {}", config.address());
    let mut ftp = FtpStream::connect(config.address()).map_err(|e| {
        IngestError::transport(format!("Failed to connect to {}", config.address()), e)
    })?;

    // Extended passive mode behaves better behind NAT
    ftp.set_mode(suppaftp::Mode::ExtendedPassive);

    debug!("Logging in as: {}", config.username);
    ftp.login(&config.username, password).map_err(|e| {
        IngestError::transport(format!("FTP login failed for user {}", config.username), e)
    })?;

    ftp.transfer_type(suppaftp::types::FileType::Binary)
        .map_err(|e| IngestError::transport("Failed to set binary mode", e))?;

    let buffer = ftp.retr_as_buffer(&config.remote_path).map_err(|e| {
        IngestError::transport(format!("Failed to download {}", config.remote_path), e)
    })?;

    debug!(
        bytes = buffer.get_ref().len(),
        path = %config.remote_path,
        "Retrieved remote file"
    );

    if let Err(e) = ftp.quit() {
        warn!("Failed to quit FTP session gracefully: {}", e);
    }

    Ok(RemoteReader::Ftp(buffer))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn unreachable_config(protocol: Protocol) -> TransportConfig {
        // Port 1 (tcpmux) is closed on any sane test host
        TransportConfig::new(
            protocol,
            "127.0.0.1",
            Some(1),
            "etl",
            Credential::Password("secret".to_string()),
            "/data/in.csv",
        )
        .unwrap()
    }

    #[test]
    fn test_sftp_unreachable_host_is_transport_error() {
        let err = RemoteFile::open(&unreachable_config(Protocol::Sftp)).err().unwrap();
        assert!(matches!(err, IngestError::Transport { .. }), "got {err:?}");
    }

    #[test]
    fn test_ftp_unreachable_host_is_transport_error() {
        let err = RemoteFile::open(&unreachable_config(Protocol::Ftp)).err().unwrap();
        assert!(matches!(err, IngestError::Transport { .. }), "got {err:?}");
    }
}
