//! Error types for remote execution and transfer

use std::time::Duration;
use thiserror::Error;

/// Unified error type for the transport layer
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to spawn the local `ssh`/`scp` process
    #[error("failed to spawn {program}: {reason}")]
    SpawnFailed {
        /// The program that could not be started
        program: String,
        /// The reason for the spawn failure
        reason: String,
    },

    /// SSH could not reach or authenticate against the host
    #[error("SSH connection failed to {host}: {reason}")]
    SshConnectionFailed {
        /// The hostname or IP address that failed to connect
        host: String,
        /// The detailed reason for the connection failure
        reason: String,
    },

    /// The command did not finish within its budget and was killed
    #[error("command timed out after {after:?}: {command}")]
    Timeout {
        /// The command line that was running
        command: String,
        /// The budget that elapsed
        after: Duration,
    },

    /// Copying an artifact to the host failed
    #[error("transfer of {local} to {remote} failed: {reason}")]
    TransferFailed {
        /// Local source path
        local: String,
        /// Remote destination path
        remote: String,
        /// The detailed reason for the failure
        reason: String,
    },

    /// I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a spawn failed error
    pub fn spawn_failed(program: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SpawnFailed {
            program: program.into(),
            reason: reason.into(),
        }
    }

    /// Create a connection failed error
    pub fn connection_failed(host: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SshConnectionFailed {
            host: host.into(),
            reason: reason.into(),
        }
    }

    /// Create a transfer failed error
    pub fn transfer_failed(
        local: impl Into<String>,
        remote: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::TransferFailed {
            local: local.into(),
            remote: remote.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if the error is a timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }

    /// Returns true if the host could not be reached
    pub fn is_connection(&self) -> bool {
        matches!(self, Error::SshConnectionFailed { .. })
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
