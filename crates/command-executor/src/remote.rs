//! Transport traits consumed by the orchestrator

use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

/// Captured result of a remote command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    /// Standard output
    pub stdout: String,
    /// Standard error
    pub stderr: String,
    /// Exit status; -1 when the process was terminated by a signal
    pub exit_code: i32,
}

impl ExecOutput {
    /// Create an output record
    pub fn new(stdout: impl Into<String>, stderr: impl Into<String>, exit_code: i32) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_code,
        }
    }

    /// Returns true if the command exited with status 0
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs shell commands on the deployment host
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Execute `command` through the remote shell, killing it after `timeout`
    ///
    /// A non-zero exit status is not an error at this level; callers decide
    /// which steps are required.
    async fn execute(&self, command: &str, timeout: Duration) -> Result<ExecOutput>;

    /// Host name used in logs and error messages
    fn host(&self) -> &str;
}

/// Copies local artifacts onto the deployment host
#[async_trait]
pub trait ArtifactTransfer: Send + Sync {
    /// Upload a file or a whole directory tree to `remote_path`
    ///
    /// Directories are shipped as a compressed archive and unpacked into
    /// `remote_path`, which is created when missing.
    async fn upload(&self, local_path: &Path, remote_path: &str) -> Result<()>;
}
