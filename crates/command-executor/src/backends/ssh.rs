//! SSH remote execution backend using the OpenSSH CLI

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::archive;
use crate::backends::local;
use crate::command::{Command, quote_remote_path, shell_quote};
use crate::error::{Error, Result};
use crate::remote::{ArtifactTransfer, ExecOutput, RemoteExecutor};

/// Exit status OpenSSH reserves for its own failures
const SSH_FAILURE_EXIT: i32 = 255;

/// Locale pinned on the local clients so their stderr stays in English
const CLIENT_LOCALE: &str = "C";

/// SSH connection configuration
#[derive(Debug, Clone)]
pub struct SshConfig {
    /// Target host (hostname or IP)
    host: String,
    /// SSH user (optional, uses system default if not specified)
    user: Option<String>,
    /// SSH port (optional, defaults to 22)
    port: Option<u16>,
    /// Path to identity file (private key)
    identity_file: Option<PathBuf>,
    /// Budget for establishing the connection, separate from command timeouts
    connect_timeout: Duration,
    /// Budget for a single `scp` copy
    transfer_timeout: Duration,
    /// Additional `-o` options
    options: Vec<String>,
    /// Directories prepended to the remote PATH
    path_prefix: Vec<String>,
    /// Variables exported before every remote command
    env: BTreeMap<String, String>,
    /// Remote directory every command runs in
    working_dir: Option<String>,
}

impl SshConfig {
    /// Create a new SSH configuration for the given host
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            user: None,
            port: None,
            identity_file: None,
            connect_timeout: Duration::from_secs(10),
            transfer_timeout: Duration::from_secs(300),
            options: Vec::new(),
            path_prefix: Vec::new(),
            env: BTreeMap::new(),
            working_dir: None,
        }
    }

    /// Set the SSH user
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Set the SSH port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set the identity file (private key)
    pub fn with_identity_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.identity_file = Some(path.into());
        self
    }

    /// Set the connect timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the per-copy transfer timeout
    pub fn with_transfer_timeout(mut self, timeout: Duration) -> Self {
        self.transfer_timeout = timeout;
        self
    }

    /// Add an `-o` option such as `StrictHostKeyChecking=accept-new`
    pub fn with_option(mut self, option: impl Into<String>) -> Self {
        self.options.push(option.into());
        self
    }

    /// Prepend a directory to the remote PATH
    ///
    /// Non-interactive shells often miss `/usr/local/bin` or
    /// `/opt/homebrew/bin`, where container runtimes and node live.
    pub fn with_path_prefix(mut self, dir: impl Into<String>) -> Self {
        self.path_prefix.push(dir.into());
        self
    }

    /// Export an environment variable before every remote command
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Run every remote command from this directory, creating it if needed
    pub fn with_working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// The configured host
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The configured remote working directory
    pub fn working_dir(&self) -> Option<&str> {
        self.working_dir.as_deref()
    }

    /// Get the destination string (user@host if user is specified)
    fn destination(&self) -> String {
        if let Some(user) = &self.user {
            format!("{}@{}", user, self.host)
        } else {
            self.host.clone()
        }
    }

    /// Options shared by `ssh` and `scp`
    fn common_args(&self, cmd: &mut Command) {
        cmd.env("LC_ALL", CLIENT_LOCALE);
        cmd.arg("-o").arg("BatchMode=yes");
        cmd.arg("-o")
            .arg(format!("ConnectTimeout={}", self.connect_timeout.as_secs().max(1)));

        if let Some(identity) = &self.identity_file {
            cmd.arg("-i").arg(identity);
        }

        for option in &self.options {
            cmd.arg("-o").arg(option);
        }
    }

    /// Shell prefix applied to every remote command
    fn remote_prefix(&self) -> String {
        let mut prefix = String::new();

        if !self.path_prefix.is_empty() {
            prefix.push_str(&format!("export PATH={}:$PATH && ", self.path_prefix.join(":")));
        }

        for (key, value) in &self.env {
            prefix.push_str(&format!("export {}={} && ", key, shell_quote(value)));
        }

        if let Some(dir) = &self.working_dir {
            let dir = quote_remote_path(dir);
            prefix.push_str(&format!("mkdir -p {dir} && cd {dir} && "));
        }

        prefix
    }

    /// Resolve a remote path against the working directory
    ///
    /// `scp` resolves relative paths from the login directory while commands
    /// run from `working_dir`; resolving here keeps both views identical.
    pub fn resolve_remote(&self, path: &str) -> String {
        match &self.working_dir {
            Some(dir) if !path.starts_with('/') && !path.starts_with('~') => {
                format!("{}/{}", dir.trim_end_matches('/'), path)
            }
            _ => path.to_string(),
        }
    }

    /// Build the `ssh` invocation for a remote command
    pub fn ssh_command(&self, remote_command: &str) -> Command {
        let mut cmd = Command::new("ssh");
        if let Some(port) = self.port {
            cmd.arg("-p").arg(port.to_string());
        }
        self.common_args(&mut cmd);
        cmd.arg(self.destination());
        cmd.arg(format!("{}{}", self.remote_prefix(), remote_command));
        cmd
    }

    /// Build the `scp` invocation copying one local file
    pub fn scp_command(&self, local: &Path, remote: &str) -> Command {
        let mut cmd = Command::new("scp");
        cmd.arg("-q");
        if let Some(port) = self.port {
            cmd.arg("-P").arg(port.to_string());
        }
        self.common_args(&mut cmd);
        cmd.arg(local);
        cmd.arg(format!("{}:{}", self.destination(), self.resolve_remote(remote)));
        cmd
    }
}

/// Remote host reached through the system `ssh` and `scp` clients
#[derive(Debug, Clone)]
pub struct SshRemote {
    config: SshConfig,
}

impl SshRemote {
    /// Create a remote for the given configuration
    pub fn new(config: SshConfig) -> Self {
        Self { config }
    }

    /// Convenience constructor with default settings
    pub fn to_host(host: impl Into<String>) -> Self {
        Self::new(SshConfig::new(host))
    }

    /// The underlying configuration
    pub fn config(&self) -> &SshConfig {
        &self.config
    }

    async fn scp(&self, local: &Path, remote: &str) -> Result<()> {
        let parent = parent_dir(&self.config.resolve_remote(remote));
        if let Some(parent) = parent {
            let mkdir = format!("mkdir -p {}", quote_remote_path(&parent));
            let output = self.execute(&mkdir, self.config.connect_timeout * 3).await?;
            if !output.success() {
                return Err(Error::transfer_failed(
                    local.display().to_string(),
                    remote,
                    output.stderr.trim(),
                ));
            }
        }

        let cmd = self.config.scp_command(local, remote);
        let output = local::run(&cmd, self.config.transfer_timeout).await?;
        if output.success() {
            Ok(())
        } else {
            Err(Error::transfer_failed(
                local.display().to_string(),
                remote,
                output.stderr.trim(),
            ))
        }
    }

    async fn upload_tree(&self, local_dir: &Path, remote_dir: &str) -> Result<()> {
        let staging = tempfile::Builder::new()
            .prefix("deploy-upload-")
            .suffix(".tar.gz")
            .tempfile()?;
        let archive_path = staging.path().to_path_buf();
        let source = local_dir.to_path_buf();

        let packed = smol::unblock(move || archive::pack_dir(&source, &archive_path)).await?;
        debug!("Packed {} files from {}", packed, local_dir.display());

        let remote_archive = format!("{}.upload.tar.gz", remote_dir.trim_end_matches('/'));
        self.scp(staging.path(), &remote_archive).await?;

        let extract = format!(
            "mkdir -p {dir} && tar -xzf {archive} -C {dir} && rm -f {archive}",
            dir = quote_remote_path(&self.config.resolve_remote(remote_dir)),
            archive = quote_remote_path(&self.config.resolve_remote(&remote_archive)),
        );
        let output = self.execute(&extract, self.config.transfer_timeout).await?;
        if !output.success() {
            return Err(Error::transfer_failed(
                local_dir.display().to_string(),
                remote_dir,
                output.stderr.trim(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteExecutor for SshRemote {
    async fn execute(&self, command: &str, timeout: Duration) -> Result<ExecOutput> {
        debug!("[{}] $ {}", self.config.host, command);
        let cmd = self.config.ssh_command(command);

        // The connect phase counts against the command budget too.
        let output = local::run(&cmd, timeout + self.config.connect_timeout).await?;

        if output.exit_code == SSH_FAILURE_EXIT {
            return Err(Error::connection_failed(
                self.config.host.clone(),
                output.stderr.trim(),
            ));
        }
        Ok(output)
    }

    fn host(&self) -> &str {
        &self.config.host
    }
}

#[async_trait]
impl ArtifactTransfer for SshRemote {
    async fn upload(&self, local_path: &Path, remote_path: &str) -> Result<()> {
        let metadata = std::fs::metadata(local_path).map_err(|e| {
            Error::transfer_failed(local_path.display().to_string(), remote_path, e.to_string())
        })?;

        info!(
            "Uploading {} to {}:{}",
            local_path.display(),
            self.config.host,
            remote_path
        );

        if metadata.is_dir() {
            self.upload_tree(local_path, remote_path).await
        } else {
            self.scp(local_path, remote_path).await
        }
    }
}

fn parent_dir(path: &str) -> Option<String> {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) | None => None,
        Some(idx) => Some(trimmed[..idx].to_string()),
    }
}
