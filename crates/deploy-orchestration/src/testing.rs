//! Test doubles for the transport and strategy seams
//!
//! Enabled with the `test-utils` feature.

use crate::registry::ServiceSpec;
use crate::strategy::{DeploymentStrategy, LogSource, StrategyKind};
use crate::{Error, Result};
use async_trait::async_trait;
use command_executor::{ArtifactTransfer, ExecOutput, RemoteExecutor};
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Canned response of a [`ScriptedExecutor`]
#[derive(Debug, Clone)]
pub enum Reply {
    /// Command ran and produced this output
    Output(ExecOutput),
    /// Host refused the SSH connection
    ConnectionRefused,
    /// Command ran past its timeout
    Timeout,
    /// Never completes
    Hang,
}

impl Reply {
    /// Exit 0 with `stdout`
    pub fn ok(stdout: impl Into<String>) -> Self {
        Reply::Output(ExecOutput::new(stdout, "", 0))
    }

    /// Exit `code` with `stderr`
    pub fn exit(code: i32, stderr: impl Into<String>) -> Self {
        Reply::Output(ExecOutput::new("", stderr, code))
    }
}

struct Rule {
    pattern: String,
    replies: VecDeque<Reply>,
}

/// Executor answering commands from substring rules
///
/// The first rule whose pattern occurs in the command answers it. A rule
/// with several replies hands them out in order and repeats the last one.
/// Commands matching no rule get the default reply, `Reply::ok("")` unless
/// changed.
pub struct ScriptedExecutor {
    host: String,
    rules: Mutex<Vec<Rule>>,
    default: Reply,
    commands: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    /// Create an executor that answers everything with empty success
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            rules: Mutex::new(Vec::new()),
            default: Reply::ok(""),
            commands: Mutex::new(Vec::new()),
        }
    }

    /// Answer commands containing `pattern` with `reply`
    pub fn on(self, pattern: impl Into<String>, reply: Reply) -> Self {
        self.on_sequence(pattern, vec![reply])
    }

    /// Answer commands containing `pattern` with `replies` in turn
    pub fn on_sequence(self, pattern: impl Into<String>, replies: Vec<Reply>) -> Self {
        self.rules.lock().unwrap().push(Rule {
            pattern: pattern.into(),
            replies: replies.into(),
        });
        self
    }

    /// Reply used when no rule matches
    pub fn with_default(mut self, reply: Reply) -> Self {
        self.default = reply;
        self
    }

    /// Every command executed so far
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    /// Commands containing `pattern`
    pub fn commands_matching(&self, pattern: &str) -> Vec<String> {
        self.commands()
            .into_iter()
            .filter(|c| c.contains(pattern))
            .collect()
    }

    fn reply_for(&self, command: &str) -> Reply {
        let mut rules = self.rules.lock().unwrap();
        for rule in rules.iter_mut() {
            if command.contains(&rule.pattern) {
                return if rule.replies.len() > 1 {
                    rule.replies.pop_front().unwrap()
                } else {
                    rule.replies.front().cloned().unwrap_or(Reply::ok(""))
                };
            }
        }
        self.default.clone()
    }
}

#[async_trait]
impl RemoteExecutor for ScriptedExecutor {
    async fn execute(
        &self,
        command: &str,
        timeout: Duration,
    ) -> command_executor::Result<ExecOutput> {
        self.commands.lock().unwrap().push(command.to_string());

        match self.reply_for(command) {
            Reply::Output(output) => Ok(output),
            Reply::ConnectionRefused => Err(command_executor::Error::connection_failed(
                &self.host,
                "Connection refused",
            )),
            Reply::Timeout => Err(command_executor::Error::Timeout {
                command: command.to_string(),
                after: timeout,
            }),
            Reply::Hang => futures::future::pending().await,
        }
    }

    fn host(&self) -> &str {
        &self.host
    }
}

/// Transfer that records uploads and fails on chosen paths
#[derive(Default)]
pub struct RecordingTransfer {
    failing: HashSet<PathBuf>,
    uploads: Mutex<Vec<(PathBuf, String)>>,
}

impl RecordingTransfer {
    /// Create a transfer where every upload succeeds
    pub fn new() -> Self {
        Self::default()
    }

    /// Make uploads of `local` fail
    pub fn fail_on(mut self, local: impl Into<PathBuf>) -> Self {
        self.failing.insert(local.into());
        self
    }

    /// Uploads attempted so far, failed ones included
    pub fn uploads(&self) -> Vec<(PathBuf, String)> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl ArtifactTransfer for RecordingTransfer {
    async fn upload(&self, local_path: &Path, remote_path: &str) -> command_executor::Result<()> {
        self.uploads
            .lock()
            .unwrap()
            .push((local_path.to_path_buf(), remote_path.to_string()));

        if self.failing.contains(local_path) {
            return Err(command_executor::Error::transfer_failed(
                local_path.display().to_string(),
                remote_path,
                "Permission denied",
            ));
        }
        Ok(())
    }
}

/// Shared, ordered record of strategy calls
#[derive(Debug, Clone, Default)]
pub struct Journal {
    entries: Arc<Mutex<Vec<String>>>,
}

impl Journal {
    /// Create an empty journal
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, entry: String) {
        self.entries.lock().unwrap().push(entry);
    }

    /// Entries in call order, formatted `<kind>:<operation>`
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }

    /// Number of entries equal to `entry`
    pub fn count(&self, entry: &str) -> usize {
        self.entries().iter().filter(|e| *e == entry).count()
    }
}

/// Strategy with scripted availability and deploy results
pub struct MockStrategy {
    kind: StrategyKind,
    available: bool,
    deploy_failure: Option<String>,
    teardown_failure: Option<String>,
    hang_on_deploy: bool,
    log_source: LogSource,
    journal: Journal,
}

impl MockStrategy {
    /// An available strategy whose operations all succeed
    pub fn new(kind: StrategyKind, journal: &Journal) -> Self {
        Self {
            kind,
            available: true,
            deploy_failure: None,
            teardown_failure: None,
            hang_on_deploy: false,
            log_source: LogSource::Host,
            journal: journal.clone(),
        }
    }

    /// Fail the availability check
    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    /// Fail every deploy with an execution error
    pub fn failing_deploy(mut self, stderr: impl Into<String>) -> Self {
        self.deploy_failure = Some(stderr.into());
        self
    }

    /// Fail every teardown with an execution error
    pub fn failing_teardown(mut self, stderr: impl Into<String>) -> Self {
        self.teardown_failure = Some(stderr.into());
        self
    }

    /// Never finish deploying
    pub fn hanging_deploy(mut self) -> Self {
        self.hang_on_deploy = true;
        self
    }

    /// Report `source` as the log source
    pub fn with_log_source(mut self, source: LogSource) -> Self {
        self.log_source = source;
        self
    }

    fn record(&self, operation: &str) {
        self.journal.push(format!("{}:{}", self.kind, operation));
    }
}

fn scripted_failure(operation: &str, stderr: &str) -> Error {
    Error::Execution {
        command: operation.to_string(),
        exit_code: 1,
        stderr: stderr.to_string(),
    }
}

#[async_trait]
impl DeploymentStrategy for MockStrategy {
    fn kind(&self) -> StrategyKind {
        self.kind
    }

    async fn is_available(&self) -> Result<bool> {
        self.record("is_available");
        Ok(self.available)
    }

    async fn teardown(&self, _specs: &[ServiceSpec]) -> Result<()> {
        self.record("teardown");
        match &self.teardown_failure {
            Some(stderr) => Err(scripted_failure("teardown", stderr)),
            None => Ok(()),
        }
    }

    async fn deploy(&self, _specs: &[ServiceSpec]) -> Result<()> {
        self.record("deploy");
        if self.hang_on_deploy {
            futures::future::pending::<()>().await;
        }
        match &self.deploy_failure {
            Some(stderr) => Err(scripted_failure("deploy", stderr)),
            None => Ok(()),
        }
    }

    fn log_source(&self) -> LogSource {
        self.log_source.clone()
    }
}
