//! Deployment strategies
//!
//! A strategy is one self-contained way of bringing the whole service set up
//! and down on the host. The orchestrator tries them in [`StrategyKind`]
//! order.

mod containerized;
mod direct;

pub use containerized::{ContainerSettings, ContainerizedStrategy};
pub use direct::{DirectProcessSettings, DirectProcessStrategy};

use crate::registry::ServiceSpec;
use crate::{Error, Result};
use async_trait::async_trait;
use command_executor::{ArtifactTransfer, ExecOutput, RemoteExecutor, shell_quote};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Strategy variants, in preference order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// All services inside one Docker container
    Containerized,
    /// Each service as a detached host process
    DirectProcess,
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StrategyKind::Containerized => f.write_str("containerized"),
            StrategyKind::DirectProcess => f.write_str("direct-process"),
        }
    }
}

/// Where a strategy's services write their logs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogSource {
    /// Files on the host, relative to the remote working directory
    Host,
    /// Files inside a running container
    Container {
        /// Container name
        name: String,
    },
}

impl LogSource {
    /// Remote command printing the last `lines` lines of `log_path`
    pub fn tail_command(&self, log_path: &str, lines: usize) -> String {
        let tail = format!("tail -n {} {} 2>/dev/null", lines, shell_quote(log_path));
        match self {
            LogSource::Host => tail,
            LogSource::Container { name } => format!("docker exec {} {}", shell_quote(name), tail),
        }
    }
}

/// A local file or directory shipped to the host before deploying
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Local source path
    pub local: PathBuf,
    /// Destination, relative to the remote working directory unless absolute
    pub remote: String,
    /// Whether a failed upload aborts the deploy
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}

impl Artifact {
    /// A required artifact
    pub fn required(local: impl Into<PathBuf>, remote: impl Into<String>) -> Self {
        Self {
            local: local.into(),
            remote: remote.into(),
            required: true,
        }
    }

    /// An artifact whose upload failure is only logged
    pub fn optional(local: impl Into<PathBuf>, remote: impl Into<String>) -> Self {
        Self {
            local: local.into(),
            remote: remote.into(),
            required: false,
        }
    }
}

/// One way of bringing the service set up and down
#[async_trait]
pub trait DeploymentStrategy: Send + Sync {
    /// Which variant this is
    fn kind(&self) -> StrategyKind;

    /// Fast pre-check that the strategy can run on the host
    ///
    /// `Ok(false)` means the host answered and lacks what the strategy
    /// needs. A host that cannot be reached is an error, not `false`.
    async fn is_available(&self) -> Result<bool>;

    /// Stop whatever this strategy previously started
    ///
    /// Idempotent: nothing running is not an error.
    async fn teardown(&self, specs: &[ServiceSpec]) -> Result<()>;

    /// Ship artifacts and start every service
    async fn deploy(&self, specs: &[ServiceSpec]) -> Result<()>;

    /// Where the prober should read this strategy's logs
    fn log_source(&self) -> LogSource;
}

/// Upload every artifact, failing on the first required one that fails
pub(crate) async fn upload_artifacts(
    transfer: &dyn ArtifactTransfer,
    artifacts: &[Artifact],
) -> Result<()> {
    for artifact in artifacts {
        info!(
            "Uploading {} -> {}",
            artifact.local.display(),
            artifact.remote
        );
        match transfer.upload(&artifact.local, &artifact.remote).await {
            Ok(()) => {}
            Err(e) if !artifact.required => {
                warn!(
                    "Skipping optional artifact {}: {}",
                    artifact.local.display(),
                    e
                );
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// Run a command that must exit with status 0
pub(crate) async fn run_required(
    executor: &dyn RemoteExecutor,
    command: &str,
    timeout: Duration,
) -> Result<ExecOutput> {
    debug!("[{}] $ {}", executor.host(), command);
    let output = executor.execute(command, timeout).await?;
    if output.success() {
        Ok(output)
    } else {
        Err(Error::execution(command, &output))
    }
}

/// Join words into a command line, quoting each
pub(crate) fn shell_line<I, S>(words: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    words
        .into_iter()
        .map(|w| shell_quote(w.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}
