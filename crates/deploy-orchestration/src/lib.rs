//! # Deploy orchestration
//!
//! Deploy-and-verify orchestration for a fixed set of services on one
//! remote host.
//!
//! A run tears down whatever was running, deploys with the preferred
//! [`DeploymentStrategy`], waits for the services to settle, probes every
//! service and decides between success, partial success and falling back to
//! the next strategy. The result is always a [`RunReport`], never an error.
//!
//! ## Example
//!
//! ```rust,no_run
//! use command_executor::{SshConfig, SshRemote};
//! use deploy_orchestration::{
//!     ContainerSettings, ContainerizedStrategy, DeploymentOrchestrator, DirectProcessSettings,
//!     DirectProcessStrategy, HealthProber, OrchestratorSettings, ProbeSettings, ServiceRegistry,
//!     ServiceSpec,
//! };
//! use std::sync::Arc;
//!
//! # async fn example() -> deploy_orchestration::Result<()> {
//! let remote = Arc::new(SshRemote::new(
//!     SshConfig::new("10.0.0.5").with_user("deploy").with_working_dir("/srv/app"),
//! ));
//!
//! let registry = ServiceRegistry::new(vec![
//!     ServiceSpec::new("api", 3001, "node server.js", "api.log")
//!         .with_readiness_pattern("listening")
//!         .with_failure_pattern("EADDRINUSE"),
//! ])?;
//!
//! let orchestrator = DeploymentOrchestrator::new(
//!     registry,
//!     vec![
//!         Box::new(ContainerizedStrategy::new(
//!             remote.clone(),
//!             remote.clone(),
//!             ContainerSettings::new("app", "app:latest"),
//!         )),
//!         Box::new(DirectProcessStrategy::new(
//!             remote.clone(),
//!             remote.clone(),
//!             DirectProcessSettings::default(),
//!         )),
//!     ],
//!     HealthProber::new(remote, ProbeSettings::default()),
//!     OrchestratorSettings::default(),
//! );
//!
//! let report = orchestrator.run().await;
//! println!("{:?}: {} services up", report.outcome, report.up_count());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(unsafe_code)]

mod orchestrator;
mod prober;
mod registry;
mod report;
mod status;
mod strategy;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use orchestrator::{DeploymentOrchestrator, OrchestratorSettings, RunState};
pub use prober::{HealthProber, LIVE_STATUS_CODES, ProbeSettings, classify};
pub use registry::{ServiceRegistry, ServiceSpec};
pub use report::{DeploymentAttempt, ErrorKind, Outcome, ReportedError, RunReport};
pub use status::{ServiceState, ServiceStatus};
pub use strategy::{
    Artifact, ContainerSettings, ContainerizedStrategy, DeploymentStrategy,
    DirectProcessSettings, DirectProcessStrategy, LogSource, StrategyKind,
};

use std::time::Duration;

/// Error types for orchestration operations
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The host could not be reached
    #[error("Cannot reach {host}: {reason}")]
    Connect {
        /// Host or local client that failed
        host: String,
        /// Underlying reason
        reason: String,
    },

    /// A required remote command exited with a non-zero status
    #[error("`{command}` exited with status {exit_code}: {stderr}")]
    Execution {
        /// The remote command line
        command: String,
        /// Exit status reported by the remote shell
        exit_code: i32,
        /// Captured standard error
        stderr: String,
    },

    /// Copying an artifact failed
    #[error("Transfer of {path} failed: {reason}")]
    Transfer {
        /// Local path of the artifact
        path: String,
        /// Underlying reason
        reason: String,
    },

    /// No strategy passed its availability check
    #[error("No deployment strategy is available")]
    NoStrategyAvailable,

    /// An operation ran past its budget
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// What was running
        operation: String,
        /// The budget that elapsed
        after: Duration,
    },

    /// Network and log signals still disagreed after every probe attempt
    #[error("Probe of {service} inconclusive: {detail}")]
    ProbeInconclusive {
        /// Service name
        service: String,
        /// What was observed
        detail: String,
    },

    /// Invalid service or strategy configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create an execution error from a failed command
    pub fn execution(command: impl Into<String>, output: &command_executor::ExecOutput) -> Self {
        Self::Execution {
            command: command.into(),
            exit_code: output.exit_code,
            stderr: output.stderr.trim().to_string(),
        }
    }

    /// The reportable kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Connect { .. } => ErrorKind::Connect,
            Error::Execution { .. } => ErrorKind::Execution,
            Error::Transfer { .. } => ErrorKind::Transfer,
            Error::NoStrategyAvailable => ErrorKind::NoStrategyAvailable,
            Error::Timeout { .. } => ErrorKind::Timeout,
            Error::ProbeInconclusive { .. } => ErrorKind::ProbeInconclusive,
            Error::Config(_) => ErrorKind::Config,
        }
    }
}

impl From<command_executor::Error> for Error {
    fn from(err: command_executor::Error) -> Self {
        use command_executor::Error as Transport;

        match err {
            Transport::SshConnectionFailed { host, reason } => Error::Connect { host, reason },
            Transport::SpawnFailed { program, reason } => Error::Connect {
                host: format!("local {program} client"),
                reason,
            },
            Transport::Timeout { command, after } => Error::Timeout {
                operation: format!("`{command}`"),
                after,
            },
            Transport::TransferFailed { local, reason, .. } => Error::Transfer {
                path: local,
                reason,
            },
            Transport::Io(e) => Error::Transfer {
                path: String::from("(staging)"),
                reason: e.to_string(),
            },
        }
    }
}

/// Result type for orchestration operations
pub type Result<T> = std::result::Result<T, Error>;
