//! Remote command execution for single-host deployments
//!
//! This crate provides the transport primitives the deployment orchestrator
//! consumes: running a shell command on the target host with a timeout, and
//! copying files or whole directory trees onto it. The [`RemoteExecutor`] and
//! [`ArtifactTransfer`] traits are the seams; [`SshRemote`] implements both
//! on top of the system `ssh` and `scp` binaries.

#![warn(missing_docs)]

pub mod archive;
pub mod backends;
pub mod command;
pub mod error;
pub mod remote;

pub use backends::ssh::{SshConfig, SshRemote};
pub use command::{Command, quote_remote_path, shell_quote};
pub use error::{Error, Result};
pub use remote::{ArtifactTransfer, ExecOutput, RemoteExecutor};
