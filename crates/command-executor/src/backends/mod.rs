//! Backend implementations for the transport traits
//!
//! `local` runs a process on the controlling machine and captures its
//! output under a deadline; `ssh` builds on it to reach the deployment host
//! through the system OpenSSH client.

pub mod local;
pub mod ssh;

pub use local::run;
pub use ssh::{SshConfig, SshRemote};
