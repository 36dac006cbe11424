//! # Deploy Configuration
//!
//! YAML configuration for the stack deployer.
//!
//! A single `deploy.yaml` names the target host, the services and the
//! strategies that may be used to run them. [`parser`] reads and validates
//! it; [`convert`] turns it into the orchestration types.

#![warn(missing_docs)]

use deploy_orchestration::{Artifact, ServiceSpec};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

pub mod convert;
pub mod parser;

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse YAML
    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    /// Environment variables referenced without a default
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),
}

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Configuration version
    pub version: String,

    /// Optional deployment name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Target host
    pub host: HostConfig,

    /// Remote working directory; artifacts, logs and relative paths live here
    #[serde(default = "default_remote_dir")]
    pub remote_dir: String,

    /// Global settings
    #[serde(default)]
    pub settings: Settings,

    /// Probe tuning
    #[serde(default)]
    pub probe: ProbeConfig,

    /// Strategy definitions
    #[serde(default)]
    pub strategies: Strategies,

    /// Services in startup order
    pub services: Vec<ServiceSpec>,

    /// Directory of the file this was read from; relative artifact paths
    /// resolve against it
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

impl Config {
    /// Names of the strategies that are enabled
    pub fn enabled_strategies(&self) -> Vec<&'static str> {
        let mut enabled = Vec::new();
        if self.strategies.containerized.as_ref().is_some_and(|c| c.enabled) {
            enabled.push("containerized");
        }
        if self.strategies.direct_process.as_ref().is_some_and(|d| d.enabled) {
            enabled.push("direct-process");
        }
        enabled
    }
}

/// SSH target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// Hostname or IP address
    pub address: String,

    /// Login user
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// SSH port
    #[serde(default = "default_ssh_port")]
    pub port: u16,

    /// Private key passed with `-i`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity_file: Option<String>,

    /// SSH connect timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,

    /// Directories prepended to the remote `PATH`
    #[serde(default = "default_path_prefix")]
    pub path_prefix: Vec<String>,

    /// Variables exported before every remote command
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Extra `-o` options
    #[serde(default)]
    pub ssh_options: Vec<String>,
}

/// Global settings, in seconds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// Wait between deploy and first probe
    #[serde(default = "default_settle_delay")]
    pub settle_delay: u64,

    /// Bound on a whole run
    #[serde(default = "default_run_deadline")]
    pub run_deadline: u64,

    /// Budget for ordinary remote commands
    #[serde(default = "default_command_timeout")]
    pub command_timeout: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            settle_delay: default_settle_delay(),
            run_deadline: default_run_deadline(),
            command_timeout: default_command_timeout(),
        }
    }
}

/// Probe settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProbeConfig {
    /// Attempts per service
    #[serde(default = "default_attempts")]
    pub attempts: u32,

    /// Seconds between attempts
    #[serde(default = "default_retry_delay")]
    pub retry_delay: u64,

    /// Seconds allowed for one HTTP request
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,

    /// Log lines read per attempt
    #[serde(default = "default_log_tail_lines")]
    pub log_tail_lines: usize,

    /// Host the request targets, as seen from the deployment host
    #[serde(default = "default_probe_host")]
    pub host: String,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            retry_delay: default_retry_delay(),
            request_timeout: default_request_timeout(),
            log_tail_lines: default_log_tail_lines(),
            host: default_probe_host(),
        }
    }
}

/// Strategy definitions; an absent strategy is disabled
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Strategies {
    /// Docker strategy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub containerized: Option<ContainerizedConfig>,

    /// Host process strategy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direct_process: Option<DirectProcessConfig>,
}

/// Docker strategy settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerizedConfig {
    /// Whether the strategy may be used
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Container name
    pub container_name: String,

    /// Image tag
    pub image: String,

    /// Dockerfile, relative to the build context
    #[serde(default = "default_dockerfile")]
    pub dockerfile: String,

    /// Build context on the host
    #[serde(default = "default_build_context")]
    pub build_context: String,

    /// `--restart` policy
    #[serde(default = "default_restart_policy")]
    pub restart_policy: String,

    /// Rebuild even when the image exists
    #[serde(default)]
    pub always_build: bool,

    /// Seconds allowed for `docker build`
    #[serde(default = "default_build_timeout")]
    pub build_timeout: u64,

    /// Container environment
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Volume mounts
    #[serde(default)]
    pub volumes: Vec<String>,

    /// Files shipped before building
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
}

/// Host process strategy settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectProcessConfig {
    /// Whether the strategy may be used
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Dependency install step; `null` skips it
    #[serde(default = "default_install_command")]
    pub install_command: Option<String>,

    /// Seconds allowed for the install step
    #[serde(default = "default_install_timeout")]
    pub install_timeout: u64,

    /// Seconds between service starts
    #[serde(default = "default_inter_service_delay")]
    pub inter_service_delay: u64,

    /// Binaries that must be on the remote `PATH`
    #[serde(default = "default_required_binaries")]
    pub required_binaries: Vec<String>,

    /// Extra patterns killed on teardown
    #[serde(default)]
    pub extra_kill_patterns: Vec<String>,

    /// Files shipped before installing
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
}

fn default_true() -> bool {
    true
}
fn default_remote_dir() -> String {
    "~/app".to_string()
}
fn default_ssh_port() -> u16 {
    22
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_path_prefix() -> Vec<String> {
    vec!["/usr/local/bin".to_string(), "/opt/homebrew/bin".to_string()]
}
fn default_settle_delay() -> u64 {
    15
}
fn default_run_deadline() -> u64 {
    900
}
fn default_command_timeout() -> u64 {
    60
}
fn default_attempts() -> u32 {
    3
}
fn default_retry_delay() -> u64 {
    2
}
fn default_request_timeout() -> u64 {
    5
}
fn default_log_tail_lines() -> usize {
    20
}
fn default_probe_host() -> String {
    "localhost".to_string()
}
fn default_dockerfile() -> String {
    "Dockerfile".to_string()
}
fn default_build_context() -> String {
    ".".to_string()
}
fn default_restart_policy() -> String {
    "unless-stopped".to_string()
}
fn default_build_timeout() -> u64 {
    300
}
fn default_install_command() -> Option<String> {
    Some("npm install".to_string())
}
fn default_install_timeout() -> u64 {
    180
}
fn default_inter_service_delay() -> u64 {
    2
}
fn default_required_binaries() -> Vec<String> {
    vec!["node".to_string()]
}
