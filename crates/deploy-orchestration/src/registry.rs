//! Static catalog of the services being deployed

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Declarative description of one service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSpec {
    /// Unique service name
    pub name: String,
    /// TCP port the service listens on
    pub port: u16,
    /// Shell command that starts the service
    pub start_command: String,
    /// Log file written by the service, relative to the remote working directory
    pub log_path: String,
    /// Path requested by the HTTP probe, `/` unless the service exposes a
    /// dedicated endpoint such as `/health`
    #[serde(default = "default_health_path")]
    pub health_path: String,
    /// Log substrings that indicate the service came up
    #[serde(default)]
    pub readiness_patterns: Vec<String>,
    /// Log substrings that indicate the service crashed
    #[serde(default)]
    pub failure_patterns: Vec<String>,
}

impl ServiceSpec {
    /// Create a service with no log patterns
    pub fn new(
        name: impl Into<String>,
        port: u16,
        start_command: impl Into<String>,
        log_path: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            port,
            start_command: start_command.into(),
            log_path: log_path.into(),
            health_path: default_health_path(),
            readiness_patterns: Vec::new(),
            failure_patterns: Vec::new(),
        }
    }

    /// Set the path requested by the HTTP probe
    pub fn with_health_path(mut self, path: impl Into<String>) -> Self {
        self.health_path = path.into();
        self
    }

    /// Add a readiness pattern
    pub fn with_readiness_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.readiness_patterns.push(pattern.into());
        self
    }

    /// Add a failure pattern
    pub fn with_failure_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.failure_patterns.push(pattern.into());
        self
    }
}

fn default_health_path() -> String {
    "/".to_string()
}

/// Validated, ordered set of services
///
/// Order is declaration order and is the order services are started in.
#[derive(Debug, Clone)]
pub struct ServiceRegistry {
    services: Vec<ServiceSpec>,
}

impl ServiceRegistry {
    /// Build a registry, rejecting duplicate names or ports and empty fields
    pub fn new(services: Vec<ServiceSpec>) -> Result<Self> {
        if services.is_empty() {
            return Err(Error::Config("no services declared".to_string()));
        }

        let mut names = HashSet::new();
        let mut ports = HashSet::new();

        for spec in &services {
            if spec.name.trim().is_empty() {
                return Err(Error::Config("service name must not be empty".to_string()));
            }
            if !names.insert(spec.name.as_str()) {
                return Err(Error::Config(format!(
                    "duplicate service name '{}'",
                    spec.name
                )));
            }
            if spec.port == 0 {
                return Err(Error::Config(format!(
                    "service '{}' must declare a non-zero port",
                    spec.name
                )));
            }
            if !ports.insert(spec.port) {
                return Err(Error::Config(format!(
                    "port {} is declared by more than one service",
                    spec.port
                )));
            }
            if spec.start_command.trim().is_empty() {
                return Err(Error::Config(format!(
                    "service '{}' has an empty start command",
                    spec.name
                )));
            }
            if spec.log_path.trim().is_empty() {
                return Err(Error::Config(format!(
                    "service '{}' has an empty log path",
                    spec.name
                )));
            }
            if !spec.health_path.starts_with('/') {
                return Err(Error::Config(format!(
                    "service '{}' health path must start with '/'",
                    spec.name
                )));
            }
        }

        Ok(Self { services })
    }

    /// All services in declaration order
    pub fn list_services(&self) -> &[ServiceSpec] {
        &self.services
    }

    /// Look up a service by name
    pub fn get(&self, name: &str) -> Option<&ServiceSpec> {
        self.services.iter().find(|s| s.name == name)
    }

    /// Number of services
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// Always false for a validated registry
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}
