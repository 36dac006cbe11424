//! Per-service health state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Health of one service as last observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    /// Never probed
    Unknown,
    /// Logs show readiness but the port does not answer yet
    Starting,
    /// Port answers with a live status code
    Up,
    /// Neither the port nor the logs show life
    Down,
    /// Logs contain a failure pattern
    Failed,
}

impl ServiceState {
    /// Probing stops early once a service reaches this state
    pub fn is_settled(self) -> bool {
        matches!(self, ServiceState::Up | ServiceState::Failed)
    }
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ServiceState::Unknown => "unknown",
            ServiceState::Starting => "starting",
            ServiceState::Up => "up",
            ServiceState::Down => "down",
            ServiceState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Result of probing one service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatus {
    /// Service name
    pub name: String,
    /// Classified state
    pub state: ServiceState,
    /// HTTP status code from the last attempt, if any response arrived
    pub http_status: Option<u16>,
    /// Log lines that drove the classification
    pub last_log_snippet: Vec<String>,
    /// When the last attempt finished
    pub checked_at: DateTime<Utc>,
    /// Number of probe attempts made
    pub attempts: u32,
    /// Still `Starting` after every attempt
    pub inconclusive: bool,
}

impl ServiceStatus {
    /// Status for a service that was never probed
    pub fn unknown(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: ServiceState::Unknown,
            http_status: None,
            last_log_snippet: Vec::new(),
            checked_at: Utc::now(),
            attempts: 0,
            inconclusive: false,
        }
    }

    /// Returns true if the service is up
    pub fn is_up(&self) -> bool {
        self.state == ServiceState::Up
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settled_states() {
        assert!(ServiceState::Up.is_settled());
        assert!(ServiceState::Failed.is_settled());
        assert!(!ServiceState::Starting.is_settled());
        assert!(!ServiceState::Down.is_settled());
        assert!(!ServiceState::Unknown.is_settled());
    }

    #[test]
    fn test_state_serializes_snake_case() {
        let json = serde_json::to_string(&ServiceState::Starting).unwrap();
        assert_eq!(json, "\"starting\"");
        assert_eq!(ServiceState::Down.to_string(), "down");
    }
}
