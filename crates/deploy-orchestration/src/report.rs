//! Run and attempt reports

use crate::orchestrator::RunState;
use crate::status::{ServiceState, ServiceStatus};
use crate::strategy::StrategyKind;
use crate::Error;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Result of an attempt or a whole run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Not decided yet
    Pending,
    /// Every service is up
    Succeeded,
    /// At least one service is up, but not all
    PartialSuccess,
    /// No service is up, or the run aborted
    Failed,
}

impl Outcome {
    /// Classify by how many of `total` services are up
    pub fn from_counts(up: usize, total: usize) -> Self {
        if total > 0 && up == total {
            Outcome::Succeeded
        } else if up > 0 {
            Outcome::PartialSuccess
        } else {
            Outcome::Failed
        }
    }

    /// Returns true for `Succeeded` and `PartialSuccess`
    pub fn is_success(self) -> bool {
        matches!(self, Outcome::Succeeded | Outcome::PartialSuccess)
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Outcome::Pending => "pending",
            Outcome::Succeeded => "succeeded",
            Outcome::PartialSuccess => "partial success",
            Outcome::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Serializable error category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Host unreachable
    Connect,
    /// Required command failed
    Execution,
    /// Artifact copy failed
    Transfer,
    /// No strategy was available
    NoStrategyAvailable,
    /// Budget exceeded
    Timeout,
    /// Probe never converged
    ProbeInconclusive,
    /// Invalid configuration
    Config,
}

/// An error as it appears in a report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportedError {
    /// Category
    pub kind: ErrorKind,
    /// Rendered message
    pub message: String,
}

impl From<&Error> for ReportedError {
    fn from(err: &Error) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl From<Error> for ReportedError {
    fn from(err: Error) -> Self {
        Self::from(&err)
    }
}

/// One strategy's try at deploying the registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentAttempt {
    /// Strategy used
    pub strategy_kind: StrategyKind,
    /// When teardown started
    pub started_at: DateTime<Utc>,
    /// When the attempt was decided
    pub finished_at: Option<DateTime<Utc>>,
    /// Attempt result
    pub outcome: Outcome,
    /// Statuses from the probe phase, in registry order
    pub statuses: Vec<ServiceStatus>,
    /// Errors hit during this attempt, including ignored teardown errors
    pub errors: Vec<ReportedError>,
}

impl DeploymentAttempt {
    /// Start a new pending attempt
    pub fn new(strategy_kind: StrategyKind) -> Self {
        Self {
            strategy_kind,
            started_at: Utc::now(),
            finished_at: None,
            outcome: Outcome::Pending,
            statuses: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Number of services reported up
    pub fn up_count(&self) -> usize {
        self.statuses.iter().filter(|s| s.is_up()).count()
    }

    pub(crate) fn finish(&mut self, outcome: Outcome) {
        self.outcome = outcome;
        self.finished_at = Some(Utc::now());
    }
}

/// Everything a run did and found
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Strategy of the last attempt, if any was made
    pub final_strategy: Option<StrategyKind>,
    /// Overall result
    pub outcome: Outcome,
    /// Last known status of every registered service, in registry order
    pub services: IndexMap<String, ServiceStatus>,
    /// Attempts in the order they were made
    pub attempts: Vec<DeploymentAttempt>,
    /// State machine path taken
    pub transitions: Vec<RunState>,
    /// Error that ended the run, if one did
    pub error: Option<ReportedError>,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// When the run ended
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    /// Number of services up in the final status map
    pub fn up_count(&self) -> usize {
        self.services.values().filter(|s| s.is_up()).count()
    }

    /// Names of services in the given state
    pub fn services_in(&self, state: ServiceState) -> Vec<&str> {
        self.services
            .values()
            .filter(|s| s.state == state)
            .map(|s| s.name.as_str())
            .collect()
    }
}
