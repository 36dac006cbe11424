//! The deploy-and-verify state machine

use crate::prober::HealthProber;
use crate::registry::{ServiceRegistry, ServiceSpec};
use crate::report::{DeploymentAttempt, Outcome, ReportedError, RunReport};
use crate::status::ServiceStatus;
use crate::strategy::{DeploymentStrategy, StrategyKind};
use crate::{Error, Result};
use async_runtime_compat::prelude::{sleep, timeout};
use chrono::Utc;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Orchestrator settings
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Wait between a successful deploy and the first probe
    pub settle_delay: Duration,

    /// Bound on the whole run, availability checks included
    pub run_deadline: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_secs(15),
            run_deadline: Duration::from_secs(15 * 60),
        }
    }
}

/// Orchestrator state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Nothing chosen yet
    Idle,

    /// A strategy passed its availability check
    StrategySelected(StrategyKind),

    /// Stopping previous instances
    TearingDown,

    /// Shipping artifacts and starting services
    Deploying,

    /// Probing every service
    Probing,

    /// Deciding on the probe results
    Evaluating,

    /// At least one service is up
    ///
    /// Reached by partial success too; the attempt's [`Outcome`] tells
    /// whether every service is up.
    Succeeded,

    /// Moving on to the next strategy
    FallingBack,

    /// The run ended without any service up
    Failed,
}

impl RunState {
    /// Returns true for `Succeeded` and `Failed`
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Succeeded | RunState::Failed)
    }

    /// Whether `next` is a legal successor of this state
    pub fn can_transition_to(&self, next: &RunState) -> bool {
        match (self, next) {
            (state, RunState::Failed) => !state.is_terminal(),
            (RunState::Idle, RunState::StrategySelected(_)) => true,
            (RunState::StrategySelected(_), RunState::TearingDown) => true,
            (RunState::TearingDown, RunState::Deploying) => true,
            (RunState::Deploying, RunState::Probing) => true,
            (RunState::Deploying, RunState::FallingBack) => true,
            (RunState::Probing, RunState::Evaluating) => true,
            (RunState::Evaluating, RunState::Succeeded) => true,
            (RunState::Evaluating, RunState::FallingBack) => true,
            (RunState::FallingBack, RunState::StrategySelected(_)) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunState::Idle => f.write_str("idle"),
            RunState::StrategySelected(kind) => write!(f, "selected {kind}"),
            RunState::TearingDown => f.write_str("tearing down"),
            RunState::Deploying => f.write_str("deploying"),
            RunState::Probing => f.write_str("probing"),
            RunState::Evaluating => f.write_str("evaluating"),
            RunState::Succeeded => f.write_str("succeeded"),
            RunState::FallingBack => f.write_str("falling back"),
            RunState::Failed => f.write_str("failed"),
        }
    }
}

/// Mutable record of a run in progress
struct RunLog {
    state: RunState,
    transitions: Vec<RunState>,
    attempts: Vec<DeploymentAttempt>,
    services: IndexMap<String, ServiceStatus>,
}

impl RunLog {
    fn new(specs: &[ServiceSpec]) -> Self {
        Self {
            state: RunState::Idle,
            transitions: vec![RunState::Idle],
            attempts: Vec::new(),
            services: specs
                .iter()
                .map(|s| (s.name.clone(), ServiceStatus::unknown(&s.name)))
                .collect(),
        }
    }

    fn transition(&mut self, next: RunState) {
        if !self.state.can_transition_to(&next) {
            warn!("Unexpected transition {} -> {}", self.state, next);
        }
        info!("State: {} -> {}", self.state, next);
        self.state = next;
        self.transitions.push(next);
    }

    fn record_error(&mut self, err: &Error) {
        if let Some(attempt) = self.attempts.last_mut() {
            attempt.errors.push(ReportedError::from(err));
        }
    }

    fn finish_attempt(&mut self, outcome: Outcome) {
        if let Some(attempt) = self
            .attempts
            .last_mut()
            .filter(|a| a.outcome == Outcome::Pending)
        {
            attempt.finish(outcome);
        }
    }
}

/// Outer bound shared by every awaited step of a run
struct Deadline {
    at: Instant,
    budget: Duration,
}

impl Deadline {
    fn new(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
            budget,
        }
    }

    async fn bound<F: Future>(&self, operation: &str, future: F) -> Result<F::Output> {
        let remaining = self.at.saturating_duration_since(Instant::now());
        timeout(remaining, future).await.map_err(|_| Error::Timeout {
            operation: format!("run deadline during {operation}"),
            after: self.budget,
        })
    }
}

/// Drives strategies through teardown, deploy, probe and fallback
pub struct DeploymentOrchestrator {
    registry: ServiceRegistry,
    strategies: Vec<Box<dyn DeploymentStrategy>>,
    prober: HealthProber,
    settings: OrchestratorSettings,
}

impl DeploymentOrchestrator {
    /// Create a new orchestrator
    ///
    /// Strategies are tried in preference order whatever order they are
    /// given in.
    pub fn new(
        registry: ServiceRegistry,
        mut strategies: Vec<Box<dyn DeploymentStrategy>>,
        prober: HealthProber,
        settings: OrchestratorSettings,
    ) -> Self {
        strategies.sort_by_key(|s| s.kind());
        Self {
            registry,
            strategies,
            prober,
            settings,
        }
    }

    /// Strategy kinds in the order they will be tried
    pub fn strategy_order(&self) -> Vec<StrategyKind> {
        self.strategies.iter().map(|s| s.kind()).collect()
    }

    /// Execute one run and report on it
    pub async fn run(self) -> RunReport {
        let started_at = Utc::now();
        let specs = self.registry.list_services();
        let deadline = Deadline::new(self.settings.run_deadline);
        let mut run = RunLog::new(specs);

        info!(
            "Deploying {} services with strategies {:?}",
            specs.len(),
            self.strategy_order()
        );

        let error = match self.drive(&mut run, &deadline).await {
            Ok(()) => None,
            Err(e) => {
                error!("Run failed: {}", e);
                run.record_error(&e);
                run.finish_attempt(Outcome::Failed);
                if run.state != RunState::Failed {
                    run.transition(RunState::Failed);
                }
                Some(ReportedError::from(&e))
            }
        };

        let outcome = match (run.state, run.attempts.last()) {
            (RunState::Succeeded, Some(attempt)) => attempt.outcome,
            _ => Outcome::Failed,
        };
        info!("Run finished: {}", outcome);

        RunReport {
            final_strategy: run.attempts.last().map(|a| a.strategy_kind),
            outcome,
            services: run.services,
            attempts: run.attempts,
            transitions: run.transitions,
            error,
            started_at,
            finished_at: Utc::now(),
        }
    }

    async fn drive(&self, run: &mut RunLog, deadline: &Deadline) -> Result<()> {
        let specs = self.registry.list_services();
        let mut cursor = 0;

        let Some(mut current) = self.next_available(&mut cursor, deadline).await? else {
            return Err(Error::NoStrategyAvailable);
        };

        loop {
            let strategy = &self.strategies[current];
            let kind = strategy.kind();

            run.transition(RunState::StrategySelected(kind));
            run.attempts.push(DeploymentAttempt::new(kind));

            run.transition(RunState::TearingDown);
            if let Err(e) = deadline.bound("teardown", strategy.teardown(specs)).await? {
                warn!("Teardown with {} failed, continuing: {}", kind, e);
                run.record_error(&e);
            }

            run.transition(RunState::Deploying);
            let deployed = match deadline.bound("deploy", strategy.deploy(specs)).await? {
                Ok(()) => true,
                Err(e) => {
                    warn!("Deploy with {} failed: {}", kind, e);
                    run.record_error(&e);
                    run.finish_attempt(Outcome::Failed);
                    false
                }
            };

            if deployed {
                deadline
                    .bound("settle", sleep(self.settings.settle_delay))
                    .await?;

                run.transition(RunState::Probing);
                let statuses = deadline
                    .bound(
                        "probe",
                        self.prober.probe_all(specs, &strategy.log_source()),
                    )
                    .await?;

                run.transition(RunState::Evaluating);
                let outcome = self.evaluate(run, statuses);
                if outcome.is_success() {
                    run.transition(RunState::Succeeded);
                    return Ok(());
                }
            }

            let Some(next) = self.next_available(&mut cursor, deadline).await? else {
                run.transition(RunState::Failed);
                return Ok(());
            };

            run.transition(RunState::FallingBack);
            info!("Releasing {} before falling back", kind);
            if let Err(e) = deadline.bound("teardown", strategy.teardown(specs)).await? {
                warn!("Teardown of {} failed: {}", kind, e);
                run.record_error(&e);
            }
            current = next;
        }
    }

    /// Record probe results on the attempt and classify it
    fn evaluate(&self, run: &mut RunLog, statuses: IndexMap<String, ServiceStatus>) -> Outcome {
        for status in statuses.values() {
            if status.inconclusive {
                run.record_error(&Error::ProbeInconclusive {
                    service: status.name.clone(),
                    detail: format!(
                        "log shows readiness but no HTTP response after {} attempts",
                        status.attempts
                    ),
                });
            }
        }

        let up = statuses.values().filter(|s| s.is_up()).count();
        let outcome = Outcome::from_counts(up, statuses.len());
        info!("{}/{} services up: {}", up, statuses.len(), outcome);

        if let Some(attempt) = run.attempts.last_mut() {
            attempt.statuses = statuses.values().cloned().collect();
        }
        run.services.extend(statuses);
        run.finish_attempt(outcome);
        outcome
    }

    /// Index of the next strategy at or after `cursor` that is available
    ///
    /// A strategy whose check fails in transport is skipped like an
    /// unavailable one. When nothing is available and such a failure
    /// happened, the last one is returned instead of `None`.
    async fn next_available(
        &self,
        cursor: &mut usize,
        deadline: &Deadline,
    ) -> Result<Option<usize>> {
        let mut unreachable = None;

        while *cursor < self.strategies.len() {
            let index = *cursor;
            *cursor += 1;

            let strategy = &self.strategies[index];
            match deadline
                .bound("availability check", strategy.is_available())
                .await?
            {
                Ok(true) => return Ok(Some(index)),
                Ok(false) => info!("Strategy {} unavailable, skipping", strategy.kind()),
                Err(e) => {
                    warn!("Availability check of {} failed: {}", strategy.kind(), e);
                    unreachable = Some(e);
                }
            }
        }

        match unreachable {
            Some(e) => Err(e),
            None => Ok(None),
        }
    }
}
