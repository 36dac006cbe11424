//! Health prober
//!
//! Combines a network signal (an HTTP request issued on the host) with a log
//! signal (the tail of the service's log) into a [`ServiceState`].

use crate::registry::ServiceSpec;
use crate::status::{ServiceState, ServiceStatus};
use crate::strategy::LogSource;
use async_runtime_compat::prelude::{sleep, timeout};
use chrono::Utc;
use command_executor::{RemoteExecutor, shell_quote};
use futures::future::join_all;
use indexmap::IndexMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Status codes taken as proof of life
///
/// 404 is included: a server answering "not found" is still listening.
pub const LIVE_STATUS_CODES: [u16; 4] = [200, 302, 304, 404];

/// Lines kept in a status snippet
const SNIPPET_LINES: usize = 5;

/// Probe tuning
#[derive(Debug, Clone)]
pub struct ProbeSettings {
    /// Attempts per service per cycle
    pub attempts: u32,
    /// Pause between attempts
    pub retry_delay: Duration,
    /// Budget for one HTTP request
    pub request_timeout: Duration,
    /// Lines of log read per attempt
    pub log_tail_lines: usize,
    /// Host name the request targets, as seen from the deployment host
    pub probe_host: String,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            attempts: 3,
            retry_delay: Duration::from_secs(2),
            request_timeout: Duration::from_secs(5),
            log_tail_lines: 20,
            probe_host: "localhost".to_string(),
        }
    }
}

impl ProbeSettings {
    /// Budget for one remote command, covering SSH setup around the request
    fn command_budget(&self) -> Duration {
        self.request_timeout * 2 + Duration::from_secs(5)
    }
}

/// Classify one observation of a service
///
/// Returns the state and the log lines that justify it. A failure pattern
/// wins over a live status code.
pub fn classify(
    spec: &ServiceSpec,
    http_status: Option<u16>,
    log_lines: &[String],
) -> (ServiceState, Vec<String>) {
    let matching = |patterns: &[String]| -> Vec<String> {
        log_lines
            .iter()
            .filter(|line| patterns.iter().any(|p| line.contains(p.as_str())))
            .cloned()
            .collect()
    };

    let failures = matching(&spec.failure_patterns);
    let readiness = matching(&spec.readiness_patterns);
    let live = http_status.is_some_and(|code| LIVE_STATUS_CODES.contains(&code));

    let (state, mut snippet) = if !failures.is_empty() {
        (ServiceState::Failed, failures)
    } else if live {
        (ServiceState::Up, readiness)
    } else if !readiness.is_empty() {
        (ServiceState::Starting, readiness)
    } else {
        (ServiceState::Down, Vec::new())
    };

    if snippet.is_empty() {
        let skip = log_lines.len().saturating_sub(SNIPPET_LINES);
        snippet = log_lines[skip..].to_vec();
    }
    snippet.truncate(SNIPPET_LINES);

    (state, snippet)
}

/// Probes services through the remote executor
pub struct HealthProber {
    executor: Arc<dyn RemoteExecutor>,
    settings: ProbeSettings,
}

impl HealthProber {
    /// Create a new prober
    pub fn new(executor: Arc<dyn RemoteExecutor>, settings: ProbeSettings) -> Self {
        Self { executor, settings }
    }

    /// The settings in use
    pub fn settings(&self) -> &ProbeSettings {
        &self.settings
    }

    /// Probe one service, retrying until it settles or attempts run out
    pub async fn probe(&self, spec: &ServiceSpec, logs: &LogSource) -> ServiceStatus {
        let attempts = self.settings.attempts.max(1);
        let mut status = ServiceStatus::unknown(&spec.name);

        for attempt in 1..=attempts {
            if attempt > 1 {
                sleep(self.settings.retry_delay).await;
            }

            let http_status = self.http_status(spec).await;
            let lines = self.log_tail(spec, logs).await;
            let (state, snippet) = classify(spec, http_status, &lines);

            debug!(
                "{} attempt {}/{}: {} (http {:?})",
                spec.name, attempt, attempts, state, http_status
            );

            status = ServiceStatus {
                name: spec.name.clone(),
                state,
                http_status,
                last_log_snippet: snippet,
                checked_at: Utc::now(),
                attempts: attempt,
                inconclusive: false,
            };

            if state.is_settled() {
                break;
            }
        }

        status.inconclusive = status.state == ServiceState::Starting;
        info!("{} on port {}: {}", spec.name, spec.port, status.state);
        status
    }

    /// Probe every service concurrently
    ///
    /// Always returns one status per spec, keyed by name in input order.
    pub async fn probe_all(
        &self,
        specs: &[ServiceSpec],
        logs: &LogSource,
    ) -> IndexMap<String, ServiceStatus> {
        let statuses = join_all(specs.iter().map(|spec| self.probe(spec, logs))).await;
        specs
            .iter()
            .zip(statuses)
            .map(|(spec, status)| (spec.name.clone(), status))
            .collect()
    }

    /// Remote `curl` line requesting a service's health path
    pub fn request_command(&self, spec: &ServiceSpec) -> String {
        let secs = self.settings.request_timeout.as_secs().max(1);
        let url = format!(
            "http://{}:{}{}",
            self.settings.probe_host, spec.port, spec.health_path
        );
        format!(
            "curl -s -o /dev/null -m {} -w '%{{http_code}}' {}; true",
            secs,
            shell_quote(&url)
        )
    }

    async fn http_status(&self, spec: &ServiceSpec) -> Option<u16> {
        let cmd = self.request_command(spec);
        let budget = self.settings.command_budget();

        match timeout(budget, self.executor.execute(&cmd, budget)).await {
            Ok(Ok(output)) => parse_status_code(&output.stdout),
            Ok(Err(e)) => {
                warn!("HTTP probe of {} failed: {}", spec.name, e);
                None
            }
            Err(elapsed) => {
                warn!("HTTP probe of {} failed: {}", spec.name, elapsed);
                None
            }
        }
    }

    async fn log_tail(&self, spec: &ServiceSpec, logs: &LogSource) -> Vec<String> {
        let cmd = logs.tail_command(&spec.log_path, self.settings.log_tail_lines);
        let budget = self.settings.command_budget();

        match timeout(budget, self.executor.execute(&cmd, budget)).await {
            Ok(Ok(output)) => output.stdout.lines().map(str::to_string).collect(),
            Ok(Err(e)) => {
                debug!("Reading {} failed: {}", spec.log_path, e);
                Vec::new()
            }
            Err(_) => Vec::new(),
        }
    }
}

/// `None` for "000" (no response) or anything that is not a status code
fn parse_status_code(stdout: &str) -> Option<u16> {
    match stdout.trim().parse::<u16>() {
        Ok(0) | Err(_) => None,
        Ok(code) => Some(code),
    }
}
