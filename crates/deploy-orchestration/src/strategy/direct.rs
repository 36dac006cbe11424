//! Direct-process strategy: every service as a detached host process

use super::{
    Artifact, DeploymentStrategy, LogSource, StrategyKind, run_required, upload_artifacts,
};
use crate::registry::ServiceSpec;
use crate::{Error, Result};
use async_runtime_compat::prelude::sleep;
use async_trait::async_trait;
use command_executor::{ArtifactTransfer, RemoteExecutor, shell_quote};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Settings for [`DirectProcessStrategy`]
#[derive(Debug, Clone)]
pub struct DirectProcessSettings {
    /// Run once after uploading, before starting services
    pub install_command: Option<String>,
    /// Budget for the install step
    pub install_timeout: Duration,
    /// Pause between starting consecutive services
    pub inter_service_delay: Duration,
    /// Binaries that must be on the remote `PATH`
    pub required_binaries: Vec<String>,
    /// Extra `pkill -f` patterns applied on teardown
    pub extra_kill_patterns: Vec<String>,
    /// Files shipped before installing
    pub artifacts: Vec<Artifact>,
    /// Budget for every other command
    pub command_timeout: Duration,
}

impl Default for DirectProcessSettings {
    fn default() -> Self {
        Self {
            install_command: Some("npm install".to_string()),
            install_timeout: Duration::from_secs(180),
            inter_service_delay: Duration::from_secs(2),
            required_binaries: vec!["node".to_string()],
            extra_kill_patterns: Vec::new(),
            artifacts: Vec::new(),
            command_timeout: Duration::from_secs(60),
        }
    }
}

/// Starts every service with `nohup` on the host
pub struct DirectProcessStrategy {
    executor: Arc<dyn RemoteExecutor>,
    transfer: Arc<dyn ArtifactTransfer>,
    settings: DirectProcessSettings,
}

impl DirectProcessStrategy {
    /// Create a new direct-process strategy
    pub fn new(
        executor: Arc<dyn RemoteExecutor>,
        transfer: Arc<dyn ArtifactTransfer>,
        settings: DirectProcessSettings,
    ) -> Self {
        Self {
            executor,
            transfer,
            settings,
        }
    }

    /// The settings in use
    pub fn settings(&self) -> &DirectProcessSettings {
        &self.settings
    }

    async fn kill_matching(&self, command: &str) -> Result<()> {
        let cmd = format!("pkill -f {}", shell_quote(&kill_pattern(command)));
        debug!("[{}] $ {}", self.executor.host(), cmd);
        let output = self
            .executor
            .execute(&cmd, self.settings.command_timeout)
            .await?;

        // pkill exits 1 when nothing matched
        match output.exit_code {
            0 => {
                info!("Stopped processes matching '{}'", command);
                Ok(())
            }
            1 => Ok(()),
            _ => Err(Error::execution(cmd, &output)),
        }
    }
}

/// Start line for one service
pub(crate) fn start_command(spec: &ServiceSpec) -> String {
    format!(
        "nohup sh -c {} > {} 2>&1 < /dev/null &",
        shell_quote(&spec.start_command),
        shell_quote(&spec.log_path)
    )
}

/// `pkill -f` pattern matching `command` literally but not itself
///
/// Bracketing the first alphanumeric character keeps the remote shell
/// running `pkill` out of its own match set.
pub(crate) fn kill_pattern(command: &str) -> String {
    let mut pattern = String::with_capacity(command.len() + 8);
    let mut bracketed = false;
    for c in command.chars() {
        if !bracketed && c.is_ascii_alphanumeric() {
            pattern.push('[');
            pattern.push(c);
            pattern.push(']');
            bracketed = true;
        } else if "\\.+*?()|[]{}^$".contains(c) {
            pattern.push('\\');
            pattern.push(c);
        } else {
            pattern.push(c);
        }
    }
    pattern
}

#[async_trait]
impl DeploymentStrategy for DirectProcessStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::DirectProcess
    }

    async fn is_available(&self) -> Result<bool> {
        let check = if self.settings.required_binaries.is_empty() {
            "true".to_string()
        } else {
            self.settings
                .required_binaries
                .iter()
                .map(|bin| format!("command -v {} > /dev/null", shell_quote(bin)))
                .collect::<Vec<_>>()
                .join(" && ")
        };

        let output = self
            .executor
            .execute(&check, self.settings.command_timeout)
            .await?;

        if !output.success() {
            info!(
                "Missing one of {:?} on {}",
                self.settings.required_binaries,
                self.executor.host()
            );
        }
        Ok(output.success())
    }

    async fn teardown(&self, specs: &[ServiceSpec]) -> Result<()> {
        for spec in specs {
            self.kill_matching(&spec.start_command).await?;
        }
        for pattern in &self.settings.extra_kill_patterns {
            self.kill_matching(pattern).await?;
        }

        if !specs.is_empty() {
            let logs = specs
                .iter()
                .map(|s| shell_quote(&s.log_path))
                .collect::<Vec<_>>()
                .join(" ");
            run_required(
                self.executor.as_ref(),
                &format!("rm -f {logs}"),
                self.settings.command_timeout,
            )
            .await?;
        }
        Ok(())
    }

    async fn deploy(&self, specs: &[ServiceSpec]) -> Result<()> {
        upload_artifacts(self.transfer.as_ref(), &self.settings.artifacts).await?;

        if let Some(install) = &self.settings.install_command {
            info!("Installing dependencies: {}", install);
            run_required(self.executor.as_ref(), install, self.settings.install_timeout).await?;
        }

        for (index, spec) in specs.iter().enumerate() {
            if index > 0 {
                sleep(self.settings.inter_service_delay).await;
            }
            info!("Starting {} on port {}", spec.name, spec.port);
            run_required(
                self.executor.as_ref(),
                &start_command(spec),
                self.settings.command_timeout,
            )
            .await?;
        }
        Ok(())
    }

    fn log_source(&self) -> LogSource {
        LogSource::Host
    }
}
