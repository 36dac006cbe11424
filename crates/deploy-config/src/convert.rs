//! Conversion of a parsed [`Config`] into orchestration types

use crate::{Config, ConfigError, ContainerizedConfig, DirectProcessConfig, Result};
use command_executor::{ArtifactTransfer, RemoteExecutor, SshConfig, SshRemote};
use deploy_orchestration::{
    Artifact, ContainerSettings, ContainerizedStrategy, DeploymentOrchestrator,
    DeploymentStrategy, DirectProcessSettings, DirectProcessStrategy, HealthProber,
    OrchestratorSettings, ProbeSettings, ServiceRegistry, StrategyKind,
};
use std::sync::Arc;
use std::time::Duration;

/// SSH settings for the configured host
pub fn ssh_config(config: &Config) -> SshConfig {
    let host = &config.host;
    let mut ssh = SshConfig::new(&host.address)
        .with_connect_timeout(Duration::from_secs(host.connect_timeout))
        .with_working_dir(&config.remote_dir);

    if let Some(user) = &host.user {
        ssh = ssh.with_user(user);
    }
    if host.port != 22 {
        ssh = ssh.with_port(host.port);
    }
    if let Some(identity) = &host.identity_file {
        ssh = ssh.with_identity_file(identity);
    }
    for dir in &host.path_prefix {
        ssh = ssh.with_path_prefix(dir);
    }
    for (key, value) in &host.env {
        ssh = ssh.with_env(key, value);
    }
    for option in &host.ssh_options {
        ssh = ssh.with_option(option);
    }
    ssh
}

/// Validated service registry
pub fn service_registry(config: &Config) -> Result<ServiceRegistry> {
    ServiceRegistry::new(config.services.clone()).map_err(|e| match e {
        deploy_orchestration::Error::Config(reason) => ConfigError::ValidationError(reason),
        other => ConfigError::ValidationError(other.to_string()),
    })
}

/// Orchestrator timing
pub fn orchestrator_settings(config: &Config) -> OrchestratorSettings {
    OrchestratorSettings {
        settle_delay: Duration::from_secs(config.settings.settle_delay),
        run_deadline: Duration::from_secs(config.settings.run_deadline),
    }
}

/// Probe tuning
pub fn probe_settings(config: &Config) -> ProbeSettings {
    ProbeSettings {
        attempts: config.probe.attempts,
        retry_delay: Duration::from_secs(config.probe.retry_delay),
        request_timeout: Duration::from_secs(config.probe.request_timeout),
        log_tail_lines: config.probe.log_tail_lines,
        probe_host: config.probe.host.clone(),
    }
}

/// Artifacts with local paths resolved against the config file's directory
fn resolve_artifacts(config: &Config, artifacts: &[Artifact]) -> Vec<Artifact> {
    artifacts
        .iter()
        .map(|artifact| match &config.base_dir {
            Some(base) if artifact.local.is_relative() => Artifact {
                local: base.join(&artifact.local),
                ..artifact.clone()
            },
            _ => artifact.clone(),
        })
        .collect()
}

/// Docker strategy settings, if that strategy is enabled
pub fn container_settings(config: &Config) -> Option<ContainerSettings> {
    let c: &ContainerizedConfig = config.strategies.containerized.as_ref()?;
    if !c.enabled {
        return None;
    }

    let mut settings = ContainerSettings::new(&c.container_name, &c.image);
    settings.dockerfile = c.dockerfile.clone();
    settings.build_context = c.build_context.clone();
    settings.restart_policy = c.restart_policy.clone();
    settings.env = c.env.clone();
    settings.volumes = c.volumes.clone();
    settings.always_build = c.always_build;
    settings.build_timeout = Duration::from_secs(c.build_timeout);
    settings.command_timeout = Duration::from_secs(config.settings.command_timeout);
    settings.artifacts = resolve_artifacts(config, &c.artifacts);
    Some(settings)
}

/// Host process strategy settings, if that strategy is enabled
pub fn direct_settings(config: &Config) -> Option<DirectProcessSettings> {
    let d: &DirectProcessConfig = config.strategies.direct_process.as_ref()?;
    if !d.enabled {
        return None;
    }

    Some(DirectProcessSettings {
        install_command: d.install_command.clone(),
        install_timeout: Duration::from_secs(d.install_timeout),
        inter_service_delay: Duration::from_secs(d.inter_service_delay),
        required_binaries: d.required_binaries.clone(),
        extra_kill_patterns: d.extra_kill_patterns.clone(),
        artifacts: resolve_artifacts(config, &d.artifacts),
        command_timeout: Duration::from_secs(config.settings.command_timeout),
    })
}

/// Enabled strategies, optionally restricted to one kind
pub fn build_strategies(
    config: &Config,
    executor: Arc<dyn RemoteExecutor>,
    transfer: Arc<dyn ArtifactTransfer>,
    only: Option<StrategyKind>,
) -> Vec<Box<dyn DeploymentStrategy>> {
    let wanted = |kind: StrategyKind| only.is_none_or(|only| only == kind);
    let mut strategies: Vec<Box<dyn DeploymentStrategy>> = Vec::new();

    if let Some(settings) =
        container_settings(config).filter(|_| wanted(StrategyKind::Containerized))
    {
        strategies.push(Box::new(ContainerizedStrategy::new(
            executor.clone(),
            transfer.clone(),
            settings,
        )));
    }
    if let Some(settings) = direct_settings(config).filter(|_| wanted(StrategyKind::DirectProcess))
    {
        strategies.push(Box::new(DirectProcessStrategy::new(
            executor, transfer, settings,
        )));
    }
    strategies
}

/// Everything needed to act on the configured host
pub struct Deployment {
    /// SSH transport shared by strategies and prober
    pub remote: Arc<SshRemote>,
    /// Services in startup order
    pub registry: ServiceRegistry,
    /// Enabled strategies in preference order
    pub strategies: Vec<Box<dyn DeploymentStrategy>>,
    /// Prober bound to the same transport
    pub prober: HealthProber,
    /// Orchestrator timing
    pub settings: OrchestratorSettings,
}

impl Deployment {
    /// Assemble a deployment from configuration
    pub fn from_config(config: &Config, only: Option<StrategyKind>) -> Result<Self> {
        let registry = service_registry(config)?;
        let remote = Arc::new(SshRemote::new(ssh_config(config)));
        let strategies = build_strategies(config, remote.clone(), remote.clone(), only);

        if strategies.is_empty() {
            return Err(ConfigError::ValidationError(match only {
                Some(kind) => format!("strategy {kind} is not enabled"),
                None => "no strategy is enabled".to_string(),
            }));
        }

        Ok(Self {
            prober: HealthProber::new(remote.clone(), probe_settings(config)),
            remote,
            registry,
            strategies,
            settings: orchestrator_settings(config),
        })
    }

    /// Hand everything to an orchestrator for one run
    pub fn into_orchestrator(self) -> DeploymentOrchestrator {
        DeploymentOrchestrator::new(self.registry, self.strategies, self.prober, self.settings)
    }
}
