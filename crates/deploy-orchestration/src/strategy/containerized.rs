//! Docker strategy: one container publishing every service port

use super::{
    Artifact, DeploymentStrategy, LogSource, StrategyKind, run_required, shell_line,
    upload_artifacts,
};
use crate::registry::ServiceSpec;
use crate::Result;
use async_trait::async_trait;
use command_executor::{ArtifactTransfer, RemoteExecutor, shell_quote};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Settings for [`ContainerizedStrategy`]
#[derive(Debug, Clone)]
pub struct ContainerSettings {
    /// Container name, also used for teardown lookup
    pub container_name: String,
    /// Image tag to run, built when missing
    pub image: String,
    /// Dockerfile path relative to the build context
    pub dockerfile: String,
    /// Build context on the host
    pub build_context: String,
    /// `--restart` policy
    pub restart_policy: String,
    /// `-e` variables
    pub env: BTreeMap<String, String>,
    /// `-v` mounts; a `./` host part is resolved against the working directory
    pub volumes: Vec<String>,
    /// Rebuild the image even when it exists
    pub always_build: bool,
    /// Budget for `docker build`
    pub build_timeout: Duration,
    /// Budget for every other docker command
    pub command_timeout: Duration,
    /// Budget for the availability check
    pub availability_timeout: Duration,
    /// Files shipped before building
    pub artifacts: Vec<Artifact>,
}

impl ContainerSettings {
    /// Settings with defaults for everything but the names
    pub fn new(container_name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            container_name: container_name.into(),
            image: image.into(),
            dockerfile: "Dockerfile".to_string(),
            build_context: ".".to_string(),
            restart_policy: "unless-stopped".to_string(),
            env: BTreeMap::new(),
            volumes: Vec::new(),
            always_build: false,
            build_timeout: Duration::from_secs(300),
            command_timeout: Duration::from_secs(60),
            availability_timeout: Duration::from_secs(10),
            artifacts: Vec::new(),
        }
    }

    /// Add a container environment variable
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Add a volume mount
    pub fn with_volume(mut self, volume: impl Into<String>) -> Self {
        self.volumes.push(volume.into());
        self
    }

    /// Add an artifact
    pub fn with_artifact(mut self, artifact: Artifact) -> Self {
        self.artifacts.push(artifact);
        self
    }
}

/// Runs every service inside one Docker container
pub struct ContainerizedStrategy {
    executor: Arc<dyn RemoteExecutor>,
    transfer: Arc<dyn ArtifactTransfer>,
    settings: ContainerSettings,
}

impl ContainerizedStrategy {
    /// Create a new containerized strategy
    pub fn new(
        executor: Arc<dyn RemoteExecutor>,
        transfer: Arc<dyn ArtifactTransfer>,
        settings: ContainerSettings,
    ) -> Self {
        Self {
            executor,
            transfer,
            settings,
        }
    }

    /// The settings in use
    pub fn settings(&self) -> &ContainerSettings {
        &self.settings
    }

    async fn image_exists(&self) -> Result<bool> {
        let cmd = format!(
            "docker image inspect {} > /dev/null 2>&1",
            shell_quote(&self.settings.image)
        );
        let output = self
            .executor
            .execute(&cmd, self.settings.command_timeout)
            .await?;
        Ok(output.success())
    }

    /// `docker run` line publishing every service port
    pub fn run_command(&self, specs: &[ServiceSpec]) -> String {
        let s = &self.settings;
        let mut parts = vec![
            shell_line(["docker", "run", "-d", "--name"]),
            shell_quote(&s.container_name),
            "--restart".to_string(),
            shell_quote(&s.restart_policy),
        ];
        for spec in specs {
            parts.push(format!("-p {0}:{0}", spec.port));
        }
        for (key, value) in &s.env {
            parts.push("-e".to_string());
            parts.push(shell_quote(&format!("{key}={value}")));
        }
        for volume in &s.volumes {
            parts.push("-v".to_string());
            parts.push(quote_volume(volume));
        }
        parts.push(shell_quote(&s.image));
        parts.join(" ")
    }

    fn build_command(&self) -> String {
        shell_line([
            "docker",
            "build",
            "-t",
            &self.settings.image,
            "-f",
            &self.settings.dockerfile,
            &self.settings.build_context,
        ])
    }
}

/// Quote a `host:container` mount, keeping `$PWD` expandable for `./` hosts
fn quote_volume(volume: &str) -> String {
    match volume.strip_prefix("./") {
        Some(rest) => format!("\"$PWD\"{}", shell_quote(&format!("/{rest}"))),
        None => shell_quote(volume),
    }
}

#[async_trait]
impl DeploymentStrategy for ContainerizedStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Containerized
    }

    async fn is_available(&self) -> Result<bool> {
        let cmd = "docker version --format '{{.Server.Version}}'";
        let output = self
            .executor
            .execute(cmd, self.settings.availability_timeout)
            .await?;

        if output.success() {
            debug!("Docker server {} on {}", output.stdout.trim(), self.executor.host());
            Ok(true)
        } else {
            info!(
                "Docker unavailable on {}: {}",
                self.executor.host(),
                output.stderr.trim()
            );
            Ok(false)
        }
    }

    async fn teardown(&self, _specs: &[ServiceSpec]) -> Result<()> {
        let name = &self.settings.container_name;
        let lookup = shell_line(["docker", "ps", "-aq", "--filter", &format!("name=^/{name}$")]);
        let found = run_required(self.executor.as_ref(), &lookup, self.settings.command_timeout)
            .await?;

        if found.stdout.trim().is_empty() {
            debug!("No container named {} to remove", name);
            return Ok(());
        }

        info!("Removing container {}", name);
        let remove = shell_line(["docker", "rm", "-f", name]);
        run_required(self.executor.as_ref(), &remove, self.settings.command_timeout).await?;
        Ok(())
    }

    async fn deploy(&self, specs: &[ServiceSpec]) -> Result<()> {
        upload_artifacts(self.transfer.as_ref(), &self.settings.artifacts).await?;

        if self.settings.always_build || !self.image_exists().await? {
            info!("Building image {}", self.settings.image);
            run_required(
                self.executor.as_ref(),
                &self.build_command(),
                self.settings.build_timeout,
            )
            .await?;
        } else {
            info!("Image {} already present, skipping build", self.settings.image);
        }

        let run = self.run_command(specs);
        let output =
            run_required(self.executor.as_ref(), &run, self.settings.command_timeout).await?;
        info!(
            "Started container {} ({})",
            self.settings.container_name,
            output.stdout.trim().chars().take(12).collect::<String>()
        );
        Ok(())
    }

    fn log_source(&self) -> LogSource {
        LogSource::Container {
            name: self.settings.container_name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingTransfer, ScriptedExecutor};

    fn strategy(settings: ContainerSettings) -> ContainerizedStrategy {
        let executor = Arc::new(ScriptedExecutor::new("test-host"));
        ContainerizedStrategy::new(executor, Arc::new(RecordingTransfer::new()), settings)
    }

    #[test]
    fn test_run_command_publishes_every_port() {
        let strategy = strategy(
            ContainerSettings::new("app", "app:latest")
                .with_env("NODE_ENV", "production")
                .with_volume("./data:/app/data")
                .with_volume("/var/run/app.sock:/run/app.sock"),
        );
        let specs = vec![
            ServiceSpec::new("web", 3000, "node web.js", "web.log"),
            ServiceSpec::new("proxy", 3001, "node proxy.js", "proxy.log"),
        ];

        assert_eq!(
            strategy.run_command(&specs),
            "docker run -d --name app --restart unless-stopped -p 3000:3000 -p 3001:3001 \
             -e NODE_ENV=production -v \"$PWD\"/data:/app/data \
             -v /var/run/app.sock:/run/app.sock app:latest"
        );
    }

    #[test]
    fn test_build_command() {
        let strategy = strategy(ContainerSettings::new("app", "app:latest"));
        assert_eq!(
            strategy.build_command(),
            "docker build -t app:latest -f Dockerfile ."
        );
    }

    #[test]
    fn test_log_source_is_container() {
        let strategy = strategy(ContainerSettings::new("app", "app:latest"));
        assert_eq!(
            strategy.log_source(),
            LogSource::Container {
                name: "app".to_string()
            }
        );
    }
}
