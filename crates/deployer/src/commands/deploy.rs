use crate::output::{self, OutputFormat, StrategyArg};
use anyhow::{Context, Result};
use deploy_config::{convert::Deployment, parser};
use std::path::Path;
use std::process::ExitCode;
use tracing::info;

pub async fn run(
    config_path: &Path,
    format: OutputFormat,
    only: Option<StrategyArg>,
) -> Result<ExitCode> {
    let config = parser::parse_file(config_path).context("Failed to parse configuration")?;
    let deployment = Deployment::from_config(&config, only.map(Into::into))
        .context("Failed to prepare deployment")?;

    info!(
        "Deploying {} services to {}",
        deployment.registry.len(),
        config.host.address
    );

    let report = deployment.into_orchestrator().run().await;
    output::print_report(&report, format)?;

    Ok(output::exit_code(report.outcome))
}
