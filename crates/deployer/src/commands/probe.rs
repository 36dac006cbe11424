use crate::output::{self, OutputFormat, StrategyArg};
use anyhow::{Context, Result};
use deploy_config::{convert::Deployment, parser};
use deploy_orchestration::Outcome;
use std::path::Path;
use std::process::ExitCode;

pub async fn run(
    config_path: &Path,
    strategy: Option<StrategyArg>,
    format: OutputFormat,
) -> Result<ExitCode> {
    let config = parser::parse_file(config_path).context("Failed to parse configuration")?;
    let deployment = Deployment::from_config(&config, strategy.map(Into::into))
        .context("Failed to prepare probe")?;

    // Strategies come back in preference order
    let log_source = deployment
        .strategies
        .first()
        .map(|s| s.log_source())
        .context("No strategy enabled")?;

    let specs = deployment.registry.list_services();
    let statuses = deployment.prober.probe_all(specs, &log_source).await;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&statuses)?),
        OutputFormat::Table => println!("{}", output::status_table(statuses.values())),
    }

    let up = statuses.values().filter(|s| s.is_up()).count();
    Ok(output::exit_code(Outcome::from_counts(up, statuses.len())))
}
