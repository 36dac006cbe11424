use anyhow::{Context, Result};
use deploy_config::{convert::Deployment, parser};
use std::path::Path;
use std::process::ExitCode;
use tracing::{info, warn};

pub async fn run(config_path: &Path) -> Result<ExitCode> {
    let config = parser::parse_file(config_path).context("Failed to parse configuration")?;
    let deployment =
        Deployment::from_config(&config, None).context("Failed to prepare teardown")?;
    let specs = deployment.registry.list_services();

    let mut failures = 0;
    for strategy in &deployment.strategies {
        match strategy.teardown(specs).await {
            Ok(()) => {
                info!("Tore down {}", strategy.kind());
                println!("✓ {}", strategy.kind());
            }
            Err(e) => {
                warn!("Teardown of {} failed: {}", strategy.kind(), e);
                println!("✗ {}: {}", strategy.kind(), e);
                failures += 1;
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{} strategies failed to tear down", failures);
    }
    Ok(ExitCode::SUCCESS)
}
