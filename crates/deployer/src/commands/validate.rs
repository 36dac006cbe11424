use anyhow::{Context, Result};
use comfy_table::Table;
use deploy_config::parser;
use std::path::Path;
use std::process::ExitCode;

pub async fn run(config_path: &Path) -> Result<ExitCode> {
    println!("Validating {}...", config_path.display());

    let config = parser::parse_file(config_path).context("Failed to parse configuration")?;

    println!("✓ Configuration valid");
    println!("  Version: {}", config.version);
    if let Some(name) = &config.name {
        println!("  Name: {}", name);
    }

    let user = config
        .host
        .user
        .as_ref()
        .map(|u| format!("{u}@"))
        .unwrap_or_default();
    println!("  Host: {}{}:{}", user, config.host.address, config.host.port);
    println!("  Remote dir: {}", config.remote_dir);
    println!("  Strategies: {}", config.enabled_strategies().join(", "));

    let mut table = Table::new();
    table.set_header(vec!["SERVICE", "PORT", "HEALTH", "COMMAND", "LOG"]);
    for spec in &config.services {
        table.add_row(vec![
            spec.name.clone(),
            spec.port.to_string(),
            spec.health_path.clone(),
            spec.start_command.clone(),
            spec.log_path.clone(),
        ]);
    }
    println!("{}", table);

    Ok(ExitCode::SUCCESS)
}
