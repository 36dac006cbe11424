//! `deployer` command-line interface

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use output::{OutputFormat, StrategyArg};

#[derive(Parser)]
#[command(name = "deployer")]
#[command(about = "Deploy a service stack to one host over SSH and verify it")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, default_value = "deploy.yaml")]
    config: PathBuf,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate configuration file
    Validate,

    /// Tear down, deploy, probe and fall back as needed
    Deploy {
        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,

        /// Only try this strategy
        #[arg(long, value_enum)]
        only: Option<StrategyArg>,
    },

    /// Probe the services currently running
    Probe {
        /// Strategy whose logs to read (default: first enabled)
        #[arg(short, long, value_enum)]
        strategy: Option<StrategyArg>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Stop everything every enabled strategy may have started
    Teardown,
}

fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn dispatch(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Commands::Validate => commands::validate::run(&cli.config).await,
        Commands::Deploy { format, only } => commands::deploy::run(&cli.config, format, only).await,
        Commands::Probe { strategy, format } => {
            commands::probe::run(&cli.config, strategy, format).await
        }
        Commands::Teardown => commands::teardown::run(&cli.config).await,
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    smol::block_on(async {
        match dispatch(cli).await {
            Ok(code) => code,
            Err(e) => {
                eprintln!("Error: {e:#}");
                ExitCode::FAILURE
            }
        }
    })
}
