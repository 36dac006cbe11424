//! Report rendering and exit codes

use anyhow::Result;
use clap::ValueEnum;
use comfy_table::{Cell, Color, Table};
use deploy_orchestration::{
    DeploymentAttempt, Outcome, RunReport, ServiceState, ServiceStatus, StrategyKind,
};
use std::process::ExitCode;

/// How results are printed on stdout
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable tables
    Table,
    /// Pretty-printed JSON
    Json,
}

/// Strategy names accepted on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StrategyArg {
    /// Docker container
    Containerized,
    /// Host processes
    DirectProcess,
}

impl From<StrategyArg> for StrategyKind {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Containerized => StrategyKind::Containerized,
            StrategyArg::DirectProcess => StrategyKind::DirectProcess,
        }
    }
}

/// 0 when every service is up, 2 when some are, 1 otherwise
pub fn exit_code(outcome: Outcome) -> ExitCode {
    match outcome {
        Outcome::Succeeded => ExitCode::SUCCESS,
        Outcome::PartialSuccess => ExitCode::from(2),
        Outcome::Pending | Outcome::Failed => ExitCode::FAILURE,
    }
}

fn state_cell(state: ServiceState) -> Cell {
    let color = match state {
        ServiceState::Up => Color::Green,
        ServiceState::Starting => Color::Yellow,
        ServiceState::Down | ServiceState::Failed => Color::Red,
        ServiceState::Unknown => Color::DarkGrey,
    };
    Cell::new(state.to_string()).fg(color)
}

fn outcome_cell(outcome: Outcome) -> Cell {
    let color = match outcome {
        Outcome::Succeeded => Color::Green,
        Outcome::PartialSuccess => Color::Yellow,
        Outcome::Failed => Color::Red,
        Outcome::Pending => Color::DarkGrey,
    };
    Cell::new(outcome.to_string()).fg(color)
}

/// One row per service
pub fn status_table<'a>(statuses: impl IntoIterator<Item = &'a ServiceStatus>) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["SERVICE", "STATE", "HTTP", "ATTEMPTS", "LOG"]);

    for status in statuses {
        let http = status
            .http_status
            .map(|code| code.to_string())
            .unwrap_or_else(|| "-".to_string());
        let mut state = state_cell(status.state);
        if status.inconclusive {
            state = Cell::new(format!("{} (inconclusive)", status.state)).fg(Color::Yellow);
        }

        table.add_row(vec![
            Cell::new(&status.name),
            state,
            Cell::new(http),
            Cell::new(status.attempts),
            Cell::new(status.last_log_snippet.last().map(String::as_str).unwrap_or("")),
        ]);
    }
    table
}

/// One row per attempt
pub fn attempts_table(attempts: &[DeploymentAttempt]) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["STRATEGY", "OUTCOME", "UP", "ERRORS"]);

    for attempt in attempts {
        let errors = attempt
            .errors
            .iter()
            .map(|e| e.message.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        table.add_row(vec![
            Cell::new(attempt.strategy_kind),
            outcome_cell(attempt.outcome),
            Cell::new(format!("{}/{}", attempt.up_count(), attempt.statuses.len())),
            Cell::new(errors),
        ]);
    }
    table
}

/// Print a run report
pub fn print_report(report: &RunReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
        OutputFormat::Table => {
            let strategy = report
                .final_strategy
                .map(|k| k.to_string())
                .unwrap_or_else(|| "none".to_string());
            println!("Outcome:  {}", report.outcome);
            println!("Strategy: {}", strategy);
            println!(
                "Duration: {}s",
                (report.finished_at - report.started_at).num_seconds()
            );
            if let Some(error) = &report.error {
                println!("Error:    {}", error.message);
            }
            println!();
            println!("{}", status_table(report.services.values()));
            if !report.attempts.is_empty() {
                println!();
                println!("{}", attempts_table(&report.attempts));
            }
        }
    }
    Ok(())
}
