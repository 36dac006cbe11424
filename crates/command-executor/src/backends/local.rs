//! Local process execution backend

use async_process::Stdio;
use async_runtime_compat::prelude::timeout;
use std::time::Duration;
use tracing::debug;

use crate::command::Command;
use crate::error::{Error, Result};
use crate::remote::ExecOutput;

/// Run a local command to completion, capturing stdout and stderr
///
/// Stdin is closed so interactive prompts fail fast instead of hanging.
/// When `budget` elapses the child is killed and [`Error::Timeout`] is
/// returned.
pub async fn run(command: &Command, budget: Duration) -> Result<ExecOutput> {
    let rendered = command.to_shell_string();
    debug!("Running local command: {}", rendered);

    let mut async_cmd = command.prepare();
    async_cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let child = async_cmd.spawn().map_err(|e| {
        Error::spawn_failed(command.get_program().to_string_lossy(), e.to_string())
    })?;

    let output = timeout(budget, child.output())
        .await
        .map_err(|_| Error::Timeout {
            command: rendered,
            after: budget,
        })??;

    Ok(ExecOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        exit_code: output.status.code().unwrap_or(-1),
    })
}
