//! `cbi run`: keep a workspace in sync until Ctrl-C.

use crate::error::{CliError, ExitCode};
use crate::format::OutputMode;
use crate::{CliOutput, format_error_output, format_ok_output, log_info};
use codebase_index_infra::{LocalOptions, RuntimeStatus, run_daemon_local};
use std::path::Path;

/// Initialize the runtime on `workspace`, block until Ctrl-C, dispose and
/// report the final status.
pub fn run_daemon(
    mode: OutputMode,
    options: &LocalOptions,
    workspace: &Path,
) -> Result<CliOutput, CliError> {
    if !workspace.is_dir() {
        return Err(CliError::InvalidInput(format!(
            "workspace {} is not a directory",
            workspace.display()
        )));
    }
    tracing::info!(workspace = %workspace.display(), "watching workspace; press Ctrl-C to stop");

    let status = match run_daemon_local(options, workspace) {
        Ok(status) => status,
        Err(error) => return Ok(format_error_output(mode, &error)),
    };

    let mut stderr = String::new();
    log_info(&mut stderr, "workspace released", mode.no_progress);
    format_ok_output(
        mode,
        "run",
        serde_json::to_value(&status)?,
        format_daemon_text(&status),
        stderr,
        ExitCode::Ok,
    )
}

fn format_daemon_text(status: &RuntimeStatus) -> String {
    format!(
        "status: ok\nworkspace: {}\nstate: {}\nmonitorEnabled: {}\nbufferedEvents: {}\n",
        status.workspace, status.supervisor.state, status.monitor_enabled, status.buffered_events,
    )
}
