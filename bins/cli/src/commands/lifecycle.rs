//! Install, start, stop and restart handlers.

use crate::error::{CliError, ExitCode};
use crate::format::OutputMode;
use crate::{CliOutput, format_error_output, format_ok_output, log_info};
use codebase_index_app::SupervisorStatus;
use codebase_index_infra::{
    LocalOptions, UpdateCheck, run_check_update_local, run_install_local, run_restart_local,
    run_start_local, run_stop_local,
};

/// Compare the install record with the catalog.
pub fn run_check_update(mode: OutputMode, options: &LocalOptions) -> Result<CliOutput, CliError> {
    let check = match run_check_update_local(options) {
        Ok(check) => check,
        Err(error) => return Ok(format_error_output(mode, &error)),
    };
    format_ok_output(
        mode,
        "checkUpdate",
        serde_json::to_value(&check)?,
        format_check_text(&check),
        String::new(),
        ExitCode::Ok,
    )
}

/// Run the upgrade decision; exits non-zero when nothing usable is installed.
pub fn run_install(mode: OutputMode, options: &LocalOptions) -> Result<CliOutput, CliError> {
    let mut stderr = String::new();
    log_info(&mut stderr, "checking the release catalog", mode.no_progress);
    let summary = match run_install_local(options) {
        Ok(summary) => summary,
        Err(error) => return Ok(format_error_output(mode, &error)),
    };
    let exit_code = if summary.outcome.is_installed() {
        ExitCode::Ok
    } else {
        ExitCode::NotReady
    };
    let mut text = format!("outcome: {}\n", summary.outcome);
    text.push_str(&format_supervisor_text(&summary.status));
    format_ok_output(
        mode,
        "install",
        serde_json::to_value(&summary)?,
        with_status_line(exit_code, &text),
        stderr,
        exit_code,
    )
}

/// Install if needed, start, and wait for the service registry entry.
pub fn run_start(mode: OutputMode, options: &LocalOptions) -> Result<CliOutput, CliError> {
    let mut stderr = String::new();
    log_info(&mut stderr, "starting the sidecar", mode.no_progress);
    match run_start_local(options) {
        Ok(status) => supervisor_output(mode, "start", &status, stderr),
        Err(error) => Ok(format_error_output(mode, &error)),
    }
}

/// Kill every running sidecar process.
pub fn run_stop(mode: OutputMode, options: &LocalOptions) -> Result<CliOutput, CliError> {
    let stopped = match run_stop_local(options) {
        Ok(stopped) => stopped,
        Err(error) => return Ok(format_error_output(mode, &error)),
    };
    format_ok_output(
        mode,
        "stop",
        serde_json::json!({ "stopped": stopped }),
        format!("status: ok\nstopped: {stopped}\n"),
        String::new(),
        ExitCode::Ok,
    )
}

/// Stop, re-check the install, start.
pub fn run_restart(mode: OutputMode, options: &LocalOptions) -> Result<CliOutput, CliError> {
    let mut stderr = String::new();
    log_info(&mut stderr, "restarting the sidecar", mode.no_progress);
    match run_restart_local(options) {
        Ok(status) => supervisor_output(mode, "restart", &status, stderr),
        Err(error) => Ok(format_error_output(mode, &error)),
    }
}

fn supervisor_output(
    mode: OutputMode,
    kind: &str,
    status: &SupervisorStatus,
    stderr: String,
) -> Result<CliOutput, CliError> {
    format_ok_output(
        mode,
        kind,
        serde_json::json!({ "supervisor": status }),
        with_status_line(ExitCode::Ok, &format_supervisor_text(status)),
        stderr,
        ExitCode::Ok,
    )
}

fn with_status_line(exit_code: ExitCode, body: &str) -> String {
    let status = if exit_code == ExitCode::Ok { "ok" } else { "error" };
    format!("status: {status}\n{body}")
}

fn format_check_text(check: &UpdateCheck) -> String {
    format!(
        "status: ok\ntarget: {}\ninstalledVersion: {}\nlatestVersion: {}\nupdateAvailable: {}\n",
        check.target,
        check.installed_version.as_deref().unwrap_or("none"),
        check.latest_version,
        check.update_available,
    )
}

fn format_supervisor_text(status: &SupervisorStatus) -> String {
    let mut out = format!("state: {}\n", status.state);
    if let Some(version) = &status.installed_version {
        out.push_str(&format!("installedVersion: {version}\n"));
    }
    if let Some(pid) = status.pid {
        out.push_str(&format!("pid: {pid}\n"));
    }
    if let Some(endpoint) = &status.endpoint {
        out.push_str(&format!("endpoint: {endpoint}\n"));
    }
    if let Some(error) = &status.last_error {
        out.push_str(&format!("lastError: {error}\n"));
    }
    out
}
