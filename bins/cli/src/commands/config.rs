//! Config command handlers.

use crate::error::{CliError, ExitCode};
use crate::format::OutputMode;
use crate::{CliOutput, format_error_output, format_ok_output, log_info};
use codebase_index_infra::{LocalOptions, load_effective_config_json};

/// Load, merge and validate the config without printing it.
pub fn run_config_check(mode: OutputMode, options: &LocalOptions) -> Result<CliOutput, CliError> {
    if let Err(error) = load(options) {
        return Ok(format_error_output(mode, &error));
    }

    let mut stderr = String::new();
    log_info(&mut stderr, "config check completed", mode.no_progress);

    let text = options.config_path.as_ref().map_or_else(
        || "status: ok\nconfig: ok\n".to_owned(),
        |path| format!("status: ok\nconfig: ok\npath: {}\n", path.display()),
    );
    format_ok_output(
        mode,
        "config",
        serde_json::json!({ "configPath": config_path(options) }),
        text,
        stderr,
        ExitCode::Ok,
    )
}

/// Print the effective config after file, overrides and env are applied.
pub fn run_config_show(mode: OutputMode, options: &LocalOptions) -> Result<CliOutput, CliError> {
    let config_json = match load(options) {
        Ok(config_json) => config_json,
        Err(error) => return Ok(format_error_output(mode, &error)),
    };

    let mut stderr = String::new();
    log_info(&mut stderr, "config show completed", mode.no_progress);

    let effective: serde_json::Value = serde_json::from_str(config_json.trim())?;
    let mut text = String::from("status: ok\nconfig:\n");
    text.push_str(&config_json);
    if !text.ends_with('\n') {
        text.push('\n');
    }
    format_ok_output(
        mode,
        "config",
        serde_json::json!({
            "configPath": config_path(options),
            "effectiveConfig": effective,
        }),
        text,
        stderr,
        ExitCode::Ok,
    )
}

fn load(options: &LocalOptions) -> Result<String, codebase_index_infra::InfraError> {
    load_effective_config_json(
        &options.env,
        options.config_path.as_deref(),
        options.overrides_json.as_deref(),
    )
}

fn config_path(options: &LocalOptions) -> Option<String> {
    options
        .config_path
        .as_ref()
        .map(|path| path.to_string_lossy().into_owned())
}
