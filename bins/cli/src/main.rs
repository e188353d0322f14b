//! CLI binary entrypoint.

mod commands;
mod error;
mod format;

use clap::{Args, Parser, Subcommand};
use codebase_index_infra::{LocalOptions, is_secret_key};
use codebase_index_shared::{ErrorEnvelope, REDACTED};
use error::{CliError, ExitCode};
use format::{OutputArgs, OutputMode};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "cbi",
    version,
    about = "Install, supervise and feed the local codebase indexer",
    long_about = None
)]
struct Cli {
    #[command(flatten)]
    output: OutputArgs,

    #[command(flatten)]
    source: ConfigArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Where the effective config comes from, besides `CBI_*` variables.
#[derive(Debug, Args)]
struct ConfigArgs {
    /// Config file (JSON or TOML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Partial config JSON applied over the file.
    #[arg(long, global = true)]
    overrides_json: Option<String>,
}

impl ConfigArgs {
    fn local_options(&self) -> LocalOptions {
        LocalOptions {
            env: collect_scoped_env("CBI_"),
            config_path: self.config.clone(),
            overrides_json: self.overrides_json.clone(),
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show build and version details.
    Info,
    /// Config-related commands.
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Show the install record, registry entry and running processes.
    Status,
    /// Compare the installed version with the release catalog.
    CheckUpdate,
    /// Download and verify the newest sidecar when needed.
    Install,
    /// Install if needed and start the sidecar.
    Start,
    /// Stop every sidecar process.
    Stop,
    /// Stop, re-check the install and start.
    Restart,
    /// List services from the sidecar registry file.
    Services,
    /// Watch a workspace and relay its changes until Ctrl-C.
    Run {
        /// Workspace root.
        #[arg(value_name = "WORKSPACE")]
        workspace: PathBuf,
    },
}

#[derive(Debug, Subcommand)]
enum ConfigCommands {
    /// Validate config loading, merging, and env overrides.
    Check,
    /// Show the effective config.
    Show,
}

pub(crate) struct CliOutput {
    stdout: String,
    stderr: String,
    exit_code: ExitCode,
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    let mode = OutputMode::from_args(&cli.output);
    init_tracing(&collect_scoped_env("CBI_"));

    match run(&cli, mode) {
        Ok(output) => match write_output(&output) {
            Ok(()) => std::process::ExitCode::from(output.exit_code.as_u8()),
            Err(error) => exit_with_error(&error),
        },
        Err(error) => exit_with_error(&error),
    }
}

fn exit_with_error(error: &CliError) -> std::process::ExitCode {
    let _ = writeln!(io::stderr(), "error: {error}");
    std::process::ExitCode::from(error.exit_code().as_u8())
}

fn run(cli: &Cli, mode: OutputMode) -> Result<CliOutput, CliError> {
    let options = cli.source.local_options();
    match &cli.command {
        Commands::Info => commands::run_info(mode),
        Commands::Config {
            command: ConfigCommands::Check,
        } => commands::run_config_check(mode, &options),
        Commands::Config {
            command: ConfigCommands::Show,
        } => commands::run_config_show(mode, &options),
        Commands::Status => commands::run_status(mode, &options),
        Commands::CheckUpdate => commands::run_check_update(mode, &options),
        Commands::Install => commands::run_install(mode, &options),
        Commands::Start => commands::run_start(mode, &options),
        Commands::Stop => commands::run_stop(mode, &options),
        Commands::Restart => commands::run_restart(mode, &options),
        Commands::Services => commands::run_services(mode, &options),
        Commands::Run { workspace } => commands::run_daemon(mode, &options, workspace),
    }
}

/// `fmt` subscriber on stderr; `CBI_LOG` then `RUST_LOG` select the filter.
fn init_tracing(env: &BTreeMap<String, String>) {
    let filter = env
        .get("CBI_LOG")
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr);
    let installed = if env.get("CBI_LOG_FORMAT").is_some_and(|format| format == "json") {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if installed.is_err() {
        let _ = writeln!(io::stderr(), "warn: tracing subscriber already installed");
    }
}

/// Error body shared by every output format; metadata is redacted.
#[derive(Debug, Serialize)]
struct ErrorBody {
    code: String,
    message: String,
    kind: String,
    class: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    meta: BTreeMap<String, String>,
}

impl ErrorBody {
    fn from_envelope(error: &ErrorEnvelope) -> Self {
        let meta = error
            .metadata
            .iter()
            .map(|(key, value)| {
                let value = if is_secret_key(key) {
                    REDACTED.to_owned()
                } else {
                    value.clone()
                };
                (key.clone(), value)
            })
            .collect();
        Self {
            code: error.code.to_string(),
            message: error.message.clone(),
            kind: error.kind.to_string(),
            class: error.class.to_string(),
            meta,
        }
    }
}

pub(crate) fn format_error_output(mode: OutputMode, error: &ErrorEnvelope) -> CliOutput {
    let body = ErrorBody::from_envelope(error);

    let mut stderr = String::new();
    log_info(&mut stderr, "command failed", mode.no_progress);

    let stdout = if mode.is_ndjson() {
        let payload = serde_json::json!({
            "type": "error",
            "status": "error",
            "error": body,
        });
        let mut out = serde_json::to_string(&payload).unwrap_or_else(|_| {
            "{\"type\":\"error\",\"status\":\"error\",\"error\":{\"code\":\"core:internal\",\"message\":\"internal error\",\"kind\":\"invariant\"}}".to_owned()
        });
        out.push('\n');
        out
    } else if mode.is_json() {
        let payload = serde_json::json!({
            "status": "error",
            "error": body,
        });
        let mut out = serde_json::to_string_pretty(&payload).unwrap_or_else(|_| {
            "{\"status\":\"error\",\"error\":{\"code\":\"core:internal\",\"message\":\"internal error\",\"kind\":\"invariant\"}}".to_owned()
        });
        out.push('\n');
        out
    } else {
        format_error_text(&body)
    };

    CliOutput {
        stdout,
        stderr,
        exit_code: ExitCode::for_envelope(error),
    }
}

fn format_error_text(body: &ErrorBody) -> String {
    let mut out = format!(
        "status: error\ncode: {}\nmessage: {}\nkind: {}\nclass: {}\n",
        body.code, body.message, body.kind, body.class
    );
    for (key, value) in &body.meta {
        out.push_str("meta.");
        out.push_str(key);
        out.push_str(": ");
        out.push_str(value);
        out.push('\n');
    }
    out
}

/// Successful command output: `payload` fields are merged into the status
/// object (JSON) or the summary line (NDJSON); `text` is used as-is.
pub(crate) fn format_ok_output(
    mode: OutputMode,
    kind: &str,
    payload: serde_json::Value,
    text: String,
    stderr: String,
    exit_code: ExitCode,
) -> Result<CliOutput, CliError> {
    let status = if exit_code == ExitCode::Ok { "ok" } else { "error" };
    let stdout = if mode.is_ndjson() {
        format_ndjson_summary(status, kind, Some(payload))
    } else if mode.is_json() {
        let mut object = serde_json::Map::new();
        object.insert("status".to_owned(), serde_json::Value::from(status));
        if let serde_json::Value::Object(fields) = payload {
            object.extend(fields);
        }
        let mut out = serde_json::to_string_pretty(&serde_json::Value::Object(object))?;
        out.push('\n');
        out
    } else {
        text
    };
    Ok(CliOutput {
        stdout,
        stderr,
        exit_code,
    })
}

pub(crate) fn log_info(stderr: &mut String, message: &str, no_progress: bool) {
    if no_progress {
        return;
    }
    stderr.push_str("info: ");
    stderr.push_str(message);
    stderr.push('\n');
}

fn format_ndjson_summary(status: &str, kind: &str, extra: Option<serde_json::Value>) -> String {
    let mut payload = serde_json::Map::new();
    payload.insert("type".to_owned(), serde_json::Value::from("summary"));
    payload.insert("status".to_owned(), serde_json::Value::from(status));
    payload.insert("kind".to_owned(), serde_json::Value::from(kind));
    if let Some(serde_json::Value::Object(map)) = extra {
        for (key, value) in map {
            payload.insert(key, value);
        }
    }
    let mut out = serde_json::to_string(&serde_json::Value::Object(payload)).unwrap_or_else(|_| {
        "{\"type\":\"summary\",\"status\":\"error\",\"kind\":\"internal\"}".to_owned()
    });
    out.push('\n');
    out
}

fn write_output(output: &CliOutput) -> Result<(), CliError> {
    let mut stdout = io::stdout();
    stdout.write_all(output.stdout.as_bytes())?;

    if !output.stderr.is_empty() {
        let mut stderr = io::stderr();
        stderr.write_all(output.stderr.as_bytes())?;
        stderr.flush()?;
    }

    Ok(())
}

fn collect_scoped_env(prefix: &str) -> BTreeMap<String, String> {
    std::env::vars()
        .filter(|(key, _)| key.starts_with(prefix))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::OutputFormat;
    use clap::CommandFactory;
    use codebase_index_shared::ErrorCode;

    fn mode(format: OutputFormat) -> OutputMode {
        OutputMode::from_args(&OutputArgs {
            output: Some(format),
            agent: false,
            no_progress: true,
        })
    }

    #[test]
    fn version_flag_is_supported() {
        let result = Cli::command().try_get_matches_from(["cbi", "--version"]);
        let is_version = matches!(
            result,
            Err(error) if error.kind() == clap::error::ErrorKind::DisplayVersion
        );

        assert!(is_version, "expected clap to render version");
    }

    #[test]
    fn run_requires_a_workspace() {
        let missing = Cli::command().try_get_matches_from(["cbi", "run"]);
        assert!(missing.is_err());

        let parsed = Cli::try_parse_from(["cbi", "--output", "json", "run", "/tmp/project"]);
        let is_run = matches!(
            parsed,
            Ok(Cli { command: Commands::Run { ref workspace }, .. }) if workspace == &PathBuf::from("/tmp/project")
        );
        assert!(is_run);
    }

    #[test]
    fn global_config_flags_reach_local_options() -> Result<(), Box<dyn std::error::Error>> {
        let cli = Cli::try_parse_from([
            "cbi",
            "status",
            "--config",
            "cbi.toml",
            "--overrides-json",
            r#"{"monitor":{"enabled":false}}"#,
        ])?;
        let options = cli.source.local_options();
        assert_eq!(options.config_path, Some(PathBuf::from("cbi.toml")));
        assert!(options.overrides_json.is_some());
        Ok(())
    }

    #[test]
    fn error_output_redacts_secret_metadata() -> Result<(), Box<dyn std::error::Error>> {
        let error = ErrorEnvelope::expected(
            ErrorCode::new("config", "invalid_value"),
            "bad token",
        )
        .with_metadata("CBI_AUTH_TOKEN", "s3cr3t")
        .with_metadata("field", "authToken");

        let output = format_error_output(mode(OutputFormat::Json), &error);
        assert_eq!(output.exit_code, ExitCode::InvalidInput);
        assert!(!output.stdout.contains("s3cr3t"));

        let value: serde_json::Value = serde_json::from_str(output.stdout.trim())?;
        assert_eq!(value["status"], "error");
        assert_eq!(value["error"]["code"], "config:invalid_value");
        assert_eq!(value["error"]["meta"]["CBI_AUTH_TOKEN"], REDACTED);
        assert_eq!(value["error"]["meta"]["field"], "authToken");
        Ok(())
    }

    #[test]
    fn error_output_text_and_ndjson() -> Result<(), Box<dyn std::error::Error>> {
        let error = ErrorEnvelope::expected(ErrorCode::new("provider", "needs_provider"), "skip");

        let text = format_error_output(mode(OutputFormat::Text), &error);
        assert!(text.stdout.starts_with("status: error\ncode: provider:needs_provider\n"));
        assert_eq!(text.exit_code, ExitCode::NotReady);

        let ndjson = format_error_output(mode(OutputFormat::Ndjson), &error);
        assert_eq!(ndjson.stdout.lines().count(), 1);
        let value: serde_json::Value = serde_json::from_str(ndjson.stdout.trim())?;
        assert_eq!(value["type"], "error");
        Ok(())
    }

    #[test]
    fn ok_output_merges_payload() -> Result<(), Box<dyn std::error::Error>> {
        let payload = serde_json::json!({ "stopped": 2 });
        let json = format_ok_output(
            mode(OutputFormat::Json),
            "stop",
            payload.clone(),
            String::new(),
            String::new(),
            ExitCode::Ok,
        )?;
        let value: serde_json::Value = serde_json::from_str(json.stdout.trim())?;
        assert_eq!(value["status"], "ok");
        assert_eq!(value["stopped"], 2);

        let ndjson = format_ok_output(
            mode(OutputFormat::Ndjson),
            "stop",
            payload,
            String::new(),
            String::new(),
            ExitCode::NotReady,
        )?;
        let value: serde_json::Value = serde_json::from_str(ndjson.stdout.trim())?;
        assert_eq!(value["type"], "summary");
        assert_eq!(value["status"], "error");
        assert_eq!(value["kind"], "stop");
        Ok(())
    }

    #[test]
    fn log_info_respects_no_progress() {
        let mut stderr = String::new();
        log_info(&mut stderr, "quiet", true);
        assert!(stderr.is_empty());
        log_info(&mut stderr, "loud", false);
        assert_eq!(stderr, "info: loud\n");
    }
}
