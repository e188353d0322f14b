//! CLI integration tests against the `cbi` binary.

#![allow(missing_docs)]

use std::path::Path;
use std::process::{Command, Output};

fn run_cli(home: &Path, args: &[&str]) -> std::io::Result<Output> {
    let mut command = Command::new(env!("CARGO_BIN_EXE_cbi"));
    command.args(args);
    scrub_scoped_env(&mut command);
    command.env("CBI_HOME", home);
    command.env("CBI_LOG", "off");
    command.output()
}

fn scrub_scoped_env(command: &mut Command) {
    for (key, _) in std::env::vars() {
        if key.starts_with("CBI_") {
            command.env_remove(key);
        }
    }
    command.env_remove("RUST_LOG");
}

fn stdout_json(output: &Output) -> Result<serde_json::Value, Box<dyn std::error::Error>> {
    let stdout = String::from_utf8(output.stdout.clone())?;
    Ok(serde_json::from_str(stdout.trim())?)
}

#[test]
fn info_reports_the_build() -> Result<(), Box<dyn std::error::Error>> {
    let home = tempfile::tempdir()?;
    let output = run_cli(home.path(), &["--output", "json", "info"])?;
    assert!(output.status.success());

    let value = stdout_json(&output)?;
    assert_eq!(value["status"], "ok");
    assert_eq!(value["build"]["name"], "codebase-index-core");
    assert!(value["sidecarTarget"].is_string());
    Ok(())
}

#[test]
fn config_show_applies_env_and_overrides() -> Result<(), Box<dyn std::error::Error>> {
    let home = tempfile::tempdir()?;
    let output = run_cli(
        home.path(),
        &[
            "--output",
            "json",
            "config",
            "show",
            "--overrides-json",
            r#"{"monitor":{"batchSize":25}}"#,
        ],
    )?;
    assert!(output.status.success());

    let value = stdout_json(&output)?;
    assert_eq!(value["effectiveConfig"]["monitor"]["batchSize"], 25);
    assert_eq!(value["effectiveConfig"]["supervisor"]["listenPort"], 11380);
    Ok(())
}

#[test]
fn config_check_rejects_unknown_fields() -> Result<(), Box<dyn std::error::Error>> {
    let home = tempfile::tempdir()?;
    let output = run_cli(
        home.path(),
        &[
            "--output",
            "json",
            "config",
            "check",
            "--overrides-json",
            r#"{"monitor":{"flushEverything":true}}"#,
        ],
    )?;
    assert_eq!(output.status.code(), Some(2));

    let value = stdout_json(&output)?;
    assert_eq!(value["status"], "error");
    assert!(
        value["error"]["code"]
            .as_str()
            .is_some_and(|code| code.starts_with("config:"))
    );
    Ok(())
}

#[test]
fn config_check_text_for_a_toml_file() -> Result<(), Box<dyn std::error::Error>> {
    let home = tempfile::tempdir()?;
    let path = home.path().join("cbi.toml");
    std::fs::write(&path, "version = 1\n\n[monitor]\ndebounceMs = 2000\n")?;
    let path_arg = path.display().to_string();

    let output = run_cli(home.path(), &["config", "check", "--config", &path_arg])?;
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout)?;
    assert!(stdout.starts_with("status: ok\nconfig: ok\npath: "));
    Ok(())
}

#[test]
fn status_of_a_fresh_home() -> Result<(), Box<dyn std::error::Error>> {
    let home = tempfile::tempdir()?;
    let output = run_cli(home.path(), &["--agent", "status"])?;
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout)?;
    assert_eq!(stdout.lines().count(), 1);
    let value: serde_json::Value = serde_json::from_str(stdout.trim())?;
    assert_eq!(value["type"], "summary");
    assert_eq!(value["kind"], "status");
    assert_eq!(value["binaryPresent"], false);
    assert!(value.get("install").is_none());
    Ok(())
}

#[test]
fn services_read_the_registry_file() -> Result<(), Box<dyn std::error::Error>> {
    let home = tempfile::tempdir()?;
    let share = home.path().join(".codebase-index").join("share");
    std::fs::create_dir_all(&share)?;
    std::fs::write(
        share.join(".well-known.json"),
        r#"{"services":[{"name":"codebase-indexer","status":"running","port":11380},{"name":"codegraph","status":"stopped","port":11381}]}"#,
    )?;

    let output = run_cli(home.path(), &["services"])?;
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout)?;
    assert!(stdout.contains("services: 2\n"));
    assert!(stdout.contains("- codebase-indexer running http://localhost:11380\n"));
    assert!(stdout.contains("- codegraph stopped http://localhost:11381\n"));
    Ok(())
}

#[test]
fn stop_without_a_sidecar_stops_nothing() -> Result<(), Box<dyn std::error::Error>> {
    let home = tempfile::tempdir()?;
    let output = run_cli(home.path(), &["--output", "json", "stop"])?;
    assert!(output.status.success());

    let value = stdout_json(&output)?;
    assert_eq!(value["stopped"], 0);
    Ok(())
}

#[test]
fn run_rejects_a_missing_workspace() -> Result<(), Box<dyn std::error::Error>> {
    let home = tempfile::tempdir()?;
    let missing = home.path().join("no-such-project");
    let missing_arg = missing.display().to_string();

    let output = run_cli(home.path(), &["run", &missing_arg])?;
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8(output.stderr)?;
    assert!(stderr.contains("not a directory"));
    Ok(())
}

#[test]
fn check_update_reports_an_unreachable_catalog() -> Result<(), Box<dyn std::error::Error>> {
    let home = tempfile::tempdir()?;
    let output = run_cli(
        home.path(),
        &[
            "--output",
            "json",
            "check-update",
            "--overrides-json",
            r#"{"catalog":{"baseUrl":"http://127.0.0.1:9","timeoutMs":1000}}"#,
        ],
    )?;
    assert!(!output.status.success());

    let value = stdout_json(&output)?;
    assert_eq!(value["status"], "error");
    assert!(
        value["error"]["code"]
            .as_str()
            .is_some_and(|code| code.starts_with("catalog:"))
    );
    Ok(())
}
