//! Read-only views of the sidecar install.

use crate::error::{CliError, ExitCode};
use crate::format::OutputMode;
use crate::{CliOutput, format_error_output, format_ok_output};
use codebase_index_domain::ServiceRegistryEntry;
use codebase_index_infra::{LocalOptions, LocalStatus, list_services_local, read_status_local};

/// Install record, registry entry and running sidecar processes.
pub fn run_status(mode: OutputMode, options: &LocalOptions) -> Result<CliOutput, CliError> {
    let status = match read_status_local(options) {
        Ok(status) => status,
        Err(error) => return Ok(format_error_output(mode, &error)),
    };
    format_ok_output(
        mode,
        "status",
        serde_json::to_value(&status)?,
        format_status_text(&status),
        String::new(),
        ExitCode::Ok,
    )
}

/// Every entry of the registry file.
pub fn run_services(mode: OutputMode, options: &LocalOptions) -> Result<CliOutput, CliError> {
    let services = match list_services_local(options) {
        Ok(services) => services,
        Err(error) => return Ok(format_error_output(mode, &error)),
    };
    format_ok_output(
        mode,
        "services",
        serde_json::json!({ "services": services }),
        format_services_text(&services),
        String::new(),
        ExitCode::Ok,
    )
}

fn format_status_text(status: &LocalStatus) -> String {
    let mut out = String::from("status: ok\n");
    push_line(&mut out, "home", &status.home);
    push_line(&mut out, "target", &status.target);
    push_line(&mut out, "binary", &status.binary_path);
    push_line(&mut out, "binaryPresent", &status.binary_present.to_string());
    match &status.install {
        Some(record) => {
            push_line(&mut out, "installedVersion", &record.version_id.to_string());
            push_line(&mut out, "installStatus", &record.status.to_string());
        },
        None => push_line(&mut out, "installedVersion", "none"),
    }
    let pids = status
        .pids
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(",");
    push_line(&mut out, "pids", if pids.is_empty() { "none" } else { &pids });
    push_line(
        &mut out,
        "endpoint",
        status.endpoint.as_deref().unwrap_or("none"),
    );
    out
}

fn format_services_text(services: &[ServiceRegistryEntry]) -> String {
    let mut out = String::from("status: ok\n");
    push_line(&mut out, "services", &services.len().to_string());
    for service in services {
        out.push_str(&format!(
            "- {} {} {}\n",
            service.name,
            service.status,
            service.endpoint()
        ));
    }
    out
}

fn push_line(out: &mut String, key: &str, value: &str) {
    out.push_str(key);
    out.push_str(": ");
    out.push_str(value);
    out.push('\n');
}
