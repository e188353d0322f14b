//! Info command handler.

use crate::error::{CliError, ExitCode};
use crate::format::OutputMode;
use crate::{CliOutput, format_ok_output};
use codebase_index_core::{BuildInfo, build_info};
use codebase_index_domain::Target;
use codebase_index_infra::infra_crate_version;

/// Run the info command.
pub fn run_info(mode: OutputMode) -> Result<CliOutput, CliError> {
    let build = build_info();
    let target = Target::current();
    let target = format!("{}/{}", target.platform, target.arch);
    let payload = serde_json::json!({
        "build": {
            "name": build.name,
            "version": build.version,
            "infraVersion": infra_crate_version(),
            "rustVersion": build.rust_version,
            "os": build.os,
            "arch": build.arch,
            "profile": build.profile,
            "gitHash": build.git_hash,
        },
        "sidecarTarget": target,
    });
    format_ok_output(
        mode,
        "info",
        payload,
        format_info_text(&build, &target),
        String::new(),
        ExitCode::Ok,
    )
}

fn format_info_text(build: &BuildInfo, target: &str) -> String {
    format!(
        "status: ok\nname: {}\nversion: {}\ninfra: {}\nrust: {}\nhost: {}/{}\nprofile: {}\ngit: {}\nsidecarTarget: {target}\n",
        build.name,
        build.version,
        infra_crate_version(),
        build.rust_version,
        build.os,
        build.arch,
        build.profile,
        build.git_hash.unwrap_or("none"),
    )
}
