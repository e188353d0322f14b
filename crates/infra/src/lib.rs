//! # codebase-index-infra
//!
//! Infrastructure wiring and runtime composition.
//! This crate depends on `app`, `adapters`, `config`, and `shared`.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

/// Blocking entry points used by the CLI.
pub mod cli_local;
/// Config loading helpers used by CLI surfaces.
pub mod config_check;
/// Environment validation helpers used by CLI surfaces.
pub mod env_check;
/// Headless provider context and notifier.
pub mod host;
/// Logger and telemetry selection.
pub mod observability;
/// Watch event routing into the event monitor.
pub mod routing;
/// The host-facing runtime.
pub mod runtime;
/// Production adapter selection.
pub mod wiring;

pub use cli_local::{
    InstallSummary, LocalOptions, LocalStatus, UpdateCheck, list_services_local,
    read_status_local, run_check_update_local, run_daemon_local, run_daemon_until,
    run_install_local, run_restart_local, run_start_local, run_stop_local,
};
pub use config_check::{load_effective_config, load_effective_config_json};
pub use env_check::{InfraError, InfraResult, validate_env_parsing};
pub use host::{StaticProviderContext, StderrNotifier};
pub use observability::Observability;
pub use routing::WatchRouter;
pub use runtime::{IndexerRuntime, RuntimeStatus};
pub use wiring::{RuntimeParts, build_supervisor, production_parts};

// Re-export redaction utilities for CLI boundary sanitization
pub use codebase_index_shared::{is_secret_key, redact_if_secret};

/// Returns the infra crate version.
#[must_use]
pub const fn infra_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;
    use codebase_index_adapters::adapters_crate_version;
    use codebase_index_app::app_crate_version;
    use codebase_index_config::config_crate_version;
    use codebase_index_shared::shared_crate_version;

    fn workspace_deps() -> Vec<String> {
        let cargo_toml = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/Cargo.toml"));
        let mut deps = Vec::new();
        let mut in_deps = false;

        for raw_line in cargo_toml.lines() {
            let line = raw_line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            if line.starts_with('[') {
                in_deps = line == "[dependencies]";
                continue;
            }
            if in_deps && line.starts_with("codebase-index-") {
                let key = line.split('=').next().unwrap_or("").trim();
                let name = key.split('.').next().unwrap_or("").trim();
                deps.push(name.to_string());
            }
        }

        deps
    }

    #[test]
    fn infra_depends_on_app_adapters_config() {
        let deps = workspace_deps();
        let required = [
            "codebase-index-app",
            "codebase-index-adapters",
            "codebase-index-config",
        ];

        for expected in required {
            assert!(
                deps.iter().any(|dep| dep == expected),
                "missing dependency: {expected}"
            );
        }
        assert!(!deps.iter().any(|dep| dep == "codebase-index-testkit"));
    }

    #[test]
    fn infra_can_use_app_adapters_config_shared() {
        assert!(!infra_crate_version().is_empty());
        assert!(!app_crate_version().is_empty());
        assert!(!adapters_crate_version().is_empty());
        assert!(!config_crate_version().is_empty());
        assert!(!shared_crate_version().is_empty());
    }
}
