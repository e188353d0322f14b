//! # codebase-index-app
//!
//! Use-cases of the sidecar manager: version resolution, install and
//! upgrade, process supervision with health checks, and the workspace
//! event pipeline.
//!
//! Depends on `ports`, `domain`, `shared` and the section types of `config`.
//! Concrete adapters are wired in by `infra`.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod buffer;
pub mod cache;
pub mod health;
pub mod monitor;
pub mod resolver;
pub mod supervisor;

pub use buffer::EventBuffer;
pub use cache::{CachedContent, DocumentContentCache, content_hash};
pub use health::{HealthState, HealthVerdict};
pub use monitor::{
    DELIVERY_FAILED_COUNTER, EventMonitor, EventPublisher, MonitorDeps, MonitorSettings,
};
pub use resolver::VersionResolver;
pub use supervisor::{Supervisor, SupervisorDeps, SupervisorSettings, SupervisorStatus};

/// Returns the app crate version.
#[must_use]
pub const fn app_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;
    use codebase_index_domain::domain_crate_version;
    use codebase_index_ports::ports_crate_version;

    #[test]
    fn app_never_depends_on_adapters_or_infra() {
        let manifest = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/Cargo.toml"));
        for forbidden in ["codebase-index-adapters", "codebase-index-infra"] {
            let normal_deps = manifest
                .split("[dev-dependencies]")
                .next()
                .unwrap_or_default();
            assert!(!normal_deps.contains(forbidden), "app must not depend on {forbidden}");
        }
    }

    #[test]
    fn app_links_ports_and_domain() {
        assert!(!app_crate_version().is_empty());
        assert_eq!(ports_crate_version(), domain_crate_version());
    }
}
