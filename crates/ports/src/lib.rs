//! # codebase-index-ports
//!
//! Boundary traits between the sidecar manager's use-cases and the outside
//! world: the release catalog, the artifact store, the local process table,
//! the sidecar's HTTP API, the host editor and the filesystem.
//!
//! Depends only on `domain` and `shared`. I/O-bound methods take a
//! [`RequestContext`](codebase_index_shared::RequestContext) and return a
//! [`BoxFuture`].

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

use std::future::Future;
use std::pin::Pin;

/// Boxed future used by port traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Returns the ports crate version.
#[must_use]
pub const fn ports_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub mod artifact;
pub mod catalog;
pub mod gate;
pub mod host;
pub mod ingest;
pub mod logger;
pub mod process;
pub mod registry;
pub mod store;
pub mod telemetry;

pub use artifact::*;
pub use catalog::*;
pub use gate::*;
pub use host::*;
pub use ingest::*;
pub use logger::*;
pub use process::*;
pub use registry::*;
pub use store::*;
pub use telemetry::*;

#[cfg(test)]
mod tests {
    use super::*;

    fn workspace_deps() -> Vec<String> {
        let manifest = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/Cargo.toml"));
        let mut section = "";
        let mut deps = Vec::new();
        for line in manifest.lines().map(str::trim) {
            if line.starts_with('[') {
                section = line;
                continue;
            }
            if section.ends_with("dependencies]") && line.starts_with("codebase-index-") {
                let name = line.split(['.', '=']).next().unwrap_or("").trim();
                deps.push(name.to_owned());
            }
        }
        deps
    }

    #[test]
    fn ports_depend_only_on_domain_and_shared() {
        let deps = workspace_deps();
        let allowed = ["codebase-index-domain", "codebase-index-shared"];
        for dep in &deps {
            assert!(allowed.contains(&dep.as_str()), "unexpected dependency: {dep}");
        }
        for expected in allowed {
            assert!(deps.iter().any(|dep| dep == expected), "missing: {expected}");
        }
    }

    #[test]
    fn port_traits_are_object_safe() {
        fn assert_dyn<T: ?Sized>() {}
        assert_dyn::<dyn VersionCatalogPort>();
        assert_dyn::<dyn ArtifactInstallerPort>();
        assert_dyn::<dyn VersionStorePort>();
        assert_dyn::<dyn ServiceRegistryPort>();
        assert_dyn::<dyn ProcessControlPort>();
        assert_dyn::<dyn IngestPort>();
        assert_dyn::<dyn ProviderContextPort>();
        assert_dyn::<dyn HostNotifierPort>();
        assert_dyn::<dyn ClockPort>();
        assert_dyn::<dyn IgnoreGatePort>();
        assert_dyn::<dyn FileWatcherPort>();
        assert_dyn::<dyn LoggerPort>();
        assert_dyn::<dyn TelemetryPort>();
        assert!(!ports_crate_version().is_empty());
    }
}
