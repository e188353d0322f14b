//! # codebase-index-adapters
//!
//! Adapter implementations for ports: the release catalog over HTTP, the
//! verified artifact installer, the on-disk version store, the well-known
//! service registry, process control, the sidecar ingestion client, ignore
//! rules, filesystem watching and the logging/telemetry sinks.
//! This crate depends on `ports`, `shared`, `domain` and `config`.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod artifact;
pub mod catalog;
pub mod clock;
mod http;
pub mod ignore;
pub mod ingest;
pub mod log_sink;
pub mod logger;
pub mod process;
pub mod registry;
pub mod store;
pub mod telemetry;
pub mod watcher;

pub use artifact::HttpArtifactInstaller;
pub use catalog::HttpVersionCatalog;
pub use clock::SystemClock;
pub use ignore::IgnoreRuleGate;
pub use ingest::HttpIngestClient;
pub use process::SysinfoProcessControl;
pub use registry::WellKnownRegistry;
pub use store::JsonVersionStore;
pub use watcher::NotifyWatcher;

/// Returns the adapters crate version.
#[must_use]
pub const fn adapters_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
