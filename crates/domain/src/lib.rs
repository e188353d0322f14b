//! # codebase-index-domain
//!
//! Data model of the codebase-index sidecar manager:
//!
//! - **Versions** - `VersionId`, `VersionInfo`, `PackageInfo`, catalog listings
//! - **Platform** - `(platform, arch)` resolution for artifact selection
//! - **Registry** - entries of the side-channel file written by the sidecar
//! - **Events** - `WorkspaceEventData` and resource URIs
//! - **States** - supervisor lifecycle and install outcomes
//! - **Provider** - provider snapshot and the needs-provider skip signal
//! - **Ingest** - request/response shapes of the ingestion API
//!
//! Depends only on `shared`; no I/O.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub use codebase_index_shared::shared_crate_version;

pub mod events;
pub mod ingest;
pub mod platform;
pub mod provider;
pub mod registry;
pub mod states;
pub mod version;

pub use events::{ResourceUri, WorkspaceEventData, WorkspaceEventType, format_event_time};
pub use ingest::{EventBatch, IgnoreCheckRequest, IndexBuildRequest, IndexBuildType, IngestResponse};
pub use platform::{Arch, Platform, Target, resolve_target};
pub use provider::{ProviderState, is_needs_provider, needs_provider_code, needs_provider_error};
pub use registry::{ServiceRegistry, ServiceRegistryEntry, ServiceStatus, normalize_service_name};
pub use states::{ClientState, UpgradeOutcome};
pub use version::{
    ChecksumAlgo, PackageInfo, VersionDescriptor, VersionId, VersionInfo, VersionList,
    VersionStatus,
};

/// Returns the domain crate version.
#[must_use]
pub const fn domain_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
