//! Remote version catalog.

use crate::BoxFuture;
use codebase_index_domain::{PackageInfo, Target, VersionDescriptor, VersionList};
use codebase_index_shared::{RequestContext, Result};

/// Read-only access to the release catalog.
pub trait VersionCatalogPort: Send + Sync {
    /// `GET {base}/{platform}/{arch}/platform.json`
    fn fetch_version_list(
        &self,
        ctx: &RequestContext,
        target: Target,
    ) -> BoxFuture<'_, Result<VersionList>>;

    /// `GET {base}{infoUrl}`
    fn fetch_package_info(
        &self,
        ctx: &RequestContext,
        descriptor: VersionDescriptor,
    ) -> BoxFuture<'_, Result<PackageInfo>>;
}
