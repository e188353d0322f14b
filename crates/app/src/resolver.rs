//! Latest-version lookup against the release catalog.

use codebase_index_domain::{Target, VersionDescriptor, VersionInfo, VersionList};
use codebase_index_ports::VersionCatalogPort;
use codebase_index_shared::{RequestContext, Result};
use std::sync::Arc;

/// Read-only view of the catalog for one `(platform, arch)` target.
#[derive(Clone)]
pub struct VersionResolver {
    catalog: Arc<dyn VersionCatalogPort>,
    target: Target,
}

impl VersionResolver {
    /// Resolver for `target`.
    pub fn new(catalog: Arc<dyn VersionCatalogPort>, target: Target) -> Self {
        Self { catalog, target }
    }

    /// Target used in catalog paths.
    pub const fn target(&self) -> Target {
        self.target
    }

    /// Every published version for the target.
    pub async fn get_version_list(&self, ctx: &RequestContext) -> Result<VersionList> {
        self.catalog.fetch_version_list(ctx, self.target).await
    }

    /// The `newest` entry of the listing.
    pub async fn get_latest_version(&self, ctx: &RequestContext) -> Result<VersionDescriptor> {
        Ok(self.get_version_list(ctx).await?.newest)
    }

    /// True when `current` failed or `latest` is strictly newer.
    pub fn should_update(current: &VersionInfo, latest: &VersionDescriptor) -> bool {
        current.should_update_to(latest.version_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codebase_index_domain::{VersionStatus, resolve_target};
    use codebase_index_testkit::fixtures;
    use codebase_index_testkit::in_memory::FakeCatalog;

    #[tokio::test]
    async fn latest_is_the_newest_listing_entry() -> Result<()> {
        let catalog = Arc::new(FakeCatalog::new(
            fixtures::descriptor(1, 2, 0),
            fixtures::package(1, 2, 0),
        ));
        let resolver = VersionResolver::new(catalog.clone(), resolve_target("linux", "x86_64"));
        let ctx = RequestContext::new_request();

        let latest = resolver.get_latest_version(&ctx).await?;
        assert_eq!(latest, fixtures::descriptor(1, 2, 0));
        assert_eq!(catalog.list_calls(), 1);
        Ok(())
    }

    #[test]
    fn failed_installs_update_even_to_the_same_version() {
        let latest = fixtures::descriptor(1, 2, 0);
        let done = fixtures::version_info(1, 2, 0, VersionStatus::Downloaded, 0);
        let failed = fixtures::version_info(1, 2, 0, VersionStatus::Failed, 0);
        assert!(!VersionResolver::should_update(&done, &latest));
        assert!(VersionResolver::should_update(&failed, &latest));
        let older = fixtures::version_info(1, 1, 9, VersionStatus::Downloaded, 0);
        assert!(VersionResolver::should_update(&older, &latest));
    }
}
