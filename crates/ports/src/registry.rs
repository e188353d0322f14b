//! Side-channel service registry.

use crate::BoxFuture;
use codebase_index_domain::{ServiceRegistryEntry, normalize_service_name};
use codebase_index_shared::{RequestContext, Result};

/// Read-only view of the registry file written by the sidecar.
pub trait ServiceRegistryPort: Send + Sync {
    /// Every listed service; absent or malformed files yield an empty list.
    fn list_services(
        &self,
        ctx: &RequestContext,
    ) -> BoxFuture<'_, Result<Vec<ServiceRegistryEntry>>>;

    /// Entry for `name`, ignoring the executable suffix.
    fn get_service_config(
        &self,
        ctx: &RequestContext,
        name: &str,
    ) -> BoxFuture<'_, Result<Option<ServiceRegistryEntry>>> {
        let wanted = normalize_service_name(name).to_owned();
        let listing = self.list_services(ctx);
        Box::pin(async move {
            let services = listing.await?;
            Ok(services
                .into_iter()
                .find(|entry| normalize_service_name(&entry.name) == wanted))
        })
    }
}
