//! Durable install record.

use crate::BoxFuture;
use codebase_index_domain::{PackageInfo, VersionInfo};
use codebase_index_shared::{RequestContext, Result};

/// Held while a download is in flight; dropping it releases the lock.
pub struct InstallLock(
    #[allow(dead_code, reason = "held only for its Drop side effect")] Box<dyn Send + Sync>,
);

impl InstallLock {
    /// Wrap whatever keeps the lock alive.
    pub fn new(guard: impl Send + Sync + 'static) -> Self {
        Self(Box::new(guard))
    }
}

impl std::fmt::Debug for InstallLock {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str("InstallLock")
    }
}

/// Persistence of the single per-machine [`VersionInfo`].
pub trait VersionStorePort: Send + Sync {
    /// Read the record; missing or unparsable files yield `None`.
    fn load(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<Option<VersionInfo>>>;

    /// Replace the record.
    fn save(&self, ctx: &RequestContext, info: VersionInfo) -> BoxFuture<'_, Result<()>>;

    /// Append a package snapshot to the audit trail.
    fn save_package_snapshot(
        &self,
        ctx: &RequestContext,
        package: PackageInfo,
    ) -> BoxFuture<'_, Result<()>>;

    /// Best-effort advisory lock; `None` when another process holds it.
    fn try_lock(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<Option<InstallLock>>>;
}
