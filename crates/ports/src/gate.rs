//! Ignore policy and file watching.

use crate::BoxFuture;
use codebase_index_shared::{RequestContext, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Path-based ignore policy for one workspace root.
pub trait IgnoreGatePort: Send + Sync {
    /// False when a loaded rule matches `path`; outside-root paths and empty rule sets allow.
    fn validate_access(&self, path: &Path) -> bool;

    /// Rebuild the rule set from the ignore files at the root.
    fn reload(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<()>>;

    /// True when `path` is one of the ignore files feeding the rule set.
    fn is_rule_file(&self, path: &Path) -> bool;
}

/// Raw change reported by the filesystem watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// A path was created.
    Created(PathBuf),
    /// A path's content changed.
    Modified(PathBuf),
    /// A path was removed.
    Removed(PathBuf),
    /// A path was renamed.
    Renamed {
        /// Old path.
        from: PathBuf,
        /// New path.
        to: PathBuf,
    },
}

/// Callback receiving watcher events.
pub type WatchCallback = Arc<dyn Fn(WatchEvent) + Send + Sync>;

/// Keeps a watch alive; dropping it stops delivery.
pub struct WatchSubscription(
    #[allow(dead_code, reason = "held only for its Drop side effect")] Box<dyn Send>,
);

impl WatchSubscription {
    /// Wrap whatever keeps the watch alive.
    pub fn new(guard: impl Send + 'static) -> Self {
        Self(Box::new(guard))
    }
}

impl std::fmt::Debug for WatchSubscription {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str("WatchSubscription")
    }
}

/// Recursive filesystem watch.
pub trait FileWatcherPort: Send + Sync {
    /// Watch `root` recursively.
    fn watch(&self, root: &Path, callback: WatchCallback) -> Result<WatchSubscription>;
}
