//! Host collaborators: provider context, user prompts, clock.

use crate::BoxFuture;
use codebase_index_domain::ProviderState;
use codebase_index_shared::{RequestContext, Result, SecretString};

/// Active provider and credentials, owned by the host.
pub trait ProviderContextPort: Send + Sync {
    /// Provider kind and feature toggle.
    fn provider_state(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<ProviderState>>;

    /// Current bearer token.
    fn bearer_token(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<SecretString>>;
}

/// Manual fix offered alongside a prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptAction {
    /// Try starting the sidecar again.
    Retry,
    /// Remove the install record and reinstall.
    Reinstall,
}

/// User-visible notifications.
pub trait HostNotifierPort: Send + Sync {
    /// Show `message` with a fix action.
    fn prompt(&self, message: &str, action: PromptAction);
}

/// Wall and monotonic time.
pub trait ClockPort: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_epoch_ms(&self) -> u64;

    /// Milliseconds on a monotonic clock with an arbitrary origin.
    fn monotonic_ms(&self) -> u64;
}
