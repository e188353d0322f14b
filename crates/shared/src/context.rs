//! Request-scoped context: a correlation id plus a cancellation token.
//!
//! Long-lived owners (the supervisor, the event monitor) hold a root context
//! and hand out children; cancelling the root during teardown stops every
//! download, timer and poll loop derived from it.

use crate::{ErrorCode, ErrorEnvelope, Result};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Correlation identifier carried in logs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationId(Arc<str>);

impl CorrelationId {
    /// Parse a correlation identifier; the value is trimmed and must be non-empty.
    pub fn parse(value: impl AsRef<str>) -> Result<Self> {
        let trimmed = value.as_ref().trim();
        if trimmed.is_empty() {
            return Err(ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "correlation id must be non-empty",
            ));
        }
        Ok(Self(Arc::from(trimmed)))
    }

    /// Fresh `req_<n>` id, unique within this process.
    #[must_use]
    pub fn new_request_id() -> Self {
        Self::scoped("req_")
    }

    /// Fresh `task_<n>` id for background work.
    #[must_use]
    pub fn new_task_id() -> Self {
        Self::scoped("task_")
    }

    fn scoped(prefix: &str) -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(Arc::from(format!("{prefix}{n}")))
    }

    /// Borrow the identifier as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Clonable, awaitable cancellation flag with parent/child propagation.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(tokio_util::sync::CancellationToken);

impl CancellationToken {
    /// New token in the non-cancelled state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Token cancelled whenever `self` is cancelled (but not the reverse).
    #[must_use]
    pub fn child(&self) -> Self {
        Self(self.0.child_token())
    }

    /// Cancel the token and wake every waiter.
    pub fn cancel(&self) {
        self.0.cancel();
    }

    /// Returns true once cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.is_cancelled()
    }

    /// Resolves when the token is cancelled.
    pub async fn cancelled(&self) {
        self.0.cancelled().await;
    }
}

/// Context passed to every port call.
#[derive(Debug, Clone)]
pub struct RequestContext {
    correlation_id: CorrelationId,
    cancellation: CancellationToken,
}

impl RequestContext {
    /// Context with a fresh cancellation token.
    #[must_use]
    pub fn new(correlation_id: CorrelationId) -> Self {
        Self::with_cancellation(correlation_id, CancellationToken::new())
    }

    /// Context with an auto-generated `req_*` id.
    #[must_use]
    pub fn new_request() -> Self {
        Self::new(CorrelationId::new_request_id())
    }

    /// Context sharing an existing cancellation token.
    #[must_use]
    pub const fn with_cancellation(
        correlation_id: CorrelationId,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            correlation_id,
            cancellation,
        }
    }

    /// Child context with a new task id, cancelled together with `self`.
    #[must_use]
    pub fn child(&self) -> Self {
        Self::with_cancellation(CorrelationId::new_task_id(), self.cancellation.child())
    }

    /// Return the correlation id.
    #[must_use]
    pub const fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    /// Return a clone of the cancellation token.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Returns true if the context was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Cancel this context and its children.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// Resolves when the context is cancelled.
    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await;
    }

    /// `core:cancelled` error tagged with the operation when cancelled.
    pub fn ensure_not_cancelled(&self, operation: &'static str) -> Result<()> {
        if self.is_cancelled() {
            return Err(cancelled_error(operation));
        }
        Ok(())
    }
}

pub(crate) fn cancelled_error(operation: &'static str) -> ErrorEnvelope {
    ErrorEnvelope::cancelled("operation cancelled").with_metadata("operation", operation)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correlation_ids_are_trimmed_and_unique() -> Result<()> {
        assert_eq!(CorrelationId::parse("  abc ")?.as_str(), "abc");
        assert!(CorrelationId::parse("   ").is_err());
        assert_ne!(CorrelationId::new_request_id(), CorrelationId::new_request_id());
        Ok(())
    }

    #[test]
    fn cancelling_parent_cancels_child_only_downwards() {
        let root = RequestContext::new_request();
        let child = root.child();
        let sibling = root.child();

        child.cancel();
        assert!(child.is_cancelled());
        assert!(!root.is_cancelled());
        assert!(!sibling.is_cancelled());

        root.cancel();
        assert!(sibling.is_cancelled());
        let error = sibling
            .ensure_not_cancelled("download")
            .err()
            .map(|error| error.metadata.get("operation").cloned());
        assert_eq!(error, Some(Some("download".to_string())));
    }

    #[tokio::test]
    async fn cancelled_future_resolves_after_cancel() {
        let ctx = RequestContext::new_request();
        let waiter = ctx.clone();
        let task = tokio::spawn(async move { waiter.cancelled().await });
        tokio::task::yield_now().await;
        ctx.cancel();
        assert!(task.await.is_ok());
    }
}
