//! # codebase-index-shared
//!
//! Foundational types used by every crate of the codebase-index workspace:
//!
//! - the structured [`ErrorEnvelope`] and the shared [`Result`] alias
//! - request context and cancellation ([`RequestContext`], [`CancellationToken`])
//! - retry helpers bounded by attempts ([`RetryPolicy`]) or by a wall-clock budget ([`RetryBudget`])
//! - cancellation-aware timeouts and sleeps
//! - secret redaction
//!
//! This crate has no workspace dependencies.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod context;
pub mod errors;
pub mod redaction;
pub mod result;
pub mod retry;
pub mod timeout;

pub use context::{CancellationToken, CorrelationId, RequestContext};
pub use errors::{
    ErrorClass, ErrorCode, ErrorEnvelope, ErrorKind, ErrorMetadata, REDACTED_VALUE,
    UnexpectedError, normalize_unexpected_error, redact_metadata,
};
pub use redaction::{REDACTED, SecretString, is_secret_key, redact_if_secret};
pub use result::{Result, ResultExt};
pub use retry::{
    RetryBudget, RetryOutcome, RetryPolicy, retry_async, retry_async_with_observer,
    retry_within_budget,
};
pub use timeout::{sleep_with_context, timeout_with_context};

/// Returns the shared crate version.
#[must_use]
pub const fn shared_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
