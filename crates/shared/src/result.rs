//! Shared result alias and small combinators over it.

use crate::errors::{ErrorClass, ErrorEnvelope};
use std::fmt;

/// Shared result type used across the workspace.
pub type Result<T, E = ErrorEnvelope> = std::result::Result<T, E>;

/// Envelope-aware helpers for `Result<T, ErrorEnvelope>`.
pub trait ResultExt<T> {
    /// Attach a metadata entry to the error, if any.
    fn with_meta(self, key: &str, value: impl Into<String>) -> Result<T>;

    /// Prefix the error message with context, if any.
    fn context(self, context: impl fmt::Display) -> Result<T>;

    /// Mark the error as non-retriable.
    fn non_retriable(self) -> Result<T>;

    /// Swallow cancellation, mapping it to `None`.
    fn ok_unless_cancelled(self) -> Result<Option<T>>;
}

impl<T> ResultExt<T> for Result<T> {
    fn with_meta(self, key: &str, value: impl Into<String>) -> Self {
        self.map_err(|error| error.with_metadata(key, value))
    }

    fn context(self, context: impl fmt::Display) -> Self {
        self.map_err(|error| error.context(context))
    }

    fn non_retriable(self) -> Self {
        self.map_err(|error| error.with_class(ErrorClass::NonRetriable))
    }

    fn ok_unless_cancelled(self) -> Result<Option<T>> {
        match self {
            Ok(value) => Ok(Some(value)),
            Err(error) if error.is_cancelled() => Ok(None),
            Err(error) => Err(error),
        }
    }
}
