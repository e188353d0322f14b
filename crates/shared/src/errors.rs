//! Structured error envelope shared by every layer.
//!
//! Errors carry a stable `namespace:code` pair, a retry classification and
//! free-form metadata (URL, path, attempt count). Callers decide what to do
//! with a failure by looking at the code and class, never at the message.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::{fmt, io};

/// Metadata attached to errors for diagnostics.
pub type ErrorMetadata = BTreeMap<String, String>;

/// Placeholder written in place of sensitive metadata values.
pub const REDACTED_VALUE: &str = "<redacted>";

/// Where a failure comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    /// Expected failures: bad input, cancellation, precondition skips.
    Expected,
    /// A broken internal assumption.
    Invariant,
    /// I/O and dependency failures.
    Unexpected,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::Expected => "expected",
            Self::Invariant => "invariant",
            Self::Unexpected => "unexpected",
        })
    }
}

/// Whether the owner of a retry policy may try again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorClass {
    /// Transient failure; retrying may succeed.
    Retriable,
    /// Permanent failure for this input.
    NonRetriable,
}

impl ErrorClass {
    /// Returns true when the error is considered retriable.
    #[must_use]
    pub const fn is_retriable(self) -> bool {
        matches!(self, Self::Retriable)
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(if self.is_retriable() {
            "retriable"
        } else {
            "non-retriable"
        })
    }
}

/// Stable error code: a namespace plus an identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ErrorCode {
    namespace: String,
    code: String,
}

impl ErrorCode {
    /// Create a new error code with a namespace and code.
    pub fn new(namespace: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            code: code.into(),
        }
    }

    /// `core:cancelled`
    pub fn cancelled() -> Self {
        Self::new("core", "cancelled")
    }

    /// `core:invalid_input`
    pub fn invalid_input() -> Self {
        Self::new("core", "invalid_input")
    }

    /// `core:not_found`
    pub fn not_found() -> Self {
        Self::new("core", "not_found")
    }

    /// `core:permission_denied`
    pub fn permission_denied() -> Self {
        Self::new("core", "permission_denied")
    }

    /// `core:timeout`
    pub fn timeout() -> Self {
        Self::new("core", "timeout")
    }

    /// `core:io`
    pub fn io() -> Self {
        Self::new("core", "io")
    }

    /// `core:internal`
    pub fn internal() -> Self {
        Self::new("core", "internal")
    }

    /// `core:rate_limited`
    pub fn rate_limited() -> Self {
        Self::new("core", "rate_limited")
    }

    /// `core:dependency_unavailable`
    pub fn dependency_unavailable() -> Self {
        Self::new("core", "dependency_unavailable")
    }

    /// Returns the namespace portion.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Returns the code identifier.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}:{}", self.namespace, self.code)
    }
}

/// Structured error envelope shared across crates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// Origin category.
    pub kind: ErrorKind,
    /// Retry classification.
    pub class: ErrorClass,
    /// Stable error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
    /// Diagnostic metadata.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: ErrorMetadata,
}

impl ErrorEnvelope {
    fn build(kind: ErrorKind, class: ErrorClass, code: ErrorCode, message: String) -> Self {
        Self {
            kind,
            class,
            code,
            message,
            metadata: ErrorMetadata::new(),
        }
    }

    /// Expected, non-retriable error.
    pub fn expected(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::expected_with_class(code, message, ErrorClass::NonRetriable)
    }

    /// Expected error with an explicit retry classification.
    pub fn expected_with_class(
        code: ErrorCode,
        message: impl Into<String>,
        class: ErrorClass,
    ) -> Self {
        Self::build(ErrorKind::Expected, class, code, message.into())
    }

    /// Invariant violation (never retriable).
    pub fn invariant(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::build(
            ErrorKind::Invariant,
            ErrorClass::NonRetriable,
            code,
            message.into(),
        )
    }

    /// Unexpected error with the provided retry classification.
    pub fn unexpected(code: ErrorCode, message: impl Into<String>, class: ErrorClass) -> Self {
        Self::build(ErrorKind::Unexpected, class, code, message.into())
    }

    /// Cancellation error.
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::expected(ErrorCode::cancelled(), message)
    }

    /// Returns true if the error represents a cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.code == ErrorCode::cancelled()
    }

    /// Returns true when the owner of a retry policy may try again.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        self.class.is_retriable()
    }

    /// Returns true when the code matches `namespace:code`.
    #[must_use]
    pub fn has_code(&self, namespace: &str, code: &str) -> bool {
        self.code.namespace() == namespace && self.code.code() == code
    }

    /// Attach a single metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Force the retry classification.
    #[must_use]
    pub const fn with_class(mut self, class: ErrorClass) -> Self {
        self.class = class;
        self
    }

    /// Prefix the message with extra context, keeping code and class.
    #[must_use]
    pub fn context(mut self, context: impl fmt::Display) -> Self {
        self.message = format!("{context}: {}", self.message);
        self
    }

    /// Replace metadata with a redacted copy for the provided keys.
    #[must_use]
    pub fn redact_metadata(self, keys: &[&str]) -> Self {
        Self {
            metadata: redact_metadata(self.metadata, keys),
            ..self
        }
    }
}

impl fmt::Display for ErrorEnvelope {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for ErrorEnvelope {}

impl From<io::Error> for ErrorEnvelope {
    fn from(error: io::Error) -> Self {
        normalize_unexpected_error(UnexpectedError::error(error))
    }
}

/// Redact sensitive metadata values for the provided keys.
#[must_use]
pub fn redact_metadata(mut metadata: ErrorMetadata, keys: &[&str]) -> ErrorMetadata {
    for key in keys {
        if let Some(value) = metadata.get_mut(*key) {
            REDACTED_VALUE.clone_into(value);
        }
    }
    metadata
}

/// Foreign error or bare message to be folded into an envelope.
#[derive(Debug)]
pub enum UnexpectedError {
    /// Plain message.
    Message(String),
    /// Boxed source error.
    Error(Box<dyn std::error::Error + Send + Sync>),
}

impl UnexpectedError {
    /// Wrap a message.
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    /// Wrap an error value.
    pub fn error<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Error(Box::new(error))
    }
}

/// Turn a foreign error into an envelope, classifying I/O failures by kind.
pub fn normalize_unexpected_error(error: UnexpectedError) -> ErrorEnvelope {
    match error {
        UnexpectedError::Message(message) => {
            ErrorEnvelope::unexpected(ErrorCode::internal(), message, ErrorClass::NonRetriable)
        },
        UnexpectedError::Error(error) => {
            let (code, class) = find_io_error(&*error).map_or(
                (ErrorCode::internal(), ErrorClass::NonRetriable),
                |io_error| classify_io_kind(io_error.kind()),
            );
            ErrorEnvelope::unexpected(code, error.to_string(), class)
        },
    }
}

fn find_io_error<'a>(error: &'a (dyn std::error::Error + 'static)) -> Option<&'a io::Error> {
    let mut current = Some(error);
    while let Some(candidate) = current {
        if let Some(io_error) = candidate.downcast_ref::<io::Error>() {
            return Some(io_error);
        }
        current = candidate.source();
    }
    None
}

fn classify_io_kind(kind: io::ErrorKind) -> (ErrorCode, ErrorClass) {
    let code = match kind {
        io::ErrorKind::NotFound => ErrorCode::not_found(),
        io::ErrorKind::PermissionDenied => ErrorCode::permission_denied(),
        io::ErrorKind::TimedOut => ErrorCode::timeout(),
        io::ErrorKind::Interrupted => ErrorCode::cancelled(),
        _ => ErrorCode::io(),
    };
    let class = match kind {
        io::ErrorKind::WouldBlock
        | io::ErrorKind::TimedOut
        | io::ErrorKind::Interrupted
        | io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::NotConnected
        | io::ErrorKind::BrokenPipe => ErrorClass::Retriable,
        _ => ErrorClass::NonRetriable,
    };
    (code, class)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_set_kind_and_class() {
        let expected = ErrorEnvelope::expected(ErrorCode::invalid_input(), "invalid");
        assert_eq!(expected.kind, ErrorKind::Expected);
        assert_eq!(expected.class, ErrorClass::NonRetriable);

        let invariant = ErrorEnvelope::invariant(ErrorCode::internal(), "boom");
        assert_eq!(invariant.kind, ErrorKind::Invariant);
        assert!(!invariant.is_retriable());

        let unexpected =
            ErrorEnvelope::unexpected(ErrorCode::timeout(), "slow", ErrorClass::Retriable);
        assert_eq!(unexpected.kind, ErrorKind::Unexpected);
        assert!(unexpected.is_retriable());
    }

    #[test]
    fn io_errors_are_classified_by_kind() {
        let refused: ErrorEnvelope = io::Error::new(io::ErrorKind::ConnectionRefused, "nope").into();
        assert_eq!(refused.code, ErrorCode::io());
        assert!(refused.is_retriable());

        let missing: ErrorEnvelope = io::Error::new(io::ErrorKind::NotFound, "gone").into();
        assert_eq!(missing.code, ErrorCode::not_found());
        assert!(!missing.is_retriable());

        let message = normalize_unexpected_error(UnexpectedError::message("boom"));
        assert_eq!(message.code, ErrorCode::internal());
    }

    #[test]
    fn context_and_code_helpers() {
        let error = ErrorEnvelope::expected(ErrorCode::new("artifact", "checksum_mismatch"), "bad")
            .context("install 1.2.0");
        assert_eq!(error.message, "install 1.2.0: bad");
        assert!(error.has_code("artifact", "checksum_mismatch"));
        assert_eq!(error.to_string(), "[artifact:checksum_mismatch] install 1.2.0: bad");
    }

    #[test]
    fn metadata_redaction_only_touches_named_keys() {
        let error = ErrorEnvelope::expected(ErrorCode::invalid_input(), "bad")
            .with_metadata("token", "secret")
            .with_metadata("url", "http://localhost");
        let redacted = error.redact_metadata(&["token", "absent"]);

        assert_eq!(
            redacted.metadata.get("token").map(String::as_str),
            Some(REDACTED_VALUE)
        );
        assert_eq!(
            redacted.metadata.get("url").map(String::as_str),
            Some("http://localhost")
        );
        assert!(!redacted.metadata.contains_key("absent"));
    }
}
