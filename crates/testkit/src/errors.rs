//! Test fixtures for shared error codes and envelopes.

use codebase_index_shared::{ErrorClass, ErrorCode, ErrorEnvelope};

/// Return a list of common error codes used in tests.
pub fn common_error_codes() -> Vec<ErrorCode> {
    vec![
        ErrorCode::cancelled(),
        ErrorCode::invalid_input(),
        ErrorCode::not_found(),
        ErrorCode::timeout(),
        ErrorCode::io(),
        ErrorCode::internal(),
        ErrorCode::dependency_unavailable(),
    ]
}

/// A cancellation error fixture.
pub fn cancelled_error() -> ErrorEnvelope {
    ErrorEnvelope::cancelled("cancelled")
}

/// A retriable transport failure, as the HTTP adapters report a 503.
pub fn unavailable_error() -> ErrorEnvelope {
    ErrorEnvelope::unexpected(
        ErrorCode::dependency_unavailable(),
        "service unavailable",
        ErrorClass::Retriable,
    )
}

/// A non-retriable integrity failure.
pub fn checksum_mismatch_error() -> ErrorEnvelope {
    ErrorEnvelope::expected(
        ErrorCode::new("artifact", "checksum_mismatch"),
        "checksum verification failed",
    )
}

/// A retriable timeout error fixture.
pub fn timeout_error() -> ErrorEnvelope {
    ErrorEnvelope::unexpected(ErrorCode::timeout(), "timeout", ErrorClass::Retriable)
}
