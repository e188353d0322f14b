//! Exit codes and CLI-local failures.

use codebase_index_shared::{ErrorEnvelope, ErrorKind};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Ok = 0,
    Internal = 1,
    InvalidInput = 2,
    Io = 3,
    /// The command ran but the sidecar did not reach the requested state.
    NotReady = 4,
}

impl ExitCode {
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Exit code for an error returned by the runtime.
    #[must_use]
    pub fn for_envelope(error: &ErrorEnvelope) -> Self {
        match error.kind {
            ErrorKind::Expected if error.code.namespace() == "config" => Self::InvalidInput,
            ErrorKind::Expected => Self::NotReady,
            ErrorKind::Unexpected => Self::Io,
            ErrorKind::Invariant => Self::Internal,
        }
    }
}

/// Failures raised by the CLI itself, before or after the runtime runs.
#[derive(Debug)]
pub enum CliError {
    InvalidInput(String),
    Io(std::io::Error),
    Serialization(serde_json::Error),
}

impl CliError {
    #[must_use]
    pub const fn exit_code(&self) -> ExitCode {
        match self {
            Self::InvalidInput(_) => ExitCode::InvalidInput,
            Self::Io(_) => ExitCode::Io,
            Self::Serialization(_) => ExitCode::Internal,
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidInput(message) => write!(formatter, "invalid input: {message}"),
            Self::Io(error) => write!(formatter, "io error: {error}"),
            Self::Serialization(error) => write!(formatter, "serialization error: {error}"),
        }
    }
}

impl std::error::Error for CliError {}

impl From<std::io::Error> for CliError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error)
    }
}

impl From<serde_json::Error> for CliError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codebase_index_shared::{ErrorClass, ErrorCode};

    #[test]
    fn envelope_kinds_map_to_exit_codes() {
        let config = ErrorEnvelope::expected(ErrorCode::new("config", "invalid_value"), "bad");
        let not_ready = ErrorEnvelope::expected(ErrorCode::new("provider", "needs_provider"), "skip");
        let io = ErrorEnvelope::unexpected(ErrorCode::io(), "disk", ErrorClass::Retriable);
        let invariant = ErrorEnvelope::invariant(ErrorCode::internal(), "boom");

        assert_eq!(ExitCode::for_envelope(&config), ExitCode::InvalidInput);
        assert_eq!(ExitCode::for_envelope(&not_ready), ExitCode::NotReady);
        assert_eq!(ExitCode::for_envelope(&io), ExitCode::Io);
        assert_eq!(ExitCode::for_envelope(&invariant), ExitCode::Internal);
    }
}
