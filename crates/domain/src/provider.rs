//! Provider context consulted before any sidecar work.

use codebase_index_shared::{ErrorCode, ErrorEnvelope};
use serde::{Deserialize, Serialize};

/// Snapshot of the active provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderState {
    /// Kind of the active API provider.
    pub provider_kind: String,
    /// Whether the codebase-index feature toggle is on.
    pub feature_enabled: bool,
}

impl ProviderState {
    /// True when `expected_kind` is active and the feature is on.
    #[must_use]
    pub fn supports(&self, expected_kind: &str) -> bool {
        self.feature_enabled && self.provider_kind.eq_ignore_ascii_case(expected_kind)
    }
}

/// `provider:needs_provider`
#[must_use]
pub fn needs_provider_code() -> ErrorCode {
    ErrorCode::new("provider", "needs_provider")
}

/// Skip signal raised when the active provider does not support the feature.
#[must_use]
pub fn needs_provider_error(actual_kind: &str, expected_kind: &str) -> ErrorEnvelope {
    ErrorEnvelope::expected(
        needs_provider_code(),
        format!("codebase index requires the {expected_kind} provider"),
    )
    .with_metadata("providerKind", actual_kind)
    .with_metadata("expectedKind", expected_kind)
}

/// True for the skip signal; callers must not treat it as a hard failure.
#[must_use]
pub fn is_needs_provider(error: &ErrorEnvelope) -> bool {
    error.code == needs_provider_code()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn support_requires_kind_and_toggle() {
        let mut state = ProviderState {
            provider_kind: "CoStrict".to_owned(),
            feature_enabled: true,
        };
        assert!(state.supports("costrict"));
        state.feature_enabled = false;
        assert!(!state.supports("costrict"));
    }

    #[test]
    fn needs_provider_is_an_expected_skip() {
        let error = needs_provider_error("openai", "costrict");
        assert!(is_needs_provider(&error));
        assert!(!error.is_retriable());
        assert_eq!(error.kind, codebase_index_shared::ErrorKind::Expected);
    }
}
