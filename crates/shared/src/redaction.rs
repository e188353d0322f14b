//! Secret detection and redaction.
//!
//! Bearer tokens and signing keys travel through config, env and logs; these
//! helpers keep their values out of every rendered string.

/// Placeholder rendered in place of a secret.
pub const REDACTED: &str = "[REDACTED]";

/// Returns true when a key or variable name likely holds a secret.
///
/// ```
/// use codebase_index_shared::is_secret_key;
///
/// assert!(is_secret_key("CBI_AUTH_TOKEN"));
/// assert!(is_secret_key("authorization"));
/// assert!(!is_secret_key("CBI_LISTEN_PORT"));
/// ```
pub fn is_secret_key(key: &str) -> bool {
    const MARKERS: [&str; 6] = ["TOKEN", "SECRET", "PASSWORD", "CREDENTIAL", "AUTH", "PRIVATE"];
    let upper = key.to_ascii_uppercase();
    MARKERS.iter().any(|marker| upper.contains(marker))
        || upper.ends_with("_KEY")
        || upper == "KEY"
}

/// Returns [`REDACTED`] for secret keys, the value otherwise.
pub fn redact_if_secret(key: &str, value: &str) -> String {
    if is_secret_key(key) {
        REDACTED.to_owned()
    } else {
        value.to_owned()
    }
}

/// String whose `Debug` and `Display` never reveal the value.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SecretString(Box<str>);

impl SecretString {
    /// Wrap a secret value.
    pub fn new(value: impl Into<Box<str>>) -> Self {
        Self(value.into())
    }

    /// Borrow the underlying secret.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Returns true for an empty or whitespace-only secret.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Debug for SecretString {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(REDACTED)
    }
}

impl std::fmt::Display for SecretString {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(REDACTED)
    }
}

impl From<String> for SecretString {
    fn from(value: String) -> Self {
        Self(value.into_boxed_str())
    }
}

impl From<&str> for SecretString {
    fn from(value: &str) -> Self {
        Self(value.into())
    }
}
