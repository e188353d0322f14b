//! # codebase-index-testkit
//!
//! Test helpers and in-memory adapters.
//! This crate depends on `ports`, `domain` and `shared`.

pub mod errors;
pub mod fixtures;
pub mod in_memory;

/// Returns the testkit crate version.
#[must_use]
pub const fn testkit_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;
    use codebase_index_ports::ports_crate_version;
    use codebase_index_shared::shared_crate_version;

    #[test]
    fn testkit_can_use_ports_and_shared() {
        assert!(!testkit_crate_version().is_empty());
        assert!(!ports_crate_version().is_empty());
        assert!(!shared_crate_version().is_empty());
    }

    #[test]
    fn error_fixtures_are_available() {
        let codes = errors::common_error_codes();
        assert!(!codes.is_empty());
        assert!(errors::unavailable_error().is_retriable());
        assert!(!errors::checksum_mismatch_error().is_retriable());
    }

    #[test]
    fn fixtures_describe_one_release() {
        let package = fixtures::package(1, 2, 0);
        assert_eq!(package.version_id, fixtures::descriptor(1, 2, 0).version_id);
    }
}
