//! # codebase-index-core
//!
//! Build metadata shared by the CLI and the runtime. No dependencies.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

/// Compile-time facts about the running binary.
///
/// ```
/// use codebase_index_core::build_info;
///
/// let info = build_info();
/// assert!(info.version_string().starts_with(info.name));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildInfo {
    /// Package name.
    pub name: &'static str,
    /// Package version (semver).
    pub version: &'static str,
    /// Minimum supported Rust version declared by the workspace.
    pub rust_version: &'static str,
    /// Operating system the binary was compiled for (`linux`, `macos`, `windows`, ...).
    pub os: &'static str,
    /// CPU architecture the binary was compiled for (`x86_64`, `aarch64`, ...).
    pub arch: &'static str,
    /// `debug` or `release`.
    pub profile: &'static str,
    /// Short commit hash, when provided through `GIT_HASH` at build time.
    pub git_hash: Option<&'static str>,
}

impl BuildInfo {
    /// `name version` or `name version (hash)`.
    #[must_use]
    pub fn version_string(&self) -> String {
        self.git_hash.map_or_else(
            || format!("{} {}", self.name, self.version),
            |hash| format!("{} {} ({hash})", self.name, self.version),
        )
    }

    /// Returns true for builds with debug assertions.
    #[must_use]
    pub const fn is_debug(&self) -> bool {
        matches!(self.profile.as_bytes(), b"debug")
    }
}

/// Returns build-time information about the binary.
#[must_use]
pub const fn build_info() -> BuildInfo {
    BuildInfo {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        rust_version: env!("CARGO_PKG_RUST_VERSION"),
        os: std::env::consts::OS,
        arch: std::env::consts::ARCH,
        profile: if cfg!(debug_assertions) {
            "debug"
        } else {
            "release"
        },
        git_hash: option_env!("GIT_HASH"),
    }
}

/// Returns the core crate version.
#[must_use]
pub const fn core_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_info_reflects_package_metadata() {
        let info = build_info();
        assert_eq!(info.name, "codebase-index-core");
        assert_eq!(info.version, core_crate_version());
        assert_eq!(info.os, std::env::consts::OS);
        assert_eq!(info.is_debug(), cfg!(debug_assertions));
    }

    #[test]
    fn version_string_includes_hash_when_present() {
        let info = BuildInfo {
            git_hash: Some("abc1234"),
            ..build_info()
        };
        assert!(info.version_string().ends_with("(abc1234)"));

        let bare = BuildInfo {
            git_hash: None,
            ..build_info()
        };
        assert_eq!(bare.version_string(), format!("{} {}", bare.name, bare.version));
    }
}
