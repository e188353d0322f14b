//! Host platform resolution for artifact selection.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Operating system family used in catalog paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Microsoft Windows.
    Windows,
    /// macOS.
    Darwin,
    /// Linux and other Unix-likes.
    Linux,
}

impl Platform {
    /// Catalog path segment.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Windows => "windows",
            Self::Darwin => "darwin",
            Self::Linux => "linux",
        }
    }

    /// Executable file name for `base` on this platform.
    #[must_use]
    pub fn executable_name(self, base: &str) -> String {
        match self {
            Self::Windows => format!("{base}.exe"),
            Self::Darwin | Self::Linux => base.to_owned(),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// CPU architecture used in catalog paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    /// x86-64.
    Amd64,
    /// 64-bit ARM.
    Arm64,
}

impl Arch {
    /// Catalog path segment.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Amd64 => "amd64",
            Self::Arm64 => "arm64",
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Resolved `(platform, arch)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    /// Operating system family.
    pub platform: Platform,
    /// CPU architecture.
    pub arch: Arch,
}

impl Target {
    /// Target of the running process.
    #[must_use]
    pub fn current() -> Self {
        resolve_target(std::env::consts::OS, std::env::consts::ARCH)
    }
}

/// Map OS/CPU identifiers to a catalog target.
///
/// Unknown operating systems resolve to `linux`; unknown CPU families resolve
/// to `arm64`.
#[must_use]
pub fn resolve_target(os: &str, cpu: &str) -> Target {
    let platform = match os.to_ascii_lowercase().as_str() {
        "windows" | "win32" => Platform::Windows,
        "macos" | "darwin" | "ios" => Platform::Darwin,
        _ => Platform::Linux,
    };
    let arch = match cpu.to_ascii_lowercase().as_str() {
        "x86_64" | "x64" | "amd64" => Arch::Amd64,
        _ => Arch::Arm64,
    };
    Target { platform, arch }
}
