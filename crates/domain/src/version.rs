//! Version catalog entries, package metadata and the persisted install record.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Semantic version triple, ordered lexicographically by `(major, minor, micro)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct VersionId {
    /// Major component.
    pub major: u32,
    /// Minor component.
    pub minor: u32,
    /// Micro (patch) component.
    pub micro: u32,
}

impl VersionId {
    /// Build a version triple.
    #[must_use]
    pub const fn new(major: u32, minor: u32, micro: u32) -> Self {
        Self {
            major,
            minor,
            micro,
        }
    }

    const fn key(self) -> (u32, u32, u32) {
        (self.major, self.minor, self.micro)
    }
}

impl Ord for VersionId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl PartialOrd for VersionId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}.{}.{}", self.major, self.minor, self.micro)
    }
}

/// Lifecycle of the local install record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionStatus {
    /// A download is (or was, if stale) in flight.
    Downloading,
    /// The artifact was downloaded and verified.
    Downloaded,
    /// The last install attempt failed.
    Failed,
}

impl fmt::Display for VersionStatus {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::Downloading => "downloading",
            Self::Downloaded => "downloaded",
            Self::Failed => "failed",
        })
    }
}

/// Checksum algorithm named by a package descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumAlgo {
    /// MD5 (the default when the descriptor leaves it empty).
    Md5,
    /// SHA-256.
    Sha256,
}

impl ChecksumAlgo {
    /// Parse the descriptor value; empty means MD5, unknown values yield `None`.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "md5" => Some(Self::Md5),
            "sha256" | "sha-256" => Some(Self::Sha256),
            _ => None,
        }
    }
}

/// Immutable metadata describing one downloadable artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageInfo {
    /// Artifact file name.
    pub package_name: String,
    /// Target operating system.
    pub os: String,
    /// Target architecture.
    pub arch: String,
    /// Size in bytes.
    pub size: u64,
    /// Expected checksum, hex encoded.
    pub checksum: String,
    /// Checksum algorithm (`md5` when empty).
    #[serde(default)]
    pub checksum_algo: String,
    /// Hex encoded detached signature over the checksum string.
    pub sign: String,
    /// Version of the artifact.
    pub version_id: VersionId,
    /// Build identifier.
    #[serde(default)]
    pub build: String,
    /// Free-form release notes.
    #[serde(default)]
    pub description: String,
}

impl PackageInfo {
    /// Declared checksum algorithm, if recognised.
    #[must_use]
    pub fn algorithm(&self) -> Option<ChecksumAlgo> {
        ChecksumAlgo::parse(&self.checksum_algo)
    }

    /// Case-insensitive comparison against a computed checksum.
    #[must_use]
    pub fn checksum_matches(&self, computed: &str) -> bool {
        self.checksum.trim().eq_ignore_ascii_case(computed.trim())
    }
}

/// A version as advertised by the remote catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionDescriptor {
    /// Version triple.
    pub version_id: VersionId,
    /// Artifact path relative to the catalog base URL.
    pub app_url: String,
    /// Package metadata path relative to the catalog base URL.
    pub info_url: String,
}

/// Catalog listing for one `(platform, arch)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionList {
    /// Newest published version.
    pub newest: VersionDescriptor,
    /// Every published version.
    #[serde(default)]
    pub versions: Vec<VersionDescriptor>,
}

/// The persisted install record; one per machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    /// Installed (or installing) version.
    pub version_id: VersionId,
    /// Artifact path relative to the catalog base URL.
    pub app_url: String,
    /// Package metadata path relative to the catalog base URL.
    pub info_url: String,
    /// Package metadata the artifact was verified against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_info: Option<PackageInfo>,
    /// Lifecycle status.
    pub status: VersionStatus,
    /// Last status change, epoch milliseconds.
    pub update_at: u64,
}

impl VersionInfo {
    /// Record for `descriptor` in `status` at `now_ms`.
    #[must_use]
    pub fn from_descriptor(
        descriptor: &VersionDescriptor,
        package_info: Option<PackageInfo>,
        status: VersionStatus,
        now_ms: u64,
    ) -> Self {
        Self {
            version_id: descriptor.version_id,
            app_url: descriptor.app_url.clone(),
            info_url: descriptor.info_url.clone(),
            package_info,
            status,
            update_at: now_ms,
        }
    }

    /// Same record moved to `status` at `now_ms`.
    #[must_use]
    pub fn with_status(mut self, status: VersionStatus, now_ms: u64) -> Self {
        self.status = status;
        self.update_at = now_ms;
        self
    }

    /// Catalog descriptor this record was built from.
    #[must_use]
    pub fn descriptor(&self) -> VersionDescriptor {
        VersionDescriptor {
            version_id: self.version_id,
            app_url: self.app_url.clone(),
            info_url: self.info_url.clone(),
        }
    }

    /// True when a previous install failed or `remote` is strictly newer.
    #[must_use]
    pub fn should_update_to(&self, remote: VersionId) -> bool {
        self.status == VersionStatus::Failed || remote > self.version_id
    }

    /// Milliseconds since the last status change (zero if the clock went backwards).
    #[must_use]
    pub const fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.update_at)
    }

    /// True for a `downloading` record older than `stale_after_ms`.
    #[must_use]
    pub const fn is_stale_download(&self, now_ms: u64, stale_after_ms: u64) -> bool {
        matches!(self.status, VersionStatus::Downloading) && self.age_ms(now_ms) > stale_after_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn record(version: VersionId, status: VersionStatus) -> VersionInfo {
        VersionInfo {
            version_id: version,
            app_url: "/linux/amd64/codebase-indexer".to_owned(),
            info_url: "/linux/amd64/package.json".to_owned(),
            package_info: None,
            status,
            update_at: 1_000,
        }
    }

    #[test]
    fn versions_order_lexicographically() {
        assert!(VersionId::new(1, 2, 0) < VersionId::new(1, 10, 0));
        assert!(VersionId::new(2, 0, 0) > VersionId::new(1, 99, 99));
        assert_eq!(VersionId::new(1, 2, 3).to_string(), "1.2.3");
    }

    #[test]
    fn failed_record_always_updates() {
        let current = record(VersionId::new(9, 9, 9), VersionStatus::Failed);
        assert!(current.should_update_to(VersionId::new(1, 0, 0)));
    }

    #[test]
    fn stale_download_detection_uses_strict_age() {
        let current = record(VersionId::new(1, 2, 0), VersionStatus::Downloading);
        assert!(!current.is_stale_download(61_000, 60_000));
        assert!(current.is_stale_download(61_001, 60_000));
        let done = current.with_status(VersionStatus::Downloaded, 1_000);
        assert!(!done.is_stale_download(1_000_000, 60_000));
    }

    #[test]
    fn checksum_algorithms_parse_with_md5_default() {
        assert_eq!(ChecksumAlgo::parse(""), Some(ChecksumAlgo::Md5));
        assert_eq!(ChecksumAlgo::parse("SHA256"), Some(ChecksumAlgo::Sha256));
        assert_eq!(ChecksumAlgo::parse("crc32"), None);
    }

    #[test]
    fn version_info_round_trips_camel_case() -> Result<(), serde_json::Error> {
        let value = serde_json::json!({
            "versionId": { "major": 1, "minor": 2, "micro": 0 },
            "appUrl": "/a",
            "infoUrl": "/i",
            "status": "downloading",
            "updateAt": 5
        });
        let parsed: VersionInfo = serde_json::from_value(value.clone())?;
        assert_eq!(parsed.status, VersionStatus::Downloading);
        assert_eq!(serde_json::to_value(&parsed)?, value);
        Ok(())
    }

    proptest! {
        #[test]
        fn should_update_matches_tuple_ordering(
            a in (0u32..5, 0u32..5, 0u32..5),
            b in (0u32..5, 0u32..5, 0u32..5),
            failed in any::<bool>(),
        ) {
            let status = if failed { VersionStatus::Failed } else { VersionStatus::Downloaded };
            let current = record(VersionId::new(a.0, a.1, a.2), status);
            let expected = failed || b > a;
            prop_assert_eq!(current.should_update_to(VersionId::new(b.0, b.1, b.2)), expected);
        }
    }
}
