//! Artifact download and verification.

use crate::BoxFuture;
use codebase_index_domain::{PackageInfo, VersionDescriptor};
use codebase_index_shared::{RequestContext, Result};
use std::path::PathBuf;
use std::sync::Arc;

/// Progress of a streaming download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadProgress {
    /// Bytes written so far.
    pub downloaded: u64,
    /// Total size announced by the server.
    pub total: u64,
    /// `downloaded * 100 / total`, capped at 100.
    pub percent: u8,
}

impl DownloadProgress {
    /// Progress snapshot; `None` when the total size is unknown.
    #[must_use]
    pub fn new(downloaded: u64, total: Option<u64>) -> Option<Self> {
        let total = total.filter(|total| *total > 0)?;
        let percent = downloaded.min(total).saturating_mul(100) / total;
        Some(Self {
            downloaded,
            total,
            percent: u8::try_from(percent).unwrap_or(100),
        })
    }
}

/// Callback invoked for every chunk when the total size is known.
pub type ProgressCallback = Arc<dyn Fn(DownloadProgress) + Send + Sync>;

/// Everything needed to install one version.
#[derive(Debug, Clone)]
pub struct InstallRequest {
    /// Destination of the executable.
    pub target_path: PathBuf,
    /// Catalog entry to download.
    pub descriptor: VersionDescriptor,
    /// Metadata the artifact is verified against.
    pub package: PackageInfo,
}

/// How an install attempt ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    /// Downloaded, verified and made executable.
    Installed,
    /// Aborted through the context's cancellation token.
    Cancelled,
}

/// Downloads, verifies and installs sidecar artifacts.
pub trait ArtifactInstallerPort: Send + Sync {
    /// Stream, verify checksum and signature, set permissions.
    ///
    /// Integrity failures remove the file and are never retried.
    fn download_and_install(
        &self,
        ctx: &RequestContext,
        request: InstallRequest,
        progress: Option<ProgressCallback>,
    ) -> BoxFuture<'_, Result<InstallOutcome>>;

    /// True when the file at `path` exists and matches the package checksum.
    fn verify_installed(
        &self,
        ctx: &RequestContext,
        path: PathBuf,
        package: PackageInfo,
    ) -> BoxFuture<'_, Result<bool>>;

    /// True when a file exists at `path`.
    fn artifact_exists(&self, ctx: &RequestContext, path: PathBuf) -> BoxFuture<'_, Result<bool>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_requires_known_total() {
        assert_eq!(DownloadProgress::new(10, None), None);
        assert_eq!(DownloadProgress::new(10, Some(0)), None);
        assert_eq!(DownloadProgress::new(50, Some(200)).map(|p| p.percent), Some(25));
        assert_eq!(DownloadProgress::new(300, Some(200)).map(|p| p.percent), Some(100));
    }
}
