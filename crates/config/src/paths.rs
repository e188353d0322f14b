//! On-disk layout of the installed product.

use crate::schema::ProductConfig;
use codebase_index_domain::{Platform, VersionId};
use codebase_index_shared::{ErrorCode, ErrorEnvelope};
use std::path::{Path, PathBuf};

/// Every path the core reads or writes, rooted at `<home>/<dirName>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductPaths {
    root: PathBuf,
    binary_name: String,
}

impl ProductPaths {
    /// Resolve the layout from config, falling back to the user's home.
    pub fn resolve(product: &ProductConfig) -> Result<Self, ErrorEnvelope> {
        let home = match &product.home_dir {
            Some(home) => home.clone(),
            None => dirs::home_dir().ok_or_else(|| {
                ErrorEnvelope::expected(
                    ErrorCode::new("config", "home_dir_unavailable"),
                    "cannot determine the home directory; set CBI_HOME",
                )
            })?,
        };
        Ok(Self::under(&home, product))
    }

    /// Layout under an explicit home directory.
    #[must_use]
    pub fn under(home: &Path, product: &ProductConfig) -> Self {
        Self {
            root: home.join(&product.dir_name),
            binary_name: product.binary_name.clone(),
        }
    }

    /// `<home>/<dirName>`
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Shared state directory.
    #[must_use]
    pub fn share_dir(&self) -> PathBuf {
        self.root.join("share")
    }

    /// Persisted install record.
    #[must_use]
    pub fn version_file(&self) -> PathBuf {
        self.share_dir().join("version.json")
    }

    /// Advisory lock guarding downloads.
    #[must_use]
    pub fn version_lock_file(&self) -> PathBuf {
        self.share_dir().join("version.lock")
    }

    /// Registry written by the running sidecar.
    #[must_use]
    pub fn registry_file(&self) -> PathBuf {
        self.share_dir().join(".well-known.json")
    }

    /// Directory holding the installed executable.
    #[must_use]
    pub fn bin_dir(&self) -> PathBuf {
        self.root.join("bin")
    }

    /// Installed executable for `platform`.
    #[must_use]
    pub fn binary_path(&self, platform: Platform) -> PathBuf {
        self.bin_dir().join(platform.executable_name(&self.binary_name))
    }

    /// Directory of package metadata snapshots.
    #[must_use]
    pub fn package_dir(&self) -> PathBuf {
        self.root.join("package")
    }

    /// Snapshot file for one version.
    #[must_use]
    pub fn package_snapshot(&self, version: &VersionId) -> PathBuf {
        self.package_dir().join(format!("{version}.json"))
    }

    /// Executable base name.
    #[must_use]
    pub fn binary_name(&self) -> &str {
        &self.binary_name
    }
}
