//! JSON-file install record, package snapshots and the advisory install lock.

use codebase_index_config::ProductPaths;
use codebase_index_domain::{PackageInfo, VersionInfo};
use codebase_index_ports::{BoxFuture, InstallLock, VersionStorePort};
use codebase_index_shared::{ErrorClass, ErrorCode, ErrorEnvelope, RequestContext, Result};
use fs2::FileExt;
use serde::Serialize;
use std::fs::File;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Stores the install record under `<product>/share/`.
#[derive(Debug, Clone)]
pub struct JsonVersionStore {
    paths: ProductPaths,
}

impl JsonVersionStore {
    /// Store rooted at the product layout.
    #[must_use]
    pub const fn new(paths: ProductPaths) -> Self {
        Self { paths }
    }
}

impl VersionStorePort for JsonVersionStore {
    fn load(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<Option<VersionInfo>>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("store.load")?;
            let path = self.paths.version_file();
            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
                Err(error) => return Err(store_io_error(&error, "read", &path)),
            };
            match serde_json::from_slice(&bytes) {
                Ok(info) => Ok(Some(info)),
                Err(error) => {
                    tracing::warn!(path = %path.display(), %error, "ignoring unreadable version record");
                    Ok(None)
                },
            }
        })
    }

    fn save(&self, ctx: &RequestContext, info: VersionInfo) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("store.save")?;
            write_json_atomic(&self.paths.version_file(), &info).await
        })
    }

    fn save_package_snapshot(
        &self,
        ctx: &RequestContext,
        package: PackageInfo,
    ) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("store.save_package_snapshot")?;
            let path = self.paths.package_snapshot(&package.version_id);
            write_json_atomic(&path, &package).await
        })
    }

    fn try_lock(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<Option<InstallLock>>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("store.try_lock")?;
            let path = self.paths.version_lock_file();
            tokio::task::spawn_blocking(move || try_lock_file(&path))
                .await
                .map_err(|error| {
                    ErrorEnvelope::unexpected(
                        ErrorCode::internal(),
                        format!("lock task failed: {error}"),
                        ErrorClass::NonRetriable,
                    )
                })?
        })
    }
}

struct LockedFile {
    file: File,
    path: PathBuf,
}

impl Drop for LockedFile {
    fn drop(&mut self) {
        if let Err(error) = FileExt::unlock(&self.file) {
            tracing::debug!(path = %self.path.display(), %error, "install lock release failed");
        }
    }
}

fn try_lock_file(path: &Path) -> Result<Option<InstallLock>> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|error| store_io_error(&error, "create", parent))?;
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)
        .map_err(|error| store_io_error(&error, "open", path))?;
    match file.try_lock_exclusive() {
        Ok(()) => Ok(Some(InstallLock::new(LockedFile {
            file,
            path: path.to_path_buf(),
        }))),
        Err(error) if error.kind() == fs2::lock_contended_error().kind() => Ok(None),
        Err(error) => Err(store_io_error(&error, "lock", path)),
    }
}

/// Write pretty JSON to a sibling temp file, then rename over `path`.
async fn write_json_atomic<T: Serialize + Sync>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|error| store_io_error(&error, "create", parent))?;
    }
    let mut payload = serde_json::to_vec_pretty(value).map_err(|error| {
        ErrorEnvelope::unexpected(
            ErrorCode::internal(),
            format!("failed to encode {}: {error}", path.display()),
            ErrorClass::NonRetriable,
        )
    })?;
    payload.push(b'\n');

    let mut staging = path.as_os_str().to_owned();
    staging.push(".tmp");
    let staging = PathBuf::from(staging);
    tokio::fs::write(&staging, &payload)
        .await
        .map_err(|error| store_io_error(&error, "write", &staging))?;
    tokio::fs::rename(&staging, path)
        .await
        .map_err(|error| store_io_error(&error, "rename", path))
}

fn store_io_error(error: &std::io::Error, action: &str, path: &Path) -> ErrorEnvelope {
    ErrorEnvelope::unexpected(
        ErrorCode::io(),
        format!("failed to {action} {}: {error}", path.display()),
        ErrorClass::NonRetriable,
    )
    .with_metadata("path", path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use codebase_index_config::ProductConfig;
    use codebase_index_domain::{VersionId, VersionStatus};

    fn store(home: &Path) -> JsonVersionStore {
        JsonVersionStore::new(ProductPaths::under(home, &ProductConfig::default()))
    }

    fn record(status: VersionStatus) -> VersionInfo {
        VersionInfo {
            version_id: VersionId::new(1, 2, 0),
            app_url: "/linux/amd64/codebase-indexer".to_owned(),
            info_url: "/linux/amd64/package.json".to_owned(),
            package_info: None,
            status,
            update_at: 42,
        }
    }

    #[tokio::test]
    async fn record_round_trips() -> Result<()> {
        let home = tempfile::tempdir()?;
        let store = store(home.path());
        let ctx = RequestContext::new_request();

        assert_eq!(store.load(&ctx).await?, None);
        store.save(&ctx, record(VersionStatus::Downloaded)).await?;
        assert_eq!(store.load(&ctx).await?, Some(record(VersionStatus::Downloaded)));

        store.save(&ctx, record(VersionStatus::Failed)).await?;
        assert_eq!(store.load(&ctx).await?, Some(record(VersionStatus::Failed)));
        Ok(())
    }

    #[tokio::test]
    async fn malformed_record_reads_as_absent() -> Result<()> {
        let home = tempfile::tempdir()?;
        let store = store(home.path());
        let path = store.paths.version_file();
        tokio::fs::create_dir_all(path.parent().unwrap_or(home.path())).await?;
        tokio::fs::write(&path, b"{ not json").await?;

        assert_eq!(store.load(&RequestContext::new_request()).await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn lock_is_exclusive_until_dropped() -> Result<()> {
        let home = tempfile::tempdir()?;
        let store = store(home.path());
        let ctx = RequestContext::new_request();

        let held = store.try_lock(&ctx).await?;
        assert!(held.is_some());
        let contended = try_lock_file(&store.paths.version_lock_file())?;
        assert!(contended.is_none());

        drop(held);
        assert!(store.try_lock(&ctx).await?.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn package_snapshots_are_named_by_version() -> Result<()> {
        let home = tempfile::tempdir()?;
        let store = store(home.path());
        let package: PackageInfo = serde_json::from_str(include_str!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/../../tests/fixtures/artifact/package.md5.json"
        )))
        .map_err(|error| ErrorEnvelope::invariant(ErrorCode::internal(), error.to_string()))?;

        store
            .save_package_snapshot(&RequestContext::new_request(), package.clone())
            .await?;
        let written = tokio::fs::read(store.paths.package_snapshot(&VersionId::new(1, 2, 0))).await?;
        let parsed: PackageInfo = serde_json::from_slice(&written)
            .map_err(|error| ErrorEnvelope::invariant(ErrorCode::internal(), error.to_string()))?;
        assert_eq!(parsed, package);
        Ok(())
    }
}
