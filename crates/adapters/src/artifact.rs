//! Streaming artifact download with checksum and signature verification.
//!
//! Transport failures (connect, timeout, any non-200 status) delete the
//! partial file and are retried under a [`RetryPolicy`]. Integrity failures
//! delete the file and are never retried. Cancellation through the request
//! context stops the stream and reports [`InstallOutcome::Cancelled`].

use crate::http::{cancelled_error, join_url, map_reqwest_error, map_status_error, send};
use codebase_index_config::CatalogConfig;
use codebase_index_domain::{ChecksumAlgo, PackageInfo};
use codebase_index_ports::{
    ArtifactInstallerPort, BoxFuture, DownloadProgress, InstallOutcome, InstallRequest,
    ProgressCallback,
};
use codebase_index_shared::{
    ErrorClass, ErrorCode, ErrorEnvelope, RequestContext, Result, RetryPolicy,
    retry_async_with_observer,
};
use futures_util::StreamExt;
use rsa::RsaPublicKey;
use rsa::pkcs1v15::{Signature, VerifyingKey};
use rsa::pkcs8::DecodePublicKey;
use rsa::signature::Verifier;
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

const DOWNLOAD_OPERATION: &str = "artifact.download";
const READ_BUFFER_BYTES: usize = 64 * 1024;

/// Downloads artifacts from the catalog origin and installs them in place.
#[derive(Debug, Clone)]
pub struct HttpArtifactInstaller {
    client: reqwest::Client,
    base_url: String,
    public_key: RsaPublicKey,
    retry: RetryPolicy,
}

impl HttpArtifactInstaller {
    /// Installer for the configured origin; `retry` bounds transport retries.
    pub fn new(config: &CatalogConfig, retry: RetryPolicy) -> Result<Self> {
        let timeout = Duration::from_millis(config.timeout_ms);
        // Per-read timeout; total transfer time is unbounded.
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .user_agent(concat!("codebase-index/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|error| {
                ErrorEnvelope::unexpected(
                    artifact_code("client_init_failed"),
                    format!("failed to build download client: {error}"),
                    ErrorClass::NonRetriable,
                )
            })?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            public_key: parse_public_key(&config.public_key_pem)?,
            retry,
        })
    }

    async fn download_with_retry(
        &self,
        ctx: &RequestContext,
        url: &str,
        target: &Path,
        progress: Option<&ProgressCallback>,
    ) -> Result<()> {
        let mut attempts = 0u32;
        let mut attempt = || {
            attempts = attempts.saturating_add(1);
            self.download_once(ctx, url, target, progress)
        };
        let result = retry_async_with_observer(
            ctx,
            self.retry,
            DOWNLOAD_OPERATION,
            &mut attempt,
            |failed, error| {
                tracing::warn!(attempt = failed, url, code = %error.code, "artifact download failed, retrying");
            },
        )
        .await;

        result.map_err(|error| {
            if error.is_cancelled() {
                return error;
            }
            let mut wrapped = ErrorEnvelope::unexpected(
                artifact_code("download_failed"),
                format!("download failed after {attempts} attempt(s): {}", error.message),
                ErrorClass::NonRetriable,
            );
            wrapped.metadata = error.metadata;
            wrapped
                .with_metadata("attempts", attempts.to_string())
                .with_metadata("cause", error.code.to_string())
                .with_metadata("url", url)
        })
    }

    async fn download_once(
        &self,
        ctx: &RequestContext,
        url: &str,
        target: &Path,
        progress: Option<&ProgressCallback>,
    ) -> Result<()> {
        let result = self.stream_to_file(ctx, url, target, progress).await;
        if result.is_err() {
            remove_quietly(target).await;
        }
        result
    }

    async fn stream_to_file(
        &self,
        ctx: &RequestContext,
        url: &str,
        target: &Path,
        progress: Option<&ProgressCallback>,
    ) -> Result<()> {
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|error| io_error(&error, "create directory", parent))?;
        }

        let response = send(ctx, self.client.get(url), url, DOWNLOAD_OPERATION).await?;
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(map_status_error(status, url, artifact_code("download_failed"))
                .with_class(ErrorClass::Retriable));
        }

        let total = response.content_length();
        let mut file = tokio::fs::File::create(target)
            .await
            .map_err(|error| io_error(&error, "create", target))?;
        let mut stream = std::pin::pin!(response.bytes_stream());
        let mut downloaded = 0u64;

        loop {
            let next = tokio::select! {
                () = ctx.cancelled() => return Err(cancelled_error(DOWNLOAD_OPERATION)),
                next = stream.next() => next,
            };
            let Some(chunk) = next else {
                break;
            };
            let chunk = chunk.map_err(|error| map_reqwest_error(&error, url))?;
            file.write_all(&chunk)
                .await
                .map_err(|error| io_error(&error, "write", target))?;
            downloaded = downloaded.saturating_add(u64::try_from(chunk.len()).unwrap_or(u64::MAX));
            if let (Some(callback), Some(snapshot)) = (progress, DownloadProgress::new(downloaded, total)) {
                callback(snapshot);
            }
        }

        file.flush()
            .await
            .map_err(|error| io_error(&error, "flush", target))?;
        file.sync_all()
            .await
            .map_err(|error| io_error(&error, "sync", target))?;
        tracing::debug!(url, bytes = downloaded, "artifact downloaded");
        Ok(())
    }

    async fn verify_artifact(&self, target: &Path, package: &PackageInfo) -> Result<()> {
        let algo = package.algorithm().ok_or_else(|| {
            ErrorEnvelope::expected(
                artifact_code("checksum_mismatch"),
                format!("unsupported checksum algorithm: {}", package.checksum_algo),
            )
        })?;
        let computed = file_checksum(target, algo).await?;
        if !package.checksum_matches(&computed) {
            return Err(ErrorEnvelope::expected(
                artifact_code("checksum_mismatch"),
                "checksum verification failed",
            )
            .with_metadata("expected", package.checksum.to_ascii_lowercase())
            .with_metadata("actual", computed)
            .with_metadata("path", target.display().to_string()));
        }
        verify_signature(&self.public_key, &computed, &package.sign)
    }
}

impl ArtifactInstallerPort for HttpArtifactInstaller {
    fn download_and_install(
        &self,
        ctx: &RequestContext,
        request: InstallRequest,
        progress: Option<ProgressCallback>,
    ) -> BoxFuture<'_, Result<InstallOutcome>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            let url = join_url(&self.base_url, &request.descriptor.app_url);
            let target = request.target_path.as_path();

            match self
                .download_with_retry(&ctx, &url, target, progress.as_ref())
                .await
            {
                Ok(()) => {},
                Err(error) if error.is_cancelled() => {
                    remove_quietly(target).await;
                    tracing::info!(%url, "artifact download cancelled");
                    return Ok(InstallOutcome::Cancelled);
                },
                Err(error) => return Err(error),
            }

            if let Err(error) = self.verify_artifact(target, &request.package).await {
                remove_quietly(target).await;
                return Err(error.with_metadata("url", url));
            }
            make_executable(target)?;
            tracing::info!(
                %url,
                version = %request.package.version_id,
                path = %target.display(),
                "artifact installed"
            );
            Ok(InstallOutcome::Installed)
        })
    }

    fn verify_installed(
        &self,
        ctx: &RequestContext,
        path: std::path::PathBuf,
        package: PackageInfo,
    ) -> BoxFuture<'_, Result<bool>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("artifact.verify_installed")?;
            if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                return Ok(false);
            }
            let Some(algo) = package.algorithm() else {
                return Ok(false);
            };
            let computed = file_checksum(&path, algo).await?;
            Ok(package.checksum_matches(&computed))
        })
    }

    fn artifact_exists(
        &self,
        _ctx: &RequestContext,
        path: std::path::PathBuf,
    ) -> BoxFuture<'_, Result<bool>> {
        Box::pin(async move { Ok(tokio::fs::try_exists(&path).await.unwrap_or(false)) })
    }
}

enum StreamingHasher {
    Md5(md5::Md5),
    Sha256(Sha256),
}

impl StreamingHasher {
    fn new(algo: ChecksumAlgo) -> Self {
        match algo {
            ChecksumAlgo::Md5 => Self::Md5(md5::Md5::new()),
            ChecksumAlgo::Sha256 => Self::Sha256(Sha256::new()),
        }
    }

    fn update(&mut self, bytes: &[u8]) {
        match self {
            Self::Md5(hasher) => hasher.update(bytes),
            Self::Sha256(hasher) => hasher.update(bytes),
        }
    }

    fn finalize_hex(self) -> String {
        match self {
            Self::Md5(hasher) => hex::encode(hasher.finalize()),
            Self::Sha256(hasher) => hex::encode(hasher.finalize()),
        }
    }
}

/// Lowercase hex checksum of the file at `path`, computed by streaming.
pub async fn file_checksum(path: &Path, algo: ChecksumAlgo) -> Result<String> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|error| io_error(&error, "open", path))?;
    let mut hasher = StreamingHasher::new(algo);
    let mut buffer = vec![0u8; READ_BUFFER_BYTES];
    loop {
        let read = file
            .read(&mut buffer)
            .await
            .map_err(|error| io_error(&error, "read", path))?;
        if read == 0 {
            break;
        }
        hasher.update(buffer.get(..read).unwrap_or_default());
    }
    Ok(hasher.finalize_hex())
}

/// Parse an SPKI PEM public key.
pub fn parse_public_key(pem: &str) -> Result<RsaPublicKey> {
    RsaPublicKey::from_public_key_pem(pem.trim()).map_err(|error| {
        ErrorEnvelope::expected(
            artifact_code("invalid_public_key"),
            format!("invalid signing public key: {error}"),
        )
    })
}

/// Verify the hex RSA PKCS#1 v1.5 / SHA-256 signature over the lowercase checksum.
pub fn verify_signature(key: &RsaPublicKey, checksum: &str, sign_hex: &str) -> Result<()> {
    let signature = hex::decode(sign_hex.trim())
        .ok()
        .and_then(|bytes| Signature::try_from(bytes.as_slice()).ok())
        .ok_or_else(signature_invalid)?;
    VerifyingKey::<Sha256>::new(key.clone())
        .verify(checksum.trim().to_ascii_lowercase().as_bytes(), &signature)
        .map_err(|_| signature_invalid())
}

fn signature_invalid() -> ErrorEnvelope {
    ErrorEnvelope::expected(artifact_code("signature_invalid"), "signature verification failed")
}

fn artifact_code(code: &str) -> ErrorCode {
    ErrorCode::new("artifact", code)
}

fn io_error(error: &std::io::Error, action: &str, path: &Path) -> ErrorEnvelope {
    ErrorEnvelope::unexpected(
        ErrorCode::io(),
        format!("failed to {action} {}: {error}", path.display()),
        ErrorClass::NonRetriable,
    )
    .with_metadata("path", path.display().to_string())
}

async fn remove_quietly(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {},
        Err(error) if error.kind() == ErrorKind::NotFound => {},
        Err(error) => {
            tracing::warn!(path = %path.display(), %error, "failed to remove partial artifact");
        },
    }
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .map_err(|error| io_error(&error, "chmod", path))
}

#[cfg(not(unix))]
const fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE_KEY: &str = include_str!(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/../../tests/fixtures/artifact/signing_key.pub.pem"
    ));
    const FIXTURE_BIN: &[u8] = include_bytes!(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/../../tests/fixtures/artifact/codebase-indexer.bin"
    ));
    const FIXTURE_MD5: &str = "85361a0e967295a50880cda772329d5d";
    const FIXTURE_SIGN_MD5: &str = "c034e815ad2f9a0ae03ea58cbf4d5211aeed74a992bd3edbdbded3dccf6142447d045905b8d05ee76fdedc93d24ed41331136ea4e4a4ce8f07fbc0dfcf30923250bd5dc8626396d495b7ac75e1dd21fa84a8c86e7b91c9708aea6ccc27d6fbe82563f23e16a004c39bc39a4173368e2ba9c36e8e6cc74d082e20a87b9ef5d7caa2cd7593acbe8796aab67b093b065f2dddc9ec53eec03ec93505e8e77c43158a55b9aa0cdc8f9527f08bb25ea170bfbf48ff73b198e8df810e47a60ecec36515c0f9ab6f77eff74e635c76e3ef819728404bc32b09e2909e03a5b257de58aa21927b2c04619a080ec2113c9b0b0a27163d5e213fa767cc554d76141b12740226";

    #[tokio::test]
    async fn checksums_are_deterministic_and_detect_flipped_bytes() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("artifact.bin");
        tokio::fs::write(&path, FIXTURE_BIN).await?;

        let first = file_checksum(&path, ChecksumAlgo::Md5).await?;
        let second = file_checksum(&path, ChecksumAlgo::Md5).await?;
        assert_eq!(first, FIXTURE_MD5);
        assert_eq!(first, second);

        let mut flipped = FIXTURE_BIN.to_vec();
        if let Some(byte) = flipped.first_mut() {
            *byte ^= 0x01;
        }
        tokio::fs::write(&path, &flipped).await?;
        assert_ne!(file_checksum(&path, ChecksumAlgo::Md5).await?, FIXTURE_MD5);
        Ok(())
    }

    #[test]
    fn signature_verifies_against_lowercase_checksum() -> Result<()> {
        let key = parse_public_key(FIXTURE_KEY)?;
        verify_signature(&key, FIXTURE_MD5, FIXTURE_SIGN_MD5)?;
        verify_signature(&key, &FIXTURE_MD5.to_ascii_uppercase(), FIXTURE_SIGN_MD5)?;

        let error = verify_signature(&key, "00000000000000000000000000000000", FIXTURE_SIGN_MD5)
            .err()
            .ok_or_else(|| ErrorEnvelope::invariant(ErrorCode::internal(), "expected failure"))?;
        assert!(error.has_code("artifact", "signature_invalid"));
        assert_eq!(error.message, "signature verification failed");
        assert!(!error.is_retriable());

        assert!(verify_signature(&key, FIXTURE_MD5, "not-hex").is_err());
        Ok(())
    }

    #[test]
    fn default_distributor_key_parses() -> Result<()> {
        parse_public_key(codebase_index_config::DEFAULT_PUBLIC_KEY_PEM)?;
        assert!(parse_public_key("-----BEGIN PUBLIC KEY-----\nAAAA\n-----END PUBLIC KEY-----").is_err());
        Ok(())
    }
}
