// Artifact download, verification and install against a mock origin.
#![allow(missing_docs)]

use codebase_index_adapters::HttpArtifactInstaller;
use codebase_index_config::CatalogConfig;
use codebase_index_domain::{PackageInfo, VersionDescriptor, VersionId};
use codebase_index_ports::{
    ArtifactInstallerPort, DownloadProgress, InstallOutcome, InstallRequest, ProgressCallback,
};
use codebase_index_shared::{ErrorCode, ErrorEnvelope, RequestContext, Result, RetryPolicy};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ARTIFACT: &[u8] = include_bytes!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../../tests/fixtures/artifact/codebase-indexer.bin"
));
const PACKAGE_MD5: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../../tests/fixtures/artifact/package.md5.json"
));
const PACKAGE_SHA256: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../../tests/fixtures/artifact/package.sha256.json"
));
const PACKAGE_BAD_SIGNATURE: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../../tests/fixtures/artifact/package.bad-signature.json"
));
const PUBLIC_KEY: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../../tests/fixtures/artifact/signing_key.pub.pem"
));
const APP_PATH: &str = "/linux/amd64/1.2.0/codebase-indexer";

const FAST_RETRY: RetryPolicy = RetryPolicy {
    max_attempts: 3,
    base_delay_ms: 1,
    max_delay_ms: 5,
};

fn installer(server: &MockServer) -> Result<HttpArtifactInstaller> {
    let config = CatalogConfig {
        base_url: server.uri(),
        timeout_ms: 2_000,
        public_key_pem: PUBLIC_KEY.to_owned(),
    };
    HttpArtifactInstaller::new(&config, FAST_RETRY)
}

fn package(raw: &str) -> Result<PackageInfo> {
    serde_json::from_str(raw)
        .map_err(|error| ErrorEnvelope::expected(ErrorCode::invalid_input(), error.to_string()))
}

fn request(target: &Path, raw: &str) -> Result<InstallRequest> {
    let package = package(raw)?;
    Ok(InstallRequest {
        target_path: target.to_path_buf(),
        descriptor: VersionDescriptor {
            version_id: VersionId::new(1, 2, 0),
            app_url: APP_PATH.to_owned(),
            info_url: "/linux/amd64/1.2.0/package.json".to_owned(),
        },
        package,
    })
}

async fn serve(server: &MockServer, body: &[u8]) {
    Mock::given(method("GET"))
        .and(path(APP_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
        .mount(server)
        .await;
}

fn target_in(dir: &tempfile::TempDir) -> PathBuf {
    dir.path().join("bin").join("codebase-indexer")
}

#[tokio::test]
async fn verified_artifact_is_installed() -> Result<()> {
    let server = MockServer::start().await;
    serve(&server, ARTIFACT).await;
    let dir = tempfile::tempdir()?;
    let target = target_in(&dir);

    let seen: Arc<Mutex<Vec<DownloadProgress>>> = Arc::default();
    let sink = Arc::clone(&seen);
    let progress: ProgressCallback = Arc::new(move |snapshot| {
        if let Ok(mut seen) = sink.lock() {
            seen.push(snapshot);
        }
    });

    let ctx = RequestContext::new_request();
    let installer = installer(&server)?;
    let outcome = installer
        .download_and_install(&ctx, request(&target, PACKAGE_MD5)?, Some(progress))
        .await?;

    assert_eq!(outcome, InstallOutcome::Installed);
    assert_eq!(tokio::fs::read(&target).await?, ARTIFACT);
    let last = seen.lock().ok().and_then(|seen| seen.last().copied());
    assert_eq!(last.map(|snapshot| snapshot.percent), Some(100));

    let installed = package(PACKAGE_MD5)?;
    assert!(installer.verify_installed(&ctx, target.clone(), installed).await?);
    assert!(installer.artifact_exists(&ctx, target).await?);

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(target_in(&dir))?.permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }
    Ok(())
}

#[tokio::test]
async fn sha256_packages_are_verified_too() -> Result<()> {
    let server = MockServer::start().await;
    serve(&server, ARTIFACT).await;
    let dir = tempfile::tempdir()?;
    let target = target_in(&dir);

    let outcome = installer(&server)?
        .download_and_install(
            &RequestContext::new_request(),
            request(&target, PACKAGE_SHA256)?,
            None,
        )
        .await?;
    assert_eq!(outcome, InstallOutcome::Installed);
    Ok(())
}

#[tokio::test]
async fn checksum_mismatch_removes_the_file() -> Result<()> {
    let server = MockServer::start().await;
    serve(&server, b"tampered artifact body").await;
    let dir = tempfile::tempdir()?;
    let target = target_in(&dir);

    let result = installer(&server)?
        .download_and_install(&RequestContext::new_request(), request(&target, PACKAGE_MD5)?, None)
        .await;
    let error = match result {
        Ok(outcome) => panic!("expected checksum failure, got {outcome:?}"),
        Err(error) => error,
    };
    assert!(error.has_code("artifact", "checksum_mismatch"));
    assert_eq!(
        error.metadata.get("expected").map(String::as_str),
        Some("85361a0e967295a50880cda772329d5d")
    );
    assert!(!target.exists());
    Ok(())
}

#[tokio::test]
async fn foreign_signature_is_rejected() -> Result<()> {
    let server = MockServer::start().await;
    serve(&server, ARTIFACT).await;
    let dir = tempfile::tempdir()?;
    let target = target_in(&dir);

    let result = installer(&server)?
        .download_and_install(
            &RequestContext::new_request(),
            request(&target, PACKAGE_BAD_SIGNATURE)?,
            None,
        )
        .await;
    let error = match result {
        Ok(outcome) => panic!("expected signature failure, got {outcome:?}"),
        Err(error) => error,
    };
    assert!(error.has_code("artifact", "signature_invalid"));
    assert!(!target.exists());
    Ok(())
}

#[tokio::test]
async fn server_errors_are_retried_then_reported() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(APP_PATH))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;
    let dir = tempfile::tempdir()?;
    let target = target_in(&dir);

    let result = installer(&server)?
        .download_and_install(&RequestContext::new_request(), request(&target, PACKAGE_MD5)?, None)
        .await;
    let error = match result {
        Ok(outcome) => panic!("expected download failure, got {outcome:?}"),
        Err(error) => error,
    };
    assert!(error.has_code("artifact", "download_failed"));
    assert_eq!(error.metadata.get("attempts").map(String::as_str), Some("3"));
    assert!(!target.exists());
    Ok(())
}

#[tokio::test]
async fn not_found_is_retried_like_any_transport_failure() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(APP_PATH))
        .respond_with(ResponseTemplate::new(404))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    serve(&server, ARTIFACT).await;
    let dir = tempfile::tempdir()?;
    let target = target_in(&dir);

    let outcome = installer(&server)?
        .download_and_install(&RequestContext::new_request(), request(&target, PACKAGE_MD5)?, None)
        .await?;
    assert_eq!(outcome, InstallOutcome::Installed);
    Ok(())
}

#[tokio::test]
async fn cancelled_download_reports_cancelled() -> Result<()> {
    let server = MockServer::start().await;
    serve(&server, ARTIFACT).await;
    let dir = tempfile::tempdir()?;
    let target = target_in(&dir);

    let ctx = RequestContext::new_request();
    ctx.cancel();
    let outcome = installer(&server)?
        .download_and_install(&ctx, request(&target, PACKAGE_MD5)?, None)
        .await?;
    assert_eq!(outcome, InstallOutcome::Cancelled);
    assert!(!target.exists());
    Ok(())
}

#[tokio::test]
async fn missing_file_is_not_installed() -> Result<()> {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir()?;
    let expected = package(PACKAGE_MD5)?;
    let ctx = RequestContext::new_request();
    let installer = installer(&server)?;

    assert!(!installer.verify_installed(&ctx, target_in(&dir), expected).await?);
    assert!(!installer.artifact_exists(&ctx, target_in(&dir)).await?);
    Ok(())
}
