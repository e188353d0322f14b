//! HTTP release catalog.

use crate::http::{build_client, join_url, map_status_error, read_body, send};
use codebase_index_config::CatalogConfig;
use codebase_index_domain::{PackageInfo, Target, VersionDescriptor, VersionList};
use codebase_index_ports::{BoxFuture, VersionCatalogPort};
use codebase_index_shared::{ErrorClass, ErrorCode, ErrorEnvelope, RequestContext, Result};
use serde::de::DeserializeOwned;

/// Catalog served as static JSON under a base URL.
#[derive(Debug, Clone)]
pub struct HttpVersionCatalog {
    client: reqwest::Client,
    base_url: String,
}

impl HttpVersionCatalog {
    /// Catalog client for the configured base URL.
    pub fn new(config: &CatalogConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config.timeout_ms, "catalog")?,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
        })
    }

    /// `{base}/{platform}/{arch}/platform.json`
    #[must_use]
    pub fn version_list_url(&self, target: Target) -> String {
        format!(
            "{}/{}/{}/platform.json",
            self.base_url, target.platform, target.arch
        )
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        ctx: &RequestContext,
        url: String,
        operation: &'static str,
    ) -> Result<T> {
        let response = send(ctx, self.client.get(&url), &url, operation)
            .await
            .map_err(|error| request_failed(error, &url))?;
        let status = response.status();
        if !status.is_success() {
            let error = map_status_error(status, &url, catalog_code("request_failed"));
            return Err(request_failed(error, &url));
        }
        let body = read_body(ctx, response, &url, operation)
            .await
            .map_err(|error| request_failed(error, &url))?;
        serde_json::from_slice(&body).map_err(|error| {
            ErrorEnvelope::unexpected(
                catalog_code("invalid_response"),
                format!("failed to decode {url}: {error}"),
                ErrorClass::NonRetriable,
            )
            .with_metadata("url", url.as_str())
        })
    }
}

impl VersionCatalogPort for HttpVersionCatalog {
    fn fetch_version_list(
        &self,
        ctx: &RequestContext,
        target: Target,
    ) -> BoxFuture<'_, Result<VersionList>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            let url = self.version_list_url(target);
            tracing::debug!(%url, "fetching version list");
            self.get_json(&ctx, url, "catalog.fetch_version_list").await
        })
    }

    fn fetch_package_info(
        &self,
        ctx: &RequestContext,
        descriptor: VersionDescriptor,
    ) -> BoxFuture<'_, Result<PackageInfo>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            let url = join_url(&self.base_url, &descriptor.info_url);
            self.get_json(&ctx, url, "catalog.fetch_package_info").await
        })
    }
}

fn catalog_code(code: &str) -> ErrorCode {
    ErrorCode::new("catalog", code)
}

/// Transport and status failures keep their class but move under the catalog namespace.
fn request_failed(error: ErrorEnvelope, url: &str) -> ErrorEnvelope {
    if error.is_cancelled() {
        return error;
    }
    let mut wrapped = ErrorEnvelope::unexpected(
        catalog_code("request_failed"),
        format!("catalog request failed: {}", error.message),
        error.class,
    );
    wrapped.metadata = error.metadata;
    wrapped
        .with_metadata("cause", error.code.to_string())
        .with_metadata("url", url)
}
