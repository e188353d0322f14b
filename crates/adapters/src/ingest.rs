//! HTTP client for the sidecar's ingestion API.

use crate::http::{build_client, join_url, map_status_error, read_body, send};
use codebase_index_domain::{EventBatch, IgnoreCheckRequest, IndexBuildRequest, IngestResponse};
use codebase_index_ports::{BoxFuture, IngestEndpoint, IngestPort};
use codebase_index_shared::{ErrorClass, ErrorCode, ErrorEnvelope, RequestContext, Result};
use reqwest::Method;
use serde::Serialize;

const API_PREFIX: &str = "/codebase-indexer/api/v1";

/// Ingestion API client; one instance serves every endpoint and token.
#[derive(Debug, Clone)]
pub struct HttpIngestClient {
    client: reqwest::Client,
}

impl HttpIngestClient {
    /// Client whose requests time out after `timeout_ms`.
    pub fn new(timeout_ms: u64) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout_ms, "ingest")?,
        })
    }

    async fn call<B: Serialize + Sync>(
        &self,
        ctx: &RequestContext,
        endpoint: &IngestEndpoint,
        method: Method,
        url: url::Url,
        body: Option<&B>,
        operation: &'static str,
    ) -> Result<IngestResponse> {
        let url = url.to_string();
        let mut request = self
            .client
            .request(method, &url)
            .bearer_auth(endpoint.token.expose());
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = send(ctx, request, &url, operation).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(map_status_error(status, &url, ingest_code("request_failed")));
        }
        let payload = read_body(ctx, response, &url, operation).await?;
        serde_json::from_slice(&payload).map_err(|error| {
            ErrorEnvelope::unexpected(
                ingest_code("request_failed"),
                format!("invalid response from {url}: {error}"),
                ErrorClass::NonRetriable,
            )
            .with_metadata("url", url.as_str())
        })
    }
}

fn api_url(endpoint: &IngestEndpoint, path: &str) -> Result<url::Url> {
    let raw = join_url(&endpoint.base_url, &format!("{API_PREFIX}{path}"));
    url::Url::parse(&raw).map_err(|error| {
        ErrorEnvelope::expected(
            ErrorCode::invalid_input(),
            format!("invalid ingest endpoint {raw}: {error}"),
        )
    })
}

fn ingest_code(code: &str) -> ErrorCode {
    ErrorCode::new("ingest", code)
}

impl IngestPort for HttpIngestClient {
    fn publish_events(
        &self,
        ctx: &RequestContext,
        endpoint: IngestEndpoint,
        batch: EventBatch,
    ) -> BoxFuture<'_, Result<IngestResponse>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            let url = api_url(&endpoint, "/events")?;
            tracing::debug!(events = batch.data.len(), workspace = %batch.workspace, "publishing workspace events");
            self.call(&ctx, &endpoint, Method::POST, url, Some(&batch), "ingest.publish_events")
                .await
        })
    }

    fn probe_health(&self, ctx: &RequestContext, base_url: String) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            let url = join_url(&base_url, "/healthz");
            let response = send(&ctx, self.client.get(&url), &url, "ingest.probe_health").await?;
            let status = response.status();
            if status.is_success() {
                Ok(())
            } else {
                Err(map_status_error(status, &url, ingest_code("unhealthy")))
            }
        })
    }

    fn trigger_index_build(
        &self,
        ctx: &RequestContext,
        endpoint: IngestEndpoint,
        request: IndexBuildRequest,
    ) -> BoxFuture<'_, Result<IngestResponse>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            let url = api_url(&endpoint, "/index")?;
            self.call(&ctx, &endpoint, Method::POST, url, Some(&request), "ingest.trigger_index_build")
                .await
        })
    }

    fn check_ignore_files(
        &self,
        ctx: &RequestContext,
        endpoint: IngestEndpoint,
        request: IgnoreCheckRequest,
    ) -> BoxFuture<'_, Result<IngestResponse>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            let url = api_url(&endpoint, "/ignore/check")?;
            self.call(&ctx, &endpoint, Method::POST, url, Some(&request), "ingest.check_ignore_files")
                .await
        })
    }

    fn index_status(
        &self,
        ctx: &RequestContext,
        endpoint: IngestEndpoint,
        workspace: String,
    ) -> BoxFuture<'_, Result<IngestResponse>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            let mut url = api_url(&endpoint, "/index/status")?;
            url.query_pairs_mut().append_pair("workspace", &workspace);
            self.call::<()>(&ctx, &endpoint, Method::GET, url, None, "ingest.index_status")
                .await
        })
    }

    fn toggle_index(
        &self,
        ctx: &RequestContext,
        endpoint: IngestEndpoint,
        workspace: String,
        enabled: bool,
    ) -> BoxFuture<'_, Result<IngestResponse>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            let mut url = api_url(&endpoint, "/switch")?;
            url.query_pairs_mut()
                .append_pair("workspace", &workspace)
                .append_pair("switch", if enabled { "on" } else { "off" });
            self.call::<()>(&ctx, &endpoint, Method::PUT, url, None, "ingest.toggle_index")
                .await
        })
    }
}
