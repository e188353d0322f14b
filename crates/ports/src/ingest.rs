//! HTTP API of the running sidecar.

use crate::BoxFuture;
use codebase_index_domain::{EventBatch, IgnoreCheckRequest, IndexBuildRequest, IngestResponse};
use codebase_index_shared::{RequestContext, Result, SecretString};

/// Where and how to reach the sidecar.
#[derive(Debug, Clone)]
pub struct IngestEndpoint {
    /// `http://localhost:<port>`
    pub base_url: String,
    /// Bearer token.
    pub token: SecretString,
}

/// Client of the sidecar ingestion API.
///
/// Transport failures and 408/429/5xx are retriable; a parsed envelope is
/// returned as-is even when `success` is false.
pub trait IngestPort: Send + Sync {
    /// `POST /codebase-indexer/api/v1/events`
    fn publish_events(
        &self,
        ctx: &RequestContext,
        endpoint: IngestEndpoint,
        batch: EventBatch,
    ) -> BoxFuture<'_, Result<IngestResponse>>;

    /// `GET /healthz`; any 2xx is healthy.
    fn probe_health(&self, ctx: &RequestContext, base_url: String) -> BoxFuture<'_, Result<()>>;

    /// `POST /codebase-indexer/api/v1/index`
    fn trigger_index_build(
        &self,
        ctx: &RequestContext,
        endpoint: IngestEndpoint,
        request: IndexBuildRequest,
    ) -> BoxFuture<'_, Result<IngestResponse>>;

    /// `POST /codebase-indexer/api/v1/ignore/check`
    fn check_ignore_files(
        &self,
        ctx: &RequestContext,
        endpoint: IngestEndpoint,
        request: IgnoreCheckRequest,
    ) -> BoxFuture<'_, Result<IngestResponse>>;

    /// `GET /codebase-indexer/api/v1/index/status?workspace=`
    fn index_status(
        &self,
        ctx: &RequestContext,
        endpoint: IngestEndpoint,
        workspace: String,
    ) -> BoxFuture<'_, Result<IngestResponse>>;

    /// `PUT /codebase-indexer/api/v1/switch?workspace=&switch=on|off`
    fn toggle_index(
        &self,
        ctx: &RequestContext,
        endpoint: IngestEndpoint,
        workspace: String,
        enabled: bool,
    ) -> BoxFuture<'_, Result<IngestResponse>>;
}
