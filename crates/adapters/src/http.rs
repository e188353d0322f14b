//! Shared reqwest plumbing: client construction, cancellable sends and
//! status/transport error classification.

use codebase_index_shared::{ErrorClass, ErrorCode, ErrorEnvelope, RequestContext, Result};
use reqwest::{RequestBuilder, Response, StatusCode};
use std::time::Duration;

/// Build a client with a per-request timeout.
pub(crate) fn build_client(timeout_ms: u64, namespace: &'static str) -> Result<reqwest::Client> {
    if timeout_ms == 0 {
        return Err(ErrorEnvelope::expected(
            ErrorCode::invalid_input(),
            "timeout must be greater than zero",
        ));
    }
    reqwest::Client::builder()
        .timeout(Duration::from_millis(timeout_ms))
        .user_agent(concat!("codebase-index/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|error| {
            ErrorEnvelope::unexpected(
                ErrorCode::new(namespace, "client_init_failed"),
                format!("failed to build HTTP client: {error}"),
                ErrorClass::NonRetriable,
            )
        })
}

/// Join a base URL and a path that may or may not start with `/`.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim();
    if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}

pub(crate) fn cancelled_error(operation: &'static str) -> ErrorEnvelope {
    ErrorEnvelope::cancelled("operation cancelled").with_metadata("operation", operation)
}

/// Send `request`, racing it against cancellation.
pub(crate) async fn send(
    ctx: &RequestContext,
    request: RequestBuilder,
    url: &str,
    operation: &'static str,
) -> Result<Response> {
    ctx.ensure_not_cancelled(operation)?;
    tokio::select! {
        () = ctx.cancelled() => Err(cancelled_error(operation)),
        result = request.send() => result.map_err(|error| map_reqwest_error(&error, url)),
    }
}

/// Read the full body, racing it against cancellation.
pub(crate) async fn read_body(
    ctx: &RequestContext,
    response: Response,
    url: &str,
    operation: &'static str,
) -> Result<Vec<u8>> {
    tokio::select! {
        () = ctx.cancelled() => Err(cancelled_error(operation)),
        result = response.bytes() => result
            .map(|bytes| bytes.to_vec())
            .map_err(|error| map_reqwest_error(&error, url)),
    }
}

/// Timeouts and connect failures are retriable; everything else is not.
pub(crate) fn map_reqwest_error(error: &reqwest::Error, url: &str) -> ErrorEnvelope {
    let envelope = if error.is_timeout() {
        ErrorEnvelope::unexpected(
            ErrorCode::timeout(),
            format!("request to {url} timed out"),
            ErrorClass::Retriable,
        )
    } else if error.is_connect() {
        ErrorEnvelope::unexpected(
            ErrorCode::io(),
            format!("connection to {url} failed: {error}"),
            ErrorClass::Retriable,
        )
    } else if error.is_body() || error.is_request() {
        ErrorEnvelope::unexpected(
            ErrorCode::io(),
            format!("transfer from {url} failed: {error}"),
            ErrorClass::Retriable,
        )
    } else {
        ErrorEnvelope::unexpected(
            ErrorCode::new("http", "request_failed"),
            format!("request to {url} failed: {error}"),
            ErrorClass::NonRetriable,
        )
    };
    envelope.with_metadata("url", url)
}

/// Classify a non-success status; `fallback` names codes outside the shared set.
pub(crate) fn map_status_error(status: StatusCode, url: &str, fallback: ErrorCode) -> ErrorEnvelope {
    let message = format!("{url} returned HTTP {}", status.as_u16());
    let envelope = match status.as_u16() {
        400 | 404 | 422 => ErrorEnvelope::expected(ErrorCode::invalid_input(), message),
        401 | 403 => ErrorEnvelope::expected(ErrorCode::permission_denied(), message),
        408 => ErrorEnvelope::unexpected(ErrorCode::timeout(), message, ErrorClass::Retriable),
        429 => ErrorEnvelope::unexpected(ErrorCode::rate_limited(), message, ErrorClass::Retriable),
        _ if status.is_server_error() => ErrorEnvelope::unexpected(
            ErrorCode::dependency_unavailable(),
            message,
            ErrorClass::Retriable,
        ),
        _ => ErrorEnvelope::unexpected(fallback, message, ErrorClass::NonRetriable),
    };
    envelope
        .with_metadata("status", status.as_u16().to_string())
        .with_metadata("url", url)
}
