//! Request and response shapes of the sidecar ingestion API.

use crate::events::WorkspaceEventData;
use serde::{Deserialize, Serialize};

/// Envelope returned by every ingestion endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestResponse {
    /// Application-level status code.
    #[serde(default)]
    pub code: serde_json::Value,
    /// Human-readable message.
    #[serde(default)]
    pub message: String,
    /// Whether the request was accepted.
    #[serde(default)]
    pub success: bool,
    /// Endpoint-specific payload.
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Body of `POST /codebase-indexer/api/v1/events`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventBatch {
    /// Workspace root path.
    pub workspace: String,
    /// Events in insertion order.
    pub data: Vec<WorkspaceEventData>,
}

/// Which index to (re)build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IndexBuildType {
    /// Every index.
    #[default]
    All,
    /// Semantic embedding index.
    Embedding,
    /// Code graph index.
    Codegraph,
}

/// Body of `POST /codebase-indexer/api/v1/index`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexBuildRequest {
    /// Workspace root path.
    pub workspace: String,
    /// Optional sub-path to restrict the build to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Index kind.
    #[serde(rename = "type")]
    pub build_type: IndexBuildType,
}

/// Body of `POST /codebase-indexer/api/v1/ignore/check`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IgnoreCheckRequest {
    /// Workspace root path.
    pub workspace: String,
    /// Paths to check.
    pub file_paths: Vec<String>,
}
