//! Workspace events relayed to the sidecar.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use url::Url;

/// Kind of workspace change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkspaceEventType {
    /// A workspace folder was opened or added.
    OpenWorkspace,
    /// A workspace folder was closed or removed.
    CloseWorkspace,
    /// A file was created.
    AddFile,
    /// A file's content changed.
    ModifyFile,
    /// A file was deleted.
    DeleteFile,
    /// A file was renamed or moved.
    RenameFile,
}

impl WorkspaceEventType {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OpenWorkspace => "open_workspace",
            Self::CloseWorkspace => "close_workspace",
            Self::AddFile => "add_file",
            Self::ModifyFile => "modify_file",
            Self::DeleteFile => "delete_file",
            Self::RenameFile => "rename_file",
        }
    }
}

impl fmt::Display for WorkspaceEventType {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// One event as sent on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceEventData {
    /// Kind of change.
    pub event_type: WorkspaceEventType,
    /// RFC 3339 timestamp.
    pub event_time: String,
    /// Affected path (the old path for renames).
    pub source_path: String,
    /// New path, for renames only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_path: Option<String>,
}

impl WorkspaceEventData {
    /// Event about a single path.
    #[must_use]
    pub fn new(event_type: WorkspaceEventType, path: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            event_type,
            event_time: format_event_time(at),
            source_path: path.into(),
            target_path: None,
        }
    }

    /// `rename_file` event from `from` to `to`.
    #[must_use]
    pub fn rename(from: impl Into<String>, to: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            target_path: Some(to.into()),
            ..Self::new(WorkspaceEventType::RenameFile, from, at)
        }
    }

    /// Deduplication key: `kind:path`, or `kind:old:new` for renames.
    #[must_use]
    pub fn key(&self) -> String {
        match &self.target_path {
            Some(target) => format!("{}:{}:{}", self.event_type, self.source_path, target),
            None => format!("{}:{}", self.event_type, self.source_path),
        }
    }
}

/// RFC 3339 with millisecond precision and a `Z` suffix.
#[must_use]
pub fn format_event_time(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// A resource reference handed over by the host: a URI or a plain path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceUri(Url);

impl ResourceUri {
    /// Parse a URI; absolute filesystem paths are accepted as `file` URIs.
    ///
    /// Returns `None` for relative paths and unparsable input.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let path = Path::new(value);
        if path.is_absolute() {
            return Self::from_path(path);
        }
        Url::parse(value).ok().map(Self)
    }

    /// `file` URI for an absolute path.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        Url::from_file_path(path).ok().map(Self)
    }

    /// URI scheme.
    #[must_use]
    pub fn scheme(&self) -> &str {
        self.0.scheme()
    }

    /// True for local `file` resources.
    #[must_use]
    pub fn is_local_file(&self) -> bool {
        self.0.scheme() == "file"
    }

    /// Filesystem path for local resources.
    #[must_use]
    pub fn to_file_path(&self) -> Option<PathBuf> {
        if !self.is_local_file() {
            return None;
        }
        self.0.to_file_path().ok()
    }
}

impl fmt::Display for ResourceUri {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.0.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0)
            .single()
            .unwrap_or_default()
    }

    #[test]
    fn keys_distinguish_kind_and_rename_target() {
        let modify = WorkspaceEventData::new(WorkspaceEventType::ModifyFile, "/ws/a.ts", at());
        let delete = WorkspaceEventData::new(WorkspaceEventType::DeleteFile, "/ws/a.ts", at());
        let rename = WorkspaceEventData::rename("/ws/a.ts", "/ws/b.ts", at());

        assert_eq!(modify.key(), "modify_file:/ws/a.ts");
        assert_eq!(delete.key(), "delete_file:/ws/a.ts");
        assert_eq!(rename.key(), "rename_file:/ws/a.ts:/ws/b.ts");
    }

    #[test]
    fn wire_shape_is_camel_case_with_optional_target() -> Result<(), serde_json::Error> {
        let event = WorkspaceEventData::new(WorkspaceEventType::AddFile, "/ws/new.rs", at());
        assert_eq!(
            serde_json::to_value(&event)?,
            serde_json::json!({
                "eventType": "add_file",
                "eventTime": "2024-05-01T12:00:00.000Z",
                "sourcePath": "/ws/new.rs"
            })
        );
        let rename = WorkspaceEventData::rename("/ws/a", "/ws/b", at());
        assert_eq!(serde_json::to_value(&rename)?["targetPath"], "/ws/b");
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn resource_uris_accept_paths_and_reject_remote_schemes() {
        let local = ResourceUri::parse("/ws/src/main.rs");
        assert!(local.as_ref().is_some_and(ResourceUri::is_local_file));
        assert_eq!(
            local.and_then(|uri| uri.to_file_path()),
            Some(PathBuf::from("/ws/src/main.rs"))
        );

        let remote = ResourceUri::parse("vscode-remote://ssh/home/a.rs");
        assert!(remote.as_ref().is_some_and(|uri| !uri.is_local_file()));
        assert!(remote.and_then(|uri| uri.to_file_path()).is_none());

        assert!(ResourceUri::parse("relative/path.rs").is_none());
    }
}
