//! Recursive filesystem watch backed by `notify`.

use codebase_index_ports::{FileWatcherPort, WatchCallback, WatchEvent, WatchSubscription};
use codebase_index_shared::{ErrorClass, ErrorCode, ErrorEnvelope, Result};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use std::path::Path;

/// Watcher using the platform's recommended `notify` backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotifyWatcher;

impl NotifyWatcher {
    /// Create a watcher factory.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl FileWatcherPort for NotifyWatcher {
    fn watch(&self, root: &Path, callback: WatchCallback) -> Result<WatchSubscription> {
        let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
            match result {
                Ok(event) => translate(event).into_iter().for_each(|change| callback(change)),
                Err(error) => tracing::warn!(%error, "file watch error"),
            }
        })
        .map_err(|error| watch_error(&error, root))?;
        watcher
            .watch(root, RecursiveMode::Recursive)
            .map_err(|error| watch_error(&error, root))?;
        tracing::debug!(root = %root.display(), "file watch started");
        Ok(WatchSubscription::new(watcher))
    }
}

/// Map one `notify` event onto zero or more watch events.
///
/// Metadata-only and access events are dropped. Unpaired rename halves
/// become a removal or a creation.
#[must_use]
pub fn translate(event: Event) -> Vec<WatchEvent> {
    let Event { kind, paths, .. } = event;
    match kind {
        EventKind::Create(_) => paths.into_iter().map(WatchEvent::Created).collect(),
        EventKind::Remove(_) => paths.into_iter().map(WatchEvent::Removed).collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut paths = paths.into_iter();
            match (paths.next(), paths.next()) {
                (Some(from), Some(to)) => vec![WatchEvent::Renamed { from, to }],
                _ => Vec::new(),
            }
        },
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            paths.into_iter().map(WatchEvent::Removed).collect()
        },
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            paths.into_iter().map(WatchEvent::Created).collect()
        },
        EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any) => {
            paths.into_iter().map(WatchEvent::Modified).collect()
        },
        _ => Vec::new(),
    }
}

fn watch_error(error: &notify::Error, root: &Path) -> ErrorEnvelope {
    ErrorEnvelope::unexpected(
        ErrorCode::new("watch", "start_failed"),
        format!("failed to watch {}: {error}", root.display()),
        ErrorClass::NonRetriable,
    )
    .with_metadata("path", root.display().to_string())
}
