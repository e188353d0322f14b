//! Routes raw filesystem watch events into the event monitor.
//!
//! The watcher callback runs on the watcher's own thread; events are handed
//! to a tokio task through an unbounded channel and routed there in order.

use codebase_index_app::EventMonitor;
use codebase_index_ports::{
    IgnoreGatePort, LogEvent, LogLevel, LoggerPort, WatchCallback, WatchEvent, log_fields,
};
use codebase_index_shared::RequestContext;
use std::path::Path;
use std::sync::Arc;
use std::time::UNIX_EPOCH;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Maps watch events onto monitor operations.
///
/// `Modified` is treated as a save: the file is read from disk so the
/// monitor can drop writes that leave the content unchanged. A change to any
/// ignore file reloads the gate before the event is routed.
#[derive(Clone)]
pub struct WatchRouter {
    monitor: EventMonitor,
    gate: Arc<dyn IgnoreGatePort>,
    logger: Option<Arc<dyn LoggerPort>>,
}

impl WatchRouter {
    /// Router feeding `monitor`, reloading `gate` on rule file changes.
    #[must_use]
    pub fn new(
        monitor: EventMonitor,
        gate: Arc<dyn IgnoreGatePort>,
        logger: Option<Arc<dyn LoggerPort>>,
    ) -> Self {
        Self {
            monitor,
            gate,
            logger,
        }
    }

    /// Route a single event.
    pub async fn route(&self, ctx: &RequestContext, event: WatchEvent) {
        if touched_paths(&event).any(|path| self.gate.is_rule_file(path)) {
            self.reload_rules(ctx).await;
        }
        match event {
            WatchEvent::Created(path) => {
                self.monitor.on_file_created(ctx, &uri(&path)).await;
            },
            WatchEvent::Removed(path) => {
                self.monitor.on_file_deleted(ctx, &uri(&path)).await;
            },
            WatchEvent::Renamed { from, to } => {
                self.monitor.on_file_renamed(ctx, &uri(&from), &uri(&to)).await;
            },
            WatchEvent::Modified(path) => self.route_save(ctx, &path).await,
        }
    }

    /// Spawn the routing task; the returned callback feeds it.
    ///
    /// The task ends when `ctx` is cancelled or every callback clone is dropped.
    pub fn spawn(self, ctx: &RequestContext) -> (WatchCallback, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::unbounded_channel::<WatchEvent>();
        let callback: WatchCallback = Arc::new(move |event| {
            if sender.send(event).is_err() {
                tracing::debug!("watch event after router shutdown dropped");
            }
        });

        let ctx = ctx.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = ctx.cancelled() => break,
                    event = receiver.recv() => match event {
                        Some(event) => self.route(&ctx, event).await,
                        None => break,
                    },
                }
            }
        });
        (callback, handle)
    }

    async fn route_save(&self, ctx: &RequestContext, path: &Path) {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(error) => {
                self.log(
                    LogLevel::Debug,
                    "router.read_failed",
                    "Modified path could not be read",
                    &[("path", path.display().to_string()), ("error", error.to_string())],
                );
                return;
            },
        };
        let text = String::from_utf8_lossy(&bytes);
        let revision = modified_ms(path).await;
        self.monitor
            .on_document_saved(ctx, &uri(path), &text, revision)
            .await;
    }

    async fn reload_rules(&self, ctx: &RequestContext) {
        match self.gate.reload(ctx).await {
            Ok(()) => self.log(LogLevel::Debug, "router.rules.reloaded", "Ignore rules reloaded", &[]),
            Err(error) => {
                if let Some(logger) = &self.logger {
                    logger.failure(LogLevel::Warn, "router.rules.reload_failed", &error, None);
                }
            },
        }
    }

    fn log(&self, level: LogLevel, event: &str, message: &str, fields: &[(&str, String)]) {
        let Some(logger) = &self.logger else {
            return;
        };
        let fields = (!fields.is_empty()).then(|| {
            log_fields(fields.iter().map(|(key, value)| (*key, value.clone())))
        });
        logger.log(LogEvent::new(level, event, message, fields));
    }
}

fn touched_paths(event: &WatchEvent) -> impl Iterator<Item = &Path> {
    let (first, second) = match event {
        WatchEvent::Created(path) | WatchEvent::Modified(path) | WatchEvent::Removed(path) => {
            (path.as_path(), None)
        },
        WatchEvent::Renamed { from, to } => (from.as_path(), Some(to.as_path())),
    };
    std::iter::once(first).chain(second)
}

fn uri(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

async fn modified_ms(path: &Path) -> i64 {
    tokio::fs::metadata(path)
        .await
        .ok()
        .and_then(|meta| meta.modified().ok())
        .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
        .and_then(|elapsed| i64::try_from(elapsed.as_millis()).ok())
        .unwrap_or_default()
}
