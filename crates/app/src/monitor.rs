//! Workspace event pipeline: admit, deduplicate, debounce, deliver.
//!
//! Host notifications are filtered by the ignore gate and the provider
//! check, buffered under their dedup key, and flushed either after a quiet
//! period or as soon as the buffer reaches the batch threshold. Flushed
//! batches go through a single delivery worker, so batches reach the
//! sidecar in flush order and one batch's retries finish before the next
//! batch is sent. The close batch takes the same queue and is sent once.

use crate::buffer::EventBuffer;
use crate::cache::DocumentContentCache;
use crate::supervisor::Supervisor;
use chrono::{DateTime, Utc};
use codebase_index_config::MonitorConfig;
use codebase_index_domain::{
    EventBatch, IngestResponse, ResourceUri, WorkspaceEventData, WorkspaceEventType,
};
use codebase_index_ports::{
    BoxFuture, ClockPort, IgnoreGatePort, LogEvent, LogFields, LogLevel, LoggerPort,
    ProviderContextPort, TelemetryPort, TelemetryTags, log_fields,
};
use codebase_index_shared::{RequestContext, Result, RetryBudget, retry_within_budget};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio::task::JoinHandle;

const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Counter bumped when a batch is given up on.
pub const DELIVERY_FAILED_COUNTER: &str = "workspace_events.delivery_failed";

/// Sink for flushed batches.
pub trait EventPublisher: Send + Sync {
    /// Deliver one batch; `success=false` responses are returned, not raised.
    fn publish_events(
        &self,
        ctx: &RequestContext,
        batch: EventBatch,
    ) -> BoxFuture<'_, Result<IngestResponse>>;
}

impl EventPublisher for Supervisor {
    fn publish_events(
        &self,
        ctx: &RequestContext,
        batch: EventBatch,
    ) -> BoxFuture<'_, Result<IngestResponse>> {
        let ctx = ctx.clone();
        Box::pin(async move { Self::publish_events(self, &ctx, batch).await })
    }
}

/// Collaborators of the monitor.
#[derive(Clone)]
pub struct MonitorDeps {
    /// Where batches go.
    pub publisher: Arc<dyn EventPublisher>,
    /// Ignore policy of the workspace.
    pub gate: Arc<dyn IgnoreGatePort>,
    /// Active provider.
    pub provider: Arc<dyn ProviderContextPort>,
    /// Event timestamps.
    pub clock: Arc<dyn ClockPort>,
    /// Optional logger.
    pub logger: Option<Arc<dyn LoggerPort>>,
    /// Optional telemetry sink.
    pub telemetry: Option<Arc<dyn TelemetryPort>>,
}

/// Settings that `update_settings` may replace at runtime.
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    /// Pipeline knobs.
    pub config: MonitorConfig,
    /// Provider kind that must be active.
    pub expected_provider: String,
    /// Workspace root sent with every batch.
    pub workspace: PathBuf,
}

impl MonitorSettings {
    fn budget(&self) -> RetryBudget {
        RetryBudget {
            max_retries: self.config.max_retries,
            base_delay_ms: self.config.retry_delay_ms,
            max_delay_ms: self.config.max_retry_delay_ms,
            budget_ms: self.config.retry_budget_ms,
        }
    }

    fn workspace(&self) -> String {
        self.workspace.to_string_lossy().into_owned()
    }
}

/// Event pipeline handle; clones share one pipeline.
#[derive(Clone)]
pub struct EventMonitor {
    inner: Arc<MonitorInner>,
}

struct MonitorInner {
    deps: MonitorDeps,
    settings: Arc<RwLock<MonitorSettings>>,
    buffer: Mutex<EventBuffer>,
    cache: Mutex<DocumentContentCache>,
    debounce: Mutex<Option<(u64, JoinHandle<()>)>>,
    generation: AtomicU64,
    sender: Mutex<Option<mpsc::UnboundedSender<QueuedBatch>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    pending: Arc<AtomicUsize>,
    ctx: RequestContext,
}

struct QueuedBatch {
    batch: EventBatch,
    closing: bool,
}

struct DeliveryWorker {
    deps: MonitorDeps,
    settings: Arc<RwLock<MonitorSettings>>,
    pending: Arc<AtomicUsize>,
    ctx: RequestContext,
}

impl EventMonitor {
    /// Build the pipeline and spawn its delivery worker.
    ///
    /// Must be called inside a tokio runtime. Cancelling `ctx` stops delivery.
    pub fn new(ctx: &RequestContext, deps: MonitorDeps, settings: MonitorSettings) -> Self {
        let ctx = ctx.child();
        let capacity = usize::try_from(settings.config.content_cache_capacity).unwrap_or(usize::MAX);
        let settings = Arc::new(RwLock::new(settings));
        let pending = Arc::new(AtomicUsize::new(0));
        let (sender, receiver) = mpsc::unbounded_channel();
        let worker = DeliveryWorker {
            deps: deps.clone(),
            settings: Arc::clone(&settings),
            pending: Arc::clone(&pending),
            ctx: ctx.clone(),
        };
        let handle = tokio::spawn(worker.run(receiver));

        Self {
            inner: Arc::new(MonitorInner {
                deps,
                settings,
                buffer: Mutex::new(EventBuffer::new()),
                cache: Mutex::new(DocumentContentCache::new(capacity)),
                debounce: Mutex::new(None),
                generation: AtomicU64::new(0),
                sender: Mutex::new(Some(sender)),
                worker: Mutex::new(Some(handle)),
                pending,
                ctx,
            }),
        }
    }

    /// A document was saved with `text` as its full content.
    ///
    /// Saves that leave the content unchanged produce no event.
    pub async fn on_document_saved(&self, ctx: &RequestContext, uri: &str, text: &str, revision: i64) {
        let Some(path) = self.inner.admit(uri) else {
            return;
        };
        if !self.inner.service_enabled(ctx).await {
            return;
        }
        let path = display(&path);
        let changed = self.inner.cache.lock().await.observe(&path, text, revision);
        if !changed {
            self.inner.log(
                LogLevel::Debug,
                "monitor.save.unchanged",
                "Save without content change dropped",
                Some(log_fields([("path", path)])),
            );
            return;
        }
        self.inner
            .enqueue(self.inner.event(WorkspaceEventType::ModifyFile, path))
            .await;
    }

    /// A document was opened; seeds the content cache.
    pub async fn on_document_opened(&self, uri: &str, text: &str, revision: i64) {
        let Some(path) = ResourceUri::parse(uri).and_then(|resource| resource.to_file_path()) else {
            return;
        };
        self.inner.cache.lock().await.prime(&display(&path), text, revision);
    }

    /// A file was created.
    pub async fn on_file_created(&self, ctx: &RequestContext, uri: &str) {
        self.inner.single(ctx, WorkspaceEventType::AddFile, uri).await;
    }

    /// A file was deleted.
    pub async fn on_file_deleted(&self, ctx: &RequestContext, uri: &str) {
        if let Some(path) = ResourceUri::parse(uri).and_then(|resource| resource.to_file_path()) {
            self.inner.cache.lock().await.forget(&display(&path));
        }
        self.inner.single(ctx, WorkspaceEventType::DeleteFile, uri).await;
    }

    /// A file was renamed or moved; admitted when either side passes the gate.
    pub async fn on_file_renamed(&self, ctx: &RequestContext, old_uri: &str, new_uri: &str) {
        let resolve = |uri: &str| ResourceUri::parse(uri).and_then(|resource| resource.to_file_path());
        let (Some(from), Some(to)) = (resolve(old_uri), resolve(new_uri)) else {
            self.inner.log(
                LogLevel::Debug,
                "monitor.event.non_file",
                "Rename of a non-file resource dropped",
                None,
            );
            return;
        };
        let gate = &self.inner.deps.gate;
        if !gate.validate_access(&from) && !gate.validate_access(&to) {
            self.inner.log(
                LogLevel::Debug,
                "monitor.event.ignored",
                "Rename of ignored paths dropped",
                Some(log_fields([("path", display(&to))])),
            );
            return;
        }
        if !self.inner.service_enabled(ctx).await {
            return;
        }
        let (from, to) = (display(&from), display(&to));
        {
            let mut cache = self.inner.cache.lock().await;
            cache.forget(&from);
        }
        let event = WorkspaceEventData::rename(from, to, self.inner.now());
        self.inner.enqueue(event).await;
    }

    /// A workspace folder was added.
    pub async fn on_workspace_folder_added(&self, ctx: &RequestContext, uri: &str) {
        self.inner.single(ctx, WorkspaceEventType::OpenWorkspace, uri).await;
    }

    /// A workspace folder was removed.
    pub async fn on_workspace_folder_removed(&self, ctx: &RequestContext, uri: &str) {
        self.inner.single(ctx, WorkspaceEventType::CloseWorkspace, uri).await;
    }

    /// Flush now, cancelling any pending debounce timer.
    pub async fn flush(&self) {
        self.inner.cancel_timer().await;
        self.inner.flush_buffer().await;
    }

    /// Replace the pipeline settings; applies to subsequent events.
    pub async fn update_settings(&self, settings: MonitorSettings) {
        let capacity = usize::try_from(settings.config.content_cache_capacity).unwrap_or(usize::MAX);
        *self.inner.settings.write().await = settings;
        self.inner.cache.lock().await.resize(capacity);
    }

    /// Whether the monitor's own switch is on.
    pub async fn monitor_enabled(&self) -> bool {
        self.inner.settings.read().await.config.enabled
    }

    /// Events waiting for the next flush.
    pub async fn buffered_events(&self) -> usize {
        self.inner.buffer.lock().await.len()
    }

    /// Queue pending events plus `close_workspace`, drain the delivery
    /// queue for at most [`CLOSE_TIMEOUT`], then stop the pipeline.
    ///
    /// The close batch is sent once. Failures are logged only; batches still
    /// queued when the timeout hits are counted as failed deliveries.
    #[tracing::instrument(name = "monitor.handle_close", skip_all)]
    pub async fn handle_close(&self, ctx: &RequestContext) {
        let inner = &self.inner;
        inner.cancel_timer().await;

        let mut data = inner.buffer.lock().await.drain();
        if inner.service_enabled(ctx).await {
            let workspace = inner.settings.read().await.workspace();
            data.push(inner.event(WorkspaceEventType::CloseWorkspace, workspace.clone()));
            inner.queue(EventBatch { workspace, data }, true).await;
        } else if !data.is_empty() {
            inner.log(
                LogLevel::Debug,
                "monitor.close.discarded",
                "Buffered events discarded on close",
                Some(log_fields([("events", data.len())])),
            );
        }

        inner.sender.lock().await.take();
        let worker = inner.worker.lock().await.take();
        if let Some(mut worker) = worker
            && tokio::time::timeout(CLOSE_TIMEOUT, &mut worker).await.is_err()
        {
            let abandoned = inner.pending.load(Ordering::SeqCst);
            inner.ctx.cancel();
            worker.abort();
            inner.abandoned(abandoned);
        }
        inner.ctx.cancel();
    }
}

impl MonitorInner {
    fn admit(&self, uri: &str) -> Option<PathBuf> {
        let Some(resource) = ResourceUri::parse(uri) else {
            self.log(
                LogLevel::Debug,
                "monitor.event.unparsable",
                "Resource reference dropped",
                Some(log_fields([("uri", uri)])),
            );
            return None;
        };
        let Some(path) = resource.to_file_path() else {
            self.log(
                LogLevel::Debug,
                "monitor.event.non_file",
                "Non-file resource dropped",
                Some(log_fields([("scheme", resource.scheme())])),
            );
            return None;
        };
        if !self.deps.gate.validate_access(&path) {
            self.log(
                LogLevel::Debug,
                "monitor.event.ignored",
                "Ignored path dropped",
                Some(log_fields([("path", display(&path))])),
            );
            return None;
        }
        Some(path)
    }

    async fn service_enabled(&self, ctx: &RequestContext) -> bool {
        let (enabled, expected) = {
            let settings = self.settings.read().await;
            (settings.config.enabled, settings.expected_provider.clone())
        };
        if !enabled {
            return false;
        }
        match self.deps.provider.provider_state(ctx).await {
            Ok(state) => state.supports(&expected),
            Err(error) => {
                if let Some(logger) = self.deps.logger.as_ref() {
                    logger.failure(LogLevel::Debug, "monitor.provider.unavailable", &error, None);
                }
                false
            },
        }
    }

    async fn single(self: &Arc<Self>, ctx: &RequestContext, kind: WorkspaceEventType, uri: &str) {
        let Some(path) = self.admit(uri) else {
            return;
        };
        if !self.service_enabled(ctx).await {
            return;
        }
        self.enqueue(self.event(kind, display(&path))).await;
    }

    fn now(&self) -> DateTime<Utc> {
        let millis = i64::try_from(self.deps.clock.now_epoch_ms()).unwrap_or(i64::MAX);
        DateTime::from_timestamp_millis(millis).unwrap_or_default()
    }

    fn event(&self, kind: WorkspaceEventType, path: String) -> WorkspaceEventData {
        WorkspaceEventData::new(kind, path, self.now())
    }

    async fn enqueue(self: &Arc<Self>, event: WorkspaceEventData) {
        let len = self.buffer.lock().await.insert(event);
        let threshold = usize::try_from(self.settings.read().await.config.batch_size)
            .unwrap_or(usize::MAX)
            .max(1);
        if len >= threshold {
            self.cancel_timer().await;
            self.flush_buffer().await;
        } else {
            self.schedule_flush().await;
        }
    }

    async fn schedule_flush(self: &Arc<Self>) {
        let delay = Duration::from_millis(self.settings.read().await.config.debounce_ms);
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let inner = Arc::clone(self);
        let mut slot = self.debounce.lock().await;
        if let Some((_, previous)) = slot.take() {
            previous.abort();
        }
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut slot = inner.debounce.lock().await;
                if slot.as_ref().is_some_and(|(current, _)| *current == generation) {
                    slot.take();
                }
            }
            inner.flush_buffer().await;
        });
        *slot = Some((generation, handle));
    }

    async fn cancel_timer(&self) {
        if let Some((_, handle)) = self.debounce.lock().await.take() {
            handle.abort();
        }
    }

    async fn flush_buffer(&self) {
        let data = self.buffer.lock().await.drain();
        if data.is_empty() {
            return;
        }
        let workspace = self.settings.read().await.workspace();
        self.queue(EventBatch { workspace, data }, false).await;
    }

    async fn queue(&self, batch: EventBatch, closing: bool) {
        let events = batch.data.len();
        let sender = self.sender.lock().await;
        let queued = sender.as_ref().is_some_and(|sender| {
            self.pending.fetch_add(1, Ordering::SeqCst);
            let sent = sender.send(QueuedBatch { batch, closing }).is_ok();
            if !sent {
                self.pending.fetch_sub(1, Ordering::SeqCst);
            }
            sent
        });
        drop(sender);
        if !queued {
            self.log(
                LogLevel::Debug,
                "monitor.flush.dropped",
                "Pipeline closed; batch dropped",
                Some(log_fields([("events", events)])),
            );
        }
    }

    fn abandoned(&self, batches: usize) {
        if batches == 0 {
            return;
        }
        self.log(
            LogLevel::Warn,
            "monitor.close.abandoned",
            "Batches still queued at close were abandoned",
            Some(log_fields([("batches", batches)])),
        );
        if let Some(telemetry) = self.deps.telemetry.as_ref() {
            let tags: TelemetryTags = [(Box::from("reason"), Box::from("abandoned"))]
                .into_iter()
                .collect();
            let count = u64::try_from(batches).unwrap_or(u64::MAX);
            telemetry.increment_counter(DELIVERY_FAILED_COUNTER, count, Some(&tags));
        }
    }

    fn log(&self, level: LogLevel, event: &str, message: &str, fields: Option<LogFields>) {
        if let Some(logger) = self.deps.logger.as_ref() {
            logger.log(LogEvent::new(level, event, message, fields));
        }
    }
}

impl DeliveryWorker {
    async fn run(self, mut receiver: mpsc::UnboundedReceiver<QueuedBatch>) {
        while let Some(queued) = receiver.recv().await {
            if self.ctx.is_cancelled() {
                break;
            }
            self.deliver(queued.batch, queued.closing).await;
            self.pending.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[tracing::instrument(name = "monitor.deliver", skip_all, fields(events = batch.data.len()))]
    async fn deliver(&self, batch: EventBatch, closing: bool) {
        let mut budget = self.settings.read().await.budget();
        if closing {
            budget.max_retries = 0;
        }
        let events = batch.data.len();
        let publisher = Arc::clone(&self.deps.publisher);
        let logger = self.deps.logger.clone();

        let outcome = retry_within_budget(
            &self.ctx,
            budget,
            "monitor.deliver",
            || {
                let publisher = Arc::clone(&publisher);
                let ctx = self.ctx.clone();
                let batch = batch.clone();
                async move { publisher.publish_events(&ctx, batch).await }
            },
            |attempt, error, delay| {
                if let Some(logger) = logger.as_ref() {
                    logger.failure(
                        LogLevel::Debug,
                        "monitor.delivery.retry",
                        error,
                        Some(log_fields([
                            ("attempt", serde_json::Value::from(attempt)),
                            ("delayMs", serde_json::Value::from(delay.as_millis().to_string())),
                        ])),
                    );
                }
            },
        )
        .await;

        let fields = log_fields([
            ("events", serde_json::Value::from(events)),
            ("attempts", serde_json::Value::from(outcome.attempts)),
        ]);
        if closing {
            self.closed(outcome.result, fields);
            return;
        }
        match outcome.result {
            Ok(response) if response.success => {
                self.log(LogLevel::Debug, "monitor.delivery.ok", "Batch delivered", Some(fields));
            },
            Ok(response) => {
                let mut fields = fields;
                fields.insert("code".into(), response.code);
                fields.insert("response".into(), response.message.into());
                self.log(
                    LogLevel::Warn,
                    "monitor.delivery.rejected",
                    "Sidecar rejected the batch",
                    Some(fields),
                );
            },
            Err(error) if error.is_cancelled() => {
                self.log(
                    LogLevel::Debug,
                    "monitor.delivery.cancelled",
                    "Delivery cancelled",
                    Some(fields),
                );
            },
            Err(error) => {
                let mut fields = fields;
                fields.insert("exhausted".into(), outcome.exhausted.into());
                if let Some(logger) = self.deps.logger.as_ref() {
                    logger.failure(LogLevel::Error, "monitor.delivery.failed", &error, Some(fields));
                }
                if let Some(telemetry) = self.deps.telemetry.as_ref() {
                    let reason = if outcome.exhausted { "exhausted" } else { "rejected" };
                    let tags: TelemetryTags = [
                        (Box::from("reason"), Box::from(reason)),
                        (Box::from("code"), error.code.to_string().into_boxed_str()),
                    ]
                    .into_iter()
                    .collect();
                    telemetry.increment_counter(DELIVERY_FAILED_COUNTER, 1, Some(&tags));
                }
            },
        }
    }

    fn closed(&self, result: Result<IngestResponse>, fields: LogFields) {
        match result {
            Ok(response) => {
                let mut fields = fields;
                fields.insert("success".into(), response.success.into());
                self.log(LogLevel::Debug, "monitor.close.sent", "Close event sent", Some(fields));
            },
            Err(error) => {
                if let Some(logger) = self.deps.logger.as_ref() {
                    logger.failure(LogLevel::Info, "monitor.close.failed", &error, Some(fields));
                }
            },
        }
    }

    fn log(&self, level: LogLevel, event: &str, message: &str, fields: Option<LogFields>) {
        if let Some(logger) = self.deps.logger.as_ref() {
            logger.log(LogEvent::new(level, event, message, fields));
        }
    }
}

fn display(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivery_budget_follows_monitor_config() {
        let settings = MonitorSettings {
            config: MonitorConfig::default(),
            expected_provider: "costrict".to_owned(),
            workspace: PathBuf::from("/ws"),
        };
        let budget = settings.budget();
        assert_eq!(budget.max_retries, settings.config.max_retries);
        assert_eq!(budget.base_delay_ms, settings.config.retry_delay_ms);
        assert_eq!(budget.budget_ms, settings.config.retry_budget_ms);
        assert_eq!(settings.workspace(), "/ws");
    }
}
