//! Composition root: one supervisor and one event monitor per workspace root.

use crate::InfraResult;
use crate::routing::WatchRouter;
use crate::wiring::{RuntimeParts, monitor_settings, supervisor_settings};
use codebase_index_app::{EventMonitor, EventPublisher, MonitorDeps, Supervisor, SupervisorStatus};
use codebase_index_config::{ValidatedIndexerConfig, apply_partial_json};
use codebase_index_domain::is_needs_provider;
use codebase_index_ports::{
    FileWatcherPort, IgnoreGatePort, LogEvent, LogLevel, LoggerPort, WatchSubscription, log_fields,
};
use codebase_index_shared::{ErrorEnvelope, RequestContext};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Status reported to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeStatus {
    /// Supervisor snapshot.
    #[serde(flatten)]
    pub supervisor: SupervisorStatus,
    /// Whether workspace events are relayed.
    pub monitor_enabled: bool,
    /// Events waiting for the next flush.
    pub buffered_events: usize,
    /// Watched workspace root.
    pub workspace: String,
}

struct ActiveWatch {
    _subscription: WatchSubscription,
    router: JoinHandle<()>,
}

/// The host-facing surface: initialize, dispose, update config, report status.
///
/// Must be created inside a tokio runtime; the event monitor spawns its
/// delivery worker on construction.
pub struct IndexerRuntime {
    ctx: RequestContext,
    workspace: PathBuf,
    config: Mutex<ValidatedIndexerConfig>,
    supervisor: Arc<Supervisor>,
    monitor: EventMonitor,
    gate: Arc<dyn IgnoreGatePort>,
    watcher: Arc<dyn FileWatcherPort>,
    watch: Mutex<Option<ActiveWatch>>,
    bring_up: Mutex<Option<JoinHandle<()>>>,
    logger: Option<Arc<dyn LoggerPort>>,
    disposed: AtomicBool,
}

impl IndexerRuntime {
    /// Wire a runtime for `workspace` from prepared collaborators.
    pub fn new(
        ctx: &RequestContext,
        config: ValidatedIndexerConfig,
        workspace: &Path,
        parts: RuntimeParts,
    ) -> InfraResult<Self> {
        let RuntimeParts {
            supervisor: deps,
            gate,
            watcher,
        } = parts;
        let ctx = ctx.child();
        let logger = deps.logger.clone();
        let provider = Arc::clone(&deps.provider);
        let clock = Arc::clone(&deps.clock);
        let telemetry = deps.telemetry.clone();
        let supervisor = Arc::new(Supervisor::new(deps, supervisor_settings(&config)?));
        let publisher: Arc<dyn EventPublisher> = supervisor.clone();
        let monitor = EventMonitor::new(
            &ctx,
            MonitorDeps {
                publisher,
                gate: Arc::clone(&gate),
                provider,
                clock,
                logger: logger.clone(),
                telemetry,
            },
            monitor_settings(&config, workspace),
        );
        Ok(Self {
            ctx,
            workspace: workspace.to_path_buf(),
            config: Mutex::new(config),
            supervisor,
            monitor,
            gate,
            watcher,
            watch: Mutex::new(None),
            bring_up: Mutex::new(None),
            logger,
            disposed: AtomicBool::new(false),
        })
    }

    /// Load ignore rules, start watching the workspace, then bring the
    /// sidecar up in the background.
    ///
    /// Returns once the watch is live; the sidecar may still be starting.
    /// Sidecar failures are logged and leave the pipeline running; a watch
    /// that cannot start is an error.
    #[tracing::instrument(name = "runtime.initialize", skip_all)]
    pub async fn initialize(&self) -> InfraResult<()> {
        if let Err(error) = self.gate.reload(&self.ctx).await {
            self.failure(LogLevel::Warn, "runtime.rules.load_failed", &error);
        }
        self.start_watch().await?;
        self.spawn_bring_up().await;
        self.log(
            LogLevel::Info,
            "runtime.initialized",
            "Runtime initialized",
            &[("workspace", self.workspace.display().to_string())],
        );
        Ok(())
    }

    /// Stop watching and any pending bring-up, send pending events with
    /// `close_workspace`, stop the health loop.
    ///
    /// The sidecar process keeps running. Only the first call has an effect.
    #[tracing::instrument(name = "runtime.dispose", skip_all)]
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(active) = self.watch.lock().await.take() {
            active.router.abort();
        }
        if let Some(bring_up) = self.bring_up.lock().await.take()
            && !bring_up.is_finished()
        {
            bring_up.abort();
            self.log(
                LogLevel::Info,
                "runtime.sidecar.abandoned",
                "Sidecar bring-up stopped before it finished",
                &[],
            );
        }
        self.monitor.handle_close(&self.ctx).await;
        self.supervisor.teardown().await;
        self.ctx.cancel();
        self.log(LogLevel::Info, "runtime.disposed", "Runtime disposed", &[]);
    }

    /// Apply a partial JSON config over the current one.
    ///
    /// Monitor settings apply to subsequent events; supervisor settings apply
    /// to the next runtime.
    pub async fn update_config(&self, partial_json: &str) -> InfraResult<()> {
        let mut current = self.config.lock().await;
        let updated = apply_partial_json(&current, partial_json)?;
        self.monitor
            .update_settings(monitor_settings(&updated, &self.workspace))
            .await;
        if updated.supervisor != current.supervisor {
            self.log(
                LogLevel::Info,
                "runtime.config.supervisor_deferred",
                "Supervisor settings take effect on the next start",
                &[],
            );
        }
        *current = updated;
        self.log(LogLevel::Info, "runtime.config.updated", "Config updated", &[]);
        Ok(())
    }

    /// Supervisor snapshot plus pipeline counters.
    pub async fn get_status(&self) -> RuntimeStatus {
        RuntimeStatus {
            supervisor: self.supervisor.get_status().await,
            monitor_enabled: self.monitor.monitor_enabled().await,
            buffered_events: self.monitor.buffered_events().await,
            workspace: self.workspace.display().to_string(),
        }
    }

    /// Effective config.
    pub async fn config(&self) -> ValidatedIndexerConfig {
        self.config.lock().await.clone()
    }

    /// The sidecar supervisor.
    pub const fn supervisor(&self) -> &Arc<Supervisor> {
        &self.supervisor
    }

    /// The event pipeline, for hosts that deliver editor callbacks directly.
    pub const fn monitor(&self) -> &EventMonitor {
        &self.monitor
    }

    /// Root context; cancelled by [`Self::dispose`].
    pub const fn context(&self) -> &RequestContext {
        &self.ctx
    }

    async fn spawn_bring_up(&self) {
        let mut slot = self.bring_up.lock().await;
        if slot.is_some() {
            return;
        }
        let bring_up = SidecarBringUp {
            supervisor: Arc::clone(&self.supervisor),
            logger: self.logger.clone(),
            ctx: self.ctx.clone(),
        };
        *slot = Some(tokio::spawn(bring_up.run()));
    }

    async fn start_watch(&self) -> InfraResult<()> {
        let mut slot = self.watch.lock().await;
        if slot.is_some() {
            return Ok(());
        }
        let router = WatchRouter::new(
            self.monitor.clone(),
            Arc::clone(&self.gate),
            self.logger.clone(),
        );
        let (callback, handle) = router.spawn(&self.ctx);
        let subscription = match self.watcher.watch(&self.workspace, callback) {
            Ok(subscription) => subscription,
            Err(error) => {
                handle.abort();
                return Err(error);
            },
        };
        *slot = Some(ActiveWatch {
            _subscription: subscription,
            router: handle,
        });
        Ok(())
    }

    fn log(&self, level: LogLevel, event: &str, message: &str, fields: &[(&str, String)]) {
        log_to(self.logger.as_ref(), level, event, message, fields);
    }

    fn failure(&self, level: LogLevel, event: &str, error: &ErrorEnvelope) {
        failure_to(self.logger.as_ref(), level, event, error);
    }
}

/// Install check, start and health loop, run off the `initialize` path.
///
/// The registry wait inside `start_client` has no deadline, so this task is
/// only ended by success, a start failure, or `dispose`.
struct SidecarBringUp {
    supervisor: Arc<Supervisor>,
    logger: Option<Arc<dyn LoggerPort>>,
    ctx: RequestContext,
}

impl SidecarBringUp {
    #[tracing::instrument(name = "runtime.sidecar", skip_all)]
    async fn run(self) {
        let logger = self.logger.as_ref();
        match self.supervisor.check_and_upgrade(&self.ctx).await {
            Ok(outcome) if outcome.is_installed() => {},
            Ok(outcome) => {
                log_to(
                    logger,
                    LogLevel::Warn,
                    "runtime.sidecar.not_installed",
                    "Sidecar is not installed",
                    &[("outcome", outcome.to_string())],
                );
                return;
            },
            Err(error) if is_needs_provider(&error) => {
                failure_to(logger, LogLevel::Debug, "runtime.sidecar.skipped", &error);
                return;
            },
            Err(error) if error.is_cancelled() => return,
            Err(error) => {
                failure_to(logger, LogLevel::Warn, "runtime.sidecar.install_failed", &error);
                return;
            },
        }
        match self.supervisor.start_client(&self.ctx).await {
            Ok(()) => self.supervisor.start_health_check(&self.ctx).await,
            Err(error) if error.is_cancelled() => {},
            Err(error) => {
                failure_to(logger, LogLevel::Warn, "runtime.sidecar.start_failed", &error);
            },
        }
    }
}

fn log_to(
    logger: Option<&Arc<dyn LoggerPort>>,
    level: LogLevel,
    event: &str,
    message: &str,
    fields: &[(&str, String)],
) {
    let Some(logger) = logger else {
        return;
    };
    let fields = (!fields.is_empty())
        .then(|| log_fields(fields.iter().map(|(key, value)| (*key, value.clone()))));
    logger.log(LogEvent::new(level, event, message, fields));
}

fn failure_to(
    logger: Option<&Arc<dyn LoggerPort>>,
    level: LogLevel,
    event: &str,
    error: &ErrorEnvelope,
) {
    if let Some(logger) = logger {
        logger.failure(level, event, error, None);
    }
}
