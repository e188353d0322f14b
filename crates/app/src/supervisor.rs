//! Sidecar supervision: install/upgrade decision, start, health loop, stop.
//!
//! One [`Supervisor`] exists per process. Lifecycle operations (check,
//! start, stop, restart) are serialized by an async lock; the health loop
//! skips a tick instead of waiting when a lifecycle operation is running.

use crate::health::{HealthState, HealthVerdict};
use crate::resolver::VersionResolver;
use codebase_index_config::SupervisorConfig;
use codebase_index_domain::{
    ClientState, EventBatch, IgnoreCheckRequest, IndexBuildRequest, IngestResponse, Target,
    UpgradeOutcome, VersionDescriptor, VersionId, VersionInfo, VersionStatus, is_needs_provider,
    needs_provider_error,
};
use codebase_index_ports::{
    ArtifactInstallerPort, ClockPort, DownloadProgress, HostNotifierPort, IngestEndpoint,
    IngestPort, InstallOutcome, InstallRequest, LogEvent, LogFields, LogLevel, LoggerPort,
    ProcessControlPort, ProgressCallback, PromptAction, ProviderContextPort, ServiceRegistryPort,
    SpawnRequest, TelemetryPort, TelemetryTags, VersionCatalogPort, VersionStorePort, log_fields,
};
use codebase_index_shared::{
    ErrorClass, ErrorCode, ErrorEnvelope, RequestContext, Result, sleep_with_context,
    timeout_with_context,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Collaborators of the supervisor.
#[derive(Clone)]
pub struct SupervisorDeps {
    /// Release catalog.
    pub catalog: Arc<dyn VersionCatalogPort>,
    /// Downloader and verifier.
    pub installer: Arc<dyn ArtifactInstallerPort>,
    /// Install record.
    pub store: Arc<dyn VersionStorePort>,
    /// Registry written by the sidecar.
    pub registry: Arc<dyn ServiceRegistryPort>,
    /// Process table.
    pub process: Arc<dyn ProcessControlPort>,
    /// Sidecar HTTP API.
    pub ingest: Arc<dyn IngestPort>,
    /// Active provider and token.
    pub provider: Arc<dyn ProviderContextPort>,
    /// User-visible prompts.
    pub notifier: Arc<dyn HostNotifierPort>,
    /// Wall and monotonic time.
    pub clock: Arc<dyn ClockPort>,
    /// Optional logger.
    pub logger: Option<Arc<dyn LoggerPort>>,
    /// Optional telemetry sink.
    pub telemetry: Option<Arc<dyn TelemetryPort>>,
}

/// Static settings of the supervisor.
#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    /// Cadences, thresholds and the listen port.
    pub config: SupervisorConfig,
    /// Provider kind that must be active.
    pub expected_provider: String,
    /// Installed executable.
    pub binary_path: PathBuf,
    /// Catalog target.
    pub target: Target,
}

/// Serializable snapshot of the supervisor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SupervisorStatus {
    /// Lifecycle state.
    pub state: ClientState,
    /// Version on disk, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub installed_version: Option<String>,
    /// Newest version seen in the catalog.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_known_version: Option<String>,
    /// PID of the sidecar.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    /// Base URL of the indexer service.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Consecutive failed health checks.
    pub failure_count: u32,
    /// Message of the last terminal failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

#[derive(Debug)]
struct SupervisorState {
    client: ClientState,
    pid: Option<u32>,
    endpoint: Option<String>,
    installed: Option<VersionId>,
    latest: Option<VersionId>,
    health: HealthState,
    last_error: Option<ErrorEnvelope>,
}

struct HealthTask {
    ctx: RequestContext,
    handle: JoinHandle<()>,
}

enum DownloadWait {
    Settled(Option<VersionInfo>),
    TimedOut,
}

/// Owner of the sidecar process.
pub struct Supervisor {
    deps: SupervisorDeps,
    settings: SupervisorSettings,
    resolver: VersionResolver,
    state: Mutex<SupervisorState>,
    lifecycle: Mutex<()>,
    health_task: Mutex<Option<HealthTask>>,
}

fn code(namespace: &str, name: &str) -> ErrorCode {
    ErrorCode::new(namespace, name)
}

impl Supervisor {
    /// Supervisor in the `Uninstalled` state.
    pub fn new(deps: SupervisorDeps, settings: SupervisorSettings) -> Self {
        let resolver = VersionResolver::new(Arc::clone(&deps.catalog), settings.target);
        let health = HealthState::new(settings.config.max_failure_count);
        Self {
            deps,
            settings,
            resolver,
            state: Mutex::new(SupervisorState {
                client: ClientState::Uninstalled,
                pid: None,
                endpoint: None,
                installed: None,
                latest: None,
                health,
                last_error: None,
            }),
            lifecycle: Mutex::new(()),
            health_task: Mutex::new(None),
        }
    }

    /// Installed executable.
    pub fn binary_path(&self) -> &Path {
        &self.settings.binary_path
    }

    /// Fail with the needs-provider skip signal unless the expected provider is active.
    pub async fn ensure_provider(&self, ctx: &RequestContext) -> Result<()> {
        let state = self.deps.provider.provider_state(ctx).await?;
        if state.supports(&self.settings.expected_provider) {
            return Ok(());
        }
        Err(
            needs_provider_error(&state.provider_kind, &self.settings.expected_provider)
                .with_metadata("featureEnabled", state.feature_enabled.to_string()),
        )
    }

    /// Decide between first install, upgrade and no-op, and act on it.
    #[tracing::instrument(name = "supervisor.check_and_upgrade", skip_all)]
    #[allow(
        tail_expr_drop_order,
        reason = "crate is already edition 2024; migration lint only"
    )]
    pub async fn check_and_upgrade(&self, ctx: &RequestContext) -> Result<UpgradeOutcome> {
        let _lifecycle = self.lifecycle.lock().await;
        self.check_and_upgrade_locked(ctx).await
    }

    /// Start the sidecar and wait for its indexer service to register.
    #[tracing::instrument(name = "supervisor.start_client", skip_all)]
    #[allow(
        tail_expr_drop_order,
        reason = "crate is already edition 2024; migration lint only"
    )]
    pub async fn start_client(&self, ctx: &RequestContext) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        self.start_client_locked(ctx).await
    }

    /// Kill every sidecar process.
    #[tracing::instrument(name = "supervisor.stop_client", skip_all)]
    #[allow(
        tail_expr_drop_order,
        reason = "crate is already edition 2024; migration lint only"
    )]
    pub async fn stop_client(&self, ctx: &RequestContext) -> Result<usize> {
        let _lifecycle = self.lifecycle.lock().await;
        self.stop_client_locked(ctx).await
    }

    /// Stop, re-run the upgrade decision, start.
    #[tracing::instrument(name = "supervisor.restart_client", skip_all)]
    #[allow(
        tail_expr_drop_order,
        reason = "crate is already edition 2024; migration lint only"
    )]
    pub async fn restart_client(&self, ctx: &RequestContext) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        self.restart_client_locked(ctx).await
    }

    /// Snapshot for status reporting.
    pub async fn get_status(&self) -> SupervisorStatus {
        let state = self.state.lock().await;
        SupervisorStatus {
            state: state.client,
            installed_version: state.installed.map(|version| version.to_string()),
            latest_known_version: state.latest.map(|version| version.to_string()),
            pid: state.pid,
            endpoint: state.endpoint.clone(),
            failure_count: state.health.failure_count(),
            last_error: state.last_error.as_ref().map(|error| error.message.clone()),
        }
    }

    /// Current lifecycle state.
    pub async fn client_state(&self) -> ClientState {
        self.state.lock().await.client
    }

    async fn check_and_upgrade_locked(&self, ctx: &RequestContext) -> Result<UpgradeOutcome> {
        self.ensure_provider(ctx).await?;

        let mut local = self.deps.store.load(ctx).await?;
        if let Some(record) = local.clone()
            && record.status == VersionStatus::Downloading
        {
            let now = self.deps.clock.now_epoch_ms();
            if record.is_stale_download(now, self.settings.config.stale_download_ms) {
                self.log(
                    LogLevel::Warn,
                    "supervisor.install.stale_reset",
                    "Abandoned download record reset to failed",
                    Some(log_fields([
                        ("version", record.version_id.to_string()),
                        ("ageMs", record.age_ms(now).to_string()),
                    ])),
                );
                let reset = record.with_status(VersionStatus::Failed, now);
                self.deps.store.save(ctx, reset.clone()).await?;
                local = Some(reset);
            } else {
                match self.wait_for_download(ctx).await? {
                    DownloadWait::Settled(settled) => local = settled,
                    DownloadWait::TimedOut => {
                        let error = ErrorEnvelope::expected(
                            code("supervisor", "lock_timeout"),
                            "another install did not finish in time",
                        )
                        .with_metadata(
                            "timeoutMs",
                            self.settings.config.download_wait_timeout_ms.to_string(),
                        );
                        self.log_failure(LogLevel::Warn, "supervisor.install.wait_timeout", &error);
                        self.state.lock().await.last_error = Some(error);
                        return Ok(UpgradeOutcome::Failed);
                    },
                }
            }
        }

        let latest = self.resolver.get_latest_version(ctx).await?;
        self.state.lock().await.latest = Some(latest.version_id);

        let binary_present = self
            .deps
            .installer
            .artifact_exists(ctx, self.settings.binary_path.clone())
            .await?;

        let record = match local {
            Some(record) if binary_present => record,
            _ => return self.install(ctx, &latest, UpgradeOutcome::FirstInstall).await,
        };

        if VersionResolver::should_update(&record, &latest) {
            self.log(
                LogLevel::Info,
                "supervisor.upgrade.started",
                "Replacing the installed sidecar",
                Some(log_fields([
                    ("from", record.version_id.to_string()),
                    ("to", latest.version_id.to_string()),
                    ("status", record.status.to_string()),
                ])),
            );
            self.terminate(ctx).await?;
            return self.install(ctx, &latest, UpgradeOutcome::Upgraded).await;
        }

        let mut state = self.state.lock().await;
        state.installed = Some(record.version_id);
        if matches!(state.client, ClientState::Uninstalled | ClientState::Failed) {
            state.client = ClientState::Installed;
        }
        drop(state);
        self.log(
            LogLevel::Debug,
            "supervisor.upgrade.current",
            "Installed sidecar is current",
            Some(log_fields([("version", record.version_id.to_string())])),
        );
        Ok(UpgradeOutcome::NoUpdate)
    }

    async fn wait_for_download(&self, ctx: &RequestContext) -> Result<DownloadWait> {
        let config = &self.settings.config;
        let poll = Duration::from_millis(config.download_wait_poll_ms.max(1));
        let started = self.deps.clock.monotonic_ms();
        self.log(
            LogLevel::Info,
            "supervisor.install.waiting",
            "Waiting for another install to finish",
            None,
        );
        loop {
            sleep_with_context(ctx, poll, "supervisor.wait_for_download").await?;
            match self.deps.store.load(ctx).await? {
                Some(record) if record.status == VersionStatus::Downloading => {},
                settled => return Ok(DownloadWait::Settled(settled)),
            }
            let waited = self.deps.clock.monotonic_ms().saturating_sub(started);
            if waited >= config.download_wait_timeout_ms {
                return Ok(DownloadWait::TimedOut);
            }
        }
    }

    async fn install(
        &self,
        ctx: &RequestContext,
        latest: &VersionDescriptor,
        on_success: UpgradeOutcome,
    ) -> Result<UpgradeOutcome> {
        let _advisory = match self.deps.store.try_lock(ctx).await {
            Ok(Some(lock)) => Some(lock),
            Ok(None) => {
                self.log(
                    LogLevel::Warn,
                    "supervisor.install.lock_busy",
                    "Install lock held elsewhere; continuing",
                    None,
                );
                None
            },
            Err(error) if error.is_cancelled() => return Err(error),
            Err(error) => {
                self.log_failure(LogLevel::Warn, "supervisor.install.lock_failed", &error);
                None
            },
        };

        self.set_state(ClientState::Installing).await;
        let package = match self.deps.catalog.fetch_package_info(ctx, latest.clone()).await {
            Ok(package) => package,
            Err(error) if error.is_cancelled() => return Err(error),
            Err(error) => {
                let record = VersionInfo::from_descriptor(
                    latest,
                    None,
                    VersionStatus::Failed,
                    self.deps.clock.now_epoch_ms(),
                );
                return self.install_failed(ctx, record, error).await;
            },
        };

        let record = VersionInfo::from_descriptor(
            latest,
            Some(package.clone()),
            VersionStatus::Downloading,
            self.deps.clock.now_epoch_ms(),
        );
        self.deps.store.save(ctx, record.clone()).await?;
        self.log(
            LogLevel::Info,
            "supervisor.install.started",
            "Downloading sidecar",
            Some(log_fields([
                ("version", latest.version_id.to_string()),
                ("size", package.size.to_string()),
            ])),
        );

        let request = InstallRequest {
            target_path: self.settings.binary_path.clone(),
            descriptor: latest.clone(),
            package: package.clone(),
        };
        let progress = self.progress_callback(latest.version_id);
        match self
            .deps
            .installer
            .download_and_install(ctx, request, progress)
            .await
        {
            Ok(InstallOutcome::Installed) => {
                let done = record.with_status(VersionStatus::Downloaded, self.deps.clock.now_epoch_ms());
                self.deps.store.save(ctx, done).await?;
                if let Err(error) = self.deps.store.save_package_snapshot(ctx, package).await {
                    self.log_failure(LogLevel::Warn, "supervisor.install.snapshot_failed", &error);
                }
                let mut state = self.state.lock().await;
                state.installed = Some(latest.version_id);
                state.client = ClientState::Installed;
                state.last_error = None;
                drop(state);
                self.count("supervisor.install.completed", &[("outcome", on_success.to_string())]);
                self.log(
                    LogLevel::Info,
                    "supervisor.install.completed",
                    "Sidecar installed",
                    Some(log_fields([
                        ("version", latest.version_id.to_string()),
                        ("outcome", on_success.to_string()),
                    ])),
                );
                Ok(on_success)
            },
            Ok(InstallOutcome::Cancelled) => {
                // The request context is cancelled; persist with a detached one.
                let detached = RequestContext::new_request();
                let failed = record.with_status(VersionStatus::Failed, self.deps.clock.now_epoch_ms());
                self.deps.store.save(&detached, failed).await?;
                self.set_state(ClientState::Uninstalled).await;
                self.log(
                    LogLevel::Info,
                    "supervisor.install.cancelled",
                    "Sidecar download cancelled",
                    None,
                );
                Ok(UpgradeOutcome::Failed)
            },
            Err(error) => {
                let failed = record.with_status(VersionStatus::Failed, self.deps.clock.now_epoch_ms());
                self.install_failed(ctx, failed, error).await
            },
        }
    }

    async fn install_failed(
        &self,
        ctx: &RequestContext,
        record: VersionInfo,
        error: ErrorEnvelope,
    ) -> Result<UpgradeOutcome> {
        let version = record.version_id.to_string();
        if let Err(save_error) = self.deps.store.save(ctx, record).await {
            self.log_failure(LogLevel::Warn, "supervisor.install.record_failed", &save_error);
        }
        self.log_failure(LogLevel::Error, "supervisor.install.failed", &error);
        self.count("supervisor.install.failed", &[("code", error.code.to_string())]);
        let mut state = self.state.lock().await;
        state.client = ClientState::Failed;
        state.last_error = Some(error.with_metadata("version", version));
        Ok(UpgradeOutcome::Failed)
    }

    fn progress_callback(&self, version: VersionId) -> Option<ProgressCallback> {
        let logger = self.deps.logger.clone()?;
        let reported = Arc::new(AtomicU8::new(0));
        Some(Arc::new(move |progress: DownloadProgress| {
            let step = progress.percent / 25 * 25;
            if step > reported.fetch_max(step, Ordering::Relaxed) {
                logger.debug(
                    "supervisor.install.progress",
                    "Download progress",
                    Some(log_fields([
                        ("version", serde_json::Value::from(version.to_string())),
                        ("percent", serde_json::Value::from(progress.percent)),
                        ("downloaded", serde_json::Value::from(progress.downloaded)),
                        ("total", serde_json::Value::from(progress.total)),
                    ])),
                );
            }
        }))
    }

    async fn start_client_locked(&self, ctx: &RequestContext) -> Result<()> {
        self.ensure_provider(ctx).await?;
        let config = &self.settings.config;
        let attempts = config.start_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            self.set_state(ClientState::Starting).await;
            match self.start_attempt(ctx).await {
                Ok(pid) => {
                    self.state.lock().await.pid = Some(pid);
                    self.log(
                        LogLevel::Info,
                        "supervisor.start.running",
                        "Sidecar process is running",
                        Some(log_fields([
                            ("pid", pid.to_string()),
                            ("attempt", attempt.to_string()),
                        ])),
                    );
                    return self.init_sub_service(ctx).await;
                },
                Err(error) if error.is_cancelled() => return Err(error),
                Err(error) => {
                    self.log_failure(LogLevel::Warn, "supervisor.start.attempt_failed", &error);
                    last_error = Some(error);
                    if attempt < attempts {
                        let backoff = config.start_backoff_ms.saturating_mul(u64::from(attempt));
                        sleep_with_context(ctx, Duration::from_millis(backoff), "supervisor.start")
                            .await?;
                    }
                },
            }
        }

        let mut error = ErrorEnvelope::unexpected(
            code("supervisor", "start_failed"),
            format!("codebase indexer failed to start after {attempts} attempts"),
            ErrorClass::NonRetriable,
        )
        .with_metadata("attempts", attempts.to_string());
        if let Some(cause) = last_error {
            error = error
                .with_metadata("causeCode", cause.code.to_string())
                .with_metadata("cause", cause.message);
        }
        self.log_failure(LogLevel::Error, "supervisor.start.failed", &error);
        self.count("supervisor.start.failed", &[]);
        {
            let mut state = self.state.lock().await;
            state.client = ClientState::Failed;
            state.pid = None;
            state.last_error = Some(error.clone());
        }
        self.deps.notifier.prompt(&error.message, PromptAction::Retry);
        Err(error)
    }

    async fn start_attempt(&self, ctx: &RequestContext) -> Result<u32> {
        let path = self.settings.binary_path.clone();
        let package = self
            .deps
            .store
            .load(ctx)
            .await?
            .and_then(|record| record.package_info)
            .ok_or_else(|| {
                ErrorEnvelope::expected(
                    code("artifact", "missing_package_info"),
                    "install record has no package metadata",
                )
            })?;

        if !self.deps.installer.artifact_exists(ctx, path.clone()).await? {
            return Err(ErrorEnvelope::expected(
                code("artifact", "binary_missing"),
                "sidecar executable is missing",
            )
            .with_metadata("path", path.display().to_string()));
        }
        if !self
            .deps
            .installer
            .verify_installed(ctx, path.clone(), package)
            .await?
        {
            return Err(ErrorEnvelope::expected(
                code("artifact", "checksum_mismatch"),
                "installed sidecar does not match its package checksum",
            )
            .with_metadata("path", path.display().to_string()));
        }

        let running = self.deps.process.find_running(ctx, path.clone()).await?;
        let spawned = match running.first() {
            Some(pid) => {
                self.log(
                    LogLevel::Info,
                    "supervisor.start.reused",
                    "Sidecar already running",
                    Some(log_fields([("pid", pid.to_string())])),
                );
                *pid
            },
            None => {
                let request = SpawnRequest {
                    program: path.clone(),
                    args: vec![
                        "server".to_owned(),
                        "--listen".to_owned(),
                        format!("localhost:{}", self.settings.config.listen_port),
                    ],
                };
                self.deps.process.spawn_detached(ctx, request).await?
            },
        };
        self.wait_until_running(ctx, spawned).await
    }

    async fn wait_until_running(&self, ctx: &RequestContext, spawned: u32) -> Result<u32> {
        let config = &self.settings.config;
        let path = self.settings.binary_path.clone();
        for poll in 0..config.running_poll_attempts.max(1) {
            if poll > 0 {
                sleep_with_context(
                    ctx,
                    Duration::from_millis(config.running_poll_ms),
                    "supervisor.wait_until_running",
                )
                .await?;
            }
            let running = self.deps.process.find_running(ctx, path.clone()).await?;
            if running.contains(&spawned) {
                return Ok(spawned);
            }
            if let Some(pid) = running.first() {
                return Ok(*pid);
            }
        }
        Err(ErrorEnvelope::unexpected(
            code("process", "not_running"),
            "sidecar exited right after spawning",
            ErrorClass::Retriable,
        )
        .with_metadata("pid", spawned.to_string()))
    }

    /// Poll the registry until the indexer service reports `running`.
    ///
    /// Unbounded in time; only cancellation ends it early.
    async fn init_sub_service(&self, ctx: &RequestContext) -> Result<()> {
        let config = &self.settings.config;
        let started = self.deps.clock.monotonic_ms();
        loop {
            match self
                .deps
                .registry
                .get_service_config(ctx, &config.service_name)
                .await
            {
                Ok(Some(entry)) if entry.is_running() => {
                    let endpoint = entry.endpoint();
                    let mut state = self.state.lock().await;
                    state.endpoint = Some(endpoint.clone());
                    state.client = ClientState::Running;
                    state.health.reset();
                    state.last_error = None;
                    drop(state);
                    self.log(
                        LogLevel::Info,
                        "supervisor.service.ready",
                        "Indexer service registered",
                        Some(log_fields([("endpoint", endpoint)])),
                    );
                    return Ok(());
                },
                Ok(_) => {},
                Err(error) if error.is_cancelled() => return Err(error),
                Err(error) => {
                    self.log_failure(LogLevel::Debug, "supervisor.service.registry_unreadable", &error);
                },
            }

            let elapsed = self.deps.clock.monotonic_ms().saturating_sub(started);
            let interval = if elapsed < config.registry_fast_window_ms {
                config.registry_poll_fast_ms
            } else {
                config.registry_poll_slow_ms
            };
            sleep_with_context(ctx, Duration::from_millis(interval), "supervisor.init_sub_service")
                .await?;
        }
    }

    async fn stop_client_locked(&self, ctx: &RequestContext) -> Result<usize> {
        let killed = self.terminate(ctx).await?;
        let mut state = self.state.lock().await;
        state.pid = None;
        state.endpoint = None;
        state.client = if state.installed.is_some() {
            ClientState::Installed
        } else {
            ClientState::Uninstalled
        };
        Ok(killed)
    }

    async fn terminate(&self, ctx: &RequestContext) -> Result<usize> {
        let killed = self
            .deps
            .process
            .terminate_all(ctx, self.settings.binary_path.clone())
            .await?;
        self.log(
            LogLevel::Info,
            "supervisor.stop",
            "Sidecar processes terminated",
            Some(log_fields([("count", killed.to_string())])),
        );
        Ok(killed)
    }

    async fn restart_client_locked(&self, ctx: &RequestContext) -> Result<()> {
        self.set_state(ClientState::Restarting).await;
        self.log(LogLevel::Info, "supervisor.restart", "Restarting sidecar", None);
        self.stop_client_locked(ctx).await?;

        let failure = match self.check_and_upgrade_locked(ctx).await {
            Ok(outcome) if outcome.is_installed() => None,
            Ok(_) => Some(ErrorEnvelope::unexpected(
                code("supervisor", "install_failed"),
                "codebase indexer could not be installed",
                ErrorClass::NonRetriable,
            )),
            Err(error) if error.is_cancelled() || is_needs_provider(&error) => return Err(error),
            Err(error) => Some(error),
        };
        if let Some(error) = failure {
            {
                let mut state = self.state.lock().await;
                state.client = ClientState::Failed;
                state.last_error = Some(error.clone());
            }
            self.deps.notifier.prompt(&error.message, PromptAction::Reinstall);
            return Err(error);
        }
        self.start_client_locked(ctx).await
    }

    /// Start the periodic health check, replacing a previous one.
    pub async fn start_health_check(self: &Arc<Self>, ctx: &RequestContext) {
        let mut slot = self.health_task.lock().await;
        if let Some(previous) = slot.take() {
            previous.ctx.cancel();
            previous.handle.abort();
        }

        let loop_ctx = ctx.child();
        let task_ctx = loop_ctx.clone();
        let supervisor = Arc::clone(self);
        let interval = Duration::from_millis(self.settings.config.health_interval_ms.max(1));
        let handle = tokio::spawn(async move {
            loop {
                if sleep_with_context(&task_ctx, interval, "supervisor.health_check")
                    .await
                    .is_err()
                {
                    break;
                }
                supervisor.run_health_check(&task_ctx).await;
            }
        });
        *slot = Some(HealthTask {
            ctx: loop_ctx,
            handle,
        });
    }

    /// Cancel the health loop; safe to call repeatedly.
    pub async fn teardown(&self) {
        if let Some(task) = self.health_task.lock().await.take() {
            task.ctx.cancel();
            task.handle.abort();
        }
    }

    /// One health tick: liveness by PID plus an HTTP probe.
    ///
    /// Returns `None` when a lifecycle operation is in progress and the tick
    /// was skipped.
    pub async fn run_health_check(&self, ctx: &RequestContext) -> Option<HealthVerdict> {
        let Ok(_lifecycle) = self.lifecycle.try_lock() else {
            self.log(
                LogLevel::Debug,
                "supervisor.health.skipped",
                "Lifecycle operation in progress",
                None,
            );
            return None;
        };

        let healthy = self.probe(ctx).await;
        if ctx.is_cancelled() {
            return None;
        }

        let (verdict, failures) = {
            let mut state = self.state.lock().await;
            let verdict = state.health.record(healthy);
            match verdict {
                HealthVerdict::Healthy if state.client == ClientState::Degraded => {
                    state.client = ClientState::Running;
                },
                HealthVerdict::Degraded if state.client == ClientState::Running => {
                    state.client = ClientState::Degraded;
                },
                _ => {},
            }
            (verdict, state.health.failure_count())
        };

        match verdict {
            HealthVerdict::Healthy => {
                self.log(LogLevel::Debug, "supervisor.health.ok", "Sidecar healthy", None);
            },
            HealthVerdict::Degraded => {
                self.log(
                    LogLevel::Warn,
                    "supervisor.health.failed",
                    "Sidecar health check failed",
                    Some(log_fields([("failures", failures.to_string())])),
                );
            },
            HealthVerdict::RestartRequired => {
                self.log(
                    LogLevel::Warn,
                    "supervisor.health.restart",
                    "Health check failures exceeded the threshold",
                    Some(log_fields([("failures", failures.to_string())])),
                );
                self.count("supervisor.restarts", &[]);
                let restarted = self.restart_client_locked(ctx).await;
                self.state.lock().await.health.reset();
                if let Err(error) = restarted
                    && !error.is_cancelled()
                {
                    self.log_failure(LogLevel::Error, "supervisor.health.restart_failed", &error);
                }
            },
        }
        Some(verdict)
    }

    async fn probe(&self, ctx: &RequestContext) -> bool {
        let known_pid = self.state.lock().await.pid;
        let mut alive = match known_pid {
            Some(pid) => self.deps.process.is_alive(ctx, pid).await.unwrap_or(false),
            None => false,
        };
        if !alive
            && let Ok(pids) = self
                .deps
                .process
                .find_running(ctx, self.settings.binary_path.clone())
                .await
            && let Some(pid) = pids.first()
        {
            self.state.lock().await.pid = Some(*pid);
            alive = true;
        }
        if !alive {
            return false;
        }

        let base_url = self
            .state
            .lock()
            .await
            .endpoint
            .clone()
            .unwrap_or_else(|| format!("http://localhost:{}", self.settings.config.listen_port));
        let timeout = Duration::from_millis(self.settings.config.health_timeout_ms);
        timeout_with_context(
            ctx,
            timeout,
            "supervisor.health_probe",
            self.deps.ingest.probe_health(ctx, base_url),
        )
        .await
        .is_ok()
    }

    async fn endpoint(&self, ctx: &RequestContext) -> Result<IngestEndpoint> {
        let base_url = self.state.lock().await.endpoint.clone().ok_or_else(|| {
            ErrorEnvelope::unexpected(
                code("supervisor", "endpoint_unavailable"),
                "indexer service is not registered yet",
                ErrorClass::Retriable,
            )
        })?;
        let token = self.deps.provider.bearer_token(ctx).await?;
        Ok(IngestEndpoint { base_url, token })
    }

    /// Deliver one event batch to the running sidecar.
    pub async fn publish_events(
        &self,
        ctx: &RequestContext,
        batch: EventBatch,
    ) -> Result<IngestResponse> {
        let endpoint = self.endpoint(ctx).await?;
        self.deps.ingest.publish_events(ctx, endpoint, batch).await
    }

    /// Ask the sidecar to (re)build an index.
    pub async fn trigger_index_build(
        &self,
        ctx: &RequestContext,
        request: IndexBuildRequest,
    ) -> Result<IngestResponse> {
        let endpoint = self.endpoint(ctx).await?;
        self.deps.ingest.trigger_index_build(ctx, endpoint, request).await
    }

    /// Ask the sidecar which paths its ignore rules exclude.
    pub async fn check_ignore_files(
        &self,
        ctx: &RequestContext,
        request: IgnoreCheckRequest,
    ) -> Result<IngestResponse> {
        let endpoint = self.endpoint(ctx).await?;
        self.deps.ingest.check_ignore_files(ctx, endpoint, request).await
    }

    /// Index progress for `workspace`.
    pub async fn index_status(&self, ctx: &RequestContext, workspace: String) -> Result<IngestResponse> {
        let endpoint = self.endpoint(ctx).await?;
        self.deps.ingest.index_status(ctx, endpoint, workspace).await
    }

    /// Turn indexing of `workspace` on or off.
    pub async fn toggle_index(
        &self,
        ctx: &RequestContext,
        workspace: String,
        enabled: bool,
    ) -> Result<IngestResponse> {
        let endpoint = self.endpoint(ctx).await?;
        self.deps
            .ingest
            .toggle_index(ctx, endpoint, workspace, enabled)
            .await
    }

    async fn set_state(&self, next: ClientState) {
        let previous = {
            let mut state = self.state.lock().await;
            std::mem::replace(&mut state.client, next)
        };
        if previous != next {
            self.log(
                LogLevel::Debug,
                "supervisor.state",
                "Client state changed",
                Some(log_fields([("from", previous.as_str()), ("to", next.as_str())])),
            );
        }
    }

    fn log(&self, level: LogLevel, event: &str, message: &str, fields: Option<LogFields>) {
        if let Some(logger) = self.deps.logger.as_ref() {
            logger.log(LogEvent::new(level, event, message, fields));
        }
    }

    fn log_failure(&self, level: LogLevel, event: &str, error: &ErrorEnvelope) {
        if let Some(logger) = self.deps.logger.as_ref() {
            logger.failure(level, event, error, None);
        }
    }

    fn count(&self, name: &str, tags: &[(&str, String)]) {
        if let Some(telemetry) = self.deps.telemetry.as_ref() {
            let tags: TelemetryTags = tags
                .iter()
                .map(|(key, value)| (Box::from(*key), value.clone().into_boxed_str()))
                .collect();
            telemetry.increment_counter(name, 1, Some(&tags));
        }
    }
}
