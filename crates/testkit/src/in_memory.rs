//! In-memory adapter implementations for port contracts.
//!
//! These implementations are intended for:
//! - Unit/integration tests of the supervisor and the event monitor
//! - Scripting failures (download errors, dead processes, failing probes)
//! - Paused-time tests, since every sleep goes through tokio

use codebase_index_domain::{
    EventBatch, IgnoreCheckRequest, IndexBuildRequest, IngestResponse, PackageInfo, ProviderState,
    ServiceRegistryEntry, VersionDescriptor, VersionId, VersionInfo, VersionList,
};
use codebase_index_ports::{
    ArtifactInstallerPort, BoxFuture, ClockPort, FileWatcherPort, HostNotifierPort,
    IgnoreGatePort, IngestEndpoint, IngestPort, InstallLock, InstallOutcome, InstallRequest,
    LogEvent, LogFields, LogLevel, LoggerPort, ProcessControlPort, ProgressCallback, PromptAction,
    ProviderContextPort, ServiceRegistryPort, SpawnRequest, TelemetryPort, TelemetryTags,
    VersionCatalogPort, VersionStorePort, WatchCallback, WatchEvent, WatchSubscription,
};
use codebase_index_shared::{
    ErrorClass, ErrorCode, ErrorEnvelope, RequestContext, Result, SecretString,
};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A no-op logger implementation.
#[derive(Debug, Default)]
pub struct NoopLogger;

impl LoggerPort for NoopLogger {
    fn log(&self, _event: LogEvent) {}

    fn child(&self, _fields: LogFields) -> Box<dyn LoggerPort> {
        Box::new(Self)
    }
}

/// Logger keeping every event; children share the same record.
#[derive(Debug, Default, Clone)]
pub struct RecordingLogger {
    events: Arc<Mutex<Vec<LogEvent>>>,
}

impl RecordingLogger {
    /// Snapshot of recorded events.
    pub fn events(&self) -> Vec<LogEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Levels at which `event` was logged, in order.
    pub fn levels_of(&self, event: &str) -> Vec<LogLevel> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|recorded| &*recorded.event == event)
            .map(|recorded| recorded.level)
            .collect()
    }

    /// True if `event` was logged at any level.
    pub fn has_event(&self, event: &str) -> bool {
        !self.levels_of(event).is_empty()
    }

    /// Highest level recorded overall.
    pub fn max_level(&self) -> Option<LogLevel> {
        self.events.lock().unwrap().iter().map(|event| event.level).max()
    }
}

impl LoggerPort for RecordingLogger {
    fn log(&self, event: LogEvent) {
        self.events.lock().unwrap().push(event);
    }

    fn child(&self, _fields: LogFields) -> Box<dyn LoggerPort> {
        Box::new(self.clone())
    }
}

/// A no-op telemetry implementation.
#[derive(Debug, Default)]
pub struct NoopTelemetry;

impl TelemetryPort for NoopTelemetry {
    fn increment_counter(&self, _name: &str, _value: u64, _tags: Option<&TelemetryTags>) {}

    fn record_timer_ms(&self, _name: &str, _duration_ms: u64, _tags: Option<&TelemetryTags>) {}
}

/// Telemetry keeping counter increments.
#[derive(Debug, Default)]
pub struct RecordingTelemetry {
    counters: Mutex<Vec<(String, u64, TelemetryTags)>>,
}

impl RecordingTelemetry {
    /// Sum of increments recorded for `name`.
    pub fn counter(&self, name: &str) -> u64 {
        self.counters
            .lock()
            .unwrap()
            .iter()
            .filter(|(counter, _, _)| counter == name)
            .map(|(_, value, _)| value)
            .sum()
    }

    /// Tags of the last increment of `name`.
    pub fn last_tags(&self, name: &str) -> Option<TelemetryTags> {
        self.counters
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(counter, _, _)| counter == name)
            .map(|(_, _, tags)| tags.clone())
    }
}

impl TelemetryPort for RecordingTelemetry {
    fn increment_counter(&self, name: &str, value: u64, tags: Option<&TelemetryTags>) {
        self.counters.lock().unwrap().push((
            name.to_owned(),
            value,
            tags.cloned().unwrap_or_default(),
        ));
    }

    fn record_timer_ms(&self, _name: &str, _duration_ms: u64, _tags: Option<&TelemetryTags>) {}
}

/// Catalog serving one newest version and its package metadata.
#[derive(Debug)]
pub struct FakeCatalog {
    newest: Mutex<VersionDescriptor>,
    packages: Mutex<HashMap<VersionId, PackageInfo>>,
    failure: Mutex<Option<ErrorEnvelope>>,
    list_calls: AtomicUsize,
}

impl FakeCatalog {
    /// Catalog whose newest release is `descriptor`.
    pub fn new(descriptor: VersionDescriptor, package: PackageInfo) -> Self {
        let catalog = Self {
            newest: Mutex::new(descriptor.clone()),
            packages: Mutex::new(HashMap::new()),
            failure: Mutex::new(None),
            list_calls: AtomicUsize::new(0),
        };
        catalog.publish(descriptor, package);
        catalog
    }

    /// Publish a newer release.
    pub fn publish(&self, descriptor: VersionDescriptor, package: PackageInfo) {
        self.packages
            .lock()
            .unwrap()
            .insert(descriptor.version_id, package);
        *self.newest.lock().unwrap() = descriptor;
    }

    /// Fail every call with `error` until cleared.
    pub fn fail_with(&self, error: Option<ErrorEnvelope>) {
        *self.failure.lock().unwrap() = error;
    }

    /// Number of version list fetches.
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

impl VersionCatalogPort for FakeCatalog {
    fn fetch_version_list(
        &self,
        ctx: &RequestContext,
        _target: codebase_index_domain::Target,
    ) -> BoxFuture<'_, Result<VersionList>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("fake_catalog.fetch_version_list")?;
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(error) = self.failure.lock().unwrap().clone() {
                return Err(error);
            }
            let newest = self.newest.lock().unwrap().clone();
            Ok(VersionList {
                versions: vec![newest.clone()],
                newest,
            })
        })
    }

    fn fetch_package_info(
        &self,
        ctx: &RequestContext,
        descriptor: VersionDescriptor,
    ) -> BoxFuture<'_, Result<PackageInfo>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("fake_catalog.fetch_package_info")?;
            if let Some(error) = self.failure.lock().unwrap().clone() {
                return Err(error);
            }
            self.packages
                .lock()
                .unwrap()
                .get(&descriptor.version_id)
                .cloned()
                .ok_or_else(|| {
                    ErrorEnvelope::expected(ErrorCode::not_found(), "package not published")
                })
        })
    }
}

/// Installer writing to an in-memory "disk" of path to package.
#[derive(Debug, Default)]
pub struct FakeInstaller {
    files: Mutex<HashMap<PathBuf, PackageInfo>>,
    failures: Mutex<VecDeque<ErrorEnvelope>>,
    delay: Mutex<Option<Duration>>,
    downloads: AtomicUsize,
}

impl FakeInstaller {
    /// Installer with an empty disk.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next download with `error`.
    pub fn fail_next(&self, error: ErrorEnvelope) {
        self.failures.lock().unwrap().push_back(error);
    }

    /// Make every download take `delay` (cancellable).
    pub fn slow_down(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    /// Pretend `package` is already installed at `path`.
    pub fn place(&self, path: &Path, package: PackageInfo) {
        self.files.lock().unwrap().insert(path.to_path_buf(), package);
    }

    /// Flip the stored checksum so verification fails.
    pub fn corrupt(&self, path: &Path) {
        if let Some(package) = self.files.lock().unwrap().get_mut(path) {
            package.checksum = "0".repeat(package.checksum.len());
        }
    }

    /// Version installed at `path`.
    pub fn installed_version(&self, path: &Path) -> Option<VersionId> {
        self.files.lock().unwrap().get(path).map(|package| package.version_id)
    }

    /// Downloads started.
    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }
}

impl ArtifactInstallerPort for FakeInstaller {
    fn download_and_install(
        &self,
        ctx: &RequestContext,
        request: InstallRequest,
        _progress: Option<ProgressCallback>,
    ) -> BoxFuture<'_, Result<InstallOutcome>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            self.downloads.fetch_add(1, Ordering::SeqCst);
            let delay = *self.delay.lock().unwrap();
            if let Some(delay) = delay {
                tokio::select! {
                    () = ctx.cancelled() => return Ok(InstallOutcome::Cancelled),
                    () = tokio::time::sleep(delay) => {},
                }
            }
            if ctx.is_cancelled() {
                return Ok(InstallOutcome::Cancelled);
            }
            let failure = self.failures.lock().unwrap().pop_front();
            if let Some(error) = failure {
                self.files.lock().unwrap().remove(&request.target_path);
                return Err(error);
            }
            self.files
                .lock()
                .unwrap()
                .insert(request.target_path, request.package);
            Ok(InstallOutcome::Installed)
        })
    }

    fn verify_installed(
        &self,
        _ctx: &RequestContext,
        path: PathBuf,
        package: PackageInfo,
    ) -> BoxFuture<'_, Result<bool>> {
        Box::pin(async move {
            Ok(self
                .files
                .lock()
                .unwrap()
                .get(&path)
                .is_some_and(|stored| stored.checksum_matches(&package.checksum)))
        })
    }

    fn artifact_exists(&self, _ctx: &RequestContext, path: PathBuf) -> BoxFuture<'_, Result<bool>> {
        Box::pin(async move { Ok(self.files.lock().unwrap().contains_key(&path)) })
    }
}

/// Version store kept in memory, with a save history.
#[derive(Debug, Default)]
pub struct InMemoryVersionStore {
    record: Mutex<Option<VersionInfo>>,
    history: Mutex<Vec<VersionInfo>>,
    snapshots: Mutex<Vec<PackageInfo>>,
    held_elsewhere: AtomicBool,
}

impl InMemoryVersionStore {
    /// Store holding `record`.
    pub fn with_record(record: VersionInfo) -> Self {
        let store = Self::default();
        *store.record.lock().unwrap() = Some(record);
        store
    }

    /// Current record.
    pub fn record(&self) -> Option<VersionInfo> {
        self.record.lock().unwrap().clone()
    }

    /// Replace the record out of band, as another editor window would.
    pub fn overwrite(&self, record: Option<VersionInfo>) {
        *self.record.lock().unwrap() = record;
    }

    /// Every record saved through the port.
    pub fn history(&self) -> Vec<VersionInfo> {
        self.history.lock().unwrap().clone()
    }

    /// Package snapshots written.
    pub fn snapshots(&self) -> Vec<PackageInfo> {
        self.snapshots.lock().unwrap().clone()
    }

    /// Simulate another process holding the advisory lock.
    pub fn hold_lock_elsewhere(&self, held: bool) {
        self.held_elsewhere.store(held, Ordering::SeqCst);
    }
}

impl VersionStorePort for InMemoryVersionStore {
    fn load(&self, _ctx: &RequestContext) -> BoxFuture<'_, Result<Option<VersionInfo>>> {
        Box::pin(async move { Ok(self.record()) })
    }

    fn save(&self, _ctx: &RequestContext, info: VersionInfo) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.history.lock().unwrap().push(info.clone());
            *self.record.lock().unwrap() = Some(info);
            Ok(())
        })
    }

    fn save_package_snapshot(
        &self,
        _ctx: &RequestContext,
        package: PackageInfo,
    ) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.snapshots.lock().unwrap().push(package);
            Ok(())
        })
    }

    fn try_lock(&self, _ctx: &RequestContext) -> BoxFuture<'_, Result<Option<InstallLock>>> {
        Box::pin(async move {
            if self.held_elsewhere.load(Ordering::SeqCst) {
                return Ok(None);
            }
            Ok(Some(InstallLock::new(())))
        })
    }
}

/// Registry whose listing is set by the test.
#[derive(Debug, Default)]
pub struct StaticRegistry {
    services: Mutex<Vec<ServiceRegistryEntry>>,
    reads: AtomicUsize,
}

impl StaticRegistry {
    /// Replace the listing.
    pub fn set_services(&self, services: Vec<ServiceRegistryEntry>) {
        *self.services.lock().unwrap() = services;
    }

    /// Number of listings served.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl ServiceRegistryPort for StaticRegistry {
    fn list_services(
        &self,
        _ctx: &RequestContext,
    ) -> BoxFuture<'_, Result<Vec<ServiceRegistryEntry>>> {
        Box::pin(async move {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(self.services.lock().unwrap().clone())
        })
    }
}

/// Process table with scriptable spawn behaviour.
#[derive(Debug)]
pub struct FakeProcessControl {
    running: Mutex<Vec<u32>>,
    spawned: Mutex<Vec<SpawnRequest>>,
    spawn_starts_process: AtomicBool,
    next_pid: AtomicU32,
    terminated: AtomicUsize,
}

impl Default for FakeProcessControl {
    fn default() -> Self {
        Self {
            running: Mutex::new(Vec::new()),
            spawned: Mutex::new(Vec::new()),
            spawn_starts_process: AtomicBool::new(true),
            next_pid: AtomicU32::new(4_000),
            terminated: AtomicUsize::new(0),
        }
    }
}

impl FakeProcessControl {
    /// Spawned processes die immediately when `false`.
    pub fn spawn_starts_process(&self, starts: bool) {
        self.spawn_starts_process.store(starts, Ordering::SeqCst);
    }

    /// Pretend `pid` is running the sidecar.
    pub fn add_running(&self, pid: u32) {
        self.running.lock().unwrap().push(pid);
    }

    /// Kill `pid` without going through the port.
    pub fn crash(&self, pid: u32) {
        self.running.lock().unwrap().retain(|running| *running != pid);
    }

    /// Live PIDs.
    pub fn running(&self) -> Vec<u32> {
        self.running.lock().unwrap().clone()
    }

    /// Spawn requests received.
    pub fn spawned(&self) -> Vec<SpawnRequest> {
        self.spawned.lock().unwrap().clone()
    }

    /// Processes killed through the port.
    pub fn terminated(&self) -> usize {
        self.terminated.load(Ordering::SeqCst)
    }
}

impl ProcessControlPort for FakeProcessControl {
    fn find_running(
        &self,
        _ctx: &RequestContext,
        _program: PathBuf,
    ) -> BoxFuture<'_, Result<Vec<u32>>> {
        Box::pin(async move { Ok(self.running()) })
    }

    fn spawn_detached(
        &self,
        _ctx: &RequestContext,
        request: SpawnRequest,
    ) -> BoxFuture<'_, Result<u32>> {
        Box::pin(async move {
            self.spawned.lock().unwrap().push(request);
            let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
            if self.spawn_starts_process.load(Ordering::SeqCst) {
                self.add_running(pid);
            }
            Ok(pid)
        })
    }

    fn is_alive(&self, _ctx: &RequestContext, pid: u32) -> BoxFuture<'_, Result<bool>> {
        Box::pin(async move { Ok(self.running.lock().unwrap().contains(&pid)) })
    }

    fn terminate_all(
        &self,
        _ctx: &RequestContext,
        _program: PathBuf,
    ) -> BoxFuture<'_, Result<usize>> {
        Box::pin(async move {
            let killed = std::mem::take(&mut *self.running.lock().unwrap()).len();
            self.terminated.fetch_add(killed, Ordering::SeqCst);
            Ok(killed)
        })
    }
}

/// Ingest client recording batches, with scripted publish results.
#[derive(Debug)]
pub struct RecordingIngest {
    batches: Mutex<Vec<EventBatch>>,
    endpoints: Mutex<Vec<String>>,
    scripted: Mutex<VecDeque<Result<IngestResponse>>>,
    calls: Mutex<Vec<&'static str>>,
    healthy: AtomicBool,
    publish_attempts: AtomicUsize,
}

impl Default for RecordingIngest {
    fn default() -> Self {
        Self {
            batches: Mutex::new(Vec::new()),
            endpoints: Mutex::new(Vec::new()),
            scripted: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            healthy: AtomicBool::new(true),
            publish_attempts: AtomicUsize::new(0),
        }
    }
}

/// `{success: true}` envelope.
pub fn accepted() -> IngestResponse {
    IngestResponse {
        code: serde_json::json!(0),
        message: "ok".to_owned(),
        success: true,
        data: serde_json::Value::Null,
    }
}

impl RecordingIngest {
    /// Return `result` from the next publish instead of accepting it.
    pub fn script(&self, result: Result<IngestResponse>) {
        self.scripted.lock().unwrap().push_back(result);
    }

    /// Health probe outcome.
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Batches that reached the sidecar (successful or rejected).
    pub fn batches(&self) -> Vec<EventBatch> {
        self.batches.lock().unwrap().clone()
    }

    /// Base URLs used, in call order.
    pub fn endpoints(&self) -> Vec<String> {
        self.endpoints.lock().unwrap().clone()
    }

    /// Publish attempts, failed ones included.
    pub fn publish_attempts(&self) -> usize {
        self.publish_attempts.load(Ordering::SeqCst)
    }

    /// Names of the non-publish operations called.
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    fn pass_through(&self, endpoint: &IngestEndpoint, operation: &'static str) -> IngestResponse {
        self.endpoints.lock().unwrap().push(endpoint.base_url.clone());
        self.calls.lock().unwrap().push(operation);
        accepted()
    }
}

impl IngestPort for RecordingIngest {
    fn publish_events(
        &self,
        ctx: &RequestContext,
        endpoint: IngestEndpoint,
        batch: EventBatch,
    ) -> BoxFuture<'_, Result<IngestResponse>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("recording_ingest.publish_events")?;
            self.publish_attempts.fetch_add(1, Ordering::SeqCst);
            self.endpoints.lock().unwrap().push(endpoint.base_url);
            let scripted = self.scripted.lock().unwrap().pop_front();
            let result = scripted.unwrap_or_else(|| Ok(accepted()));
            if result.is_ok() {
                self.batches.lock().unwrap().push(batch);
            }
            result
        })
    }

    fn probe_health(&self, _ctx: &RequestContext, base_url: String) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.endpoints.lock().unwrap().push(base_url);
            if self.healthy.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(ErrorEnvelope::unexpected(
                    ErrorCode::dependency_unavailable(),
                    "health probe failed",
                    ErrorClass::Retriable,
                ))
            }
        })
    }

    fn trigger_index_build(
        &self,
        _ctx: &RequestContext,
        endpoint: IngestEndpoint,
        _request: IndexBuildRequest,
    ) -> BoxFuture<'_, Result<IngestResponse>> {
        Box::pin(async move { Ok(self.pass_through(&endpoint, "trigger_index_build")) })
    }

    fn check_ignore_files(
        &self,
        _ctx: &RequestContext,
        endpoint: IngestEndpoint,
        _request: IgnoreCheckRequest,
    ) -> BoxFuture<'_, Result<IngestResponse>> {
        Box::pin(async move { Ok(self.pass_through(&endpoint, "check_ignore_files")) })
    }

    fn index_status(
        &self,
        _ctx: &RequestContext,
        endpoint: IngestEndpoint,
        _workspace: String,
    ) -> BoxFuture<'_, Result<IngestResponse>> {
        Box::pin(async move { Ok(self.pass_through(&endpoint, "index_status")) })
    }

    fn toggle_index(
        &self,
        _ctx: &RequestContext,
        endpoint: IngestEndpoint,
        _workspace: String,
        _enabled: bool,
    ) -> BoxFuture<'_, Result<IngestResponse>> {
        Box::pin(async move { Ok(self.pass_through(&endpoint, "toggle_index")) })
    }
}

/// Provider context with a settable state and token.
#[derive(Debug)]
pub struct FixedProvider {
    state: Mutex<ProviderState>,
    token: Mutex<Option<SecretString>>,
}

impl FixedProvider {
    /// Provider of `kind` with the feature toggle set to `enabled`.
    pub fn new(kind: &str, enabled: bool) -> Self {
        Self {
            state: Mutex::new(ProviderState {
                provider_kind: kind.to_owned(),
                feature_enabled: enabled,
            }),
            token: Mutex::new(Some(SecretString::new("test-token"))),
        }
    }

    /// Replace the provider snapshot.
    pub fn set_state(&self, kind: &str, enabled: bool) {
        *self.state.lock().unwrap() = ProviderState {
            provider_kind: kind.to_owned(),
            feature_enabled: enabled,
        };
    }

    /// Remove the bearer token.
    pub fn clear_token(&self) {
        *self.token.lock().unwrap() = None;
    }
}

impl ProviderContextPort for FixedProvider {
    fn provider_state(&self, _ctx: &RequestContext) -> BoxFuture<'_, Result<ProviderState>> {
        Box::pin(async move { Ok(self.state.lock().unwrap().clone()) })
    }

    fn bearer_token(&self, _ctx: &RequestContext) -> BoxFuture<'_, Result<SecretString>> {
        Box::pin(async move {
            self.token.lock().unwrap().clone().ok_or_else(|| {
                ErrorEnvelope::expected(ErrorCode::new("provider", "token_unavailable"), "no token")
            })
        })
    }
}

/// Notifier recording prompts.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    prompts: Mutex<Vec<(String, PromptAction)>>,
}

impl RecordingNotifier {
    /// Prompts shown so far.
    pub fn prompts(&self) -> Vec<(String, PromptAction)> {
        self.prompts.lock().unwrap().clone()
    }
}

impl HostNotifierPort for RecordingNotifier {
    fn prompt(&self, message: &str, action: PromptAction) {
        self.prompts.lock().unwrap().push((message.to_owned(), action));
    }
}

/// Clock following tokio time, so paused tests control both readings.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    origin: tokio::time::Instant,
    epoch_origin_ms: u64,
}

impl TokioClock {
    /// Clock whose wall time reads `epoch_ms` now.
    pub fn starting_at(epoch_ms: u64) -> Self {
        Self {
            origin: tokio::time::Instant::now(),
            epoch_origin_ms: epoch_ms,
        }
    }
}

impl ClockPort for TokioClock {
    fn now_epoch_ms(&self) -> u64 {
        self.epoch_origin_ms + self.monotonic_ms()
    }

    fn monotonic_ms(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_millis()).unwrap()
    }
}

/// Gate denying everything under the listed prefixes.
#[derive(Debug, Default)]
pub struct PrefixGate {
    denied: Mutex<Vec<PathBuf>>,
    reloads: AtomicUsize,
}

impl PrefixGate {
    /// Gate denying paths under `prefixes`.
    pub fn denying(prefixes: &[&str]) -> Self {
        Self {
            denied: Mutex::new(prefixes.iter().map(PathBuf::from).collect()),
            reloads: AtomicUsize::new(0),
        }
    }

    /// Number of reloads requested.
    pub fn reloads(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }
}

impl IgnoreGatePort for PrefixGate {
    fn validate_access(&self, path: &Path) -> bool {
        !self
            .denied
            .lock()
            .unwrap()
            .iter()
            .any(|prefix| path.starts_with(prefix))
    }

    fn reload(&self, _ctx: &RequestContext) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.reloads.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn is_rule_file(&self, path: &Path) -> bool {
        path.file_name().is_some_and(|name| name == ".gitignore")
    }
}

/// Watcher whose events are emitted by the test.
#[derive(Default)]
pub struct ManualWatcher {
    callbacks: Mutex<Vec<(PathBuf, WatchCallback)>>,
    failure: Mutex<Option<ErrorEnvelope>>,
}

impl ManualWatcher {
    /// Fail the next `watch` call with `error`.
    pub fn fail_next(&self, error: ErrorEnvelope) {
        *self.failure.lock().unwrap() = Some(error);
    }

    /// Roots watched so far.
    pub fn roots(&self) -> Vec<PathBuf> {
        self.callbacks
            .lock()
            .unwrap()
            .iter()
            .map(|(root, _)| root.clone())
            .collect()
    }

    /// Deliver `event` to every watch whose root contains it.
    pub fn emit(&self, event: WatchEvent) {
        let path = match &event {
            WatchEvent::Created(path) | WatchEvent::Modified(path) | WatchEvent::Removed(path) => {
                path.clone()
            },
            WatchEvent::Renamed { to, .. } => to.clone(),
        };
        let callbacks: Vec<WatchCallback> = self
            .callbacks
            .lock()
            .unwrap()
            .iter()
            .filter(|(root, _)| path.starts_with(root))
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        for callback in callbacks {
            callback(event.clone());
        }
    }
}

impl FileWatcherPort for ManualWatcher {
    fn watch(&self, root: &Path, callback: WatchCallback) -> Result<WatchSubscription> {
        if let Some(error) = self.failure.lock().unwrap().take() {
            return Err(error);
        }
        self.callbacks
            .lock()
            .unwrap()
            .push((root.to_path_buf(), callback));
        Ok(WatchSubscription::new(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    #[tokio::test]
    async fn installer_tracks_the_in_memory_disk() -> Result<()> {
        let ctx = RequestContext::new_request();
        let installer = FakeInstaller::new();
        let path = PathBuf::from("/home/.codebase-index/bin/codebase-indexer");
        let request = InstallRequest {
            target_path: path.clone(),
            descriptor: fixtures::descriptor(1, 0, 0),
            package: fixtures::package(1, 0, 0),
        };

        assert!(!installer.artifact_exists(&ctx, path.clone()).await?);
        installer.download_and_install(&ctx, request, None).await?;
        assert!(installer.verify_installed(&ctx, path.clone(), fixtures::package(1, 0, 0)).await?);

        installer.corrupt(&path);
        assert!(!installer.verify_installed(&ctx, path, fixtures::package(1, 0, 0)).await?);
        Ok(())
    }

    #[tokio::test]
    async fn process_table_follows_spawn_and_terminate() -> Result<()> {
        let ctx = RequestContext::new_request();
        let processes = FakeProcessControl::default();
        let request = SpawnRequest {
            program: PathBuf::from("/bin/sidecar"),
            args: Vec::new(),
        };
        let pid = processes.spawn_detached(&ctx, request).await?;
        assert!(processes.is_alive(&ctx, pid).await?);
        assert_eq!(processes.terminate_all(&ctx, PathBuf::from("/bin/sidecar")).await?, 1);
        assert!(!processes.is_alive(&ctx, pid).await?);
        Ok(())
    }
}
