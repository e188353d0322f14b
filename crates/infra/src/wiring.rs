//! Adapter selection for the production runtime.

use crate::host::{StaticProviderContext, StderrNotifier};
use crate::observability::Observability;
use crate::{InfraError, InfraResult};
use codebase_index_adapters::{
    HttpArtifactInstaller, HttpIngestClient, HttpVersionCatalog, IgnoreRuleGate, JsonVersionStore,
    NotifyWatcher, SysinfoProcessControl, SystemClock, WellKnownRegistry,
};
use codebase_index_app::{
    MonitorSettings, Supervisor, SupervisorDeps, SupervisorSettings,
};
use codebase_index_config::{IndexerEnv, ProductPaths, ValidatedIndexerConfig};
use codebase_index_domain::Target;
use codebase_index_ports::{FileWatcherPort, IgnoreGatePort};
use std::path::Path;
use std::sync::Arc;

/// Collaborators of one runtime, before any task is spawned.
#[derive(Clone)]
pub struct RuntimeParts {
    /// Supervisor collaborators; provider, clock, logger and telemetry are shared with the monitor.
    pub supervisor: SupervisorDeps,
    /// Ignore policy for the workspace root.
    pub gate: Arc<dyn IgnoreGatePort>,
    /// Recursive watcher for the workspace root.
    pub watcher: Arc<dyn FileWatcherPort>,
}

/// Build the HTTP, filesystem and process adapters for `config`.
pub fn production_parts(
    config: &ValidatedIndexerConfig,
    env: &IndexerEnv,
    workspace: &Path,
    observability: &Observability,
) -> InfraResult<RuntimeParts> {
    let supervisor = supervisor_deps(config, env, observability)?;
    Ok(RuntimeParts {
        supervisor,
        gate: Arc::new(IgnoreRuleGate::new(workspace, config.ignore.files.clone())),
        watcher: Arc::new(NotifyWatcher::new()),
    })
}

/// Supervisor collaborators backed by the real catalog, store and process table.
pub fn supervisor_deps(
    config: &ValidatedIndexerConfig,
    env: &IndexerEnv,
    observability: &Observability,
) -> InfraResult<SupervisorDeps> {
    let paths = ProductPaths::resolve(&config.product)?;
    let target = Target::current();
    Ok(SupervisorDeps {
        catalog: Arc::new(HttpVersionCatalog::new(&config.catalog)?),
        installer: Arc::new(HttpArtifactInstaller::new(
            &config.catalog,
            config.download_retry_policy(),
        )?),
        registry: Arc::new(WellKnownRegistry::new(paths.registry_file())),
        store: Arc::new(JsonVersionStore::new(paths)),
        process: Arc::new(SysinfoProcessControl::new(target.platform)),
        ingest: Arc::new(HttpIngestClient::new(config.catalog.timeout_ms)?),
        provider: Arc::new(StaticProviderContext::from_env(env, config)),
        notifier: Arc::new(StderrNotifier::new()),
        clock: Arc::new(SystemClock::new()),
        logger: observability.logger.clone(),
        telemetry: observability.telemetry.clone(),
    })
}

/// Supervisor settings for the host target.
pub fn supervisor_settings(config: &ValidatedIndexerConfig) -> InfraResult<SupervisorSettings> {
    let paths = ProductPaths::resolve(&config.product)?;
    let target = Target::current();
    Ok(SupervisorSettings {
        config: config.supervisor.clone(),
        expected_provider: config.provider.expected_kind.clone(),
        binary_path: paths.binary_path(target.platform),
        target,
    })
}

/// Monitor settings for `workspace`.
#[must_use]
pub fn monitor_settings(config: &ValidatedIndexerConfig, workspace: &Path) -> MonitorSettings {
    MonitorSettings {
        config: config.monitor.clone(),
        expected_provider: config.provider.expected_kind.clone(),
        workspace: workspace.to_path_buf(),
    }
}

/// A supervisor wired to production adapters, for one-shot commands.
pub fn build_supervisor(
    config: &ValidatedIndexerConfig,
    env: &IndexerEnv,
    observability: &Observability,
) -> InfraResult<Arc<Supervisor>> {
    let deps = supervisor_deps(config, env, observability)?;
    let settings = supervisor_settings(config)?;
    Ok(Arc::new(Supervisor::new(deps, settings)))
}

pub(crate) fn workspace_root(path: &Path) -> InfraResult<std::path::PathBuf> {
    std::fs::canonicalize(path).map_err(|error| {
        InfraError::from(error)
            .context(format!("workspace root {}", path.display()))
            .with_metadata("path", path.display().to_string())
    })
}
