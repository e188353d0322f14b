//! Blocking entry points for the local CLI.
//!
//! Each call builds a current-thread tokio runtime, wires production
//! adapters from the effective config and runs one operation.

use crate::config_check::load_effective_config;
use crate::observability::Observability;
use crate::runtime::{IndexerRuntime, RuntimeStatus};
use crate::wiring::{build_supervisor, production_parts, workspace_root};
use crate::{InfraError, InfraResult};
use codebase_index_adapters::{
    HttpVersionCatalog, JsonVersionStore, SysinfoProcessControl, WellKnownRegistry,
};
use codebase_index_app::{SupervisorStatus, VersionResolver};
use codebase_index_config::{IndexerEnv, ProductPaths, ValidatedIndexerConfig};
use codebase_index_domain::{
    ServiceRegistryEntry, Target, UpgradeOutcome, VersionInfo, VersionStatus,
};
use codebase_index_ports::{ProcessControlPort, ServiceRegistryPort, VersionStorePort};
use codebase_index_shared::{ErrorCode, ErrorEnvelope, RequestContext};
use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Inputs shared by every local command.
#[derive(Debug, Clone, Default)]
pub struct LocalOptions {
    /// `CBI_*` variables.
    pub env: BTreeMap<String, String>,
    /// Optional JSON or TOML config file.
    pub config_path: Option<PathBuf>,
    /// Optional partial config JSON applied over the file.
    pub overrides_json: Option<String>,
}

impl LocalOptions {
    fn load(&self) -> InfraResult<(ValidatedIndexerConfig, IndexerEnv)> {
        load_effective_config(
            &self.env,
            self.config_path.as_deref(),
            self.overrides_json.as_deref(),
        )
    }
}

/// On-disk state of the sidecar install, read without starting anything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalStatus {
    /// Product root directory.
    pub home: String,
    /// Catalog target of this host.
    pub target: String,
    /// Installed executable.
    pub binary_path: String,
    /// Whether the executable exists.
    pub binary_present: bool,
    /// Persisted install record.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub install: Option<VersionInfo>,
    /// Sidecar PIDs running the installed executable.
    pub pids: Vec<u32>,
    /// Registry entry of the indexer service.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<ServiceRegistryEntry>,
    /// Base URL of the indexer service when it is running.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

/// Result of comparing the install record with the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCheck {
    /// Catalog target of this host.
    pub target: String,
    /// Version in the install record.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub installed_version: Option<String>,
    /// Status in the install record.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub install_status: Option<VersionStatus>,
    /// Newest version in the catalog.
    pub latest_version: String,
    /// Whether an install or upgrade would run.
    pub update_available: bool,
}

/// Outcome of an install run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallSummary {
    /// What the upgrade decision did.
    pub outcome: UpgradeOutcome,
    /// Supervisor snapshot afterwards.
    pub status: SupervisorStatus,
}

/// Read the install record, registry and process table.
pub fn read_status_local(options: &LocalOptions) -> InfraResult<LocalStatus> {
    let (config, _) = options.load()?;
    let paths = ProductPaths::resolve(&config.product)?;
    let target = Target::current();
    let binary_path = paths.binary_path(target.platform);
    let service_name = config.supervisor.service_name.clone();

    run_async_with_ctx(RequestContext::new_request(), |ctx| async move {
        let store = JsonVersionStore::new(paths.clone());
        let registry = WellKnownRegistry::new(paths.registry_file());
        let process = SysinfoProcessControl::new(target.platform);

        let install = store.load(&ctx).await?;
        let service = registry.get_service_config(&ctx, &service_name).await?;
        let pids = process.find_running(&ctx, binary_path.clone()).await?;
        let endpoint = service
            .as_ref()
            .filter(|entry| entry.is_running())
            .map(ServiceRegistryEntry::endpoint);
        Ok(LocalStatus {
            home: paths.root().display().to_string(),
            target: format!("{}/{}", target.platform, target.arch),
            binary_present: binary_path.is_file(),
            binary_path: binary_path.display().to_string(),
            install,
            pids,
            service,
            endpoint,
        })
    })
}

/// Compare the install record with the newest catalog version.
pub fn run_check_update_local(options: &LocalOptions) -> InfraResult<UpdateCheck> {
    let (config, _) = options.load()?;
    let paths = ProductPaths::resolve(&config.product)?;
    let target = Target::current();
    let catalog = Arc::new(HttpVersionCatalog::new(&config.catalog)?);

    run_async_with_ctx(RequestContext::new_request(), |ctx| async move {
        let resolver = VersionResolver::new(catalog, target);
        let latest = resolver.get_latest_version(&ctx).await?;
        let install = JsonVersionStore::new(paths).load(&ctx).await?;
        let update_available = install
            .as_ref()
            .is_none_or(|record| VersionResolver::should_update(record, &latest));
        Ok(UpdateCheck {
            target: format!("{}/{}", target.platform, target.arch),
            installed_version: install.as_ref().map(|record| record.version_id.to_string()),
            install_status: install.as_ref().map(|record| record.status),
            latest_version: latest.version_id.to_string(),
            update_available,
        })
    })
}

/// Run the install/upgrade decision.
pub fn run_install_local(options: &LocalOptions) -> InfraResult<InstallSummary> {
    let (config, env) = options.load()?;
    let supervisor = build_supervisor(&config, &env, &Observability::from_std_env())?;
    run_async_with_ctx(RequestContext::new_request(), |ctx| async move {
        let outcome = supervisor.check_and_upgrade(&ctx).await?;
        Ok(InstallSummary {
            outcome,
            status: supervisor.get_status().await,
        })
    })
}

/// Install if needed, then start the sidecar and wait for it to register.
pub fn run_start_local(options: &LocalOptions) -> InfraResult<SupervisorStatus> {
    let (config, env) = options.load()?;
    let supervisor = build_supervisor(&config, &env, &Observability::from_std_env())?;
    run_async_with_ctx(RequestContext::new_request(), |ctx| async move {
        let outcome = supervisor.check_and_upgrade(&ctx).await?;
        if !outcome.is_installed() {
            return Err(not_installed_error(&supervisor.get_status().await));
        }
        supervisor.start_client(&ctx).await?;
        Ok(supervisor.get_status().await)
    })
}

/// Kill every sidecar process; returns how many were signalled.
pub fn run_stop_local(options: &LocalOptions) -> InfraResult<usize> {
    let (config, env) = options.load()?;
    let supervisor = build_supervisor(&config, &env, &Observability::from_std_env())?;
    run_async_with_ctx(RequestContext::new_request(), |ctx| async move {
        supervisor.stop_client(&ctx).await
    })
}

/// Stop, re-check the install, start.
pub fn run_restart_local(options: &LocalOptions) -> InfraResult<SupervisorStatus> {
    let (config, env) = options.load()?;
    let supervisor = build_supervisor(&config, &env, &Observability::from_std_env())?;
    run_async_with_ctx(RequestContext::new_request(), |ctx| async move {
        supervisor.restart_client(&ctx).await?;
        Ok(supervisor.get_status().await)
    })
}

/// Every service listed in the registry file.
pub fn list_services_local(options: &LocalOptions) -> InfraResult<Vec<ServiceRegistryEntry>> {
    let (config, _) = options.load()?;
    let paths = ProductPaths::resolve(&config.product)?;
    run_async_with_ctx(RequestContext::new_request(), |ctx| async move {
        WellKnownRegistry::new(paths.registry_file())
            .list_services(&ctx)
            .await
    })
}

/// Run the runtime on `workspace` until Ctrl-C, then dispose.
pub fn run_daemon_local(options: &LocalOptions, workspace: &Path) -> InfraResult<RuntimeStatus> {
    run_daemon_until(options, workspace, async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::warn!(%error, "ctrl-c handler unavailable; shutting down");
        }
    })
}

/// Run the runtime on `workspace` until `shutdown` resolves, then dispose.
pub fn run_daemon_until<S>(
    options: &LocalOptions,
    workspace: &Path,
    shutdown: S,
) -> InfraResult<RuntimeStatus>
where
    S: Future<Output = ()>,
{
    let (config, env) = options.load()?;
    let workspace = workspace_root(workspace)?;
    let observability = Observability::from_std_env();

    run_async_with_ctx(RequestContext::new_request(), |ctx| async move {
        let scoped = observability.scoped(&ctx);
        let parts = production_parts(&config, &env, &workspace, &scoped)?;
        let runtime = IndexerRuntime::new(&ctx, config, &workspace, parts)?;
        runtime.initialize().await?;
        shutdown.await;
        runtime.dispose().await;
        Ok(runtime.get_status().await)
    })
}

fn not_installed_error(status: &SupervisorStatus) -> InfraError {
    let message = status
        .last_error
        .clone()
        .unwrap_or_else(|| "sidecar install did not complete".to_owned());
    ErrorEnvelope::expected(ErrorCode::new("supervisor", "install_failed"), message)
}

fn run_async_with_ctx<F, T>(
    ctx: RequestContext,
    op: impl FnOnce(RequestContext) -> F,
) -> InfraResult<T>
where
    F: Future<Output = Result<T, ErrorEnvelope>>,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(InfraError::from)?;
    runtime.block_on(async { op(ctx).await })
}
