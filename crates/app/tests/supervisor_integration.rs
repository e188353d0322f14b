//! Integration tests for sidecar supervision against in-memory ports.

#![allow(missing_docs)]

use codebase_index_app::{HealthVerdict, Supervisor, SupervisorDeps, SupervisorSettings};
use codebase_index_config::SupervisorConfig;
use codebase_index_domain::{
    ClientState, EventBatch, ServiceStatus, Target, UpgradeOutcome, VersionId, VersionStatus,
    is_needs_provider,
};
use codebase_index_ports::PromptAction;
use codebase_index_shared::{RequestContext, Result};
use codebase_index_testkit::errors::checksum_mismatch_error;
use codebase_index_testkit::fixtures;
use codebase_index_testkit::in_memory::{
    FakeCatalog, FakeInstaller, FakeProcessControl, FixedProvider, InMemoryVersionStore,
    RecordingIngest, RecordingLogger, RecordingNotifier, RecordingTelemetry, StaticRegistry,
    TokioClock,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

const NOW_MS: u64 = 1_700_000_000_000;

struct Harness {
    catalog: Arc<FakeCatalog>,
    installer: Arc<FakeInstaller>,
    store: Arc<InMemoryVersionStore>,
    registry: Arc<StaticRegistry>,
    process: Arc<FakeProcessControl>,
    ingest: Arc<RecordingIngest>,
    provider: Arc<FixedProvider>,
    notifier: Arc<RecordingNotifier>,
    logger: RecordingLogger,
    telemetry: Arc<RecordingTelemetry>,
    supervisor: Arc<Supervisor>,
}

fn binary_path() -> PathBuf {
    PathBuf::from("/home/dev/.costrict/bin/codebase-indexer")
}

fn harness(store: InMemoryVersionStore) -> Harness {
    let catalog = Arc::new(FakeCatalog::new(
        fixtures::descriptor(1, 2, 0),
        fixtures::package(1, 2, 0),
    ));
    let installer = Arc::new(FakeInstaller::new());
    let store = Arc::new(store);
    let registry = Arc::new(StaticRegistry::default());
    registry.set_services(vec![fixtures::service(
        "codebase-indexer",
        ServiceStatus::Running,
        11380,
    )]);
    let process = Arc::new(FakeProcessControl::default());
    let ingest = Arc::new(RecordingIngest::default());
    let provider = Arc::new(FixedProvider::new("costrict", true));
    let notifier = Arc::new(RecordingNotifier::default());
    let logger = RecordingLogger::default();
    let telemetry = Arc::new(RecordingTelemetry::default());

    let deps = SupervisorDeps {
        catalog: catalog.clone(),
        installer: installer.clone(),
        store: store.clone(),
        registry: registry.clone(),
        process: process.clone(),
        ingest: ingest.clone(),
        provider: provider.clone(),
        notifier: notifier.clone(),
        clock: Arc::new(TokioClock::starting_at(NOW_MS)),
        logger: Some(Arc::new(logger.clone())),
        telemetry: Some(telemetry.clone()),
    };
    let settings = SupervisorSettings {
        config: SupervisorConfig::default(),
        expected_provider: "costrict".to_owned(),
        binary_path: binary_path(),
        target: Target::current(),
    };

    Harness {
        catalog,
        installer,
        store,
        registry,
        process,
        ingest,
        provider,
        notifier,
        logger,
        telemetry,
        supervisor: Arc::new(Supervisor::new(deps, settings)),
    }
}

async fn running_harness(ctx: &RequestContext) -> Result<Harness> {
    let harness = harness(InMemoryVersionStore::default());
    harness.supervisor.check_and_upgrade(ctx).await?;
    harness.supervisor.start_client(ctx).await?;
    Ok(harness)
}

#[tokio::test(start_paused = true)]
async fn first_install_downloads_the_newest_release() -> Result<()> {
    let ctx = RequestContext::new_request();
    let h = harness(InMemoryVersionStore::default());

    let outcome = h.supervisor.check_and_upgrade(&ctx).await?;

    assert_eq!(outcome, UpgradeOutcome::FirstInstall);
    let Some(record) = h.store.record() else {
        panic!("first install must leave a record");
    };
    assert_eq!(record.status, VersionStatus::Downloaded);
    assert_eq!(record.version_id, VersionId::new(1, 2, 0));
    let statuses: Vec<_> = h.store.history().iter().map(|info| info.status).collect();
    assert_eq!(statuses, vec![VersionStatus::Downloading, VersionStatus::Downloaded]);
    assert_eq!(h.installer.installed_version(&binary_path()), Some(VersionId::new(1, 2, 0)));
    assert_eq!(h.store.snapshots().len(), 1);
    assert_eq!(h.telemetry.counter("supervisor.install.completed"), 1);

    let status = h.supervisor.get_status().await;
    assert_eq!(status.state, ClientState::Installed);
    assert_eq!(status.installed_version.as_deref(), Some("1.2.0"));
    assert_eq!(status.latest_known_version.as_deref(), Some("1.2.0"));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn current_install_is_left_alone() -> Result<()> {
    let ctx = RequestContext::new_request();
    let h = harness(InMemoryVersionStore::with_record(fixtures::version_info(
        1,
        2,
        0,
        VersionStatus::Downloaded,
        NOW_MS,
    )));
    h.installer.place(&binary_path(), fixtures::package(1, 2, 0));

    let outcome = h.supervisor.check_and_upgrade(&ctx).await?;

    assert_eq!(outcome, UpgradeOutcome::NoUpdate);
    assert_eq!(h.installer.downloads(), 0);
    assert!(h.store.history().is_empty());
    assert_eq!(h.supervisor.client_state().await, ClientState::Installed);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn newer_release_replaces_the_running_sidecar() -> Result<()> {
    let ctx = RequestContext::new_request();
    let h = harness(InMemoryVersionStore::with_record(fixtures::version_info(
        1,
        1,
        0,
        VersionStatus::Downloaded,
        NOW_MS,
    )));
    h.installer.place(&binary_path(), fixtures::package(1, 1, 0));
    h.process.add_running(77);

    let outcome = h.supervisor.check_and_upgrade(&ctx).await?;

    assert_eq!(outcome, UpgradeOutcome::Upgraded);
    assert_eq!(h.process.terminated(), 1);
    assert_eq!(h.installer.installed_version(&binary_path()), Some(VersionId::new(1, 2, 0)));
    assert!(h.logger.has_event("supervisor.upgrade.started"));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn failed_record_is_reinstalled_even_at_the_same_version() -> Result<()> {
    let ctx = RequestContext::new_request();
    let h = harness(InMemoryVersionStore::with_record(fixtures::version_info(
        1,
        2,
        0,
        VersionStatus::Failed,
        NOW_MS,
    )));
    h.installer.place(&binary_path(), fixtures::package(1, 2, 0));

    let outcome = h.supervisor.check_and_upgrade(&ctx).await?;

    assert_eq!(outcome, UpgradeOutcome::Upgraded);
    assert_eq!(h.installer.downloads(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn fresh_download_elsewhere_is_awaited_not_repeated() -> Result<()> {
    let ctx = RequestContext::new_request();
    let h = harness(InMemoryVersionStore::with_record(fixtures::version_info(
        1,
        2,
        0,
        VersionStatus::Downloading,
        NOW_MS,
    )));

    let store = h.store.clone();
    let installer = h.installer.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(15)).await;
        installer.place(&binary_path(), fixtures::package(1, 2, 0));
        store.overwrite(Some(fixtures::version_info(
            1,
            2,
            0,
            VersionStatus::Downloaded,
            NOW_MS + 15_000,
        )));
    });

    let outcome = h.supervisor.check_and_upgrade(&ctx).await?;

    assert_eq!(outcome, UpgradeOutcome::NoUpdate);
    assert_eq!(h.installer.downloads(), 0);
    assert!(h.logger.has_event("supervisor.install.waiting"));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn stale_download_record_is_reset_and_reinstalled() -> Result<()> {
    let ctx = RequestContext::new_request();
    let h = harness(InMemoryVersionStore::with_record(fixtures::version_info(
        1,
        2,
        0,
        VersionStatus::Downloading,
        NOW_MS - 120_000,
    )));

    let outcome = h.supervisor.check_and_upgrade(&ctx).await?;

    assert_eq!(outcome, UpgradeOutcome::FirstInstall);
    let history = h.store.history();
    assert_eq!(history.first().map(|info| info.status), Some(VersionStatus::Failed));
    assert_eq!(h.store.record().map(|info| info.status), Some(VersionStatus::Downloaded));
    assert!(h.logger.has_event("supervisor.install.stale_reset"));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn download_that_never_finishes_times_out() -> Result<()> {
    let ctx = RequestContext::new_request();
    let h = harness(InMemoryVersionStore::with_record(fixtures::version_info(
        1,
        2,
        0,
        VersionStatus::Downloading,
        NOW_MS,
    )));

    let outcome = h.supervisor.check_and_upgrade(&ctx).await?;

    assert_eq!(outcome, UpgradeOutcome::Failed);
    assert_eq!(h.installer.downloads(), 0);
    assert!(h.supervisor.get_status().await.last_error.is_some());
    assert_eq!(h.store.record().map(|info| info.status), Some(VersionStatus::Downloading));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn failed_download_is_recorded_and_reported() -> Result<()> {
    let ctx = RequestContext::new_request();
    let h = harness(InMemoryVersionStore::default());
    h.installer.fail_next(checksum_mismatch_error());

    let outcome = h.supervisor.check_and_upgrade(&ctx).await?;

    assert_eq!(outcome, UpgradeOutcome::Failed);
    assert_eq!(h.store.record().map(|info| info.status), Some(VersionStatus::Failed));
    assert_eq!(h.supervisor.client_state().await, ClientState::Failed);
    assert_eq!(h.telemetry.counter("supervisor.install.failed"), 1);
    assert_eq!(h.logger.levels_of("supervisor.install.failed").len(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn cancelled_download_leaves_a_failed_record() -> Result<()> {
    let ctx = RequestContext::new_request();
    let h = harness(InMemoryVersionStore::default());
    h.installer.slow_down(Duration::from_secs(30));

    let cancel = ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(5)).await;
        cancel.cancel();
    });
    let outcome = h.supervisor.check_and_upgrade(&ctx).await?;

    assert_eq!(outcome, UpgradeOutcome::Failed);
    assert_eq!(h.store.record().map(|info| info.status), Some(VersionStatus::Failed));
    assert_eq!(h.supervisor.client_state().await, ClientState::Uninstalled);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn wrong_provider_skips_every_lifecycle_step() -> Result<()> {
    let ctx = RequestContext::new_request();
    let h = harness(InMemoryVersionStore::default());
    h.provider.set_state("openai", true);

    let error = match h.supervisor.check_and_upgrade(&ctx).await {
        Ok(outcome) => panic!("expected needs-provider, got {outcome}"),
        Err(error) => error,
    };
    assert!(is_needs_provider(&error));
    assert_eq!(h.catalog.list_calls(), 0);

    let error = match h.supervisor.start_client(&ctx).await {
        Ok(()) => panic!("expected needs-provider"),
        Err(error) => error,
    };
    assert!(is_needs_provider(&error));
    assert!(h.process.spawned().is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn start_spawns_the_server_and_waits_for_registration() -> Result<()> {
    let ctx = RequestContext::new_request();
    let h = running_harness(&ctx).await?;

    let spawned = h.process.spawned();
    assert_eq!(spawned.len(), 1);
    assert_eq!(spawned[0].program, binary_path());
    assert_eq!(spawned[0].args, vec!["server", "--listen", "localhost:11380"]);

    let status = h.supervisor.get_status().await;
    assert_eq!(status.state, ClientState::Running);
    assert_eq!(status.pid, Some(4_000));
    assert_eq!(status.endpoint.as_deref(), Some("http://localhost:11380"));
    assert_eq!(status.failure_count, 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn start_reuses_an_already_running_sidecar() -> Result<()> {
    let ctx = RequestContext::new_request();
    let h = harness(InMemoryVersionStore::default());
    h.supervisor.check_and_upgrade(&ctx).await?;
    h.process.add_running(77);

    h.supervisor.start_client(&ctx).await?;

    assert!(h.process.spawned().is_empty());
    assert_eq!(h.supervisor.get_status().await.pid, Some(77));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn start_waits_until_the_indexer_service_registers() -> Result<()> {
    let ctx = RequestContext::new_request();
    let h = harness(InMemoryVersionStore::default());
    h.supervisor.check_and_upgrade(&ctx).await?;
    h.registry.set_services(vec![fixtures::service(
        "codebase-indexer",
        ServiceStatus::Starting,
        11380,
    )]);

    let registry = h.registry.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(12)).await;
        registry.set_services(vec![fixtures::service(
            "codebase-indexer",
            ServiceStatus::Running,
            11381,
        )]);
    });
    h.supervisor.start_client(&ctx).await?;

    assert!(h.registry.reads() >= 3);
    let status = h.supervisor.get_status().await;
    assert_eq!(status.state, ClientState::Running);
    assert_eq!(status.endpoint.as_deref(), Some("http://localhost:11381"));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn start_that_never_runs_fails_and_prompts_retry() -> Result<()> {
    let ctx = RequestContext::new_request();
    let h = harness(InMemoryVersionStore::default());
    h.supervisor.check_and_upgrade(&ctx).await?;
    h.process.spawn_starts_process(false);

    let error = match h.supervisor.start_client(&ctx).await {
        Ok(()) => panic!("expected start failure"),
        Err(error) => error,
    };

    assert!(error.has_code("supervisor", "start_failed"));
    assert_eq!(
        error.metadata.get("causeCode").map(String::as_str),
        Some("process:not_running")
    );
    assert_eq!(h.process.spawned().len(), 3);
    assert_eq!(h.supervisor.client_state().await, ClientState::Failed);
    let prompts = h.notifier.prompts();
    assert_eq!(prompts.len(), 1);
    assert_eq!(prompts[0].1, PromptAction::Retry);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn corrupted_binary_is_never_started() -> Result<()> {
    let ctx = RequestContext::new_request();
    let h = harness(InMemoryVersionStore::default());
    h.supervisor.check_and_upgrade(&ctx).await?;
    h.installer.corrupt(&binary_path());

    let error = match h.supervisor.start_client(&ctx).await {
        Ok(()) => panic!("expected start failure"),
        Err(error) => error,
    };

    assert_eq!(
        error.metadata.get("causeCode").map(String::as_str),
        Some("artifact:checksum_mismatch")
    );
    assert!(h.process.spawned().is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn stop_kills_the_sidecar_and_keeps_the_install() -> Result<()> {
    let ctx = RequestContext::new_request();
    let h = running_harness(&ctx).await?;

    let killed = h.supervisor.stop_client(&ctx).await?;

    assert_eq!(killed, 1);
    let status = h.supervisor.get_status().await;
    assert_eq!(status.state, ClientState::Installed);
    assert_eq!(status.pid, None);
    assert_eq!(status.endpoint, None);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn health_failures_past_the_threshold_restart_the_sidecar() -> Result<()> {
    let ctx = RequestContext::new_request();
    let h = running_harness(&ctx).await?;
    h.ingest.set_healthy(false);

    assert_eq!(h.supervisor.run_health_check(&ctx).await, Some(HealthVerdict::Degraded));
    assert_eq!(h.supervisor.client_state().await, ClientState::Degraded);
    assert_eq!(h.supervisor.run_health_check(&ctx).await, Some(HealthVerdict::Degraded));
    assert_eq!(h.supervisor.get_status().await.failure_count, 2);
    assert_eq!(h.telemetry.counter("supervisor.restarts"), 0);

    assert_eq!(
        h.supervisor.run_health_check(&ctx).await,
        Some(HealthVerdict::RestartRequired)
    );

    assert_eq!(h.telemetry.counter("supervisor.restarts"), 1);
    assert_eq!(h.process.terminated(), 1);
    assert_eq!(h.process.spawned().len(), 2);
    let status = h.supervisor.get_status().await;
    assert_eq!(status.failure_count, 0);
    assert_eq!(status.state, ClientState::Running);
    assert_eq!(status.pid, Some(4_001));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn healthy_probe_clears_degradation() -> Result<()> {
    let ctx = RequestContext::new_request();
    let h = running_harness(&ctx).await?;

    h.ingest.set_healthy(false);
    assert_eq!(h.supervisor.run_health_check(&ctx).await, Some(HealthVerdict::Degraded));
    h.ingest.set_healthy(true);
    assert_eq!(h.supervisor.run_health_check(&ctx).await, Some(HealthVerdict::Healthy));

    let status = h.supervisor.get_status().await;
    assert_eq!(status.state, ClientState::Running);
    assert_eq!(status.failure_count, 0);
    assert_eq!(h.ingest.endpoints().last().map(String::as_str), Some("http://localhost:11380"));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn crashed_process_counts_as_a_failed_check() -> Result<()> {
    let ctx = RequestContext::new_request();
    let h = running_harness(&ctx).await?;
    h.process.crash(4_000);

    assert_eq!(h.supervisor.run_health_check(&ctx).await, Some(HealthVerdict::Degraded));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn failed_reinstall_during_restart_prompts_reinstall() -> Result<()> {
    let ctx = RequestContext::new_request();
    let h = running_harness(&ctx).await?;
    h.catalog.publish(fixtures::descriptor(1, 3, 0), fixtures::package(1, 3, 0));
    h.installer.fail_next(checksum_mismatch_error());

    let error = match h.supervisor.restart_client(&ctx).await {
        Ok(()) => panic!("expected restart failure"),
        Err(error) => error,
    };

    assert!(error.has_code("supervisor", "install_failed"));
    assert_eq!(h.supervisor.client_state().await, ClientState::Failed);
    let prompts = h.notifier.prompts();
    assert_eq!(prompts.last().map(|prompt| prompt.1), Some(PromptAction::Reinstall));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn health_tick_is_skipped_while_an_install_runs() -> Result<()> {
    let ctx = RequestContext::new_request();
    let h = harness(InMemoryVersionStore::default());
    h.installer.slow_down(Duration::from_secs(30));

    let supervisor = h.supervisor.clone();
    let install_ctx = ctx.clone();
    let install = tokio::spawn(async move { supervisor.check_and_upgrade(&install_ctx).await });
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(h.supervisor.run_health_check(&ctx).await, None);
    assert!(h.logger.has_event("supervisor.health.skipped"));

    let outcome = match install.await {
        Ok(outcome) => outcome?,
        Err(error) => panic!("install task failed: {error}"),
    };
    assert_eq!(outcome, UpgradeOutcome::FirstInstall);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn health_loop_probes_on_its_interval_until_teardown() -> Result<()> {
    let ctx = RequestContext::new_request();
    let h = running_harness(&ctx).await?;
    let probes_before = h.ingest.endpoints().len();

    h.supervisor.start_health_check(&ctx).await;
    tokio::time::sleep(Duration::from_millis(60_500)).await;
    let probes_after_tick = h.ingest.endpoints().len();
    assert_eq!(probes_after_tick, probes_before + 1);

    h.supervisor.teardown().await;
    tokio::time::sleep(Duration::from_secs(180)).await;
    assert_eq!(h.ingest.endpoints().len(), probes_after_tick);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn sidecar_calls_need_a_registered_endpoint() -> Result<()> {
    let ctx = RequestContext::new_request();
    let h = harness(InMemoryVersionStore::default());
    let batch = EventBatch {
        workspace: "/ws".to_owned(),
        data: Vec::new(),
    };

    let error = match h.supervisor.publish_events(&ctx, batch).await {
        Ok(_) => panic!("expected endpoint error"),
        Err(error) => error,
    };
    assert!(error.has_code("supervisor", "endpoint_unavailable"));
    assert!(error.is_retriable());

    h.supervisor.check_and_upgrade(&ctx).await?;
    h.supervisor.start_client(&ctx).await?;
    let response = h.supervisor.index_status(&ctx, "/ws".to_owned()).await?;
    assert!(response.success);
    assert_eq!(h.ingest.calls(), vec!["index_status"]);
    Ok(())
}
