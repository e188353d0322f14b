//! Process discovery, detached spawn and termination.
//!
//! Discovery is name-based on Windows and command-line based elsewhere, so
//! a sidecar started by another editor window is still found.

use codebase_index_domain::Platform;
use codebase_index_ports::{BoxFuture, ProcessControlPort, SpawnRequest};
use codebase_index_shared::{ErrorClass, ErrorCode, ErrorEnvelope, RequestContext, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use sysinfo::{Pid, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, System, UpdateKind};

/// Process control backed by `sysinfo` and `tokio::process`.
#[derive(Debug, Clone, Copy)]
pub struct SysinfoProcessControl {
    platform: Platform,
}

impl SysinfoProcessControl {
    /// Control using `platform`'s matching rules.
    #[must_use]
    pub const fn new(platform: Platform) -> Self {
        Self { platform }
    }

    /// Control for the host platform.
    #[must_use]
    pub fn for_current_host() -> Self {
        Self::new(codebase_index_domain::Target::current().platform)
    }
}

/// The parts of a process table entry used for matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSnapshot {
    /// Process id.
    pub pid: u32,
    /// Executable name as reported by the OS.
    pub name: String,
    /// Resolved executable path, when readable.
    pub exe: Option<PathBuf>,
    /// Command line.
    pub cmd: Vec<String>,
}

impl ProcessSnapshot {
    /// True when this entry runs `program` under `platform`'s rules.
    #[must_use]
    pub fn runs(&self, platform: Platform, program: &Path) -> bool {
        match platform {
            Platform::Windows => program
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| self.name.eq_ignore_ascii_case(name)),
            Platform::Darwin | Platform::Linux => {
                let pattern = program.to_string_lossy();
                self.exe.as_deref() == Some(program)
                    || self.cmd.iter().any(|arg| arg.contains(pattern.as_ref()))
            },
        }
    }
}

fn snapshot_table() -> Vec<ProcessSnapshot> {
    let mut system = System::new();
    system.refresh_processes_specifics(
        ProcessesToUpdate::All,
        true,
        ProcessRefreshKind::nothing()
            .with_exe(UpdateKind::OnlyIfNotSet)
            .with_cmd(UpdateKind::OnlyIfNotSet),
    );
    let own_pid = std::process::id();
    system
        .processes()
        .iter()
        .filter(|(pid, process)| pid.as_u32() != own_pid && process.status() != ProcessStatus::Zombie)
        .map(|(pid, process)| ProcessSnapshot {
            pid: pid.as_u32(),
            name: process.name().to_string_lossy().into_owned(),
            exe: process.exe().map(Path::to_path_buf),
            cmd: process
                .cmd()
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned())
                .collect(),
        })
        .collect()
}

fn matching_pids(platform: Platform, program: &Path) -> Vec<u32> {
    let mut pids: Vec<u32> = snapshot_table()
        .into_iter()
        .filter(|snapshot| snapshot.runs(platform, program))
        .map(|snapshot| snapshot.pid)
        .collect();
    pids.sort_unstable();
    pids
}

fn pid_alive(pid: u32) -> bool {
    let pid = Pid::from_u32(pid);
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    system
        .process(pid)
        .is_some_and(|process| process.status() != ProcessStatus::Zombie)
}

fn kill_matching(platform: Platform, program: &Path) -> usize {
    let pids = matching_pids(platform, program);
    if pids.is_empty() {
        return 0;
    }
    let mut system = System::new();
    let targets: Vec<Pid> = pids.iter().copied().map(Pid::from_u32).collect();
    system.refresh_processes(ProcessesToUpdate::Some(&targets), true);
    targets
        .iter()
        .filter_map(|pid| system.process(*pid))
        .filter(|process| process.kill())
        .count()
}

async fn blocking<T, F>(operation: &'static str, work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(work).await.map_err(|error| {
        ErrorEnvelope::unexpected(
            ErrorCode::internal(),
            format!("{operation} task failed: {error}"),
            ErrorClass::NonRetriable,
        )
    })
}

impl ProcessControlPort for SysinfoProcessControl {
    fn find_running(
        &self,
        ctx: &RequestContext,
        program: PathBuf,
    ) -> BoxFuture<'_, Result<Vec<u32>>> {
        let ctx = ctx.clone();
        let platform = self.platform;
        Box::pin(async move {
            ctx.ensure_not_cancelled("process.find_running")?;
            blocking("process.find_running", move || matching_pids(platform, &program)).await
        })
    }

    fn spawn_detached(
        &self,
        ctx: &RequestContext,
        request: SpawnRequest,
    ) -> BoxFuture<'_, Result<u32>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("process.spawn_detached")?;
            let mut command = tokio::process::Command::new(&request.program);
            command
                .args(&request.args)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .kill_on_drop(false);
            #[cfg(unix)]
            command.process_group(0);
            #[cfg(windows)]
            {
                const DETACHED_PROCESS: u32 = 0x0000_0008;
                const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
                command.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP);
            }

            let child = command.spawn().map_err(|error| {
                ErrorEnvelope::unexpected(
                    ErrorCode::new("process", "spawn_failed"),
                    format!("failed to spawn {}: {error}", request.program.display()),
                    ErrorClass::NonRetriable,
                )
                .with_metadata("program", request.program.display().to_string())
            })?;
            let pid = child.id().ok_or_else(|| {
                ErrorEnvelope::unexpected(
                    ErrorCode::new("process", "spawn_failed"),
                    "spawned process exited before reporting a pid",
                    ErrorClass::NonRetriable,
                )
            })?;
            // Dropping the handle leaves the process running; tokio reaps it on exit.
            drop(child);
            tracing::info!(pid, program = %request.program.display(), "sidecar spawned");
            Ok(pid)
        })
    }

    fn is_alive(&self, ctx: &RequestContext, pid: u32) -> BoxFuture<'_, Result<bool>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("process.is_alive")?;
            blocking("process.is_alive", move || pid_alive(pid)).await
        })
    }

    fn terminate_all(
        &self,
        ctx: &RequestContext,
        program: PathBuf,
    ) -> BoxFuture<'_, Result<usize>> {
        let ctx = ctx.clone();
        let platform = self.platform;
        Box::pin(async move {
            ctx.ensure_not_cancelled("process.terminate_all")?;
            let killed =
                blocking("process.terminate_all", move || kill_matching(platform, &program)).await?;
            tracing::info!(killed, "sidecar processes terminated");
            Ok(killed)
        })
    }
}
