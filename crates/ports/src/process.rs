//! Process discovery, spawning and termination.

use crate::BoxFuture;
use codebase_index_shared::{RequestContext, Result};
use std::path::PathBuf;

/// Detached spawn parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnRequest {
    /// Executable.
    pub program: PathBuf,
    /// Arguments.
    pub args: Vec<String>,
}

/// Platform process control.
pub trait ProcessControlPort: Send + Sync {
    /// PIDs of processes running `program` (by name on Windows, by command line elsewhere).
    fn find_running(&self, ctx: &RequestContext, program: PathBuf)
    -> BoxFuture<'_, Result<Vec<u32>>>;

    /// Spawn detached with stdio discarded; returns the PID.
    fn spawn_detached(&self, ctx: &RequestContext, request: SpawnRequest)
    -> BoxFuture<'_, Result<u32>>;

    /// True when `pid` is alive.
    fn is_alive(&self, ctx: &RequestContext, pid: u32) -> BoxFuture<'_, Result<bool>>;

    /// Kill every process running `program`; returns how many were signalled.
    fn terminate_all(&self, ctx: &RequestContext, program: PathBuf)
    -> BoxFuture<'_, Result<usize>>;
}
