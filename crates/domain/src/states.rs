//! Supervisor lifecycle states and install outcomes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of the supervised sidecar.
///
/// `Failed` is reachable from `Installing` and `Starting`; `Degraded` means
/// the health check has started failing but the restart threshold has not
/// been crossed yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClientState {
    /// No verified artifact on disk.
    #[default]
    Uninstalled,
    /// Downloading and verifying.
    Installing,
    /// Verified artifact present, process not running.
    Installed,
    /// Spawned, waiting for the process and its service registry entry.
    Starting,
    /// Healthy.
    Running,
    /// At least one failed health check.
    Degraded,
    /// Stop, upgrade check and start in progress.
    Restarting,
    /// Install or start gave up.
    Failed,
}

impl ClientState {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Uninstalled => "uninstalled",
            Self::Installing => "installing",
            Self::Installed => "installed",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Degraded => "degraded",
            Self::Restarting => "restarting",
            Self::Failed => "failed",
        }
    }

    /// True while a process is expected to be alive.
    #[must_use]
    pub const fn expects_process(self) -> bool {
        matches!(self, Self::Running | Self::Degraded)
    }
}

impl fmt::Display for ClientState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Result of one install/upgrade decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UpgradeOutcome {
    /// No usable install existed; the latest version was installed.
    FirstInstall,
    /// A newer version replaced the installed one.
    Upgraded,
    /// The installed version is current.
    NoUpdate,
    /// The download or verification failed, or a concurrent install never finished.
    Failed,
}

impl UpgradeOutcome {
    /// True when a usable artifact is on disk afterwards.
    #[must_use]
    pub const fn is_installed(self) -> bool {
        !matches!(self, Self::Failed)
    }
}

impl fmt::Display for UpgradeOutcome {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::FirstInstall => "firstInstall",
            Self::Upgraded => "upgraded",
            Self::NoUpdate => "noUpdate",
            Self::Failed => "failed",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_serialize_as_snake_case() -> Result<(), serde_json::Error> {
        assert_eq!(serde_json::to_value(ClientState::Restarting)?, "restarting");
        assert_eq!(serde_json::to_value(UpgradeOutcome::FirstInstall)?, "firstInstall");
        assert_eq!(ClientState::default(), ClientState::Uninstalled);
        Ok(())
    }

    #[test]
    fn only_failed_outcome_lacks_install() {
        assert!(UpgradeOutcome::NoUpdate.is_installed());
        assert!(!UpgradeOutcome::Failed.is_installed());
        assert!(ClientState::Degraded.expects_process());
        assert!(!ClientState::Starting.expects_process());
    }
}
