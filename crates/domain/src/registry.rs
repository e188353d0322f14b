//! Service registry written by the running sidecar.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Suffix trimmed from service names before lookup.
pub const EXECUTABLE_SUFFIX: &str = ".exe";

/// Status of one sidecar sub-service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    /// Accepting requests.
    Running,
    /// Booting.
    Starting,
    /// Shut down.
    Stopped,
    /// Anything else the sidecar may report.
    #[serde(other)]
    Unknown,
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::Running => "running",
            Self::Starting => "starting",
            Self::Stopped => "stopped",
            Self::Unknown => "unknown",
        })
    }
}

/// One entry of the registry file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRegistryEntry {
    /// Service name as written by the sidecar.
    pub name: String,
    /// Current status.
    pub status: ServiceStatus,
    /// Transport protocol (`http`).
    #[serde(default = "default_protocol")]
    pub protocol: String,
    /// Local port.
    pub port: u16,
}

fn default_protocol() -> String {
    "http".to_owned()
}

impl ServiceRegistryEntry {
    /// Only running entries are authoritative.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.status == ServiceStatus::Running
    }

    /// `protocol://localhost:port`
    #[must_use]
    pub fn endpoint(&self) -> String {
        format!("{}://localhost:{}", self.protocol, self.port)
    }
}

/// Contents of the registry file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRegistry {
    /// Known services.
    #[serde(default)]
    pub services: Vec<ServiceRegistryEntry>,
}

/// Service name with the executable suffix removed.
#[must_use]
pub fn normalize_service_name(name: &str) -> &str {
    let trimmed = name.trim();
    trimmed.strip_suffix(EXECUTABLE_SUFFIX).unwrap_or(trimmed)
}

impl ServiceRegistry {
    /// Look up a service by name, ignoring the executable suffix on either side.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&ServiceRegistryEntry> {
        let wanted = normalize_service_name(name);
        self.services
            .iter()
            .find(|entry| normalize_service_name(&entry.name) == wanted)
    }
}
