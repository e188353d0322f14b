//! Reader for the registry file written by the running sidecar.

use codebase_index_domain::{ServiceRegistry, ServiceRegistryEntry};
use codebase_index_ports::{BoxFuture, ServiceRegistryPort};
use codebase_index_shared::{RequestContext, Result};
use std::path::PathBuf;

/// Reads `.well-known.json`; absent or malformed files list no services.
#[derive(Debug, Clone)]
pub struct WellKnownRegistry {
    path: PathBuf,
}

impl WellKnownRegistry {
    /// Registry at `path`.
    #[must_use]
    pub const fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl ServiceRegistryPort for WellKnownRegistry {
    fn list_services(
        &self,
        ctx: &RequestContext,
    ) -> BoxFuture<'_, Result<Vec<ServiceRegistryEntry>>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("registry.list_services")?;
            let bytes = match tokio::fs::read(&self.path).await {
                Ok(bytes) => bytes,
                Err(error) => {
                    tracing::debug!(path = %self.path.display(), %error, "service registry unavailable");
                    return Ok(Vec::new());
                },
            };
            match serde_json::from_slice::<ServiceRegistry>(&bytes) {
                Ok(registry) => Ok(registry.services),
                Err(error) => {
                    tracing::debug!(path = %self.path.display(), %error, "service registry malformed");
                    Ok(Vec::new())
                },
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codebase_index_domain::ServiceStatus;

    #[tokio::test]
    async fn missing_and_malformed_files_list_nothing() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join(".well-known.json");
        let registry = WellKnownRegistry::new(path.clone());
        let ctx = RequestContext::new_request();

        assert!(registry.list_services(&ctx).await?.is_empty());
        tokio::fs::write(&path, b"[1, 2").await?;
        assert!(registry.list_services(&ctx).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn lookup_ignores_executable_suffix() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join(".well-known.json");
        tokio::fs::write(
            &path,
            br#"{"services":[{"name":"codebase-indexer.exe","status":"running","protocol":"http","port":11380}]}"#,
        )
        .await?;
        let registry = WellKnownRegistry::new(path);

        let entry = registry
            .get_service_config(&RequestContext::new_request(), "codebase-indexer")
            .await?;
        assert_eq!(entry.as_ref().map(|entry| entry.status), Some(ServiceStatus::Running));
        assert_eq!(entry.map(|entry| entry.endpoint()).as_deref(), Some("http://localhost:11380"));
        Ok(())
    }
}
