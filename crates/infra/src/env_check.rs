//! Environment validation helpers for CLI surfaces.

use codebase_index_config::{IndexerConfig, IndexerEnv, apply_env_overrides};
use codebase_index_shared::ErrorEnvelope;
use std::collections::BTreeMap;

/// Infra-level error type (shared error envelope).
pub type InfraError = ErrorEnvelope;

/// Infra-level result type.
pub type InfraResult<T> = Result<T, InfraError>;

/// Validate that the provided `CBI_*` variables parse and merge into a valid config.
pub fn validate_env_parsing(env: &BTreeMap<String, String>) -> InfraResult<IndexerEnv> {
    let parsed = IndexerEnv::from_map(env).map_err(ErrorEnvelope::from)?;
    let _ = apply_env_overrides(IndexerConfig::default(), &parsed)?;
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use codebase_index_config::{ENV_AUTH_TOKEN, ENV_PROVIDER};

    #[test]
    fn accepts_empty_env() -> InfraResult<()> {
        let parsed = validate_env_parsing(&BTreeMap::new())?;
        assert!(parsed.provider.is_none());
        Ok(())
    }

    #[test]
    fn keeps_provider_fields() -> InfraResult<()> {
        let env = BTreeMap::from([
            (ENV_PROVIDER.to_owned(), "costrict".to_owned()),
            (ENV_AUTH_TOKEN.to_owned(), "tok-123".to_owned()),
        ]);
        let parsed = validate_env_parsing(&env)?;
        assert_eq!(parsed.provider.as_deref(), Some("costrict"));
        assert!(parsed.auth_token.is_some());
        Ok(())
    }

    #[test]
    fn rejects_malformed_port() {
        let env = BTreeMap::from([("CBI_LISTEN_PORT".to_owned(), "port".to_owned())]);
        let error = match validate_env_parsing(&env) {
            Ok(_) => panic!("expected a parse failure"),
            Err(error) => error,
        };
        assert_eq!(error.code.namespace(), "config");
    }
}
