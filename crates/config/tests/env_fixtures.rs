//! Integration tests for env parsing and env-to-config merging.

use codebase_index_config::{EnvParseError, IndexerConfig, IndexerEnv, apply_env_overrides};
use codebase_index_shared::{ErrorCode, ErrorEnvelope};
use std::collections::BTreeMap;
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

fn workspace_root() -> PathBuf {
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    manifest_dir
        .parent()
        .and_then(Path::parent)
        .map_or_else(|| manifest_dir.to_path_buf(), Path::to_path_buf)
}

fn read_env_map(relative: &str) -> Result<BTreeMap<String, String>, Box<dyn Error>> {
    let path = workspace_root().join("tests").join("fixtures").join(relative);
    Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
}

#[test]
fn env_fixture_merges_into_effective_config() -> Result<(), Box<dyn Error>> {
    let env = IndexerEnv::from_map(&read_env_map("env/indexer-env.valid.json")?)?;
    let config = apply_env_overrides(IndexerConfig::default(), &env)?;

    assert_eq!(config.catalog.base_url, "https://cdn.example.net/cbi");
    assert_eq!(config.supervisor.listen_port, 11_999);
    assert!(!config.monitor.enabled);
    assert_eq!(config.monitor.debounce_ms, 2_500);
    assert_eq!(config.monitor.batch_size, 20);

    assert_eq!(env.provider.as_deref(), Some("costrict"));
    assert_eq!(env.feature_enabled, Some(true));
    assert_eq!(env.auth_token.as_ref().map(|token| token.expose()), Some("fixture-token"));
    Ok(())
}

#[test]
fn invalid_env_fixture_fails_fast() -> Result<(), Box<dyn Error>> {
    let error = IndexerEnv::from_map(&read_env_map("env/indexer-env.invalid-bool.json")?)
        .err()
        .ok_or("expected an env error")?;
    assert!(matches!(error, EnvParseError::InvalidBool { .. }));

    let envelope = ErrorEnvelope::from(error);
    assert_eq!(envelope.code, ErrorCode::new("config", "invalid_env_bool"));
    assert_eq!(envelope.metadata.get("value").map(String::as_str), Some("sometimes"));
    Ok(())
}

#[test]
fn env_values_still_pass_validation() -> Result<(), Box<dyn Error>> {
    let mut map = BTreeMap::new();
    map.insert("CBI_BATCH_SIZE".to_owned(), "0".to_owned());
    let env = IndexerEnv::from_map(&map)?;
    let error = apply_env_overrides(IndexerConfig::default(), &env)
        .err()
        .ok_or("expected a validation error")?;
    assert_eq!(error.code, ErrorCode::new("config", "invalid_limit"));
    Ok(())
}
