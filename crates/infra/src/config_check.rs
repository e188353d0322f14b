//! Config loading helpers for CLI surfaces.

use crate::InfraResult;
use codebase_index_config::{
    IndexerEnv, ValidatedIndexerConfig, load_config_from_path, to_pretty_json,
};
use codebase_index_shared::ErrorEnvelope;
use std::collections::BTreeMap;
use std::path::Path;

/// Load and validate the effective config from an env map, a file and overrides.
pub fn load_effective_config(
    env: &BTreeMap<String, String>,
    config_path: Option<&Path>,
    overrides_json: Option<&str>,
) -> InfraResult<(ValidatedIndexerConfig, IndexerEnv)> {
    let env = IndexerEnv::from_map(env).map_err(ErrorEnvelope::from)?;
    let config = load_config_from_path(config_path, overrides_json, &env)?;
    Ok((config, env))
}

/// Load and validate the effective config, returning deterministic pretty JSON.
pub fn load_effective_config_json(
    env: &BTreeMap<String, String>,
    config_path: Option<&Path>,
    overrides_json: Option<&str>,
) -> InfraResult<String> {
    let (config, _) = load_effective_config(env, config_path, overrides_json)?;
    to_pretty_json(&config)
}
