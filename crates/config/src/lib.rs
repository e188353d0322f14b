//! # codebase-index-config
//!
//! Configuration schema, validation, env overrides and loading for the
//! sidecar manager, plus the on-disk product layout derived from it.
//! This crate depends on `domain` and `shared` only.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

/// Environment variable parsing and merging.
pub mod env;
/// Config loading helpers (file + overrides + env).
pub mod load;
/// Product directory layout.
pub mod paths;
/// Configuration schema types and helpers.
pub mod schema;

pub use env::{
    ENV_AUTH_TOKEN, ENV_FEATURE_ENABLED, ENV_HOME, ENV_LOG, ENV_PROVIDER, EnvParseError,
    IndexerEnv, apply_env_overrides,
};
pub use load::{
    IndexerConfigOverrides, apply_partial, apply_partial_json, load_config_from_path,
    load_config_from_sources, load_config_std_env, to_pretty_json, to_pretty_toml,
};
pub use paths::ProductPaths;
pub use schema::{
    CURRENT_CONFIG_VERSION, CatalogConfig, ConfigSchemaError, DEFAULT_PUBLIC_KEY_PEM,
    IgnoreConfig, IndexerConfig, MonitorConfig, ProductConfig, ProviderConfig, SupervisorConfig,
    ValidatedIndexerConfig, parse_indexer_config_json, parse_indexer_config_toml,
};

/// Returns the config crate version.
#[must_use]
pub const fn config_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
