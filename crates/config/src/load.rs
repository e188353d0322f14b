//! Config loading helpers (file + overrides + env).
//!
//! The loader owns the merge order and surfaces every failure as a typed
//! `ErrorEnvelope`.

use crate::{IndexerConfig, IndexerEnv, ValidatedIndexerConfig, apply_env_overrides};
use codebase_index_shared::{ErrorClass, ErrorCode, ErrorEnvelope};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigFormat {
    Json,
    Toml,
}

/// Load the config from in-memory sources.
///
/// Precedence (highest wins):
/// - env overrides (`IndexerEnv`)
/// - overrides JSON (partial config)
/// - config JSON
/// - defaults
pub fn load_config_from_sources(
    config_json: Option<&str>,
    overrides_json: Option<&str>,
    env: &IndexerEnv,
) -> Result<ValidatedIndexerConfig, ErrorEnvelope> {
    let mut config = match config_json {
        None => IndexerConfig::default(),
        Some(input) => parse_config_unvalidated(input, ConfigFormat::Json)?,
    };
    if let Some(input) = overrides_json {
        parse_overrides_json(input)?.apply_to(&mut config);
    }
    apply_env_overrides(config, env)
}

/// Load the config from an optional JSON or TOML file.
///
/// Precedence matches [`load_config_from_sources`].
pub fn load_config_from_path(
    config_path: Option<&Path>,
    overrides_json: Option<&str>,
    env: &IndexerEnv,
) -> Result<ValidatedIndexerConfig, ErrorEnvelope> {
    let mut config = match config_path {
        None => IndexerConfig::default(),
        Some(path) => {
            let format = detect_config_format(path)?;
            let text = read_config_file(path)?;
            parse_config_unvalidated(&text, format)?
        },
    };
    if let Some(input) = overrides_json {
        parse_overrides_json(input)?.apply_to(&mut config);
    }
    apply_env_overrides(config, env)
}

/// Load using the process environment.
pub fn load_config_std_env(
    config_path: Option<&Path>,
    overrides_json: Option<&str>,
) -> Result<ValidatedIndexerConfig, ErrorEnvelope> {
    let env = IndexerEnv::from_std_env()?;
    load_config_from_path(config_path, overrides_json, &env)
}

/// Apply a partial JSON update over an already validated config.
///
/// Unknown fields are rejected and the result is validated again, so a bad
/// update leaves the caller's config untouched.
pub fn apply_partial_json(
    current: &ValidatedIndexerConfig,
    partial_json: &str,
) -> Result<ValidatedIndexerConfig, ErrorEnvelope> {
    let overrides = parse_overrides_json(partial_json)?;
    apply_partial(current, &overrides)
}

/// Typed variant of [`apply_partial_json`].
pub fn apply_partial(
    current: &ValidatedIndexerConfig,
    overrides: &IndexerConfigOverrides,
) -> Result<ValidatedIndexerConfig, ErrorEnvelope> {
    let mut config = current.as_config().clone();
    overrides.apply_to(&mut config);
    config.validate_and_normalize().map_err(Into::into)
}

/// Serialize as pretty JSON with a trailing newline.
pub fn to_pretty_json(config: &IndexerConfig) -> Result<String, ErrorEnvelope> {
    let mut output = serde_json::to_string_pretty(config).map_err(|error| {
        ErrorEnvelope::unexpected(
            ErrorCode::new("config", "serialize_json"),
            format!("failed to serialize config JSON: {error}"),
            ErrorClass::NonRetriable,
        )
    })?;
    output.push('\n');
    Ok(output)
}

/// Serialize as pretty TOML with a trailing newline.
pub fn to_pretty_toml(config: &IndexerConfig) -> Result<String, ErrorEnvelope> {
    let mut output = toml::to_string_pretty(config).map_err(|error| {
        ErrorEnvelope::unexpected(
            ErrorCode::new("config", "serialize_toml"),
            format!("failed to serialize config TOML: {error}"),
            ErrorClass::NonRetriable,
        )
    })?;
    output.push('\n');
    Ok(output)
}

fn parse_config_unvalidated(input: &str, format: ConfigFormat) -> Result<IndexerConfig, ErrorEnvelope> {
    match format {
        ConfigFormat::Json => serde_json::from_str(input).map_err(|error| {
            ErrorEnvelope::expected(
                ErrorCode::new("config", "invalid_json"),
                format!("invalid config JSON: {error}"),
            )
            .with_metadata("source", "config")
        }),
        ConfigFormat::Toml => toml::from_str(input).map_err(|error| {
            ErrorEnvelope::expected(
                ErrorCode::new("config", "invalid_toml"),
                format!("invalid config TOML: {error}"),
            )
            .with_metadata("source", "config")
        }),
    }
}

fn parse_overrides_json(input: &str) -> Result<IndexerConfigOverrides, ErrorEnvelope> {
    serde_json::from_str(input).map_err(|error| {
        ErrorEnvelope::expected(
            ErrorCode::new("config", "invalid_json"),
            format!("invalid overrides JSON: {error}"),
        )
        .with_metadata("source", "overrides")
    })
}

fn read_config_file(path: &Path) -> Result<String, ErrorEnvelope> {
    std::fs::read_to_string(path).map_err(|error| {
        let code = match error.kind() {
            std::io::ErrorKind::NotFound => "config_file_not_found",
            std::io::ErrorKind::PermissionDenied => "config_file_permission_denied",
            _ => "config_file_io",
        };
        ErrorEnvelope::expected(
            ErrorCode::new("config", code),
            format!("failed to read config file: {error}"),
        )
        .with_metadata("path", path.display().to_string())
    })
}

fn detect_config_format(path: &Path) -> Result<ConfigFormat, ErrorEnvelope> {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        None | Some("json") => Ok(ConfigFormat::Json),
        Some("toml") => Ok(ConfigFormat::Toml),
        Some(other) => Err(ErrorEnvelope::expected(
            ErrorCode::new("config", "unsupported_format"),
            "unsupported config format; use .json or .toml",
        )
        .with_metadata("extension", other.to_owned())),
    }
}

/// Partial config: every field optional, unknown fields rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct IndexerConfigOverrides {
    /// Product overrides.
    pub product: ProductOverrides,
    /// Catalog overrides.
    pub catalog: CatalogOverrides,
    /// Supervisor overrides.
    pub supervisor: SupervisorOverrides,
    /// Monitor overrides.
    pub monitor: MonitorOverrides,
    /// Ignore overrides.
    pub ignore: IgnoreOverrides,
    /// Provider overrides.
    pub provider: ProviderOverrides,
}

/// Partial `product` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct ProductOverrides {
    /// Replaces `dirName`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir_name: Option<String>,
    /// Replaces `binaryName`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binary_name: Option<String>,
    /// Replaces `homeDir`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub home_dir: Option<PathBuf>,
}

/// Partial `catalog` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct CatalogOverrides {
    /// Replaces `baseUrl`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Replaces `timeoutMs`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Replaces `publicKeyPem`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key_pem: Option<String>,
}

/// Partial `supervisor` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct SupervisorOverrides {
    /// Replaces `listenPort`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listen_port: Option<u16>,
    /// Replaces `serviceName`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    /// Replaces `healthIntervalMs`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health_interval_ms: Option<u64>,
    /// Replaces `healthTimeoutMs`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health_timeout_ms: Option<u64>,
    /// Replaces `maxFailureCount`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_failure_count: Option<u32>,
    /// Replaces `startAttempts`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_attempts: Option<u32>,
    /// Replaces `startBackoffMs`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_backoff_ms: Option<u64>,
    /// Replaces `runningPollMs`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub running_poll_ms: Option<u64>,
    /// Replaces `runningPollAttempts`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub running_poll_attempts: Option<u32>,
    /// Replaces `registryPollFastMs`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registry_poll_fast_ms: Option<u64>,
    /// Replaces `registryFastWindowMs`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registry_fast_window_ms: Option<u64>,
    /// Replaces `registryPollSlowMs`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registry_poll_slow_ms: Option<u64>,
    /// Replaces `staleDownloadMs`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stale_download_ms: Option<u64>,
    /// Replaces `downloadWaitPollMs`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_wait_poll_ms: Option<u64>,
    /// Replaces `downloadWaitTimeoutMs`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_wait_timeout_ms: Option<u64>,
    /// Replaces `downloadAttempts`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_attempts: Option<u32>,
    /// Replaces `downloadBaseDelayMs`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_base_delay_ms: Option<u64>,
}

/// Partial `monitor` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct MonitorOverrides {
    /// Replaces `enabled`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Replaces `debounceMs`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debounce_ms: Option<u64>,
    /// Replaces `batchSize`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<u32>,
    /// Replaces `maxRetries`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    /// Replaces `retryDelayMs`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_delay_ms: Option<u64>,
    /// Replaces `maxRetryDelayMs`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_retry_delay_ms: Option<u64>,
    /// Replaces `retryBudgetMs`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_budget_ms: Option<u64>,
    /// Replaces `contentCacheCapacity`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_cache_capacity: Option<u32>,
}

/// Partial `ignore` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct IgnoreOverrides {
    /// Replaces `files`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<String>>,
}

/// Partial `provider` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct ProviderOverrides {
    /// Replaces `expectedKind`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_kind: Option<String>,
}

impl IndexerConfigOverrides {
    /// True when no field is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// True when any monitor-level field is set.
    #[must_use]
    pub fn touches_monitor(&self) -> bool {
        self.monitor != MonitorOverrides::default() || self.ignore.files.is_some()
    }

    /// Overwrite every field that is set.
    pub fn apply_to(&self, config: &mut IndexerConfig) {
        let product = &self.product;
        set_clone(&mut config.product.dir_name, product.dir_name.as_ref());
        set_clone(&mut config.product.binary_name, product.binary_name.as_ref());
        if product.home_dir.is_some() {
            config.product.home_dir.clone_from(&product.home_dir);
        }

        let catalog = &self.catalog;
        set_clone(&mut config.catalog.base_url, catalog.base_url.as_ref());
        set(&mut config.catalog.timeout_ms, catalog.timeout_ms);
        set_clone(&mut config.catalog.public_key_pem, catalog.public_key_pem.as_ref());

        self.apply_supervisor(config);

        let monitor = &self.monitor;
        let target = &mut config.monitor;
        set(&mut target.enabled, monitor.enabled);
        set(&mut target.debounce_ms, monitor.debounce_ms);
        set(&mut target.batch_size, monitor.batch_size);
        set(&mut target.max_retries, monitor.max_retries);
        set(&mut target.retry_delay_ms, monitor.retry_delay_ms);
        set(&mut target.max_retry_delay_ms, monitor.max_retry_delay_ms);
        set(&mut target.retry_budget_ms, monitor.retry_budget_ms);
        set(&mut target.content_cache_capacity, monitor.content_cache_capacity);

        set_clone(&mut config.ignore.files, self.ignore.files.as_ref());
        set_clone(&mut config.provider.expected_kind, self.provider.expected_kind.as_ref());
    }

    fn apply_supervisor(&self, config: &mut IndexerConfig) {
        let s = &self.supervisor;
        let target = &mut config.supervisor;
        set(&mut target.listen_port, s.listen_port);
        set_clone(&mut target.service_name, s.service_name.as_ref());
        set(&mut target.health_interval_ms, s.health_interval_ms);
        set(&mut target.health_timeout_ms, s.health_timeout_ms);
        set(&mut target.max_failure_count, s.max_failure_count);
        set(&mut target.start_attempts, s.start_attempts);
        set(&mut target.start_backoff_ms, s.start_backoff_ms);
        set(&mut target.running_poll_ms, s.running_poll_ms);
        set(&mut target.running_poll_attempts, s.running_poll_attempts);
        set(&mut target.registry_poll_fast_ms, s.registry_poll_fast_ms);
        set(&mut target.registry_fast_window_ms, s.registry_fast_window_ms);
        set(&mut target.registry_poll_slow_ms, s.registry_poll_slow_ms);
        set(&mut target.stale_download_ms, s.stale_download_ms);
        set(&mut target.download_wait_poll_ms, s.download_wait_poll_ms);
        set(&mut target.download_wait_timeout_ms, s.download_wait_timeout_ms);
        set(&mut target.download_attempts, s.download_attempts);
        set(&mut target.download_base_delay_ms, s.download_base_delay_ms);
    }
}

fn set<T: Copy>(field: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *field = value;
    }
}

fn set_clone<T: Clone>(field: &mut T, value: Option<&T>) {
    if let Some(value) = value {
        field.clone_from(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn override_precedence_is_deterministic() -> Result<(), Box<dyn Error>> {
        let config_json = r#"{ "version": 1, "monitor": { "debounceMs": 2000, "batchSize": 10 } }"#;
        let overrides_json = r#"{ "monitor": { "debounceMs": 3000 } }"#;
        let env = IndexerEnv {
            debounce_ms: Some(4_000),
            ..IndexerEnv::default()
        };

        let config = load_config_from_sources(Some(config_json), Some(overrides_json), &env)?;
        assert_eq!(config.monitor.debounce_ms, 4_000);
        assert_eq!(config.monitor.batch_size, 10);

        let config =
            load_config_from_sources(Some(config_json), Some(overrides_json), &IndexerEnv::default())?;
        assert_eq!(config.monitor.debounce_ms, 3_000);
        Ok(())
    }

    #[test]
    fn serialization_is_deterministic() -> Result<(), Box<dyn Error>> {
        let config = IndexerConfig::default();
        let first = to_pretty_json(&config)?;
        assert_eq!(first, to_pretty_json(&config)?);
        assert!(first.ends_with('\n'));
        let toml = to_pretty_toml(&config)?;
        assert!(toml.contains("[monitor]"));
        Ok(())
    }

    #[test]
    fn partial_update_revalidates() -> Result<(), Box<dyn Error>> {
        let current = IndexerConfig::default().validate_and_normalize()?;

        let updated = apply_partial_json(&current, r#"{ "monitor": { "enabled": false, "batchSize": 7 } }"#)?;
        assert!(!updated.monitor.enabled);
        assert_eq!(updated.monitor.batch_size, 7);
        assert_eq!(updated.supervisor, current.supervisor);

        let error = apply_partial_json(&current, r#"{ "monitor": { "batchSize": 0 } }"#).err();
        assert!(error.is_some_and(|error| error.has_code("config", "invalid_limit")));

        let error = apply_partial_json(&current, r#"{ "monitor": { "bogus": 1 } }"#).err();
        assert!(error.is_some_and(|error| error.has_code("config", "invalid_json")));
        Ok(())
    }

    #[test]
    fn overrides_report_monitor_changes() -> Result<(), Box<dyn Error>> {
        let overrides: IndexerConfigOverrides =
            serde_json::from_str(r#"{ "ignore": { "files": [".gitignore"] } }"#)?;
        assert!(overrides.touches_monitor());
        assert!(!overrides.is_empty());
        assert!(IndexerConfigOverrides::default().is_empty());
        Ok(())
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let error = load_config_from_path(Some(Path::new("cbi.yaml")), None, &IndexerEnv::default()).err();
        assert!(error.is_some_and(|error| error.has_code("config", "unsupported_format")));
    }
}
