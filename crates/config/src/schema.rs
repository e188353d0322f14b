//! Indexer configuration schema, defaults and validation.
//!
//! Parsing is strict (`deny_unknown_fields`), every field has a default, and
//! validation returns typed [`ConfigSchemaError`]s that map onto
//! `ErrorEnvelope`s with section/field metadata.

use codebase_index_shared::{ErrorCode, ErrorEnvelope, RetryBudget, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Current supported configuration schema version.
pub const CURRENT_CONFIG_VERSION: u32 = 1;

/// Distributor key used to verify artifact signatures.
pub const DEFAULT_PUBLIC_KEY_PEM: &str = concat!(
    "-----BEGIN PUBLIC KEY-----\n",
    "MIIBIjANBgkqhkiG9w0BAQEFAAOCAQ8AMIIBCgKCAQEAp72lOp4usn4Njz7OcWCJ\n",
    "94FJibmdLN5hx6zAzoiYx4nrRd1Zjsdhuy9BuyeOCFbpPEVHZeyyi1EFMsD0rDk1\n",
    "SXX6+wrtUIOB2ecdMcra4ryc/tJwwSe5LEG6/6QmYYx1um/0hjnmx2OHQjc3ni/Y\n",
    "AMro/mO9ZLLAJA1YIhWeZ0phe42KFEryDibpeyw0sjShkOxmAdfLYJ4bjBuuSCLx\n",
    "zCYIf09sX/+7Yj0olBt69LW40sqJhS4DoW/Eyee5Uyh+aAQiYwVklClIb3AUXXY4\n",
    "irxR2uQhOSoglBINZ731Lg2euSPvZhdD9pjZBSQdmYgcoBiuH/NzKfNtsRvqK78h\n",
    "1wIDAQAB\n",
    "-----END PUBLIC KEY-----\n",
);

const PEM_HEADER: &str = "-----BEGIN PUBLIC KEY-----";

const CATALOG_TIMEOUT_MIN_MS: u64 = 1_000;
const CATALOG_TIMEOUT_MAX_MS: u64 = 600_000;

const INTERVAL_MIN_MS: u64 = 1;
const INTERVAL_MAX_MS: u64 = 3_600_000;
const WINDOW_MAX_MS: u64 = 86_400_000;

const ATTEMPTS_MIN: u64 = 1;
const ATTEMPTS_MAX: u64 = 20;
const FAILURE_COUNT_MAX: u64 = 100;

const DEBOUNCE_MIN_MS: u64 = 10;
const DEBOUNCE_MAX_MS: u64 = 60_000;
const BATCH_SIZE_MIN: u64 = 1;
const BATCH_SIZE_MAX: u64 = 10_000;
const MAX_RETRIES_MAX: u64 = 20;
const RETRY_BUDGET_MAX_MS: u64 = 600_000;
const CACHE_CAPACITY_MIN: u64 = 1;
const CACHE_CAPACITY_MAX: u64 = 100_000;
const IGNORE_FILES_MAX: usize = 16;
const PORT_MIN: u64 = 1;

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct IndexerConfig {
    /// Schema version.
    pub version: u32,
    /// Install location.
    pub product: ProductConfig,
    /// Release catalog.
    pub catalog: CatalogConfig,
    /// Process supervision.
    pub supervisor: SupervisorConfig,
    /// Workspace event pipeline.
    pub monitor: MonitorConfig,
    /// Ignore policy.
    pub ignore: IgnoreConfig,
    /// Provider gating.
    pub provider: ProviderConfig,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            version: CURRENT_CONFIG_VERSION,
            product: ProductConfig::default(),
            catalog: CatalogConfig::default(),
            supervisor: SupervisorConfig::default(),
            monitor: MonitorConfig::default(),
            ignore: IgnoreConfig::default(),
            provider: ProviderConfig::default(),
        }
    }
}

/// Where the product lives on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct ProductConfig {
    /// Directory under the home directory (`~/.codebase-index`).
    pub dir_name: String,
    /// Executable base name, without extension.
    pub binary_name: String,
    /// Home directory override; the user's home when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub home_dir: Option<PathBuf>,
}

impl Default for ProductConfig {
    fn default() -> Self {
        Self {
            dir_name: ".codebase-index".to_owned(),
            binary_name: "codebase-indexer".to_owned(),
            home_dir: None,
        }
    }
}

/// Remote release catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct CatalogConfig {
    /// Base URL; catalog, package and artifact paths are appended to it.
    pub base_url: String,
    /// Per-request timeout for catalog and package metadata calls.
    pub timeout_ms: u64,
    /// SPKI PEM of the distributor signing key.
    pub public_key_pem: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: "https://releases.example.com/codebase-indexer".to_owned(),
            timeout_ms: 30_000,
            public_key_pem: DEFAULT_PUBLIC_KEY_PEM.to_owned(),
        }
    }
}

/// Install, start and health-check cadence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct SupervisorConfig {
    /// Port passed as `--listen localhost:<port>`.
    pub listen_port: u16,
    /// Registry name of the sub-service to wait for.
    pub service_name: String,
    /// Health check period.
    pub health_interval_ms: u64,
    /// Timeout of one liveness probe.
    pub health_timeout_ms: u64,
    /// Consecutive failures tolerated before a restart.
    pub max_failure_count: u32,
    /// Start attempts before giving up.
    pub start_attempts: u32,
    /// Linear start backoff unit (`attempt * startBackoffMs`).
    pub start_backoff_ms: u64,
    /// Interval between liveness polls after spawning.
    pub running_poll_ms: u64,
    /// Liveness polls per start attempt.
    pub running_poll_attempts: u32,
    /// Registry poll interval during the fast window.
    pub registry_poll_fast_ms: u64,
    /// Length of the fast registry polling window.
    pub registry_fast_window_ms: u64,
    /// Registry poll interval after the fast window.
    pub registry_poll_slow_ms: u64,
    /// Age after which a `downloading` record is considered abandoned.
    pub stale_download_ms: u64,
    /// Poll interval while waiting on another installer.
    pub download_wait_poll_ms: u64,
    /// Give up waiting on another installer after this long.
    pub download_wait_timeout_ms: u64,
    /// Download attempts, including the first.
    pub download_attempts: u32,
    /// Delay before the first download retry; doubles each retry.
    pub download_base_delay_ms: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            listen_port: 11_380,
            service_name: "codebase-indexer".to_owned(),
            health_interval_ms: 60_000,
            health_timeout_ms: 5_000,
            max_failure_count: 2,
            start_attempts: 3,
            start_backoff_ms: 1_000,
            running_poll_ms: 1_000,
            running_poll_attempts: 5,
            registry_poll_fast_ms: 5_000,
            registry_fast_window_ms: 300_000,
            registry_poll_slow_ms: 30_000,
            stale_download_ms: 60_000,
            download_wait_poll_ms: 10_000,
            download_wait_timeout_ms: 120_000,
            download_attempts: 3,
            download_base_delay_ms: 1_000,
        }
    }
}

/// Workspace event pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct MonitorConfig {
    /// Master switch for event relaying.
    pub enabled: bool,
    /// Quiet period before a buffered flush.
    pub debounce_ms: u64,
    /// Buffer size forcing an immediate flush.
    pub batch_size: u32,
    /// Retries per batch after the first attempt.
    pub max_retries: u32,
    /// Base delay of the delivery backoff.
    pub retry_delay_ms: u64,
    /// Cap of a single delivery backoff delay.
    pub max_retry_delay_ms: u64,
    /// Wall-clock budget for one batch, retries included.
    pub retry_budget_ms: u64,
    /// Entries kept by the document content cache.
    pub content_cache_capacity: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_ms: 1_000,
            batch_size: 100,
            max_retries: 2,
            retry_delay_ms: 1_000,
            max_retry_delay_ms: 10_000,
            retry_budget_ms: 30_000,
            content_cache_capacity: 500,
        }
    }
}

/// Ignore files merged into one rule set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct IgnoreConfig {
    /// File names at the workspace root, in merge order.
    pub files: Vec<String>,
}

impl Default for IgnoreConfig {
    fn default() -> Self {
        Self {
            files: vec![
                ".gitignore".to_owned(),
                ".coignore".to_owned(),
                ".costrictignore".to_owned(),
            ],
        }
    }
}

/// Which provider enables the feature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct ProviderConfig {
    /// Provider kind that must be active.
    pub expected_kind: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            expected_kind: "costrict".to_owned(),
        }
    }
}

impl IndexerConfig {
    /// Normalize strings and lists, then check every bound.
    pub fn validate_and_normalize(mut self) -> Result<ValidatedIndexerConfig, ConfigSchemaError> {
        if self.version != CURRENT_CONFIG_VERSION {
            return Err(ConfigSchemaError::UnsupportedVersion {
                found: self.version,
                supported: CURRENT_CONFIG_VERSION,
            });
        }
        self.normalize();
        self.validate_product()?;
        self.validate_catalog()?;
        self.validate_supervisor()?;
        self.validate_monitor()?;
        self.validate_ignore()?;
        require_non_empty("provider", "expectedKind", &self.provider.expected_kind)?;
        Ok(ValidatedIndexerConfig { raw: self })
    }

    fn normalize(&mut self) {
        trim_in_place(&mut self.product.dir_name);
        trim_in_place(&mut self.product.binary_name);
        trim_in_place(&mut self.catalog.base_url);
        while self.catalog.base_url.ends_with('/') {
            self.catalog.base_url.pop();
        }
        trim_in_place(&mut self.supervisor.service_name);
        trim_in_place(&mut self.provider.expected_kind);

        let mut seen = Vec::with_capacity(self.ignore.files.len());
        for file in std::mem::take(&mut self.ignore.files) {
            let file = file.trim().to_owned();
            if !file.is_empty() && !seen.contains(&file) {
                seen.push(file);
            }
        }
        self.ignore.files = seen;
    }

    fn validate_product(&self) -> Result<(), ConfigSchemaError> {
        require_non_empty("product", "dirName", &self.product.dir_name)?;
        require_non_empty("product", "binaryName", &self.product.binary_name)?;
        if self.product.binary_name.contains(['/', '\\']) {
            return Err(ConfigSchemaError::InvalidValue {
                section: "product",
                field: "binaryName",
                reason: "must be a bare file name",
            });
        }
        Ok(())
    }

    fn validate_catalog(&self) -> Result<(), ConfigSchemaError> {
        let catalog = &self.catalog;
        match Url::parse(&catalog.base_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {},
            _ => {
                return Err(ConfigSchemaError::InvalidUrl {
                    section: "catalog",
                    field: "baseUrl",
                    value: sanitize_url_for_error(&catalog.base_url),
                });
            },
        }
        duration_in_range(
            "catalog",
            "timeoutMs",
            catalog.timeout_ms,
            CATALOG_TIMEOUT_MIN_MS,
            CATALOG_TIMEOUT_MAX_MS,
        )?;
        if !catalog.public_key_pem.trim_start().starts_with(PEM_HEADER) {
            return Err(ConfigSchemaError::InvalidValue {
                section: "catalog",
                field: "publicKeyPem",
                reason: "must be a PEM encoded public key",
            });
        }
        Ok(())
    }

    fn validate_supervisor(&self) -> Result<(), ConfigSchemaError> {
        let s = &self.supervisor;
        const SECTION: &str = "supervisor";
        limit_in_range(SECTION, "listenPort", u64::from(s.listen_port), PORT_MIN, u64::from(u16::MAX))?;
        require_non_empty(SECTION, "serviceName", &s.service_name)?;
        for (field, value) in [
            ("healthIntervalMs", s.health_interval_ms),
            ("healthTimeoutMs", s.health_timeout_ms),
            ("startBackoffMs", s.start_backoff_ms),
            ("runningPollMs", s.running_poll_ms),
            ("registryPollFastMs", s.registry_poll_fast_ms),
            ("registryPollSlowMs", s.registry_poll_slow_ms),
            ("downloadWaitPollMs", s.download_wait_poll_ms),
            ("downloadBaseDelayMs", s.download_base_delay_ms),
        ] {
            duration_in_range(SECTION, field, value, INTERVAL_MIN_MS, INTERVAL_MAX_MS)?;
        }
        for (field, value) in [
            ("registryFastWindowMs", s.registry_fast_window_ms),
            ("staleDownloadMs", s.stale_download_ms),
            ("downloadWaitTimeoutMs", s.download_wait_timeout_ms),
        ] {
            duration_in_range(SECTION, field, value, INTERVAL_MIN_MS, WINDOW_MAX_MS)?;
        }
        for (field, value) in [
            ("startAttempts", s.start_attempts),
            ("runningPollAttempts", s.running_poll_attempts),
            ("downloadAttempts", s.download_attempts),
        ] {
            limit_in_range(SECTION, field, u64::from(value), ATTEMPTS_MIN, ATTEMPTS_MAX)?;
        }
        limit_in_range(SECTION, "maxFailureCount", u64::from(s.max_failure_count), 0, FAILURE_COUNT_MAX)
    }

    fn validate_monitor(&self) -> Result<(), ConfigSchemaError> {
        let m = &self.monitor;
        const SECTION: &str = "monitor";
        duration_in_range(SECTION, "debounceMs", m.debounce_ms, DEBOUNCE_MIN_MS, DEBOUNCE_MAX_MS)?;
        limit_in_range(SECTION, "batchSize", u64::from(m.batch_size), BATCH_SIZE_MIN, BATCH_SIZE_MAX)?;
        limit_in_range(SECTION, "maxRetries", u64::from(m.max_retries), 0, MAX_RETRIES_MAX)?;
        duration_in_range(SECTION, "retryDelayMs", m.retry_delay_ms, INTERVAL_MIN_MS, INTERVAL_MAX_MS)?;
        duration_in_range(
            SECTION,
            "maxRetryDelayMs",
            m.max_retry_delay_ms,
            m.retry_delay_ms,
            INTERVAL_MAX_MS,
        )?;
        duration_in_range(SECTION, "retryBudgetMs", m.retry_budget_ms, INTERVAL_MIN_MS, RETRY_BUDGET_MAX_MS)?;
        limit_in_range(
            SECTION,
            "contentCacheCapacity",
            u64::from(m.content_cache_capacity),
            CACHE_CAPACITY_MIN,
            CACHE_CAPACITY_MAX,
        )
    }

    fn validate_ignore(&self) -> Result<(), ConfigSchemaError> {
        if self.ignore.files.len() > IGNORE_FILES_MAX {
            return Err(ConfigSchemaError::ListTooLarge {
                section: "ignore",
                field: "files",
                len: self.ignore.files.len(),
                max: IGNORE_FILES_MAX,
            });
        }
        if let Some(bad) = self.ignore.files.iter().find(|file| file.contains(['/', '\\'])) {
            return Err(ConfigSchemaError::InvalidIgnoreFile { file: bad.clone() });
        }
        Ok(())
    }
}

fn trim_in_place(value: &mut String) {
    let trimmed = value.trim();
    if trimmed.len() != value.len() {
        *value = trimmed.to_owned();
    }
}

fn require_non_empty(
    section: &'static str,
    field: &'static str,
    value: &str,
) -> Result<(), ConfigSchemaError> {
    if value.is_empty() {
        return Err(ConfigSchemaError::InvalidValue {
            section,
            field,
            reason: "must not be empty",
        });
    }
    Ok(())
}

const fn duration_in_range(
    section: &'static str,
    field: &'static str,
    value_ms: u64,
    min_ms: u64,
    max_ms: u64,
) -> Result<(), ConfigSchemaError> {
    if value_ms < min_ms || value_ms > max_ms {
        return Err(ConfigSchemaError::DurationOutOfRange {
            section,
            field,
            value_ms,
            min_ms,
            max_ms,
        });
    }
    Ok(())
}

const fn limit_in_range(
    section: &'static str,
    field: &'static str,
    value: u64,
    min: u64,
    max: u64,
) -> Result<(), ConfigSchemaError> {
    if value < min || value > max {
        return Err(ConfigSchemaError::LimitOutOfRange {
            section,
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}

/// Strip credentials before a URL ends up in an error message.
fn sanitize_url_for_error(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut parsed) => {
            if (!parsed.username().is_empty() || parsed.password().is_some())
                && (parsed.set_username("").is_err() || parsed.set_password(None).is_err())
            {
                return "[invalid url]".to_owned();
            }
            parsed.to_string()
        },
        Err(error) => format!("[invalid url: {error}]"),
    }
}

/// Config that passed [`IndexerConfig::validate_and_normalize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedIndexerConfig {
    raw: IndexerConfig,
}

impl ValidatedIndexerConfig {
    /// Borrow the raw config.
    #[must_use]
    pub const fn as_config(&self) -> &IndexerConfig {
        &self.raw
    }

    /// Consume the wrapper.
    #[must_use]
    pub fn into_inner(self) -> IndexerConfig {
        self.raw
    }

    /// Attempt-bounded policy for artifact downloads.
    #[must_use]
    pub fn download_retry_policy(&self) -> RetryPolicy {
        let s = &self.raw.supervisor;
        RetryPolicy {
            max_attempts: s.download_attempts,
            base_delay_ms: s.download_base_delay_ms,
            max_delay_ms: s
                .download_base_delay_ms
                .saturating_mul(1 << s.download_attempts.min(16)),
        }
    }

    /// Count- and time-bounded policy for event delivery.
    #[must_use]
    pub const fn delivery_budget(&self) -> RetryBudget {
        let m = &self.raw.monitor;
        RetryBudget {
            max_retries: m.max_retries,
            base_delay_ms: m.retry_delay_ms,
            max_delay_ms: m.max_retry_delay_ms,
            budget_ms: m.retry_budget_ms,
        }
    }

    /// Debounce interval.
    #[must_use]
    pub const fn debounce(&self) -> Duration {
        Duration::from_millis(self.raw.monitor.debounce_ms)
    }

    /// Health check period.
    #[must_use]
    pub const fn health_interval(&self) -> Duration {
        Duration::from_millis(self.raw.supervisor.health_interval_ms)
    }
}

impl AsRef<IndexerConfig> for ValidatedIndexerConfig {
    fn as_ref(&self) -> &IndexerConfig {
        &self.raw
    }
}

impl std::ops::Deref for ValidatedIndexerConfig {
    type Target = IndexerConfig;

    fn deref(&self) -> &Self::Target {
        &self.raw
    }
}

/// Schema validation failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigSchemaError {
    /// Unknown schema version.
    #[error("unsupported config version: {found} (supported: {supported})")]
    UnsupportedVersion {
        /// Version found in the config.
        found: u32,
        /// Version this binary understands.
        supported: u32,
    },
    /// A duration is out of bounds.
    #[error("{section}.{field} must be within [{min_ms}, {max_ms}] ms (got {value_ms})")]
    DurationOutOfRange {
        /// Schema section.
        section: &'static str,
        /// Field name.
        field: &'static str,
        /// Provided value.
        value_ms: u64,
        /// Lower bound.
        min_ms: u64,
        /// Upper bound.
        max_ms: u64,
    },
    /// A count or size is out of bounds.
    #[error("{section}.{field} must be within [{min}, {max}] (got {value})")]
    LimitOutOfRange {
        /// Schema section.
        section: &'static str,
        /// Field name.
        field: &'static str,
        /// Provided value.
        value: u64,
        /// Lower bound.
        min: u64,
        /// Upper bound.
        max: u64,
    },
    /// A list holds too many entries.
    #[error("{section}.{field} has {len} entries (max {max})")]
    ListTooLarge {
        /// Schema section.
        section: &'static str,
        /// Field name.
        field: &'static str,
        /// Entries found.
        len: usize,
        /// Maximum allowed.
        max: usize,
    },
    /// A URL did not parse or uses an unsupported scheme.
    #[error("{section}.{field} is not a valid http(s) URL: {value}")]
    InvalidUrl {
        /// Schema section.
        section: &'static str,
        /// Field name.
        field: &'static str,
        /// Sanitized value.
        value: String,
    },
    /// An ignore file entry is not a bare file name.
    #[error("ignore.files entry must be a bare file name: {file}")]
    InvalidIgnoreFile {
        /// Offending entry.
        file: String,
    },
    /// Any other malformed value.
    #[error("{section}.{field} {reason}")]
    InvalidValue {
        /// Schema section.
        section: &'static str,
        /// Field name.
        field: &'static str,
        /// What is wrong.
        reason: &'static str,
    },
}

impl ConfigSchemaError {
    fn error_code(&self) -> ErrorCode {
        let code = match self {
            Self::UnsupportedVersion { .. } => "unsupported_version",
            Self::DurationOutOfRange { .. } => "invalid_duration",
            Self::LimitOutOfRange { .. } => "invalid_limit",
            Self::ListTooLarge { .. } => "list_too_large",
            Self::InvalidUrl { .. } => "invalid_url",
            Self::InvalidIgnoreFile { .. } => "invalid_ignore_file",
            Self::InvalidValue { .. } => "invalid_value",
        };
        ErrorCode::new("config", code)
    }
}

impl From<ConfigSchemaError> for ErrorEnvelope {
    fn from(error: ConfigSchemaError) -> Self {
        let envelope = Self::expected(error.error_code(), error.to_string());
        match error {
            ConfigSchemaError::UnsupportedVersion { found, supported } => envelope
                .with_metadata("found", found.to_string())
                .with_metadata("supported", supported.to_string()),
            ConfigSchemaError::DurationOutOfRange {
                section,
                field,
                value_ms,
                ..
            } => envelope
                .with_metadata("section", section)
                .with_metadata("field", field)
                .with_metadata("valueMs", value_ms.to_string()),
            ConfigSchemaError::LimitOutOfRange {
                section,
                field,
                value,
                ..
            } => envelope
                .with_metadata("section", section)
                .with_metadata("field", field)
                .with_metadata("value", value.to_string()),
            ConfigSchemaError::ListTooLarge { section, field, .. }
            | ConfigSchemaError::InvalidValue { section, field, .. } => envelope
                .with_metadata("section", section)
                .with_metadata("field", field),
            ConfigSchemaError::InvalidUrl {
                section,
                field,
                value,
            } => envelope
                .with_metadata("section", section)
                .with_metadata("field", field)
                .with_metadata("value", value),
            ConfigSchemaError::InvalidIgnoreFile { file } => envelope.with_metadata("file", file),
        }
    }
}

/// Parse and validate a JSON config.
pub fn parse_indexer_config_json(input: &str) -> Result<ValidatedIndexerConfig, ErrorEnvelope> {
    let config: IndexerConfig = serde_json::from_str(input).map_err(|error| {
        ErrorEnvelope::expected(
            ErrorCode::new("config", "invalid_json"),
            format!("invalid config JSON: {error}"),
        )
    })?;
    Ok(config.validate_and_normalize()?)
}

/// Parse and validate a TOML config.
pub fn parse_indexer_config_toml(input: &str) -> Result<ValidatedIndexerConfig, ErrorEnvelope> {
    let config: IndexerConfig = toml::from_str(input).map_err(|error| {
        ErrorEnvelope::expected(
            ErrorCode::new("config", "invalid_toml"),
            format!("invalid config TOML: {error}"),
        )
    })?;
    Ok(config.validate_and_normalize()?)
}
