//! Environment variable parsing and env-to-config merging.
//!
//! Parsing is strict: a variable that is present but malformed fails fast
//! instead of silently falling back to the file value. Secret values never
//! appear in error metadata.

use crate::schema::{IndexerConfig, ValidatedIndexerConfig};
use codebase_index_shared::{ErrorCode, ErrorEnvelope, REDACTED_VALUE, SecretString, is_secret_key};
use std::collections::BTreeMap;
use std::path::PathBuf;
use url::Url;

/// Env var: catalog base URL.
pub const ENV_CATALOG_BASE_URL: &str = "CBI_CATALOG_BASE_URL";
/// Env var: catalog request timeout in milliseconds.
pub const ENV_CATALOG_TIMEOUT_MS: &str = "CBI_CATALOG_TIMEOUT_MS";
/// Env var: sidecar listen port.
pub const ENV_LISTEN_PORT: &str = "CBI_LISTEN_PORT";
/// Env var: health check period in milliseconds.
pub const ENV_HEALTH_INTERVAL_MS: &str = "CBI_HEALTH_INTERVAL_MS";
/// Env var: workspace event relaying switch.
pub const ENV_MONITOR_ENABLED: &str = "CBI_MONITOR_ENABLED";
/// Env var: debounce interval in milliseconds.
pub const ENV_DEBOUNCE_MS: &str = "CBI_DEBOUNCE_MS";
/// Env var: batch threshold.
pub const ENV_BATCH_SIZE: &str = "CBI_BATCH_SIZE";
/// Env var: delivery retries per batch.
pub const ENV_MAX_RETRIES: &str = "CBI_MAX_RETRIES";
/// Env var: home directory override.
pub const ENV_HOME: &str = "CBI_HOME";
/// Env var: active provider kind.
pub const ENV_PROVIDER: &str = "CBI_PROVIDER";
/// Env var: host-side feature flag.
pub const ENV_FEATURE_ENABLED: &str = "CBI_FEATURE_ENABLED";
/// Env var: bearer token for the sidecar API (secret).
// gitleaks:allow
pub const ENV_AUTH_TOKEN: &str = "CBI_AUTH_TOKEN";
/// Env var: log filter directive.
pub const ENV_LOG: &str = "CBI_LOG";

const ALL_VARS: [&str; 13] = [
    ENV_CATALOG_BASE_URL,
    ENV_CATALOG_TIMEOUT_MS,
    ENV_LISTEN_PORT,
    ENV_HEALTH_INTERVAL_MS,
    ENV_MONITOR_ENABLED,
    ENV_DEBOUNCE_MS,
    ENV_BATCH_SIZE,
    ENV_MAX_RETRIES,
    ENV_HOME,
    ENV_PROVIDER,
    ENV_FEATURE_ENABLED,
    ENV_AUTH_TOKEN,
    ENV_LOG,
];

/// Parsed `CBI_*` environment.
///
/// Config overrides are applied by [`apply_env_overrides`]; the provider
/// fields feed the host-context stand-in and are not part of the config.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexerEnv {
    /// Catalog base URL.
    pub catalog_base_url: Option<String>,
    /// Catalog timeout.
    pub catalog_timeout_ms: Option<u64>,
    /// Sidecar listen port.
    pub listen_port: Option<u16>,
    /// Health check period.
    pub health_interval_ms: Option<u64>,
    /// Event relaying switch.
    pub monitor_enabled: Option<bool>,
    /// Debounce interval.
    pub debounce_ms: Option<u64>,
    /// Batch threshold.
    pub batch_size: Option<u32>,
    /// Delivery retries.
    pub max_retries: Option<u32>,
    /// Home directory override.
    pub home_dir: Option<PathBuf>,
    /// Active provider kind.
    pub provider: Option<String>,
    /// Host-side feature flag.
    pub feature_enabled: Option<bool>,
    /// Sidecar bearer token.
    pub auth_token: Option<SecretString>,
    /// Log filter directive.
    pub log_filter: Option<String>,
}

impl IndexerEnv {
    /// Parse env overrides from a key/value map.
    pub fn from_map(map: &BTreeMap<String, String>) -> Result<Self, EnvParseError> {
        Ok(Self {
            catalog_base_url: parse_optional_url(map, ENV_CATALOG_BASE_URL)?,
            catalog_timeout_ms: parse_optional_u64(map, ENV_CATALOG_TIMEOUT_MS)?,
            listen_port: parse_optional_port(map, ENV_LISTEN_PORT)?,
            health_interval_ms: parse_optional_u64(map, ENV_HEALTH_INTERVAL_MS)?,
            monitor_enabled: parse_optional_bool(map, ENV_MONITOR_ENABLED)?,
            debounce_ms: parse_optional_u64(map, ENV_DEBOUNCE_MS)?,
            batch_size: parse_optional_u32(map, ENV_BATCH_SIZE)?,
            max_retries: parse_optional_u32(map, ENV_MAX_RETRIES)?,
            home_dir: parse_optional_trimmed_string(map, ENV_HOME)?.map(PathBuf::from),
            provider: parse_optional_trimmed_string(map, ENV_PROVIDER)?,
            feature_enabled: parse_optional_bool(map, ENV_FEATURE_ENABLED)?,
            auth_token: parse_optional_secret(map, ENV_AUTH_TOKEN)?,
            log_filter: parse_optional_trimmed_string(map, ENV_LOG)?,
        })
    }

    /// Parse env overrides from the current process environment.
    pub fn from_std_env() -> Result<Self, EnvParseError> {
        let map = ALL_VARS
            .iter()
            .filter_map(|name| std::env::var(name).ok().map(|value| ((*name).to_owned(), value)))
            .collect();
        Self::from_map(&map)
    }
}

/// Apply env overrides to a base config (env wins over file values).
pub fn apply_env_overrides(
    base: IndexerConfig,
    env: &IndexerEnv,
) -> Result<ValidatedIndexerConfig, ErrorEnvelope> {
    let mut config = base;
    set_clone(&mut config.catalog.base_url, env.catalog_base_url.as_ref());
    set_copy(&mut config.catalog.timeout_ms, env.catalog_timeout_ms);
    set_copy(&mut config.supervisor.listen_port, env.listen_port);
    set_copy(&mut config.supervisor.health_interval_ms, env.health_interval_ms);
    set_copy(&mut config.monitor.enabled, env.monitor_enabled);
    set_copy(&mut config.monitor.debounce_ms, env.debounce_ms);
    set_copy(&mut config.monitor.batch_size, env.batch_size);
    set_copy(&mut config.monitor.max_retries, env.max_retries);
    if let Some(home) = &env.home_dir {
        config.product.home_dir = Some(home.clone());
    }
    config.validate_and_normalize().map_err(Into::into)
}

fn set_copy<T: Copy>(field: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *field = value;
    }
}

fn set_clone<T: Clone>(field: &mut T, value: Option<&T>) {
    if let Some(value) = value {
        *field = value.clone();
    }
}

/// Env parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnvParseError {
    /// Present but blank.
    #[error("{var} must be non-empty")]
    EmptyValue {
        /// Env var name.
        var: &'static str,
    },
    /// A secret present but blank.
    #[error("{var} must be non-empty")]
    EmptySecret {
        /// Env var name.
        var: &'static str,
    },
    /// Not a recognised boolean.
    #[error("{var} must be a boolean")]
    InvalidBool {
        /// Env var name.
        var: &'static str,
        /// Raw input.
        value: String,
    },
    /// Not an integer in range.
    #[error("{var} must be an integer")]
    InvalidInt {
        /// Env var name.
        var: &'static str,
        /// Raw input.
        value: String,
    },
    /// Not an http(s) URL.
    #[error("{var} must be a valid URL")]
    InvalidUrl {
        /// Env var name.
        var: &'static str,
        /// Raw input.
        value: String,
    },
}

impl EnvParseError {
    fn error_code(&self) -> ErrorCode {
        let code = match self {
            Self::EmptyValue { .. } | Self::EmptySecret { .. } => "empty_env_var",
            Self::InvalidBool { .. } => "invalid_env_bool",
            Self::InvalidInt { .. } => "invalid_env_int",
            Self::InvalidUrl { .. } => "invalid_env_url",
        };
        ErrorCode::new("config", code)
    }
}

impl From<EnvParseError> for ErrorEnvelope {
    fn from(error: EnvParseError) -> Self {
        let envelope = Self::expected(error.error_code(), error.to_string());
        match error {
            EnvParseError::EmptyValue { var } | EnvParseError::EmptySecret { var } => {
                envelope.with_metadata("env_var", var)
            },
            EnvParseError::InvalidBool { var, value }
            | EnvParseError::InvalidInt { var, value }
            | EnvParseError::InvalidUrl { var, value } => envelope
                .with_metadata("env_var", var)
                .with_metadata("value", redact_value(var, &value)),
        }
    }
}

fn trimmed<'a>(
    map: &'a BTreeMap<String, String>,
    var: &'static str,
) -> Result<Option<(&'a str, &'a String)>, EnvParseError> {
    let Some(raw) = map.get(var) else {
        return Ok(None);
    };
    let value = raw.trim();
    if value.is_empty() {
        return Err(EnvParseError::EmptyValue { var });
    }
    Ok(Some((value, raw)))
}

fn parse_optional_trimmed_string(
    map: &BTreeMap<String, String>,
    var: &'static str,
) -> Result<Option<String>, EnvParseError> {
    Ok(trimmed(map, var)?.map(|(value, _)| value.to_owned()))
}

fn parse_optional_secret(
    map: &BTreeMap<String, String>,
    var: &'static str,
) -> Result<Option<SecretString>, EnvParseError> {
    match trimmed(map, var) {
        Ok(value) => Ok(value.map(|(value, _)| SecretString::new(value))),
        Err(_) => Err(EnvParseError::EmptySecret { var }),
    }
}

fn parse_optional_u64(
    map: &BTreeMap<String, String>,
    var: &'static str,
) -> Result<Option<u64>, EnvParseError> {
    let Some((value, raw)) = trimmed(map, var)? else {
        return Ok(None);
    };
    value.parse::<u64>().map(Some).map_err(|_| EnvParseError::InvalidInt {
        var,
        value: raw.clone(),
    })
}

fn parse_optional_u32(
    map: &BTreeMap<String, String>,
    var: &'static str,
) -> Result<Option<u32>, EnvParseError> {
    let Some((value, raw)) = trimmed(map, var)? else {
        return Ok(None);
    };
    value.parse::<u32>().map(Some).map_err(|_| EnvParseError::InvalidInt {
        var,
        value: raw.clone(),
    })
}

fn parse_optional_port(
    map: &BTreeMap<String, String>,
    var: &'static str,
) -> Result<Option<u16>, EnvParseError> {
    let Some((value, raw)) = trimmed(map, var)? else {
        return Ok(None);
    };
    match value.parse::<u16>() {
        Ok(port) if port > 0 => Ok(Some(port)),
        _ => Err(EnvParseError::InvalidInt {
            var,
            value: raw.clone(),
        }),
    }
}

fn parse_optional_bool(
    map: &BTreeMap<String, String>,
    var: &'static str,
) -> Result<Option<bool>, EnvParseError> {
    let Some((value, raw)) = trimmed(map, var)? else {
        return Ok(None);
    };
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(Some(true)),
        "false" | "0" | "no" | "off" => Ok(Some(false)),
        _ => Err(EnvParseError::InvalidBool {
            var,
            value: raw.clone(),
        }),
    }
}

fn parse_optional_url(
    map: &BTreeMap<String, String>,
    var: &'static str,
) -> Result<Option<String>, EnvParseError> {
    let Some((value, raw)) = trimmed(map, var)? else {
        return Ok(None);
    };
    match Url::parse(value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(Some(value.to_owned())),
        _ => Err(EnvParseError::InvalidUrl {
            var,
            value: raw.clone(),
        }),
    }
}

fn redact_value(var: &str, value: &str) -> String {
    if is_secret_key(var) {
        REDACTED_VALUE.to_owned()
    } else {
        value.to_owned()
    }
}
