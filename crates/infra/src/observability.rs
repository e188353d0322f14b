//! Logger and telemetry selection for the runtime.

use codebase_index_adapters::log_sink::{LogSink, StderrLogSink};
use codebase_index_adapters::logger::{JsonLogger, TracingLogger};
use codebase_index_adapters::telemetry::{JsonTelemetry, TaggedTelemetry};
use codebase_index_ports::{LogFields, LogLevel, LoggerPort, TelemetryPort, TelemetryTags};
use codebase_index_shared::RequestContext;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Env var: `json` switches the runtime logger to JSON lines on stderr.
pub const ENV_LOG_FORMAT: &str = "CBI_LOG_FORMAT";
/// Env var: minimum level for the JSON logger.
pub const ENV_LOG_LEVEL: &str = "CBI_LOG_LEVEL";
/// Env var: `json` enables metric lines on stderr.
pub const ENV_TELEMETRY_FORMAT: &str = "CBI_TELEMETRY_FORMAT";

/// Logger and telemetry handed to the use-cases.
#[derive(Clone, Default)]
pub struct Observability {
    /// Structured logger, if any.
    pub logger: Option<Arc<dyn LoggerPort>>,
    /// Counter sink, if any.
    pub telemetry: Option<Arc<dyn TelemetryPort>>,
}

impl Observability {
    /// Select implementations from `CBI_*` variables.
    ///
    /// Without `CBI_LOG_FORMAT=json` events go through `tracing`, so they follow
    /// whatever subscriber the binary installed.
    #[must_use]
    pub fn from_env_map(env: &BTreeMap<String, String>) -> Self {
        let sink: Arc<dyn LogSink> = Arc::new(StderrLogSink);
        Self::with_sink(env, &sink)
    }

    /// Same as [`Self::from_env_map`], reading the process environment.
    #[must_use]
    pub fn from_std_env() -> Self {
        let env = [ENV_LOG_FORMAT, ENV_LOG_LEVEL, ENV_TELEMETRY_FORMAT]
            .into_iter()
            .filter_map(|key| std::env::var(key).ok().map(|value| (key.to_owned(), value)))
            .collect();
        Self::from_env_map(&env)
    }

    /// Select implementations writing JSON lines to `sink`.
    #[must_use]
    pub fn with_sink(env: &BTreeMap<String, String>, sink: &Arc<dyn LogSink>) -> Self {
        let logger: Arc<dyn LoggerPort> = if is_json(env, ENV_LOG_FORMAT) {
            Arc::new(JsonLogger::new(Arc::clone(sink)).with_min_level(parse_log_level(env)))
        } else {
            Arc::new(TracingLogger::new())
        };
        let telemetry: Option<Arc<dyn TelemetryPort>> = if is_json(env, ENV_TELEMETRY_FORMAT) {
            Some(Arc::new(JsonTelemetry::new(Arc::clone(sink))))
        } else {
            None
        };
        Self {
            logger: Some(logger),
            telemetry,
        }
    }

    /// Copy whose logger and telemetry carry the context's correlation id.
    #[must_use]
    pub fn scoped(&self, ctx: &RequestContext) -> Self {
        Self {
            logger: scope_logger(self.logger.as_ref(), ctx),
            telemetry: scope_telemetry(self.telemetry.as_ref(), ctx),
        }
    }
}

fn is_json(env: &BTreeMap<String, String>, key: &str) -> bool {
    env.get(key)
        .is_some_and(|value| value.trim().eq_ignore_ascii_case("json"))
}

fn parse_log_level(env: &BTreeMap<String, String>) -> LogLevel {
    let value = env.get(ENV_LOG_LEVEL).map(|value| value.to_ascii_lowercase());
    match value.as_deref() {
        Some("debug") => LogLevel::Debug,
        Some("warn") => LogLevel::Warn,
        Some("error") => LogLevel::Error,
        _ => LogLevel::Info,
    }
}

fn scope_logger(
    logger: Option<&Arc<dyn LoggerPort>>,
    ctx: &RequestContext,
) -> Option<Arc<dyn LoggerPort>> {
    let logger = logger?;
    let mut fields = LogFields::new();
    fields.insert(
        "correlationId".to_owned().into_boxed_str(),
        Value::String(ctx.correlation_id().as_str().to_owned()),
    );
    Some(Arc::from(logger.child(fields)))
}

fn scope_telemetry(
    telemetry: Option<&Arc<dyn TelemetryPort>>,
    ctx: &RequestContext,
) -> Option<Arc<dyn TelemetryPort>> {
    let telemetry = telemetry?;
    let mut tags = TelemetryTags::new();
    tags.insert(
        "correlationId".to_owned().into_boxed_str(),
        ctx.correlation_id().as_str().to_owned().into_boxed_str(),
    );
    Some(Arc::new(TaggedTelemetry::new(Arc::clone(telemetry), tags)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use codebase_index_adapters::log_sink::MemoryLogSink;

    fn env(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
            .collect()
    }

    #[test]
    fn json_logger_writes_scoped_lines() {
        let memory = Arc::new(MemoryLogSink::default());
        let sink: Arc<dyn LogSink> = memory.clone();
        let observability = Observability::with_sink(
            &env(&[(ENV_LOG_FORMAT, "JSON"), (ENV_LOG_LEVEL, "warn")]),
            &sink,
        );
        let ctx = RequestContext::new_request();
        let scoped = observability.scoped(&ctx);
        let Some(logger) = scoped.logger else {
            panic!("logger expected");
        };

        logger.info("runtime.test", "dropped below warn", None);
        logger.warn("runtime.test", "kept", None);

        let lines = memory.take();
        assert_eq!(lines.len(), 1);
        assert!(lines.iter().any(|line| line.contains(ctx.correlation_id().as_str())));
    }

    #[test]
    fn telemetry_is_opt_in() {
        let sink: Arc<dyn LogSink> = Arc::new(MemoryLogSink::default());
        assert!(Observability::with_sink(&BTreeMap::new(), &sink).telemetry.is_none());
        let enabled = Observability::with_sink(&env(&[(ENV_TELEMETRY_FORMAT, "json")]), &sink);
        assert!(enabled.telemetry.is_some());
        assert!(enabled.logger.is_some());
    }
}
