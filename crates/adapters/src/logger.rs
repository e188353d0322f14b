//! Structured logger adapters.
//!
//! [`JsonLogger`] writes one JSON object per event to a [`LogSink`];
//! [`TracingLogger`] forwards the same events to `tracing` so the CLI's
//! subscriber decides formatting and filtering.

use crate::log_sink::LogSink;
use codebase_index_ports::{LogEvent, LogFields, LogLevel, LoggerPort};
use codebase_index_shared::{REDACTED, is_secret_key};
use serde_json::Value;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// JSON logger emitting one line per event.
#[derive(Clone)]
pub struct JsonLogger {
    sink: Arc<dyn LogSink>,
    base_fields: LogFields,
    min_level: LogLevel,
}

impl JsonLogger {
    /// Create a JSON logger backed by the provided sink.
    #[must_use]
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self {
            sink,
            base_fields: LogFields::new(),
            min_level: LogLevel::Info,
        }
    }

    /// Set base fields applied to every event.
    #[must_use]
    pub fn with_base_fields(mut self, fields: LogFields) -> Self {
        self.base_fields = fields;
        self
    }

    /// Set the minimum log level.
    #[must_use]
    pub const fn with_min_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }
}

impl LoggerPort for JsonLogger {
    fn log(&self, event: LogEvent) {
        if event.level < self.min_level {
            return;
        }

        let fields = merged_fields(&self.base_fields, event.fields);
        let mut error = event.error;
        if let Some(ref mut value) = error {
            redact_value(value);
        }

        let mut payload = serde_json::Map::new();
        payload.insert("timestampMs".to_owned(), Value::from(now_epoch_ms()));
        payload.insert("level".to_owned(), Value::from(event.level.as_str()));
        payload.insert("event".to_owned(), Value::from(event.event.as_ref()));
        payload.insert("message".to_owned(), Value::from(event.message.as_ref()));
        if !fields.is_empty() {
            payload.insert("fields".to_owned(), fields_to_json(&fields));
        }
        if let Some(error) = error {
            payload.insert("error".to_owned(), error);
        }

        let line = serde_json::to_string(&Value::Object(payload)).map_or_else(
            |_| {
                "{\"timestampMs\":0,\"level\":\"error\",\"event\":\"logger.serialize_failed\",\"message\":\"log serialization failed\"}\n"
                    .to_owned()
            },
            |mut encoded| {
                encoded.push('\n');
                encoded
            },
        );
        self.sink.write_line(&line);
    }

    fn child(&self, fields: LogFields) -> Box<dyn LoggerPort> {
        let mut merged = self.base_fields.clone();
        merged.extend(fields);
        Box::new(Self {
            sink: Arc::clone(&self.sink),
            base_fields: merged,
            min_level: self.min_level,
        })
    }
}

/// Logger that forwards events to the `tracing` macros.
///
/// Fields and the error envelope are rendered as redacted JSON strings.
#[derive(Debug, Clone, Default)]
pub struct TracingLogger {
    base_fields: LogFields,
}

impl TracingLogger {
    /// Logger without base fields.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoggerPort for TracingLogger {
    fn log(&self, event: LogEvent) {
        let fields = merged_fields(&self.base_fields, event.fields);
        let fields = if fields.is_empty() {
            String::new()
        } else {
            fields_to_json(&fields).to_string()
        };
        let mut error = event.error;
        if let Some(ref mut value) = error {
            redact_value(value);
        }
        let error = error.map(|value| value.to_string()).unwrap_or_default();
        let name = event.event.as_ref();
        let message = event.message.as_ref();

        match event.level {
            LogLevel::Debug => {
                tracing::debug!(event = name, fields = %fields, error = %error, "{message}");
            },
            LogLevel::Info => {
                tracing::info!(event = name, fields = %fields, error = %error, "{message}");
            },
            LogLevel::Warn => {
                tracing::warn!(event = name, fields = %fields, error = %error, "{message}");
            },
            LogLevel::Error => {
                tracing::error!(event = name, fields = %fields, error = %error, "{message}");
            },
        }
    }

    fn child(&self, fields: LogFields) -> Box<dyn LoggerPort> {
        let mut merged = self.base_fields.clone();
        merged.extend(fields);
        Box::new(Self {
            base_fields: merged,
        })
    }
}

fn merged_fields(base: &LogFields, extra: Option<LogFields>) -> LogFields {
    let mut fields = base.clone();
    if let Some(extra) = extra {
        fields.extend(extra);
    }
    redact_fields(&mut fields);
    fields
}

fn fields_to_json(fields: &LogFields) -> Value {
    let map = fields
        .iter()
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect();
    Value::Object(map)
}

fn redact_fields(fields: &mut LogFields) {
    for (key, value) in fields.iter_mut() {
        if is_secret_key(key) {
            *value = Value::from(REDACTED);
        } else {
            redact_value(value);
        }
    }
}

fn redact_value(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, nested) in map.iter_mut() {
                if is_secret_key(key) {
                    *nested = Value::from(REDACTED);
                } else {
                    redact_value(nested);
                }
            }
        },
        Value::Array(items) => {
            for item in items {
                redact_value(item);
            }
        },
        _ => {},
    }
}

pub(crate) fn now_epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .and_then(|duration| u64::try_from(duration.as_millis()).ok())
        .unwrap_or_default()
}
