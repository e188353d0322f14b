//! JSON telemetry adapter (counters and timers).

use crate::log_sink::LogSink;
use crate::logger::now_epoch_ms;
use codebase_index_ports::{TelemetryPort, TelemetryTags};
use codebase_index_shared::{REDACTED, is_secret_key};
use serde_json::Value;
use std::sync::Arc;

/// Telemetry adapter that emits JSON metric lines.
#[derive(Clone)]
pub struct JsonTelemetry {
    sink: Arc<dyn LogSink>,
    base_tags: TelemetryTags,
}

impl JsonTelemetry {
    /// Create a telemetry adapter backed by the provided sink.
    #[must_use]
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self {
            sink,
            base_tags: TelemetryTags::new(),
        }
    }

    /// Set base tags applied to every metric.
    #[must_use]
    pub fn with_base_tags(mut self, tags: TelemetryTags) -> Self {
        self.base_tags = tags;
        self
    }
}

impl TelemetryPort for JsonTelemetry {
    fn increment_counter(&self, name: &str, value: u64, tags: Option<&TelemetryTags>) {
        let tags = merge_tags(&self.base_tags, tags);
        self.sink
            .write_line(&metric_payload("counter", name, value, None, &tags));
    }

    fn record_timer_ms(&self, name: &str, duration_ms: u64, tags: Option<&TelemetryTags>) {
        let tags = merge_tags(&self.base_tags, tags);
        self.sink
            .write_line(&metric_payload("timer", name, duration_ms, Some("ms"), &tags));
    }
}

/// Telemetry adapter that applies base tags to an inner telemetry sink.
#[derive(Clone)]
pub struct TaggedTelemetry {
    inner: Arc<dyn TelemetryPort>,
    tags: TelemetryTags,
}

impl TaggedTelemetry {
    /// Wrap a telemetry sink with base tags.
    #[must_use]
    pub fn new(inner: Arc<dyn TelemetryPort>, tags: TelemetryTags) -> Self {
        Self { inner, tags }
    }
}

impl TelemetryPort for TaggedTelemetry {
    fn increment_counter(&self, name: &str, value: u64, tags: Option<&TelemetryTags>) {
        let merged = merge_tags(&self.tags, tags);
        self.inner.increment_counter(name, value, Some(&merged));
    }

    fn record_timer_ms(&self, name: &str, duration_ms: u64, tags: Option<&TelemetryTags>) {
        let merged = merge_tags(&self.tags, tags);
        self.inner.record_timer_ms(name, duration_ms, Some(&merged));
    }
}

fn metric_payload(
    metric_type: &str,
    name: &str,
    value: u64,
    unit: Option<&str>,
    tags: &TelemetryTags,
) -> String {
    let mut payload = serde_json::Map::new();
    payload.insert("type".to_owned(), Value::from("metric"));
    payload.insert("timestampMs".to_owned(), Value::from(now_epoch_ms()));
    payload.insert("metricType".to_owned(), Value::from(metric_type));
    payload.insert("name".to_owned(), Value::from(name));
    payload.insert("value".to_owned(), Value::from(value));
    if let Some(unit) = unit {
        payload.insert("unit".to_owned(), Value::from(unit));
    }
    if !tags.is_empty() {
        let tags = tags
            .iter()
            .map(|(key, value)| (key.to_string(), Value::from(&**value)))
            .collect();
        payload.insert("tags".to_owned(), Value::Object(tags));
    }

    serde_json::to_string(&Value::Object(payload)).map_or_else(
        |_| {
            "{\"type\":\"metric\",\"metricType\":\"error\",\"name\":\"telemetry.serialize_failed\",\"value\":1}\n"
                .to_owned()
        },
        |mut encoded| {
            encoded.push('\n');
            encoded
        },
    )
}

fn merge_tags(base: &TelemetryTags, extra: Option<&TelemetryTags>) -> TelemetryTags {
    let mut merged = base.clone();
    if let Some(extra) = extra {
        merged.extend(extra.iter().map(|(key, value)| (key.clone(), value.clone())));
    }
    for (key, value) in &mut merged {
        if is_secret_key(key) {
            *value = REDACTED.into();
        }
    }
    merged
}
