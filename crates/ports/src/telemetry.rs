//! Counter and timing signals surfaced to the host.

use std::collections::BTreeMap;

/// Low-cardinality tags.
pub type TelemetryTags = BTreeMap<Box<str>, Box<str>>;

/// Boundary for counters and timings.
pub trait TelemetryPort: Send + Sync {
    /// Increment counter `name` by `value`.
    fn increment_counter(&self, name: &str, value: u64, tags: Option<&TelemetryTags>);

    /// Record a duration in milliseconds.
    fn record_timer_ms(&self, name: &str, duration_ms: u64, tags: Option<&TelemetryTags>);
}
