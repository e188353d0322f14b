//! Structured logging boundary.

use codebase_index_shared::ErrorEnvelope;
use std::collections::BTreeMap;
use std::fmt;

/// Severity of a log event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// Diagnostics, including precondition skips.
    Debug,
    /// Lifecycle milestones.
    Info,
    /// Soft failures.
    Warn,
    /// Failures that need attention.
    Error,
}

impl LogLevel {
    /// Lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Structured fields attached to an event.
pub type LogFields = BTreeMap<Box<str>, serde_json::Value>;

/// Build [`LogFields`] from `(key, value)` pairs.
pub fn log_fields<I, K, V>(pairs: I) -> LogFields
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<Box<str>>,
    V: Into<serde_json::Value>,
{
    pairs
        .into_iter()
        .map(|(key, value)| (key.into(), value.into()))
        .collect()
}

/// One structured log event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    /// Stable dotted event name (`supervisor.start.attempt_failed`).
    pub event: Box<str>,
    /// Severity.
    pub level: LogLevel,
    /// Message; must not contain secrets.
    pub message: Box<str>,
    /// Structured fields.
    pub fields: Option<LogFields>,
    /// Serialized error envelope, if the event reports a failure.
    pub error: Option<serde_json::Value>,
}

impl LogEvent {
    /// Event without an attached error.
    #[must_use]
    pub fn new(level: LogLevel, event: &str, message: &str, fields: Option<LogFields>) -> Self {
        Self {
            event: event.into(),
            level,
            message: message.into(),
            fields,
            error: None,
        }
    }

    /// Attach an error envelope.
    #[must_use]
    pub fn with_error(mut self, error: &ErrorEnvelope) -> Self {
        self.error = serde_json::to_value(error).ok();
        self
    }
}

/// Structured logging sink used by every component.
pub trait LoggerPort: Send + Sync {
    /// Emit a structured event.
    fn log(&self, event: LogEvent);

    /// Logger that merges `fields` into every event.
    fn child(&self, fields: LogFields) -> Box<dyn LoggerPort>;

    /// Debug event.
    fn debug(&self, event: &str, message: &str, fields: Option<LogFields>) {
        self.log(LogEvent::new(LogLevel::Debug, event, message, fields));
    }

    /// Info event.
    fn info(&self, event: &str, message: &str, fields: Option<LogFields>) {
        self.log(LogEvent::new(LogLevel::Info, event, message, fields));
    }

    /// Warn event.
    fn warn(&self, event: &str, message: &str, fields: Option<LogFields>) {
        self.log(LogEvent::new(LogLevel::Warn, event, message, fields));
    }

    /// Error event.
    fn error(&self, event: &str, message: &str, fields: Option<LogFields>) {
        self.log(LogEvent::new(LogLevel::Error, event, message, fields));
    }

    /// Event at `level` carrying an error envelope.
    fn failure(&self, level: LogLevel, event: &str, error: &ErrorEnvelope, fields: Option<LogFields>) {
        self.log(LogEvent::new(level, event, &error.message, fields).with_error(error));
    }
}
