//! Structured run events correlated by execution id.
//!
//! Every event goes through a [`LogSink`]; the default sink forwards to
//! `tracing`, while callers embedding the crawler can collect events
//! themselves.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for EventLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventLevel::Debug => write!(f, "DEBUG"),
            EventLevel::Info => write!(f, "INFO"),
            EventLevel::Warn => write!(f, "WARN"),
            EventLevel::Error => write!(f, "ERROR"),
        }
    }
}

/// One structured event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEvent {
    pub execution_id: String,
    pub level: EventLevel,
    pub message: String,

    /// Free-form structured details
    pub context: Value,

    pub timestamp: DateTime<Utc>,
}

/// Receiver of run events
pub trait LogSink: Send + Sync {
    fn emit(&self, event: LogEvent);
}

/// Forwards events to `tracing`
#[derive(Debug, Default, Clone)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn emit(&self, event: LogEvent) {
        let execution_id = event.execution_id.as_str();
        let context = &event.context;
        match event.level {
            EventLevel::Debug => debug!(execution_id, %context, "{}", event.message),
            EventLevel::Info => info!(execution_id, %context, "{}", event.message),
            EventLevel::Warn => warn!(execution_id, %context, "{}", event.message),
            EventLevel::Error => error!(execution_id, %context, "{}", event.message),
        }
    }
}

/// Handle bound to one execution id; clones share the sink
#[derive(Clone)]
pub struct EventLog {
    execution_id: Arc<str>,
    sink: Arc<dyn LogSink>,
}

impl fmt::Debug for EventLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLog").field("execution_id", &self.execution_id).finish()
    }
}

impl EventLog {
    pub fn new(execution_id: impl Into<String>, sink: Arc<dyn LogSink>) -> Self {
        Self {
            execution_id: Arc::from(execution_id.into()),
            sink,
        }
    }

    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    pub fn emit(&self, level: EventLevel, message: impl Into<String>, context: Value) {
        self.sink.emit(LogEvent {
            execution_id: self.execution_id.to_string(),
            level,
            message: message.into(),
            context,
            timestamp: Utc::now(),
        });
    }

    pub fn debug(&self, message: impl Into<String>, context: Value) {
        self.emit(EventLevel::Debug, message, context);
    }

    pub fn info(&self, message: impl Into<String>, context: Value) {
        self.emit(EventLevel::Info, message, context);
    }

    pub fn warn(&self, message: impl Into<String>, context: Value) {
        self.emit(EventLevel::Warn, message, context);
    }

    pub fn error(&self, message: impl Into<String>, context: Value) {
        self.emit(EventLevel::Error, message, context);
    }
}

/// Keeps every event in memory so tests can assert on them
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: std::sync::Mutex<Vec<LogEvent>>,
}

#[cfg(test)]
impl RecordingSink {
    pub fn events(&self) -> Vec<LogEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn at_level(&self, level: EventLevel) -> Vec<LogEvent> {
        self.events().into_iter().filter(|e| e.level == level).collect()
    }

    pub fn with_message(&self, needle: &str) -> Vec<LogEvent> {
        self.events().into_iter().filter(|e| e.message.contains(needle)).collect()
    }
}

#[cfg(test)]
impl LogSink for RecordingSink {
    fn emit(&self, event: LogEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Event log plus the sink behind it, for tests
#[cfg(test)]
pub fn recording_log(execution_id: &str) -> (EventLog, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    (EventLog::new(execution_id, sink.clone()), sink)
}
