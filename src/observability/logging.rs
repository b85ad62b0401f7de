//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber (env filter + fmt output)
//! - Capture records in memory for the `/debug/log` endpoint
//!
//! The capture buffer keeps the most recent records only.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{reload, EnvFilter, Layer, Registry};

/// Records kept by default before the oldest are discarded.
pub const DEFAULT_CAPACITY: usize = 10_000;

/// One captured log event.
#[derive(Debug, Clone, Serialize)]
pub struct LogRecord {
    pub time: DateTime<Utc>,
    pub level: String,
    pub target: String,
    pub message: String,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub fields: Map<String, Value>,
}

/// Shared, bounded store of captured log records.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    records: Arc<Mutex<VecDeque<LogRecord>>>,
    capacity: usize,
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: Arc::new(Mutex::new(VecDeque::new())),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&self, record: LogRecord) {
        let mut records = self.records.lock();
        if records.len() == self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }

    /// Copy of the captured records, oldest first.
    pub fn snapshot(&self) -> Vec<LogRecord> {
        self.records.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Layer copying every enabled event into a [`LogBuffer`].
pub struct LogCapture {
    buffer: LogBuffer,
}

impl LogCapture {
    pub fn new(buffer: LogBuffer) -> Self {
        Self { buffer }
    }
}

impl<S: Subscriber> Layer<S> for LogCapture {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let mut message = String::new();
        let mut fields = Map::new();
        event.record(&mut FieldVisitor {
            message: &mut message,
            fields: &mut fields,
        });

        self.buffer.push(LogRecord {
            time: Utc::now(),
            level: metadata.level().to_string(),
            target: metadata.target().to_string(),
            message,
            fields,
        });
    }
}

struct FieldVisitor<'a> {
    message: &'a mut String,
    fields: &'a mut Map<String, Value>,
}

impl FieldVisitor<'_> {
    fn insert(&mut self, field: &Field, value: Value) {
        if field.name() == "message" {
            *self.message = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
        } else {
            self.fields.insert(field.name().to_string(), value);
        }
    }
}

impl Visit for FieldVisitor<'_> {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.insert(field, Value::String(format!("{value:?}")));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, Value::String(value.to_string()));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, Value::from(value));
    }
}

/// Default filter directive for a configured level.
pub fn default_filter(level: &str) -> String {
    format!("gatehouse={level},tower_http={level}")
}

/// Handles to the installed subscriber.
#[derive(Clone)]
pub struct Logging {
    pub buffer: LogBuffer,
    filter: reload::Handle<EnvFilter, Registry>,
    from_env: bool,
}

impl Logging {
    /// Switch the default filter to `level`. Ignored when `RUST_LOG` is set.
    pub fn set_level(&self, level: &str) {
        if self.from_env {
            return;
        }
        if let Err(e) = self
            .filter
            .modify(|filter| *filter = EnvFilter::new(default_filter(level)))
        {
            tracing::warn!(level, error = %e, "Failed to change log level");
        }
    }

    /// The active filter directives, if the subscriber is still alive.
    pub fn filter(&self) -> Option<String> {
        self.filter.with_current(|filter| filter.to_string()).ok()
    }
}

/// A subscriber scoped to the current thread, for tests that change levels.
#[cfg(test)]
pub(crate) fn scoped_logging(level: &str) -> (Logging, tracing::subscriber::DefaultGuard) {
    let buffer = LogBuffer::default();
    let (filter, handle) = reload::Layer::new(EnvFilter::new(default_filter(level)));
    let guard = tracing_subscriber::registry()
        .with(filter)
        .with(LogCapture::new(buffer.clone()))
        .set_default();
    (
        Logging {
            buffer,
            filter: handle,
            from_env: false,
        },
        guard,
    )
}

/// Install the global subscriber.
///
/// `RUST_LOG` overrides `default_level` when set. Installing twice is a
/// no-op for the subscriber; the returned buffer is then never filled.
pub fn init_logging(default_level: &str) -> Logging {
    let buffer = LogBuffer::default();
    let (filter, from_env) = match EnvFilter::try_from_default_env() {
        Ok(filter) => (filter, true),
        Err(_) => (EnvFilter::new(default_filter(default_level)), false),
    };
    let (filter, handle) = reload::Layer::new(filter);

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(LogCapture::new(buffer.clone()))
        .try_init();

    if installed.is_err() {
        tracing::debug!("Global subscriber already installed");
    }

    Logging {
        buffer,
        filter: handle,
        from_env,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::layer::SubscriberExt;

    #[test]
    fn buffer_discards_oldest_at_capacity() {
        let buffer = LogBuffer::new(2);
        for i in 0..3 {
            buffer.push(LogRecord {
                time: Utc::now(),
                level: "INFO".into(),
                target: "test".into(),
                message: format!("m{i}"),
                fields: Map::new(),
            });
        }
        let records = buffer.snapshot();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].message, "m1");
    }

    #[test]
    fn set_level_replaces_filter() {
        let (logging, _guard) = scoped_logging("info");
        assert!(logging.filter().unwrap().contains("gatehouse=info"));

        logging.set_level("debug");
        let filter = logging.filter().unwrap();
        assert!(filter.contains("gatehouse=debug"), "{filter}");
        assert!(!filter.contains("gatehouse=info"));
    }

    #[test]
    fn capture_layer_records_message_and_fields() {
        let buffer = LogBuffer::new(16);
        let subscriber = tracing_subscriber::registry().with(LogCapture::new(buffer.clone()));

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(service = "api", attempts = 3u64, "Service skipped");
        });

        let records = buffer.snapshot();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].level, "WARN");
        assert_eq!(records[0].message, "Service skipped");
        assert_eq!(records[0].fields["service"], Value::String("api".into()));
        assert_eq!(records[0].fields["attempts"], Value::from(3u64));
    }
}
