//! Log setup for hosts, plus an in-memory capture layer.
//!
//! [`init`] installs a `fmt` subscriber on stderr filtered by `RUST_LOG` (or a
//! default directive) and returns a [`LogBuffer`] fed by [`LogCaptureLayer`],
//! so recent server logs can be shown inside a session.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

use tracing::field::{Field, Visit};
use tracing::{Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Layer};

/// Messages kept by a [`LogBuffer`] created through [`init`].
pub const DEFAULT_CAPACITY: usize = 256;

/// One captured log event.
#[derive(Debug, Clone)]
pub struct LogMessage {
    /// The `message` field.
    pub message: String,
    /// Every other field, formatted as `name=value`.
    pub fields: Vec<String>,
    /// The module or target that logged it.
    pub target: &'static str,
    pub level: Level,
    pub time: SystemTime,
}

impl fmt::Display for LogMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>5} {}: {}", self.level, self.target, self.message)?;
        for field in &self.fields {
            write!(f, " {}", field)?;
        }
        Ok(())
    }
}

type Ring = Arc<Mutex<VecDeque<LogMessage>>>;

/// A [`Layer`] that writes every event into a [`LogBuffer`], evicting the
/// oldest message once the buffer is full.
pub struct LogCaptureLayer {
    ring: Ring,
    capacity: usize,
}

impl<S: Subscriber> Layer<S> for LogCaptureLayer {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = LogEventVisitor::default();
        event.record(&mut visitor);
        let metadata = event.metadata();
        let message = LogMessage {
            message: visitor.message.unwrap_or_default(),
            fields: visitor.fields,
            target: metadata.target(),
            level: *metadata.level(),
            time: SystemTime::now(),
        };
        let mut ring = self.ring.lock().unwrap_or_else(PoisonError::into_inner);
        if ring.len() == self.capacity {
            ring.pop_front();
        }
        ring.push_back(message);
    }
}

#[derive(Default)]
struct LogEventVisitor {
    message: Option<String>,
    fields: Vec<String>,
}

impl Visit for LogEventVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.fields.push(format!("{}={}", field.name(), value));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{value:?}"));
        } else {
            self.fields.push(format!("{}={:?}", field.name(), value));
        }
    }
}

/// The most recent captured log messages.
pub struct LogBuffer {
    ring: Ring,
    capacity: usize,
}

impl LogBuffer {
    /// Up to `n` of the newest messages, oldest first.
    pub fn recent(&self, n: usize) -> Vec<LogMessage> {
        let ring = self.ring.lock().unwrap_or_else(PoisonError::into_inner);
        let skip = ring.len().saturating_sub(n);
        ring.iter().skip(skip).cloned().collect()
    }

    /// Messages currently held, never more than [`capacity`](Self::capacity).
    pub fn len(&self) -> usize {
        self.ring.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl fmt::Debug for LogBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogBuffer")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

/// Create a capture layer and the buffer it fills.
pub fn capture_layer(capacity: usize) -> (LogCaptureLayer, LogBuffer) {
    let capacity = capacity.max(1);
    let ring: Ring = Arc::new(Mutex::new(VecDeque::with_capacity(capacity)));
    let layer = LogCaptureLayer {
        ring: Arc::clone(&ring),
        capacity,
    };
    (layer, LogBuffer { ring, capacity })
}

/// Install the global subscriber: `fmt` output on stderr plus capture.
///
/// `RUST_LOG` wins over `default_filter` when set.
pub fn init(default_filter: &str) -> Result<LogBuffer, TryInitError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let (capture, buffer) = capture_layer(DEFAULT_CAPACITY);

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(capture)
        .try_init()?;
    Ok(buffer)
}
