//! Diagnostic log capture.
//!
//! Components log through `tracing`. [`DiagnosticsLayer`] formats every event
//! as `[LEVEL] message (file:line)` and hands it to whichever [`LogSink`] is
//! registered in a [`SinkRegistry`]; [`LogBook`] is the sink the service
//! exposes to consumers.

use std::collections::VecDeque;
use std::fmt::{self, Write as _};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::field::{Field, Visit};
use tracing::{Event as TracingEvent, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::prelude::*;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt as fmt_layer, EnvFilter};

use crate::config::Config;
use crate::events::{ErrorSource, Event, Notifier};

/// Receiver of formatted diagnostic lines.
pub trait LogSink: Send + Sync {
    /// Record one formatted line logged at `level`.
    fn record(&self, level: Level, line: &str);
}

struct Registered {
    token: u64,
    sink: Arc<dyn LogSink>,
}

/// Process-wide slot for the active [`LogSink`].
#[derive(Clone, Default)]
pub struct SinkRegistry {
    current: Arc<RwLock<Option<Registered>>>,
    next_token: Arc<AtomicU64>,
}

impl SinkRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Route lines to `sink` until the returned guard is dropped.
    ///
    /// A later registration replaces an earlier one.
    #[must_use = "the sink is unregistered when the guard drops"]
    pub fn register(&self, sink: Arc<dyn LogSink>) -> SinkRegistration {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        *self.current.write() = Some(Registered { token, sink });
        SinkRegistration {
            registry: self.clone(),
            token,
        }
    }

    /// Whether a sink is registered.
    pub fn is_registered(&self) -> bool {
        self.current.read().is_some()
    }

    /// Forward a line to the registered sink, if any.
    pub fn dispatch(&self, level: Level, line: &str) {
        let sink = self.current.read().as_ref().map(|r| Arc::clone(&r.sink));
        if let Some(sink) = sink {
            sink.record(level, line);
        }
    }
}

impl fmt::Debug for SinkRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SinkRegistry")
            .field("registered", &self.is_registered())
            .finish()
    }
}

/// Guard returned by [`SinkRegistry::register`].
#[derive(Debug)]
pub struct SinkRegistration {
    registry: SinkRegistry,
    token: u64,
}

impl Drop for SinkRegistration {
    fn drop(&mut self) {
        let mut current = self.registry.current.write();
        if current.as_ref().is_some_and(|r| r.token == self.token) {
            *current = None;
        }
    }
}

/// `tracing` layer feeding the registered [`LogSink`].
#[derive(Debug, Clone)]
pub struct DiagnosticsLayer {
    registry: SinkRegistry,
}

impl DiagnosticsLayer {
    /// Create a layer dispatching into `registry`.
    #[must_use]
    pub const fn new(registry: SinkRegistry) -> Self {
        Self { registry }
    }
}

impl<S: Subscriber> Layer<S> for DiagnosticsLayer {
    fn on_event(&self, event: &TracingEvent<'_>, _ctx: Context<'_, S>) {
        if !self.registry.is_registered() {
            return;
        }

        let meta = event.metadata();
        let mut visitor = LineVisitor::default();
        event.record(&mut visitor);

        let mut line = format!("[{}] {}", meta.level(), visitor.message);
        if !visitor.fields.is_empty() {
            let _ = write!(line, " {}", visitor.fields.trim_start());
        }
        if let (Some(file), Some(number)) = (meta.file(), meta.line()) {
            let _ = write!(line, " ({file}:{number})");
        }

        self.registry.dispatch(*meta.level(), &line);
    }
}

#[derive(Default)]
struct LineVisitor {
    message: String,
    fields: String,
}

impl Visit for LineVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={value}", field.name());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{value:?}");
        } else {
            let _ = write!(self.fields, " {}={value:?}", field.name());
        }
    }
}

/// Bounded in-memory log exposed to consumers.
#[derive(Debug)]
pub struct LogBook {
    lines: Mutex<VecDeque<String>>,
    capacity: usize,
    line_limit: usize,
    notifier: Notifier,
}

impl LogBook {
    /// Keep at most `capacity` lines of at most `line_limit` characters.
    #[must_use]
    pub fn new(capacity: usize, line_limit: usize, notifier: Notifier) -> Self {
        Self {
            lines: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            line_limit,
            notifier,
        }
    }

    /// Create a log book sized by `config`.
    #[must_use]
    pub fn from_config(config: &Config, notifier: Notifier) -> Self {
        Self::new(config.log_capacity, config.log_line_limit, notifier)
    }

    /// Append a line, evicting the oldest when full.
    ///
    /// Lines at `WARN` or more severe are also surfaced as error events.
    pub fn push(&self, level: Level, line: &str) {
        let line = truncate(line, self.line_limit);
        {
            let mut lines = self.lines.lock();
            while lines.len() >= self.capacity.max(1) {
                lines.pop_front();
            }
            lines.push_back(line.clone());
        }

        self.notifier.send(Event::LogsChanged);
        // More severe levels compare lower
        if level <= Level::WARN {
            self.notifier.send(Event::Error {
                message: line,
                source: ErrorSource::Diagnostics,
            });
        }
    }

    /// Snapshot of the kept lines, oldest first.
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().iter().cloned().collect()
    }

    /// Number of kept lines.
    pub fn len(&self) -> usize {
        self.lines.lock().len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.lines.lock().is_empty()
    }

    /// Drop every kept line.
    pub fn clear(&self) {
        self.lines.lock().clear();
        self.notifier.send(Event::LogsChanged);
    }
}

impl LogSink for LogBook {
    fn record(&self, level: Level, line: &str) {
        self.push(level, line);
    }
}

fn truncate(line: &str, limit: usize) -> String {
    if line.chars().count() <= limit {
        return line.to_owned();
    }
    let mut kept: String = line.chars().take(limit.saturating_sub(3)).collect();
    kept.push_str("...");
    kept
}

/// Install the global subscriber: stderr output filtered by `RUST_LOG`
/// (or `default_filter`), plus the diagnostics layer feeding `registry`.
pub fn init(default_filter: &str, registry: &SinkRegistry) -> Result<(), TryInitError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt_layer::layer()
                .with_writer(std::io::stderr)
                .with_line_number(true),
        )
        .with(DiagnosticsLayer::new(registry.clone()))
        .try_init()
}
