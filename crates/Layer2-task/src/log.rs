//! Task Log System - per-run log capture
//!
//! Provides:
//! - `LogCollector`: ordered, append-only lines for one run
//! - `CaptureLayer`: a `tracing` layer routing events to the collector of
//!   the run that emitted them
//! - Change notification so publishers do not have to busy-poll
//!
//! Routing is done through a task-local scope rather than a shared sink
//! list: an event only reaches the collector whose `scope` the emitting
//! future runs in, so concurrent runs never see each other's lines.

use chrono::{DateTime, Local};
use parking_lot::RwLock;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

tokio::task_local! {
    static ACTIVE_COLLECTOR: LogCollector;
}

/// Timestamp layout of a formatted line
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// A single captured log event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Local time the event was captured
    pub timestamp: DateTime<Local>,

    /// Severity
    pub level: Level,

    /// Originating component (tracing target)
    pub component: String,

    /// Enclosing function or span name
    pub function: String,

    /// Source line
    pub line: u32,

    /// Message text
    pub message: String,
}

impl LogEntry {
    pub fn new(
        level: Level,
        component: impl Into<String>,
        function: impl Into<String>,
        line: u32,
        message: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Local::now(),
            level,
            component: component.into(),
            function: function.into(),
            line,
            message: message.into(),
        }
    }

    /// `timestamp | level | component:function:line - message`
    pub fn format(&self) -> String {
        format!(
            "{} | {:<8} | {}:{}:{} - {}",
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.level.to_string(),
            self.component,
            self.function,
            self.line,
            self.message
        )
    }
}

struct CollectorInner {
    request_id: String,
    lines: RwLock<Vec<String>>,
    attached: AtomicBool,
    min_level: Level,
    tx: watch::Sender<usize>,
}

/// Log sink for a single run
///
/// Cloning is cheap; all clones share the same lines. Lines are formatted
/// before they are appended under the write lock, so `snapshot` never sees a
/// partial line.
#[derive(Clone)]
pub struct LogCollector {
    inner: Arc<CollectorInner>,
}

impl LogCollector {
    /// Create a collector that starts capturing immediately (INFO and above).
    pub fn attach(request_id: impl Into<String>) -> Self {
        Self::attach_with_level(request_id, Level::INFO)
    }

    pub fn attach_with_level(request_id: impl Into<String>, min_level: Level) -> Self {
        let (tx, _) = watch::channel(0);
        Self {
            inner: Arc::new(CollectorInner {
                request_id: request_id.into(),
                lines: RwLock::new(Vec::new()),
                attached: AtomicBool::new(true),
                min_level,
                tx,
            }),
        }
    }

    pub fn request_id(&self) -> &str {
        &self.inner.request_id
    }

    /// Whether an event at `level` would be kept
    pub fn accepts(&self, level: &Level) -> bool {
        // tracing orders more verbose levels higher
        *level <= self.inner.min_level && self.is_attached()
    }

    /// Append an entry. Returns false when detached or below threshold.
    pub fn record(&self, entry: LogEntry) -> bool {
        if entry.level > self.inner.min_level {
            return false;
        }
        let line = entry.format();

        let count = {
            let mut lines = self.inner.lines.write();
            // checked under the lock so detach is exact
            if !self.inner.attached.load(Ordering::Acquire) {
                return false;
            }
            lines.push(line);
            lines.len()
        };

        self.inner.tx.send_replace(count);
        true
    }

    /// All lines captured so far, joined by `\n`
    pub fn snapshot(&self) -> String {
        self.inner.lines.read().join("\n")
    }

    pub fn line_count(&self) -> usize {
        self.inner.lines.read().len()
    }

    pub fn is_attached(&self) -> bool {
        self.inner.attached.load(Ordering::Acquire)
    }

    /// Stop capturing. Idempotent; returns true only on the first call.
    pub fn detach(&self) -> bool {
        let was_attached = {
            let _lines = self.inner.lines.write();
            self.inner.attached.swap(false, Ordering::AcqRel)
        };

        if was_attached {
            // wake publishers so they take the final snapshot promptly
            let count = self.line_count();
            self.inner.tx.send_replace(count);
        }
        was_attached
    }

    /// Receiver that changes on every append and on detach
    pub fn subscribe(&self) -> watch::Receiver<usize> {
        self.inner.tx.subscribe()
    }

    /// Run `fut` with this collector as the capture target for `tracing`
    /// events emitted from it.
    pub async fn scope<F: Future>(&self, fut: F) -> F::Output {
        ACTIVE_COLLECTOR.scope(self.clone(), fut).await
    }

    /// Synchronous counterpart of `scope`, for blocking closures
    pub fn sync_scope<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        ACTIVE_COLLECTOR.sync_scope(self.clone(), f)
    }

    /// Collector of the run the current task belongs to, if any
    pub fn current() -> Option<LogCollector> {
        ACTIVE_COLLECTOR.try_with(|c| c.clone()).ok()
    }
}

impl std::fmt::Debug for LogCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogCollector")
            .field("request_id", &self.inner.request_id)
            .field("lines", &self.line_count())
            .field("attached", &self.is_attached())
            .finish()
    }
}

// ============================================================================
// tracing integration
// ============================================================================

/// `tracing` layer delivering events to the collector in scope
///
/// Install once in the process subscriber. Events emitted outside any
/// `LogCollector::scope` are ignored, which includes tasks spawned with plain
/// `tokio::spawn` (task-locals are not inherited).
#[derive(Debug, Clone, Copy, Default)]
pub struct CaptureLayer;

impl CaptureLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for CaptureLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let Some(collector) = LogCollector::current() else {
            return;
        };

        let meta = event.metadata();
        if !collector.accepts(meta.level()) {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let function = ctx
            .event_span(event)
            .map(|span| span.name().to_string())
            .unwrap_or_else(|| "-".to_string());

        collector.record(LogEntry::new(
            *meta.level(),
            meta.target(),
            function,
            meta.line().unwrap_or(0),
            visitor.finish(),
        ));
    }
}

/// Collects the `message` field plus any structured fields as `key=value`
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: Vec<String>,
}

impl MessageVisitor {
    fn finish(self) -> String {
        if self.fields.is_empty() {
            self.message
        } else if self.message.is_empty() {
            self.fields.join(" ")
        } else {
            format!("{} {}", self.message, self.fields.join(" "))
        }
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.push(format!("{}={}", field.name(), value));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else {
            self.fields.push(format!("{}={:?}", field.name(), value));
        }
    }
}

/// Install a global subscriber with only the capture layer (unit tests).
#[cfg(test)]
pub(crate) fn init_test_capture() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::registry().with(CaptureLayer::new()).try_init();
    });
}
