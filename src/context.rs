//! Per-run context: cluster versions, index pair, task identity, and the
//! progress-reporting hooks described in spec.md §4.4.4 / §5.
//!
//! The original Go tool threads these through `context.Context` values;
//! Rust has no ambient context type, so this is an explicit struct passed
//! by reference (and cheaply cloned — everything inside is `Arc`-backed
//! or `Copy`).
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A single named progress counter, e.g. "source scroll progress".
///
/// `current` is monotonically non-decreasing (spec.md §5, "Progress
/// updates are monotonically non-decreasing per counter").
#[derive(Debug)]
pub struct Progress {
    pub name: &'static str,
    pub current: AtomicU64,
    pub total: AtomicU64,
}

impl Progress {
    pub fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            current: AtomicU64::new(0),
            total: AtomicU64::new(0),
        })
    }

    pub fn set_total(&self, total: u64) {
        self.total.store(total, Ordering::Relaxed);
    }

    pub fn add(&self, delta: u64) -> u64 {
        self.current.fetch_add(delta, Ordering::Relaxed) + delta
    }

    pub fn snapshot(&self) -> (u64, u64) {
        (
            self.current.load(Ordering::Relaxed),
            self.total.load(Ordering::Relaxed),
        )
    }
}

/// Receives progress ticks; the default implementation logs via
/// `tracing`, mirroring the original's default progress callback that
/// simply logged every tick with context fields attached.
pub trait ProgressSink: Send + Sync {
    fn on_tick(&self, ctx: &Context, source: &Progress, target: &Progress, same_count: u64);
}

/// Logs every tick at info level with the context's structured fields.
pub struct LoggingProgressSink;

impl ProgressSink for LoggingProgressSink {
    fn on_tick(&self, ctx: &Context, source: &Progress, target: &Progress, same_count: u64) {
        let (source_current, source_total) = source.snapshot();
        let (target_current, target_total) = target.snapshot();
        tracing::info!(
            task_name = %ctx.task_name,
            task_id = %ctx.task_id,
            task_action = %ctx.task_action,
            source_index = %ctx.source_index,
            target_index = %ctx.target_index,
            source_progress = format!("{}/{}", source_current, source_total),
            target_progress = format!("{}/{}", target_current, target_total),
            same_count,
            "progress",
        );
    }
}

/// Carries the identifying fields attached to every log line plus the
/// progress sink used for this run (spec.md §3 "Context").
#[derive(Clone)]
pub struct Context {
    pub source_version: Arc<str>,
    pub target_version: Arc<str>,
    pub source_index: Arc<str>,
    pub target_index: Arc<str>,
    pub task_name: Arc<str>,
    pub task_id: Arc<str>,
    pub task_action: Arc<str>,
    pub progress_sink: Arc<dyn ProgressSink>,
    pub cancelled: Arc<std::sync::atomic::AtomicBool>,
}

impl Context {
    /// Builds a context with its own, unshared cancellation flag. Prefer
    /// [`Context::with_cancellation`] when a run-wide cancellation
    /// source (e.g. Ctrl-C) needs to reach this context.
    pub fn new(task_name: impl Into<String>, task_action: impl Into<String>) -> Self {
        Self::with_cancellation(task_name, task_action, Arc::new(std::sync::atomic::AtomicBool::new(false)))
    }

    /// Builds a context sharing `cancelled` with whatever else observes
    /// or sets it — the task runner wires this to a single Ctrl-C
    /// listener for the whole run (spec.md §5 "A context carries
    /// cancellation into every network call and every long-lived loop").
    pub fn with_cancellation(
        task_name: impl Into<String>,
        task_action: impl Into<String>,
        cancelled: Arc<std::sync::atomic::AtomicBool>,
    ) -> Self {
        Self {
            source_version: Arc::from(""),
            target_version: Arc::from(""),
            source_index: Arc::from(""),
            target_index: Arc::from(""),
            task_name: Arc::from(task_name.into()),
            task_id: Arc::from(uuid::Uuid::new_v4().to_string()),
            task_action: Arc::from(task_action.into()),
            progress_sink: Arc::new(LoggingProgressSink),
            cancelled,
        }
    }

    /// Returns a copy of this context scoped to a specific index pair and
    /// cluster version pair. Mirrors `WithIndexPair` in the original,
    /// which derives a child `context.Context` carrying the pair's
    /// indexes.
    pub fn with_pair(
        &self,
        source_version: impl Into<String>,
        target_version: impl Into<String>,
        source_index: impl Into<String>,
        target_index: impl Into<String>,
    ) -> Self {
        Self {
            source_version: Arc::from(source_version.into()),
            target_version: Arc::from(target_version.into()),
            source_index: Arc::from(source_index.into()),
            target_index: Arc::from(target_index.into()),
            ..self.clone()
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_is_monotonic() {
        let p = Progress::new("test");
        p.set_total(100);
        assert_eq!(p.add(10), 10);
        assert_eq!(p.add(5), 15);
        let (current, total) = p.snapshot();
        assert_eq!(current, 15);
        assert_eq!(total, 100);
    }

    #[test]
    fn with_pair_preserves_task_identity() {
        let ctx = Context::new("my-task", "sync");
        let scoped = ctx.with_pair("7.10.0", "8.1.0", "src-idx", "dst-idx");
        assert_eq!(&*scoped.task_name, "my-task");
        assert_eq!(&*scoped.source_index, "src-idx");
        assert_eq!(&*scoped.target_index, "dst-idx");
        assert_eq!(&*scoped.source_version, "7.10.0");
    }
}
