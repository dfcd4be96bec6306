// crates/edl2ffmpeg-core/src/context.rs
//
// Design note: "Global singletons in the source (logger, timer). Replace
// with a context object passed through the pipeline constructor, carrying a
// logging sink and a metrics collector. No process-wide mutable state is
// required; testability improves correspondingly."
//
// `RenderContext` is that object. It is threaded through every stage
// constructor (Frame Pool, Source Reader, Compositor, Timeline Driver)
// instead of reaching for a `static` logger or `tracing`'s implicit global
// subscriber at call sites that need to branch on it. The default sink still
// forwards to `tracing` so ordinary runs get leveled, filterable output via
// `tracing-subscriber` — but every call site goes through `ctx.sink`, so a
// test can install a recording sink with no global state at all.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Stage-by-stage diagnostic sink. Implementors receive structured events
/// instead of formatted strings so a non-terminal consumer (a test, a UI
/// progress bar) doesn't have to parse log lines.
pub trait RenderSink: Send + Sync {
    /// A pipeline stage has reached a notable point (e.g. "encode: frame 90/300").
    fn stage(&self, stage: &str, message: &str) {
        let _ = (stage, message);
    }

    /// A non-fatal condition worth surfacing (pool over-recycling, a decode
    /// glitch below the retry cap, a soft-failed seek).
    fn warn(&self, message: &str) {
        let _ = message;
    }

    /// A fatal error about to be returned to the caller.
    fn error(&self, message: &str) {
        let _ = message;
    }
}

/// Default sink: forwards to the `tracing` crate at the obvious levels.
pub struct TracingSink;

impl RenderSink for TracingSink {
    fn stage(&self, stage: &str, message: &str) {
        tracing::info!(stage, "{message}");
    }

    fn warn(&self, message: &str) {
        tracing::warn!("{message}");
    }

    fn error(&self, message: &str) {
        tracing::error!("{message}");
    }
}

/// Counters updated across the render. Diagnostic only — nothing here gates
/// correctness, so relaxed ordering is sufficient throughout.
#[derive(Default)]
pub struct Metrics {
    pub frames_rendered: AtomicU64,
    pub frames_dropped: AtomicU64,
    pub decode_retries: AtomicU64,
    pub pool_recycles: AtomicU64,
    pub pool_allocations: AtomicU64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub frames_rendered: u64,
    pub frames_dropped: u64,
    pub decode_retries: u64,
    pub pool_recycles: u64,
    pub pool_allocations: u64,
}

impl Metrics {
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            frames_rendered: self.frames_rendered.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            decode_retries: self.decode_retries.load(Ordering::Relaxed),
            pool_recycles: self.pool_recycles.load(Ordering::Relaxed),
            pool_allocations: self.pool_allocations.load(Ordering::Relaxed),
        }
    }
}

/// Carried through every stage constructor in place of global logging/timer
/// state. Cheaply `Clone`-able (both fields are `Arc`) so each stage can hold
/// its own copy.
#[derive(Clone)]
pub struct RenderContext {
    pub sink: Arc<dyn RenderSink>,
    pub metrics: Arc<Metrics>,
}

impl Default for RenderContext {
    fn default() -> Self {
        Self { sink: Arc::new(TracingSink), metrics: Arc::new(Metrics::default()) }
    }
}

impl RenderContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(sink: Arc<dyn RenderSink>) -> Self {
        Self { sink, metrics: Arc::new(Metrics::default()) }
    }

    pub fn stage(&self, stage: &str, message: impl AsRef<str>) {
        self.sink.stage(stage, message.as_ref());
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        self.sink.warn(message.as_ref());
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.sink.error(message.as_ref());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        warnings: Mutex<Vec<String>>,
    }

    impl RenderSink for RecordingSink {
        fn warn(&self, message: &str) {
            self.warnings.lock().unwrap().push(message.to_string());
        }
    }

    #[test]
    fn context_routes_through_injected_sink_not_globals() {
        let sink = Arc::new(RecordingSink::default());
        let ctx = RenderContext::with_sink(sink.clone());
        ctx.warn("pool over-recycling");
        assert_eq!(sink.warnings.lock().unwrap().len(), 1);
    }

    #[test]
    fn metrics_snapshot_reflects_updates() {
        let ctx = RenderContext::new();
        ctx.metrics.frames_rendered.fetch_add(3, Ordering::Relaxed);
        assert_eq!(ctx.metrics.snapshot().frames_rendered, 3);
    }
}
