// Diagnostic output seam for the execution primitives.
//
// The shell invoker and the step workers report through this trait rather
// than the global subscriber, so an embedder can route their output per
// component (the container worker tags a dedicated target) and tests can
// capture or silence it.

/// Severity of one trace message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceLevel {
    Verbose,
    Info,
    Warning,
    Error,
}

/// Sink for diagnostic messages from invokers and workers.
///
/// Implementors provide `write`; the per-level helpers are how call sites
/// normally report.
pub trait TraceWriter: Send + Sync {
    fn write(&self, level: TraceLevel, message: &str);

    fn verbose(&self, message: &str) {
        self.write(TraceLevel::Verbose, message);
    }

    fn info(&self, message: &str) {
        self.write(TraceLevel::Info, message);
    }

    fn warning(&self, message: &str) {
        self.write(TraceLevel::Warning, message);
    }

    fn error(&self, message: &str) {
        self.write(TraceLevel::Error, message);
    }
}

/// Routes trace messages into the `tracing` macros at matching levels.
/// The default writer for production workers.
#[derive(Debug, Clone)]
pub struct TracingTraceWriter;

impl TraceWriter for TracingTraceWriter {
    fn write(&self, level: TraceLevel, message: &str) {
        match level {
            TraceLevel::Verbose => tracing::debug!("{}", message),
            TraceLevel::Info => tracing::info!("{}", message),
            TraceLevel::Warning => tracing::warn!("{}", message),
            TraceLevel::Error => tracing::error!("{}", message),
        }
    }
}

/// Discards every message.
#[derive(Debug, Clone)]
pub struct NullTraceWriter;

impl TraceWriter for NullTraceWriter {
    fn write(&self, _level: TraceLevel, _message: &str) {}
}

/// Captures messages for assertion in tests.
#[derive(Debug, Default)]
pub struct CollectingTraceWriter {
    entries: parking_lot::Mutex<Vec<(TraceLevel, String)>>,
}

impl CollectingTraceWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<(TraceLevel, String)> {
        self.entries.lock().clone()
    }

    /// The captured messages of one level, in arrival order.
    pub fn messages_at(&self, level: TraceLevel) -> Vec<String> {
        self.entries
            .lock()
            .iter()
            .filter(|(entry_level, _)| *entry_level == level)
            .map(|(_, message)| message.clone())
            .collect()
    }
}

impl TraceWriter for CollectingTraceWriter {
    fn write(&self, level: TraceLevel, message: &str) {
        self.entries.lock().push((level, message.to_string()));
    }
}
