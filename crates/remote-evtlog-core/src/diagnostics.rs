//! Level-gated diagnostic output, kept apart from the result stream.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

/// Diagnostic verbosity requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebugLevel {
    /// Errors only.
    #[default]
    Silent,
    /// Errors and progress notes.
    Basic,
    /// Everything, including buffer sizes and raw XML.
    Verbose,
}

impl DebugLevel {
    /// Map the numeric level used by callers (0, 1, 2). Higher values clamp.
    #[must_use]
    pub const fn from_level(level: u8) -> Self {
        match level {
            0 => Self::Silent,
            1 => Self::Basic,
            _ => Self::Verbose,
        }
    }
}

/// How important a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Always emitted.
    Error,
    /// Emitted at [`DebugLevel::Basic`] and above.
    Basic,
    /// Emitted at [`DebugLevel::Verbose`].
    Trace,
}

/// One diagnostic line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Originating component, e.g. `ResultStream`.
    pub component: &'static str,
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.severity {
            Severity::Error => write!(f, "[Error][{}]: {}", self.component, self.message),
            Severity::Basic | Severity::Trace => write!(f, "[{}]: {}", self.component, self.message),
        }
    }
}

/// Destination for diagnostics. Shared across invocations, so it must accept
/// concurrent writers.
pub trait DiagnosticSink: Send + Sync {
    fn emit(&self, diagnostic: &Diagnostic);
}

/// Forwards diagnostics to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn emit(&self, diagnostic: &Diagnostic) {
        let component = diagnostic.component;
        match diagnostic.severity {
            Severity::Error => tracing::error!(component, "{}", diagnostic.message),
            Severity::Basic => tracing::info!(component, "{}", diagnostic.message),
            Severity::Trace => tracing::debug!(component, "{}", diagnostic.message),
        }
    }
}

/// Collects diagnostics in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<Diagnostic>>,
}

impl MemorySink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything emitted so far.
    #[must_use]
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.lines
            .lock()
            .map(|lines| lines.clone())
            .unwrap_or_default()
    }

    /// Diagnostics emitted by `component`.
    #[must_use]
    pub fn from_component(&self, component: &str) -> Vec<Diagnostic> {
        self.diagnostics()
            .into_iter()
            .filter(|d| d.component == component)
            .collect()
    }

    /// True if nothing has been emitted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.lock().map(|lines| lines.is_empty()).unwrap_or(true)
    }
}

impl DiagnosticSink for MemorySink {
    fn emit(&self, diagnostic: &Diagnostic) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(diagnostic.clone());
        }
    }
}

/// Verbosity plus sink, passed explicitly to every component.
#[derive(Clone)]
pub struct Diagnostics {
    level: DebugLevel,
    sink: Arc<dyn DiagnosticSink>,
}

impl std::fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Diagnostics")
            .field("level", &self.level)
            .finish_non_exhaustive()
    }
}

impl Diagnostics {
    /// Create diagnostics writing to `sink`.
    #[must_use]
    pub fn new(level: DebugLevel, sink: Arc<dyn DiagnosticSink>) -> Self {
        Self { level, sink }
    }

    /// Diagnostics forwarded to `tracing`.
    #[must_use]
    pub fn tracing(level: DebugLevel) -> Self {
        Self::new(level, Arc::new(TracingSink))
    }

    #[must_use]
    pub const fn level(&self) -> DebugLevel {
        self.level
    }

    /// Whether diagnostics of `severity` reach the sink.
    #[must_use]
    pub fn enabled(&self, severity: Severity) -> bool {
        match severity {
            Severity::Error => true,
            Severity::Basic => self.level >= DebugLevel::Basic,
            Severity::Trace => self.level >= DebugLevel::Verbose,
        }
    }

    pub fn error(&self, component: &'static str, message: impl Into<String>) {
        self.emit(Severity::Error, component, message);
    }

    pub fn basic(&self, component: &'static str, message: impl Into<String>) {
        self.emit(Severity::Basic, component, message);
    }

    pub fn trace(&self, component: &'static str, message: impl Into<String>) {
        self.emit(Severity::Trace, component, message);
    }

    fn emit(&self, severity: Severity, component: &'static str, message: impl Into<String>) {
        if self.enabled(severity) {
            self.sink.emit(&Diagnostic {
                severity,
                component,
                message: message.into(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_gating() {
        let sink = Arc::new(MemorySink::new());
        let diag = Diagnostics::new(DebugLevel::Basic, sink.clone());
        diag.error("QueryEngine", "boom");
        diag.basic("QueryEngine", "connecting");
        diag.trace("QueryEngine", "buffer size 12");

        let lines = sink.diagnostics();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].to_string(), "[Error][QueryEngine]: boom");
        assert_eq!(lines[1].to_string(), "[QueryEngine]: connecting");
    }

    #[test]
    fn test_silent_still_reports_errors() {
        let sink = Arc::new(MemorySink::new());
        let diag = Diagnostics::new(DebugLevel::Silent, sink.clone());
        diag.basic("ResultStream", "hidden");
        assert!(sink.is_empty());
        diag.error("ResultStream", "shown");
        assert_eq!(sink.from_component("ResultStream").len(), 1);
    }

    #[test]
    fn test_numeric_levels() {
        assert_eq!(DebugLevel::from_level(0), DebugLevel::Silent);
        assert_eq!(DebugLevel::from_level(1), DebugLevel::Basic);
        assert_eq!(DebugLevel::from_level(2), DebugLevel::Verbose);
        assert_eq!(DebugLevel::from_level(9), DebugLevel::Verbose);
    }
}
