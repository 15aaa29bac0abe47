//! Pluggable append-only diagnostic sinks
//!
//! The solver and selector report degenerate geometry, missing roots and
//! dropped pulses through a [`DiagnosticSink`] handed to them by the caller.
//! Recording is infallible from the caller's point of view: a sink that
//! cannot write swallows the failure and reports it through `tracing`.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::core::{DEFAULT_SINK_NAME, DIAGNOSTICS_TARGET};
use crate::validation::error::{Diagnostic, DiagnosticKind, Severity};

/// Append-only destination for diagnostics
pub trait DiagnosticSink: Send + Sync {
    fn record(&self, diagnostic: &Diagnostic);
}

impl<T: DiagnosticSink + ?Sized> DiagnosticSink for Arc<T> {
    fn record(&self, diagnostic: &Diagnostic) {
        (**self).record(diagnostic)
    }
}

impl<T: DiagnosticSink + ?Sized> DiagnosticSink for Box<T> {
    fn record(&self, diagnostic: &Diagnostic) {
        (**self).record(diagnostic)
    }
}

/// Emits diagnostics as `tracing` events.
///
/// Events always use the `discharge_locator::diagnostics` target, which is
/// what subscriber filters match on. The sink name is attached as the `sink`
/// field to tell several sinks apart in one log.
#[derive(Debug, Clone)]
pub struct TracingSink {
    name: String,
}

impl Default for TracingSink {
    fn default() -> Self {
        Self::new(DEFAULT_SINK_NAME)
    }
}

impl TracingSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl DiagnosticSink for TracingSink {
    fn record(&self, diagnostic: &Diagnostic) {
        let kind = diagnostic.kind.name();
        match diagnostic.severity {
            Severity::Error => tracing::error!(
                target: DIAGNOSTICS_TARGET,
                sink = %self.name,
                kind,
                "{}",
                diagnostic.message
            ),
            Severity::Warning => tracing::warn!(
                target: DIAGNOSTICS_TARGET,
                sink = %self.name,
                kind,
                "{}",
                diagnostic.message
            ),
            Severity::Info => tracing::info!(
                target: DIAGNOSTICS_TARGET,
                sink = %self.name,
                kind,
                "{}",
                diagnostic.message
            ),
        }
    }
}

/// Appends one line per diagnostic to a file
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    min_severity: Severity,
    // serialises appends from parallel rotation workers
    lock: Mutex<()>,
}

impl FileSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            min_severity: Severity::Warning,
            lock: Mutex::new(()),
        }
    }

    /// Only records at or above `severity` are written
    pub fn with_min_severity(mut self, severity: Severity) -> Self {
        self.min_severity = severity;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, line: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{}", line)
    }
}

impl DiagnosticSink for FileSink {
    fn record(&self, diagnostic: &Diagnostic) {
        if diagnostic.severity < self.min_severity {
            return;
        }

        let _guard = match self.lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Err(e) = self.append(&diagnostic.to_string()) {
            tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "failed to append diagnostic"
            );
        }
    }
}

/// Keeps diagnostics in memory with per-kind counts
#[derive(Debug, Default)]
pub struct MemorySink {
    state: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    history: Vec<Diagnostic>,
    counts: HashMap<DiagnosticKind, usize>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.with_state(|state| state.history.clone())
    }

    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.with_state(|state| state.counts.get(&kind).copied().unwrap_or(0))
    }

    pub fn len(&self) -> usize {
        self.with_state(|state| state.history.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.with_state(|state| {
            state.history.clear();
            state.counts.clear();
        })
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut MemoryState) -> R) -> R {
        let mut guard = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }
}

impl DiagnosticSink for MemorySink {
    fn record(&self, diagnostic: &Diagnostic) {
        self.with_state(|state| {
            *state.counts.entry(diagnostic.kind).or_insert(0) += 1;
            state.history.push(diagnostic.clone());
        })
    }
}

/// Forwards every record to each inner sink
#[derive(Default)]
pub struct TeeSink {
    sinks: Vec<Box<dyn DiagnosticSink>>,
}

impl TeeSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: impl DiagnosticSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl DiagnosticSink for TeeSink {
    fn record(&self, diagnostic: &Diagnostic) {
        for sink in &self.sinks {
            sink.record(diagnostic);
        }
    }
}
