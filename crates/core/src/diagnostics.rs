//! Diagnostic sinks for swallowed failure-callback errors.
//!
//! A `catch` handler has no downstream consumer, so when the handler itself
//! fails (returns `Err` or panics) the failure is routed to a sink instead of
//! being re-raised.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::DiagnosticsMode;
use crate::error::Failure;

/// Where a failing callback was invoked from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackOrigin {
    /// Handler passed to `catch` on an already failed result.
    Catch,
    /// Handler queued on a pending result and run when it failed.
    QueuedHook,
}

impl fmt::Display for CallbackOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Catch => write!(f, "catch"),
            Self::QueuedHook => write!(f, "queued_hook"),
        }
    }
}

/// A failure raised by a failure callback.
#[derive(Debug, Clone)]
pub struct CallbackFailure {
    /// How the callback was invoked.
    pub origin: CallbackOrigin,
    /// The failure the callback was handling.
    pub upstream: Failure,
    /// What the callback itself failed with.
    pub cause: Failure,
}

impl fmt::Display for CallbackFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} callback failed while handling '{}': {}",
            self.origin, self.upstream, self.cause
        )
    }
}

/// Trait for diagnostic sinks.
pub trait DiagnosticSink: Send + Sync {
    /// Record a callback failure. Must not panic.
    fn report(&self, failure: &CallbackFailure);
}

impl<S: DiagnosticSink + ?Sized> DiagnosticSink for Arc<S> {
    fn report(&self, failure: &CallbackFailure) {
        (**self).report(failure);
    }
}

/// Sink that logs every report through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&self, failure: &CallbackFailure) {
        tracing::error!(
            origin = %failure.origin,
            upstream = %failure.upstream,
            cause = %failure.cause,
            "Failure callback failed"
        );
    }
}

/// Sink that drops every report.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentSink;

impl DiagnosticSink for SilentSink {
    fn report(&self, _failure: &CallbackFailure) {}
}

/// In-memory sink that keeps every report, in arrival order.
#[derive(Debug, Default)]
pub struct MemorySink {
    reports: Mutex<Vec<CallbackFailure>>,
}

impl MemorySink {
    /// Create an empty memory sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty memory sink wrapped in an Arc.
    pub fn new_arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Snapshot of the reports received so far.
    pub fn reports(&self) -> Vec<CallbackFailure> {
        self.reports.lock().clone()
    }

    /// Number of reports received so far.
    pub fn len(&self) -> usize {
        self.reports.lock().len()
    }

    /// Returns `true` if nothing has been reported.
    pub fn is_empty(&self) -> bool {
        self.reports.lock().is_empty()
    }
}

impl DiagnosticSink for MemorySink {
    fn report(&self, failure: &CallbackFailure) {
        self.reports.lock().push(failure.clone());
    }
}

/// Build the default sink for a diagnostics mode.
pub(crate) fn sink_for(mode: DiagnosticsMode) -> Arc<dyn DiagnosticSink> {
    match mode {
        DiagnosticsMode::Tracing => Arc::new(TracingSink),
        DiagnosticsMode::Silent => Arc::new(SilentSink),
    }
}
