//! Reporting of SQL engine error chains.
//!
//! The transaction manager hands every error that forces a rollback to the active
//! [`DiagnosticSink`] before wrapping it. Sinks only observe; they never change the outcome.

use std::cell::RefCell;
use std::sync::{Arc, Mutex};

use crate::error::SqlContextError;

pub trait DiagnosticSink: Send + Sync {
    fn report(&self, error: &SqlContextError);
}

/// Emits each report line through `tracing::error!`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDiagnostics;

impl DiagnosticSink for TracingDiagnostics {
    fn report(&self, error: &SqlContextError) {
        for line in diagnostic_report(error) {
            tracing::error!(target: "sql_context::diagnostics", "{line}");
        }
    }
}

/// Keeps report lines in memory.
#[derive(Debug, Default)]
pub struct MemoryDiagnostics {
    lines: Mutex<Vec<String>>,
}

impl MemoryDiagnostics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl DiagnosticSink for MemoryDiagnostics {
    fn report(&self, error: &SqlContextError) {
        let mut lines = self
            .lines
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        lines.extend(diagnostic_report(error));
    }
}

/// Human-readable report: one line per error in the chain, plus one line per batch outcome.
#[must_use]
pub fn diagnostic_report(error: &SqlContextError) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = Some(error);
    while let Some(err) = current {
        let next = next_in_chain(err);
        match err {
            SqlContextError::Driver {
                message,
                sql_state,
                vendor_code,
                ..
            } => {
                let label = if next.is_some() {
                    "Driver error"
                } else {
                    "Driver error (last)"
                };
                lines.push(format!(
                    "{label} Message: {message}\n{label} SQLState: {}\n{label} Error Code: {}",
                    sql_state.as_deref().unwrap_or("n/a"),
                    vendor_code.map_or_else(|| "n/a".to_owned(), |c| c.to_string()),
                ));
            }
            SqlContextError::BatchExecution { outcomes, .. } => {
                lines.push(format!("Batch Update Failed: {err}"));
                for (idx, outcome) in outcomes.iter().enumerate() {
                    lines.push(format!("Statement {}: {outcome}", idx + 1));
                }
            }
            SqlContextError::TransactionRolledBack { .. } => {}
            _ => lines.push(format!("Error: {err}")),
        }
        current = next;
    }
    lines
}

fn next_in_chain(error: &SqlContextError) -> Option<&SqlContextError> {
    match error {
        SqlContextError::Driver { next, .. } => next.as_deref(),
        SqlContextError::BatchExecution { source, .. }
        | SqlContextError::TransactionRolledBack { source } => Some(source),
        _ => None,
    }
}

thread_local! {
    static SINK: RefCell<Option<Arc<dyn DiagnosticSink>>> = const { RefCell::new(None) };
}

struct RestoreSink(Option<Arc<dyn DiagnosticSink>>);

impl Drop for RestoreSink {
    fn drop(&mut self) {
        let previous = self.0.take();
        SINK.with_borrow_mut(|slot| *slot = previous);
    }
}

/// Run `body` with `sink` receiving the reports of connection scopes opened inside it.
pub fn with_diagnostics<R>(sink: Arc<dyn DiagnosticSink>, body: impl FnOnce() -> R) -> R {
    let previous = SINK.with_borrow_mut(|slot| slot.replace(sink));
    let _restore = RestoreSink(previous);
    body()
}

/// The sink bound on this thread, defaulting to [`TracingDiagnostics`].
#[must_use]
pub fn current_diagnostics() -> Arc<dyn DiagnosticSink> {
    SINK.with_borrow(|slot| {
        slot.clone()
            .unwrap_or_else(|| Arc::new(TracingDiagnostics) as Arc<dyn DiagnosticSink>)
    })
}
