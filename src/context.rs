//! The ambient execution context: current connection, transaction nesting level and the
//! rollback flag shared by every transaction scope of one connection scope.
//!
//! The context is bound per thread. A scope installs its context with [`bind`] and the previous
//! one comes back when the scope ends, whether it returns, errors or unwinds.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use crate::diagnostics::{DiagnosticSink, current_diagnostics};
use crate::driver::Connection;
use crate::error::SqlContextError;

/// Shared handle to the connection of the active connection scope.
pub type ConnectionRef = Rc<dyn Connection>;

#[derive(Clone)]
pub struct ExecutionContext {
    connection: ConnectionRef,
    nesting_level: usize,
    rollback: Rc<Cell<bool>>,
    diagnostics: Arc<dyn DiagnosticSink>,
}

impl ExecutionContext {
    /// Fresh context for a new connection scope: level 0, rollback cleared.
    pub(crate) fn new(connection: ConnectionRef) -> Self {
        Self {
            connection,
            nesting_level: 0,
            rollback: Rc::new(Cell::new(false)),
            diagnostics: current_diagnostics(),
        }
    }

    /// Derived copy one transaction level deeper, sharing the rollback cell.
    pub(crate) fn nested(&self) -> Self {
        Self {
            connection: Rc::clone(&self.connection),
            nesting_level: self.nesting_level + 1,
            rollback: Rc::clone(&self.rollback),
            diagnostics: Arc::clone(&self.diagnostics),
        }
    }

    #[must_use]
    pub fn connection(&self) -> &ConnectionRef {
        &self.connection
    }

    #[must_use]
    pub fn nesting_level(&self) -> usize {
        self.nesting_level
    }

    #[must_use]
    pub fn rollback(&self) -> bool {
        self.rollback.get()
    }

    pub fn set_rollback(&self, value: bool) {
        self.rollback.set(value);
    }

    pub(crate) fn diagnostics(&self) -> &Arc<dyn DiagnosticSink> {
        &self.diagnostics
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("nesting_level", &self.nesting_level)
            .field("rollback", &self.rollback.get())
            .finish_non_exhaustive()
    }
}

thread_local! {
    static CURRENT: RefCell<Option<ExecutionContext>> = const { RefCell::new(None) };
}

struct Unbind(Option<ExecutionContext>);

impl Drop for Unbind {
    fn drop(&mut self) {
        let previous = self.0.take();
        CURRENT.with_borrow_mut(|slot| *slot = previous);
    }
}

/// Run `body` with `context` as this thread's execution context.
pub(crate) fn bind<R>(context: ExecutionContext, body: impl FnOnce() -> R) -> R {
    let previous = CURRENT.with_borrow_mut(|slot| slot.replace(context));
    let _unbind = Unbind(previous);
    body()
}

/// Snapshot of the active execution context.
#[must_use]
pub fn current_context() -> Option<ExecutionContext> {
    CURRENT.with_borrow(Clone::clone)
}

pub(crate) fn require_context(operation: &'static str) -> Result<ExecutionContext, SqlContextError> {
    current_context().ok_or(SqlContextError::NoActiveConnection(operation))
}

/// The connection of the active connection scope, if any.
#[must_use]
pub fn current_connection() -> Option<ConnectionRef> {
    CURRENT.with_borrow(|slot| slot.as_ref().map(|ctx| Rc::clone(&ctx.connection)))
}

/// The connection of the active connection scope.
///
/// # Errors
/// Returns [`SqlContextError::NoActiveConnection`] outside `with_connection`.
pub fn require_connection() -> Result<ConnectionRef, SqlContextError> {
    current_connection().ok_or(SqlContextError::NoActiveConnection("require_connection"))
}

/// Transaction nesting level; 0 outside any transaction scope.
#[must_use]
pub fn nesting_level() -> usize {
    CURRENT.with_borrow(|slot| slot.as_ref().map_or(0, ExecutionContext::nesting_level))
}

/// Whether the enclosing outermost transaction will roll back instead of committing.
///
/// # Errors
/// Returns [`SqlContextError::NoActiveConnection`] outside `with_connection`.
pub fn get_rollback() -> Result<bool, SqlContextError> {
    Ok(require_context("get_rollback")?.rollback())
}

/// Mark (or unmark) the enclosing outermost transaction for rollback.
///
/// # Errors
/// Returns [`SqlContextError::NoActiveConnection`] outside `with_connection`.
pub fn set_rollback(value: bool) -> Result<(), SqlContextError> {
    require_context("set_rollback")?.set_rollback(value);
    Ok(())
}
