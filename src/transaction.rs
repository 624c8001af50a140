//! Nested transaction scopes.
//!
//! Only the outermost [`with_transaction`] on a connection owns a database transaction. Inner
//! scopes run their body inline and leave every commit/rollback decision to it; the rollback
//! flag they can set through [`crate::context::set_rollback`] is shared with the outermost
//! scope, which reads it once when the body is done.
//!
//! ```rust,no_run
//! use sql_context::prelude::*;
//!
//! # fn demo(spec: &ConnectionSpec) -> Result<(), SqlContextError> {
//! with_connection(spec, || {
//!     with_transaction(|| {
//!         do_commands(&["UPDATE accounts SET balance = balance - 10 WHERE id = 1"])?;
//!         with_transaction(|| {
//!             // absorbed: no commit here
//!             do_commands(&["UPDATE accounts SET balance = balance + 10 WHERE id = 2"])
//!         })?;
//!         Ok(())
//!     })
//! })
//! # }
//! ```

use tracing::{debug, warn};

use crate::context::{self, ExecutionContext};
use crate::error::SqlContextError;

/// Run `body` inside a transaction on the current connection.
///
/// At nesting level 1 this saves the auto-commit setting, turns it off, runs `body` and then,
/// exactly once, commits (or rolls back if the rollback flag is set), clears the flag and
/// restores auto-commit. At deeper levels `body` runs as part of the enclosing transaction.
///
/// An error from `body` in the outermost scope is reported to the diagnostic sink, forces the
/// rollback and comes back wrapped in [`SqlContextError::TransactionRolledBack`].
///
/// # Errors
/// - [`SqlContextError::NoActiveConnection`] outside `with_connection`.
/// - [`SqlContextError::TransactionRolledBack`] if `body` failed or the commit failed.
/// - Driver errors from reading or changing auto-commit, from an explicit rollback, or from
///   restoring auto-commit after a successful body.
pub fn with_transaction<T, F>(body: F) -> Result<T, SqlContextError>
where
    F: FnOnce() -> Result<T, SqlContextError>,
{
    let ctx = context::require_context("with_transaction")?.nested();
    if ctx.nesting_level() > 1 {
        debug!(level = ctx.nesting_level(), "joining enclosing transaction");
        return context::bind(ctx, body);
    }
    context::bind(ctx.clone(), || run_outermost(&ctx, body))
}

fn run_outermost<T, F>(ctx: &ExecutionContext, body: F) -> Result<T, SqlContextError>
where
    F: FnOnce() -> Result<T, SqlContextError>,
{
    let connection = ctx.connection();
    let saved_auto_commit = connection.auto_commit()?;
    connection.set_auto_commit(false)?;
    debug!(saved_auto_commit, "transaction started");

    let mut finalizer = Finalizer {
        ctx,
        saved_auto_commit,
        armed: true,
    };

    let outcome = body().inspect_err(|err| {
        ctx.diagnostics().report(err);
        ctx.set_rollback(true);
    });
    let settled = finalizer.settle();

    match outcome {
        Ok(value) => {
            settled.decision?;
            settled.restore?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = settled.decision {
                warn!(error = %rollback_err, "rollback after failed body also failed");
            }
            if let Err(restore_err) = settled.restore {
                warn!(error = %restore_err, "restoring auto-commit after rollback failed");
            }
            Err(SqlContextError::rolled_back(err))
        }
    }
}

struct Settled {
    decision: Result<(), SqlContextError>,
    restore: Result<(), SqlContextError>,
}

/// Ends the outermost transaction. Runs once: explicitly via `settle`, or from `Drop` when the
/// body unwinds.
struct Finalizer<'a> {
    ctx: &'a ExecutionContext,
    saved_auto_commit: bool,
    armed: bool,
}

impl Finalizer<'_> {
    fn settle(&mut self) -> Settled {
        self.armed = false;
        let connection = self.ctx.connection();
        let decision = if self.ctx.rollback() {
            debug!("rolling back transaction");
            connection.rollback()
        } else {
            debug!("committing transaction");
            connection.commit().or_else(|commit_err| {
                self.ctx.diagnostics().report(&commit_err);
                if let Err(rollback_err) = connection.rollback() {
                    warn!(error = %rollback_err, "rollback after failed commit also failed");
                }
                Err(SqlContextError::rolled_back(commit_err))
            })
        };
        self.ctx.set_rollback(false);
        let restore = connection.set_auto_commit(self.saved_auto_commit);
        Settled { decision, restore }
    }
}

impl Drop for Finalizer<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.armed = false;
        let connection = self.ctx.connection();
        warn!("transaction body panicked; rolling back");
        if let Err(err) = connection.rollback() {
            warn!(error = %err, "rollback during unwind failed");
        }
        self.ctx.set_rollback(false);
        if let Err(err) = connection.set_auto_commit(self.saved_auto_commit) {
            warn!(error = %err, "restoring auto-commit during unwind failed");
        }
    }
}
