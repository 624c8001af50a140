use std::rc::Rc;

use tracing::{debug, warn};

use crate::config::ConnectionSpec;
use crate::context::{self, ConnectionRef, ExecutionContext};
use crate::error::SqlContextError;

/// Closes the scope's connection exactly once, including when `body` unwinds.
struct CloseOnExit {
    connection: Option<ConnectionRef>,
}

impl CloseOnExit {
    fn close(mut self) -> Result<(), SqlContextError> {
        match self.connection.take() {
            Some(connection) => connection.close(),
            None => Ok(()),
        }
    }
}

impl Drop for CloseOnExit {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take()
            && let Err(err) = connection.close()
        {
            warn!(error = %err, "closing connection during unwind failed");
        }
    }
}

/// Open a connection for `spec` and run `body` with it as the current connection.
///
/// `body` sees a fresh execution context (nesting level 0, rollback cleared). The connection
/// is closed before this returns, whatever `body` did. Errors from `body` are passed through
/// untouched; a close failure is only returned when `body` itself succeeded.
///
/// ```rust,no_run
/// use sql_context::prelude::*;
///
/// # fn demo() -> Result<(), SqlContextError> {
/// let spec = ConnectionSpec::sqlite("app.db");
/// let total = with_connection(&spec, || {
///     execute_query(vec![RowValues::from("SELECT count(*) FROM users")], |rows| {
///         let first = rows.next().transpose()?;
///         Ok(first.and_then(|row| row.get_by_index(0).and_then(RowValues::as_int).copied()))
///     })
/// })?;
/// # let _ = total;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
/// Returns the connect error, the error from `body`, or the close error, in that order of
/// precedence.
pub fn with_connection<T, F>(spec: &ConnectionSpec, body: F) -> Result<T, SqlContextError>
where
    F: FnOnce() -> Result<T, SqlContextError>,
{
    let connection: ConnectionRef = Rc::from(spec.connect()?);
    debug!(descriptor = ?spec, "connection acquired");
    let guard = CloseOnExit {
        connection: Some(Rc::clone(&connection)),
    };

    let result = context::bind(ExecutionContext::new(connection), body);

    let closed = guard.close();
    debug!(ok = closed.is_ok(), "connection released");
    match (result, closed) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(close_err)) => Err(close_err),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(close_err)) => {
            warn!(error = %close_err, "closing connection failed after an error");
            Err(err)
        }
    }
}
