//! Convenient imports for common functionality.

pub use crate::config::ConnectionSpec;
pub use crate::connection::with_connection;
pub use crate::context::{
    current_connection, get_rollback, nesting_level, require_connection, set_rollback,
};
pub use crate::diagnostics::{DiagnosticSink, MemoryDiagnostics, with_diagnostics};
pub use crate::driver::BatchOutcome;
pub use crate::error::SqlContextError;
pub use crate::executor::{
    BatchResult, QueryAndParams, do_commands, execute_batch, execute_query, insert_values,
};
pub use crate::identifier::{
    Identifier, NamingStrategy, Stropping, render_identifier, with_naming_strategy,
    with_stropping,
};
pub use crate::results::{Row, Rows};
pub use crate::transaction::with_transaction;
pub use crate::types::{Dialect, RowValues};
