//! Ambient connection scopes, nested transactions and identifier rendering over a generic SQL
//! driver interface.
//!
//! ```rust,no_run
//! use sql_context::prelude::*;
//!
//! # fn demo() -> Result<(), SqlContextError> {
//! let spec = ConnectionSpec::sqlite("app.db");
//! with_connection(&spec, || {
//!     do_commands(&["CREATE TABLE IF NOT EXISTS users (id INTEGER PRIMARY KEY, name TEXT)"])?;
//!     with_transaction(|| {
//!         insert_values("users", &["name"], &[vec!["alice".into()], vec!["bob".into()]])?;
//!         if nesting_level() > 1 {
//!             set_rollback(true)?;
//!         }
//!         Ok(())
//!     })
//! })
//! # }
//! ```

pub mod config;
pub mod connection;
pub mod context;
pub mod diagnostics;
pub mod driver;
pub mod error;
pub mod executor;
pub mod identifier;
pub mod prelude;
pub mod results;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod transaction;
pub mod types;

pub use config::{ConnectionFactory, ConnectionSpec};
pub use connection::with_connection;
pub use context::{
    ConnectionRef, ExecutionContext, current_connection, current_context, get_rollback,
    nesting_level, require_connection, set_rollback,
};
pub use diagnostics::{
    DiagnosticSink, MemoryDiagnostics, TracingDiagnostics, diagnostic_report, with_diagnostics,
};
pub use driver::{
    BatchOutcome, Connection, Cursor, DataSource, Driver, InMemoryDirectory, NamingContext,
    Properties, Statement, register_driver, set_naming_context,
};
pub use error::SqlContextError;
pub use executor::{
    BatchResult, IntoQuery, QueryAndParams, do_commands, execute_batch, execute_query,
    insert_values,
};
pub use identifier::{
    Identifier, NamingStrategy, Stropping, SymbolicName, current_naming_strategy,
    current_stropping, outbound_identifier, render_identifier, with_naming_strategy,
    with_stropping,
};
pub use results::{Row, Rows};
pub use transaction::with_transaction;
pub use types::{Dialect, RowValues};
