use thiserror::Error;

use crate::driver::BatchOutcome;

#[derive(Debug, Error)]
pub enum SqlContextError {
    /// The connection descriptor matched none (or more than one) of the recognized shapes.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("no active connection: {0} must run inside with_connection")]
    NoActiveConnection(&'static str),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Partial batch failure; `outcomes` holds one entry per statement the driver reported on.
    #[error("batch execution failed: {source}")]
    BatchExecution {
        outcomes: Vec<BatchOutcome>,
        #[source]
        source: Box<SqlContextError>,
    },

    /// An error reported by the SQL engine, optionally chained to the next error it raised.
    #[error("{message}")]
    Driver {
        message: String,
        sql_state: Option<String>,
        vendor_code: Option<i32>,
        #[source]
        next: Option<Box<SqlContextError>>,
    },

    /// The only error that crosses the outermost transaction boundary.
    #[error("transaction rolled back: {source}")]
    TransactionRolledBack {
        #[source]
        source: Box<SqlContextError>,
    },

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("SQL execution error: {0}")]
    ExecutionError(String),
}

impl SqlContextError {
    /// Driver error with just a message.
    #[must_use]
    pub fn driver(message: impl Into<String>) -> Self {
        SqlContextError::Driver {
            message: message.into(),
            sql_state: None,
            vendor_code: None,
            next: None,
        }
    }

    /// Wrap an error that escaped an outermost transaction scope.
    #[must_use]
    pub fn rolled_back(cause: SqlContextError) -> Self {
        SqlContextError::TransactionRolledBack {
            source: Box::new(cause),
        }
    }

    /// The cause carried by a `TransactionRolledBack`, if this is one.
    #[must_use]
    pub fn rollback_cause(&self) -> Option<&SqlContextError> {
        match self {
            SqlContextError::TransactionRolledBack { source } => Some(source),
            _ => None,
        }
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for SqlContextError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(ffi_err, msg) => SqlContextError::Driver {
                message: msg.clone().unwrap_or_else(|| ffi_err.to_string()),
                sql_state: None,
                vendor_code: Some(ffi_err.extended_code),
                next: None,
            },
            _ => SqlContextError::driver(err.to_string()),
        }
    }
}
