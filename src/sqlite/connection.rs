use std::cell::Cell;
use std::time::Duration;

use tracing::debug;

use crate::driver::{Connection, Driver, Properties, Statement};
use crate::error::SqlContextError;

use super::statement::SqliteStatement;

/// Driver registered under the `sqlite` subprotocol. The subname is the database path.
///
/// Recognized properties: `busy_timeout` (milliseconds) and `foreign_keys` (`true`/`false`).
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteDriver;

impl Driver for SqliteDriver {
    fn connect(
        &self,
        subname: &str,
        properties: &Properties,
    ) -> Result<Box<dyn Connection>, SqlContextError> {
        let conn = rusqlite::Connection::open(subname)?;
        if let Some(ms) = properties.get("busy_timeout") {
            let ms: u64 = ms.parse().map_err(|e| {
                SqlContextError::ConfigError(format!("busy_timeout must be milliseconds: {e}"))
            })?;
            conn.busy_timeout(Duration::from_millis(ms))?;
        }
        if let Some(flag) = properties.get("foreign_keys") {
            let on = matches!(flag.as_str(), "true" | "1" | "on");
            conn.pragma_update(None, "foreign_keys", on)?;
        }
        debug!(path = subname, "sqlite connection opened");
        Ok(Box::new(SqliteConnection::new(conn)))
    }
}

/// `SQLite` connection with JDBC-style auto-commit.
///
/// `SQLite` has no auto-commit switch, so turning it off issues `BEGIN`. After a commit or
/// rollback the next statement execution opens a new transaction while auto-commit stays off;
/// turning it back on commits whatever is open.
pub struct SqliteConnection {
    conn: rusqlite::Connection,
    auto_commit: Cell<bool>,
    closed: Cell<bool>,
}

impl SqliteConnection {
    #[must_use]
    pub fn new(conn: rusqlite::Connection) -> Self {
        Self {
            conn,
            auto_commit: Cell::new(true),
            closed: Cell::new(false),
        }
    }

    /// Open an in-memory database.
    ///
    /// # Errors
    /// Returns the rusqlite error if the database cannot be opened.
    pub fn open_in_memory() -> Result<Self, SqlContextError> {
        Ok(Self::new(rusqlite::Connection::open_in_memory()?))
    }

    /// Borrow the underlying rusqlite connection.
    #[must_use]
    pub fn raw(&self) -> &rusqlite::Connection {
        &self.conn
    }

    fn ensure_open(&self) -> Result<(), SqlContextError> {
        if self.closed.get() {
            return Err(SqlContextError::ConnectionError(
                "SQLite connection already closed".into(),
            ));
        }
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }

    /// Open a transaction if auto-commit is off and none is running.
    pub(crate) fn ensure_transaction(&self) -> Result<(), SqlContextError> {
        self.ensure_open()?;
        if !self.auto_commit.get() && !self.in_transaction() {
            self.conn.execute_batch("BEGIN")?;
        }
        Ok(())
    }

    fn finish(&self, verb: &str) -> Result<(), SqlContextError> {
        self.ensure_open()?;
        if self.auto_commit.get() {
            return Err(SqlContextError::ExecutionError(format!(
                "cannot {verb}: connection is in auto-commit mode"
            )));
        }
        if self.in_transaction() {
            self.conn.execute_batch(verb)?;
        }
        Ok(())
    }
}

impl Connection for SqliteConnection {
    fn auto_commit(&self) -> Result<bool, SqlContextError> {
        self.ensure_open()?;
        Ok(self.auto_commit.get())
    }

    fn set_auto_commit(&self, enabled: bool) -> Result<(), SqlContextError> {
        self.ensure_open()?;
        if enabled == self.auto_commit.get() {
            return Ok(());
        }
        if enabled {
            if self.in_transaction() {
                self.conn.execute_batch("COMMIT")?;
            }
        } else if !self.in_transaction() {
            self.conn.execute_batch("BEGIN")?;
        }
        self.auto_commit.set(enabled);
        Ok(())
    }

    fn commit(&self) -> Result<(), SqlContextError> {
        self.finish("COMMIT")
    }

    fn rollback(&self) -> Result<(), SqlContextError> {
        self.finish("ROLLBACK")
    }

    fn prepare<'c>(
        &'c self,
        sql: &str,
        return_generated_keys: bool,
    ) -> Result<Box<dyn Statement + 'c>, SqlContextError> {
        self.ensure_open()?;
        let stmt = self.conn.prepare(sql)?;
        Ok(Box::new(SqliteStatement::new(self, stmt, return_generated_keys)))
    }

    fn close(&self) -> Result<(), SqlContextError> {
        if self.closed.replace(true) {
            return Ok(());
        }
        if self.in_transaction() {
            self.conn.execute_batch("ROLLBACK")?;
        }
        Ok(())
    }
}
