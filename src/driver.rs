//! Interface to the underlying SQL engine.
//!
//! Everything below is implemented by a driver (see [`crate::sqlite`] for the bundled one) and
//! consumed by the connection, transaction and statement layers. The layers above never talk
//! to a database any other way.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, LazyLock, RwLock};

use crate::error::SqlContextError;
use crate::types::RowValues;

/// Free-form string properties handed to drivers, factories and directory lookups.
pub type Properties = BTreeMap<String, String>;

/// Outcome the engine reports for one entry of an executed batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Number of rows the statement changed.
    RowCount(u64),
    /// The statement succeeded but the driver cannot say how many rows it touched.
    SuccessNoInfo,
    /// The statement failed.
    ExecuteFailed,
}

impl fmt::Display for BatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchOutcome::RowCount(n) => write!(f, "{n} row(s) affected"),
            BatchOutcome::SuccessNoInfo => f.write_str("succeeded, row count unavailable"),
            BatchOutcome::ExecuteFailed => f.write_str("execution failed"),
        }
    }
}

/// A live connection to the SQL engine.
///
/// Methods take `&self`: statements borrow the connection while they are open, and a nested
/// call may prepare another statement on the same connection meanwhile.
pub trait Connection {
    /// Current auto-commit setting.
    ///
    /// # Errors
    /// Returns the driver's error if the setting cannot be read.
    fn auto_commit(&self) -> Result<bool, SqlContextError>;

    /// Change the auto-commit setting.
    ///
    /// # Errors
    /// Returns the driver's error if the setting cannot be changed.
    fn set_auto_commit(&self, enabled: bool) -> Result<(), SqlContextError>;

    /// # Errors
    /// Returns the driver's error if the commit fails.
    fn commit(&self) -> Result<(), SqlContextError>;

    /// # Errors
    /// Returns the driver's error if the rollback fails.
    fn rollback(&self) -> Result<(), SqlContextError>;

    /// Prepare `sql`, optionally asking the engine to keep generated keys around.
    ///
    /// # Errors
    /// Returns the driver's error if the statement does not compile.
    fn prepare<'c>(
        &'c self,
        sql: &str,
        return_generated_keys: bool,
    ) -> Result<Box<dyn Statement + 'c>, SqlContextError>;

    /// Release the connection. Called exactly once by the owning connection scope.
    ///
    /// # Errors
    /// Returns the driver's error if the connection cannot be closed cleanly.
    fn close(&self) -> Result<(), SqlContextError>;
}

/// A prepared statement. Dropping it releases the statement.
pub trait Statement {
    /// Bind `value` to the 1-based positional parameter `index`.
    ///
    /// # Errors
    /// Returns the driver's error if the index is out of range or the value is unsupported.
    fn bind(&mut self, index: usize, value: &RowValues) -> Result<(), SqlContextError>;

    /// Snapshot the currently bound parameters as one batch entry.
    ///
    /// # Errors
    /// Returns the driver's error if the entry cannot be queued.
    fn add_batch(&mut self) -> Result<(), SqlContextError>;

    /// Run every queued batch entry in order.
    ///
    /// # Errors
    /// Returns [`SqlContextError::BatchExecution`] carrying per-entry outcomes on partial failure.
    fn execute_batch(&mut self) -> Result<Vec<BatchOutcome>, SqlContextError>;

    /// First generated-key row of the last execution as `(column names, values)`.
    ///
    /// # Errors
    /// Returns the driver's error if keys were not requested or cannot be read.
    fn generated_keys(&mut self) -> Result<Option<(Vec<String>, Vec<RowValues>)>, SqlContextError>;

    /// Execute with the bound parameters and open a cursor over the result.
    ///
    /// # Errors
    /// Returns the driver's error if execution fails.
    fn query<'s>(&'s mut self) -> Result<Box<dyn Cursor + 's>, SqlContextError>;
}

/// An open result cursor. Dropping it closes the cursor.
pub trait Cursor {
    /// Column labels as reported by the driver.
    fn columns(&self) -> &[String];

    /// Fetch the next row, or `None` once the cursor is exhausted.
    ///
    /// # Errors
    /// Returns the driver's error if fetching fails.
    fn next_row(&mut self) -> Result<Option<Vec<RowValues>>, SqlContextError>;
}

/// Opens connections for a subprotocol (`sqlite`, `postgresql`, ...).
pub trait Driver: Send + Sync {
    /// # Errors
    /// Returns the driver's error if the connection cannot be opened.
    fn connect(
        &self,
        subname: &str,
        properties: &Properties,
    ) -> Result<Box<dyn Connection>, SqlContextError>;
}

/// A pre-built connection source.
pub trait DataSource: Send + Sync {
    /// # Errors
    /// Returns the source's error if no connection can be produced.
    fn connect(&self) -> Result<Box<dyn Connection>, SqlContextError>;

    /// # Errors
    /// Returns the source's error if no connection can be produced for these credentials.
    fn connect_as(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Box<dyn Connection>, SqlContextError>;
}

/// Resolves a directory name to a [`DataSource`].
pub trait NamingContext: Send + Sync {
    /// # Errors
    /// Returns [`SqlContextError::ConnectionError`] if nothing is bound under `name`.
    fn lookup(
        &self,
        name: &str,
        environment: &Properties,
    ) -> Result<Arc<dyn DataSource>, SqlContextError>;
}

static DRIVERS: LazyLock<RwLock<HashMap<String, Arc<dyn Driver>>>> = LazyLock::new(|| {
    #[allow(unused_mut)]
    let mut drivers: HashMap<String, Arc<dyn Driver>> = HashMap::new();
    #[cfg(feature = "sqlite")]
    drivers.insert("sqlite".to_owned(), Arc::new(crate::sqlite::SqliteDriver));
    RwLock::new(drivers)
});

static NAMING_CONTEXT: LazyLock<RwLock<Option<Arc<dyn NamingContext>>>> =
    LazyLock::new(|| RwLock::new(None));

/// Register (or replace) the driver used for `subprotocol`.
pub fn register_driver(subprotocol: impl Into<String>, driver: Arc<dyn Driver>) {
    let mut drivers = DRIVERS.write().unwrap_or_else(std::sync::PoisonError::into_inner);
    drivers.insert(subprotocol.into(), driver);
}

/// Look up the driver registered for `subprotocol`.
///
/// # Errors
/// Returns [`SqlContextError::ConnectionError`] if no driver is registered.
pub fn driver_for(subprotocol: &str) -> Result<Arc<dyn Driver>, SqlContextError> {
    let drivers = DRIVERS.read().unwrap_or_else(std::sync::PoisonError::into_inner);
    drivers.get(subprotocol).cloned().ok_or_else(|| {
        SqlContextError::ConnectionError(format!("no driver registered for subprotocol {subprotocol:?}"))
    })
}

/// Install the process-wide naming context used by directory descriptors.
pub fn set_naming_context(context: Arc<dyn NamingContext>) {
    let mut slot = NAMING_CONTEXT
        .write()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    *slot = Some(context);
}

pub(crate) fn naming_context() -> Result<Arc<dyn NamingContext>, SqlContextError> {
    let slot = NAMING_CONTEXT
        .read()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    slot.clone().ok_or_else(|| {
        SqlContextError::ConnectionError("no naming context installed for directory lookup".into())
    })
}

/// A naming context backed by an in-process map.
#[derive(Default)]
pub struct InMemoryDirectory {
    entries: RwLock<HashMap<String, Arc<dyn DataSource>>>,
}

impl InMemoryDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&self, name: impl Into<String>, source: Arc<dyn DataSource>) {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        entries.insert(name.into(), source);
    }
}

impl NamingContext for InMemoryDirectory {
    fn lookup(
        &self,
        name: &str,
        _environment: &Properties,
    ) -> Result<Arc<dyn DataSource>, SqlContextError> {
        let entries = self
            .entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        entries
            .get(name)
            .cloned()
            .ok_or_else(|| SqlContextError::ConnectionError(format!("name not bound: {name}")))
    }
}
