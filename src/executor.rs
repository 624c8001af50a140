//! Statement execution against the current connection.
//!
//! Every helper here reads the connection from the ambient context and runs its work inside
//! [`with_transaction`], so a call made inside an outer transaction simply joins it.

use std::sync::Arc;

use tracing::debug;

use crate::context::require_connection;
use crate::driver::{BatchOutcome, Statement};
use crate::error::SqlContextError;
use crate::identifier::{Identifier, outbound_identifier, render_identifier};
use crate::results::{Row, Rows};
use crate::transaction::with_transaction;
use crate::types::RowValues;

/// A query and its parameters bundled together.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryAndParams {
    /// The SQL query string
    pub query: String,
    /// The parameters to be bound to the query, in placeholder order
    pub params: Vec<RowValues>,
}

impl QueryAndParams {
    pub fn new(query: impl Into<String>, params: Vec<RowValues>) -> Self {
        Self {
            query: query.into(),
            params,
        }
    }

    pub fn new_without_params(query: impl Into<String>) -> Self {
        Self::new(query, Vec::new())
    }
}

/// Conversion into a validated [`QueryAndParams`].
///
/// Sequences must be headed by the SQL text, followed by the positional parameters. A bare
/// string is rejected: wrap it as `vec![RowValues::from(sql)]` or use [`QueryAndParams`].
pub trait IntoQuery {
    /// # Errors
    /// Returns [`SqlContextError::InvalidArgument`] if the shape is wrong.
    fn into_query(self) -> Result<QueryAndParams, SqlContextError>;
}

impl IntoQuery for QueryAndParams {
    fn into_query(self) -> Result<QueryAndParams, SqlContextError> {
        Ok(self)
    }
}

impl IntoQuery for Vec<RowValues> {
    fn into_query(self) -> Result<QueryAndParams, SqlContextError> {
        let mut values = self.into_iter();
        match values.next() {
            Some(RowValues::Text(query)) => Ok(QueryAndParams::new(query, values.collect())),
            Some(other) => Err(SqlContextError::InvalidArgument(format!(
                "query sequence must start with SQL text, got {other:?}"
            ))),
            None => Err(SqlContextError::InvalidArgument(
                "query sequence is empty; expected SQL text followed by parameters".into(),
            )),
        }
    }
}

impl IntoQuery for &[RowValues] {
    fn into_query(self) -> Result<QueryAndParams, SqlContextError> {
        self.to_vec().into_query()
    }
}

impl IntoQuery for &str {
    fn into_query(self) -> Result<QueryAndParams, SqlContextError> {
        Err(SqlContextError::InvalidArgument(format!(
            "expected a sequence of SQL text and parameters, got bare string {self:?}"
        )))
    }
}

impl IntoQuery for String {
    fn into_query(self) -> Result<QueryAndParams, SqlContextError> {
        self.as_str().into_query()
    }
}

/// What [`execute_batch`] hands back.
#[derive(Debug, Clone)]
pub enum BatchResult {
    /// One outcome per parameter group.
    RowCounts(Vec<BatchOutcome>),
    /// The first generated-key row, when keys were requested.
    GeneratedKeys(Option<Row>),
}

impl BatchResult {
    #[must_use]
    pub fn row_counts(&self) -> Option<&[BatchOutcome]> {
        match self {
            BatchResult::RowCounts(outcomes) => Some(outcomes),
            BatchResult::GeneratedKeys(_) => None,
        }
    }

    #[must_use]
    pub fn generated_keys(&self) -> Option<&Row> {
        match self {
            BatchResult::GeneratedKeys(row) => row.as_ref(),
            BatchResult::RowCounts(_) => None,
        }
    }
}

fn bind_all(stmt: &mut dyn Statement, params: &[RowValues]) -> Result<(), SqlContextError> {
    for (idx, value) in params.iter().enumerate() {
        stmt.bind(idx + 1, value)?;
    }
    Ok(())
}

/// Prepare `sql` once, queue one batch entry per parameter group and run the batch inside a
/// transaction. With no parameter groups the statement runs once without parameters.
///
/// # Errors
/// Returns [`SqlContextError::NoActiveConnection`] outside `with_connection`, prepare/bind
/// errors from the driver, or [`SqlContextError::TransactionRolledBack`] if execution fails.
pub fn execute_batch(
    sql: &str,
    param_groups: &[Vec<RowValues>],
    return_generated_keys: bool,
) -> Result<BatchResult, SqlContextError> {
    let connection = require_connection()?;
    debug!(sql, groups = param_groups.len(), "preparing batch");
    let mut stmt = connection.prepare(sql, return_generated_keys)?;
    if param_groups.is_empty() {
        stmt.add_batch()?;
    }
    for group in param_groups {
        bind_all(stmt.as_mut(), group)?;
        stmt.add_batch()?;
    }

    with_transaction(|| {
        let outcomes = stmt.execute_batch()?;
        if !return_generated_keys {
            return Ok(BatchResult::RowCounts(outcomes));
        }
        let keys = stmt.generated_keys()?.map(|(columns, values)| {
            let columns: Vec<String> = columns.iter().map(|c| outbound_identifier(c)).collect();
            Row::new(Arc::new(columns), values)
        });
        Ok(BatchResult::GeneratedKeys(keys))
    })
}

/// Run a query and hand its rows to `handler` while the cursor is open.
///
/// The shape of `query` is checked before anything touches the driver. The cursor and the
/// statement are closed after `handler` returns or fails.
///
/// # Errors
/// Returns [`SqlContextError::InvalidArgument`] for a malformed query,
/// [`SqlContextError::NoActiveConnection`] outside `with_connection`, or
/// [`SqlContextError::TransactionRolledBack`] if the driver or `handler` fails.
pub fn execute_query<Q, T, F>(query: Q, handler: F) -> Result<T, SqlContextError>
where
    Q: IntoQuery,
    F: FnOnce(&mut Rows<'_>) -> Result<T, SqlContextError>,
{
    let QueryAndParams { query, params } = query.into_query()?;
    let connection = require_connection()?;
    with_transaction(|| {
        debug!(sql = %query, params = params.len(), "executing query");
        let mut stmt = connection.prepare(&query, false)?;
        bind_all(stmt.as_mut(), &params)?;
        let mut rows = Rows::new(stmt.query()?);
        handler(&mut rows)
    })
}

/// Run each command once, in order, inside one transaction.
///
/// # Errors
/// Same as [`execute_batch`].
pub fn do_commands(commands: &[&str]) -> Result<Vec<BatchOutcome>, SqlContextError> {
    with_transaction(|| {
        let mut outcomes = Vec::with_capacity(commands.len());
        for command in commands {
            if let BatchResult::RowCounts(counts) = execute_batch(command, &[], false)? {
                outcomes.extend(counts);
            }
        }
        Ok(outcomes)
    })
}

/// Insert `rows` into `table`, naming `columns` explicitly unless the slice is empty.
///
/// Table and column names go through [`render_identifier`].
///
/// # Errors
/// Returns [`SqlContextError::InvalidArgument`] if a row's width differs from the column
/// list (or from the first row when no columns are given), otherwise as [`execute_batch`].
pub fn insert_values(
    table: impl Into<Identifier>,
    columns: &[&str],
    rows: &[Vec<RowValues>],
) -> Result<Vec<BatchOutcome>, SqlContextError> {
    let Some(first) = rows.first() else {
        return Ok(Vec::new());
    };
    let width = if columns.is_empty() {
        first.len()
    } else {
        columns.len()
    };
    if let Some(bad) = rows.iter().position(|row| row.len() != width) {
        return Err(SqlContextError::InvalidArgument(format!(
            "row {bad} has {} values, expected {width}",
            rows[bad].len()
        )));
    }

    let sql = insert_sql(table.into(), columns, width);
    match execute_batch(&sql, rows, false)? {
        BatchResult::RowCounts(outcomes) => Ok(outcomes),
        BatchResult::GeneratedKeys(_) => Ok(Vec::new()),
    }
}

fn insert_sql(table: Identifier, columns: &[&str], width: usize) -> String {
    let placeholders = vec!["?"; width].join(", ");
    let table = render_identifier(table);
    if columns.is_empty() {
        return format!("INSERT INTO {table} VALUES ({placeholders})");
    }
    let columns = columns
        .iter()
        .map(|c| render_identifier(*c))
        .collect::<Vec<_>>()
        .join(", ");
    format!("INSERT INTO {table} ({columns}) VALUES ({placeholders})")
}
