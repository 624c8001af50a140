use rusqlite::types::Value;

use crate::driver::{BatchOutcome, Cursor, Statement};
use crate::error::SqlContextError;
use crate::types::RowValues;

use super::connection::SqliteConnection;
use super::params::{row_value_to_sqlite_value, sqlite_value_to_row_value};

pub(super) struct SqliteStatement<'c> {
    owner: &'c SqliteConnection,
    stmt: rusqlite::Statement<'c>,
    bound: Vec<Value>,
    batch: Vec<Vec<Value>>,
    return_generated_keys: bool,
    generated_key: Option<i64>,
}

impl<'c> SqliteStatement<'c> {
    pub(super) fn new(
        owner: &'c SqliteConnection,
        stmt: rusqlite::Statement<'c>,
        return_generated_keys: bool,
    ) -> Self {
        Self {
            owner,
            stmt,
            bound: Vec::new(),
            batch: Vec::new(),
            return_generated_keys,
            generated_key: None,
        }
    }
}

impl Statement for SqliteStatement<'_> {
    fn bind(&mut self, index: usize, value: &RowValues) -> Result<(), SqlContextError> {
        let count = self.stmt.parameter_count();
        if index == 0 || index > count {
            return Err(SqlContextError::ExecutionError(format!(
                "parameter index {index} out of range (statement has {count})"
            )));
        }
        if self.bound.len() < index {
            self.bound.resize(index, Value::Null);
        }
        self.bound[index - 1] = row_value_to_sqlite_value(value);
        Ok(())
    }

    fn add_batch(&mut self) -> Result<(), SqlContextError> {
        self.batch.push(self.bound.clone());
        Ok(())
    }

    fn execute_batch(&mut self) -> Result<Vec<BatchOutcome>, SqlContextError> {
        self.owner.ensure_transaction()?;
        self.generated_key = None;
        let mut outcomes = Vec::with_capacity(self.batch.len());
        for (idx, entry) in std::mem::take(&mut self.batch).into_iter().enumerate() {
            match self.stmt.execute(rusqlite::params_from_iter(entry.iter())) {
                Ok(changed) => {
                    outcomes.push(BatchOutcome::RowCount(changed as u64));
                    if idx == 0 && self.return_generated_keys && changed > 0 {
                        self.generated_key = Some(self.owner.raw().last_insert_rowid());
                    }
                }
                Err(err) => {
                    outcomes.push(BatchOutcome::ExecuteFailed);
                    return Err(SqlContextError::BatchExecution {
                        outcomes,
                        source: Box::new(err.into()),
                    });
                }
            }
        }
        Ok(outcomes)
    }

    /// The rowid of the row inserted by the first batch entry. SQLite only tracks the last
    /// inserted rowid per connection, so an entry that changed no rows yields no key, and a
    /// non-INSERT that changed rows (an UPDATE) still reports the connection's last rowid.
    fn generated_keys(&mut self) -> Result<Option<(Vec<String>, Vec<RowValues>)>, SqlContextError> {
        if !self.return_generated_keys {
            return Err(SqlContextError::ExecutionError(
                "generated keys were not requested when preparing the statement".into(),
            ));
        }
        Ok(self
            .generated_key
            .map(|key| (vec!["last_insert_rowid()".to_owned()], vec![RowValues::Int(key)])))
    }

    fn query<'s>(&'s mut self) -> Result<Box<dyn Cursor + 's>, SqlContextError> {
        self.owner.ensure_transaction()?;
        for (idx, value) in self.bound.iter().enumerate() {
            self.stmt.raw_bind_parameter(idx + 1, value)?;
        }
        let columns: Vec<String> = self
            .stmt
            .column_names()
            .into_iter()
            .map(str::to_owned)
            .collect();
        let rows = self.stmt.raw_query();
        Ok(Box::new(SqliteCursor { columns, rows }))
    }
}

struct SqliteCursor<'s> {
    columns: Vec<String>,
    rows: rusqlite::Rows<'s>,
}

impl Cursor for SqliteCursor<'_> {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn next_row(&mut self) -> Result<Option<Vec<RowValues>>, SqlContextError> {
        let Some(row) = self.rows.next()? else {
            return Ok(None);
        };
        let mut values = Vec::with_capacity(self.columns.len());
        for idx in 0..self.columns.len() {
            let value: Value = row.get(idx)?;
            values.push(sqlite_value_to_row_value(value));
        }
        Ok(Some(values))
    }
}
