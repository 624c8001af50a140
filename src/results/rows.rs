use std::collections::HashMap;
use std::sync::Arc;

use crate::driver::Cursor;
use crate::error::SqlContextError;
use crate::identifier::outbound_identifier;

use super::row::{Row, column_index};

/// Rows pulled lazily from an open cursor.
///
/// Only valid inside the row handler of [`crate::execute_query`]; the cursor is closed as soon
/// as the handler returns. After the first fetch error the iterator yields nothing more.
pub struct Rows<'c> {
    cursor: Box<dyn Cursor + 'c>,
    column_names: Arc<Vec<String>>,
    column_index: Arc<HashMap<String, usize>>,
    done: bool,
}

impl<'c> Rows<'c> {
    pub(crate) fn new(cursor: Box<dyn Cursor + 'c>) -> Self {
        let column_names: Vec<String> = cursor
            .columns()
            .iter()
            .map(|name| outbound_identifier(name))
            .collect();
        let column_index = Arc::new(column_index(&column_names));
        Self {
            cursor,
            column_names: Arc::new(column_names),
            column_index,
            done: false,
        }
    }

    #[must_use]
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    /// Drain the remaining rows.
    ///
    /// # Errors
    /// Returns the first fetch error.
    pub fn collect_all(&mut self) -> Result<Vec<Row>, SqlContextError> {
        self.by_ref().collect()
    }
}

impl Iterator for Rows<'_> {
    type Item = Result<Row, SqlContextError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.cursor.next_row() {
            Ok(Some(values)) => Some(Ok(Row::with_index(
                Arc::clone(&self.column_names),
                Arc::clone(&self.column_index),
                values,
            ))),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}
