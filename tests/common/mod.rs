#![allow(dead_code)]

use std::cell::Cell;
use std::sync::{Arc, Mutex};

use sql_context::driver::{BatchOutcome, Connection, Cursor, Properties, Statement};
use sql_context::{ConnectionSpec, RowValues, SqlContextError};

/// Everything the mock engine observed, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Connect(Properties),
    SetAutoCommit(bool),
    Commit,
    Rollback,
    Prepare(String),
    Bind(usize, RowValues),
    AddBatch,
    ExecuteBatch,
    Query,
    CursorClosed,
    StatementClosed,
    Close,
}

#[derive(Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<Event>>>,
}

impl Recorder {
    pub fn push(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, event: &Event) -> usize {
        self.events().iter().filter(|e| *e == event).count()
    }

    pub fn count_where(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events().iter().filter(|e| pred(e)).count()
    }
}

/// Knobs for the mock engine.
#[derive(Clone)]
pub struct Behavior {
    pub initial_auto_commit: bool,
    pub batch_failure: Option<Vec<BatchOutcome>>,
    pub fail_commit: bool,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<RowValues>>,
    pub generated_key: Option<i64>,
    /// Tag surfaced as a one-column, one-row result so threads can tell connections apart.
    pub tag: Option<String>,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            initial_auto_commit: true,
            batch_failure: None,
            fail_commit: false,
            columns: vec!["id".into()],
            rows: Vec::new(),
            generated_key: None,
            tag: None,
        }
    }
}

pub struct MockConnection {
    recorder: Recorder,
    behavior: Behavior,
    auto_commit: Cell<bool>,
}

impl MockConnection {
    pub fn new(recorder: Recorder, behavior: Behavior) -> Self {
        let auto_commit = Cell::new(behavior.initial_auto_commit);
        Self {
            recorder,
            behavior,
            auto_commit,
        }
    }

    pub fn tag(&self) -> Option<&str> {
        self.behavior.tag.as_deref()
    }
}

impl Connection for MockConnection {
    fn auto_commit(&self) -> Result<bool, SqlContextError> {
        Ok(self.auto_commit.get())
    }

    fn set_auto_commit(&self, enabled: bool) -> Result<(), SqlContextError> {
        self.recorder.push(Event::SetAutoCommit(enabled));
        self.auto_commit.set(enabled);
        Ok(())
    }

    fn commit(&self) -> Result<(), SqlContextError> {
        self.recorder.push(Event::Commit);
        if self.behavior.fail_commit {
            return Err(SqlContextError::driver("database is locked"));
        }
        Ok(())
    }

    fn rollback(&self) -> Result<(), SqlContextError> {
        self.recorder.push(Event::Rollback);
        Ok(())
    }

    fn prepare<'c>(
        &'c self,
        sql: &str,
        _return_generated_keys: bool,
    ) -> Result<Box<dyn Statement + 'c>, SqlContextError> {
        self.recorder.push(Event::Prepare(sql.to_owned()));
        if sql.starts_with("BROKEN") {
            return Err(SqlContextError::driver("syntax error"));
        }
        Ok(Box::new(MockStatement {
            connection: self,
            pending: 0,
        }))
    }

    fn close(&self) -> Result<(), SqlContextError> {
        self.recorder.push(Event::Close);
        Ok(())
    }
}

pub struct MockStatement<'c> {
    connection: &'c MockConnection,
    pending: usize,
}

impl Statement for MockStatement<'_> {
    fn bind(&mut self, index: usize, value: &RowValues) -> Result<(), SqlContextError> {
        self.connection.recorder.push(Event::Bind(index, value.clone()));
        Ok(())
    }

    fn add_batch(&mut self) -> Result<(), SqlContextError> {
        self.connection.recorder.push(Event::AddBatch);
        self.pending += 1;
        Ok(())
    }

    fn execute_batch(&mut self) -> Result<Vec<BatchOutcome>, SqlContextError> {
        self.connection.recorder.push(Event::ExecuteBatch);
        if let Some(outcomes) = &self.connection.behavior.batch_failure {
            return Err(SqlContextError::BatchExecution {
                outcomes: outcomes.clone(),
                source: Box::new(SqlContextError::Driver {
                    message: "UNIQUE constraint failed: t.id".into(),
                    sql_state: Some("23000".into()),
                    vendor_code: Some(2067),
                    next: None,
                }),
            });
        }
        Ok(vec![BatchOutcome::RowCount(1); std::mem::take(&mut self.pending)])
    }

    fn generated_keys(
        &mut self,
    ) -> Result<Option<(Vec<String>, Vec<RowValues>)>, SqlContextError> {
        Ok(self
            .connection
            .behavior
            .generated_key
            .map(|k| (vec!["GENERATED_KEY".to_owned()], vec![RowValues::Int(k)])))
    }

    fn query<'s>(&'s mut self) -> Result<Box<dyn Cursor + 's>, SqlContextError> {
        self.connection.recorder.push(Event::Query);
        let behavior = &self.connection.behavior;
        let (columns, rows) = match &behavior.tag {
            Some(tag) => (vec!["tag".to_owned()], vec![vec![RowValues::Text(tag.clone())]]),
            None => (behavior.columns.clone(), behavior.rows.clone()),
        };
        Ok(Box::new(MockCursor {
            recorder: self.connection.recorder.clone(),
            columns,
            rows: rows.into_iter(),
        }))
    }
}

impl Drop for MockStatement<'_> {
    fn drop(&mut self) {
        self.connection.recorder.push(Event::StatementClosed);
    }
}

pub struct MockCursor {
    recorder: Recorder,
    columns: Vec<String>,
    rows: std::vec::IntoIter<Vec<RowValues>>,
}

impl Cursor for MockCursor {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn next_row(&mut self) -> Result<Option<Vec<RowValues>>, SqlContextError> {
        Ok(self.rows.next())
    }
}

impl Drop for MockCursor {
    fn drop(&mut self) {
        self.recorder.push(Event::CursorClosed);
    }
}

/// Factory descriptor over the mock engine, recording the parameters it is invoked with.
pub fn mock_spec(recorder: &Recorder, behavior: Behavior) -> ConnectionSpec {
    let recorder = recorder.clone();
    let mut params = Properties::new();
    params.insert("db".into(), "mock".into());
    ConnectionSpec::factory(
        move |params: &Properties| {
            recorder.push(Event::Connect(params.clone()));
            Ok(Box::new(MockConnection::new(recorder.clone(), behavior.clone()))
                as Box<dyn Connection>)
        },
        params,
    )
}
