//! Recording in-memory driver shared by the integration tests.

#![allow(dead_code)]

use rowbind::{Connection, ConnectionSource, Cursor, DriverError, FromRow, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
#[error("fake driver: {0}")]
pub struct FakeError(pub String);

fn fake(msg: impl Into<String>) -> DriverError {
    Box::new(FakeError(msg.into()))
}

/// Where the fake driver should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailAt {
    Acquire,
    Prepare,
    Bind(usize),
    ExecuteUpdate,
    ExecuteQuery,
    /// Advancing onto the row at this 0-based position
    Advance(usize),
    CloseCursor,
    CloseStatement,
    CloseConnection,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Counters {
    pub acquired: usize,
    pub connections_closed: usize,
    pub prepared: usize,
    pub statements_closed: usize,
    pub cursors_opened: usize,
    pub cursors_closed: usize,
    pub rows_read: usize,
    pub updates: Vec<Vec<Value>>,
    pub queries: Vec<Vec<Value>>,
}

impl Counters {
    /// Every checked-out connection and opened statement/cursor was closed exactly once.
    pub fn balanced(&self) -> bool {
        self.acquired == self.connections_closed
            && self.prepared == self.statements_closed
            && self.cursors_opened == self.cursors_closed
    }
}

#[derive(Default)]
struct State {
    counters: Counters,
    rows: Vec<FakeRow>,
    failures: Vec<FailAt>,
    affected: u64,
}

impl State {
    fn fails(&self, at: FailAt) -> bool {
        self.failures.contains(&at)
    }
}

/// A result row: values by 0-based column.
#[derive(Debug, Clone, PartialEq)]
pub struct FakeRow(pub Vec<Value>);

impl FakeRow {
    pub fn long(&self, column: usize) -> Result<i64, DriverError> {
        match self.0.get(column) {
            Some(Value::Long(Some(v))) => Ok(*v),
            other => Err(fake(format!("column {column} is not a long: {other:?}"))),
        }
    }

    pub fn text(&self, column: usize) -> Result<String, DriverError> {
        match self.0.get(column) {
            Some(Value::Text(Some(v))) => Ok(v.clone()),
            other => Err(fake(format!("column {column} is not text: {other:?}"))),
        }
    }
}

/// `(id, name)` row.
pub fn row(id: i64, name: &str) -> FakeRow {
    FakeRow(vec![Value::from(id), Value::from(name)])
}

pub fn row_to_pair(row: &FakeRow) -> Result<(i64, String), DriverError> {
    Ok((row.long(0)?, row.text(1)?))
}

#[derive(Debug, PartialEq)]
pub struct Item {
    pub id: i64,
    pub name: String,
}

impl FromRow<FakeRow> for Item {
    fn from_row(row: &FakeRow) -> Result<Self, DriverError> {
        Ok(Self {
            id: row.long(0)?,
            name: row.text(1)?,
        })
    }
}

#[derive(Clone, Default)]
pub struct FakeSource {
    state: Arc<Mutex<State>>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(self, rows: Vec<FakeRow>) -> Self {
        self.state.lock().unwrap().rows = rows;
        self
    }

    pub fn with_affected(self, affected: u64) -> Self {
        self.state.lock().unwrap().affected = affected;
        self
    }

    pub fn fail_at(self, at: FailAt) -> Self {
        self.state.lock().unwrap().failures.push(at);
        self
    }

    pub fn counters(&self) -> Counters {
        self.state.lock().unwrap().counters.clone()
    }
}

impl ConnectionSource for FakeSource {
    type Connection = FakeConnection;

    fn acquire(&self) -> Result<FakeConnection, DriverError> {
        let mut state = self.state.lock().unwrap();
        if state.fails(FailAt::Acquire) {
            return Err(fake("pool exhausted"));
        }
        state.counters.acquired += 1;
        Ok(FakeConnection {
            state: self.state.clone(),
        })
    }
}

pub struct FakeConnection {
    state: Arc<Mutex<State>>,
}

pub struct FakeStatement {
    placeholders: usize,
    params: BTreeMap<usize, Value>,
}

impl Connection for FakeConnection {
    type Statement = FakeStatement;
    type Cursor = FakeCursor;

    fn prepare(&mut self, sql: &str) -> Result<FakeStatement, DriverError> {
        let mut state = self.state.lock().unwrap();
        if state.fails(FailAt::Prepare) {
            return Err(fake(format!("syntax error in {sql:?}")));
        }
        state.counters.prepared += 1;
        Ok(FakeStatement {
            placeholders: sql.matches('?').count(),
            params: BTreeMap::new(),
        })
    }

    fn bind(
        &mut self,
        statement: &mut FakeStatement,
        index: usize,
        value: Value,
    ) -> Result<(), DriverError> {
        let state = self.state.lock().unwrap();
        if state.fails(FailAt::Bind(index)) {
            return Err(fake(format!("cannot bind parameter {index}")));
        }
        if index > statement.placeholders {
            return Err(fake(format!("parameter index {index} out of range")));
        }
        statement.params.insert(index, value);
        Ok(())
    }

    fn execute_update(&mut self, statement: &mut FakeStatement) -> Result<u64, DriverError> {
        let mut state = self.state.lock().unwrap();
        if state.fails(FailAt::ExecuteUpdate) {
            return Err(fake("constraint violation"));
        }
        state
            .counters
            .updates
            .push(statement.params.values().cloned().collect());
        Ok(state.affected)
    }

    fn execute_query(&mut self, statement: &mut FakeStatement) -> Result<FakeCursor, DriverError> {
        let mut state = self.state.lock().unwrap();
        if state.fails(FailAt::ExecuteQuery) {
            return Err(fake("relation does not exist"));
        }
        state
            .counters
            .queries
            .push(statement.params.values().cloned().collect());
        state.counters.cursors_opened += 1;
        Ok(FakeCursor {
            state: self.state.clone(),
            rows: state.rows.clone().into_iter(),
            position: 0,
            current: None,
        })
    }

    fn close_statement(&mut self, _statement: FakeStatement) -> Result<(), DriverError> {
        let mut state = self.state.lock().unwrap();
        state.counters.statements_closed += 1;
        if state.fails(FailAt::CloseStatement) {
            return Err(fake("statement close failed"));
        }
        Ok(())
    }

    fn close(self) -> Result<(), DriverError> {
        let mut state = self.state.lock().unwrap();
        state.counters.connections_closed += 1;
        if state.fails(FailAt::CloseConnection) {
            return Err(fake("connection close failed"));
        }
        Ok(())
    }
}

pub struct FakeCursor {
    state: Arc<Mutex<State>>,
    rows: std::vec::IntoIter<FakeRow>,
    position: usize,
    current: Option<FakeRow>,
}

impl Cursor for FakeCursor {
    type Row = FakeRow;

    fn next_row(&mut self) -> Result<Option<&FakeRow>, DriverError> {
        {
            let mut state = self.state.lock().unwrap();
            if state.fails(FailAt::Advance(self.position)) {
                return Err(fake("connection reset while reading rows"));
            }
            self.current = self.rows.next();
            if self.current.is_some() {
                state.counters.rows_read += 1;
                self.position += 1;
            }
        }
        Ok(self.current.as_ref())
    }

    fn close(self) -> Result<(), DriverError> {
        let mut state = self.state.lock().unwrap();
        state.counters.cursors_closed += 1;
        if state.fails(FailAt::CloseCursor) {
            return Err(fake("cursor close failed"));
        }
        Ok(())
    }
}
