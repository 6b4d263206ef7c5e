//! Fluent statement builder.
//!
//! A [`StatementBuilder`] owns one connection and one prepared statement. Binding returns the
//! builder back for chaining with `?`; executing consumes it:
//!
//! - [`StatementBuilder::execute_update`] runs the statement and releases everything.
//! - [`StatementBuilder::execute_query`] hands the open cursor to a [`QueryRows`], whose
//!   terminal `map_*` call consumes the rows and releases everything.
//!
//! Any failure releases the whole chain before the error is returned, and a builder dropped
//! half-way releases it too.
//!
//! ```ignore
//! let pairs = template
//!     .prepare("SELECT id, name FROM t WHERE id = $1")?
//!     .bind_long(1, 1)?
//!     .execute_query()?
//!     .map_all(|row| Ok((row.try_get::<_, i64>(0)?, row.try_get::<_, String>(1)?)))?;
//! ```

use crate::driver::{Connection, Cursor, RowOf};
use crate::error::{DataAccessError, DataResult, DriverError, Operation};
use crate::release::Resources;
use crate::row::FromRow;
use crate::value::Value;
use chrono::{DateTime, Utc};
use std::fmt;
use uuid::Uuid;

/// Builder over one prepared statement. See the [module docs](self).
#[must_use = "a statement builder does nothing until it is executed"]
pub struct StatementBuilder<C: Connection> {
    sql: String,
    resources: Resources<C>,
}

impl<C: Connection> StatementBuilder<C> {
    pub(crate) fn new(sql: String, connection: C, statement: C::Statement) -> Self {
        Self {
            sql,
            resources: Resources::new(connection, statement),
        }
    }

    /// The SQL text this builder was prepared from.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Bind a value to the 1-based placeholder `index`.
    ///
    /// On failure every resource is released and the builder is gone.
    pub fn bind(mut self, index: usize, value: impl Into<Value>) -> DataResult<Self> {
        let operation = Operation::Bind { index };
        if index == 0 {
            return Err(self.fail(operation, "parameter indices start at 1"));
        }

        let (connection, statement) = self.parts();
        match connection.bind(statement, index, value.into()) {
            Ok(()) => Ok(self),
            Err(e) => Err(self.fail(operation, e)),
        }
    }

    /// Bind `params` to placeholders `1..=n` in order.
    pub fn bind_all<I>(self, params: I) -> DataResult<Self>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        params
            .into_iter()
            .enumerate()
            .try_fold(self, |builder, (i, value)| builder.bind(i + 1, value))
    }

    /// Bind a text value, or a text NULL.
    pub fn bind_string<'a>(
        self,
        index: usize,
        value: impl Into<Option<&'a str>>,
    ) -> DataResult<Self> {
        let value: Option<&str> = value.into();
        self.bind(index, Value::Text(value.map(str::to_owned)))
    }

    /// Bind a 64-bit integer, or a bigint NULL.
    pub fn bind_long(self, index: usize, value: impl Into<Option<i64>>) -> DataResult<Self> {
        self.bind(index, Value::Long(value.into()))
    }

    pub fn bind_int(self, index: usize, value: impl Into<Option<i32>>) -> DataResult<Self> {
        self.bind(index, Value::Int(value.into()))
    }

    pub fn bind_double(self, index: usize, value: impl Into<Option<f64>>) -> DataResult<Self> {
        self.bind(index, Value::Double(value.into()))
    }

    pub fn bind_bool(self, index: usize, value: impl Into<Option<bool>>) -> DataResult<Self> {
        self.bind(index, Value::Bool(value.into()))
    }

    pub fn bind_bytes<'a>(
        self,
        index: usize,
        value: impl Into<Option<&'a [u8]>>,
    ) -> DataResult<Self> {
        let value: Option<&[u8]> = value.into();
        self.bind(index, Value::Bytes(value.map(<[u8]>::to_vec)))
    }

    pub fn bind_uuid(self, index: usize, value: impl Into<Option<Uuid>>) -> DataResult<Self> {
        self.bind(index, Value::Uuid(value.into()))
    }

    pub fn bind_timestamp(
        self,
        index: usize,
        value: impl Into<Option<DateTime<Utc>>>,
    ) -> DataResult<Self> {
        self.bind(index, Value::Timestamp(value.into()))
    }

    pub fn bind_json(
        self,
        index: usize,
        value: impl Into<Option<serde_json::Value>>,
    ) -> DataResult<Self> {
        self.bind(index, Value::Json(value.into()))
    }

    /// Execute as a mutating statement and return the number of affected rows.
    ///
    /// Statement and connection are released before this returns, whatever the outcome.
    pub fn execute_update(mut self) -> DataResult<u64> {
        let (connection, statement) = self.parts();
        match connection.execute_update(statement) {
            Ok(affected) => {
                self.resources.release();
                Ok(affected)
            }
            Err(e) => Err(self.fail(Operation::ExecuteUpdate, e)),
        }
    }

    /// Execute as a query.
    ///
    /// Nothing is released on success: the connection, statement and open cursor move into the
    /// returned [`QueryRows`].
    pub fn execute_query(mut self) -> DataResult<QueryRows<C>> {
        let (connection, statement) = self.parts();
        match connection.execute_query(statement) {
            Ok(cursor) => {
                self.resources.cursor = Some(cursor);
                Ok(QueryRows {
                    sql: self.sql,
                    resources: self.resources,
                })
            }
            Err(e) => Err(self.fail(Operation::ExecuteQuery, e)),
        }
    }

    // Only consuming calls release, so a live builder always holds both.
    fn parts(&mut self) -> (&mut C, &mut C::Statement) {
        match (
            self.resources.connection.as_mut(),
            self.resources.statement.as_mut(),
        ) {
            (Some(connection), Some(statement)) => (connection, statement),
            _ => unreachable!("statement builder used after release"),
        }
    }

    fn fail(mut self, operation: Operation, source: impl Into<DriverError>) -> DataAccessError {
        let err = DataAccessError::new(operation, std::mem::take(&mut self.sql), source).logged();
        self.resources.release();
        err
    }
}

impl<C: Connection> fmt::Debug for StatementBuilder<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatementBuilder")
            .field("sql", &self.sql)
            .field("released", &self.resources.is_released())
            .finish()
    }
}

/// The open result of [`StatementBuilder::execute_query`].
///
/// Each mapping call is terminal: it consumes the rows and releases the cursor, statement and
/// connection exactly once, on success and on failure.
#[must_use = "query rows hold a connection until they are mapped or dropped"]
pub struct QueryRows<C: Connection> {
    sql: String,
    resources: Resources<C>,
}

impl<C: Connection> QueryRows<C> {
    /// The SQL text of the executed query.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Map every row, in cursor order.
    ///
    /// A cursor or mapper failure discards the rows mapped so far.
    pub fn map_all<T, F>(mut self, mut mapper: F) -> DataResult<Vec<T>>
    where
        F: FnMut(&RowOf<C>) -> Result<T, DriverError>,
    {
        let outcome = self.read_rows(&mut mapper, usize::MAX);
        self.finish(outcome)
    }

    /// Map the first row, if there is one.
    ///
    /// Rows after the first are not read and not reported.
    pub fn map_one<T, F>(mut self, mut mapper: F) -> DataResult<Option<T>>
    where
        F: FnMut(&RowOf<C>) -> Result<T, DriverError>,
    {
        let outcome = self
            .read_rows(&mut mapper, 1)
            .map(|rows| rows.into_iter().next());
        self.finish(outcome)
    }

    /// [`QueryRows::map_all`] with a [`FromRow`] implementation.
    pub fn map_all_as<T: FromRow<RowOf<C>>>(self) -> DataResult<Vec<T>> {
        self.map_all(T::from_row)
    }

    /// [`QueryRows::map_one`] with a [`FromRow`] implementation.
    pub fn map_one_as<T: FromRow<RowOf<C>>>(self) -> DataResult<Option<T>> {
        self.map_one(T::from_row)
    }

    fn read_rows<T, F>(
        &mut self,
        mapper: &mut F,
        limit: usize,
    ) -> Result<Vec<T>, (Operation, DriverError)>
    where
        F: FnMut(&RowOf<C>) -> Result<T, DriverError>,
    {
        let cursor = self.cursor();
        let mut mapped = Vec::new();
        while mapped.len() < limit {
            let row = match cursor.next_row() {
                Ok(Some(row)) => row,
                Ok(None) => break,
                Err(e) => return Err((Operation::Advance, e)),
            };
            let index = mapped.len();
            mapped.push(mapper(row).map_err(|e| (Operation::Map { row: index }, e))?);
        }
        Ok(mapped)
    }

    // Set by `execute_query` and taken only by the terminal `finish`.
    fn cursor(&mut self) -> &mut C::Cursor {
        self.resources
            .cursor
            .as_mut()
            .expect("query rows hold an open cursor until mapped")
    }

    fn finish<T>(mut self, outcome: Result<T, (Operation, DriverError)>) -> DataResult<T> {
        match outcome {
            Ok(value) => {
                self.resources.release();
                Ok(value)
            }
            Err((operation, source)) => {
                let err = DataAccessError::new(operation, std::mem::take(&mut self.sql), source)
                    .logged();
                self.resources.release();
                Err(err)
            }
        }
    }
}

impl<C: Connection> fmt::Debug for QueryRows<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryRows")
            .field("sql", &self.sql)
            .field("released", &self.resources.is_released())
            .finish()
    }
}
