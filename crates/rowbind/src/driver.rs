//! Driver-facing traits.
//!
//! rowbind owns none of the database plumbing. A backend provides a [`ConnectionSource`]
//! (usually a pool), a [`Connection`] that prepares and runs statements, and a [`Cursor`] over
//! query results. Everything here is blocking.

use crate::error::DriverError;
use crate::value::Value;

/// Produces connections on demand.
///
/// Implementations decide their own pooling and thread-safety; [`crate::Template`] only calls
/// [`ConnectionSource::acquire`] once per prepared statement.
pub trait ConnectionSource {
    type Connection: Connection;

    /// Check out a connection. Ownership passes to the caller until [`Connection::close`].
    fn acquire(&self) -> Result<Self::Connection, DriverError>;
}

/// A checked-out connection together with the statement primitives it supports.
///
/// Statements are opaque handles; every operation on them goes through the connection that
/// prepared them.
pub trait Connection {
    type Statement;
    type Cursor: Cursor;

    /// Prepare `sql`, which may contain positional placeholders.
    fn prepare(&mut self, sql: &str) -> Result<Self::Statement, DriverError>;

    /// Bind `value` to the 1-based placeholder `index`. Rebinding an index replaces the value.
    fn bind(
        &mut self,
        statement: &mut Self::Statement,
        index: usize,
        value: Value,
    ) -> Result<(), DriverError>;

    /// Execute a mutating statement and return the number of affected rows.
    fn execute_update(&mut self, statement: &mut Self::Statement) -> Result<u64, DriverError>;

    /// Execute a query and open a cursor over its rows.
    fn execute_query(&mut self, statement: &mut Self::Statement)
    -> Result<Self::Cursor, DriverError>;

    /// Release a prepared statement.
    fn close_statement(&mut self, statement: Self::Statement) -> Result<(), DriverError>;

    /// Give the connection back to its source.
    fn close(self) -> Result<(), DriverError>;
}

/// Forward-only iteration over query results.
pub trait Cursor {
    type Row;

    /// Advance to the next row. `Ok(None)` means the result is exhausted.
    fn next_row(&mut self) -> Result<Option<&Self::Row>, DriverError>;

    /// Release the cursor.
    fn close(self) -> Result<(), DriverError>;
}

/// Shorthand for the row type produced by a connection's cursor.
pub type RowOf<C> = <<C as Connection>::Cursor as Cursor>::Row;
