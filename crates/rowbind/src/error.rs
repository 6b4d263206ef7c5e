//! Error types for rowbind

use std::fmt;
use thiserror::Error;

/// Boxed error produced by a driver primitive or a row mapper.
pub type DriverError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type alias for rowbind operations
pub type DataResult<T> = Result<T, DataAccessError>;

/// The step of a statement lifecycle that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Building a connection source (parsing the URL, creating the pool)
    Connect,
    /// Checking a connection out of the connection source
    Acquire,
    /// Preparing the SQL text on the connection
    Prepare,
    /// Binding the parameter at a 1-based position
    Bind { index: usize },
    /// Executing a mutating statement
    ExecuteUpdate,
    /// Executing a query
    ExecuteQuery,
    /// Advancing the result cursor
    Advance,
    /// Mapping the row at a 0-based position in the result
    Map { row: usize },
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect => f.write_str("create connection source"),
            Self::Acquire => f.write_str("acquire connection"),
            Self::Prepare => f.write_str("prepare statement"),
            Self::Bind { index } => write!(f, "bind parameter {index}"),
            Self::ExecuteUpdate => f.write_str("execute update"),
            Self::ExecuteQuery => f.write_str("execute query"),
            Self::Advance => f.write_str("advance cursor"),
            Self::Map { row } => write!(f, "map row {row}"),
        }
    }
}

/// The single error surfaced to callers.
///
/// Wraps the underlying driver (or mapper) failure, which stays reachable through
/// [`std::error::Error::source`].
#[derive(Debug, Error)]
#[error("Data access error: {operation} failed: {source}")]
pub struct DataAccessError {
    operation: Operation,
    sql: String,
    #[source]
    source: DriverError,
}

impl DataAccessError {
    /// Create an error for a failed operation on `sql`.
    pub fn new(
        operation: Operation,
        sql: impl Into<String>,
        source: impl Into<DriverError>,
    ) -> Self {
        Self {
            operation,
            sql: sql.into(),
            source: source.into(),
        }
    }

    /// The step that failed.
    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// SQL text of the statement the failure belongs to.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// The wrapped driver or mapper error.
    pub fn driver_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        self.source.as_ref()
    }

    /// Unwrap into the underlying driver or mapper error.
    pub fn into_driver_error(self) -> DriverError {
        self.source
    }

    /// Log the failure as a `tracing` error event and return it unchanged.
    pub(crate) fn logged(self) -> Self {
        tracing::error!(
            target: "rowbind",
            operation = %self.operation,
            sql = %self.sql,
            error = %self.source,
            "Data access failed",
        );
        self
    }

    /// Check if the row mapper failed
    pub fn is_mapping(&self) -> bool {
        matches!(self.operation, Operation::Map { .. })
    }

    /// Check if the failure happened before a builder existed
    pub fn is_connect(&self) -> bool {
        matches!(
            self.operation,
            Operation::Connect | Operation::Acquire | Operation::Prepare
        )
    }
}
