//! Row mapping traits

use crate::error::DriverError;

/// Reusable mapping from a driver row to a Rust value.
///
/// Closures cover ad-hoc mapping; implement this when the same shape is read in several places.
///
/// ```ignore
/// struct User {
///     id: i64,
///     name: String,
/// }
///
/// impl FromRow<tokio_postgres::Row> for User {
///     fn from_row(row: &tokio_postgres::Row) -> Result<Self, DriverError> {
///         Ok(Self {
///             id: row.try_get("id")?,
///             name: row.try_get("name")?,
///         })
///     }
/// }
/// ```
pub trait FromRow<R>: Sized {
    fn from_row(row: &R) -> Result<Self, DriverError>;
}
