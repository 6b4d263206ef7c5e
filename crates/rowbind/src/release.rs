//! Best-effort release of the connection, statement and cursor a builder owns.

use crate::driver::{Connection, Cursor};

/// The resource chain of one statement lifecycle.
///
/// Each slot is emptied when released, so [`Resources::release`] is idempotent and the
/// `Drop` impl only closes what an explicit release did not already close.
pub(crate) struct Resources<C: Connection> {
    pub(crate) connection: Option<C>,
    pub(crate) statement: Option<C::Statement>,
    pub(crate) cursor: Option<C::Cursor>,
}

impl<C: Connection> Resources<C> {
    pub(crate) fn new(connection: C, statement: C::Statement) -> Self {
        Self {
            connection: Some(connection),
            statement: Some(statement),
            cursor: None,
        }
    }

    /// Close cursor, statement and connection, in that order.
    ///
    /// A failure closing one resource is logged and does not stop the others from closing.
    pub(crate) fn release(&mut self) {
        if let Some(cursor) = self.cursor.take() {
            if let Err(e) = cursor.close() {
                tracing::debug!(target: "rowbind.release", resource = "cursor", error = %e, "Could not close cursor");
            }
        }

        if let Some(statement) = self.statement.take() {
            match self.connection.as_mut() {
                Some(connection) => {
                    if let Err(e) = connection.close_statement(statement) {
                        tracing::debug!(target: "rowbind.release", resource = "statement", error = %e, "Could not close statement");
                    }
                }
                None => drop(statement),
            }
        }

        if let Some(connection) = self.connection.take() {
            if let Err(e) = connection.close() {
                tracing::debug!(target: "rowbind.release", resource = "connection", error = %e, "Could not close connection");
            }
        }
    }

    pub(crate) fn is_released(&self) -> bool {
        self.connection.is_none() && self.statement.is_none() && self.cursor.is_none()
    }
}

impl<C: Connection> Drop for Resources<C> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Close a connection whose statement was never prepared.
pub(crate) fn release_connection<C: Connection>(connection: C) {
    if let Err(e) = connection.close() {
        tracing::debug!(target: "rowbind.release", resource = "connection", error = %e, "Could not close connection");
    }
}
