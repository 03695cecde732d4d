//! The database connection contract the engine runs against.
//!
//! Connection establishment, pooling and the wire protocol live in the backend; the engine
//! only needs to execute one statement at a time, toggle autocommit, commit, roll back,
//! ping, and read/write the auto-reconnect flag.

mod guard;

pub use guard::ReconnectGuard;

use crate::error::DbError;
use crate::results::ResultSet;
use crate::statement::Statement;

/// A single database connection owned by one worker thread.
pub trait Connection: Send {
    /// Execute one statement.
    ///
    /// # Errors
    /// Returns [`DbError::ConnectionLost`] if the server went away, [`DbError::Statement`]
    /// for every other failure.
    fn execute(&mut self, statement: &Statement) -> Result<ResultSet, DbError>;

    /// # Errors
    /// Returns [`DbError`] if the mode cannot be changed.
    fn set_autocommit(&mut self, enabled: bool) -> Result<(), DbError>;

    /// Open a transaction. The default turns autocommit off.
    ///
    /// # Errors
    /// Returns [`DbError`] if the transaction cannot be opened.
    fn begin(&mut self) -> Result<(), DbError> {
        self.set_autocommit(false)
    }

    /// # Errors
    /// Returns [`DbError`] if the commit is rejected or the connection is gone.
    fn commit(&mut self) -> Result<(), DbError>;

    /// # Errors
    /// Returns [`DbError`] if the rollback cannot be sent.
    fn rollback(&mut self) -> Result<(), DbError>;

    /// Liveness probe. With auto-reconnect enabled this also re-establishes a dropped link.
    ///
    /// # Errors
    /// Returns [`DbError`] if the server is unreachable.
    fn ping(&mut self) -> Result<(), DbError>;

    fn auto_reconnect(&self) -> bool;

    fn set_auto_reconnect(&mut self, enabled: bool);
}

impl<C: Connection + ?Sized> Connection for Box<C> {
    fn execute(&mut self, statement: &Statement) -> Result<ResultSet, DbError> {
        (**self).execute(statement)
    }

    fn set_autocommit(&mut self, enabled: bool) -> Result<(), DbError> {
        (**self).set_autocommit(enabled)
    }

    fn begin(&mut self) -> Result<(), DbError> {
        (**self).begin()
    }

    fn commit(&mut self) -> Result<(), DbError> {
        (**self).commit()
    }

    fn rollback(&mut self) -> Result<(), DbError> {
        (**self).rollback()
    }

    fn ping(&mut self) -> Result<(), DbError> {
        (**self).ping()
    }

    fn auto_reconnect(&self) -> bool {
        (**self).auto_reconnect()
    }

    fn set_auto_reconnect(&mut self, enabled: bool) {
        (**self).set_auto_reconnect(enabled);
    }
}
