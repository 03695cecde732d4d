use std::path::Path;

use rusqlite::params_from_iter;

use super::params::convert_params;
use super::query::build_result_set;
use crate::connection::Connection;
use crate::error::{DbError, TxQueueError};
use crate::results::ResultSet;
use crate::statement::Statement;

/// A [`Connection`] backed by one rusqlite handle.
///
/// SQLite runs in-process, so the link can never drop: errors are always
/// [`DbError::Statement`] and the auto-reconnect flag is only stored.
pub struct SqliteConnection {
    conn: rusqlite::Connection,
    auto_reconnect: bool,
}

impl SqliteConnection {
    /// # Errors
    /// Returns `TxQueueError::SqliteError` if the database cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TxQueueError> {
        Ok(Self::from_connection(rusqlite::Connection::open(path)?))
    }

    /// # Errors
    /// Returns `TxQueueError::SqliteError` if the database cannot be created.
    pub fn open_in_memory() -> Result<Self, TxQueueError> {
        Ok(Self::from_connection(rusqlite::Connection::open_in_memory()?))
    }

    #[must_use]
    pub fn from_connection(conn: rusqlite::Connection) -> Self {
        Self {
            conn,
            auto_reconnect: true,
        }
    }

    #[must_use]
    pub fn inner(&self) -> &rusqlite::Connection {
        &self.conn
    }

    fn run_control(&self, sql: &str) -> Result<(), DbError> {
        self.conn.execute_batch(sql).map_err(map_sqlite_error)
    }
}

/// Classify a rusqlite error, keeping SQLite's extended result code.
#[must_use]
pub fn map_sqlite_error(err: rusqlite::Error) -> DbError {
    match &err {
        rusqlite::Error::SqliteFailure(ffi, _) => {
            DbError::statement(err.to_string()).with_code(ffi.extended_code)
        }
        _ => DbError::statement(err.to_string()),
    }
}

fn is_insert(sql: &str) -> bool {
    sql.trim_start()
        .get(..6)
        .is_some_and(|head| head.eq_ignore_ascii_case("insert"))
}

impl Connection for SqliteConnection {
    fn execute(&mut self, statement: &Statement) -> Result<ResultSet, DbError> {
        let values = convert_params(statement.params());
        let mut stmt = self
            .conn
            .prepare_cached(statement.sql())
            .map_err(map_sqlite_error)?;

        if stmt.column_count() > 0 {
            return build_result_set(&mut stmt, &values).map_err(map_sqlite_error);
        }

        let rows = stmt
            .execute(params_from_iter(values.iter()))
            .map_err(map_sqlite_error)?;
        let last_insert_id =
            (rows > 0 && is_insert(statement.sql())).then(|| self.conn.last_insert_rowid());
        Ok(ResultSet::affected(rows, last_insert_id))
    }

    fn set_autocommit(&mut self, enabled: bool) -> Result<(), DbError> {
        match (enabled, self.conn.is_autocommit()) {
            (false, true) => self.run_control("BEGIN"),
            (true, false) => self.run_control("COMMIT"),
            _ => Ok(()),
        }
    }

    fn commit(&mut self) -> Result<(), DbError> {
        if self.conn.is_autocommit() {
            return Ok(());
        }
        self.run_control("COMMIT")
    }

    fn rollback(&mut self) -> Result<(), DbError> {
        if self.conn.is_autocommit() {
            return Ok(());
        }
        self.run_control("ROLLBACK")
    }

    fn ping(&mut self) -> Result<(), DbError> {
        self.conn
            .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .map(|_| ())
            .map_err(map_sqlite_error)
    }

    fn auto_reconnect(&self) -> bool {
        self.auto_reconnect
    }

    fn set_auto_reconnect(&mut self, enabled: bool) {
        self.auto_reconnect = enabled;
    }
}
