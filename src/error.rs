use thiserror::Error;

/// Failure reported by a [`Connection`](crate::connection::Connection).
///
/// Backends classify their native errors into two buckets: the server-lost class, which
/// makes a transaction eligible for its single reconnect retry, and everything else.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DbError {
    /// The link to the server dropped (server gone away, lost during query, ...).
    #[error("{message}")]
    ConnectionLost { code: Option<i32>, message: String },

    /// Any other database error: syntax, constraint, permission, ...
    #[error("{message}")]
    Statement { code: Option<i32>, message: String },
}

impl DbError {
    #[must_use]
    pub fn connection_lost(message: impl Into<String>) -> Self {
        DbError::ConnectionLost {
            code: None,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn statement(message: impl Into<String>) -> Self {
        DbError::Statement {
            code: None,
            message: message.into(),
        }
    }

    /// Attach the backend's native error code.
    #[must_use]
    pub fn with_code(self, code: i32) -> Self {
        match self {
            DbError::ConnectionLost { message, .. } => DbError::ConnectionLost {
                code: Some(code),
                message,
            },
            DbError::Statement { message, .. } => DbError::Statement {
                code: Some(code),
                message,
            },
        }
    }

    #[must_use]
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, DbError::ConnectionLost { .. })
    }

    #[must_use]
    pub fn code(&self) -> Option<i32> {
        match self {
            DbError::ConnectionLost { code, .. } | DbError::Statement { code, .. } => *code,
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            DbError::ConnectionLost { message, .. } | DbError::Statement { message, .. } => {
                message
            }
        }
    }
}

/// Why one attempt at running a transaction batch failed.
///
/// These never cross the worker boundary as `Err`: the runner records the message on the
/// batch and its units and the failure reaches user code through error callbacks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TxError {
    /// Turning autocommit off failed, usually because the connection was already gone.
    #[error(transparent)]
    Begin(DbError),

    /// A statement in the batch failed; the remaining statements were not executed.
    #[error(transparent)]
    Statement(DbError),

    /// Every statement succeeded but the commit did not.
    #[error("commit failed")]
    Commit(#[source] DbError),
}

impl TxError {
    /// Whether this failure qualifies for the reconnect-and-retry path.
    ///
    /// Commit failures never do: the commit may already have been applied server-side.
    #[must_use]
    pub fn is_connection_lost(&self) -> bool {
        match self {
            TxError::Begin(err) | TxError::Statement(err) => err.is_connection_lost(),
            TxError::Commit(_) => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum TxQueueError {
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Database already disconnected")]
    Disconnected,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Worker error: {0}")]
    WorkerError(String),

    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    SqliteError(#[from] rusqlite::Error),

    #[error(transparent)]
    Db(#[from] DbError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_failure_is_never_retryable() {
        let err = TxError::Commit(DbError::connection_lost("gone"));
        assert!(!err.is_connection_lost());
        assert_eq!(err.to_string(), "commit failed");
    }

    #[test]
    fn begin_failure_keeps_classification() {
        assert!(TxError::Begin(DbError::connection_lost("gone")).is_connection_lost());
        assert!(!TxError::Statement(DbError::statement("syntax")).is_connection_lost());
    }

    #[test]
    fn with_code_preserves_variant() {
        let err = DbError::connection_lost("lost").with_code(2013);
        assert!(err.is_connection_lost());
        assert_eq!(err.code(), Some(2013));
        assert_eq!(err.message(), "lost");
    }
}
