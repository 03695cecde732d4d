//! Convenient imports for common functionality.
//!
//! This module re-exports the most commonly used types to make it easier to get started
//! with the library.

pub use crate::callback::{CallbackHost, CallbackRef, CallbackRegistry, Event, Outcome, UnitCallbacks};
pub use crate::config::EngineOptions;
pub use crate::connection::Connection;
pub use crate::database::Database;
pub use crate::error::{DbError, TxQueueError};
pub use crate::handle::Handle;
pub use crate::query::Query;
pub use crate::results::{CustomDbRow, ResultSet};
pub use crate::statement::Statement;
pub use crate::transaction::Transaction;
pub use crate::types::RowValues;
pub use crate::unit::ResultStatus;

#[cfg(feature = "sqlite")]
pub use crate::sqlite::SqliteConnection;
