//! Background transaction queue.
//!
//! Statements are grouped into [`Transaction`]s (or run alone as [`Query`]s) and executed
//! on worker threads, each owning one [`Connection`]. A batch runs with the connection's
//! auto-reconnect flag suspended; if the link drops mid-batch the whole batch is retried
//! once after a reconnecting ping. Finished runs land on a completion queue that the
//! owning thread drains with [`Database::poll`] or [`Database::wait`], so callbacks fire
//! exactly once, in submission order, on that thread.
//!
//! ```no_run
//! use sql_txqueue::prelude::*;
//!
//! # fn main() -> Result<(), TxQueueError> {
//! let mut db = Database::single(SqliteConnection::open("app.db")?)?;
//! let mut callbacks = CallbackRegistry::new();
//!
//! let tx = Transaction::new();
//! tx.append(&Query::new("INSERT INTO t VALUES (1)"))?;
//! tx.append(&Query::new("UPDATE t SET v = 2"))?;
//! callbacks.on(tx.id(), Event::Success, |_| println!("committed"));
//!
//! tx.start(&db)?;
//! db.wait(&tx, false, &mut callbacks)?;
//! # Ok(())
//! # }
//! ```

pub mod callback;
pub mod config;
pub mod connection;
pub mod database;
pub mod dispatch;
pub mod error;
pub mod handle;
pub mod prelude;
pub mod query;
pub mod queue;
pub mod results;
pub mod runner;
pub mod statement;
pub mod transaction;
pub mod types;
pub mod unit;

mod worker;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use callback::{CallbackHost, CallbackRef, CallbackRegistry, Event, Outcome, SourceId, UnitCallbacks};
pub use config::{EngineOptions, EngineOptionsBuilder};
pub use connection::{Connection, ReconnectGuard};
pub use database::Database;
pub use error::{DbError, TxError, TxQueueError};
pub use handle::Handle;
pub use query::Query;
pub use results::{CustomDbRow, ResultSet};
pub use statement::Statement;
pub use transaction::Transaction;
pub use types::RowValues;
pub use unit::{ResultStatus, RunState};
