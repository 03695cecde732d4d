//! Executes batches and standalone statements against a [`Connection`].

use std::sync::Arc;

use tracing::{debug, info, trace, warn};

use crate::connection::{Connection, ReconnectGuard};
use crate::error::TxError;
use crate::handle::Handle;
use crate::query::Query;
use crate::queue::{CompletionQueue, Finished};
use crate::transaction::{BatchEntry, TransactionBatch};
use crate::unit::StatementUnit;

/// Extra attempts after the first one. A batch is re-run at most this many times.
pub const MAX_RETRIES: usize = 1;

/// Run `batch` as one transaction on `conn`, then hand its units to `completed`.
///
/// Auto-reconnect is suspended for the duration of the run and restored before the
/// units are delivered. If a statement or the transaction setup fails with a lost
/// connection, the connection had auto-reconnect enabled, and `retry` is set, a ping is
/// used to reconnect and the whole batch runs once more. Anything else rolls back.
pub fn execute<C: Connection + ?Sized>(
    conn: &mut C,
    mut batch: TransactionBatch,
    retry: bool,
    completed: &CompletionQueue,
) {
    run_batch(conn, &mut batch, retry);
    deliver(batch, completed);
}

pub(crate) fn run_batch<C: Connection + ?Sized>(
    conn: &mut C,
    batch: &mut TransactionBatch,
    retry: bool,
) {
    batch.state.mark_running();
    batch.state.set_result_running();

    let mut guard = ReconnectGuard::new(conn);
    let reconnect_enabled = guard.original();

    for attempt in 0..=MAX_RETRIES {
        let failure = match run_attempt(&mut *guard, &mut batch.entries) {
            Ok(()) => {
                trace!(transaction = %batch.transaction.id(), attempt, "committed");
                batch.state.succeed();
                break;
            }
            Err(failure) => failure,
        };

        let message = failure.to_string();
        batch.state.fail(message.as_str());
        debug!(transaction = %batch.transaction.id(), attempt, error = %message, "batch failed");

        let may_retry = retry
            && reconnect_enabled
            && attempt < MAX_RETRIES
            && !batch.retried
            && failure.is_connection_lost();
        if may_retry && reconnect(&mut *guard) {
            info!(transaction = %batch.transaction.id(), "connection re-established; retrying batch");
            batch.prepare_retry();
            continue;
        }

        // A lost connection means the server already rolled back.
        if let Err(err) = guard.rollback() {
            debug!(transaction = %batch.transaction.id(), error = %err, "rollback failed");
        }
        batch.fail_unfinished(&message);
        break;
    }

    // Best effort; a reconnect restores autocommit anyway.
    if let Err(err) = guard.set_autocommit(true) {
        debug!(transaction = %batch.transaction.id(), error = %err, "could not re-enable autocommit");
    }
}

fn run_attempt<C: Connection + ?Sized>(
    conn: &mut C,
    entries: &mut [BatchEntry],
) -> Result<(), TxError> {
    conn.begin().map_err(TxError::Begin)?;
    for entry in entries.iter_mut() {
        let unit = &mut entry.unit;
        unit.state.reset_result();
        unit.output = None;
        unit.state.mark_running();
        unit.state.set_result_running();
        match conn.execute(&unit.statement) {
            Ok(output) => {
                unit.output = Some(output);
                unit.state.succeed();
                unit.state.set_finished(true);
            }
            Err(err) => {
                unit.state.fail(err.message());
                unit.state.set_finished(true);
                return Err(TxError::Statement(err));
            }
        }
    }
    conn.commit().map_err(TxError::Commit)
}

/// Turn auto-reconnect on just long enough for a ping to re-establish the link.
fn reconnect<C: Connection + ?Sized>(conn: &mut C) -> bool {
    conn.set_auto_reconnect(true);
    let pinged = conn.ping();
    conn.set_auto_reconnect(false);
    match pinged {
        Ok(()) => true,
        Err(err) => {
            warn!(error = %err, "reconnect ping failed; giving up on retry");
            false
        }
    }
}

/// Push every finished unit, then the transaction record, waking waiters as each lands.
pub(crate) fn deliver(batch: TransactionBatch, completed: &CompletionQueue) {
    let TransactionBatch {
        transaction,
        mut state,
        entries,
        retried,
    } = batch;

    for BatchEntry { query, unit } in entries {
        if !unit.state.is_finished() {
            query.discard_unit(&unit);
            unit.state.completion().signal();
            continue;
        }
        let completion = Arc::clone(unit.state.completion());
        completed.push(Finished::Statement { query, unit });
        completion.signal();
    }

    state.set_finished(true);
    let completion = Arc::clone(state.completion());
    completed.push(Finished::Transaction {
        transaction,
        state,
        retried,
    });
    completion.signal();
}

/// Run one statement outside of any transaction.
pub fn execute_statement<C: Connection + ?Sized>(
    conn: &mut C,
    query: Query,
    mut unit: StatementUnit,
    completed: &CompletionQueue,
) {
    unit.state.mark_running();
    unit.state.set_result_running();
    match conn.execute(&unit.statement) {
        Ok(output) => {
            unit.output = Some(output);
            unit.state.succeed();
        }
        Err(err) => {
            debug!(query = %unit.statement, error = %err, "statement failed");
            unit.state.fail(err.message());
        }
    }
    unit.state.set_finished(true);

    let completion = Arc::clone(unit.state.completion());
    completed.push(Finished::Statement { query, unit });
    completion.signal();
}
