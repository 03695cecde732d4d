use std::fmt;
use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::callback::{CallbackRef, SourceId, UnitCallbacks};
use crate::database::Database;
use crate::error::TxQueueError;
use crate::handle::{Handle, RunTracker};
use crate::query::Query;
use crate::unit::{Completion, ResultStatus, RunState, StatementUnit, UnitState};

/// Caller-facing transaction handle.
///
/// Queries appended to the handle accumulate until [`Transaction::start`], which snapshots
/// them into a [`TransactionBatch`] and empties the queue in one step. Clones share the
/// same handle.
#[derive(Clone)]
pub struct Transaction {
    inner: Arc<TransactionInner>,
}

struct TransactionInner {
    id: SourceId,
    state: Mutex<TransactionState>,
}

#[derive(Default)]
struct TransactionState {
    queued: Vec<BatchEntry>,
    callbacks: UnitCallbacks,
    runs: RunTracker,
}

/// A queued statement: the originating query and the unit built for this transaction.
#[derive(Debug)]
pub struct BatchEntry {
    pub(crate) query: Query,
    pub(crate) unit: StatementUnit,
}

impl BatchEntry {
    #[must_use]
    pub fn query(&self) -> &Query {
        &self.query
    }

    #[must_use]
    pub fn unit(&self) -> &StatementUnit {
        &self.unit
    }
}

/// The statements of one started transaction, owned by exactly one in-flight run.
///
/// Entry order is submission order and is kept through execution and retry.
#[derive(Debug)]
pub struct TransactionBatch {
    pub(crate) transaction: Transaction,
    pub(crate) state: UnitState,
    pub(crate) entries: Vec<BatchEntry>,
    pub(crate) retried: bool,
}

impl TransactionBatch {
    #[must_use]
    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    #[must_use]
    pub fn state(&self) -> &UnitState {
        &self.state
    }

    #[must_use]
    pub fn entries(&self) -> &[BatchEntry] {
        &self.entries
    }

    #[must_use]
    pub fn retried(&self) -> bool {
        self.retried
    }

    /// Forget the failed attempt so the whole batch can run again.
    pub(crate) fn prepare_retry(&mut self) {
        for entry in &mut self.entries {
            entry.unit.state.set_finished(false);
        }
        self.retried = true;
    }

    /// Give every unit that did not get to finish the batch's error.
    pub(crate) fn fail_unfinished(&mut self, message: &str) {
        for entry in &mut self.entries {
            if !entry.unit.state.is_finished() {
                entry.unit.output = None;
                entry.unit.state.fail(message);
                entry.unit.state.set_finished(true);
            }
        }
    }
}

impl Transaction {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TransactionInner {
                id: SourceId::next(),
                state: Mutex::new(TransactionState::default()),
            }),
        }
    }

    /// Queue `query` for the next run of this transaction.
    ///
    /// # Errors
    /// Returns `TxQueueError::InvalidState` if a run of this transaction is in flight, or if
    /// `query` is already queued in a different transaction that has not finished.
    pub fn append(&self, query: &Query) -> Result<(), TxQueueError> {
        let mut state = self.lock();
        if state.runs.has_active_run() {
            return Err(TxQueueError::InvalidState(format!(
                "transaction {} is running",
                self.inner.id
            )));
        }
        let unit = query.build_unit_for(self.inner.id)?;
        state.queued.push(BatchEntry {
            query: query.clone(),
            unit,
        });
        Ok(())
    }

    /// Drop every queued statement that has not been started. Returns how many were dropped.
    ///
    /// A batch already handed to a worker is unaffected.
    pub fn clear(&self) -> usize {
        let dropped = mem::take(&mut self.lock().queued);
        for entry in &dropped {
            entry.query.discard_unit(&entry.unit);
        }
        dropped.len()
    }

    /// Queries queued for the next run, in order.
    #[must_use]
    pub fn queries(&self) -> Vec<Query> {
        self.lock()
            .queued
            .iter()
            .map(|entry| entry.query.clone())
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().queued.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn set_callbacks(&self, callbacks: UnitCallbacks) {
        self.lock().callbacks = callbacks;
    }

    pub fn on_success(&self, callback: CallbackRef) {
        self.lock().callbacks.on_success = Some(callback);
    }

    pub fn on_error(&self, callback: CallbackRef) {
        self.lock().callbacks.on_error = Some(callback);
    }

    pub fn on_aborted(&self, callback: CallbackRef) {
        self.lock().callbacks.on_aborted = Some(callback);
    }

    /// Snapshot the queued statements into a batch and submit it to `db`.
    ///
    /// # Errors
    /// Returns `TxQueueError::InvalidState` if a previous run is still executing and
    /// `TxQueueError::Disconnected` if the database has been shut down.
    pub fn start(&self, db: &Database) -> Result<(), TxQueueError> {
        db.start_transaction(self)
    }

    /// Atomically move the queued statements into a new batch.
    pub(crate) fn take_batch(&self) -> Result<TransactionBatch, TxQueueError> {
        let mut state = self.lock();
        if state.runs.has_active_run() {
            return Err(TxQueueError::InvalidState(format!(
                "transaction {} is already running",
                self.inner.id
            )));
        }
        let entries = mem::take(&mut state.queued);
        for entry in &entries {
            entry.query.mark_submitted(entry.unit.state.completion());
        }
        let first_data = !state.runs.mark_started();
        let batch_state = UnitState::new(state.callbacks, first_data, None);
        state.runs.track(batch_state.completion(), true);
        drop(state);

        Ok(TransactionBatch {
            transaction: self.clone(),
            state: batch_state,
            entries,
            retried: false,
        })
    }

    pub(crate) fn finish_run(&self, run: &UnitState) {
        let mut state = self.lock();
        state.runs.release(run.completion());
        if run.run_state() != RunState::Aborted {
            state.runs.record(run);
        }
    }

    fn lock(&self) -> MutexGuard<'_, TransactionState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new()
    }
}

impl Handle for Transaction {
    fn id(&self) -> SourceId {
        self.inner.id
    }

    fn is_running(&self) -> bool {
        self.lock().runs.is_running()
    }

    fn result_status(&self) -> ResultStatus {
        self.lock().runs.last_result()
    }

    fn error(&self) -> Option<String> {
        self.lock().runs.last_error()
    }

    fn latest_run(&self) -> Result<Arc<Completion>, TxQueueError> {
        self.lock().runs.latest()
    }
}

impl PartialEq for Transaction {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Transaction {}

/// Queries left queued in a transaction that is never started are released, so they can
/// join another transaction.
impl Drop for TransactionInner {
    fn drop(&mut self) {
        let state = self
            .state
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        for entry in state.queued.drain(..) {
            entry.query.discard_unit(&entry.unit);
        }
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.inner.id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_batch_snapshots_and_clears() {
        let tx = Transaction::new();
        let a = Query::new("INSERT INTO t VALUES (1)");
        let b = Query::new("UPDATE t SET v = 2");
        tx.append(&a).unwrap();
        tx.append(&b).unwrap();

        let batch = tx.take_batch().unwrap();
        assert!(tx.is_empty());
        let order: Vec<&str> = batch
            .entries()
            .iter()
            .map(|e| e.unit().statement().sql())
            .collect();
        assert_eq!(order, ["INSERT INTO t VALUES (1)", "UPDATE t SET v = 2"]);
        assert!(batch.state().is_first_data());
        assert!(a.latest_run().is_ok());
    }

    #[test]
    fn dropping_unstarted_transaction_releases_queries() {
        let query = Query::new("INSERT INTO t VALUES (1)");
        let tx = Transaction::new();
        tx.append(&query).unwrap();
        tx.append(&query).unwrap();
        assert!(query.is_running());
        drop(tx);

        assert!(!query.is_running());
        assert_eq!(query.bound_transaction(), None);
        let other = Transaction::new();
        other.append(&query).unwrap();
        assert_eq!(query.bound_transaction(), Some(other.id()));
    }

    #[test]
    fn second_start_while_running_is_rejected() {
        let tx = Transaction::new();
        tx.append(&Query::new("SELECT 1")).unwrap();
        let batch = tx.take_batch().unwrap();

        assert!(matches!(tx.take_batch(), Err(TxQueueError::InvalidState(_))));
        assert!(matches!(
            tx.append(&Query::new("SELECT 2")),
            Err(TxQueueError::InvalidState(_))
        ));

        batch.state().completion().signal();
        let next = tx.take_batch().unwrap();
        assert!(!next.state().is_first_data());
        assert!(next.entries().is_empty());
    }

    #[test]
    fn clear_releases_queries() {
        let tx = Transaction::new();
        let query = Query::new("INSERT INTO t VALUES (1)");
        tx.append(&query).unwrap();
        tx.append(&query).unwrap();
        assert!(query.is_running());

        assert_eq!(tx.clear(), 2);
        assert!(!query.is_running());
        assert_eq!(query.bound_transaction(), None);
        assert!(Transaction::new().append(&query).is_ok());
    }

    #[test]
    fn fail_unfinished_copies_message() {
        let tx = Transaction::new();
        tx.append(&Query::new("A")).unwrap();
        tx.append(&Query::new("B")).unwrap();
        let mut batch = tx.take_batch().unwrap();
        batch.entries[0].unit.state.succeed();
        batch.entries[0].unit.state.set_finished(true);

        batch.fail_unfinished("server gone");
        let first = batch.entries()[0].unit().state();
        let second = batch.entries()[1].unit().state();
        assert_eq!(first.result_status(), ResultStatus::Success);
        assert_eq!(second.result_status(), ResultStatus::Error);
        assert_eq!(second.error(), Some("server gone"));
        assert!(second.is_finished());
        assert_eq!(second.run_state(), RunState::NotRunning);
    }
}
