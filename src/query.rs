use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::callback::{CallbackRef, SourceId, UnitCallbacks};
use crate::database::Database;
use crate::error::TxQueueError;
use crate::handle::{Handle, RunTracker};
use crate::results::ResultSet;
use crate::statement::Statement;
use crate::unit::{Completion, ResultStatus, RunState, StatementUnit, UnitState};

/// Caller-facing handle for one statement.
///
/// A query can be started on its own or appended to any number of
/// [`Transaction`](crate::transaction::Transaction)s; every start or append builds a fresh
/// [`StatementUnit`]. Clones share the same handle.
#[derive(Clone)]
pub struct Query {
    inner: Arc<QueryInner>,
}

struct QueryInner {
    id: SourceId,
    statement: Statement,
    state: Mutex<QueryState>,
}

#[derive(Default)]
struct QueryState {
    callbacks: UnitCallbacks,
    runs: RunTracker,
    /// Transaction currently holding units of this query, and how many.
    bound_to: Option<(SourceId, usize)>,
    last_output: Option<ResultSet>,
}

impl Query {
    #[must_use]
    pub fn new(statement: impl Into<Statement>) -> Self {
        Self {
            inner: Arc::new(QueryInner {
                id: SourceId::next(),
                statement: statement.into(),
                state: Mutex::new(QueryState::default()),
            }),
        }
    }

    #[must_use]
    pub fn statement(&self) -> &Statement {
        &self.inner.statement
    }

    /// Callbacks copied into every unit built after this call.
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

    /// Queue this query for standalone execution (autocommit) on `db`.
    ///
    /// # Errors
    /// Returns `TxQueueError::Disconnected` if the database has been shut down.
    pub fn start(&self, db: &Database) -> Result<(), TxQueueError> {
        db.start_query(self)
    }

    /// Output of the most recently dispatched successful run.
    #[must_use]
    pub fn take_output(&self) -> Option<ResultSet> {
        self.lock().last_output.take()
    }

    /// Transaction currently holding queued or in-flight units of this query.
    #[must_use]
    pub fn bound_transaction(&self) -> Option<SourceId> {
        self.lock().bound_to.map(|(tx, _)| tx)
    }

    pub(crate) fn build_standalone_unit(&self) -> StatementUnit {
        let mut state = self.lock();
        let first_data = !state.runs.mark_started();
        let unit_state = UnitState::new(state.callbacks, first_data, None);
        state.runs.track(unit_state.completion(), true);
        StatementUnit::new(self.inner.statement.clone(), unit_state)
    }

    /// Build a unit for `transaction`.
    ///
    /// Appending does not count as starting the query.
    pub(crate) fn build_unit_for(&self, transaction: SourceId) -> Result<StatementUnit, TxQueueError> {
        let mut state = self.lock();
        let held = match state.bound_to {
            Some((owner, _)) if owner != transaction => {
                return Err(TxQueueError::InvalidState(format!(
                    "query {} already belongs to transaction {owner}",
                    self.inner.id
                )));
            }
            Some((_, count)) => count,
            None => 0,
        };
        state.bound_to = Some((transaction, held + 1));
        let first_data = !state.runs.has_been_started();
        let unit_state = UnitState::new(state.callbacks, first_data, Some(transaction));
        state.runs.track(unit_state.completion(), false);
        Ok(StatementUnit::new(self.inner.statement.clone(), unit_state))
    }

    pub(crate) fn mark_submitted(&self, completion: &Arc<Completion>) {
        self.lock().runs.mark_submitted(completion);
    }

    /// Drop a unit that will never run (cleared before its transaction started).
    pub(crate) fn discard_unit(&self, unit: &StatementUnit) {
        let mut state = self.lock();
        state.runs.release(unit.state.completion());
        if unit.state.owner().is_some() {
            unbind(&mut state);
        }
    }

    /// Record a dispatched unit as this handle's latest result.
    pub(crate) fn finish_unit(&self, unit: StatementUnit) {
        let mut state = self.lock();
        state.runs.release(unit.state.completion());
        if unit.state.owner().is_some() {
            unbind(&mut state);
        }
        if unit.state.run_state() != RunState::Aborted {
            state.runs.record(&unit.state);
            state.last_output = unit.output;
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueryState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn unbind(state: &mut QueryState) {
    if let Some((_, count)) = state.bound_to.as_mut() {
        *count = count.saturating_sub(1);
        if *count == 0 {
            state.bound_to = None;
        }
    }
}

impl Handle for Query {
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

impl PartialEq for Query {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Query {}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("id", &self.inner.id)
            .field("sql", &self.inner.statement.sql())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_standalone_run_is_first_data() {
        let query = Query::new("SELECT 1");
        let first = query.build_standalone_unit();
        let second = query.build_standalone_unit();
        assert!(first.state().is_first_data());
        assert!(!second.state().is_first_data());
        assert!(query.is_running());
    }

    #[test]
    fn cannot_join_two_transactions() {
        let query = Query::new("INSERT INTO t VALUES (1)");
        let tx_a = SourceId::next();
        let tx_b = SourceId::next();
        let unit = query.build_unit_for(tx_a).unwrap();
        assert!(query.build_unit_for(tx_a).is_ok());
        assert!(matches!(
            query.build_unit_for(tx_b),
            Err(TxQueueError::InvalidState(_))
        ));
        assert_eq!(query.bound_transaction(), Some(tx_a));

        query.discard_unit(&unit);
        assert_eq!(query.bound_transaction(), Some(tx_a));
    }

    #[test]
    fn unsubmitted_run_cannot_be_waited_on() {
        let query = Query::new("SELECT 1");
        assert!(query.latest_run().is_err());
        let _unit = query.build_unit_for(SourceId::next()).unwrap();
        assert!(matches!(
            query.latest_run(),
            Err(TxQueueError::InvalidState(_))
        ));
    }

    #[test]
    fn callbacks_are_copied_into_units() {
        let query = Query::new("SELECT 1");
        query.on_error(CallbackRef::from_raw(7));
        let unit = query.build_standalone_unit();
        assert_eq!(unit.state().callbacks().on_error, Some(CallbackRef::from_raw(7)));
        assert_eq!(unit.state().callbacks().on_success, None);
    }
}
