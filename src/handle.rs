//! Bookkeeping shared by [`Query`](crate::query::Query) and
//! [`Transaction`](crate::transaction::Transaction) handles.

use std::sync::Arc;

use crate::callback::SourceId;
use crate::error::TxQueueError;
use crate::unit::{Completion, ResultStatus, UnitState};

#[derive(Debug)]
struct TrackedRun {
    completion: Arc<Completion>,
    submitted: bool,
}

/// Runs built from one handle that have not been delivered yet, plus the last delivered result.
#[derive(Debug, Default)]
pub(crate) struct RunTracker {
    runs: Vec<TrackedRun>,
    has_been_started: bool,
    last_result: ResultStatus,
    last_error: Option<String>,
    /// Signal of the most recently delivered submitted run; already fired.
    last_delivered: Option<Arc<Completion>>,
}

impl RunTracker {
    pub(crate) fn track(&mut self, completion: &Arc<Completion>, submitted: bool) {
        self.runs.push(TrackedRun {
            completion: Arc::clone(completion),
            submitted,
        });
    }

    pub(crate) fn mark_submitted(&mut self, completion: &Arc<Completion>) {
        if let Some(run) = self
            .runs
            .iter_mut()
            .find(|run| Arc::ptr_eq(&run.completion, completion))
        {
            run.submitted = true;
        }
    }

    pub(crate) fn release(&mut self, completion: &Arc<Completion>) {
        let Some(pos) = self
            .runs
            .iter()
            .position(|run| Arc::ptr_eq(&run.completion, completion))
        else {
            return;
        };
        let run = self.runs.remove(pos);
        if run.submitted {
            self.last_delivered = Some(run.completion);
        }
    }

    /// Returns the previous value.
    pub(crate) fn mark_started(&mut self) -> bool {
        std::mem::replace(&mut self.has_been_started, true)
    }

    pub(crate) fn has_been_started(&self) -> bool {
        self.has_been_started
    }

    pub(crate) fn is_running(&self) -> bool {
        !self.runs.is_empty()
    }

    /// A submitted run whose worker has not signalled completion yet.
    pub(crate) fn has_active_run(&self) -> bool {
        self.runs
            .iter()
            .any(|run| run.submitted && !run.completion.is_done())
    }

    pub(crate) fn record(&mut self, state: &UnitState) {
        self.last_result = state.result_status();
        self.last_error = state.error().map(str::to_string);
    }

    pub(crate) fn last_result(&self) -> ResultStatus {
        self.last_result
    }

    pub(crate) fn last_error(&self) -> Option<String> {
        self.last_error.clone()
    }

    /// The newest submitted run still outstanding, else the last one delivered.
    pub(crate) fn latest(&self) -> Result<Arc<Completion>, TxQueueError> {
        if let Some(run) = self.runs.iter().rev().find(|run| run.submitted) {
            return Ok(Arc::clone(&run.completion));
        }
        if let Some(done) = &self.last_delivered {
            return Ok(Arc::clone(done));
        }
        if self.runs.is_empty() {
            Err(TxQueueError::InvalidState("not started".into()))
        } else {
            Err(TxQueueError::InvalidState(
                "queued in a transaction that has not been started".into(),
            ))
        }
    }
}

mod private {
    pub trait Sealed {}

    impl Sealed for crate::query::Query {}
    impl Sealed for crate::transaction::Transaction {}
}

/// Operations common to every startable handle.
pub trait Handle: private::Sealed {
    fn id(&self) -> SourceId;

    /// Whether any run built from this handle has not had its callbacks dispatched yet.
    fn is_running(&self) -> bool;

    /// Result of the most recently dispatched run.
    fn result_status(&self) -> ResultStatus;

    /// Error message of the most recently dispatched run, if it failed.
    fn error(&self) -> Option<String>;

    /// Completion signal of the most recent submitted run.
    ///
    /// # Errors
    /// Returns `TxQueueError::InvalidState` if the handle has no submitted run.
    #[doc(hidden)]
    fn latest_run(&self) -> Result<Arc<Completion>, TxQueueError>;
}
