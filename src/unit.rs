//! Per-run state shared by statement units and transaction batches.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;

use crate::callback::{SourceId, UnitCallbacks};
use crate::results::ResultSet;
use crate::statement::Statement;

/// Outcome of the latest execution attempt.
///
/// Moves `None -> Running -> {Success, Error}`; a retry resets it to `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResultStatus {
    #[default]
    None,
    Running,
    Success,
    Error,
}

/// Where a run is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    /// Built and queued, not yet picked up by a worker.
    #[default]
    NotRunning,
    Running,
    /// Callbacks have been dispatched.
    Complete,
    /// Removed from the pending queue before it ran.
    Aborted,
}

/// Wake-up signal for callers blocking (or awaiting) one specific run.
///
/// Fired exactly once, by the worker, after the run's units have been pushed to the
/// completion queue.
#[derive(Debug, Default)]
pub struct Completion {
    done: Mutex<bool>,
    wakeup: Condvar,
    notify: Notify,
}

impl Completion {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        *self.done.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn signal(&self) {
        let mut done = self.done.lock().unwrap_or_else(PoisonError::into_inner);
        *done = true;
        self.wakeup.notify_all();
        drop(done);
        self.notify.notify_waiters();
    }

    /// Block the current thread until the run finishes.
    pub fn wait(&self) {
        let mut done = self.done.lock().unwrap_or_else(PoisonError::into_inner);
        while !*done {
            done = self
                .wakeup
                .wait(done)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Like [`Completion::wait`] with an upper bound; returns whether the run finished.
    #[must_use]
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let done = self.done.lock().unwrap_or_else(PoisonError::into_inner);
        let (done, _) = self
            .wakeup
            .wait_timeout_while(done, timeout, |done| !*done)
            .unwrap_or_else(PoisonError::into_inner);
        *done
    }

    pub async fn wait_async(&self) {
        loop {
            // Registered before the check so a signal in between is not missed.
            let notified = self.notify.notified();
            if self.is_done() {
                return;
            }
            notified.await;
        }
    }
}

/// Mutable state of one run.
///
/// Written by exactly one party at a time: the worker while the run executes, the
/// dispatcher after the run has been popped from the completion queue.
#[derive(Debug)]
pub struct UnitState {
    result: ResultStatus,
    run: RunState,
    error: Option<String>,
    finished: bool,
    first_data: bool,
    callbacks: UnitCallbacks,
    owner: Option<SourceId>,
    completion: Arc<Completion>,
}

impl UnitState {
    pub(crate) fn new(callbacks: UnitCallbacks, first_data: bool, owner: Option<SourceId>) -> Self {
        Self {
            result: ResultStatus::None,
            run: RunState::NotRunning,
            error: None,
            finished: false,
            first_data,
            callbacks,
            owner,
            completion: Completion::new(),
        }
    }

    #[must_use]
    pub fn result_status(&self) -> ResultStatus {
        self.result
    }

    #[must_use]
    pub fn run_state(&self) -> RunState {
        self.run
    }

    /// Error message; present iff the result status is `Error`.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Whether this run falls back to the handle's named callbacks.
    #[must_use]
    pub fn is_first_data(&self) -> bool {
        self.first_data
    }

    #[must_use]
    pub fn callbacks(&self) -> &UnitCallbacks {
        &self.callbacks
    }

    /// The transaction this unit was appended to, if any.
    #[must_use]
    pub fn owner(&self) -> Option<SourceId> {
        self.owner
    }

    #[must_use]
    pub fn completion(&self) -> &Arc<Completion> {
        &self.completion
    }

    pub(crate) fn mark_running(&mut self) {
        self.run = RunState::Running;
    }

    pub(crate) fn mark_complete(&mut self) {
        self.run = RunState::Complete;
    }

    pub(crate) fn mark_aborted(&mut self) {
        self.run = RunState::Aborted;
    }

    /// Clear the previous attempt's outcome.
    pub(crate) fn reset_result(&mut self) {
        self.result = ResultStatus::None;
        self.error = None;
    }

    pub(crate) fn set_result_running(&mut self) {
        self.result = ResultStatus::Running;
    }

    pub(crate) fn succeed(&mut self) {
        self.result = ResultStatus::Success;
        self.error = None;
    }

    pub(crate) fn fail(&mut self, message: impl Into<String>) {
        self.result = ResultStatus::Error;
        self.error = Some(message.into());
    }

    pub(crate) fn set_finished(&mut self, finished: bool) {
        self.finished = finished;
    }
}

/// One statement plus the outcome of running it.
#[derive(Debug)]
pub struct StatementUnit {
    pub(crate) statement: Statement,
    pub(crate) state: UnitState,
    pub(crate) output: Option<ResultSet>,
}

impl StatementUnit {
    pub(crate) fn new(statement: Statement, state: UnitState) -> Self {
        Self {
            statement,
            state,
            output: None,
        }
    }

    #[must_use]
    pub fn statement(&self) -> &Statement {
        &self.statement
    }

    #[must_use]
    pub fn state(&self) -> &UnitState {
        &self.state
    }

    #[must_use]
    pub fn output(&self) -> Option<&ResultSet> {
        self.output.as_ref()
    }
}
