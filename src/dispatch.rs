//! Delivers finished runs to user callbacks on the owning thread.

use tracing::trace;

use crate::callback::{CallbackHost, Event, Outcome, SourceId};
use crate::handle::Handle;
use crate::queue::{CompletionQueue, Finished};
use crate::results::ResultSet;
use crate::unit::{ResultStatus, RunState, UnitState};

/// Drains a [`CompletionQueue`] and fires at most one callback per finished run.
///
/// Must only be driven from the thread that owns the callbacks.
#[derive(Debug, Default)]
pub struct CallbackDispatcher {
    dispatched: u64,
}

impl CallbackDispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pop and dispatch everything currently queued. Returns the number of runs handled.
    pub fn drain<H: CallbackHost + ?Sized>(&mut self, queue: &CompletionQueue, host: &mut H) -> usize {
        let mut handled = 0;
        while let Some(finished) = queue.pop() {
            self.dispatch(finished, host);
            handled += 1;
        }
        if handled > 0 {
            trace!(handled, "drained completion queue");
        }
        handled
    }

    /// Dispatch one finished run and hand its outcome back to the originating handle.
    pub fn dispatch<H: CallbackHost + ?Sized>(&mut self, finished: Finished, host: &mut H) {
        self.dispatched += 1;
        match finished {
            Finished::Statement { query, mut unit } => {
                notify(query.id(), &mut unit.state, unit.output.as_ref(), host);
                query.finish_unit(unit);
            }
            Finished::Transaction {
                transaction,
                mut state,
                ..
            } => {
                notify(transaction.id(), &mut state, None, host);
                transaction.finish_run(&state);
            }
        }
    }

    /// Total runs dispatched over this dispatcher's lifetime.
    #[must_use]
    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }
}

fn notify<H: CallbackHost + ?Sized>(
    source: SourceId,
    state: &mut UnitState,
    output: Option<&ResultSet>,
    host: &mut H,
) {
    if state.run_state() == RunState::Aborted {
        fire(source, state, &Outcome::Aborted, host);
        return;
    }

    state.mark_complete();
    match state.result_status() {
        ResultStatus::None | ResultStatus::Running => {}
        ResultStatus::Error => {
            let message = state.error().unwrap_or_default().to_string();
            fire(source, state, &Outcome::Error(&message), host);
        }
        ResultStatus::Success => fire(source, state, &Outcome::Success(output), host),
    }
}

/// Explicit callback first; the handle's named callback only for its first-data run.
fn fire<H: CallbackHost + ?Sized>(
    source: SourceId,
    state: &UnitState,
    outcome: &Outcome<'_>,
    host: &mut H,
) {
    let event: Event = outcome.event();
    if let Some(callback) = state.callbacks().for_event(event) {
        host.invoke(callback, outcome);
    } else if state.is_first_data() {
        host.invoke_named(source, event, outcome);
    }
}
