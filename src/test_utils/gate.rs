use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

/// A one-shot barrier a [`MockConnection`](super::MockConnection) blocks on before
/// executing a gated statement. Clones share the same gate.
#[derive(Debug, Clone, Default)]
pub struct Gate {
    inner: Arc<GateInner>,
}

#[derive(Debug, Default)]
struct GateInner {
    state: Mutex<GateState>,
    changed: Condvar,
}

#[derive(Debug, Default)]
struct GateState {
    open: bool,
    arrived: usize,
}

impl Gate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Let every current and future arrival through.
    pub fn open(&self) {
        self.lock().open = true;
        self.inner.changed.notify_all();
    }

    /// Block until at least one worker is waiting at (or has passed) the gate.
    pub fn wait_for_arrival(&self) {
        let mut state = self.lock();
        while state.arrived == 0 {
            state = self
                .inner
                .changed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    #[must_use]
    pub fn arrivals(&self) -> usize {
        self.lock().arrived
    }

    pub(crate) fn pass(&self) {
        let mut state = self.lock();
        state.arrived += 1;
        self.inner.changed.notify_all();
        while !state.open {
            state = self
                .inner
                .changed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
