//! Callback identities and the host that invokes them on the owning thread.
//!
//! Units carry only identities ([`CallbackRef`], or a [`SourceId`] plus an [`Event`] name),
//! never closures, so they can travel through worker threads while the callbacks
//! themselves stay on the thread that owns them.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::results::ResultSet;

/// Identity of a registered callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackRef(u64);

impl CallbackRef {
    #[must_use]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Identity of a [`Query`](crate::query::Query) or [`Transaction`](crate::transaction::Transaction) handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(u64);

static NEXT_SOURCE_ID: AtomicU64 = AtomicU64::new(1);

impl SourceId {
    pub(crate) fn next() -> Self {
        Self(NEXT_SOURCE_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Handle-level event names used when a unit has no explicit callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    Success,
    Error,
    Aborted,
}

impl Event {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Event::Success => "onSuccess",
            Event::Error => "onError",
            Event::Aborted => "onAborted",
        }
    }
}

/// What a callback is told about a finished run.
#[derive(Debug, Clone, Copy)]
pub enum Outcome<'a> {
    /// The run succeeded; statements may carry their output.
    Success(Option<&'a ResultSet>),
    /// The run failed with this message.
    Error(&'a str),
    /// The run was removed from the pending queue before a worker picked it up.
    Aborted,
}

impl Outcome<'_> {
    #[must_use]
    pub fn event(&self) -> Event {
        match self {
            Outcome::Success(_) => Event::Success,
            Outcome::Error(_) => Event::Error,
            Outcome::Aborted => Event::Aborted,
        }
    }
}

/// Explicit callback identities attached to a handle and copied into every unit built from it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnitCallbacks {
    pub on_success: Option<CallbackRef>,
    pub on_error: Option<CallbackRef>,
    pub on_aborted: Option<CallbackRef>,
}

impl UnitCallbacks {
    #[must_use]
    pub fn for_event(&self, event: Event) -> Option<CallbackRef> {
        match event {
            Event::Success => self.on_success,
            Event::Error => self.on_error,
            Event::Aborted => self.on_aborted,
        }
    }
}

/// Invokes callbacks. Only ever called from the thread that drains the completion queue.
pub trait CallbackHost {
    fn invoke(&mut self, callback: CallbackRef, outcome: &Outcome<'_>);

    fn invoke_named(&mut self, source: SourceId, event: Event, outcome: &Outcome<'_>);
}

type BoxedCallback = Box<dyn FnMut(&Outcome<'_>)>;

/// A [`CallbackHost`] that keeps closures in maps keyed by identity.
///
/// Closures need not be `Send`; the registry never leaves the owning thread.
#[derive(Default)]
pub struct CallbackRegistry {
    next: u64,
    callbacks: HashMap<CallbackRef, BoxedCallback>,
    named: HashMap<(SourceId, Event), BoxedCallback>,
    invocations: usize,
}

impl CallbackRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a closure and return its identity.
    pub fn register<F>(&mut self, callback: F) -> CallbackRef
    where
        F: FnMut(&Outcome<'_>) + 'static,
    {
        self.next += 1;
        let id = CallbackRef(self.next);
        self.callbacks.insert(id, Box::new(callback));
        id
    }

    /// Register a named handle-level callback (`onSuccess`, `onError`, `onAborted`).
    pub fn on<F>(&mut self, source: SourceId, event: Event, callback: F)
    where
        F: FnMut(&Outcome<'_>) + 'static,
    {
        self.named.insert((source, event), Box::new(callback));
    }

    pub fn unregister(&mut self, callback: CallbackRef) -> bool {
        self.callbacks.remove(&callback).is_some()
    }

    /// Drop every named callback registered for `source`.
    pub fn forget(&mut self, source: SourceId) {
        self.named.retain(|(id, _), _| *id != source);
    }

    /// Number of callbacks actually run so far.
    #[must_use]
    pub fn invocations(&self) -> usize {
        self.invocations
    }
}

impl CallbackHost for CallbackRegistry {
    fn invoke(&mut self, callback: CallbackRef, outcome: &Outcome<'_>) {
        if let Some(f) = self.callbacks.get_mut(&callback) {
            self.invocations += 1;
            f(outcome);
        } else {
            tracing::debug!(callback = callback.raw(), "callback not registered; skipped");
        }
    }

    fn invoke_named(&mut self, source: SourceId, event: Event, outcome: &Outcome<'_>) {
        if let Some(f) = self.named.get_mut(&(source, event)) {
            self.invocations += 1;
            f(outcome);
        }
    }
}

impl fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("callbacks", &self.callbacks.len())
            .field("named", &self.named.len())
            .field("invocations", &self.invocations)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    #[test]
    fn registry_runs_non_send_closures() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut registry = CallbackRegistry::new();
        let sink = Rc::clone(&seen);
        let cb = registry.register(move |outcome| {
            sink.borrow_mut().push(outcome.event());
        });

        registry.invoke(cb, &Outcome::Error("boom"));
        registry.invoke(CallbackRef::from_raw(999), &Outcome::Aborted);

        assert_eq!(*seen.borrow(), vec![Event::Error]);
        assert_eq!(registry.invocations(), 1);
    }

    #[test]
    fn named_callbacks_are_per_source_and_event() {
        let hits = Rc::new(RefCell::new(0));
        let mut registry = CallbackRegistry::new();
        let source = SourceId::next();
        let other = SourceId::next();
        let counter = Rc::clone(&hits);
        registry.on(source, Event::Success, move |_| *counter.borrow_mut() += 1);

        registry.invoke_named(source, Event::Success, &Outcome::Success(None));
        registry.invoke_named(source, Event::Error, &Outcome::Error("x"));
        registry.invoke_named(other, Event::Success, &Outcome::Success(None));
        assert_eq!(*hits.borrow(), 1);

        registry.forget(source);
        registry.invoke_named(source, Event::Success, &Outcome::Success(None));
        assert_eq!(*hits.borrow(), 1);
    }
}
