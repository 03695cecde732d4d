#![allow(dead_code)]

use sql_txqueue::{CallbackHost, CallbackRef, Event, Outcome, SourceId};

/// Records every callback the dispatcher fires, in order.
#[derive(Debug, Default)]
pub struct Recorder {
    pub fired: Vec<Fired>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fired {
    Explicit(CallbackRef, Event),
    Named(SourceId, Event),
}

impl Recorder {
    pub fn named(&self, source: SourceId) -> Vec<Event> {
        self.fired
            .iter()
            .filter_map(|f| match f {
                Fired::Named(s, event) if *s == source => Some(*event),
                _ => None,
            })
            .collect()
    }

    pub fn sources(&self) -> Vec<SourceId> {
        self.fired
            .iter()
            .filter_map(|f| match f {
                Fired::Named(s, _) => Some(*s),
                Fired::Explicit(..) => None,
            })
            .collect()
    }
}

impl CallbackHost for Recorder {
    fn invoke(&mut self, callback: CallbackRef, outcome: &Outcome<'_>) {
        self.fired.push(Fired::Explicit(callback, outcome.event()));
    }

    fn invoke_named(&mut self, source: SourceId, event: Event, _outcome: &Outcome<'_>) {
        self.fired.push(Fired::Named(source, event));
    }
}
