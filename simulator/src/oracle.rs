use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use sql_txqueue::test_utils::CallLog;
use sql_txqueue::{CallbackHost, CallbackRef, Event, Handle, Outcome, Query, SourceId};

use crate::args::SimConfig;
use crate::driver::{Live, Record};
use crate::generation::{Plan, Submission};
use crate::model::{Expect, expect_standalone, expect_transaction};

/// Every named callback the engine fired, in dispatch order.
#[derive(Debug, Default)]
pub(crate) struct EventLog {
    fired: Vec<(SourceId, Event)>,
    unexpected_refs: usize,
}

impl EventLog {
    pub(crate) fn len(&self) -> usize {
        self.fired.len()
    }
}

impl CallbackHost for EventLog {
    fn invoke(&mut self, _callback: CallbackRef, _outcome: &Outcome<'_>) {
        self.unexpected_refs += 1;
    }

    fn invoke_named(&mut self, source: SourceId, event: Event, _outcome: &Outcome<'_>) {
        self.fired.push((source, event));
    }
}

fn expected_event(expect: Expect) -> Event {
    match expect {
        Expect::Success => Event::Success,
        Expect::Error => Event::Error,
    }
}

struct Observed {
    by_source: HashMap<SourceId, Vec<(usize, Event)>>,
    executed: HashMap<String, usize>,
    committed: HashMap<String, usize>,
}

impl Observed {
    fn new(events: &EventLog, log: &CallLog) -> Self {
        let mut by_source: HashMap<SourceId, Vec<(usize, Event)>> = HashMap::new();
        for (pos, (source, event)) in events.fired.iter().enumerate() {
            by_source.entry(*source).or_default().push((pos, *event));
        }
        let mut executed = HashMap::new();
        for sql in log.executed() {
            *executed.entry(sql).or_insert(0) += 1;
        }
        let mut committed = HashMap::new();
        for sql in log.committed() {
            *committed.entry(sql).or_insert(0) += 1;
        }
        Self {
            by_source,
            executed,
            committed,
        }
    }

    /// The one callback fired for `source`, with its dispatch position.
    fn single(&self, source: SourceId, what: &str) -> Result<(usize, Event), String> {
        match self.by_source.get(&source).map(Vec::as_slice) {
            Some([only]) => Ok(*only),
            Some(many) => Err(format!("{what} {source}: {} callbacks fired", many.len())),
            None => Err(format!("{what} {source}: no callback fired")),
        }
    }

    fn executions(&self, query: &Query) -> usize {
        self.executed.get(query.statement().sql()).copied().unwrap_or(0)
    }

    fn commits(&self, query: &Query) -> usize {
        self.committed.get(query.statement().sql()).copied().unwrap_or(0)
    }
}

pub(crate) struct Oracle;

impl Oracle {
    pub(crate) fn check(
        config: &SimConfig,
        plan: &Plan,
        records: &[Record],
        events: &EventLog,
        log: &CallLog,
        probes: &[Arc<AtomicBool>],
    ) -> Result<(), String> {
        if events.unexpected_refs > 0 {
            return Err(format!(
                "{} explicit callbacks fired but none were registered",
                events.unexpected_refs
            ));
        }
        let observed = Observed::new(events, log);
        let retry_possible = config.retry && !config.ping_fails;
        let mut sources_checked = 0;

        for record in records {
            let submission = plan
                .submissions
                .get(record.index)
                .ok_or_else(|| format!("record {} has no submission", record.index))?;
            match (submission, &record.live) {
                (Submission::Standalone { statement, .. }, Live::Query(query)) => {
                    sources_checked += 1;
                    let (_, event) = observed.single(query.id(), "query")?;
                    if record.aborted {
                        expect_eq("aborted query event", event, Event::Aborted)?;
                        expect_eq("aborted query executions", observed.executions(query), 0)?;
                    } else {
                        let (expect, error) = expect_standalone(statement);
                        expect_eq("query event", event, expected_event(expect))?;
                        expect_eq("query error", query.error(), error)?;
                        expect_eq("query executions", observed.executions(query), 1)?;
                        expect_eq(
                            "query commits",
                            observed.commits(query),
                            usize::from(expect == Expect::Success),
                        )?;
                    }
                    if query.is_running() {
                        return Err(format!("query {} still running", query.id()));
                    }
                }
                (
                    Submission::Transaction { statements, .. },
                    Live::Transaction {
                        tx,
                        members,
                        cleared,
                    },
                ) => {
                    for query in cleared {
                        if observed.by_source.contains_key(&query.id())
                            || observed.executions(query) > 0
                            || query.is_running()
                        {
                            return Err(format!("cleared query {} was not dropped", query.id()));
                        }
                    }

                    sources_checked += 1 + members.len();
                    let (tx_pos, tx_event) = observed.single(tx.id(), "transaction")?;
                    let mut last = None;
                    let mut member_events = Vec::with_capacity(members.len());
                    for query in members {
                        let (pos, event) = observed.single(query.id(), "member")?;
                        if last.is_some_and(|prev| prev > pos) || pos > tx_pos {
                            return Err(format!(
                                "transaction {}: member {} dispatched out of order",
                                tx.id(),
                                query.id()
                            ));
                        }
                        last = Some(pos);
                        member_events.push(event);
                    }

                    if record.aborted {
                        expect_eq("aborted transaction event", tx_event, Event::Aborted)?;
                        for (query, event) in members.iter().zip(&member_events) {
                            expect_eq("aborted member event", *event, Event::Aborted)?;
                            expect_eq("aborted member executions", observed.executions(query), 0)?;
                        }
                        continue;
                    }

                    let expected = expect_transaction(statements, retry_possible);
                    expect_eq("transaction event", tx_event, expected_event(expected.transaction))?;
                    expect_eq("transaction error", tx.error(), expected.error.clone())?;
                    for (idx, query) in members.iter().enumerate() {
                        let context = format!("transaction {} member {idx}", tx.id());
                        expect_eq(
                            &context,
                            member_events[idx],
                            expected_event(expected.statements[idx]),
                        )?;
                        expect_eq(&context, observed.executions(query), expected.executions[idx])?;
                        expect_eq(
                            &context,
                            observed.commits(query),
                            usize::from(expected.committed),
                        )?;
                        if expected.statements[idx] == Expect::Error {
                            expect_eq(&context, query.error(), expected.error.clone())?;
                        }
                    }
                    if tx.is_running() {
                        return Err(format!("transaction {} still running", tx.id()));
                    }
                }
                _ => return Err(format!("record {} does not match its submission", record.index)),
            }
        }

        expect_eq("sources with callbacks", observed.by_source.len(), sources_checked)?;

        if let Some((sql, count)) = observed.executed.iter().find(|(_, count)| **count > 2) {
            return Err(format!("{sql} executed {count} times; at most one retry allowed"));
        }
        if probes.iter().any(|probe| !probe.load(Ordering::SeqCst)) {
            return Err("auto-reconnect flag not restored after a run".to_string());
        }
        Ok(())
    }
}

fn expect_eq<T: PartialEq + std::fmt::Debug>(what: &str, actual: T, expected: T) -> Result<(), String> {
    if actual == expected {
        Ok(())
    } else {
        Err(format!("{what}: expected {expected:?}, got {actual:?}"))
    }
}
