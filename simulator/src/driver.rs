use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use sql_txqueue::test_utils::{CallLog, MockConnection};
use sql_txqueue::{Database, EngineOptions, Handle, Query, SourceId, Transaction, TxQueueError};
use tracing::{debug, info};

use crate::args::SimConfig;
use crate::generation::{Submission, generate_plan};
use crate::oracle::{EventLog, Oracle};

/// Handles created for one submission.
pub(crate) enum Live {
    Query(Query),
    Transaction {
        tx: Transaction,
        members: Vec<Query>,
        cleared: Vec<Query>,
    },
}

pub(crate) struct Record {
    pub(crate) index: usize,
    pub(crate) live: Live,
    pub(crate) aborted: bool,
}

impl Live {
    fn source(&self) -> SourceId {
        match self {
            Live::Query(query) => query.id(),
            Live::Transaction { tx, .. } => tx.id(),
        }
    }
}

pub(crate) fn run(config: &SimConfig, rng: &mut ChaCha8Rng) -> Result<(), String> {
    let plan = generate_plan(config, rng);
    info!(
        submissions = plan.submissions.len(),
        statements = plan.statement_count(),
        "plan generated"
    );

    let log = CallLog::new();
    let mut probes: Vec<Arc<AtomicBool>> = Vec::with_capacity(config.workers);
    let options = EngineOptions::builder()
        .workers(config.workers)
        .thread_name_prefix("sim-worker")
        .retry(config.retry)
        .finish();
    let mut db = Database::with_factory(options, |_| {
        let conn = plan.configure(MockConnection::new().with_log(log.clone()), config);
        probes.push(conn.auto_reconnect_probe());
        Ok(conn)
    })
    .map_err(|err| format!("engine failed to start: {err}"))?;

    let mut events = EventLog::default();
    let mut records: Vec<Record> = Vec::with_capacity(plan.submissions.len());

    for (chunk_idx, chunk) in plan.submissions.chunks(config.window).enumerate() {
        let base = chunk_idx * config.window;
        let mut window = Vec::with_capacity(chunk.len());
        for (offset, submission) in chunk.iter().enumerate() {
            let live = start(&db, submission)
                .map_err(|err| format!("submission {}: start failed: {err}", base + offset))?;
            window.push(Record {
                index: base + offset,
                live,
                aborted: false,
            });
        }

        for record in &mut window {
            if plan.submissions[record.index].abort() {
                record.aborted = match &record.live {
                    Live::Query(query) => db.abort(query, &mut events),
                    Live::Transaction { tx, .. } => db.abort(tx, &mut events),
                };
            }
        }

        for record in window.iter().filter(|r| !r.aborted) {
            let swap = rng.random::<f64>() < 0.1;
            let waited = match &record.live {
                Live::Query(query) => db.wait(query, swap, &mut events),
                Live::Transaction { tx, .. } => db.wait(tx, swap, &mut events),
            };
            waited.map_err(|err| {
                format!("submission {} ({}): wait failed: {err}", record.index, record.live.source())
            })?;
        }

        debug!(
            window = chunk_idx,
            aborted = window.iter().filter(|r| r.aborted).count(),
            callbacks = events.len(),
            "window finished"
        );
        records.extend(window);
    }

    db.poll(&mut events);
    db.shutdown();
    db.poll(&mut events);

    Oracle::check(config, &plan, &records, &events, &log, &probes)?;

    info!(
        "complete: submissions={} statements={} callbacks={} aborted={} workers={}",
        records.len(),
        plan.statement_count(),
        events.len(),
        records.iter().filter(|r| r.aborted).count(),
        config.workers
    );
    Ok(())
}

fn start(db: &Database, submission: &Submission) -> Result<Live, TxQueueError> {
    match submission {
        Submission::Standalone { statement, .. } => {
            let query = Query::new(statement.sql.as_str());
            query.start(db)?;
            Ok(Live::Query(query))
        }
        Submission::Transaction {
            statements,
            cleared,
            ..
        } => {
            let tx = Transaction::new();
            let cleared: Vec<Query> = cleared.iter().map(|s| Query::new(s.sql.as_str())).collect();
            for query in &cleared {
                tx.append(query)?;
            }
            tx.clear();

            let members: Vec<Query> = statements
                .iter()
                .map(|s| Query::new(s.sql.as_str()))
                .collect();
            for query in &members {
                tx.append(query)?;
            }
            tx.start(db)?;
            Ok(Live::Transaction {
                tx,
                members,
                cleared,
            })
        }
    }
}
