mod common;

use std::thread;
use std::time::Duration;

use common::{Fired, Recorder};
use sql_txqueue::test_utils::{Gate, MockConnection};
use sql_txqueue::{
    CallbackRef, Database, Event, Handle, Query, ResultStatus, Transaction, TxQueueError,
};

fn open_later(gate: &Gate, delay: Duration) -> thread::JoinHandle<()> {
    let gate = gate.clone();
    thread::spawn(move || {
        thread::sleep(delay);
        gate.open();
    })
}

#[test]
fn abort_removes_pending_work() -> Result<(), TxQueueError> {
    let gate = Gate::new();
    let conn = MockConnection::new().with_gate("BLOCK", gate.clone());
    let log = conn.log();
    let mut db = Database::single(conn)?;
    let mut host = Recorder::default();

    let blocker = Query::new("BLOCK");
    blocker.start(&db)?;
    gate.wait_for_arrival();

    let member = Query::new("INSERT INTO t VALUES (1)");
    let tx = Transaction::new();
    tx.append(&member)?;
    tx.on_aborted(CallbackRef::from_raw(5));
    tx.start(&db)?;
    let later = Query::new("SELECT 1");
    later.start(&db)?;
    assert_eq!(db.pending_len(), 2);

    assert!(db.abort(&tx, &mut host));
    assert!(!db.abort(&tx, &mut host));
    assert_eq!(
        host.fired,
        vec![
            Fired::Named(member.id(), Event::Aborted),
            Fired::Explicit(CallbackRef::from_raw(5), Event::Aborted),
        ]
    );
    assert_eq!(db.pending_len(), 1);
    assert!(!tx.is_running());
    assert!(!member.is_running());
    assert_eq!(member.bound_transaction(), None);

    gate.open();
    db.wait(&later, false, &mut host)?;
    assert_eq!(log.executed(), vec!["BLOCK".to_string(), "SELECT 1".to_string()]);
    assert_eq!(tx.result_status(), ResultStatus::None);
    Ok(())
}

#[test]
fn running_work_cannot_be_aborted() -> Result<(), TxQueueError> {
    let gate = Gate::new();
    let mut db = Database::single(MockConnection::new().with_gate("BLOCK", gate.clone()))?;
    let mut host = Recorder::default();

    let blocker = Query::new("BLOCK");
    blocker.start(&db)?;
    gate.wait_for_arrival();
    assert!(!db.abort(&blocker, &mut host));

    gate.open();
    db.wait(&blocker, false, &mut host)?;
    assert_eq!(host.named(blocker.id()), vec![Event::Success]);
    Ok(())
}

#[test]
fn wait_can_jump_the_queue() -> Result<(), TxQueueError> {
    let gate = Gate::new();
    let conn = MockConnection::new().with_gate("BLOCK", gate.clone());
    let log = conn.log();
    let mut db = Database::single(conn)?;
    let mut host = Recorder::default();

    Query::new("BLOCK").start(&db)?;
    gate.wait_for_arrival();
    let queries: Vec<Query> = ["A", "B", "C"].into_iter().map(Query::new).collect();
    for query in &queries {
        query.start(&db)?;
    }

    let opener = open_later(&gate, Duration::from_millis(50));
    db.wait(&queries[2], true, &mut host)?;
    opener.join().map_err(|_| TxQueueError::WorkerError("opener panicked".into()))?;

    let executed = log.executed();
    assert_eq!(executed[..2], ["BLOCK".to_string(), "C".to_string()]);
    assert_eq!(queries[2].result_status(), ResultStatus::Success);
    Ok(())
}

#[test]
fn waiting_requires_a_submitted_run() -> Result<(), TxQueueError> {
    let mut db = Database::single(MockConnection::new())?;
    let mut host = Recorder::default();

    let query = Query::new("SELECT 1");
    assert!(matches!(
        db.wait(&query, false, &mut host),
        Err(TxQueueError::InvalidState(_))
    ));

    let tx = Transaction::new();
    tx.append(&query)?;
    assert!(matches!(
        db.wait(&query, false, &mut host),
        Err(TxQueueError::InvalidState(_))
    ));

    tx.start(&db)?;
    db.wait(&query, false, &mut host)?;
    assert_eq!(query.result_status(), ResultStatus::Success);
    Ok(())
}

#[test]
fn waiting_after_delivery_returns_at_once() -> Result<(), TxQueueError> {
    let mut db = Database::single(MockConnection::new())?;
    let mut host = Recorder::default();

    let insert = Query::new("INSERT INTO t VALUES (1)");
    let tx = Transaction::new();
    tx.append(&insert)?;
    tx.start(&db)?;
    while db.completed_len() < 2 {
        thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(db.poll(&mut host), 2);
    assert!(!tx.is_running());

    assert_eq!(db.wait(&tx, false, &mut host)?, 0);
    assert_eq!(db.wait(&insert, true, &mut host)?, 0);
    assert_eq!(tx.result_status(), ResultStatus::Success);
    assert_eq!(host.named(tx.id()), vec![Event::Success]);
    Ok(())
}

#[test]
fn shutdown_finishes_running_and_aborts_pending() -> Result<(), TxQueueError> {
    let gate = Gate::new();
    let conn = MockConnection::new().with_gate("BLOCK", gate.clone());
    let log = conn.log();
    let mut db = Database::single(conn)?;
    let mut host = Recorder::default();

    let running = Query::new("BLOCK");
    running.start(&db)?;
    gate.wait_for_arrival();
    let pending = Query::new("INSERT INTO t VALUES (1)");
    pending.start(&db)?;

    let opener = open_later(&gate, Duration::from_millis(20));
    db.shutdown();
    opener.join().map_err(|_| TxQueueError::WorkerError("opener panicked".into()))?;

    assert!(db.is_disconnected());
    assert_eq!(db.poll(&mut host), 2);
    assert_eq!(host.named(running.id()), vec![Event::Success]);
    assert_eq!(host.named(pending.id()), vec![Event::Aborted]);
    assert_eq!(log.executed(), vec!["BLOCK".to_string()]);

    assert!(matches!(pending.start(&db), Err(TxQueueError::Disconnected)));
    Ok(())
}
