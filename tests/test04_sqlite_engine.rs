#![cfg(feature = "sqlite")]

mod common;

use common::Recorder;
use sql_txqueue::sqlite::SqliteConnection;
use sql_txqueue::{
    Database, EngineOptions, Event, Handle, Query, ResultStatus, RowValues, Statement, Transaction,
    TxQueueError,
};

fn count_rows(db: &mut Database, host: &mut Recorder) -> Result<i64, TxQueueError> {
    let count = Query::new("SELECT COUNT(*) AS cnt FROM accounts");
    count.start(db)?;
    db.wait(&count, false, host)?;
    let rs = count
        .take_output()
        .ok_or_else(|| TxQueueError::InvalidState("count produced no rows".into()))?;
    rs.results[0]
        .get("cnt")
        .and_then(RowValues::as_int)
        .copied()
        .ok_or_else(|| TxQueueError::InvalidState("missing count".into()))
}

#[test]
fn file_backed_transactions_commit_or_roll_back() -> Result<(), TxQueueError> {
    let dir = tempfile::tempdir().map_err(|e| TxQueueError::ConfigError(e.to_string()))?;
    let path = dir.path().join("txqueue.db");
    let mut db = Database::with_factory(EngineOptions::new(1), |_| SqliteConnection::open(&path))?;
    let mut host = Recorder::default();

    let create = Query::new(
        "CREATE TABLE accounts (id INTEGER PRIMARY KEY, owner TEXT NOT NULL UNIQUE, balance INTEGER)",
    );
    create.start(&db)?;
    db.wait(&create, false, &mut host)?;
    assert_eq!(create.result_status(), ResultStatus::Success);

    let good = Transaction::new();
    for owner in ["alice", "bob"] {
        good.append(&Query::new(Statement::with_params(
            "INSERT INTO accounts (owner, balance) VALUES (?1, ?2)",
            vec![RowValues::Text(owner.into()), RowValues::Int(100)],
        )))?;
    }
    good.start(&db)?;
    db.wait(&good, false, &mut host)?;
    assert_eq!(host.named(good.id()), vec![Event::Success]);
    assert_eq!(count_rows(&mut db, &mut host)?, 2);

    let bad = Transaction::new();
    let carol = Query::new("INSERT INTO accounts (owner, balance) VALUES ('carol', 5)");
    let duplicate = Query::new("INSERT INTO accounts (owner, balance) VALUES ('alice', 1)");
    bad.append(&carol)?;
    bad.append(&duplicate)?;
    bad.start(&db)?;
    db.wait(&bad, false, &mut host)?;

    assert_eq!(bad.result_status(), ResultStatus::Error);
    assert!(duplicate.error().is_some_and(|e| e.contains("UNIQUE")));
    assert_eq!(carol.result_status(), ResultStatus::Success);
    assert_eq!(count_rows(&mut db, &mut host)?, 2);
    Ok(())
}

#[test]
fn reopened_file_sees_committed_rows() -> Result<(), TxQueueError> {
    let dir = tempfile::tempdir().map_err(|e| TxQueueError::ConfigError(e.to_string()))?;
    let path = dir.path().join("persist.db");
    let mut host = Recorder::default();

    {
        let mut db = Database::single(SqliteConnection::open(&path)?)?;
        let tx = Transaction::new();
        tx.append(&Query::new("CREATE TABLE accounts (id INTEGER PRIMARY KEY, owner TEXT)"))?;
        tx.append(&Query::new("INSERT INTO accounts (owner) VALUES ('dave')"))?;
        tx.start(&db)?;
        db.wait(&tx, false, &mut host)?;
        assert_eq!(tx.result_status(), ResultStatus::Success);
    }

    let mut db = Database::single(SqliteConnection::open(&path)?)?;
    assert_eq!(count_rows(&mut db, &mut host)?, 1);
    Ok(())
}
