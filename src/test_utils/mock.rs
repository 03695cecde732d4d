use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::connection::Connection;
use crate::error::DbError;
use crate::results::ResultSet;
use crate::statement::Statement;

use super::gate::Gate;

const SERVER_GONE: i32 = 2006;
const SERVER_LOST: i32 = 2013;

/// One call made against a [`MockConnection`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnCall {
    SetAutocommit(bool),
    Execute(String),
    Commit,
    Rollback,
    Ping,
    SetAutoReconnect(bool),
    Reconnected,
}

#[derive(Debug, Default)]
struct LogState {
    calls: Vec<ConnCall>,
    committed: Vec<String>,
}

/// Shared record of calls and of statements that became durable. Clones share the log.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    inner: Arc<Mutex<LogState>>,
}

impl CallLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn calls(&self) -> Vec<ConnCall> {
        self.lock().calls.clone()
    }

    /// SQL of every `execute` call, in order, including failed ones.
    #[must_use]
    pub fn executed(&self) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                ConnCall::Execute(sql) => Some(sql.clone()),
                _ => None,
            })
            .collect()
    }

    /// Statements that were committed, or executed successfully in autocommit mode.
    #[must_use]
    pub fn committed(&self) -> Vec<String> {
        self.lock().committed.clone()
    }

    #[must_use]
    pub fn count(&self, call: &ConnCall) -> usize {
        self.lock().calls.iter().filter(|c| *c == call).count()
    }

    pub fn clear(&self) {
        let mut state = self.lock();
        state.calls.clear();
        state.committed.clear();
    }

    fn record(&self, call: ConnCall) {
        self.lock().calls.push(call);
    }

    fn commit(&self, statements: &mut Vec<String>) {
        self.lock().committed.append(statements);
    }

    fn lock(&self) -> MutexGuard<'_, LogState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// In-memory [`Connection`] with scripted faults.
///
/// A lost connection stays lost until something reconnects it: any call made while
/// auto-reconnect is on, or a ping with auto-reconnect on. Work executed inside an open
/// transaction only reaches [`CallLog::committed`] on commit.
#[derive(Debug)]
pub struct MockConnection {
    log: CallLog,
    auto_reconnect: Arc<AtomicBool>,
    connected: bool,
    autocommit: bool,
    uncommitted: Vec<String>,
    statement_errors: HashMap<String, String>,
    lose_on: HashMap<String, usize>,
    lose_on_begin: usize,
    fail_ping: bool,
    fail_commit: Option<String>,
    fail_rollback: bool,
    responses: HashMap<String, ResultSet>,
    gates: HashMap<String, Gate>,
    latency: Option<Duration>,
}

impl Default for MockConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl MockConnection {
    /// Connected, autocommit on, auto-reconnect on.
    #[must_use]
    pub fn new() -> Self {
        Self {
            log: CallLog::new(),
            auto_reconnect: Arc::new(AtomicBool::new(true)),
            connected: true,
            autocommit: true,
            uncommitted: Vec::new(),
            statement_errors: HashMap::new(),
            lose_on: HashMap::new(),
            lose_on_begin: 0,
            fail_ping: false,
            fail_commit: None,
            fail_rollback: false,
            responses: HashMap::new(),
            gates: HashMap::new(),
            latency: None,
        }
    }

    /// Record into an existing log, e.g. one shared by several connections.
    #[must_use]
    pub fn with_log(mut self, log: CallLog) -> Self {
        self.log = log;
        self
    }

    #[must_use]
    pub fn with_auto_reconnect(self, enabled: bool) -> Self {
        self.auto_reconnect.store(enabled, Ordering::SeqCst);
        self
    }

    /// Fail every execution of `sql` with a non-connection error.
    #[must_use]
    pub fn fail_statement(mut self, sql: impl Into<String>, message: impl Into<String>) -> Self {
        self.statement_errors.insert(sql.into(), message.into());
        self
    }

    /// Drop the connection the next `times` executions of `sql`.
    #[must_use]
    pub fn lose_connection_on(mut self, sql: impl Into<String>, times: usize) -> Self {
        self.lose_on.insert(sql.into(), times);
        self
    }

    /// Drop the connection the next `times` attempts to open a transaction.
    #[must_use]
    pub fn lose_connection_on_begin(mut self, times: usize) -> Self {
        self.lose_on_begin = times;
        self
    }

    #[must_use]
    pub fn fail_ping(mut self) -> Self {
        self.fail_ping = true;
        self
    }

    #[must_use]
    pub fn fail_commit(mut self, message: impl Into<String>) -> Self {
        self.fail_commit = Some(message.into());
        self
    }

    #[must_use]
    pub fn fail_rollback(mut self) -> Self {
        self.fail_rollback = true;
        self
    }

    #[must_use]
    pub fn respond_with(mut self, sql: impl Into<String>, output: ResultSet) -> Self {
        self.responses.insert(sql.into(), output);
        self
    }

    /// Block executions of `sql` until `gate` opens.
    #[must_use]
    pub fn with_gate(mut self, sql: impl Into<String>, gate: Gate) -> Self {
        self.gates.insert(sql.into(), gate);
        self
    }

    /// Sleep this long in every `execute`.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    #[must_use]
    pub fn log(&self) -> CallLog {
        self.log.clone()
    }

    /// Live view of the auto-reconnect flag, readable after the connection moves to a worker.
    #[must_use]
    pub fn auto_reconnect_probe(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.auto_reconnect)
    }

    fn ensure_connected(&mut self) -> Result<(), DbError> {
        if self.connected {
            return Ok(());
        }
        if self.auto_reconnect.load(Ordering::SeqCst) {
            self.connected = true;
            self.autocommit = true;
            self.log.record(ConnCall::Reconnected);
            return Ok(());
        }
        Err(DbError::connection_lost("server has gone away").with_code(SERVER_GONE))
    }

    fn drop_link(&mut self) -> DbError {
        self.connected = false;
        self.uncommitted.clear();
        DbError::connection_lost("lost connection to server during query").with_code(SERVER_LOST)
    }
}

fn take_one(remaining: &mut usize) -> bool {
    if *remaining == 0 {
        return false;
    }
    *remaining -= 1;
    true
}

impl Connection for MockConnection {
    fn execute(&mut self, statement: &Statement) -> Result<ResultSet, DbError> {
        let sql = statement.sql().to_string();
        self.log.record(ConnCall::Execute(sql.clone()));
        if let Some(gate) = self.gates.get(&sql) {
            gate.pass();
        }
        if let Some(latency) = self.latency {
            std::thread::sleep(latency);
        }
        self.ensure_connected()?;

        if self.lose_on.get_mut(&sql).is_some_and(take_one) {
            return Err(self.drop_link());
        }
        if let Some(message) = self.statement_errors.get(&sql) {
            return Err(DbError::statement(message.clone()).with_code(1064));
        }

        if self.autocommit {
            self.log.commit(&mut vec![sql.clone()]);
        } else {
            self.uncommitted.push(sql.clone());
        }
        Ok(self
            .responses
            .get(&sql)
            .cloned()
            .unwrap_or_else(|| ResultSet::affected(1, None)))
    }

    fn set_autocommit(&mut self, enabled: bool) -> Result<(), DbError> {
        self.log.record(ConnCall::SetAutocommit(enabled));
        self.ensure_connected()?;
        if !enabled && take_one(&mut self.lose_on_begin) {
            return Err(self.drop_link());
        }
        if enabled && !self.autocommit {
            self.log.commit(&mut self.uncommitted);
        }
        self.autocommit = enabled;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), DbError> {
        self.log.record(ConnCall::Commit);
        self.ensure_connected()?;
        if let Some(message) = &self.fail_commit {
            self.uncommitted.clear();
            return Err(DbError::statement(message.clone()));
        }
        self.log.commit(&mut self.uncommitted);
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), DbError> {
        self.log.record(ConnCall::Rollback);
        self.uncommitted.clear();
        if self.fail_rollback {
            return Err(DbError::statement("rollback refused"));
        }
        self.ensure_connected()
    }

    fn ping(&mut self) -> Result<(), DbError> {
        self.log.record(ConnCall::Ping);
        if self.fail_ping {
            return Err(DbError::connection_lost("server unreachable").with_code(SERVER_GONE));
        }
        self.ensure_connected()
    }

    fn auto_reconnect(&self) -> bool {
        self.auto_reconnect.load(Ordering::SeqCst)
    }

    fn set_auto_reconnect(&mut self, enabled: bool) {
        self.log.record(ConnCall::SetAutoReconnect(enabled));
        self.auto_reconnect.store(enabled, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lost_connection_needs_reconnect() {
        let mut conn = MockConnection::new()
            .with_auto_reconnect(false)
            .lose_connection_on("A", 1);
        conn.set_autocommit(false).unwrap();
        assert!(conn.execute(&Statement::new("A")).unwrap_err().is_connection_lost());
        assert!(conn.execute(&Statement::new("A")).unwrap_err().is_connection_lost());

        conn.set_auto_reconnect(true);
        conn.ping().unwrap();
        assert!(conn.execute(&Statement::new("A")).is_ok());
        assert_eq!(conn.log().count(&ConnCall::Reconnected), 1);
    }

    #[test]
    fn only_committed_work_is_durable() {
        let mut conn = MockConnection::new();
        let log = conn.log();
        conn.execute(&Statement::new("X")).unwrap();
        conn.set_autocommit(false).unwrap();
        conn.execute(&Statement::new("Y")).unwrap();
        conn.rollback().unwrap();
        conn.execute(&Statement::new("Z")).unwrap();
        conn.commit().unwrap();
        assert_eq!(log.committed(), vec!["X".to_string(), "Z".to_string()]);
    }
}
