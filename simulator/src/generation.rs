use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use sql_txqueue::test_utils::MockConnection;

use crate::args::SimConfig;

/// What a scripted connection does when it reaches a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub(crate) enum Fault {
    None,
    Fail,
    LoseOnce,
    LoseTwice,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct PlannedStatement {
    pub(crate) sql: String,
    pub(crate) fault: Fault,
}

impl PlannedStatement {
    pub(crate) fn failure_message(&self) -> String {
        format!("simulated failure in {}", self.sql)
    }
}

#[derive(Debug, Clone, Serialize)]
pub(crate) enum Submission {
    Standalone {
        statement: PlannedStatement,
        abort: bool,
    },
    Transaction {
        statements: Vec<PlannedStatement>,
        /// Appended and then cleared before the start.
        cleared: Vec<PlannedStatement>,
        abort: bool,
    },
}

impl Submission {
    pub(crate) fn abort(&self) -> bool {
        match self {
            Submission::Standalone { abort, .. } | Submission::Transaction { abort, .. } => *abort,
        }
    }

    fn statements(&self) -> Box<dyn Iterator<Item = &PlannedStatement> + '_> {
        match self {
            Submission::Standalone { statement, .. } => Box::new(std::iter::once(statement)),
            Submission::Transaction {
                statements,
                cleared,
                ..
            } => Box::new(statements.iter().chain(cleared)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct Plan {
    pub(crate) submissions: Vec<Submission>,
}

impl Plan {
    /// Script every planned fault into `conn`. Each statement's SQL is unique, so the
    /// same script can be given to every worker.
    pub(crate) fn configure(&self, mut conn: MockConnection, config: &SimConfig) -> MockConnection {
        for statement in self.submissions.iter().flat_map(Submission::statements) {
            conn = match statement.fault {
                Fault::None => conn,
                Fault::Fail => conn.fail_statement(statement.sql.clone(), statement.failure_message()),
                Fault::LoseOnce => conn.lose_connection_on(statement.sql.clone(), 1),
                Fault::LoseTwice => conn.lose_connection_on(statement.sql.clone(), 2),
            };
        }
        if config.ping_fails {
            conn = conn.fail_ping();
        }
        if let Some(latency) = config.latency() {
            conn = conn.with_latency(latency);
        }
        conn
    }

    pub(crate) fn statement_count(&self) -> usize {
        self.submissions
            .iter()
            .map(|s| s.statements().count())
            .sum()
    }
}

pub(crate) fn generate_plan(config: &SimConfig, rng: &mut ChaCha8Rng) -> Plan {
    let submissions = (0..config.iterations)
        .map(|id| {
            let abort = rng.random::<f64>() < config.abort_rate;
            if rng.random::<f64>() < config.standalone_rate {
                return Submission::Standalone {
                    statement: planned(format!("INSERT INTO sim (sub) VALUES ({id})"), config, rng),
                    abort,
                };
            }

            let len = rng.random_range(0..=config.max_statements);
            let statements = (0..len)
                .map(|idx| {
                    planned(
                        format!("INSERT INTO sim (sub, idx) VALUES ({id}, {idx})"),
                        config,
                        rng,
                    )
                })
                .collect();
            let cleared = if rng.random::<f64>() < config.clear_rate {
                (0..rng.random_range(1..=2))
                    .map(|idx| PlannedStatement {
                        sql: format!("DELETE FROM sim WHERE sub = {id} AND idx = {idx}"),
                        fault: Fault::None,
                    })
                    .collect()
            } else {
                Vec::new()
            };
            Submission::Transaction {
                statements,
                cleared,
                abort,
            }
        })
        .collect();
    Plan { submissions }
}

fn planned(sql: String, config: &SimConfig, rng: &mut ChaCha8Rng) -> PlannedStatement {
    let roll = rng.random::<f64>();
    let fault = if roll < config.fail_rate {
        Fault::Fail
    } else if roll < config.fail_rate + config.lose_rate {
        Fault::LoseOnce
    } else if roll < config.fail_rate + config.lose_rate + config.lose_twice_rate {
        Fault::LoseTwice
    } else {
        Fault::None
    };
    PlannedStatement { sql, fault }
}
