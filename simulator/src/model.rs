use crate::generation::{Fault, PlannedStatement};

/// Message the mock connection reports when it drops the link mid-statement.
pub(crate) const LOST_MESSAGE: &str = "lost connection to server during query";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Expect {
    Success,
    Error,
}

/// What the engine must report for one transaction that was not aborted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ExpectedRun {
    pub(crate) statements: Vec<Expect>,
    pub(crate) transaction: Expect,
    pub(crate) error: Option<String>,
    /// How many times each statement reaches the connection.
    pub(crate) executions: Vec<usize>,
    pub(crate) committed: bool,
}

/// Replay a batch against its scripted faults: stop at the first failure, re-run the
/// whole batch once if the failure was a lost connection and a retry is possible.
pub(crate) fn expect_transaction(statements: &[PlannedStatement], retry_possible: bool) -> ExpectedRun {
    let mut remaining: Vec<usize> = statements
        .iter()
        .map(|s| match s.fault {
            Fault::LoseOnce => 1,
            Fault::LoseTwice => 2,
            Fault::None | Fault::Fail => 0,
        })
        .collect();
    let mut executions = vec![0; statements.len()];

    let mut retried = false;
    loop {
        let mut failure = None;
        for (idx, statement) in statements.iter().enumerate() {
            executions[idx] += 1;
            if statement.fault == Fault::Fail {
                failure = Some((idx, false, statement.failure_message()));
                break;
            }
            if remaining[idx] > 0 {
                remaining[idx] -= 1;
                failure = Some((idx, true, LOST_MESSAGE.to_string()));
                break;
            }
        }

        let Some((failed_at, lost, message)) = failure else {
            return ExpectedRun {
                statements: vec![Expect::Success; statements.len()],
                transaction: Expect::Success,
                error: None,
                executions,
                committed: true,
            };
        };
        if lost && !retried && retry_possible {
            retried = true;
            continue;
        }
        let outcomes = (0..statements.len())
            .map(|idx| if idx < failed_at { Expect::Success } else { Expect::Error })
            .collect();
        return ExpectedRun {
            statements: outcomes,
            transaction: Expect::Error,
            error: Some(message),
            executions,
            committed: false,
        };
    }
}

/// Standalone statements are never retried.
pub(crate) fn expect_standalone(statement: &PlannedStatement) -> (Expect, Option<String>) {
    match statement.fault {
        Fault::None => (Expect::Success, None),
        Fault::Fail => (Expect::Error, Some(statement.failure_message())),
        Fault::LoseOnce | Fault::LoseTwice => (Expect::Error, Some(LOST_MESSAGE.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stmt(sql: &str, fault: Fault) -> PlannedStatement {
        PlannedStatement {
            sql: sql.to_string(),
            fault,
        }
    }

    #[test]
    fn single_loss_is_absorbed_by_retry() {
        let run = expect_transaction(&[stmt("A", Fault::None), stmt("B", Fault::LoseOnce)], true);
        assert_eq!(run.transaction, Expect::Success);
        assert_eq!(run.executions, vec![2, 2]);
        assert!(run.committed);
    }

    #[test]
    fn later_loss_during_retry_fails_the_batch() {
        let run = expect_transaction(
            &[
                stmt("A", Fault::LoseOnce),
                stmt("B", Fault::None),
                stmt("C", Fault::LoseOnce),
            ],
            true,
        );
        assert_eq!(run.executions, vec![2, 1, 1]);
        assert_eq!(run.statements, vec![Expect::Success, Expect::Success, Expect::Error]);
        assert_eq!(run.error.as_deref(), Some(LOST_MESSAGE));
    }

    #[test]
    fn no_retry_stops_at_first_loss() {
        let run = expect_transaction(&[stmt("A", Fault::LoseOnce), stmt("B", Fault::None)], false);
        assert_eq!(run.executions, vec![1, 0]);
        assert_eq!(run.statements, vec![Expect::Error, Expect::Error]);
    }
}
