use std::sync::Arc;

use crate::callback::SourceId;
use crate::handle::Handle;
use crate::query::Query;
use crate::queue::Finished;
use crate::transaction::{BatchEntry, TransactionBatch};
use crate::unit::{Completion, StatementUnit};

/// Work waiting in the pending queue for a free worker.
pub(crate) enum Job {
    Query { query: Query, unit: StatementUnit },
    Transaction { batch: TransactionBatch },
}

impl Job {
    pub(crate) fn source(&self) -> SourceId {
        match self {
            Job::Query { query, .. } => query.id(),
            Job::Transaction { batch } => batch.transaction.id(),
        }
    }

    /// Whether `completion` belongs to this job or, for a transaction, to one of its statements.
    pub(crate) fn owns(&self, completion: &Arc<Completion>) -> bool {
        match self {
            Job::Query { unit, .. } => Arc::ptr_eq(unit.state.completion(), completion),
            Job::Transaction { batch } => {
                Arc::ptr_eq(batch.state.completion(), completion)
                    || batch
                        .entries
                        .iter()
                        .any(|entry| Arc::ptr_eq(entry.unit.state.completion(), completion))
            }
        }
    }

    /// Mark everything in this job aborted, wake its waiters, and return the records to
    /// dispatch. A transaction's statements come first, then the transaction itself.
    pub(crate) fn abort(self) -> Vec<Finished> {
        match self {
            Job::Query { query, mut unit } => {
                unit.state.mark_aborted();
                unit.state.completion().signal();
                vec![Finished::Statement { query, unit }]
            }
            Job::Transaction { batch } => {
                let TransactionBatch {
                    transaction,
                    mut state,
                    entries,
                    retried,
                } = batch;
                let mut aborted = Vec::with_capacity(entries.len() + 1);
                for BatchEntry { query, mut unit } in entries {
                    unit.state.mark_aborted();
                    unit.state.completion().signal();
                    aborted.push(Finished::Statement { query, unit });
                }
                state.mark_aborted();
                state.completion().signal();
                aborted.push(Finished::Transaction {
                    transaction,
                    state,
                    retried,
                });
                aborted
            }
        }
    }
}
