use std::sync::Arc;

use tracing::{debug, trace};

use crate::connection::Connection;
use crate::queue::{BlockingQueue, CompletionQueue};
use crate::runner;

use super::channel::Job;

/// Worker thread body: take jobs until the pending queue closes.
pub(super) fn run_worker<C: Connection>(
    name: &str,
    mut conn: C,
    pending: &BlockingQueue<Job>,
    completed: &Arc<CompletionQueue>,
    retry: bool,
) {
    debug!(worker = name, "worker started");
    while let Some(job) = pending.take() {
        trace!(worker = name, source = %job.source(), "job picked up");
        match job {
            Job::Query { query, unit } => {
                runner::execute_statement(&mut conn, query, unit, completed);
            }
            Job::Transaction { batch } => {
                runner::execute(&mut conn, batch, retry, completed);
            }
        }
    }
    debug!(worker = name, "worker stopped");
}
