use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::warn;

use crate::config::EngineOptions;
use crate::connection::Connection;
use crate::error::TxQueueError;
use crate::queue::{BlockingQueue, CompletionQueue};

use super::channel::Job;
use super::dispatcher::run_worker;

/// Worker threads, each owning one connection exclusively.
pub(crate) struct WorkerPool {
    handles: Vec<(String, JoinHandle<()>)>,
}

impl WorkerPool {
    pub(crate) fn spawn<C: Connection + 'static>(
        connections: Vec<C>,
        pending: &Arc<BlockingQueue<Job>>,
        completed: &Arc<CompletionQueue>,
        options: &EngineOptions,
    ) -> Result<Self, TxQueueError> {
        let mut pool = WorkerPool {
            handles: Vec::with_capacity(connections.len()),
        };
        for (index, conn) in connections.into_iter().enumerate() {
            let name = format!("{}-{index}", options.thread_name_prefix);
            let worker_pending = Arc::clone(pending);
            let worker_completed = Arc::clone(completed);
            let retry = options.retry_on_connection_lost;
            let thread_name = name.clone();
            let spawned = thread::Builder::new().name(name.clone()).spawn(move || {
                run_worker(
                    &thread_name,
                    conn,
                    &worker_pending,
                    &worker_completed,
                    retry,
                );
            });
            match spawned {
                Ok(handle) => pool.handles.push((name, handle)),
                Err(err) => {
                    pending.close();
                    pool.join();
                    return Err(TxQueueError::WorkerError(format!(
                        "failed to spawn worker thread {name}: {err}"
                    )));
                }
            }
        }
        Ok(pool)
    }

    pub(crate) fn len(&self) -> usize {
        self.handles.len()
    }

    /// Wait for every worker to finish its current job and exit. The pending queue must
    /// already be closed.
    pub(crate) fn join(self) {
        for (name, handle) in self.handles {
            if handle.join().is_err() {
                warn!(worker = %name, "worker thread panicked");
            }
        }
    }
}
