use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use crate::callback::CallbackHost;
use crate::config::EngineOptions;
use crate::connection::Connection;
use crate::dispatch::CallbackDispatcher;
use crate::error::TxQueueError;
use crate::handle::Handle;
use crate::query::Query;
use crate::queue::{BlockingQueue, CompletionQueue};
use crate::transaction::Transaction;
use crate::worker::{Job, WorkerPool};

/// The engine: a pending queue drained by worker threads and a completion queue drained
/// on the owning thread.
///
/// Starting work only needs `&Database`; anything that fires callbacks (`poll`, `wait`,
/// `abort`) needs `&mut` and a [`CallbackHost`], so callbacks always run on the thread
/// that owns the engine.
pub struct Database {
    pending: Arc<BlockingQueue<Job>>,
    completed: Arc<CompletionQueue>,
    workers: Option<WorkerPool>,
    dispatcher: CallbackDispatcher,
    options: EngineOptions,
}

impl Database {
    /// Spawn one worker per connection.
    ///
    /// # Errors
    /// Returns `TxQueueError::ConfigError` if the options are invalid or the number of
    /// connections differs from `options.worker_count`, and `TxQueueError::WorkerError`
    /// if a worker thread cannot be spawned.
    pub fn new<C: Connection + 'static>(
        connections: Vec<C>,
        options: EngineOptions,
    ) -> Result<Self, TxQueueError> {
        options.validate()?;
        if connections.len() != options.worker_count {
            return Err(TxQueueError::ConfigError(format!(
                "expected {} connections, got {}",
                options.worker_count,
                connections.len()
            )));
        }

        let pending = Arc::new(BlockingQueue::new());
        let completed = Arc::new(CompletionQueue::new());
        let workers = WorkerPool::spawn(connections, &pending, &completed, &options)?;
        debug!(workers = workers.len(), prefix = %options.thread_name_prefix, "engine started");

        Ok(Self {
            pending,
            completed,
            workers: Some(workers),
            dispatcher: CallbackDispatcher::new(),
            options,
        })
    }

    /// Open `options.worker_count` connections with `factory` (called with the worker
    /// index) and start the engine.
    ///
    /// # Errors
    /// Propagates the first factory error, plus everything [`Database::new`] returns.
    pub fn with_factory<C, F>(options: EngineOptions, mut factory: F) -> Result<Self, TxQueueError>
    where
        C: Connection + 'static,
        F: FnMut(usize) -> Result<C, TxQueueError>,
    {
        options.validate()?;
        let connections = (0..options.worker_count)
            .map(&mut factory)
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(connections, options)
    }

    /// One worker, default options.
    ///
    /// # Errors
    /// Returns `TxQueueError::WorkerError` if the worker thread cannot be spawned.
    pub fn single<C: Connection + 'static>(conn: C) -> Result<Self, TxQueueError> {
        Self::new(vec![conn], EngineOptions::default())
    }

    #[must_use]
    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Whether [`Database::shutdown`] has run.
    #[must_use]
    pub fn is_disconnected(&self) -> bool {
        self.pending.is_closed()
    }

    /// Jobs not yet picked up by a worker.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Finished runs waiting for [`Database::poll`].
    #[must_use]
    pub fn completed_len(&self) -> usize {
        self.completed.len()
    }

    /// Queue `query` to run on its own in autocommit mode.
    ///
    /// # Errors
    /// Returns `TxQueueError::Disconnected` after shutdown.
    pub fn start_query(&self, query: &Query) -> Result<(), TxQueueError> {
        if self.is_disconnected() {
            return Err(TxQueueError::Disconnected);
        }
        let unit = query.build_standalone_unit();
        self.submit(Job::Query {
            query: query.clone(),
            unit,
        })
    }

    /// Snapshot `transaction`'s queued statements and queue them as one batch.
    ///
    /// An empty snapshot is still submitted; it commits nothing and reports success.
    ///
    /// # Errors
    /// Returns `TxQueueError::Disconnected` after shutdown and
    /// `TxQueueError::InvalidState` while a previous run of `transaction` is executing.
    pub fn start_transaction(&self, transaction: &Transaction) -> Result<(), TxQueueError> {
        if self.is_disconnected() {
            return Err(TxQueueError::Disconnected);
        }
        let batch = transaction.take_batch()?;
        debug!(transaction = %transaction.id(), statements = batch.entries.len(), "transaction queued");
        self.submit(Job::Transaction { batch })
    }

    /// A shutdown can race a start; the rejected job is reported as aborted.
    fn submit(&self, job: Job) -> Result<(), TxQueueError> {
        match self.pending.put(job) {
            Ok(()) => Ok(()),
            Err(job) => {
                for finished in job.abort() {
                    self.completed.push(finished);
                }
                Err(TxQueueError::Disconnected)
            }
        }
    }

    /// Dispatch every finished run currently queued. Returns how many were handled.
    pub fn poll<H: CallbackHost + ?Sized>(&mut self, host: &mut H) -> usize {
        self.dispatcher.drain(&self.completed, host)
    }

    /// Block until `handle`'s most recent run has finished, then dispatch everything
    /// finished so far. With `swap_to_front`, a still-pending job is moved to the head of
    /// the pending queue first.
    ///
    /// # Errors
    /// Returns `TxQueueError::InvalidState` if the handle has no submitted run.
    pub fn wait<T, H>(
        &mut self,
        handle: &T,
        swap_to_front: bool,
        host: &mut H,
    ) -> Result<usize, TxQueueError>
    where
        T: Handle,
        H: CallbackHost + ?Sized,
    {
        let completion = handle.latest_run()?;
        if swap_to_front && self.pending.swap_to_front_if(|job| job.owns(&completion)) {
            debug!(source = %handle.id(), "moved to front of pending queue");
        }
        completion.wait();
        Ok(self.poll(host))
    }

    /// Await `handle`'s most recent run without blocking the thread. Callbacks are not
    /// fired; follow up with [`Database::poll`].
    ///
    /// # Errors
    /// Returns `TxQueueError::InvalidState` if the handle has no submitted run.
    pub async fn wait_async<T: Handle>(&self, handle: &T) -> Result<(), TxQueueError> {
        let completion = handle.latest_run()?;
        completion.wait_async().await;
        Ok(())
    }

    /// Remove `handle`'s jobs that no worker has taken yet and fire their aborted
    /// callbacks. Returns whether anything was removed.
    pub fn abort<T, H>(&mut self, handle: &T, host: &mut H) -> bool
    where
        T: Handle,
        H: CallbackHost + ?Sized,
    {
        let source = handle.id();
        let removed = self.pending.remove_if(|job| job.source() == source);
        if removed.is_empty() {
            return false;
        }
        debug!(%source, jobs = removed.len(), "aborted pending jobs");
        for job in removed {
            for finished in job.abort() {
                self.dispatcher.dispatch(finished, host);
            }
        }
        true
    }

    /// Stop accepting work, let workers finish their current job, and join them.
    ///
    /// Jobs still pending are aborted; their notifications arrive on the next
    /// [`Database::poll`]. Calling this twice is a no-op.
    pub fn shutdown(&mut self) {
        let Some(workers) = self.workers.take() else {
            return;
        };
        self.pending.close();
        workers.join();

        let leftover = self.pending.drain();
        let aborted = leftover.len();
        for job in leftover {
            for finished in job.abort() {
                self.completed.push(finished);
            }
        }
        info!(aborted, "engine shut down");
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("options", &self.options)
            .field("pending", &self.pending.len())
            .field("completed", &self.completed.len())
            .field("disconnected", &self.is_disconnected())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::CallbackRegistry;
    use crate::test_utils::MockConnection;

    #[test]
    fn connection_count_must_match_workers() {
        let err = Database::new(vec![MockConnection::new()], EngineOptions::new(2)).unwrap_err();
        assert!(matches!(err, TxQueueError::ConfigError(_)));
    }

    #[test]
    fn starts_fail_after_shutdown() {
        let mut db = Database::single(MockConnection::new()).unwrap();
        db.shutdown();
        db.shutdown();
        assert!(db.is_disconnected());
        let query = Query::new("SELECT 1");
        assert!(matches!(db.start_query(&query), Err(TxQueueError::Disconnected)));
        assert!(matches!(
            Transaction::new().start(&db),
            Err(TxQueueError::Disconnected)
        ));
        assert!(!query.is_running());
    }

    #[test]
    fn factory_receives_worker_indexes() {
        let mut seen = Vec::new();
        let mut db = Database::with_factory(EngineOptions::new(3), |index| {
            seen.push(index);
            Ok(MockConnection::new())
        })
        .unwrap();
        assert_eq!(seen, vec![0, 1, 2]);

        let query = Query::new("SELECT 1");
        query.start(&db).unwrap();
        let mut host = CallbackRegistry::new();
        assert_eq!(db.wait(&query, false, &mut host).unwrap(), 1);
        assert_eq!(db.wait(&query, false, &mut host).unwrap(), 0);
    }

    #[test]
    fn unnameable_worker_threads_are_rejected_before_spawning() {
        let options = EngineOptions::builder().thread_name_prefix("db\0worker").finish();
        let err = Database::new(vec![MockConnection::new()], options).unwrap_err();
        assert!(matches!(err, TxQueueError::ConfigError(_)));
    }
}
