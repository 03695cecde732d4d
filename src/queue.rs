//! Thread-safe FIFO queues: the pending-work queue feeding workers and the completion
//! queue feeding the callback dispatcher.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use crate::callback::SourceId;
use crate::handle::Handle;
use crate::query::Query;
use crate::transaction::Transaction;
use crate::unit::{StatementUnit, UnitState};

/// FIFO with blocking `take`, shared by any number of producers and consumers.
pub struct BlockingQueue<T> {
    state: Mutex<QueueState<T>>,
    available: Condvar,
}

struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
}

impl<T> BlockingQueue<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                closed: false,
            }),
            available: Condvar::new(),
        }
    }

    /// Append an item; hands it back if the queue has been closed.
    ///
    /// # Errors
    /// Returns the item unchanged when the queue is closed.
    pub fn put(&self, item: T) -> Result<(), T> {
        let mut state = self.lock();
        if state.closed {
            return Err(item);
        }
        state.items.push_back(item);
        drop(state);
        self.available.notify_one();
        Ok(())
    }

    /// Block until an item is available. Returns `None` once the queue is closed, even if
    /// items remain; those are left for [`BlockingQueue::drain`].
    pub fn take(&self) -> Option<T> {
        let mut state = self.lock();
        loop {
            if state.closed {
                return None;
            }
            if let Some(item) = state.items.pop_front() {
                return Some(item);
            }
            state = self
                .available
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    pub fn try_take(&self) -> Option<T> {
        self.lock().items.pop_front()
    }

    /// Remove and return everything currently queued.
    pub fn drain(&self) -> Vec<T> {
        self.lock().items.drain(..).collect()
    }

    /// Remove every item matching `pred`, preserving the order of the rest.
    pub fn remove_if(&self, mut pred: impl FnMut(&T) -> bool) -> Vec<T> {
        let mut state = self.lock();
        let mut removed = Vec::new();
        let mut kept = VecDeque::with_capacity(state.items.len());
        for item in state.items.drain(..) {
            if pred(&item) {
                removed.push(item);
            } else {
                kept.push_back(item);
            }
        }
        state.items = kept;
        removed
    }

    /// Move the first item matching `pred` to the front. Returns whether one was found.
    pub fn swap_to_front_if(&self, pred: impl FnMut(&T) -> bool) -> bool {
        let mut state = self.lock();
        match state.items.iter().position(pred) {
            Some(idx) => {
                if let Some(item) = state.items.remove(idx) {
                    state.items.push_front(item);
                }
                true
            }
            None => false,
        }
    }

    /// Stop accepting items and wake every blocked `take`.
    pub fn close(&self) {
        self.lock().closed = true;
        self.available.notify_all();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Default for BlockingQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for BlockingQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("BlockingQueue")
            .field("len", &state.items.len())
            .field("closed", &state.closed)
            .finish()
    }
}

/// A finished run on its way to the owning thread.
#[derive(Debug)]
pub enum Finished {
    /// One statement, standalone or from a transaction batch.
    Statement { query: Query, unit: StatementUnit },
    /// The transaction-level record, pushed after all of the batch's statements.
    Transaction {
        transaction: Transaction,
        state: UnitState,
        retried: bool,
    },
}

impl Finished {
    #[must_use]
    pub fn source(&self) -> SourceId {
        match self {
            Finished::Statement { query, .. } => query.id(),
            Finished::Transaction { transaction, .. } => transaction.id(),
        }
    }

    #[must_use]
    pub fn state(&self) -> &UnitState {
        match self {
            Finished::Statement { unit, .. } => unit.state(),
            Finished::Transaction { state, .. } => state,
        }
    }
}

/// Finished runs travelling from workers to the callback dispatcher.
///
/// Pushes from different batches may interleave; one batch's pushes come from a single
/// worker in statement order.
#[derive(Debug, Default)]
pub struct CompletionQueue {
    queue: BlockingQueue<Finished>,
}

impl CompletionQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, finished: Finished) {
        if let Err(finished) = self.queue.put(finished) {
            tracing::warn!(source = %finished.source(), "completion queue closed; run dropped");
        }
    }

    /// Pop the oldest finished run without blocking.
    pub fn pop(&self) -> Option<Finished> {
        self.queue.try_take()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn fifo_order() {
        let queue = BlockingQueue::new();
        for i in 0..5 {
            queue.put(i).unwrap();
        }
        let drained: Vec<_> = std::iter::from_fn(|| queue.try_take()).collect();
        assert_eq!(drained, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn remove_if_keeps_remaining_order() {
        let queue = BlockingQueue::new();
        for i in 0..6 {
            queue.put(i).unwrap();
        }
        let removed = queue.remove_if(|i| i % 2 == 0);
        assert_eq!(removed, vec![0, 2, 4]);
        assert_eq!(queue.drain(), vec![1, 3, 5]);
    }

    #[test]
    fn swap_to_front_moves_first_match() {
        let queue = BlockingQueue::new();
        for i in 0..4 {
            queue.put(i).unwrap();
        }
        assert!(queue.swap_to_front_if(|i| *i == 2));
        assert!(!queue.swap_to_front_if(|i| *i == 9));
        assert_eq!(queue.drain(), vec![2, 0, 1, 3]);
    }

    #[test]
    fn close_wakes_blocked_consumer_and_rejects_puts() {
        let queue = Arc::new(BlockingQueue::<u32>::new());
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.take())
        };
        thread::sleep(std::time::Duration::from_millis(20));
        queue.close();
        assert_eq!(consumer.join().unwrap(), None);
        assert_eq!(queue.put(1), Err(1));
    }

    #[test]
    fn take_receives_from_other_producers() {
        let queue = Arc::new(BlockingQueue::new());
        let producers: Vec<_> = (0..4)
            .map(|p| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    for i in 0..25 {
                        queue.put(p * 100 + i).unwrap();
                    }
                })
            })
            .collect();
        let mut seen = Vec::new();
        for _ in 0..100 {
            seen.push(queue.take().unwrap());
        }
        for producer in producers {
            producer.join().unwrap();
        }
        for p in 0..4 {
            let from_p: Vec<_> = seen.iter().filter(|v| **v / 100 == p).copied().collect();
            let expected: Vec<_> = (0..25).map(|i| p * 100 + i).collect();
            assert_eq!(from_p, expected);
        }
    }
}
