//! Unbounded FIFO work queue with a completion barrier.
//!
//! Producers [`push`](WorkQueue::push) items; consumers block in
//! [`pop`](WorkQueue::pop) and call [`task_done`](WorkQueue::task_done) once
//! per popped item. [`join`](WorkQueue::join) blocks until every pushed item
//! has been marked done. [`close`](WorkQueue::close) releases blocked
//! consumers once the queue is drained, which is how workers are told to exit.

use anyhow::{Result, bail};
use crossbeam_channel::{Receiver, Sender, unbounded};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

pub struct WorkQueue<T> {
    sender: Mutex<Option<Sender<T>>>,
    receiver: Receiver<T>,
    pending: Mutex<usize>,
    all_done: Condvar,
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> WorkQueue<T> {
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self {
            sender: Mutex::new(Some(sender)),
            receiver,
            pending: Mutex::new(0),
            all_done: Condvar::new(),
        }
    }

    // A poisoned lock only means another thread panicked while holding it;
    // the counter itself is always left consistent.
    fn pending(&self) -> MutexGuard<'_, usize> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue an item.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue has been closed.
    pub fn push(&self, item: T) -> Result<()> {
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = sender.as_ref() else {
            bail!("work queue is closed");
        };
        // Count before sending so join() can never observe a false zero.
        *self.pending() += 1;
        if sender.send(item).is_err() {
            self.task_done()?;
            bail!("work queue has no receiver");
        }
        Ok(())
    }

    /// Block until an item is available. Returns `None` once the queue is
    /// closed and drained.
    pub fn pop(&self) -> Option<T> {
        self.receiver.recv().ok()
    }

    /// Mark one previously popped item as complete.
    ///
    /// # Errors
    ///
    /// Returns an error if called more times than items were pushed.
    pub fn task_done(&self) -> Result<()> {
        let mut pending = self.pending();
        if *pending == 0 {
            bail!("task_done called more times than items were queued");
        }
        *pending -= 1;
        if *pending == 0 {
            self.all_done.notify_all();
        }
        Ok(())
    }

    /// Block until every pushed item has been marked done.
    pub fn join(&self) {
        let mut pending = self.pending();
        while *pending > 0 {
            pending = self
                .all_done
                .wait(pending)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Stop accepting items; consumers drain what is left and then see `None`.
    pub fn close(&self) {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// Items pushed but not yet marked done.
    #[must_use]
    pub fn unfinished(&self) -> usize {
        *self.pending()
    }

    /// Items waiting to be popped.
    #[must_use]
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}
