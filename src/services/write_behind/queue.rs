//! Blocking FIFO shared between callers and the worker.

use super::PendingWrite;
use crate::storage::sqlite::acquire_lock;
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

#[derive(Default)]
struct QueueState {
    jobs: VecDeque<PendingWrite>,
    in_flight: usize,
    closed: bool,
}

/// FIFO of pending writes with an in-flight counter.
///
/// A job taken with [`PendingQueue::pop_timeout`] stays outstanding until
/// [`PendingQueue::complete`] is called for it, so drain checks never see an
/// empty queue while the worker is still writing.
#[derive(Default)]
pub struct PendingQueue {
    state: Mutex<QueueState>,
    available: Condvar,
}

impl PendingQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a job at the back.
    ///
    /// # Errors
    ///
    /// Hands the job back if the queue is closed; nothing would take it.
    #[allow(clippy::result_large_err)]
    pub fn push(&self, job: PendingWrite) -> Result<(), PendingWrite> {
        let mut state = acquire_lock(&self.state);
        if state.closed {
            return Err(job);
        }
        state.jobs.push_back(job);
        drop(state);
        self.available.notify_one();
        Ok(())
    }

    /// Takes the front job, waiting up to `timeout` for one to arrive.
    ///
    /// Returns `None` on timeout or once the queue is closed.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<PendingWrite> {
        // A timeout too large to represent waits in hour-long slices
        let deadline = Instant::now().checked_add(timeout);
        let mut state = acquire_lock(&self.state);
        loop {
            if state.closed {
                return None;
            }
            if let Some(job) = state.jobs.pop_front() {
                state.in_flight += 1;
                return Some(job);
            }
            let remaining = deadline.map_or(Duration::from_secs(3600), |d| {
                d.saturating_duration_since(Instant::now())
            });
            if remaining.is_zero() {
                return None;
            }
            state = match self.available.wait_timeout(state, remaining) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    /// Marks one taken job as finished.
    pub fn complete(&self) {
        let mut state = acquire_lock(&self.state);
        state.in_flight = state.in_flight.saturating_sub(1);
    }

    /// Jobs queued plus jobs in flight.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        let state = acquire_lock(&self.state);
        state.jobs.len() + state.in_flight
    }

    /// Jobs waiting in the queue.
    #[must_use]
    pub fn len(&self) -> usize {
        acquire_lock(&self.state).jobs.len()
    }

    /// Returns true if no job is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Closes the queue and wakes every waiter.
    pub fn close(&self) {
        acquire_lock(&self.state).closed = true;
        self.available.notify_all();
    }

    /// Returns true once [`PendingQueue::close`] was called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        acquire_lock(&self.state).closed
    }

    /// Removes and returns every waiting job.
    pub fn drain_remaining(&self) -> Vec<PendingWrite> {
        acquire_lock(&self.state).jobs.drain(..).collect()
    }
}
