//! Asynchronous write-behind for the export store.
//!
//! [`WriteBehindStorage::save_expense_async`] writes the cache store
//! synchronously and queues the export write for a single background
//! worker. Export failures are retried up to a fixed number of attempts.
//! The worker only appends rows the export does not already hold, so a
//! record queued twice is exported once.
//!
//! # Example
//!
//! ```rust,ignore
//! use tallybook::{DedupCoordinator, WriteBehindConfig, WriteBehindStorage};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let coordinator = Arc::new(DedupCoordinator::open(&config)?);
//! let storage = WriteBehindStorage::new(coordinator, WriteBehindConfig::default())?;
//!
//! storage.save_expense_async(&expense);
//! let stats = storage.shutdown(Duration::from_secs(30));
//! assert_eq!(stats.pending, 0);
//! ```

mod job;
mod queue;
mod worker;

pub use job::{JobState, PendingWrite};
pub use queue::PendingQueue;

use crate::config::WriteBehindConfig;
use crate::models::{ExpenseRecord, SyncStats};
use crate::observability::component_span;
use crate::services::DedupCoordinator;
use crate::storage::ExpenseWrite;
use crate::storage::sqlite::acquire_lock;
use crate::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{Span, debug, error, info, warn};
use worker::{Counters, Shared};

/// Name of the worker thread.
pub const WORKER_THREAD_NAME: &str = "tallybook-write-behind";

/// Dual-write storage with a deferred export write.
///
/// Owns exactly one worker thread. Dropping the storage stops the worker
/// without draining; call [`WriteBehindStorage::shutdown`] to drain first.
pub struct WriteBehindStorage {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
    shut_down: AtomicBool,
}

impl WriteBehindStorage {
    /// Starts the worker with a default component span.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker thread cannot be spawned.
    pub fn new(coordinator: Arc<DedupCoordinator>, config: WriteBehindConfig) -> Result<Self> {
        Self::with_span(coordinator, config, component_span("write_behind"))
    }

    /// Starts the worker, attributing its events to `span`.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker thread cannot be spawned.
    pub fn with_span(
        coordinator: Arc<DedupCoordinator>,
        config: WriteBehindConfig,
        span: Span,
    ) -> Result<Self> {
        let shared = Arc::new(Shared {
            coordinator,
            queue: PendingQueue::new(),
            config,
            stop: AtomicBool::new(false),
            span,
            counters: Counters::default(),
        });

        let worker_shared = Arc::clone(&shared);
        let handle = std::thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || worker::run(&worker_shared))
            .map_err(|e| Error::operation("spawn_write_behind_worker", e))?;

        Ok(Self {
            shared,
            worker: Mutex::new(Some(handle)),
            shut_down: AtomicBool::new(false),
        })
    }

    /// Returns the coordinator for synchronous operations.
    #[must_use]
    pub fn coordinator(&self) -> &Arc<DedupCoordinator> {
        &self.shared.coordinator
    }

    /// Writes the cache store now and queues the export write.
    ///
    /// Returns `false` only if the cache write fails; nothing is queued
    /// then. An expense the cache already holds is queued too, so a save
    /// whose export write was dropped earlier gets completed. Once the
    /// worker is stopping the export write happens synchronously instead.
    pub fn save_expense_async(&self, expense: &ExpenseRecord) -> bool {
        let _entered = self.shared.span.enter();

        if self.shut_down.load(Ordering::Acquire) {
            warn!(expense.id = %expense.id, "Write-behind stopped, saving synchronously");
            return self.shared.coordinator.save_expense(expense);
        }

        match self.shared.coordinator.store_in_cache(expense) {
            Ok(write) => {
                if let Err(job) = self.shared.queue.push(PendingWrite::new(expense.clone())) {
                    warn!(
                        expense.id = %job.record.id,
                        "Write-behind queue closed, saving synchronously"
                    );
                    return self.shared.coordinator.save_expense(&job.record);
                }
                worker::record_job("enqueued");
                debug!(
                    expense.id = %expense.id,
                    duplicate = write == ExpenseWrite::Duplicate,
                    "Expense queued for export"
                );
                true
            },
            Err(e) => {
                error!(expense.id = %expense.id, %expense, error = %e, "Cache write failed, expense not queued");
                false
            },
        }
    }

    /// Waits until no export write is queued or in flight, or `max_wait`
    /// elapses.
    ///
    /// Returns the number of jobs that reached a final state (synced or
    /// dropped) during the call.
    pub fn sync_pending_writes(&self, max_wait: Duration) -> usize {
        let _entered = self.shared.span.enter();
        let start = Instant::now();
        let baseline = self.shared.counters.terminal();

        loop {
            let outstanding = self.shared.queue.outstanding();
            if outstanding == 0 {
                break;
            }
            let remaining = max_wait.saturating_sub(start.elapsed());
            if remaining.is_zero() || !self.is_worker_active() {
                warn!(outstanding, "Pending writes not drained");
                break;
            }
            std::thread::sleep(remaining.min(self.shared.config.drain_poll_interval));
        }

        let finished = self.shared.counters.terminal().saturating_sub(baseline);
        usize::try_from(finished).unwrap_or(usize::MAX)
    }

    /// Drains for up to `max_wait`, then stops and joins the worker.
    ///
    /// Jobs still queued afterwards are counted as abandoned. Calling this
    /// again returns the final stats without further work.
    pub fn shutdown(&self, max_wait: Duration) -> SyncStats {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return self.sync_stats();
        }

        let drained = self.sync_pending_writes(max_wait);
        let _entered = self.shared.span.enter();
        self.stop_worker();

        let stats = self.sync_stats();
        info!(
            drained,
            synced = stats.synced,
            failed = stats.failed,
            abandoned = stats.abandoned,
            "Write-behind shut down"
        );
        stats
    }

    /// Returns the current counters.
    #[must_use]
    pub fn sync_stats(&self) -> SyncStats {
        self.shared
            .counters
            .snapshot(self.shared.queue.outstanding(), self.is_worker_active())
    }

    fn is_worker_active(&self) -> bool {
        acquire_lock(&self.worker)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    fn stop_worker(&self) {
        self.shared.stop.store(true, Ordering::Release);
        self.shared.queue.close();

        if let Some(handle) = acquire_lock(&self.worker).take()
            && handle.join().is_err()
        {
            error!("Write-behind worker panicked");
        }

        let abandoned = self.shared.queue.drain_remaining();
        if !abandoned.is_empty() {
            let ids: Vec<&str> = abandoned.iter().map(|job| job.record.id.as_str()).collect();
            self.shared
                .counters
                .abandoned
                .fetch_add(abandoned.len() as u64, Ordering::AcqRel);
            for _ in &abandoned {
                worker::record_job("abandoned");
            }
            warn!(count = ids.len(), ids = ?ids, "Abandoned pending export writes");
        }
    }
}

impl Drop for WriteBehindStorage {
    fn drop(&mut self) {
        if !self.shut_down.swap(true, Ordering::AcqRel) {
            let _entered = self.shared.span.enter();
            self.stop_worker();
        }
    }
}
