//! Background export worker.

use super::{JobState, PendingQueue, PendingWrite};
use crate::config::WriteBehindConfig;
use crate::models::SyncStats;
use crate::services::DedupCoordinator;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{Span, debug, error, info, warn};

/// State shared between [`super::WriteBehindStorage`] and its worker.
pub(super) struct Shared {
    pub coordinator: Arc<DedupCoordinator>,
    pub queue: PendingQueue,
    pub config: WriteBehindConfig,
    pub stop: AtomicBool,
    pub span: Span,
    pub counters: Counters,
}

/// Monotonic job counters.
#[derive(Default)]
pub(super) struct Counters {
    pub synced: AtomicU64,
    pub failed: AtomicU64,
    pub retried: AtomicU64,
    pub abandoned: AtomicU64,
}

impl Counters {
    /// Jobs that reached `Synced` or `Dropped`.
    pub fn terminal(&self) -> u64 {
        self.synced.load(Ordering::Acquire) + self.failed.load(Ordering::Acquire)
    }

    pub fn snapshot(&self, pending: usize, worker_active: bool) -> SyncStats {
        SyncStats {
            synced: self.synced.load(Ordering::Acquire),
            failed: self.failed.load(Ordering::Acquire),
            retried: self.retried.load(Ordering::Acquire),
            pending: pending as u64,
            abandoned: self.abandoned.load(Ordering::Acquire),
            worker_active,
        }
    }
}

pub(super) fn record_job(outcome: &'static str) {
    metrics::counter!("write_behind_jobs_total", "outcome" => outcome).increment(1);
}

/// Worker loop. Runs until `stop` is set or the queue is closed.
pub(super) fn run(shared: &Shared) {
    let _entered = shared.span.enter();
    info!("Write-behind worker started");

    while !shared.stop.load(Ordering::Acquire) {
        let Some(job) = shared.queue.pop_timeout(shared.config.poll_interval) else {
            continue;
        };
        process(shared, job);
        shared.queue.complete();
    }

    info!("Write-behind worker stopped");
}

fn process(shared: &Shared, mut job: PendingWrite) {
    if let Err(e) = job.advance(JobState::InProgress) {
        error!(expense.id = %job.record.id, error = %e, "Discarding job in unexpected state");
        return;
    }

    match shared.coordinator.export_if_missing(&job.record) {
        Ok(appended) => {
            transition(&mut job, JobState::Synced);
            shared.counters.synced.fetch_add(1, Ordering::AcqRel);
            record_job("synced");
            debug!(
                expense.id = %job.record.id,
                attempts = job.retry_count + 1,
                appended,
                "Expense exported"
            );
        },
        Err(e) => {
            job.retry_count += 1;
            if job.retry_count < shared.config.max_attempts {
                transition(&mut job, JobState::Retry);
                transition(&mut job, JobState::Enqueued);
                shared.counters.retried.fetch_add(1, Ordering::AcqRel);
                record_job("retried");
                warn!(
                    expense.id = %job.record.id,
                    attempt = job.retry_count,
                    max_attempts = shared.config.max_attempts,
                    error = %e,
                    "Export write failed, retrying"
                );
                // Pushed before the caller completes the in-flight slot so
                // the job is never unaccounted for.
                if let Err(job) = shared.queue.push(job) {
                    shared.counters.abandoned.fetch_add(1, Ordering::AcqRel);
                    record_job("abandoned");
                    warn!(
                        expense.id = %job.record.id,
                        "Queue closed before retry, export write abandoned"
                    );
                }
            } else {
                transition(&mut job, JobState::Dropped);
                shared.counters.failed.fetch_add(1, Ordering::AcqRel);
                record_job("dropped");
                error!(
                    expense.id = %job.record.id,
                    expense = %job.record,
                    attempts = job.retry_count,
                    error = %e,
                    "Export write failed permanently, expense only in cache"
                );
            }
        },
    }
}

fn transition(job: &mut PendingWrite, next: JobState) {
    if let Err(e) = job.advance(next) {
        error!(expense.id = %job.record.id, error = %e, "Job state transition rejected");
    }
}
