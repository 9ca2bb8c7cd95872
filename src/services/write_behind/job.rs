//! Pending write jobs and their lifecycle.

use crate::models::ExpenseRecord;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::fmt;

/// Lifecycle state of a pending export write.
///
/// ```text
/// Enqueued -> InProgress -> Synced
///                        -> Retry -> Enqueued
///                        -> Dropped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobState {
    /// Waiting in the queue.
    Enqueued,
    /// Taken by the worker.
    InProgress,
    /// Written to the export store.
    Synced,
    /// Attempt failed, will be re-enqueued.
    Retry,
    /// Attempts exhausted.
    Dropped,
}

impl JobState {
    /// Returns true for states a job never leaves.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Synced | Self::Dropped)
    }

    /// Returns the state name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Enqueued => "enqueued",
            Self::InProgress => "in_progress",
            Self::Synced => "synced",
            Self::Retry => "retry",
            Self::Dropped => "dropped",
        }
    }

    /// Validates a transition and returns the new state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a transition out of a terminal
    /// state or one the lifecycle does not allow.
    pub fn transition(self, next: Self) -> Result<Self> {
        let allowed = matches!(
            (self, next),
            (Self::Enqueued, Self::InProgress)
                | (Self::InProgress, Self::Synced | Self::Retry | Self::Dropped)
                | (Self::Retry, Self::Enqueued)
        );
        if allowed {
            Ok(next)
        } else {
            Err(Error::InvalidInput(format!(
                "invalid job transition {self} -> {next}"
            )))
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An expense waiting to be written to the export store.
#[derive(Debug, Clone)]
pub struct PendingWrite {
    /// The expense to export.
    pub record: ExpenseRecord,
    /// When the job was first enqueued.
    pub enqueued_at: DateTime<Utc>,
    /// Failed attempts so far.
    pub retry_count: u32,
    state: JobState,
}

impl PendingWrite {
    /// Creates an enqueued job.
    #[must_use]
    pub fn new(record: ExpenseRecord) -> Self {
        Self {
            record,
            enqueued_at: Utc::now(),
            retry_count: 0,
            state: JobState::Enqueued,
        }
    }

    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> JobState {
        self.state
    }

    /// Moves the job to `next`.
    ///
    /// # Errors
    ///
    /// Returns an error if the transition is not allowed; the state is left
    /// unchanged.
    pub fn advance(&mut self, next: JobState) -> Result<()> {
        self.state = self.state.transition(next)?;
        Ok(())
    }
}
