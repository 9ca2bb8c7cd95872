//! Business logic services.
//!
//! Services orchestrate the storage backends:
//! - [`DedupCoordinator`]: process-or-skip decisions and dual-write persistence
//! - [`WriteBehindStorage`]: deferred export writes on a background worker
//! - [`SystemMessageClassifier`]: administrative notice filtering
//! - [`MessageHasher`]: message fingerprints

mod classifier;
mod coordinator;
mod fingerprint;
pub mod write_behind;

pub use classifier::{DEFAULT_SYSTEM_PATTERNS, PatternClassifier, SystemMessageClassifier};
pub use coordinator::DedupCoordinator;
pub use fingerprint::MessageHasher;
pub use write_behind::{JobState, PendingQueue, PendingWrite, WriteBehindStorage};
