//! Background synchronization of the full textbook dataset.
//!
//! `SyncCoordinator` owns one named periodic job (`data_sync_work`, every
//! 6 hours) on the in-process `JobScheduler`. Each run syncs content,
//! glossary and quizzes in that order; a failing category does not stop
//! the others. The coordinator also publishes a coarse `SyncState` and
//! starts a sync whenever connectivity comes back.

pub mod coordinator;
pub mod scheduler;
pub mod worker;

pub use coordinator::{SyncCoordinator, SYNC_INTERVAL, SYNC_WORK_NAME};
pub use scheduler::{ExistingJobPolicy, Job, JobOutcome, JobScheduler, RetryPolicy};
pub use worker::{SyncError, SyncReport, SyncState, SyncWorker};
