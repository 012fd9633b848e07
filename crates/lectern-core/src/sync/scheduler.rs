//! In-process scheduler for unique, periodic background jobs.
//!
//! Jobs are registered under a stable name. Registering a name that is
//! already scheduled either keeps the existing job or replaces it,
//! depending on the [`ExistingJobPolicy`]. Every job needs connectivity:
//! a run only starts while the network is usable. A run that asks to be
//! retried is re-run with exponential backoff, and after the retry budget
//! is spent the job waits for its next period.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use futures::{FutureExt, StreamExt};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::network::ConnectivityMonitor;

/// How a single run of a job ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Success,
    /// Run again after a backoff delay.
    Retry,
}

/// What to do when a job with the same name is already scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExistingJobPolicy {
    /// Leave the existing job alone and drop the new one.
    Keep,
    /// Cancel the existing job and schedule the new one.
    Replace,
}

#[async_trait]
pub trait Job: Send + Sync + 'static {
    async fn run(&self) -> JobOutcome;
}

// ============================================================================
// Retry policy
// ============================================================================

/// First retry delay after a failed run.
/// 30s rides out brief server hiccups without hammering the API.
const DEFAULT_INITIAL_BACKOFF_SECS: u64 = 30;

/// Upper bound for a single retry delay.
const DEFAULT_MAX_BACKOFF_SECS: u64 = 5 * 60 * 60;

/// Retries per period before a job waits for its next scheduled run.
const DEFAULT_MAX_RETRIES: u32 = 5;

/// Exponential backoff for runs that return [`JobOutcome::Retry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_secs(DEFAULT_INITIAL_BACKOFF_SECS),
            max_backoff: Duration::from_secs(DEFAULT_MAX_BACKOFF_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.initial_backoff
            .checked_mul(1u32 << exponent)
            .map_or(self.max_backoff, |delay| delay.min(self.max_backoff))
    }
}

// ============================================================================
// Scheduler
// ============================================================================

/// Registry of named periodic jobs.
///
/// Clone is cheap; clones share the registry. Must be used from within a
/// tokio runtime.
#[derive(Clone)]
pub struct JobScheduler {
    jobs: Arc<Mutex<HashMap<String, JoinHandle<()>>>>,
    connectivity: ConnectivityMonitor,
    retry: RetryPolicy,
}

impl JobScheduler {
    pub fn new(connectivity: ConnectivityMonitor) -> Self {
        Self::with_retry_policy(connectivity, RetryPolicy::default())
    }

    pub fn with_retry_policy(connectivity: ConnectivityMonitor, retry: RetryPolicy) -> Self {
        Self {
            jobs: Arc::new(Mutex::new(HashMap::new())),
            connectivity,
            retry,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, JoinHandle<()>>> {
        self.jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Schedule `job` to run now and then every `period`.
    ///
    /// Returns `false` when `policy` is `Keep` and a job named `name` is
    /// already scheduled; nothing changes in that case.
    pub fn enqueue_unique_periodic(
        &self,
        name: &str,
        period: Duration,
        policy: ExistingJobPolicy,
        job: Arc<dyn Job>,
    ) -> bool {
        let mut jobs = self.lock();
        let mut replaced = None;
        if let Some(existing) = jobs.remove(name) {
            if !existing.is_finished() {
                match policy {
                    ExistingJobPolicy::Keep => {
                        debug!(job = name, "Job already scheduled, keeping existing");
                        jobs.insert(name.to_string(), existing);
                        return false;
                    }
                    ExistingJobPolicy::Replace => {
                        existing.abort();
                        replaced = Some(existing);
                        info!(job = name, "Replacing scheduled job");
                    }
                }
            }
        }

        let task = run_periodic(name.to_string(), period, job, self.connectivity.clone(), self.retry);
        let handle = tokio::spawn(async move {
            // The cancelled run must be fully dropped before the new one starts.
            if let Some(previous) = replaced {
                let _ = previous.await;
            }
            task.await;
        });
        jobs.insert(name.to_string(), handle);
        debug!(job = name, period_secs = period.as_secs(), "Scheduled periodic job");
        true
    }

    /// Cancel the job named `name`, including a run in progress.
    pub fn cancel_unique(&self, name: &str) -> bool {
        match self.lock().remove(name) {
            Some(handle) => {
                handle.abort();
                info!(job = name, "Cancelled job");
                true
            }
            None => false,
        }
    }

    pub fn is_scheduled(&self, name: &str) -> bool {
        self.lock().get(name).is_some_and(|handle| !handle.is_finished())
    }

    /// Names of all live jobs, sorted.
    pub fn job_names(&self) -> Vec<String> {
        let mut jobs = self.lock();
        jobs.retain(|_, handle| !handle.is_finished());
        let mut names: Vec<String> = jobs.keys().cloned().collect();
        names.sort();
        names
    }

    /// Cancel every job.
    pub fn shutdown(&self) {
        for (name, handle) in self.lock().drain() {
            handle.abort();
            debug!(job = %name, "Stopped job");
        }
    }
}

async fn run_periodic(
    name: String,
    period: Duration,
    job: Arc<dyn Job>,
    connectivity: ConnectivityMonitor,
    retry: RetryPolicy,
) {
    loop {
        run_with_retries(&name, job.as_ref(), &connectivity, retry).await;
        tokio::time::sleep(period).await;
    }
}

async fn run_with_retries(name: &str, job: &dyn Job, connectivity: &ConnectivityMonitor, retry: RetryPolicy) {
    let mut attempt = 0;
    loop {
        wait_until_online(connectivity).await;

        let outcome = match AssertUnwindSafe(job.run()).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(job = name, "Job panicked");
                JobOutcome::Retry
            }
        };

        match outcome {
            JobOutcome::Success => {
                debug!(job = name, "Job run succeeded");
                return;
            }
            JobOutcome::Retry => {
                attempt += 1;
                if attempt > retry.max_retries {
                    warn!(job = name, attempts = attempt, "Job still failing, waiting for next period");
                    return;
                }
                let delay = retry.backoff(attempt);
                info!(job = name, attempt = attempt, delay_ms = delay.as_millis() as u64, "Job will retry");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

async fn wait_until_online(connectivity: &ConnectivityMonitor) {
    let mut updates = connectivity.observe();
    while let Some(online) = updates.next().await {
        if online {
            return;
        }
    }
}
