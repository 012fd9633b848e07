//! One full sync across every category.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::scheduler::{Job, JobOutcome};
use crate::network::ConnectivityMonitor;
use crate::repository::{
    ContentRepository, GlossaryRepository, QuizRepository, RefreshError, CATEGORY_CONTENT, CATEGORY_GLOSSARY,
    CATEGORY_QUIZZES,
};

/// Coarse sync status for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Offline; cached data only.
    Disconnected,
    /// Online and idle.
    Connected,
    /// A full sync is running.
    Syncing,
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncState::Disconnected => write!(f, "Offline"),
            SyncState::Connected => write!(f, "Online"),
            SyncState::Syncing => write!(f, "Syncing"),
        }
    }
}

/// Why a full sync did not run to completion.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("Network unavailable")]
    Offline,

    #[error("A sync is already running")]
    AlreadyRunning,

    #[error("Connectivity lost during sync")]
    ConnectivityLost,
}

/// Per-category result of one full sync.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub synced: Vec<&'static str>,
    /// Category and error message for every category that failed.
    pub failed: Vec<(&'static str, String)>,
}

impl SyncReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Runs content, glossary and quiz sync in order.
///
/// Shared by the scheduled job and manual triggers; at most one run is in
/// flight at a time.
pub struct SyncWorker {
    content: ContentRepository,
    glossary: GlossaryRepository,
    quizzes: QuizRepository,
    connectivity: ConnectivityMonitor,
    state: Arc<watch::Sender<SyncState>>,
    running: AtomicBool,
}

impl SyncWorker {
    pub(crate) fn new(
        content: ContentRepository,
        glossary: GlossaryRepository,
        quizzes: QuizRepository,
        connectivity: ConnectivityMonitor,
        state: Arc<watch::Sender<SyncState>>,
    ) -> Self {
        Self {
            content,
            glossary,
            quizzes,
            connectivity,
            state,
            running: AtomicBool::new(false),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// One full sync. A failing category is logged and the next one still
    /// runs; losing the network part-way fails the whole run.
    pub async fn run_sync(&self) -> Result<SyncReport, SyncError> {
        if !self.connectivity.is_available() {
            return Err(SyncError::Offline);
        }
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Sync already in progress, skipping");
            return Err(SyncError::AlreadyRunning);
        }
        let _guard = RunGuard { worker: self };
        self.state.send_replace(SyncState::Syncing);
        info!("Starting sync");

        let mut report = SyncReport::default();
        let mut lost_connectivity = false;
        for category in [CATEGORY_CONTENT, CATEGORY_GLOSSARY, CATEGORY_QUIZZES] {
            let result = match category {
                CATEGORY_CONTENT => self.content.sync().await,
                CATEGORY_GLOSSARY => self.glossary.sync().await,
                _ => self.quizzes.sync().await,
            };
            match result {
                Ok(()) => report.synced.push(category),
                Err(e) => {
                    warn!(category = category, error = %e, "Category sync failed");
                    lost_connectivity |= matches!(e, RefreshError::Offline);
                    report.failed.push((category, e.to_string()));
                }
            }
        }

        if lost_connectivity {
            return Err(SyncError::ConnectivityLost);
        }
        info!(synced = report.synced.len(), failed = report.failed.len(), "Sync finished");
        Ok(report)
    }
}

/// Clears the running flag and leaves `Syncing`, also when the run is
/// cancelled mid-flight.
struct RunGuard<'a> {
    worker: &'a SyncWorker,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        let next = if self.worker.connectivity.is_available() {
            SyncState::Connected
        } else {
            SyncState::Disconnected
        };
        self.worker.state.send_replace(next);
        self.worker.running.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl Job for SyncWorker {
    async fn run(&self) -> JobOutcome {
        match self.run_sync().await {
            Ok(_) | Err(SyncError::AlreadyRunning) => JobOutcome::Success,
            Err(e) => {
                warn!(error = %e, "Sync run failed, will retry");
                JobOutcome::Retry
            }
        }
    }
}
