//! Scheduling and state tracking for full-dataset syncs.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::scheduler::{ExistingJobPolicy, JobScheduler};
use super::worker::{SyncError, SyncReport, SyncState, SyncWorker};
use crate::network::ConnectivityMonitor;
use crate::repository::{ContentRepository, GlossaryRepository, QuizRepository};

/// Unique name of the background sync job.
pub const SYNC_WORK_NAME: &str = "data_sync_work";

/// Period of the background sync.
/// 6 hours keeps content reasonably current without draining data plans.
pub const SYNC_INTERVAL: Duration = Duration::from_secs(6 * 60 * 60);

/// Schedules and tracks full-dataset syncs.
///
/// Clone is cheap; clones share the worker, state and scheduler.
#[derive(Clone)]
pub struct SyncCoordinator {
    worker: Arc<SyncWorker>,
    scheduler: JobScheduler,
    connectivity: ConnectivityMonitor,
    state: Arc<watch::Sender<SyncState>>,
    auto_sync: bool,
}

impl SyncCoordinator {
    pub fn new(
        content: ContentRepository,
        glossary: GlossaryRepository,
        quizzes: QuizRepository,
        connectivity: ConnectivityMonitor,
        scheduler: JobScheduler,
    ) -> Self {
        let initial = if connectivity.is_available() {
            SyncState::Connected
        } else {
            SyncState::Disconnected
        };
        let (tx, _) = watch::channel(initial);
        let state = Arc::new(tx);
        let worker = SyncWorker::new(content, glossary, quizzes, connectivity.clone(), state.clone());

        Self {
            worker: Arc::new(worker),
            scheduler,
            connectivity,
            state,
            auto_sync: true,
        }
    }

    /// When disabled, regaining connectivity no longer triggers a sync.
    pub fn with_auto_sync(mut self, enabled: bool) -> Self {
        self.auto_sync = enabled;
        self
    }

    /// Register the periodic background sync, unless it already is.
    pub fn initialize(&self) {
        let added = self.scheduler.enqueue_unique_periodic(
            SYNC_WORK_NAME,
            SYNC_INTERVAL,
            ExistingJobPolicy::Keep,
            self.worker.clone(),
        );
        if added {
            info!(interval_hours = SYNC_INTERVAL.as_secs() / 3600, "Periodic sync scheduled");
        }
    }

    /// Sync as soon as the network allows, restarting the periodic schedule.
    pub fn sync_now(&self) {
        self.scheduler.enqueue_unique_periodic(
            SYNC_WORK_NAME,
            SYNC_INTERVAL,
            ExistingJobPolicy::Replace,
            self.worker.clone(),
        );
    }

    /// Stop the background sync, including a run in progress.
    pub fn cancel_sync(&self) {
        if !self.scheduler.cancel_unique(SYNC_WORK_NAME) {
            debug!("No sync scheduled");
        }
    }

    pub fn is_scheduled(&self) -> bool {
        self.scheduler.is_scheduled(SYNC_WORK_NAME)
    }

    /// Run one full sync right here, outside the scheduler.
    pub async fn run_sync(&self) -> Result<SyncReport, SyncError> {
        self.worker.run_sync().await
    }

    pub fn state(&self) -> SyncState {
        *self.state.borrow()
    }

    /// Current state, then every change.
    pub fn observe_state(&self) -> BoxStream<'static, SyncState> {
        let rx = self.state.subscribe();
        stream::unfold((rx, None::<SyncState>), |(mut rx, last)| async move {
            loop {
                if last.is_some() {
                    rx.changed().await.ok()?;
                }
                let current = *rx.borrow_and_update();
                if last != Some(current) {
                    return Some((current, (rx, Some(current))));
                }
            }
        })
        .boxed()
    }

    /// Track connectivity in the sync state and sync whenever the network
    /// comes back.
    pub fn watch_connectivity(&self) -> JoinHandle<()> {
        let coordinator = self.clone();
        // Subscribe before spawning so no transition slips past.
        let mut updates = self.connectivity.observe();
        tokio::spawn(async move {
            let mut previous = None;
            while let Some(online) = updates.next().await {
                coordinator.state.send_if_modified(|state| {
                    let next = if online {
                        SyncState::Connected
                    } else {
                        SyncState::Disconnected
                    };
                    if *state == SyncState::Syncing || *state == next {
                        return false;
                    }
                    *state = next;
                    true
                });

                if online && previous == Some(false) {
                    info!("Connection restored");
                    if coordinator.auto_sync {
                        coordinator.sync_now();
                    }
                } else if !online {
                    info!("Offline, serving cached data");
                }
                previous = Some(online);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheManager;
    use crate::repository::OfflinePolicy;
    use crate::store::{ContentStore, JsonDatabase};
    use crate::test_support::FakeRemote;

    struct Fixture {
        coordinator: SyncCoordinator,
        cache: CacheManager,
        store: Arc<JsonDatabase>,
        remote: Arc<FakeRemote>,
        connectivity: ConnectivityMonitor,
    }

    fn fixture(remote: FakeRemote, online: bool) -> Fixture {
        let remote = Arc::new(remote);
        let store = Arc::new(JsonDatabase::in_memory());
        let cache = CacheManager::in_memory();
        let connectivity = ConnectivityMonitor::new(online);
        let policy = OfflinePolicy::new(cache.clone(), connectivity.clone());

        let coordinator = SyncCoordinator::new(
            ContentRepository::new(store.clone(), remote.clone(), policy.clone()),
            GlossaryRepository::new(store.clone(), remote.clone(), policy.clone()),
            QuizRepository::new(store.clone(), remote.clone(), policy),
            connectivity.clone(),
            JobScheduler::new(connectivity.clone()),
        );
        Fixture {
            coordinator,
            cache,
            store,
            remote,
            connectivity,
        }
    }

    async fn wait_until<F, Fut>(mut condition: F)
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !condition().await {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_run_sync_covers_all_categories() {
        let f = fixture(FakeRemote::textbook(), true);

        let report = f.coordinator.run_sync().await.unwrap();
        assert_eq!(report.synced, vec!["content", "glossary", "quizzes"]);
        assert!(report.is_complete());
        for key in ["content_synced", "glossary_synced", "quizzes_synced"] {
            assert!(f.cache.get(key, false).await, "{} not marked", key);
        }
        assert_eq!(f.coordinator.state(), SyncState::Connected);
    }

    #[tokio::test]
    async fn test_failed_category_does_not_stop_the_rest() {
        let f = fixture(FakeRemote::textbook().failing("terms"), true);

        let report = f.coordinator.run_sync().await.unwrap();
        assert_eq!(report.synced, vec!["content", "quizzes"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "glossary");
        assert!(!f.cache.get("glossary_synced", false).await);
        assert!(f.cache.get("quizzes_synced", false).await);
    }

    #[tokio::test]
    async fn test_run_sync_offline_does_nothing() {
        let f = fixture(FakeRemote::textbook(), false);

        assert_eq!(f.coordinator.run_sync().await, Err(SyncError::Offline));
        assert_eq!(f.remote.calls("chapters"), 0);
        assert_eq!(f.coordinator.state(), SyncState::Disconnected);
    }

    #[tokio::test]
    async fn test_concurrent_run_is_skipped() {
        let f = fixture(FakeRemote::textbook(), true);

        let (first, second) = tokio::join!(f.coordinator.run_sync(), f.coordinator.run_sync());
        let skipped = [&first, &second]
            .iter()
            .filter(|r| matches!(r, Err(SyncError::AlreadyRunning)))
            .count();
        assert_eq!(skipped, 1);
        assert_eq!(f.remote.calls("chapters"), 1);
    }

    #[tokio::test]
    async fn test_state_goes_through_syncing() {
        let f = fixture(FakeRemote::textbook(), true);
        let mut states = f.coordinator.observe_state();
        assert_eq!(states.next().await, Some(SyncState::Connected));

        let coordinator = f.coordinator.clone();
        let run = tokio::spawn(async move { coordinator.run_sync().await });
        assert_eq!(states.next().await, Some(SyncState::Syncing));
        assert_eq!(states.next().await, Some(SyncState::Connected));
        assert!(run.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_initialize_schedules_once() {
        let f = fixture(FakeRemote::textbook(), true);

        f.coordinator.initialize();
        f.coordinator.initialize();
        assert!(f.coordinator.is_scheduled());

        let cache = f.cache.clone();
        wait_until(|| {
            let cache = cache.clone();
            async move { cache.get("quizzes_synced", false).await }
        })
        .await;
        assert_eq!(f.remote.calls("chapters"), 1);

        f.coordinator.cancel_sync();
        assert!(!f.coordinator.is_scheduled());
    }

    #[tokio::test]
    async fn test_reconnect_triggers_sync() {
        let f = fixture(FakeRemote::textbook(), false);
        let watcher = f.coordinator.watch_connectivity();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(f.coordinator.state(), SyncState::Disconnected);
        assert!(!f.coordinator.is_scheduled());

        f.connectivity.set_available(true);
        let store = f.store.clone();
        wait_until(|| {
            let store = store.clone();
            async move { !store.watch_quizzes().next().await.unwrap_or_default().is_empty() }
        })
        .await;
        assert!(f.coordinator.is_scheduled());

        watcher.abort();
    }

    #[tokio::test]
    async fn test_network_handover_triggers_sync() {
        let f = fixture(FakeRemote::textbook(), true);
        let watcher = f.coordinator.watch_connectivity();

        f.connectivity.set_available(false);
        f.connectivity.set_available(true);

        let cache = f.cache.clone();
        wait_until(|| {
            let cache = cache.clone();
            async move { cache.get("quizzes_synced", false).await }
        })
        .await;
        assert!(f.coordinator.is_scheduled());
        assert_eq!(f.remote.calls("chapters"), 1);

        watcher.abort();
        f.coordinator.cancel_sync();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_sync_now_restarts_an_in_flight_run() {
        let f = fixture(FakeRemote::textbook().slow("chapters", Duration::from_millis(300)), true);

        f.coordinator.initialize();
        let remote = f.remote.clone();
        wait_until(|| {
            let remote = remote.clone();
            async move { remote.calls("chapters") == 1 }
        })
        .await;

        f.coordinator.sync_now();
        let cache = f.cache.clone();
        wait_until(|| {
            let cache = cache.clone();
            async move { cache.get("quizzes_synced", false).await }
        })
        .await;
        assert_eq!(f.remote.calls("chapters"), 2);

        f.coordinator.cancel_sync();
    }

    #[tokio::test]
    async fn test_reconnect_without_auto_sync_only_tracks_state() {
        let f = fixture(FakeRemote::textbook(), false);
        let coordinator = f.coordinator.clone().with_auto_sync(false);
        let watcher = coordinator.watch_connectivity();

        f.connectivity.set_available(true);
        let watched = coordinator.clone();
        wait_until(|| {
            let watched = watched.clone();
            async move { watched.state() == SyncState::Connected }
        })
        .await;
        assert!(!coordinator.is_scheduled());
        assert_eq!(f.remote.calls("chapters"), 0);

        watcher.abort();
    }
}
