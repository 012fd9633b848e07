//! Cache-first and network-first loading strategies.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::cache::CacheManager;
use crate::network::ConnectivityMonitor;
use crate::store::StoreError;

/// Buffered emissions per strategy call before the producer waits.
const CHANNEL_CAPACITY: usize = 4;

/// Why a refresh did not happen.
#[derive(Error, Debug)]
pub enum RefreshError {
    #[error("Network unavailable")]
    Offline,

    #[error("Remote fetch failed: {0:#}")]
    Fetch(anyhow::Error),

    #[error("Failed to persist fetched data: {0}")]
    Persist(#[from] StoreError),
}

/// One dataset as the strategies see it.
#[async_trait]
pub trait OfflineResource: Send + Sync + 'static {
    type Data: Send + 'static;

    /// Cache key whose timestamp tracks this dataset's freshness.
    fn cache_key(&self) -> String;

    async fn fetch_remote(&self) -> anyhow::Result<Self::Data>;

    async fn persist(&self, data: Self::Data) -> Result<(), StoreError>;

    /// Live view of the locally stored data.
    fn read_local(&self) -> BoxStream<'static, Self::Data>;
}

/// Decides between local data and a network refresh.
///
/// Clone is cheap; clones share the cache and connectivity state.
#[derive(Clone)]
pub struct OfflinePolicy {
    cache: CacheManager,
    connectivity: ConnectivityMonitor,
}

impl OfflinePolicy {
    pub fn new(cache: CacheManager, connectivity: ConnectivityMonitor) -> Self {
        Self { cache, connectivity }
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    pub fn connectivity(&self) -> &ConnectivityMonitor {
        &self.connectivity
    }

    /// Serve local data first, refreshing in the background when stale.
    ///
    /// The first element is always whatever is stored locally. If that is
    /// older than `max_age` (or there is nothing) and the network is up, the
    /// dataset is fetched and persisted and the stream switches to a fresh
    /// local view. A failed refresh leaves the original view flowing.
    pub fn cache_first<R: OfflineResource>(&self, resource: R, max_age: Duration) -> BoxStream<'static, R::Data> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let policy = self.clone();

        tokio::spawn(async move {
            let key = resource.cache_key();
            let mut local = resource.read_local();

            let first = local.next().await;
            let has_local = first.is_some();
            if let Some(value) = first {
                if tx.send(value).await.is_err() {
                    return;
                }
            }

            if !has_local || policy.cache.is_stale(&key, max_age).await {
                match policy.refresh(&resource).await {
                    Ok(()) => {
                        forward(resource.read_local(), tx).await;
                        return;
                    }
                    Err(RefreshError::Offline) => {
                        debug!(key = %key, "Stale data, but offline; serving cached copy");
                    }
                    Err(e) => {
                        warn!(key = %key, error = %e, "Refresh failed, serving cached copy");
                    }
                }
            }

            forward(local, tx).await;
        });

        receiver_stream(rx)
    }

    /// Try the network first, falling back to local data.
    ///
    /// Emits only the local view: after a successful refresh it already
    /// holds the fetched data, otherwise it holds whatever was there.
    pub fn network_first<R: OfflineResource>(&self, resource: R) -> BoxStream<'static, R::Data> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let policy = self.clone();

        tokio::spawn(async move {
            let key = resource.cache_key();
            match policy.refresh(&resource).await {
                Ok(()) => {}
                Err(RefreshError::Offline) => debug!(key = %key, "Offline, serving local data"),
                Err(e) => warn!(key = %key, error = %e, "Network fetch failed, serving local data"),
            }
            forward(resource.read_local(), tx).await;
        });

        receiver_stream(rx)
    }

    /// Fetch, persist and stamp one dataset.
    pub async fn refresh<R: OfflineResource + ?Sized>(&self, resource: &R) -> Result<(), RefreshError> {
        if !self.connectivity.is_available() {
            return Err(RefreshError::Offline);
        }
        let data = resource.fetch_remote().await.map_err(RefreshError::Fetch)?;
        resource.persist(data).await?;

        let key = resource.cache_key();
        self.touch(&key).await;
        debug!(key = %key, "Refreshed from network");
        Ok(())
    }

    /// Mark `key` as fetched just now.
    pub async fn touch(&self, key: &str) {
        let now = self.cache.clock().now_millis();
        self.cache.save(key, &now).await;
    }
}

/// Pipe `source` into `tx` until either side is gone.
async fn forward<T>(mut source: BoxStream<'static, T>, tx: mpsc::Sender<T>) {
    loop {
        tokio::select! {
            _ = tx.closed() => break,
            item = source.next() => match item {
                Some(item) => {
                    if tx.send(item).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
        }
    }
}

fn receiver_stream<T: Send + 'static>(rx: mpsc::Receiver<T>) -> BoxStream<'static, T> {
    stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) }).boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use crate::cache::MemoryStore;
    use crate::clock::ManualClock;
    use tokio::sync::watch;

    /// In-memory dataset: a watch channel for local rows plus a scripted remote.
    struct FakeResource {
        local: Arc<watch::Sender<Vec<String>>>,
        remote: Result<Vec<String>, String>,
        persist_fails: bool,
        fetches: Arc<AtomicUsize>,
    }

    impl FakeResource {
        fn new(local: Vec<String>, remote: Result<Vec<String>, String>) -> Self {
            let (tx, _) = watch::channel(local);
            Self {
                local: Arc::new(tx),
                remote,
                persist_fails: false,
                fetches: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl OfflineResource for FakeResource {
        type Data = Vec<String>;

        fn cache_key(&self) -> String {
            "terms".to_string()
        }

        async fn fetch_remote(&self) -> anyhow::Result<Vec<String>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.remote.clone().map_err(anyhow::Error::msg)
        }

        async fn persist(&self, data: Vec<String>) -> Result<(), StoreError> {
            if self.persist_fails {
                return Err(StoreError::Io(std::io::Error::other("read-only")));
            }
            self.local.send_replace(data);
            Ok(())
        }

        fn read_local(&self) -> BoxStream<'static, Vec<String>> {
            let rx = self.local.subscribe();
            stream::unfold((rx, true), |(mut rx, first)| async move {
                if !first {
                    rx.changed().await.ok()?;
                }
                let value = rx.borrow_and_update().clone();
                Some((value, (rx, false)))
            })
            .boxed()
        }
    }

    fn words(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn policy(online: bool, now: i64) -> (OfflinePolicy, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(now));
        let cache = CacheManager::new(Arc::new(MemoryStore::new()), clock.clone());
        (OfflinePolicy::new(cache, ConnectivityMonitor::new(online)), clock)
    }

    #[tokio::test]
    async fn test_cache_first_emits_local_before_network() {
        let (policy, _) = policy(true, 0);
        let resource = FakeResource::new(words(&["cached"]), Ok(words(&["fresh"])));

        let mut stream = policy.cache_first(resource, Duration::from_secs(60));
        assert_eq!(stream.next().await, Some(words(&["cached"])));
        assert_eq!(stream.next().await, Some(words(&["fresh"])));
        assert!(!policy.cache().is_stale("terms", Duration::from_secs(60)).await);
    }

    #[tokio::test]
    async fn test_cache_first_skips_fetch_when_fresh() {
        let (policy, clock) = policy(true, 0);
        policy.cache().save("terms", &0i64).await;
        clock.set(500);

        let resource = FakeResource::new(words(&["cached"]), Ok(words(&["fresh"])));
        let fetches = resource.fetches.clone();
        let mut stream = policy.cache_first(resource, Duration::from_millis(1000));

        assert_eq!(stream.next().await, Some(words(&["cached"])));
        let next = tokio::time::timeout(Duration::from_millis(50), stream.next()).await;
        assert!(next.is_err());
        assert_eq!(fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cache_first_survives_fetch_failure() {
        let (policy, _) = policy(true, 0);
        let resource = FakeResource::new(words(&["cached"]), Err("HTTP 500".to_string()));
        let local = resource.local.clone();

        let mut stream = policy.cache_first(resource, Duration::from_secs(60));
        assert_eq!(stream.next().await, Some(words(&["cached"])));

        // The original local view keeps flowing.
        local.send_replace(words(&["edited"]));
        assert_eq!(stream.next().await, Some(words(&["edited"])));
        assert!(policy.cache().is_stale("terms", Duration::from_secs(60)).await);
    }

    #[tokio::test]
    async fn test_cache_first_persist_failure_leaves_timestamp_untouched() {
        let (policy, _) = policy(true, 0);
        let mut resource = FakeResource::new(words(&["cached"]), Ok(words(&["fresh"])));
        resource.persist_fails = true;

        let mut stream = policy.cache_first(resource, Duration::from_secs(60));
        assert_eq!(stream.next().await, Some(words(&["cached"])));
        assert_eq!(policy.cache().last_updated("terms").await, None);
    }

    #[tokio::test]
    async fn test_cache_first_offline_serves_stale_copy() {
        let (policy, _) = policy(false, 0);
        let resource = FakeResource::new(words(&["cached"]), Ok(words(&["fresh"])));
        let fetches = resource.fetches.clone();

        let mut stream = policy.cache_first(resource, Duration::from_secs(60));
        assert_eq!(stream.next().await, Some(words(&["cached"])));
        let next = tokio::time::timeout(Duration::from_millis(50), stream.next()).await;
        assert!(next.is_err());
        assert_eq!(fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_network_first_emits_fetched_data_once() {
        let (policy, _) = policy(true, 0);
        let resource = FakeResource::new(words(&["old"]), Ok(words(&["new"])));

        let mut stream = policy.network_first(resource);
        assert_eq!(stream.next().await, Some(words(&["new"])));
        let next = tokio::time::timeout(Duration::from_millis(50), stream.next()).await;
        assert!(next.is_err(), "network-first must not emit twice");
    }

    #[tokio::test]
    async fn test_network_first_offline_reads_local_without_fetching() {
        let (policy, _) = policy(false, 0);
        let resource = FakeResource::new(words(&["old"]), Ok(words(&["new"])));
        let fetches = resource.fetches.clone();

        let mut stream = policy.network_first(resource);
        assert_eq!(stream.next().await, Some(words(&["old"])));
        assert_eq!(fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_network_first_falls_back_on_error() {
        let (policy, _) = policy(true, 0);
        let resource = FakeResource::new(words(&["old"]), Err("timeout".to_string()));

        let mut stream = policy.network_first(resource);
        assert_eq!(stream.next().await, Some(words(&["old"])));
    }

    #[tokio::test]
    async fn test_dropped_stream_still_completes_refresh() {
        let (policy, _) = policy(true, 0);
        let resource = FakeResource::new(words(&["cached"]), Ok(words(&["fresh"])));
        let local = resource.local.clone();

        let mut stream = policy.cache_first(resource, Duration::from_secs(60));
        assert_eq!(stream.next().await, Some(words(&["cached"])));
        drop(stream);

        let mut rx = local.subscribe();
        tokio::time::timeout(Duration::from_secs(1), rx.wait_for(|v| *v == words(&["fresh"])))
            .await
            .unwrap()
            .unwrap();
    }
}
