use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, BoxStream, StreamExt};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tokio::sync::{watch, Mutex};
use tracing::{debug, warn};

use super::backend::{Edit, FileStore, MemoryStore, PreferenceStore};
use super::slots::SlotRegistry;
use super::CacheError;
use crate::clock::{Clock, SystemClock};

/// Prefix of the key holding a cache entry's last write time.
const TIMESTAMP_PREFIX: &str = "timestamp_";

/// Name of the preference document inside the cache directory.
const CACHE_FILE: &str = "cache.json";

/// Timestamped key→value cache with live observation.
///
/// Clone is cheap; clones share the store, clock and observer slots.
#[derive(Clone)]
pub struct CacheManager {
    store: Arc<dyn PreferenceStore>,
    clock: Arc<dyn Clock>,
    slots: Arc<SlotRegistry>,
    /// Held across a commit and its publish so observers see writes in
    /// commit order.
    write_lock: Arc<Mutex<()>>,
}

impl CacheManager {
    pub fn new(store: Arc<dyn PreferenceStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            slots: Arc::new(SlotRegistry::default()),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Open the file-backed cache inside `cache_dir`.
    pub fn open(cache_dir: &Path) -> Result<Self, CacheError> {
        let store = FileStore::open(cache_dir.join(CACHE_FILE))?;
        Ok(Self::new(Arc::new(store), Arc::new(SystemClock)))
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), Arc::new(SystemClock))
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Build a cache key from a base name and optional parameters,
    /// e.g. `generate_key("sections", &[&42])` → `"sections-42"`.
    pub fn generate_key(base: &str, params: &[&dyn std::fmt::Display]) -> String {
        if params.is_empty() {
            return base.to_string();
        }
        let suffix: Vec<String> = params.iter().map(|p| p.to_string()).collect();
        format!("{}-{}", base, suffix.join("-"))
    }

    fn timestamp_key(key: &str) -> String {
        format!("{}{}", TIMESTAMP_PREFIX, key)
    }

    /// Run a store operation on the blocking pool.
    async fn with_store<R, F>(&self, f: F) -> Result<R, CacheError>
    where
        R: Send + 'static,
        F: FnOnce(&dyn PreferenceStore) -> Result<R, CacheError> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || f(store.as_ref()))
            .await
            .map_err(|e| CacheError::Task(e.to_string()))?
    }

    async fn read_raw(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let key = key.to_string();
        self.with_store(move |store| store.get(&key)).await
    }

    // ===== Writes =====

    /// Store `value` under `key` and stamp it with the current time.
    ///
    /// Value and timestamp go to the store in one commit; observers are
    /// only notified once that commit succeeded.
    pub async fn try_save<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), CacheError> {
        let json = serde_json::to_value(value)?;
        let _write = self.write_lock.lock().await;
        let now = self.clock.now_millis();
        let edit = Edit::new()
            .put(key, json.clone())
            .put(Self::timestamp_key(key), Value::from(now));

        self.with_store(move |store| store.commit(edit)).await?;
        self.slots.publish(key, Some(json));
        debug!(key = key, "Saved cache entry");
        Ok(())
    }

    /// Like [`try_save`](Self::try_save), logging failures instead of returning them.
    pub async fn save<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        if let Err(e) = self.try_save(key, value).await {
            warn!(key = key, error = %e, "Failed to save cache entry");
        }
    }

    /// Delete the entry and its timestamp.
    pub async fn remove(&self, key: &str) {
        let edit = Edit::new().remove(key).remove(Self::timestamp_key(key));
        let _write = self.write_lock.lock().await;
        match self.with_store(move |store| store.commit(edit)).await {
            Ok(()) => {
                self.slots.publish(key, None);
                debug!(key = key, "Removed cache entry");
            }
            Err(e) => warn!(key = key, error = %e, "Failed to remove cache entry"),
        }
    }

    /// Delete every entry and timestamp.
    pub async fn clear(&self) {
        let _write = self.write_lock.lock().await;
        match self.with_store(|store| store.commit(Edit::new().clear())).await {
            Ok(()) => {
                self.slots.publish_all_absent();
                debug!("Cleared cache");
            }
            Err(e) => warn!(error = %e, "Failed to clear cache"),
        }
    }

    // ===== Reads =====

    /// Read the value under `key`, or `default` when it is missing,
    /// unreadable, or no longer matches `T`.
    pub async fn get<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        match self.read_raw(key).await {
            Ok(Some(json)) => match serde_json::from_value(json) {
                Ok(value) => value,
                Err(e) => {
                    warn!(key = key, error = %e, "Cached value has unexpected shape, treating as miss");
                    default
                }
            },
            Ok(None) => default,
            Err(e) => {
                warn!(key = key, error = %e, "Failed to read cache entry");
                default
            }
        }
    }

    /// Last write time of `key` in epoch milliseconds.
    pub async fn last_updated(&self, key: &str) -> Option<i64> {
        match self.read_raw(&Self::timestamp_key(key)).await {
            Ok(Some(ts)) => ts.as_i64(),
            Ok(None) => None,
            Err(e) => {
                debug!(key = key, error = %e, "Failed to read cache timestamp");
                None
            }
        }
    }

    /// `true` when `key` has never been written, was removed, or was
    /// last written more than `max_age` ago.
    pub async fn is_stale(&self, key: &str, max_age: Duration) -> bool {
        match self.last_updated(key).await {
            Some(ts) => {
                let age = i128::from(self.clock.now_millis()) - i128::from(ts);
                age > i128::try_from(max_age.as_millis()).unwrap_or(i128::MAX)
            }
            None => true,
        }
    }

    /// Live view of the value under `key`.
    ///
    /// The first element is read from the store when the stream is first
    /// polled; every later save, remove or clear touching `key` yields
    /// another element. `None` means "nothing cached".
    pub fn observe<T>(&self, key: &str) -> BoxStream<'static, Option<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let rx = self.slots.subscribe(key);
        let cache = self.clone();
        let key = key.to_string();

        stream::unfold(Observer::Backfill(rx), move |state| {
            let cache = cache.clone();
            let key = key.clone();
            async move {
                match state {
                    Observer::Backfill(rx) => {
                        let current = match cache.read_raw(&key).await {
                            Ok(value) => value,
                            Err(e) => {
                                warn!(key = %key, error = %e, "Failed to read initial value for observer");
                                None
                            }
                        };
                        Some((decode::<T>(&key, current), Observer::Live(rx)))
                    }
                    Observer::Live(mut rx) => {
                        rx.changed().await.ok()?;
                        let value = rx.borrow_and_update().clone();
                        Some((decode::<T>(&key, value), Observer::Live(rx)))
                    }
                }
            }
        })
        .boxed()
    }
}

enum Observer {
    Backfill(watch::Receiver<Option<Value>>),
    Live(watch::Receiver<Option<Value>>),
}

fn decode<T: DeserializeOwned>(key: &str, value: Option<Value>) -> Option<T> {
    let value = value?;
    match serde_json::from_value(value) {
        Ok(decoded) => Some(decoded),
        Err(e) => {
            warn!(key = key, error = %e, "Observed value has unexpected shape");
            None
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
