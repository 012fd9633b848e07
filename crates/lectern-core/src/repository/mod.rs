//! Offline-first repositories.
//!
//! Every dataset is served through `OfflinePolicy`:
//!
//! - **Cache-first** for browsing data (chapters, sections, content,
//!   glossary, quiz list): local rows come out immediately and a stale
//!   dataset is refreshed behind them.
//! - **Network-first** for quiz questions, which should be current when a
//!   quiz starts but still work offline.
//!
//! Each repository also owns the full sync routine for its category, used
//! by the sync coordinator.

pub mod content;
pub mod glossary;
pub mod offline;
pub mod quiz;

pub use content::ContentRepository;
pub use glossary::GlossaryRepository;
pub use offline::{OfflinePolicy, OfflineResource, RefreshError};
pub use quiz::QuizRepository;

use crate::cache::CacheManager;

/// Sync categories, in the order a full sync runs them.
pub const CATEGORY_CONTENT: &str = "content";
pub const CATEGORY_GLOSSARY: &str = "glossary";
pub const CATEGORY_QUIZZES: &str = "quizzes";

pub const SYNC_CATEGORIES: [&str; 3] = [CATEGORY_CONTENT, CATEGORY_GLOSSARY, CATEGORY_QUIZZES];

/// Cache key holding `true` once `category` has completed a sync.
pub fn synced_key(category: &str) -> String {
    format!("{}_synced", category)
}

/// Cache key holding the epoch-millis time of `category`'s last sync.
pub fn last_sync_key(category: &str) -> String {
    format!("{}_last_sync", category)
}

pub(crate) async fn mark_synced(cache: &CacheManager, category: &str) {
    let now = cache.clock().now_millis();
    cache.save(&synced_key(category), &true).await;
    cache.save(&last_sync_key(category), &now).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::cache::MemoryStore;
    use crate::clock::ManualClock;

    #[test]
    fn test_sync_keys() {
        assert_eq!(synced_key(CATEGORY_GLOSSARY), "glossary_synced");
        assert_eq!(last_sync_key(CATEGORY_QUIZZES), "quizzes_last_sync");
    }

    #[tokio::test]
    async fn test_mark_synced_writes_flag_and_time() {
        let cache = CacheManager::new(Arc::new(MemoryStore::new()), Arc::new(ManualClock::new(42_000)));
        mark_synced(&cache, CATEGORY_CONTENT).await;

        assert!(cache.get("content_synced", false).await);
        assert_eq!(cache.get("content_last_sync", 0i64).await, 42_000);
    }
}
