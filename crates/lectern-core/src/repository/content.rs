//! Textbook structure: chapters, their sections and section bodies.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use tracing::{debug, info};

use super::offline::{OfflinePolicy, OfflineResource, RefreshError};
use super::{mark_synced, CATEGORY_CONTENT};
use crate::api::RemoteSource;
use crate::cache::CacheManager;
use crate::models::{Chapter, Content, Section};
use crate::store::{ContentStore, StoreError};

/// Chapters, sections and section content.
#[derive(Clone)]
pub struct ContentRepository {
    store: Arc<dyn ContentStore>,
    remote: Arc<dyn RemoteSource>,
    policy: OfflinePolicy,
    download_all_content: bool,
}

impl ContentRepository {
    pub fn new(store: Arc<dyn ContentStore>, remote: Arc<dyn RemoteSource>, policy: OfflinePolicy) -> Self {
        Self {
            store,
            remote,
            policy,
            download_all_content: false,
        }
    }

    /// When enabled, a full sync also fetches every section's body.
    /// Otherwise sync stops at sections and bodies are fetched on first view.
    pub fn with_download_all_content(mut self, enabled: bool) -> Self {
        self.download_all_content = enabled;
        self
    }

    pub fn chapters(&self, max_age: Duration) -> BoxStream<'static, Vec<Chapter>> {
        let resource = ChaptersResource {
            store: self.store.clone(),
            remote: self.remote.clone(),
        };
        self.policy.cache_first(resource, max_age)
    }

    pub fn sections(&self, chapter_id: i64, max_age: Duration) -> BoxStream<'static, Vec<Section>> {
        let resource = SectionsResource {
            store: self.store.clone(),
            remote: self.remote.clone(),
            chapter_id,
        };
        self.policy.cache_first(resource, max_age)
    }

    pub fn contents(&self, section_id: i64, max_age: Duration) -> BoxStream<'static, Vec<Content>> {
        let resource = ContentsResource {
            store: self.store.clone(),
            remote: self.remote.clone(),
            section_id,
        };
        self.policy.cache_first(resource, max_age)
    }

    /// Download chapters, then every chapter's sections, then (unless
    /// disabled) every section's content, and mark the category synced.
    pub async fn sync(&self) -> Result<(), RefreshError> {
        if !self.policy.connectivity().is_available() {
            return Err(RefreshError::Offline);
        }

        let chapters = self.remote.fetch_chapters().await.map_err(RefreshError::Fetch)?;
        self.store.insert_chapters(chapters.clone()).await?;
        self.policy.touch(&chapters_key()).await;

        let mut section_count = 0;
        let mut content_count = 0;
        for chapter in &chapters {
            let sections = self
                .remote
                .fetch_sections(chapter.id)
                .await
                .map_err(RefreshError::Fetch)?;
            section_count += sections.len();
            self.store.insert_sections(sections.clone()).await?;
            self.policy.touch(&sections_key(chapter.id)).await;

            if !self.download_all_content {
                continue;
            }
            for section in &sections {
                let contents = self
                    .remote
                    .fetch_contents(section.id)
                    .await
                    .map_err(RefreshError::Fetch)?;
                content_count += contents.len();
                self.store.insert_contents(contents).await?;
                self.policy.touch(&contents_key(section.id)).await;
            }
        }

        mark_synced(self.cache(), CATEGORY_CONTENT).await;
        info!(
            chapters = chapters.len(),
            sections = section_count,
            contents = content_count,
            "Content synced"
        );
        Ok(())
    }

    fn cache(&self) -> &CacheManager {
        self.policy.cache()
    }
}

fn chapters_key() -> String {
    CacheManager::generate_key("chapters", &[])
}

fn sections_key(chapter_id: i64) -> String {
    CacheManager::generate_key("sections", &[&chapter_id])
}

fn contents_key(section_id: i64) -> String {
    CacheManager::generate_key("content", &[&section_id])
}

// ===== Resources =====

struct ChaptersResource {
    store: Arc<dyn ContentStore>,
    remote: Arc<dyn RemoteSource>,
}

#[async_trait]
impl OfflineResource for ChaptersResource {
    type Data = Vec<Chapter>;

    fn cache_key(&self) -> String {
        chapters_key()
    }

    async fn fetch_remote(&self) -> anyhow::Result<Vec<Chapter>> {
        self.remote.fetch_chapters().await
    }

    async fn persist(&self, data: Vec<Chapter>) -> Result<(), StoreError> {
        self.store.insert_chapters(data).await
    }

    fn read_local(&self) -> BoxStream<'static, Vec<Chapter>> {
        self.store.watch_chapters()
    }
}

struct SectionsResource {
    store: Arc<dyn ContentStore>,
    remote: Arc<dyn RemoteSource>,
    chapter_id: i64,
}

#[async_trait]
impl OfflineResource for SectionsResource {
    type Data = Vec<Section>;

    fn cache_key(&self) -> String {
        sections_key(self.chapter_id)
    }

    async fn fetch_remote(&self) -> anyhow::Result<Vec<Section>> {
        self.remote.fetch_sections(self.chapter_id).await
    }

    async fn persist(&self, data: Vec<Section>) -> Result<(), StoreError> {
        self.store.insert_sections(data).await
    }

    fn read_local(&self) -> BoxStream<'static, Vec<Section>> {
        self.store.watch_sections(self.chapter_id)
    }
}

struct ContentsResource {
    store: Arc<dyn ContentStore>,
    remote: Arc<dyn RemoteSource>,
    section_id: i64,
}

#[async_trait]
impl OfflineResource for ContentsResource {
    type Data = Vec<Content>;

    fn cache_key(&self) -> String {
        contents_key(self.section_id)
    }

    async fn fetch_remote(&self) -> anyhow::Result<Vec<Content>> {
        debug!(section_id = self.section_id, "Fetching section content");
        self.remote.fetch_contents(self.section_id).await
    }

    async fn persist(&self, data: Vec<Content>) -> Result<(), StoreError> {
        self.store.insert_contents(data).await
    }

    fn read_local(&self) -> BoxStream<'static, Vec<Content>> {
        self.store.watch_contents(self.section_id)
    }
}
