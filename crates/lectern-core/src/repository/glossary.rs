//! Glossary terms and the sections each term appears in.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use tracing::info;

use super::offline::{OfflinePolicy, OfflineResource, RefreshError};
use super::{mark_synced, CATEGORY_GLOSSARY};
use crate::api::RemoteSource;
use crate::cache::CacheManager;
use crate::models::{Section, Term, TermSectionLink};
use crate::store::{ContentStore, StoreError};

/// Glossary terms and the sections they appear in.
#[derive(Clone)]
pub struct GlossaryRepository {
    store: Arc<dyn ContentStore>,
    remote: Arc<dyn RemoteSource>,
    policy: OfflinePolicy,
}

impl GlossaryRepository {
    pub fn new(store: Arc<dyn ContentStore>, remote: Arc<dyn RemoteSource>, policy: OfflinePolicy) -> Self {
        Self { store, remote, policy }
    }

    /// All terms, alphabetically.
    pub fn terms(&self, max_age: Duration) -> BoxStream<'static, Vec<Term>> {
        let resource = TermsResource {
            store: self.store.clone(),
            remote: self.remote.clone(),
        };
        self.policy.cache_first(resource, max_age)
    }

    pub fn related_sections(&self, term_id: i64, max_age: Duration) -> BoxStream<'static, Vec<Section>> {
        let resource = RelatedSectionsResource {
            store: self.store.clone(),
            remote: self.remote.clone(),
            term_id,
        };
        self.policy.cache_first(resource, max_age)
    }

    /// Download all terms and each term's section links, then mark the
    /// category synced.
    pub async fn sync(&self) -> Result<(), RefreshError> {
        if !self.policy.connectivity().is_available() {
            return Err(RefreshError::Offline);
        }

        let terms = self.remote.fetch_terms().await.map_err(RefreshError::Fetch)?;
        self.store.insert_terms(terms.clone()).await?;
        self.policy.touch(&terms_key()).await;

        let mut link_count = 0;
        for term in &terms {
            let sections = self
                .remote
                .fetch_related_sections(term.id)
                .await
                .map_err(RefreshError::Fetch)?;
            link_count += sections.len();
            store_related(self.store.as_ref(), term.id, sections).await?;
            self.policy.touch(&related_key(term.id)).await;
        }

        mark_synced(self.policy.cache(), CATEGORY_GLOSSARY).await;
        info!(terms = terms.len(), links = link_count, "Glossary synced");
        Ok(())
    }
}

fn terms_key() -> String {
    CacheManager::generate_key("terms", &[])
}

fn related_key(term_id: i64) -> String {
    CacheManager::generate_key("term_sections", &[&term_id])
}

/// Store the sections and the term→section links pointing at them.
async fn store_related(store: &dyn ContentStore, term_id: i64, sections: Vec<Section>) -> Result<(), StoreError> {
    let links = sections
        .iter()
        .map(|section| TermSectionLink {
            term_id,
            section_id: section.id,
        })
        .collect();
    store.insert_sections(sections).await?;
    store.insert_term_links(links).await
}

// ===== Resources =====

struct TermsResource {
    store: Arc<dyn ContentStore>,
    remote: Arc<dyn RemoteSource>,
}

#[async_trait]
impl OfflineResource for TermsResource {
    type Data = Vec<Term>;

    fn cache_key(&self) -> String {
        terms_key()
    }

    async fn fetch_remote(&self) -> anyhow::Result<Vec<Term>> {
        self.remote.fetch_terms().await
    }

    async fn persist(&self, data: Vec<Term>) -> Result<(), StoreError> {
        self.store.insert_terms(data).await
    }

    fn read_local(&self) -> BoxStream<'static, Vec<Term>> {
        self.store.watch_terms()
    }
}

struct RelatedSectionsResource {
    store: Arc<dyn ContentStore>,
    remote: Arc<dyn RemoteSource>,
    term_id: i64,
}

#[async_trait]
impl OfflineResource for RelatedSectionsResource {
    type Data = Vec<Section>;

    fn cache_key(&self) -> String {
        related_key(self.term_id)
    }

    async fn fetch_remote(&self) -> anyhow::Result<Vec<Section>> {
        self.remote.fetch_related_sections(self.term_id).await
    }

    async fn persist(&self, data: Vec<Section>) -> Result<(), StoreError> {
        store_related(self.store.as_ref(), self.term_id, data).await
    }

    fn read_local(&self) -> BoxStream<'static, Vec<Section>> {
        self.store.watch_related_sections(self.term_id)
    }
}
