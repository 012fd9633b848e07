//! Quizzes with their questions and answers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use tracing::info;

use super::offline::{OfflinePolicy, OfflineResource, RefreshError};
use super::{mark_synced, CATEGORY_QUIZZES};
use crate::api::RemoteSource;
use crate::cache::CacheManager;
use crate::models::{Answer, Question, Quiz};
use crate::store::{ContentStore, StoreError};

/// Quizzes with their questions and answer options.
#[derive(Clone)]
pub struct QuizRepository {
    store: Arc<dyn ContentStore>,
    remote: Arc<dyn RemoteSource>,
    policy: OfflinePolicy,
}

impl QuizRepository {
    pub fn new(store: Arc<dyn ContentStore>, remote: Arc<dyn RemoteSource>, policy: OfflinePolicy) -> Self {
        Self { store, remote, policy }
    }

    pub fn quizzes(&self, max_age: Duration) -> BoxStream<'static, Vec<Quiz>> {
        let resource = QuizzesResource {
            store: self.store.clone(),
            remote: self.remote.clone(),
        };
        self.policy.cache_first(resource, max_age)
    }

    /// Questions of `quiz_id`, fetched fresh when online.
    pub fn questions(&self, quiz_id: i64) -> BoxStream<'static, Vec<Question>> {
        let resource = QuestionsResource {
            store: self.store.clone(),
            remote: self.remote.clone(),
            quiz_id,
        };
        self.policy.network_first(resource)
    }

    /// Answer options stored for `question_id`.
    pub fn answers(&self, question_id: i64) -> BoxStream<'static, Vec<Answer>> {
        self.store.watch_answers(question_id)
    }

    /// Download all quizzes, their questions and every question's answers,
    /// then mark the category synced.
    pub async fn sync(&self) -> Result<(), RefreshError> {
        if !self.policy.connectivity().is_available() {
            return Err(RefreshError::Offline);
        }

        let quizzes = self.remote.fetch_quizzes().await.map_err(RefreshError::Fetch)?;
        self.store.insert_quizzes(quizzes.clone()).await?;
        self.policy.touch(&quizzes_key()).await;

        let mut question_count = 0;
        let mut answer_count = 0;
        for quiz in &quizzes {
            let questions = self
                .remote
                .fetch_questions(quiz.id)
                .await
                .map_err(RefreshError::Fetch)?;
            question_count += questions.len();
            self.store.insert_questions(questions.clone()).await?;
            self.policy.touch(&questions_key(quiz.id)).await;

            for question in &questions {
                let answers = self
                    .remote
                    .fetch_answers(question.id)
                    .await
                    .map_err(RefreshError::Fetch)?;
                answer_count += answers.len();
                self.store.insert_answers(answers).await?;
            }
        }

        mark_synced(self.policy.cache(), CATEGORY_QUIZZES).await;
        info!(
            quizzes = quizzes.len(),
            questions = question_count,
            answers = answer_count,
            "Quizzes synced"
        );
        Ok(())
    }
}

fn quizzes_key() -> String {
    CacheManager::generate_key("quizzes", &[])
}

fn questions_key(quiz_id: i64) -> String {
    CacheManager::generate_key("questions", &[&quiz_id])
}

// ===== Resources =====

struct QuizzesResource {
    store: Arc<dyn ContentStore>,
    remote: Arc<dyn RemoteSource>,
}

#[async_trait]
impl OfflineResource for QuizzesResource {
    type Data = Vec<Quiz>;

    fn cache_key(&self) -> String {
        quizzes_key()
    }

    async fn fetch_remote(&self) -> anyhow::Result<Vec<Quiz>> {
        self.remote.fetch_quizzes().await
    }

    async fn persist(&self, data: Vec<Quiz>) -> Result<(), StoreError> {
        self.store.insert_quizzes(data).await
    }

    fn read_local(&self) -> BoxStream<'static, Vec<Quiz>> {
        self.store.watch_quizzes()
    }
}

struct QuestionsResource {
    store: Arc<dyn ContentStore>,
    remote: Arc<dyn RemoteSource>,
    quiz_id: i64,
}

#[async_trait]
impl OfflineResource for QuestionsResource {
    type Data = Vec<Question>;

    fn cache_key(&self) -> String {
        questions_key(self.quiz_id)
    }

    async fn fetch_remote(&self) -> anyhow::Result<Vec<Question>> {
        self.remote.fetch_questions(self.quiz_id).await
    }

    async fn persist(&self, data: Vec<Question>) -> Result<(), StoreError> {
        self.store.insert_questions(data).await
    }

    fn read_local(&self) -> BoxStream<'static, Vec<Question>> {
        self.store.watch_questions(self.quiz_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::ConnectivityMonitor;
    use crate::store::JsonDatabase;
    use crate::test_support::FakeRemote;
    use futures::StreamExt;

    fn repo(remote: Arc<FakeRemote>, online: bool) -> (QuizRepository, Arc<JsonDatabase>, ConnectivityMonitor) {
        let store = Arc::new(JsonDatabase::in_memory());
        let connectivity = ConnectivityMonitor::new(online);
        let policy = OfflinePolicy::new(CacheManager::in_memory(), connectivity.clone());
        (QuizRepository::new(store.clone(), remote, policy), store, connectivity)
    }

    #[tokio::test]
    async fn test_sync_stores_question_tree() {
        let (repo, _, _) = repo(Arc::new(FakeRemote::textbook()), true);

        repo.sync().await.unwrap();

        let mut answers = repo.answers(101);
        let stored = answers.next().await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored.iter().filter(|a| a.is_correct).count(), 1);
    }

    #[tokio::test]
    async fn test_questions_prefer_network() {
        let remote = Arc::new(FakeRemote::textbook());
        let (repo, store, _) = repo(remote.clone(), true);
        let mut stale = remote.questions_for(1);
        stale[0].text = "Outdated wording".to_string();
        store.insert_questions(stale).await.unwrap();

        let mut stream = repo.questions(1);
        let questions = stream.next().await.unwrap();
        assert_eq!(questions, remote.questions_for(1));
        assert_eq!(remote.calls("questions"), 1);
    }

    #[tokio::test]
    async fn test_questions_offline_fall_back_without_fetch() {
        let remote = Arc::new(FakeRemote::textbook());
        let (repo, store, _) = repo(remote.clone(), false);
        store.insert_questions(remote.questions_for(1)).await.unwrap();

        let mut stream = repo.questions(1);
        assert_eq!(stream.next().await.unwrap().len(), 2);
        assert_eq!(remote.calls("questions"), 0);
    }

    #[tokio::test]
    async fn test_quizzes_refetch_after_connectivity_returns() {
        let remote = Arc::new(FakeRemote::textbook());
        let (repo, _, connectivity) = repo(remote.clone(), false);

        let mut offline = repo.quizzes(Duration::from_secs(60));
        assert!(offline.next().await.unwrap().is_empty());
        drop(offline);

        connectivity.set_available(true);
        let mut online = repo.quizzes(Duration::from_secs(60));
        assert!(online.next().await.unwrap().is_empty());
        assert_eq!(online.next().await.unwrap().len(), 1);
    }
}
