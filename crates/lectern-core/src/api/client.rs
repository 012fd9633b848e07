//! API client for the textbook content service.
//!
//! This module provides the `ApiClient` struct for fetching chapters,
//! glossary terms and quizzes, and the `RemoteSource` trait it implements.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{header, Client};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::models::{Answer, Chapter, Content, Question, Quiz, Section, Term};

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// Default base URL for the content API.
pub const DEFAULT_API_BASE_URL: &str = "https://api.lectern.app/v1";

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
/// 3 retries with exponential backoff usually succeeds without excessive delay.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Network side of every dataset: one call per collection.
///
/// Implementations return the full collection or an error.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    async fn fetch_chapters(&self) -> Result<Vec<Chapter>>;

    async fn fetch_sections(&self, chapter_id: i64) -> Result<Vec<Section>>;

    async fn fetch_contents(&self, section_id: i64) -> Result<Vec<Content>>;

    async fn fetch_terms(&self) -> Result<Vec<Term>>;

    /// Sections in which a glossary term is used.
    async fn fetch_related_sections(&self, term_id: i64) -> Result<Vec<Section>>;

    async fn fetch_quizzes(&self) -> Result<Vec<Quiz>>;

    async fn fetch_questions(&self, quiz_id: i64) -> Result<Vec<Question>>;

    async fn fetch_answers(&self, question_id: i64) -> Result<Vec<Answer>>;
}

/// HTTP client for the content API.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Create a new API client for `base_url`
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Check if response is successful, returning an error with body if not.
    /// Returns Ok(Some(response)) for success, Ok(None) for rate limit (should retry),
    /// or Err for other errors.
    async fn check_response_for_retry(response: reqwest::Response) -> Result<Option<reqwest::Response>> {
        if response.status().is_success() {
            Ok(Some(response))
        } else if response.status().as_u16() == 429 {
            Ok(None)
        } else {
            let status = response.status();
            let path = response.url().path().to_string();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &path, &body).into())
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = self
                .client
                .get(&url)
                .header(header::ACCEPT, "application/json")
                .send()
                .await
                .map_err(ApiError::from)
                .with_context(|| format!("Failed to send GET request to {}", url))?;

            match Self::check_response_for_retry(response).await? {
                Some(response) => {
                    let text = response
                        .text()
                        .await
                        .with_context(|| format!("Failed to read response body from {}", url))?;
                    debug!(url = %url, bytes = text.len(), "Response received");
                    return serde_json::from_str(&text)
                        .map_err(|e| ApiError::InvalidResponse(e.to_string()))
                        .with_context(|| format!("Failed to parse JSON response from {}", url));
                }
                None => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(ApiError::RateLimited.into());
                    }
                    warn!(url = %url, retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2; // Exponential backoff
                }
            }
        }
    }
}

#[async_trait]
impl RemoteSource for ApiClient {
    async fn fetch_chapters(&self) -> Result<Vec<Chapter>> {
        self.get("chapters").await
    }

    async fn fetch_sections(&self, chapter_id: i64) -> Result<Vec<Section>> {
        self.get(&format!("chapters/{}/sections", chapter_id)).await
    }

    async fn fetch_contents(&self, section_id: i64) -> Result<Vec<Content>> {
        self.get(&format!("sections/{}/content", section_id)).await
    }

    async fn fetch_terms(&self) -> Result<Vec<Term>> {
        self.get("terms").await
    }

    async fn fetch_related_sections(&self, term_id: i64) -> Result<Vec<Section>> {
        self.get(&format!("terms/{}/sections", term_id)).await
    }

    async fn fetch_quizzes(&self) -> Result<Vec<Quiz>> {
        self.get("quizzes").await
    }

    async fn fetch_questions(&self, quiz_id: i64) -> Result<Vec<Question>> {
        self.get(&format!("quizzes/{}/questions", quiz_id)).await
    }

    async fn fetch_answers(&self, question_id: i64) -> Result<Vec<Answer>> {
        self.get(&format!("questions/{}/answers", question_id)).await
    }
}
