//! Durable storage for synchronized textbook records.
//!
//! The `ContentStore` trait is the contract repositories and sync routines
//! depend on: a live query stream and an insert-or-replace write per
//! dataset. `JsonDatabase` implements it over a single JSON document.

pub mod error;
pub mod json;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::models::{Answer, Chapter, Content, Question, Quiz, Section, Term, TermSectionLink};

pub use error::StoreError;
pub use json::JsonDatabase;

/// Relational store of textbook records.
///
/// `watch_*` streams emit the current rows when first polled and again
/// whenever the result changes. `insert_*` replaces rows with the same key.
#[async_trait]
pub trait ContentStore: Send + Sync {
    // ===== Content =====

    fn watch_chapters(&self) -> BoxStream<'static, Vec<Chapter>>;

    fn watch_sections(&self, chapter_id: i64) -> BoxStream<'static, Vec<Section>>;

    fn watch_contents(&self, section_id: i64) -> BoxStream<'static, Vec<Content>>;

    async fn insert_chapters(&self, chapters: Vec<Chapter>) -> Result<(), StoreError>;

    async fn insert_sections(&self, sections: Vec<Section>) -> Result<(), StoreError>;

    async fn insert_contents(&self, contents: Vec<Content>) -> Result<(), StoreError>;

    // ===== Glossary =====

    fn watch_terms(&self) -> BoxStream<'static, Vec<Term>>;

    /// Sections linked to `term_id`, in reading order.
    fn watch_related_sections(&self, term_id: i64) -> BoxStream<'static, Vec<Section>>;

    async fn insert_terms(&self, terms: Vec<Term>) -> Result<(), StoreError>;

    async fn insert_term_links(&self, links: Vec<TermSectionLink>) -> Result<(), StoreError>;

    // ===== Quizzes =====

    fn watch_quizzes(&self) -> BoxStream<'static, Vec<Quiz>>;

    fn watch_questions(&self, quiz_id: i64) -> BoxStream<'static, Vec<Question>>;

    fn watch_answers(&self, question_id: i64) -> BoxStream<'static, Vec<Answer>>;

    async fn insert_quizzes(&self, quizzes: Vec<Quiz>) -> Result<(), StoreError>;

    async fn insert_questions(&self, questions: Vec<Question>) -> Result<(), StoreError>;

    async fn insert_answers(&self, answers: Vec<Answer>) -> Result<(), StoreError>;
}
