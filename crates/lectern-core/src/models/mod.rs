//! Data models for textbook entities.
//!
//! This module contains the records synchronized from the content API and
//! stored in the local database:
//!
//! - `Chapter`, `Section`, `Content`: the textbook hierarchy
//! - `Term`, `TermSectionLink`: glossary terms and the sections they appear in
//! - `Quiz`, `Question`, `Answer`: quizzes with their question trees

pub mod content;
pub mod glossary;
pub mod quiz;

pub use content::{Chapter, Content, ContentType, Section};
pub use glossary::{Term, TermSectionLink};
pub use quiz::{Answer, Question, QuestionType, Quiz};

/// A record with a stable identity, stored with insert-or-replace semantics.
pub trait Record: Clone + Send + Sync + 'static {
    type Key: Ord + Clone + Send + Sync + 'static;

    fn key(&self) -> Self::Key;
}
