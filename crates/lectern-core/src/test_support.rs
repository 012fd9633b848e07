//! Fixtures shared by unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::api::RemoteSource;
use crate::models::{Answer, Chapter, Content, ContentType, Question, QuestionType, Quiz, Section, Term};

/// Scripted `RemoteSource` holding a tiny two-chapter textbook.
///
/// Operations are named after the collection they return
/// (`"chapters"`, `"sections"`, `"contents"`, `"terms"`,
/// `"related_sections"`, `"quizzes"`, `"questions"`, `"answers"`).
#[derive(Default)]
pub(crate) struct FakeRemote {
    chapters: Vec<Chapter>,
    sections: Vec<Section>,
    contents: Vec<Content>,
    terms: Vec<Term>,
    term_sections: Vec<(i64, i64)>,
    quizzes: Vec<Quiz>,
    questions: Vec<Question>,
    answers: Vec<Answer>,
    failing: HashSet<&'static str>,
    delays: HashMap<&'static str, Duration>,
    calls: Mutex<HashMap<&'static str, usize>>,
}

impl FakeRemote {
    pub(crate) fn textbook() -> Self {
        let chapter = |id: i64, title: &str| Chapter {
            id,
            title: title.to_string(),
            description: String::new(),
            order_index: id as i32,
        };
        let section = |id: i64, chapter_id: i64, order_index: i32| Section {
            id,
            chapter_id,
            title: format!("Section {}", id),
            order_index,
        };
        let content = |id: i64, section_id: i64| Content {
            id,
            section_id,
            title: format!("Block {}", id),
            content_type: ContentType::Text,
            content_data: "Lorem ipsum".to_string(),
            order_index: 1,
        };
        let term = |id: i64, word: &str| Term {
            id,
            term: word.to_string(),
            definition: format!("Definition of {}", word),
            section_id: None,
            chapter_id: None,
            category: None,
        };
        let question = |id: i64, text: &str| Question {
            id,
            quiz_id: 1,
            text: text.to_string(),
            question_type: QuestionType::SingleChoice,
            explanation: String::new(),
            points: 1,
        };
        let answer = |id: i64, question_id: i64, is_correct: bool| Answer {
            id,
            question_id,
            text: format!("Option {}", id),
            is_correct,
        };

        Self {
            chapters: vec![chapter(1, "Ownership"), chapter(2, "Traits")],
            sections: vec![section(11, 1, 1), section(12, 1, 2), section(21, 2, 1)],
            contents: vec![content(111, 11), content(121, 12), content(211, 21)],
            terms: vec![term(1, "borrowing"), term(2, "ownership")],
            term_sections: vec![(1, 11), (2, 11), (2, 21)],
            quizzes: vec![Quiz {
                id: 1,
                title: "Ownership basics".to_string(),
                description: String::new(),
                chapter_id: Some(1),
                section_id: None,
                difficulty: 1,
                time_limit: 0,
                passing_score: 60,
            }],
            questions: vec![question(101, "Who owns a moved value?"), question(102, "Can you borrow twice?")],
            answers: vec![answer(1001, 101, true), answer(1002, 101, false), answer(1003, 102, true)],
            ..Self::default()
        }
    }

    /// Make every call to `operation` fail.
    pub(crate) fn failing(mut self, operation: &'static str) -> Self {
        self.failing.insert(operation);
        self
    }

    /// Make every call to `operation` take `delay` before answering.
    pub(crate) fn slow(mut self, operation: &'static str, delay: Duration) -> Self {
        self.delays.insert(operation, delay);
        self
    }

    pub(crate) fn calls(&self, operation: &str) -> usize {
        let calls = self.calls.lock().unwrap();
        calls.get(operation).copied().unwrap_or(0)
    }

    pub(crate) fn questions_for(&self, quiz_id: i64) -> Vec<Question> {
        self.questions.iter().filter(|q| q.quiz_id == quiz_id).cloned().collect()
    }

    async fn record(&self, operation: &'static str) -> Result<()> {
        *self.calls.lock().unwrap().entry(operation).or_insert(0) += 1;
        if let Some(delay) = self.delays.get(operation) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing.contains(operation) {
            bail!("{} unavailable", operation);
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteSource for FakeRemote {
    async fn fetch_chapters(&self) -> Result<Vec<Chapter>> {
        self.record("chapters").await?;
        Ok(self.chapters.clone())
    }

    async fn fetch_sections(&self, chapter_id: i64) -> Result<Vec<Section>> {
        self.record("sections").await?;
        Ok(self.sections.iter().filter(|s| s.chapter_id == chapter_id).cloned().collect())
    }

    async fn fetch_contents(&self, section_id: i64) -> Result<Vec<Content>> {
        self.record("contents").await?;
        Ok(self.contents.iter().filter(|c| c.section_id == section_id).cloned().collect())
    }

    async fn fetch_terms(&self) -> Result<Vec<Term>> {
        self.record("terms").await?;
        Ok(self.terms.clone())
    }

    async fn fetch_related_sections(&self, term_id: i64) -> Result<Vec<Section>> {
        self.record("related_sections").await?;
        let ids: Vec<i64> = self
            .term_sections
            .iter()
            .filter(|(term, _)| *term == term_id)
            .map(|(_, section)| *section)
            .collect();
        Ok(self.sections.iter().filter(|s| ids.contains(&s.id)).cloned().collect())
    }

    async fn fetch_quizzes(&self) -> Result<Vec<Quiz>> {
        self.record("quizzes").await?;
        Ok(self.quizzes.clone())
    }

    async fn fetch_questions(&self, quiz_id: i64) -> Result<Vec<Question>> {
        self.record("questions").await?;
        Ok(self.questions_for(quiz_id))
    }

    async fn fetch_answers(&self, question_id: i64) -> Result<Vec<Answer>> {
        self.record("answers").await?;
        Ok(self.answers.iter().filter(|a| a.question_id == question_id).cloned().collect())
    }
}
