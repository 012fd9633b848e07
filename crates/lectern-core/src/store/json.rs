use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use tracing::{debug, warn};

use super::{ContentStore, StoreError};
use crate::models::{Answer, Chapter, Content, Question, Quiz, Record, Section, Term, TermSectionLink};

/// Name of the database document inside the data directory.
pub const DATABASE_FILE: &str = "database.json";

type Table<R> = BTreeMap<<R as Record>::Key, R>;

#[derive(Debug, Clone, Default)]
struct Tables {
    chapters: Table<Chapter>,
    sections: Table<Section>,
    contents: Table<Content>,
    terms: Table<Term>,
    term_links: Table<TermSectionLink>,
    quizzes: Table<Quiz>,
    questions: Table<Question>,
    answers: Table<Answer>,
}

/// On-disk shape: one array per table.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct Snapshot {
    chapters: Vec<Chapter>,
    sections: Vec<Section>,
    contents: Vec<Content>,
    terms: Vec<Term>,
    term_sections: Vec<TermSectionLink>,
    quizzes: Vec<Quiz>,
    questions: Vec<Question>,
    answers: Vec<Answer>,
}

fn index<R: Record>(rows: Vec<R>) -> Table<R> {
    rows.into_iter().map(|row| (row.key(), row)).collect()
}

fn rows<R: Record>(table: &Table<R>) -> Vec<R> {
    table.values().cloned().collect()
}

impl From<Snapshot> for Tables {
    fn from(s: Snapshot) -> Self {
        Self {
            chapters: index(s.chapters),
            sections: index(s.sections),
            contents: index(s.contents),
            terms: index(s.terms),
            term_links: index(s.term_sections),
            quizzes: index(s.quizzes),
            questions: index(s.questions),
            answers: index(s.answers),
        }
    }
}

impl From<&Tables> for Snapshot {
    fn from(t: &Tables) -> Self {
        Self {
            chapters: rows(&t.chapters),
            sections: rows(&t.sections),
            contents: rows(&t.contents),
            terms: rows(&t.terms),
            term_sections: rows(&t.term_links),
            quizzes: rows(&t.quizzes),
            questions: rows(&t.questions),
            answers: rows(&t.answers),
        }
    }
}

/// `ContentStore` over a single JSON document.
///
/// All tables live in memory behind a watch channel; every insert writes
/// the whole document (temp file + rename) before the new state becomes
/// visible to watchers.
pub struct JsonDatabase {
    path: Option<PathBuf>,
    state: watch::Sender<Arc<Tables>>,
    write_lock: Mutex<()>,
}

impl JsonDatabase {
    /// Open (or create) the database inside `data_dir`.
    ///
    /// A corrupt document is logged and replaced on the next write.
    pub async fn open(data_dir: &Path) -> Result<Self, StoreError> {
        let path = data_dir.join(DATABASE_FILE);
        let load_path = path.clone();
        let loaded = tokio::task::spawn_blocking(move || Self::load(&load_path))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))?;

        let tables = match loaded {
            Ok(snapshot) => Tables::from(snapshot),
            Err(StoreError::Serialization(e)) => {
                warn!(path = %path.display(), error = %e, "Database document is corrupt, starting empty");
                Tables::default()
            }
            Err(e) => return Err(e),
        };
        debug!(
            path = %path.display(),
            chapters = tables.chapters.len(),
            terms = tables.terms.len(),
            quizzes = tables.quizzes.len(),
            "Opened database"
        );

        let (state, _) = watch::channel(Arc::new(tables));
        Ok(Self {
            path: Some(path),
            state,
            write_lock: Mutex::new(()),
        })
    }

    /// A database that never touches disk.
    pub fn in_memory() -> Self {
        let (state, _) = watch::channel(Arc::new(Tables::default()));
        Self {
            path: None,
            state,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Drop every row and delete the database document.
    pub async fn clear(&self) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        if let Some(path) = self.path.clone() {
            tokio::task::spawn_blocking(move || match std::fs::remove_file(&path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(StoreError::Io(e)),
            })
            .await
            .map_err(|e| StoreError::Task(e.to_string()))??;
        }
        self.state.send_replace(Arc::new(Tables::default()));
        debug!("Cleared database");
        Ok(())
    }

    fn load(path: &Path) -> Result<Snapshot, StoreError> {
        if !path.exists() {
            return Ok(Snapshot::default());
        }
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    async fn persist(&self, tables: &Tables) -> Result<(), StoreError> {
        let Some(path) = self.path.clone() else {
            return Ok(());
        };
        let contents = serde_json::to_string_pretty(&Snapshot::from(tables))?;
        tokio::task::spawn_blocking(move || -> Result<(), StoreError> {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let tmp = path.with_extension("json.tmp");
            std::fs::write(&tmp, contents)?;
            std::fs::rename(&tmp, &path)?;
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }

    /// Insert-or-replace `rows` into the table chosen by `table`.
    async fn upsert<R, F>(&self, rows: Vec<R>, table: F) -> Result<(), StoreError>
    where
        R: Record,
        F: FnOnce(&mut Tables) -> &mut Table<R>,
    {
        let _guard = self.write_lock.lock().await;
        let mut next: Tables = (**self.state.borrow()).clone();
        let count = rows.len();
        let target = table(&mut next);
        for row in rows {
            target.insert(row.key(), row);
        }

        self.persist(&next).await?;
        self.state.send_replace(Arc::new(next));
        debug!(rows = count, "Stored rows");
        Ok(())
    }

    /// Live result of `query`; re-evaluated on every commit, emitted only
    /// when the result differs from the previous emission.
    fn watch_query<T, F>(&self, query: F) -> BoxStream<'static, Vec<T>>
    where
        T: PartialEq + Clone + Send + Sync + 'static,
        F: Fn(&Tables) -> Vec<T> + Send + Sync + 'static,
    {
        let rx = self.state.subscribe();
        stream::unfold((rx, None::<Vec<T>>, query), |(mut rx, last, query)| async move {
            loop {
                if last.is_some() {
                    rx.changed().await.ok()?;
                }
                let current = {
                    let tables = rx.borrow_and_update();
                    query(&tables)
                };
                if last.as_ref() != Some(&current) {
                    return Some((current.clone(), (rx, Some(current), query)));
                }
            }
        })
        .boxed()
    }
}

fn sorted_by<T, K: Ord>(mut rows: Vec<T>, key: impl Fn(&T) -> K) -> Vec<T> {
    rows.sort_by_key(|row| key(row));
    rows
}

#[async_trait]
impl ContentStore for JsonDatabase {
    // ===== Content =====

    fn watch_chapters(&self) -> BoxStream<'static, Vec<Chapter>> {
        self.watch_query(|t| sorted_by(rows(&t.chapters), |c| c.order_index))
    }

    fn watch_sections(&self, chapter_id: i64) -> BoxStream<'static, Vec<Section>> {
        self.watch_query(move |t| {
            let matching = t
                .sections
                .values()
                .filter(|s| s.chapter_id == chapter_id)
                .cloned()
                .collect();
            sorted_by(matching, |s: &Section| s.order_index)
        })
    }

    fn watch_contents(&self, section_id: i64) -> BoxStream<'static, Vec<Content>> {
        self.watch_query(move |t| {
            let matching = t
                .contents
                .values()
                .filter(|c| c.section_id == section_id)
                .cloned()
                .collect();
            sorted_by(matching, |c: &Content| c.order_index)
        })
    }

    async fn insert_chapters(&self, chapters: Vec<Chapter>) -> Result<(), StoreError> {
        self.upsert(chapters, |t| &mut t.chapters).await
    }

    async fn insert_sections(&self, sections: Vec<Section>) -> Result<(), StoreError> {
        self.upsert(sections, |t| &mut t.sections).await
    }

    async fn insert_contents(&self, contents: Vec<Content>) -> Result<(), StoreError> {
        self.upsert(contents, |t| &mut t.contents).await
    }

    // ===== Glossary =====

    fn watch_terms(&self) -> BoxStream<'static, Vec<Term>> {
        self.watch_query(|t| sorted_by(rows(&t.terms), |term| term.term.clone()))
    }

    fn watch_related_sections(&self, term_id: i64) -> BoxStream<'static, Vec<Section>> {
        self.watch_query(move |t| {
            let linked = t
                .term_links
                .values()
                .filter(|link| link.term_id == term_id)
                .filter_map(|link| t.sections.get(&link.section_id))
                .cloned()
                .collect();
            sorted_by(linked, |s: &Section| (s.chapter_id, s.order_index))
        })
    }

    async fn insert_terms(&self, terms: Vec<Term>) -> Result<(), StoreError> {
        self.upsert(terms, |t| &mut t.terms).await
    }

    async fn insert_term_links(&self, links: Vec<TermSectionLink>) -> Result<(), StoreError> {
        self.upsert(links, |t| &mut t.term_links).await
    }

    // ===== Quizzes =====

    fn watch_quizzes(&self) -> BoxStream<'static, Vec<Quiz>> {
        // Table is keyed by id, so values are already in id order.
        self.watch_query(|t| rows(&t.quizzes))
    }

    fn watch_questions(&self, quiz_id: i64) -> BoxStream<'static, Vec<Question>> {
        self.watch_query(move |t| {
            t.questions
                .values()
                .filter(|q| q.quiz_id == quiz_id)
                .cloned()
                .collect()
        })
    }

    fn watch_answers(&self, question_id: i64) -> BoxStream<'static, Vec<Answer>> {
        self.watch_query(move |t| {
            t.answers
                .values()
                .filter(|a| a.question_id == question_id)
                .cloned()
                .collect()
        })
    }

    async fn insert_quizzes(&self, quizzes: Vec<Quiz>) -> Result<(), StoreError> {
        self.upsert(quizzes, |t| &mut t.quizzes).await
    }

    async fn insert_questions(&self, questions: Vec<Question>) -> Result<(), StoreError> {
        self.upsert(questions, |t| &mut t.questions).await
    }

    async fn insert_answers(&self, answers: Vec<Answer>) -> Result<(), StoreError> {
        self.upsert(answers, |t| &mut t.answers).await
    }
}
