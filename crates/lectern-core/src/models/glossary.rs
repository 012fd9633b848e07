use serde::{Deserialize, Serialize};

use super::Record;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Term {
    pub id: i64,
    pub term: String,
    pub definition: String,
    #[serde(rename = "sectionId", default)]
    pub section_id: Option<i64>,
    #[serde(rename = "chapterId", default)]
    pub chapter_id: Option<i64>,
    #[serde(default)]
    pub category: Option<String>,
}

impl Record for Term {
    type Key = i64;

    fn key(&self) -> i64 {
        self.id
    }
}

/// Cross reference between a glossary term and a section that uses it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermSectionLink {
    #[serde(rename = "termId")]
    pub term_id: i64,
    #[serde(rename = "sectionId")]
    pub section_id: i64,
}

impl Record for TermSectionLink {
    type Key = (i64, i64);

    fn key(&self) -> (i64, i64) {
        (self.term_id, self.section_id)
    }
}
