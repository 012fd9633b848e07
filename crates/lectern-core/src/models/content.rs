use serde::{Deserialize, Serialize};

use super::Record;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "orderIndex", default)]
    pub order_index: i32,
}

impl Record for Chapter {
    type Key = i64;

    fn key(&self) -> i64 {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub id: i64,
    #[serde(rename = "chapterId")]
    pub chapter_id: i64,
    pub title: String,
    #[serde(rename = "orderIndex", default)]
    pub order_index: i32,
}

impl Record for Section {
    type Key = i64;

    fn key(&self) -> i64 {
        self.id
    }
}

/// Kind of payload carried by a content block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContentType {
    Text,
    Code,
    Image,
    Diagram,
    Interactive,
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContentType::Text => write!(f, "Text"),
            ContentType::Code => write!(f, "Code"),
            ContentType::Image => write!(f, "Image"),
            ContentType::Diagram => write!(f, "Diagram"),
            ContentType::Interactive => write!(f, "Interactive"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
    pub id: i64,
    #[serde(rename = "sectionId")]
    pub section_id: i64,
    pub title: String,
    #[serde(rename = "contentType")]
    pub content_type: ContentType,
    #[serde(rename = "contentData", default)]
    pub content_data: String,
    #[serde(rename = "orderIndex", default)]
    pub order_index: i32,
}

impl Record for Content {
    type Key = i64;

    fn key(&self) -> i64 {
        self.id
    }
}
