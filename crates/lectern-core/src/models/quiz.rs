use serde::{Deserialize, Serialize};

use super::Record;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quiz {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "chapterId", default)]
    pub chapter_id: Option<i64>,
    #[serde(rename = "sectionId", default)]
    pub section_id: Option<i64>,
    /// 1 = easy, 2 = medium, 3 = hard
    #[serde(default = "default_difficulty")]
    pub difficulty: i32,
    /// Minutes; 0 means untimed
    #[serde(rename = "timeLimit", default)]
    pub time_limit: i32,
    /// Percentage needed to pass
    #[serde(rename = "passingScore", default = "default_passing_score")]
    pub passing_score: i32,
}

fn default_difficulty() -> i32 {
    1
}

fn default_passing_score() -> i32 {
    60
}

impl Record for Quiz {
    type Key = i64;

    fn key(&self) -> i64 {
        self.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestionType {
    SingleChoice,
    MultipleChoice,
    TrueFalse,
    TextInput,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    #[serde(rename = "quizId")]
    pub quiz_id: i64,
    pub text: String,
    #[serde(rename = "questionType")]
    pub question_type: QuestionType,
    #[serde(default)]
    pub explanation: String,
    #[serde(default = "default_points")]
    pub points: i32,
}

fn default_points() -> i32 {
    1
}

impl Record for Question {
    type Key = i64;

    fn key(&self) -> i64 {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub id: i64,
    #[serde(rename = "questionId")]
    pub question_id: i64,
    pub text: String,
    #[serde(rename = "isCorrect", default)]
    pub is_correct: bool,
}

impl Record for Answer {
    type Key = i64;

    fn key(&self) -> i64 {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quiz_defaults() {
        let quiz: Quiz = serde_json::from_str(r#"{"id": 4, "title": "Borrowing"}"#).unwrap();
        assert_eq!(quiz.difficulty, 1);
        assert_eq!(quiz.passing_score, 60);
        assert_eq!(quiz.time_limit, 0);
        assert_eq!(quiz.chapter_id, None);
    }

    #[test]
    fn test_question_type_wire_format() {
        let q: Question = serde_json::from_str(
            r#"{"id": 1, "quizId": 4, "text": "Is &mut unique?", "questionType": "TRUE_FALSE"}"#,
        )
        .unwrap();
        assert_eq!(q.question_type, QuestionType::TrueFalse);
        assert_eq!(q.points, 1);
    }
}
