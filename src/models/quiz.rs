// src/models/quiz.rs

use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;

/// Represents the 'quizzes' table in the database.
/// Read-only for the attempt engine; authored elsewhere.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Quiz {
    pub id: i64,

    pub title: String,

    pub total_questions: i32,

    /// Overall duration. Zero means the attempt has no overall deadline.
    pub duration_minutes: i32,

    pub total_marks: f64,

    pub passing_marks: f64,

    pub negative_marking: bool,

    /// Marks deducted per incorrect answer when `negative_marking` is on.
    pub negative_marks_per_question: f64,

    /// Default per-question timer in seconds, used when a question has none.
    pub time_per_question: Option<i32>,

    /// Maximum completed attempts per user. `None` or `0` means unlimited.
    pub attempt_limit: Option<i32>,

    /// Publication status: 'active', 'draft', 'archived'.
    pub status: String,

    /// Free quizzes are not gated by enrollment quota.
    pub is_free: bool,

    pub show_explanations: bool,

    pub show_hints: bool,
}

impl Quiz {
    pub fn is_active(&self) -> bool {
        self.status == "active"
    }

    pub fn attempt_limit(&self) -> Option<i64> {
        self.attempt_limit
            .filter(|limit| *limit > 0)
            .map(i64::from)
    }
}

/// Represents the 'questions' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub quiz_id: i64,
    pub text: String,
    pub image_url: Option<String>,
    pub marks: f64,

    /// Per-question timer in seconds; overrides the quiz default.
    pub time_limit: Option<i32>,

    pub order_num: i32,
    pub explanation: Option<String>,
    pub hint: Option<String>,
}

/// Represents the 'question_options' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct QuizOption {
    pub id: i64,
    pub question_id: i64,
    pub text: String,
    pub image_url: Option<String>,
    pub is_correct: bool,
    pub order_num: i32,
}

/// Quiz header sent to the client when an attempt starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizSummary {
    pub id: i64,
    pub title: String,
    pub total_questions: i32,
    pub duration_minutes: i32,
    pub total_marks: f64,
    pub passing_marks: f64,
    pub negative_marking: bool,
    pub negative_marks_per_question: f64,
    pub time_per_question: Option<i32>,
}

impl From<&Quiz> for QuizSummary {
    fn from(quiz: &Quiz) -> Self {
        Self {
            id: quiz.id,
            title: quiz.title.clone(),
            total_questions: quiz.total_questions,
            duration_minutes: quiz.duration_minutes,
            total_marks: quiz.total_marks,
            passing_marks: quiz.passing_marks,
            negative_marking: quiz.negative_marking,
            negative_marks_per_question: quiz.negative_marks_per_question,
            time_per_question: quiz.time_per_question,
        }
    }
}

/// DTO for sending an option to the client (excludes `is_correct`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicOption {
    pub id: i64,
    pub text: String,
    pub image_url: Option<String>,
}

/// DTO for sending a question to the client (excludes the explanation).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicQuestion {
    pub id: i64,
    pub text: String,
    pub image_url: Option<String>,
    pub marks: f64,

    /// Effective per-question timer in seconds.
    pub time_limit: Option<i32>,

    /// Only present when the quiz shows hints.
    pub hint: Option<String>,

    pub options: Vec<PublicOption>,
}

impl PublicQuestion {
    /// Builds the client view. `options` must already be in display order.
    pub fn new(quiz: &Quiz, question: &Question, options: &[QuizOption]) -> Self {
        Self {
            id: question.id,
            text: question.text.clone(),
            image_url: question.image_url.clone(),
            marks: question.marks,
            time_limit: question.time_limit.or(quiz.time_per_question),
            hint: if quiz.show_hints {
                question.hint.clone()
            } else {
                None
            },
            options: options
                .iter()
                .map(|o| PublicOption {
                    id: o.id,
                    text: o.text.clone(),
                    image_url: o.image_url.clone(),
                })
                .collect(),
        }
    }
}
