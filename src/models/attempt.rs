// src/models/attempt.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};
use validator::Validate;

use crate::models::quiz::{PublicQuestion, QuizSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    InProgress,
    Completed,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::InProgress => "in_progress",
            AttemptStatus::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "in_progress" => Some(AttemptStatus::InProgress),
            "completed" => Some(AttemptStatus::Completed),
            _ => None,
        }
    }
}

/// One user's traversal of one quiz.
#[derive(Debug, Clone, Serialize)]
pub struct Attempt {
    pub id: i64,
    pub user_id: i64,
    pub quiz_id: i64,
    pub attempt_number: i32,
    pub status: AttemptStatus,

    /// Shuffled question ids, fixed at creation.
    /// `None` when the stored value is missing or unreadable.
    pub question_order: Option<Vec<i64>>,

    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub total_marks_obtained: Option<f64>,
    pub percentage: Option<f64>,

    /// Denominator and verdict frozen at submit time, so later authoring
    /// edits do not change a finished result.
    pub total_marks: Option<f64>,
    pub passed: Option<bool>,

    /// Overall deadline, issued by the server.
    pub ends_at: Option<DateTime<Utc>>,
}

impl Attempt {
    pub fn is_in_progress(&self) -> bool {
        self.status == AttemptStatus::InProgress
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.ends_at.is_some_and(|ends_at| now >= ends_at)
    }

    /// Seconds left until `ends_at`, floored at zero.
    pub fn time_remaining(&self, now: DateTime<Utc>) -> Option<i64> {
        self.ends_at
            .map(|ends_at| (ends_at - now).num_seconds().max(0))
    }
}

/// Raw 'quiz_attempts' row. The order column is decoded leniently so a
/// corrupt value surfaces as a missing order instead of a query failure.
#[derive(Debug, FromRow)]
pub struct AttemptRow {
    pub id: i64,
    pub user_id: i64,
    pub quiz_id: i64,
    pub attempt_number: i32,
    pub status: String,
    pub question_order: Option<Json<serde_json::Value>>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub total_marks_obtained: Option<f64>,
    pub percentage: Option<f64>,
    pub total_marks: Option<f64>,
    pub passed: Option<bool>,
    pub ends_at: Option<DateTime<Utc>>,
}

impl TryFrom<AttemptRow> for Attempt {
    type Error = String;

    fn try_from(row: AttemptRow) -> Result<Self, Self::Error> {
        let status = AttemptStatus::parse(&row.status)
            .ok_or_else(|| format!("unknown attempt status '{}'", row.status))?;
        let question_order = row
            .question_order
            .and_then(|Json(value)| serde_json::from_value::<Vec<i64>>(value).ok());

        Ok(Attempt {
            id: row.id,
            user_id: row.user_id,
            quiz_id: row.quiz_id,
            attempt_number: row.attempt_number,
            status,
            question_order,
            started_at: row.started_at,
            completed_at: row.completed_at,
            total_marks_obtained: row.total_marks_obtained,
            percentage: row.percentage,
            total_marks: row.total_marks,
            passed: row.passed,
            ends_at: row.ends_at,
        })
    }
}

/// Values for inserting a fresh attempt.
#[derive(Debug, Clone)]
pub struct NewAttempt {
    pub user_id: i64,
    pub quiz_id: i64,
    pub attempt_number: i32,
    pub question_order: Vec<i64>,
    pub started_at: DateTime<Utc>,
    pub ends_at: Option<DateTime<Utc>>,
}

/// Figures written when an attempt is completed.
#[derive(Debug, Clone, Copy)]
pub struct AttemptTotals {
    pub score: f64,
    pub total_marks: f64,
    pub percentage: f64,
    pub passed: bool,
    pub completed_at: DateTime<Utc>,
}

/// Represents the 'attempt_answers' table; unique per (attempt_id, question_id).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Answer {
    pub attempt_id: i64,
    pub question_id: i64,

    /// `None` means the question was left unanswered (e.g. timer expiry).
    pub selected_option_id: Option<i64>,

    pub is_correct: bool,
    pub marks_obtained: f64,

    /// Seconds the student spent on the question, as reported by the client.
    pub time_taken: Option<i32>,

    pub answered_at: DateTime<Utc>,
}

/// DTO for moving to the next question.
#[derive(Debug, Deserialize, Validate)]
pub struct AdvanceRequest {
    /// Index (within the attempt's question order) of the question being answered.
    #[validate(range(min = 0))]
    pub current_index: i32,

    pub selected_option_id: Option<i64>,

    #[validate(range(min = 0, max = 86400))]
    pub time_taken: Option<i32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StartAttemptResponse {
    pub attempt_id: i64,
    pub resumed: bool,
    pub quiz: QuizSummary,
    pub current_index: usize,
    pub total_questions: usize,
    pub ends_at: Option<DateTime<Utc>>,
    pub time_remaining: Option<i64>,
    pub question: PublicQuestion,
}

/// Result of starting a quiz. Resuming a fully answered attempt submits it.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StartOutcome {
    InProgress(StartAttemptResponse),
    Completed(AttemptResult),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AdvanceResponse {
    pub is_last_question: bool,
    pub next_index: usize,
    pub total_questions: usize,
    pub ends_at: Option<DateTime<Utc>>,
    pub time_remaining: Option<i64>,
    pub question: Option<PublicQuestion>,
}

/// Per-question line of a graded attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionBreakdown {
    pub question_id: i64,
    pub selected_option_id: Option<i64>,
    pub correct_option_id: Option<i64>,
    pub is_correct: bool,
    pub marks_obtained: f64,
    pub explanation: Option<String>,
    pub hint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptResult {
    pub attempt_id: i64,
    pub score: f64,
    pub total_marks: f64,
    pub percentage: f64,
    pub passed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub breakdown: Vec<QuestionBreakdown>,
}
