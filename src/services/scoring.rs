// src/services/scoring.rs

//! Pure marking rules. No I/O.

use crate::models::quiz::Quiz;

/// Marking rules of a quiz, copied out of the snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarkingScheme {
    pub negative_marking: bool,
    pub negative_marks_per_question: f64,
}

impl From<&Quiz> for MarkingScheme {
    fn from(quiz: &Quiz) -> Self {
        Self {
            negative_marking: quiz.negative_marking,
            negative_marks_per_question: quiz.negative_marks_per_question,
        }
    }
}

/// Marks for a single question.
///
/// Correct answers earn `marks`. Incorrect answers cost the penalty when
/// negative marking is on. Unanswered questions earn nothing. The result is
/// never clamped; see [`clamp_total`].
pub fn question_marks(scheme: MarkingScheme, marks: f64, is_correct: bool, was_answered: bool) -> f64 {
    match (was_answered, is_correct) {
        (true, true) => marks,
        (true, false) if scheme.negative_marking => -scheme.negative_marks_per_question,
        _ => 0.0,
    }
}

/// Attempt-level floor: a raw total below zero is reported as zero.
pub fn clamp_total(raw_total: f64) -> f64 {
    raw_total.max(0.0)
}

/// Sums per-question marks and applies [`clamp_total`].
pub fn aggregate<I>(marks: I) -> f64
where
    I: IntoIterator<Item = f64>,
{
    clamp_total(marks.into_iter().sum())
}

/// Share of `total` obtained, in percent, rounded to two decimals.
pub fn percentage(obtained: f64, total: f64) -> f64 {
    if total <= 0.0 {
        return 0.0;
    }
    round2(obtained / total * 100.0)
}

pub fn passed(score: f64, passing_marks: f64) -> bool {
    score >= passing_marks
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
