// src/services/recorder.rs

use chrono::{DateTime, Utc};

use crate::{
    error::AppError,
    models::{
        attempt::Answer,
        quiz::{Question, Quiz, QuizOption},
    },
    services::scoring::{self, MarkingScheme},
    store::StoreTx,
};

/// The unique correct option of a question.
pub fn correct_option(question: &Question, options: &[QuizOption]) -> Result<i64, AppError> {
    let mut correct = options.iter().filter(|o| o.is_correct);
    match (correct.next(), correct.next()) {
        (Some(option), None) => Ok(option.id),
        _ => Err(AppError::InternalServerError(format!(
            "Question {} must have exactly one correct option",
            question.id
        ))),
    }
}

/// Grades a selection for one question. `None` records it as unanswered.
pub fn grade(
    attempt_id: i64,
    quiz: &Quiz,
    question: &Question,
    options: &[QuizOption],
    selected_option_id: Option<i64>,
    time_taken: Option<i32>,
    answered_at: DateTime<Utc>,
) -> Result<Answer, AppError> {
    let correct_id = correct_option(question, options)?;

    if let Some(selected) = selected_option_id {
        if !options.iter().any(|o| o.id == selected) {
            return Err(AppError::BadRequest(format!(
                "Option {} does not belong to question {}",
                selected, question.id
            )));
        }
    }

    let is_correct = selected_option_id == Some(correct_id);
    let marks_obtained = scoring::question_marks(
        MarkingScheme::from(quiz),
        question.marks,
        is_correct,
        selected_option_id.is_some(),
    );

    Ok(Answer {
        attempt_id,
        question_id: question.id,
        selected_option_id,
        is_correct,
        marks_obtained,
        time_taken,
        answered_at,
    })
}

/// Writes the answer, replacing any earlier one for the same question.
pub async fn record(tx: &mut dyn StoreTx, answer: &Answer) -> Result<(), AppError> {
    tx.upsert_answer(answer).await?;
    tracing::debug!(
        "Recorded answer for attempt {} question {} (correct: {}, marks: {})",
        answer.attempt_id,
        answer.question_id,
        answer.is_correct,
        answer.marks_obtained
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiz(negative_marking: bool) -> Quiz {
        Quiz {
            id: 1,
            title: "Grading".to_string(),
            total_questions: 1,
            duration_minutes: 0,
            total_marks: 4.0,
            passing_marks: 2.0,
            negative_marking,
            negative_marks_per_question: 1.0,
            time_per_question: None,
            attempt_limit: None,
            status: "active".to_string(),
            is_free: true,
            show_explanations: true,
            show_hints: false,
        }
    }

    fn question() -> Question {
        Question {
            id: 10,
            quiz_id: 1,
            text: "2 + 2?".to_string(),
            image_url: None,
            marks: 4.0,
            time_limit: None,
            order_num: 1,
            explanation: None,
            hint: None,
        }
    }

    fn option(id: i64, is_correct: bool) -> QuizOption {
        QuizOption {
            id,
            question_id: 10,
            text: id.to_string(),
            image_url: None,
            is_correct,
            order_num: id as i32,
        }
    }

    #[test]
    fn test_grade_correct_wrong_and_unanswered() {
        let options = vec![option(100, true), option(101, false)];
        let now = Utc::now();

        let right = grade(1, &quiz(true), &question(), &options, Some(100), Some(5), now).unwrap();
        assert!(right.is_correct);
        assert_eq!(right.marks_obtained, 4.0);

        let wrong = grade(1, &quiz(true), &question(), &options, Some(101), None, now).unwrap();
        assert!(!wrong.is_correct);
        assert_eq!(wrong.marks_obtained, -1.0);

        let skipped = grade(1, &quiz(true), &question(), &options, None, None, now).unwrap();
        assert!(!skipped.is_correct);
        assert_eq!(skipped.marks_obtained, 0.0);
        assert_eq!(skipped.selected_option_id, None);
    }

    #[test]
    fn test_foreign_option_is_rejected() {
        let options = vec![option(100, true), option(101, false)];
        let result = grade(1, &quiz(false), &question(), &options, Some(999), None, Utc::now());
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_question_without_single_correct_option_is_a_data_error() {
        let none = vec![option(100, false)];
        assert!(matches!(
            correct_option(&question(), &none),
            Err(AppError::InternalServerError(_))
        ));

        let two = vec![option(100, true), option(101, true)];
        assert!(correct_option(&question(), &two).is_err());
    }
}
