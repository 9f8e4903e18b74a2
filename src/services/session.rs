// src/services/session.rs

//! Quiz session state machine: `NOT_STARTED -> IN_PROGRESS -> COMPLETED`.
//!
//! Nothing is kept in memory between calls. The current position of an
//! attempt is the number of persisted answers, so a retried `advance`
//! overwrites the same answer row instead of moving further.
//!
//! Quiz and question snapshots are read before a transaction is opened.
//! Inside one, cache misses are served on the transaction itself.

use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Duration, Utc};

use crate::{
    error::AppError,
    models::{
        attempt::{
            AdvanceResponse, Answer, Attempt, AttemptResult, AttemptTotals, NewAttempt,
            QuestionBreakdown, StartAttemptResponse, StartOutcome,
        },
        quiz::{PublicQuestion, Question, Quiz, QuizSummary},
    },
    services::{
        cache::QuestionCache,
        entitlement,
        notify::{self, AttemptCompleted, Notifier},
        recorder, scoring,
    },
    store::{AttemptStore, StoreTx},
    utils::shuffle,
};

pub struct SessionEngine {
    store: Arc<dyn AttemptStore>,
    cache: QuestionCache,
    notifier: Arc<dyn Notifier>,
}

impl SessionEngine {
    pub fn new(store: Arc<dyn AttemptStore>, cache: QuestionCache, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            store,
            cache,
            notifier,
        }
    }

    pub fn cache(&self) -> &QuestionCache {
        &self.cache
    }

    /// Starts a new attempt, or resumes the user's in-progress one.
    pub async fn start(&self, user_id: i64, quiz_id: i64) -> Result<StartOutcome, AppError> {
        let quiz = self
            .cache
            .get_quiz(quiz_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Quiz not found".to_string()))?;
        if !quiz.is_active() {
            return Err(AppError::QuizInactive("Quiz is not active".to_string()));
        }

        let questions = self.cache.get_questions(quiz_id).await?;
        if questions.is_empty() {
            return Err(AppError::NoQuestions("Quiz has no questions".to_string()));
        }

        let mut tx = self.store.begin().await?;

        // Locks the enrollment rows for the rest of the transaction.
        let quota = entitlement::check_quota(tx.as_mut(), user_id, &quiz).await?;

        if let Some(attempt) = tx.find_in_progress(user_id, quiz_id).await? {
            return self.resume(tx, &quiz, &questions, attempt).await;
        }

        let completed = tx.count_completed(user_id, quiz_id).await?;
        if let Some(limit) = quiz.attempt_limit() {
            if completed >= limit {
                return Err(AppError::AttemptLimitReached(format!(
                    "Attempt limit of {} reached for this quiz",
                    limit
                )));
            }
        }

        if quota.is_exhausted() {
            return Err(AppError::QuotaExceeded(
                "No remaining attempts for this quiz".to_string(),
            ));
        }

        let now = Utc::now();
        let new_attempt = NewAttempt {
            user_id,
            quiz_id,
            attempt_number: i32::try_from(completed + 1).unwrap_or(i32::MAX),
            question_order: shuffle::question_order(&questions),
            started_at: now,
            ends_at: deadline(&quiz, now),
        };

        let Some(attempt) = tx.insert_attempt(&new_attempt).await? else {
            // Another request created the attempt first; resume theirs.
            drop(tx);
            tracing::info!(
                "Concurrent start for user {} quiz {}, resuming existing attempt",
                user_id,
                quiz_id
            );
            let mut tx = self.store.begin().await?;
            let attempt = tx.find_in_progress(user_id, quiz_id).await?.ok_or_else(|| {
                AppError::Conflict("Attempt start conflicted, please retry".to_string())
            })?;
            return self.resume(tx, &quiz, &questions, attempt).await;
        };

        entitlement::consume_attempt(tx.as_mut(), user_id, &quiz).await?;
        tx.commit().await?;

        tracing::info!(
            "Started attempt {} (#{}) for user {} on quiz {}",
            attempt.id,
            attempt.attempt_number,
            user_id,
            quiz_id
        );

        let order = new_attempt.question_order;
        let question = self.question_at(&quiz, &questions, &order, 0).await?;

        Ok(StartOutcome::InProgress(StartAttemptResponse {
            attempt_id: attempt.id,
            resumed: false,
            quiz: QuizSummary::from(quiz.as_ref()),
            current_index: 0,
            total_questions: order.len(),
            ends_at: attempt.ends_at,
            time_remaining: attempt.time_remaining(now),
            question,
        }))
    }

    /// Picks up an in-progress attempt at its first unanswered question.
    async fn resume(
        &self,
        mut tx: Box<dyn StoreTx>,
        quiz: &Quiz,
        questions: &[Question],
        attempt: Attempt,
    ) -> Result<StartOutcome, AppError> {
        let order = ensure_order(tx.as_mut(), &attempt, questions).await?;
        let answered = usize::try_from(tx.count_answers(attempt.id).await?).unwrap_or(0);

        if answered >= order.len() {
            tracing::info!("Attempt {} fully answered on resume, submitting", attempt.id);
            let result = self.finalize(tx, quiz, questions, &attempt, &order).await?;
            return Ok(StartOutcome::Completed(result));
        }

        // Persists a rebuilt order, if there was one.
        tx.commit().await?;

        tracing::info!(
            "Resumed attempt {} for user {} at question {}",
            attempt.id,
            attempt.user_id,
            answered
        );

        let question = self.question_at(quiz, questions, &order, answered).await?;

        Ok(StartOutcome::InProgress(StartAttemptResponse {
            attempt_id: attempt.id,
            resumed: true,
            quiz: QuizSummary::from(quiz),
            current_index: answered,
            total_questions: order.len(),
            ends_at: attempt.ends_at,
            time_remaining: attempt.time_remaining(Utc::now()),
            question,
        }))
    }

    /// Grades the question at `current_index` and moves to the next one.
    pub async fn advance(
        &self,
        user_id: i64,
        attempt_id: i64,
        current_index: usize,
        selected_option_id: Option<i64>,
        time_taken: Option<i32>,
    ) -> Result<AdvanceResponse, AppError> {
        let peeked = self.peek_owned(attempt_id, user_id).await?;
        let quiz = self.quiz_for(&peeked).await?;
        let questions = self.cache.get_questions(peeked.quiz_id).await?;

        let mut tx = self.store.begin().await?;
        let attempt = load_owned(tx.as_mut(), attempt_id, user_id).await?;

        if !attempt.is_in_progress() {
            return Err(AppError::Conflict(
                "Attempt has already been submitted".to_string(),
            ));
        }

        let now = Utc::now();
        if attempt.is_expired(now) {
            return Err(AppError::TimeExpired(
                "Time is up for this attempt, please submit".to_string(),
            ));
        }

        let order = ensure_order(tx.as_mut(), &attempt, &questions).await?;

        if current_index >= order.len() {
            return Err(AppError::BadRequest(format!(
                "Question index {} is out of range",
                current_index
            )));
        }

        let answered = usize::try_from(tx.count_answers(attempt.id).await?).unwrap_or(0);
        if current_index > answered {
            return Err(AppError::BadRequest(format!(
                "Question {} has not been reached yet",
                current_index
            )));
        }

        let question = find_question(&questions, order[current_index])?;
        let options = self.cache.get_options_in(tx.as_mut(), question.id).await?;
        let answer = recorder::grade(
            attempt.id,
            &quiz,
            question,
            &options,
            selected_option_id,
            time_taken,
            now,
        )?;
        recorder::record(tx.as_mut(), &answer).await?;
        tx.commit().await?;

        let next_index = current_index + 1;
        let question = if next_index < order.len() {
            Some(self.question_at(&quiz, &questions, &order, next_index).await?)
        } else {
            None
        };

        Ok(AdvanceResponse {
            is_last_question: question.is_none(),
            next_index,
            total_questions: order.len(),
            ends_at: attempt.ends_at,
            time_remaining: attempt.time_remaining(Utc::now()),
            question,
        })
    }

    /// Completes the attempt. Submitting a completed attempt returns its
    /// stored result.
    pub async fn submit(&self, user_id: i64, attempt_id: i64) -> Result<AttemptResult, AppError> {
        let peeked = self.peek_owned(attempt_id, user_id).await?;
        let quiz = self.quiz_for(&peeked).await?;
        let questions = self.cache.get_questions(peeked.quiz_id).await?;

        let mut tx = self.store.begin().await?;
        let attempt = load_owned(tx.as_mut(), attempt_id, user_id).await?;

        if !attempt.is_in_progress() {
            tracing::debug!("Attempt {} already submitted, returning stored result", attempt.id);
            let answers = tx.list_answers(attempt.id).await?;
            drop(tx);
            return self.stored_result(&quiz, &questions, &attempt, &answers).await;
        }

        let order = ensure_order(tx.as_mut(), &attempt, &questions).await?;
        self.finalize(tx, &quiz, &questions, &attempt, &order).await
    }

    /// Read-only result of a completed attempt.
    pub async fn get_result(&self, user_id: i64, attempt_id: i64) -> Result<AttemptResult, AppError> {
        // Read-only; dropped without commit.
        let mut tx = self.store.begin().await?;
        let attempt = load_owned(tx.as_mut(), attempt_id, user_id).await?;
        if attempt.is_in_progress() {
            return Err(AppError::Conflict(
                "Attempt has not been submitted yet".to_string(),
            ));
        }
        let answers = tx.list_answers(attempt.id).await?;
        drop(tx);

        let quiz = self.quiz_for(&attempt).await?;
        let questions = self.cache.get_questions(attempt.quiz_id).await?;
        self.stored_result(&quiz, &questions, &attempt, &answers).await
    }

    /// Aggregates persisted answers, flips the attempt to completed and
    /// commits. The completion notice goes out only after the commit.
    async fn finalize(
        &self,
        mut tx: Box<dyn StoreTx>,
        quiz: &Quiz,
        questions: &[Question],
        attempt: &Attempt,
        order: &[i64],
    ) -> Result<AttemptResult, AppError> {
        let answers = tx.list_answers(attempt.id).await?;
        let by_question: HashMap<i64, &Answer> =
            answers.iter().map(|a| (a.question_id, a)).collect();

        let score = scoring::aggregate(
            order
                .iter()
                .map(|id| by_question.get(id).map_or(0.0, |a| a.marks_obtained)),
        );
        let total_marks = total_marks(questions, order);
        let totals = AttemptTotals {
            score,
            total_marks,
            percentage: scoring::percentage(score, total_marks),
            passed: scoring::passed(score, quiz.passing_marks),
            completed_at: Utc::now(),
        };

        let completed = tx.complete_attempt(attempt.id, &totals).await?;
        tx.commit().await?;

        tracing::info!(
            "Submitted attempt {}: score {}/{} ({}%), passed: {}",
            attempt.id,
            score,
            total_marks,
            totals.percentage,
            totals.passed
        );

        notify::dispatch(
            self.notifier.clone(),
            AttemptCompleted {
                attempt_id: attempt.id,
                user_id: attempt.user_id,
                quiz_id: attempt.quiz_id,
                score,
                percentage: totals.percentage,
                passed: totals.passed,
            },
        );

        self.build_result(quiz, questions, &completed, order, &answers)
            .await
    }

    /// Result of an already-completed attempt from its stored totals.
    async fn stored_result(
        &self,
        quiz: &Quiz,
        questions: &[Question],
        attempt: &Attempt,
        answers: &[Answer],
    ) -> Result<AttemptResult, AppError> {
        let order = match &attempt.question_order {
            Some(order) if shuffle::is_valid_order(order, questions) => order.clone(),
            _ => questions.iter().map(|q| q.id).collect(),
        };
        self.build_result(quiz, questions, attempt, &order, answers)
            .await
    }

    async fn build_result(
        &self,
        quiz: &Quiz,
        questions: &[Question],
        attempt: &Attempt,
        order: &[i64],
        answers: &[Answer],
    ) -> Result<AttemptResult, AppError> {
        let by_question: HashMap<i64, &Answer> =
            answers.iter().map(|a| (a.question_id, a)).collect();

        let mut breakdown = Vec::with_capacity(order.len());
        for question_id in order {
            let question = find_question(questions, *question_id)?;
            let options = self.cache.get_options(question.id).await?;
            let answer = by_question.get(question_id);

            breakdown.push(QuestionBreakdown {
                question_id: question.id,
                selected_option_id: answer.and_then(|a| a.selected_option_id),
                correct_option_id: recorder::correct_option(question, &options).ok(),
                is_correct: answer.is_some_and(|a| a.is_correct),
                marks_obtained: answer.map_or(0.0, |a| a.marks_obtained),
                explanation: quiz
                    .show_explanations
                    .then(|| question.explanation.clone())
                    .flatten(),
                hint: quiz.show_hints.then(|| question.hint.clone()).flatten(),
            });
        }

        // Figures frozen at submit win over the current snapshot.
        let score = attempt.total_marks_obtained.unwrap_or(0.0);
        let total_marks = attempt
            .total_marks
            .unwrap_or_else(|| total_marks(questions, order));

        Ok(AttemptResult {
            attempt_id: attempt.id,
            score,
            total_marks,
            percentage: attempt
                .percentage
                .unwrap_or_else(|| scoring::percentage(score, total_marks)),
            passed: attempt
                .passed
                .unwrap_or_else(|| scoring::passed(score, quiz.passing_marks)),
            completed_at: attempt.completed_at,
            breakdown,
        })
    }

    /// Unlocked read used to find the attempt's quiz before a transaction
    /// is opened. The attempt is locked and checked again inside it.
    async fn peek_owned(&self, attempt_id: i64, user_id: i64) -> Result<Attempt, AppError> {
        let attempt = self
            .store
            .load_attempt(attempt_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Attempt not found".to_string()))?;
        ensure_owner(&attempt, user_id)?;
        Ok(attempt)
    }

    async fn quiz_for(&self, attempt: &Attempt) -> Result<Arc<Quiz>, AppError> {
        self.cache
            .get_quiz(attempt.quiz_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Quiz not found".to_string()))
    }

    /// Client view of the question at `index`, options freshly shuffled.
    async fn question_at(
        &self,
        quiz: &Quiz,
        questions: &[Question],
        order: &[i64],
        index: usize,
    ) -> Result<PublicQuestion, AppError> {
        let question_id = *order.get(index).ok_or_else(|| {
            AppError::InternalServerError(format!("Question index {} outside order", index))
        })?;
        let question = find_question(questions, question_id)?;
        let options = self.cache.get_options(question_id).await?;
        Ok(PublicQuestion::new(
            quiz,
            question,
            &shuffle::shuffled_options(&options),
        ))
    }
}

/// Loads and locks an attempt that must belong to `user_id`.
async fn load_owned(tx: &mut dyn StoreTx, attempt_id: i64, user_id: i64) -> Result<Attempt, AppError> {
    let attempt = tx
        .lock_attempt(attempt_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Attempt not found".to_string()))?;
    ensure_owner(&attempt, user_id)?;
    Ok(attempt)
}

fn ensure_owner(attempt: &Attempt, user_id: i64) -> Result<(), AppError> {
    if attempt.user_id != user_id {
        return Err(AppError::Forbidden(
            "Attempt belongs to another user".to_string(),
        ));
    }
    Ok(())
}

/// The attempt's persisted order. A missing or corrupt order is rebuilt and
/// written back in the same transaction so later calls see the same sequence.
async fn ensure_order(
    tx: &mut dyn StoreTx,
    attempt: &Attempt,
    questions: &[Question],
) -> Result<Vec<i64>, AppError> {
    if let Some(order) = &attempt.question_order {
        if shuffle::is_valid_order(order, questions) {
            return Ok(order.clone());
        }
    }

    let order = shuffle::question_order(questions);
    tracing::warn!(
        "Attempt {} has a missing or corrupt question order, rebuilt with {} questions",
        attempt.id,
        order.len()
    );
    tx.save_question_order(attempt.id, &order).await?;
    Ok(order)
}

fn find_question(questions: &[Question], question_id: i64) -> Result<&Question, AppError> {
    questions
        .iter()
        .find(|q| q.id == question_id)
        .ok_or_else(|| AppError::InternalServerError(format!("Question {} not found", question_id)))
}

/// Sum of the marks of the questions in the attempt's order.
fn total_marks(questions: &[Question], order: &[i64]) -> f64 {
    questions
        .iter()
        .filter(|q| order.contains(&q.id))
        .map(|q| q.marks)
        .sum()
}

fn deadline(quiz: &Quiz, started_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
    (quiz.duration_minutes > 0)
        .then(|| started_at + Duration::minutes(i64::from(quiz.duration_minutes)))
}
