// src/store/mod.rs

//! Durable storage for quizzes, attempts, answers and enrollment orders.
//!
//! Snapshot reads (`load_*`) go straight to the store and back the
//! question cache. Everything that mutates attempt state happens through a
//! [`StoreTx`]: dropping a transaction without calling `commit` rolls it back.
//!
//! Store-level reads take their own connection. Code holding a transaction
//! reads through the transaction instead, so one request never waits on a
//! second connection while it holds the first.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::{
    error::AppError,
    models::{
        attempt::{Answer, Attempt, AttemptTotals, NewAttempt},
        entitlement::EnrollmentOrder,
        quiz::{Question, Quiz, QuizOption},
    },
};

#[async_trait]
pub trait AttemptStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, AppError>;

    /// Unlocked read of an attempt, used to find its quiz before a
    /// transaction is opened.
    async fn load_attempt(&self, attempt_id: i64) -> Result<Option<Attempt>, AppError>;

    async fn load_quiz(&self, quiz_id: i64) -> Result<Option<Quiz>, AppError>;

    /// Questions of a quiz, ordered by `order_num`.
    async fn load_questions(&self, quiz_id: i64) -> Result<Vec<Question>, AppError>;

    /// Options of a question, ordered by `order_num`.
    async fn load_options(&self, question_id: i64) -> Result<Vec<QuizOption>, AppError>;
}

/// One all-or-nothing unit of work.
#[async_trait]
pub trait StoreTx: Send {
    /// Loads an attempt and locks it until the transaction ends.
    async fn lock_attempt(&mut self, attempt_id: i64) -> Result<Option<Attempt>, AppError>;

    async fn find_in_progress(
        &mut self,
        user_id: i64,
        quiz_id: i64,
    ) -> Result<Option<Attempt>, AppError>;

    async fn count_completed(&mut self, user_id: i64, quiz_id: i64) -> Result<i64, AppError>;

    /// Inserts an attempt. Returns `None` when another in-progress attempt
    /// for the same (user, quiz) already exists.
    async fn insert_attempt(&mut self, attempt: &NewAttempt) -> Result<Option<Attempt>, AppError>;

    async fn save_question_order(&mut self, attempt_id: i64, order: &[i64]) -> Result<(), AppError>;

    /// Marks the attempt completed. Returns the updated attempt.
    async fn complete_attempt(
        &mut self,
        attempt_id: i64,
        totals: &AttemptTotals,
    ) -> Result<Attempt, AppError>;

    /// Options of a question, read on this transaction's connection.
    async fn load_options(&mut self, question_id: i64) -> Result<Vec<QuizOption>, AppError>;

    /// Inserts or overwrites the answer for (attempt_id, question_id).
    async fn upsert_answer(&mut self, answer: &Answer) -> Result<(), AppError>;

    async fn count_answers(&mut self, attempt_id: i64) -> Result<i64, AppError>;

    async fn list_answers(&mut self, attempt_id: i64) -> Result<Vec<Answer>, AppError>;

    /// Enrollment orders for (user, quiz), oldest first, locked until the
    /// transaction ends.
    async fn lock_enrollment_orders(
        &mut self,
        user_id: i64,
        quiz_id: i64,
    ) -> Result<Vec<EnrollmentOrder>, AppError>;

    /// Increments `quiz_attempts_used` if the order still has quota.
    /// Returns `false` when the order was already exhausted.
    async fn increment_attempts_used(&mut self, order_id: i64) -> Result<bool, AppError>;

    async fn commit(self: Box<Self>) -> Result<(), AppError>;
}
