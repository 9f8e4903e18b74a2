// src/store/postgres.rs

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction, types::Json};

use crate::{
    error::AppError,
    models::{
        attempt::{Answer, Attempt, AttemptRow, AttemptTotals, NewAttempt},
        entitlement::EnrollmentOrder,
        quiz::{Question, Quiz, QuizOption},
    },
    store::{AttemptStore, StoreTx},
};

const QUIZ_COLUMNS: &str = "id, title, total_questions, duration_minutes, total_marks, \
    passing_marks, negative_marking, negative_marks_per_question, time_per_question, \
    attempt_limit, status, is_free, show_explanations, show_hints";

const ATTEMPT_COLUMNS: &str = "id, user_id, quiz_id, attempt_number, status, question_order, \
    started_at, completed_at, total_marks_obtained, percentage, total_marks, passed, ends_at";

const OPTIONS_QUERY: &str = r#"
    SELECT id, question_id, text, image_url, is_correct, order_num
    FROM question_options
    WHERE question_id = $1
    ORDER BY order_num, id
"#;

/// Postgres-backed store. Schema lives in `migrations/`.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn into_attempt(row: AttemptRow) -> Result<Attempt, AppError> {
    Attempt::try_from(row).map_err(AppError::InternalServerError)
}

#[async_trait]
impl AttemptStore for PgStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, AppError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTx { tx }))
    }

    async fn load_attempt(&self, attempt_id: i64) -> Result<Option<Attempt>, AppError> {
        let row = sqlx::query_as::<_, AttemptRow>(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM quiz_attempts WHERE id = $1"
        ))
        .bind(attempt_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(into_attempt).transpose()
    }

    async fn load_quiz(&self, quiz_id: i64) -> Result<Option<Quiz>, AppError> {
        let quiz = sqlx::query_as::<_, Quiz>(&format!(
            "SELECT {QUIZ_COLUMNS} FROM quizzes WHERE id = $1"
        ))
        .bind(quiz_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(quiz)
    }

    async fn load_questions(&self, quiz_id: i64) -> Result<Vec<Question>, AppError> {
        let questions = sqlx::query_as::<_, Question>(
            r#"
            SELECT id, quiz_id, text, image_url, marks, time_limit, order_num, explanation, hint
            FROM questions
            WHERE quiz_id = $1
            ORDER BY order_num, id
            "#,
        )
        .bind(quiz_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(questions)
    }

    async fn load_options(&self, question_id: i64) -> Result<Vec<QuizOption>, AppError> {
        let options = sqlx::query_as::<_, QuizOption>(OPTIONS_QUERY)
            .bind(question_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(options)
    }
}

pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgTx {
    async fn lock_attempt(&mut self, attempt_id: i64) -> Result<Option<Attempt>, AppError> {
        let row = sqlx::query_as::<_, AttemptRow>(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM quiz_attempts WHERE id = $1 FOR UPDATE"
        ))
        .bind(attempt_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(into_attempt).transpose()
    }

    async fn find_in_progress(
        &mut self,
        user_id: i64,
        quiz_id: i64,
    ) -> Result<Option<Attempt>, AppError> {
        let row = sqlx::query_as::<_, AttemptRow>(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM quiz_attempts \
             WHERE user_id = $1 AND quiz_id = $2 AND status = 'in_progress' \
             FOR UPDATE"
        ))
        .bind(user_id)
        .bind(quiz_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(into_attempt).transpose()
    }

    async fn count_completed(&mut self, user_id: i64, quiz_id: i64) -> Result<i64, AppError> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM quiz_attempts
            WHERE user_id = $1 AND quiz_id = $2 AND status = 'completed'
            "#,
        )
        .bind(user_id)
        .bind(quiz_id)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(count)
    }

    async fn insert_attempt(&mut self, attempt: &NewAttempt) -> Result<Option<Attempt>, AppError> {
        // The partial unique index makes a concurrent insert wait for the
        // other transaction, then skip.
        let row = sqlx::query_as::<_, AttemptRow>(&format!(
            "INSERT INTO quiz_attempts \
                 (user_id, quiz_id, attempt_number, status, question_order, started_at, ends_at) \
             VALUES ($1, $2, $3, 'in_progress', $4, $5, $6) \
             ON CONFLICT (user_id, quiz_id) WHERE status = 'in_progress' DO NOTHING \
             RETURNING {ATTEMPT_COLUMNS}"
        ))
        .bind(attempt.user_id)
        .bind(attempt.quiz_id)
        .bind(attempt.attempt_number)
        .bind(Json(&attempt.question_order))
        .bind(attempt.started_at)
        .bind(attempt.ends_at)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(into_attempt).transpose()
    }

    async fn save_question_order(&mut self, attempt_id: i64, order: &[i64]) -> Result<(), AppError> {
        sqlx::query("UPDATE quiz_attempts SET question_order = $1 WHERE id = $2")
            .bind(Json(order))
            .bind(attempt_id)
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    async fn complete_attempt(
        &mut self,
        attempt_id: i64,
        totals: &AttemptTotals,
    ) -> Result<Attempt, AppError> {
        let row = sqlx::query_as::<_, AttemptRow>(&format!(
            "UPDATE quiz_attempts \
             SET status = 'completed', total_marks_obtained = $2, percentage = $3, \
                 total_marks = $4, passed = $5, completed_at = $6 \
             WHERE id = $1 AND status = 'in_progress' \
             RETURNING {ATTEMPT_COLUMNS}"
        ))
        .bind(attempt_id)
        .bind(totals.score)
        .bind(totals.percentage)
        .bind(totals.total_marks)
        .bind(totals.passed)
        .bind(totals.completed_at)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or_else(|| AppError::Conflict("Attempt is already completed".to_string()))?;

        into_attempt(row)
    }

    async fn load_options(&mut self, question_id: i64) -> Result<Vec<QuizOption>, AppError> {
        let options = sqlx::query_as::<_, QuizOption>(OPTIONS_QUERY)
            .bind(question_id)
            .fetch_all(&mut *self.tx)
            .await?;

        Ok(options)
    }

    async fn upsert_answer(&mut self, answer: &Answer) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO attempt_answers
                (attempt_id, question_id, selected_option_id, is_correct, marks_obtained, time_taken, answered_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (attempt_id, question_id) DO UPDATE SET
                selected_option_id = EXCLUDED.selected_option_id,
                is_correct = EXCLUDED.is_correct,
                marks_obtained = EXCLUDED.marks_obtained,
                time_taken = EXCLUDED.time_taken,
                answered_at = EXCLUDED.answered_at
            "#,
        )
        .bind(answer.attempt_id)
        .bind(answer.question_id)
        .bind(answer.selected_option_id)
        .bind(answer.is_correct)
        .bind(answer.marks_obtained)
        .bind(answer.time_taken)
        .bind(answer.answered_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn count_answers(&mut self, attempt_id: i64) -> Result<i64, AppError> {
        let count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM attempt_answers WHERE attempt_id = $1")
                .bind(attempt_id)
                .fetch_one(&mut *self.tx)
                .await?;

        Ok(count)
    }

    async fn list_answers(&mut self, attempt_id: i64) -> Result<Vec<Answer>, AppError> {
        let answers = sqlx::query_as::<_, Answer>(
            r#"
            SELECT attempt_id, question_id, selected_option_id, is_correct, marks_obtained, time_taken, answered_at
            FROM attempt_answers
            WHERE attempt_id = $1
            "#,
        )
        .bind(attempt_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(answers)
    }

    async fn lock_enrollment_orders(
        &mut self,
        user_id: i64,
        quiz_id: i64,
    ) -> Result<Vec<EnrollmentOrder>, AppError> {
        let orders = sqlx::query_as::<_, EnrollmentOrder>(
            r#"
            SELECT id, user_id, quiz_id, quiz_limit, quiz_attempts_used
            FROM enrollment_orders
            WHERE user_id = $1 AND quiz_id = $2
            ORDER BY created_at, id
            FOR UPDATE
            "#,
        )
        .bind(user_id)
        .bind(quiz_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(orders)
    }

    async fn increment_attempts_used(&mut self, order_id: i64) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE enrollment_orders
            SET quiz_attempts_used = quiz_attempts_used + 1
            WHERE id = $1 AND quiz_attempts_used < quiz_limit
            "#,
        )
        .bind(order_id)
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        self.tx.commit().await?;
        Ok(())
    }
}
