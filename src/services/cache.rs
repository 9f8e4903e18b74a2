// src/services/cache.rs

use std::{collections::HashSet, sync::Arc, time::Duration};

use moka::future::Cache;

use crate::{
    error::AppError,
    models::quiz::{Question, Quiz, QuizOption},
    store::{AttemptStore, StoreTx},
};

/// Read-through cache of authoring snapshots.
///
/// Entries expire after a fixed time-to-live. There is no write path: the
/// authoring side calls [`QuestionCache::invalidate_quiz`] after mutations.
/// A miss, or any cache fault, falls back to the store.
#[derive(Clone)]
pub struct QuestionCache {
    store: Arc<dyn AttemptStore>,
    quizzes: Cache<i64, Arc<Quiz>>,
    questions: Cache<i64, Arc<Vec<Question>>>,
    options: Cache<i64, Arc<Vec<QuizOption>>>,
}

impl QuestionCache {
    pub fn new(store: Arc<dyn AttemptStore>, ttl: Duration, max_entries: u64) -> Self {
        Self {
            store,
            quizzes: Cache::builder()
                .max_capacity(max_entries)
                .time_to_live(ttl)
                .build(),
            questions: Cache::builder()
                .max_capacity(max_entries)
                .time_to_live(ttl)
                .build(),
            options: Cache::builder()
                .max_capacity(max_entries)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub async fn get_quiz(&self, quiz_id: i64) -> Result<Option<Arc<Quiz>>, AppError> {
        if let Some(quiz) = self.quizzes.get(&quiz_id).await {
            return Ok(Some(quiz));
        }

        // Missing quizzes are not cached so a later publish is seen at once.
        let Some(quiz) = self.store.load_quiz(quiz_id).await? else {
            return Ok(None);
        };
        let quiz = Arc::new(quiz);
        self.quizzes.insert(quiz_id, quiz.clone()).await;
        Ok(Some(quiz))
    }

    /// Questions of a quiz in authoring order.
    pub async fn get_questions(&self, quiz_id: i64) -> Result<Arc<Vec<Question>>, AppError> {
        if let Some(questions) = self.questions.get(&quiz_id).await {
            return Ok(questions);
        }

        let questions = Arc::new(self.store.load_questions(quiz_id).await?);
        self.questions.insert(quiz_id, questions.clone()).await;
        Ok(questions)
    }

    /// Options of a question in authoring order.
    pub async fn get_options(&self, question_id: i64) -> Result<Arc<Vec<QuizOption>>, AppError> {
        if let Some(options) = self.options.get(&question_id).await {
            return Ok(options);
        }

        let options = Arc::new(self.store.load_options(question_id).await?);
        self.options.insert(question_id, options.clone()).await;
        Ok(options)
    }

    /// Same as [`QuestionCache::get_options`], but a miss is loaded on the
    /// caller's transaction instead of a fresh connection.
    pub async fn get_options_in(
        &self,
        tx: &mut dyn StoreTx,
        question_id: i64,
    ) -> Result<Arc<Vec<QuizOption>>, AppError> {
        if let Some(options) = self.options.get(&question_id).await {
            return Ok(options);
        }

        let options = Arc::new(tx.load_options(question_id).await?);
        self.options.insert(question_id, options.clone()).await;
        Ok(options)
    }

    /// Drops the quiz, its question list and each question's options.
    ///
    /// Option entries outlive the question list when they were filled later,
    /// so the question ids come from the store as well as from the cache.
    pub async fn invalidate_quiz(&self, quiz_id: i64) -> Result<(), AppError> {
        let mut question_ids: HashSet<i64> = self
            .store
            .load_questions(quiz_id)
            .await?
            .iter()
            .map(|q| q.id)
            .collect();
        if let Some(cached) = self.questions.get(&quiz_id).await {
            question_ids.extend(cached.iter().map(|q| q.id));
        }

        for question_id in &question_ids {
            self.options.invalidate(question_id).await;
        }
        self.questions.invalidate(&quiz_id).await;
        self.quizzes.invalidate(&quiz_id).await;

        tracing::debug!(
            "Invalidated cached snapshot for quiz {} ({} questions)",
            quiz_id,
            question_ids.len()
        );
        Ok(())
    }
}
