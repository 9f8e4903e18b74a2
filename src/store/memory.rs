// src/store/memory.rs

//! In-process store used by tests and local runs without Postgres.
//!
//! Transactions serialize on a single mutex and work on a copy of the
//! records; `commit` swaps the copy in, dropping the transaction discards it.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        Arc, RwLock, RwLockReadGuard,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    error::AppError,
    models::{
        attempt::{Answer, Attempt, AttemptStatus, AttemptTotals, NewAttempt},
        entitlement::EnrollmentOrder,
        quiz::{Question, Quiz, QuizOption},
    },
    store::{AttemptStore, StoreTx},
};

#[derive(Default)]
struct Catalog {
    quizzes: HashMap<i64, Quiz>,
    questions: HashMap<i64, Question>,
    options: HashMap<i64, QuizOption>,
}

#[derive(Default, Clone)]
struct Records {
    next_attempt_id: i64,
    next_order_id: i64,
    attempts: BTreeMap<i64, Attempt>,
    answers: BTreeMap<(i64, i64), Answer>,
    orders: BTreeMap<i64, EnrollmentOrder>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    catalog: Arc<RwLock<Catalog>>,
    records: Arc<Mutex<Records>>,
    snapshot_reads: Arc<AtomicUsize>,
    reads_during_tx: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_quiz(&self, quiz: Quiz) {
        let mut catalog = self.catalog.write().unwrap_or_else(|e| e.into_inner());
        catalog.quizzes.insert(quiz.id, quiz);
    }

    pub fn insert_question(&self, question: Question) {
        let mut catalog = self.catalog.write().unwrap_or_else(|e| e.into_inner());
        catalog.questions.insert(question.id, question);
    }

    pub fn insert_option(&self, option: QuizOption) {
        let mut catalog = self.catalog.write().unwrap_or_else(|e| e.into_inner());
        catalog.options.insert(option.id, option);
    }

    /// Number of `load_*` calls that reached the store.
    pub fn snapshot_reads(&self) -> usize {
        self.snapshot_reads.load(Ordering::SeqCst)
    }

    /// Number of store-level snapshot reads made while some transaction was
    /// open. On a pooled store each of those needs a second connection.
    pub fn reads_during_tx(&self) -> usize {
        self.reads_during_tx.load(Ordering::SeqCst)
    }

    pub async fn insert_enrollment_order(&self, user_id: i64, quiz_id: i64, quiz_limit: i32) -> i64 {
        let mut records = self.records.lock().await;
        records.next_order_id += 1;
        let id = records.next_order_id;
        records.orders.insert(
            id,
            EnrollmentOrder {
                id,
                user_id,
                quiz_id,
                quiz_limit,
                quiz_attempts_used: 0,
            },
        );
        id
    }

    pub async fn enrollment_order(&self, order_id: i64) -> Option<EnrollmentOrder> {
        self.records.lock().await.orders.get(&order_id).cloned()
    }

    pub async fn attempts_for(&self, user_id: i64, quiz_id: i64) -> Vec<Attempt> {
        self.records
            .lock()
            .await
            .attempts
            .values()
            .filter(|a| a.user_id == user_id && a.quiz_id == quiz_id)
            .cloned()
            .collect()
    }

    pub async fn answers_for(&self, attempt_id: i64) -> Vec<Answer> {
        let records = self.records.lock().await;
        answers_of(&records, attempt_id).cloned().collect()
    }

    /// Overwrites an attempt's stored order, e.g. to simulate a lost value.
    pub async fn set_question_order(&self, attempt_id: i64, order: Option<Vec<i64>>) {
        if let Some(attempt) = self.records.lock().await.attempts.get_mut(&attempt_id) {
            attempt.question_order = order;
        }
    }

    pub async fn set_ends_at(&self, attempt_id: i64, ends_at: Option<DateTime<Utc>>) {
        if let Some(attempt) = self.records.lock().await.attempts.get_mut(&attempt_id) {
            attempt.ends_at = ends_at;
        }
    }

    fn read_catalog(&self) -> Result<RwLockReadGuard<'_, Catalog>, AppError> {
        self.snapshot_reads.fetch_add(1, Ordering::SeqCst);
        if self.records.try_lock().is_err() {
            self.reads_during_tx.fetch_add(1, Ordering::SeqCst);
        }
        read(&self.catalog)
    }
}

fn read(catalog: &RwLock<Catalog>) -> Result<RwLockReadGuard<'_, Catalog>, AppError> {
    catalog
        .read()
        .map_err(|_| AppError::InternalServerError("catalog lock poisoned".to_string()))
}

fn options_of(catalog: &Catalog, question_id: i64) -> Vec<QuizOption> {
    let mut options: Vec<QuizOption> = catalog
        .options
        .values()
        .filter(|o| o.question_id == question_id)
        .cloned()
        .collect();
    options.sort_by_key(|o| (o.order_num, o.id));
    options
}

fn answers_of(records: &Records, attempt_id: i64) -> impl Iterator<Item = &Answer> {
    records
        .answers
        .range((attempt_id, i64::MIN)..=(attempt_id, i64::MAX))
        .map(|(_, answer)| answer)
}

#[async_trait]
impl AttemptStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, AppError> {
        let guard = self.records.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTx {
            guard,
            working,
            catalog: self.catalog.clone(),
        }))
    }

    async fn load_attempt(&self, attempt_id: i64) -> Result<Option<Attempt>, AppError> {
        Ok(self.records.lock().await.attempts.get(&attempt_id).cloned())
    }

    async fn load_quiz(&self, quiz_id: i64) -> Result<Option<Quiz>, AppError> {
        Ok(self.read_catalog()?.quizzes.get(&quiz_id).cloned())
    }

    async fn load_questions(&self, quiz_id: i64) -> Result<Vec<Question>, AppError> {
        let mut questions: Vec<Question> = self
            .read_catalog()?
            .questions
            .values()
            .filter(|q| q.quiz_id == quiz_id)
            .cloned()
            .collect();
        questions.sort_by_key(|q| (q.order_num, q.id));
        Ok(questions)
    }

    async fn load_options(&self, question_id: i64) -> Result<Vec<QuizOption>, AppError> {
        Ok(options_of(&*self.read_catalog()?, question_id))
    }
}

pub struct MemoryTx {
    guard: OwnedMutexGuard<Records>,
    working: Records,
    catalog: Arc<RwLock<Catalog>>,
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn lock_attempt(&mut self, attempt_id: i64) -> Result<Option<Attempt>, AppError> {
        Ok(self.working.attempts.get(&attempt_id).cloned())
    }

    async fn find_in_progress(
        &mut self,
        user_id: i64,
        quiz_id: i64,
    ) -> Result<Option<Attempt>, AppError> {
        Ok(self
            .working
            .attempts
            .values()
            .find(|a| a.user_id == user_id && a.quiz_id == quiz_id && a.is_in_progress())
            .cloned())
    }

    async fn count_completed(&mut self, user_id: i64, quiz_id: i64) -> Result<i64, AppError> {
        let count = self
            .working
            .attempts
            .values()
            .filter(|a| {
                a.user_id == user_id && a.quiz_id == quiz_id && a.status == AttemptStatus::Completed
            })
            .count();
        Ok(count as i64)
    }

    async fn insert_attempt(&mut self, attempt: &NewAttempt) -> Result<Option<Attempt>, AppError> {
        if self
            .find_in_progress(attempt.user_id, attempt.quiz_id)
            .await?
            .is_some()
        {
            return Ok(None);
        }

        self.working.next_attempt_id += 1;
        let created = Attempt {
            id: self.working.next_attempt_id,
            user_id: attempt.user_id,
            quiz_id: attempt.quiz_id,
            attempt_number: attempt.attempt_number,
            status: AttemptStatus::InProgress,
            question_order: Some(attempt.question_order.clone()),
            started_at: attempt.started_at,
            completed_at: None,
            total_marks_obtained: None,
            percentage: None,
            total_marks: None,
            passed: None,
            ends_at: attempt.ends_at,
        };
        self.working.attempts.insert(created.id, created.clone());
        Ok(Some(created))
    }

    async fn save_question_order(&mut self, attempt_id: i64, order: &[i64]) -> Result<(), AppError> {
        if let Some(attempt) = self.working.attempts.get_mut(&attempt_id) {
            attempt.question_order = Some(order.to_vec());
        }
        Ok(())
    }

    async fn complete_attempt(
        &mut self,
        attempt_id: i64,
        totals: &AttemptTotals,
    ) -> Result<Attempt, AppError> {
        let attempt = self
            .working
            .attempts
            .get_mut(&attempt_id)
            .filter(|a| a.is_in_progress())
            .ok_or_else(|| AppError::Conflict("Attempt is already completed".to_string()))?;

        attempt.status = AttemptStatus::Completed;
        attempt.total_marks_obtained = Some(totals.score);
        attempt.percentage = Some(totals.percentage);
        attempt.total_marks = Some(totals.total_marks);
        attempt.passed = Some(totals.passed);
        attempt.completed_at = Some(totals.completed_at);
        Ok(attempt.clone())
    }

    async fn load_options(&mut self, question_id: i64) -> Result<Vec<QuizOption>, AppError> {
        Ok(options_of(&*read(&self.catalog)?, question_id))
    }

    async fn upsert_answer(&mut self, answer: &Answer) -> Result<(), AppError> {
        self.working
            .answers
            .insert((answer.attempt_id, answer.question_id), answer.clone());
        Ok(())
    }

    async fn count_answers(&mut self, attempt_id: i64) -> Result<i64, AppError> {
        Ok(answers_of(&self.working, attempt_id).count() as i64)
    }

    async fn list_answers(&mut self, attempt_id: i64) -> Result<Vec<Answer>, AppError> {
        Ok(answers_of(&self.working, attempt_id).cloned().collect())
    }

    async fn lock_enrollment_orders(
        &mut self,
        user_id: i64,
        quiz_id: i64,
    ) -> Result<Vec<EnrollmentOrder>, AppError> {
        Ok(self
            .working
            .orders
            .values()
            .filter(|o| o.user_id == user_id && o.quiz_id == quiz_id)
            .cloned()
            .collect())
    }

    async fn increment_attempts_used(&mut self, order_id: i64) -> Result<bool, AppError> {
        match self.working.orders.get_mut(&order_id) {
            Some(order) if order.quiz_attempts_used < order.quiz_limit => {
                order.quiz_attempts_used += 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        let MemoryTx { mut guard, working, .. } = *self;
        *guard = working;
        Ok(())
    }
}
