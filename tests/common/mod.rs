// tests/common/mod.rs

#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use quiz_attempts::{
    error::AppError,
    models::{
        attempt::{Answer, Attempt, AttemptTotals, NewAttempt, StartAttemptResponse, StartOutcome},
        entitlement::EnrollmentOrder,
        quiz::{Question, Quiz, QuizOption},
    },
    services::{
        cache::QuestionCache,
        notify::{AttemptCompleted, LogNotifier, Notifier},
        session::SessionEngine,
    },
    store::{AttemptStore, StoreTx, memory::MemoryStore},
};

pub const STUDENT: i64 = 7;
pub const OTHER_STUDENT: i64 = 8;

/// Ids of a seeded quiz. Each question has one correct option and three wrong ones.
pub struct QuizFixture {
    pub quiz_id: i64,
    pub question_ids: Vec<i64>,
    pub correct: HashMap<i64, i64>,
    pub wrong: HashMap<i64, i64>,
}

impl QuizFixture {
    pub fn correct_for(&self, question_id: i64) -> i64 {
        self.correct[&question_id]
    }

    pub fn wrong_for(&self, question_id: i64) -> i64 {
        self.wrong[&question_id]
    }
}

pub fn base_quiz(quiz_id: i64, questions: usize, marks: f64) -> Quiz {
    Quiz {
        id: quiz_id,
        title: format!("Quiz {}", quiz_id),
        total_questions: questions as i32,
        duration_minutes: 30,
        total_marks: marks * questions as f64,
        passing_marks: 1.0,
        negative_marking: false,
        negative_marks_per_question: 0.0,
        time_per_question: Some(60),
        attempt_limit: None,
        status: "active".to_string(),
        is_free: true,
        show_explanations: true,
        show_hints: false,
    }
}

/// Seeds a quiz with `questions` questions worth `marks` each.
/// `configure` tweaks the quiz before it is stored.
pub fn seed_quiz(
    store: &MemoryStore,
    quiz_id: i64,
    questions: usize,
    marks: f64,
    configure: impl FnOnce(&mut Quiz),
) -> QuizFixture {
    let mut quiz = base_quiz(quiz_id, questions, marks);
    configure(&mut quiz);
    store.insert_quiz(quiz);

    let mut fixture = QuizFixture {
        quiz_id,
        question_ids: Vec::new(),
        correct: HashMap::new(),
        wrong: HashMap::new(),
    };

    for i in 1..=questions as i64 {
        let question_id = quiz_id * 100 + i;
        store.insert_question(Question {
            id: question_id,
            quiz_id,
            text: format!("Question {}", i),
            image_url: None,
            marks,
            time_limit: None,
            order_num: i as i32,
            explanation: Some(format!("Explanation {}", i)),
            hint: Some(format!("Hint {}", i)),
        });

        for j in 1..=4 {
            let option_id = question_id * 10 + j;
            store.insert_option(QuizOption {
                id: option_id,
                question_id,
                text: format!("Option {}", j),
                image_url: None,
                is_correct: j == 1,
                order_num: j as i32,
            });
        }

        fixture.question_ids.push(question_id);
        fixture.correct.insert(question_id, question_id * 10 + 1);
        fixture.wrong.insert(question_id, question_id * 10 + 2);
    }

    fixture
}

pub fn engine_with(store: &MemoryStore, notifier: Arc<dyn Notifier>) -> SessionEngine {
    let store = Arc::new(store.clone());
    let cache = QuestionCache::new(store.clone(), Duration::from_secs(3600), 1_000);
    SessionEngine::new(store, cache, notifier)
}

pub fn engine(store: &MemoryStore) -> SessionEngine {
    engine_with(store, Arc::new(LogNotifier))
}

pub fn in_progress(outcome: StartOutcome) -> StartAttemptResponse {
    match outcome {
        StartOutcome::InProgress(started) => started,
        StartOutcome::Completed(result) => {
            panic!("expected an in-progress attempt, got result {:?}", result)
        }
    }
}

/// Notifier that always fails.
pub struct BrokenNotifier;

#[async_trait]
impl Notifier for BrokenNotifier {
    async fn attempt_completed(&self, _event: &AttemptCompleted) -> Result<(), AppError> {
        Err(AppError::ServiceUnavailable("mail relay down".to_string()))
    }
}

/// Store whose next `misses` in-progress lookups come back empty, as if
/// another request inserted its attempt between the lookup and the insert.
#[derive(Clone)]
pub struct RacingStore {
    inner: MemoryStore,
    misses: Arc<AtomicUsize>,
}

impl RacingStore {
    pub fn new(inner: &MemoryStore, misses: usize) -> Self {
        Self {
            inner: inner.clone(),
            misses: Arc::new(AtomicUsize::new(misses)),
        }
    }

    pub fn engine(&self) -> SessionEngine {
        let store: Arc<dyn AttemptStore> = Arc::new(self.clone());
        let cache = QuestionCache::new(store.clone(), Duration::from_secs(3600), 1_000);
        SessionEngine::new(store, cache, Arc::new(LogNotifier))
    }
}

#[async_trait]
impl AttemptStore for RacingStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, AppError> {
        Ok(Box::new(RacingTx {
            inner: self.inner.begin().await?,
            misses: self.misses.clone(),
        }))
    }

    async fn load_attempt(&self, attempt_id: i64) -> Result<Option<Attempt>, AppError> {
        self.inner.load_attempt(attempt_id).await
    }

    async fn load_quiz(&self, quiz_id: i64) -> Result<Option<Quiz>, AppError> {
        self.inner.load_quiz(quiz_id).await
    }

    async fn load_questions(&self, quiz_id: i64) -> Result<Vec<Question>, AppError> {
        self.inner.load_questions(quiz_id).await
    }

    async fn load_options(&self, question_id: i64) -> Result<Vec<QuizOption>, AppError> {
        self.inner.load_options(question_id).await
    }
}

pub struct RacingTx {
    inner: Box<dyn StoreTx>,
    misses: Arc<AtomicUsize>,
}

#[async_trait]
impl StoreTx for RacingTx {
    async fn lock_attempt(&mut self, attempt_id: i64) -> Result<Option<Attempt>, AppError> {
        self.inner.lock_attempt(attempt_id).await
    }

    async fn find_in_progress(
        &mut self,
        user_id: i64,
        quiz_id: i64,
    ) -> Result<Option<Attempt>, AppError> {
        let missed = self
            .misses
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if missed {
            return Ok(None);
        }
        self.inner.find_in_progress(user_id, quiz_id).await
    }

    async fn count_completed(&mut self, user_id: i64, quiz_id: i64) -> Result<i64, AppError> {
        self.inner.count_completed(user_id, quiz_id).await
    }

    async fn insert_attempt(&mut self, attempt: &NewAttempt) -> Result<Option<Attempt>, AppError> {
        self.inner.insert_attempt(attempt).await
    }

    async fn save_question_order(&mut self, attempt_id: i64, order: &[i64]) -> Result<(), AppError> {
        self.inner.save_question_order(attempt_id, order).await
    }

    async fn complete_attempt(
        &mut self,
        attempt_id: i64,
        totals: &AttemptTotals,
    ) -> Result<Attempt, AppError> {
        self.inner.complete_attempt(attempt_id, totals).await
    }

    async fn load_options(&mut self, question_id: i64) -> Result<Vec<QuizOption>, AppError> {
        self.inner.load_options(question_id).await
    }

    async fn upsert_answer(&mut self, answer: &Answer) -> Result<(), AppError> {
        self.inner.upsert_answer(answer).await
    }

    async fn count_answers(&mut self, attempt_id: i64) -> Result<i64, AppError> {
        self.inner.count_answers(attempt_id).await
    }

    async fn list_answers(&mut self, attempt_id: i64) -> Result<Vec<Answer>, AppError> {
        self.inner.list_answers(attempt_id).await
    }

    async fn lock_enrollment_orders(
        &mut self,
        user_id: i64,
        quiz_id: i64,
    ) -> Result<Vec<EnrollmentOrder>, AppError> {
        self.inner.lock_enrollment_orders(user_id, quiz_id).await
    }

    async fn increment_attempts_used(&mut self, order_id: i64) -> Result<bool, AppError> {
        self.inner.increment_attempts_used(order_id).await
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        self.inner.commit().await
    }
}
