// src/services/notify.rs

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::AppError;

/// Emitted once, after an attempt has been committed as completed.
#[derive(Debug, Clone, Serialize)]
pub struct AttemptCompleted {
    pub attempt_id: i64,
    pub user_id: i64,
    pub quiz_id: i64,
    pub score: f64,
    pub percentage: f64,
    pub passed: bool,
}

/// Outbound notification channel (push, email, ...), owned by another service.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn attempt_completed(&self, event: &AttemptCompleted) -> Result<(), AppError>;
}

/// Default notifier: writes the event to the log.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn attempt_completed(&self, event: &AttemptCompleted) -> Result<(), AppError> {
        tracing::info!(
            attempt_id = event.attempt_id,
            user_id = event.user_id,
            quiz_id = event.quiz_id,
            score = event.score,
            passed = event.passed,
            "Attempt completed"
        );
        Ok(())
    }
}

/// Fire-and-forget. A failing notifier is logged and never reaches the caller.
pub fn dispatch(notifier: Arc<dyn Notifier>, event: AttemptCompleted) {
    tokio::spawn(async move {
        if let Err(e) = notifier.attempt_completed(&event).await {
            tracing::warn!(
                "Failed to send completion notice for attempt {}: {:?}",
                event.attempt_id,
                e
            );
        }
    });
}
