// src/handlers/admin.rs

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
};

use crate::{error::AppError, services::session::SessionEngine};

/// Drops the cached snapshot of a quiz.
/// Called by the authoring service after it edits a quiz or its questions.
/// Admin only.
pub async fn invalidate_quiz_cache(
    State(engine): State<Arc<SessionEngine>>,
    Path(quiz_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    engine.cache().invalidate_quiz(quiz_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
