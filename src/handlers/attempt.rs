// src/handlers/attempt.rs

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use validator::Validate;

use crate::{
    error::AppError,
    models::attempt::{AdvanceRequest, StartOutcome},
    services::session::SessionEngine,
    utils::jwt::AuthUser,
};

/// Starts a quiz attempt, or resumes the caller's in-progress one.
///
/// * 201 with the first question for a new attempt.
/// * 200 with the current question for a resumed attempt.
/// * 200 with the result when the resumed attempt was already fully answered.
pub async fn start_attempt(
    State(engine): State<Arc<SessionEngine>>,
    Extension(user): Extension<AuthUser>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = engine.start(user.user_id, quiz_id).await?;

    let status = match &outcome {
        StartOutcome::InProgress(started) if !started.resumed => StatusCode::CREATED,
        _ => StatusCode::OK,
    };

    Ok((status, Json(outcome)))
}

/// Records the answer to the current question and returns the next one.
pub async fn advance(
    State(engine): State<Arc<SessionEngine>>,
    Extension(user): Extension<AuthUser>,
    Path(attempt_id): Path<i64>,
    Json(req): Json<AdvanceRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;

    let current_index = usize::try_from(req.current_index)
        .map_err(|_| AppError::BadRequest("current_index must not be negative".to_string()))?;

    let response = engine
        .advance(
            user.user_id,
            attempt_id,
            current_index,
            req.selected_option_id,
            req.time_taken,
        )
        .await?;

    Ok(Json(response))
}

/// Submits the attempt. Safe to call more than once.
pub async fn submit_attempt(
    State(engine): State<Arc<SessionEngine>>,
    Extension(user): Extension<AuthUser>,
    Path(attempt_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = engine.submit(user.user_id, attempt_id).await?;
    Ok(Json(result))
}

pub async fn get_result(
    State(engine): State<Arc<SessionEngine>>,
    Extension(user): Extension<AuthUser>,
    Path(attempt_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = engine.get_result(user.user_id, attempt_id).await?;
    Ok(Json(result))
}
