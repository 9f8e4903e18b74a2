// src/services/entitlement.rs

//! Quota checks against the payment system's enrollment orders.
//!
//! Both operations run inside the caller's start transaction so the order
//! rows stay locked from the check until the attempt is created.

use crate::{
    error::AppError,
    models::{entitlement::Quota, quiz::Quiz},
    store::StoreTx,
};

/// Remaining attempts for (user, quiz). Locks the user's order rows.
/// No orders means no quota.
pub async fn check_quota(tx: &mut dyn StoreTx, user_id: i64, quiz: &Quiz) -> Result<Quota, AppError> {
    if quiz.is_free {
        return Ok(Quota::unlimited());
    }

    let orders = tx.lock_enrollment_orders(user_id, quiz.id).await?;
    let limit = orders.iter().map(|o| i64::from(o.quiz_limit)).sum();
    let remaining = orders.iter().map(|o| o.remaining()).sum();

    Ok(Quota {
        remaining,
        limit: Some(limit),
    })
}

/// Consumes one attempt from the oldest order that still has quota.
pub async fn consume_attempt(tx: &mut dyn StoreTx, user_id: i64, quiz: &Quiz) -> Result<(), AppError> {
    if quiz.is_free {
        return Ok(());
    }

    let orders = tx.lock_enrollment_orders(user_id, quiz.id).await?;
    for order in orders.iter().filter(|o| o.remaining() > 0) {
        if tx.increment_attempts_used(order.id).await? {
            tracing::debug!(
                "Consumed attempt from order {} (user {}, quiz {})",
                order.id,
                user_id,
                quiz.id
            );
            return Ok(());
        }
    }

    Err(AppError::QuotaExceeded(
        "No remaining attempts for this quiz".to_string(),
    ))
}
