// src/models/entitlement.rs

use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;

/// Represents the 'enrollment_orders' table.
/// Owned by the payment system; the attempt engine only reads it and
/// increments `quiz_attempts_used`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct EnrollmentOrder {
    pub id: i64,
    pub user_id: i64,
    pub quiz_id: i64,
    pub quiz_limit: i32,
    pub quiz_attempts_used: i32,
}

impl EnrollmentOrder {
    pub fn remaining(&self) -> i64 {
        (i64::from(self.quiz_limit) - i64::from(self.quiz_attempts_used)).max(0)
    }
}

/// Remaining attempts across a user's orders for one quiz.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Quota {
    pub remaining: i64,

    /// `None` for quizzes that are not quota-gated.
    pub limit: Option<i64>,
}

impl Quota {
    pub fn unlimited() -> Self {
        Self {
            remaining: i64::MAX,
            limit: None,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining <= 0
    }
}
