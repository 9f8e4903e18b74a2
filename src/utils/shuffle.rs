// src/utils/shuffle.rs

use std::collections::HashSet;

use rand::seq::SliceRandom;

use crate::models::quiz::{Question, QuizOption};

/// Fisher–Yates shuffle of every question id. Each call draws a fresh order.
pub fn question_order(questions: &[Question]) -> Vec<i64> {
    let mut order: Vec<i64> = questions.iter().map(|q| q.id).collect();
    order.shuffle(&mut rand::thread_rng());
    order
}

/// Display order for a question's options, reshuffled on every fetch.
pub fn shuffled_options(options: &[QuizOption]) -> Vec<QuizOption> {
    let mut shuffled = options.to_vec();
    shuffled.shuffle(&mut rand::thread_rng());
    shuffled
}

/// A stored order is usable when it is non-empty, has no duplicates and
/// only names questions that still exist.
pub fn is_valid_order(order: &[i64], questions: &[Question]) -> bool {
    if order.is_empty() {
        return false;
    }
    let known: HashSet<i64> = questions.iter().map(|q| q.id).collect();
    let mut seen = HashSet::with_capacity(order.len());
    order.iter().all(|id| known.contains(id) && seen.insert(*id))
}
