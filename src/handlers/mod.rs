// src/handlers/mod.rs

pub mod admin;
pub mod attempt;
