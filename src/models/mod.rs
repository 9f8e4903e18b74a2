// src/models/mod.rs

pub mod attempt;
pub mod entitlement;
pub mod quiz;
