// src/services/mod.rs

pub mod cache;
pub mod entitlement;
pub mod notify;
pub mod recorder;
pub mod scoring;
pub mod session;
