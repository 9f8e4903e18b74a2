// src/utils/mod.rs

pub mod jwt;
pub mod shuffle;
