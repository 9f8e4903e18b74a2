// src/config.rs

use std::env;
use dotenvy::dotenv;

/// Default lifetime of a cached quiz/question/option snapshot.
pub const DEFAULT_CACHE_TTL_SECS: u64 = 3600;

/// Default upper bound on cached snapshot entries.
pub const DEFAULT_CACHE_MAX_ENTRIES: u64 = 10_000;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub rust_log: String,
    pub server_port: u16,
    pub cache_ttl_secs: u64,
    pub cache_max_entries: u64,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set");

        let jwt_secret = env::var("JWT_SECRET")
            .expect("JWT_SECRET must be set");

        let rust_log = env::var("RUST_LOG")
            .unwrap_or_else(|_| "info".to_string());

        let server_port = parse_or("SERVER_PORT", 3000);
        let cache_ttl_secs = parse_or("CACHE_TTL_SECS", DEFAULT_CACHE_TTL_SECS);
        let cache_max_entries = parse_or("CACHE_MAX_ENTRIES", DEFAULT_CACHE_MAX_ENTRIES);

        Self {
            database_url,
            jwt_secret,
            rust_log,
            server_port,
            cache_ttl_secs,
            cache_max_entries,
        }
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}
