// src/config.rs

use dotenvy::dotenv;
use std::env;
use url::Url;

/// Fixed pass mark for exam sessions. Changing it is a deployment change,
/// not a runtime setting.
pub const PASS_THRESHOLD_PERCENT: i64 = 70;

/// Length of the candidate-facing session access token.
pub const SESSION_TOKEN_LENGTH: usize = 48;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_expiration: u64,
    pub rust_log: String,
    /// Seed credentials for the owner account (explicit `is_owner`
    /// capability). Only applied when the account does not exist yet.
    pub owner_username: Option<String>,
    pub owner_password: Option<String>,
    /// Discord-style webhook for staff notifications. Optional; delivery is
    /// best-effort.
    pub webhook_url: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");

        let jwt_secret = env::var("JWT_SECRET").expect("JWT_SECRET must be set");

        let jwt_expiration = env::var("JWT_EXPIRATION")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(86_400);

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let owner_username = env::var("OWNER_USERNAME").ok();
        let owner_password = env::var("OWNER_PASSWORD").ok();

        let webhook_url = env::var("WEBHOOK_URL").ok().and_then(|raw| {
            if Url::parse(&raw).is_ok() {
                Some(raw)
            } else {
                tracing::warn!("WEBHOOK_URL is not a valid URL, notifications disabled");
                None
            }
        });

        Self {
            database_url,
            jwt_secret,
            jwt_expiration,
            rust_log,
            owner_username,
            owner_password,
            webhook_url,
        }
    }
}
