use std::env;

pub mod cors;
pub mod security;

pub use cors::create_cors_layer;
pub use security::create_security_headers_layer;

/// Default pre-admission grace window, in minutes. Proctors may admit
/// students this long before the exam's scheduled start.
const DEFAULT_GRACE_MINUTES: i64 = 30;

const DEFAULT_PORT: u16 = 3001;

pub struct Config {
    pub port: u16,
    pub database_url: String,
    /// Shared secret the ticket token MAC is computed with.
    pub token_secret: String,
    pub grace_minutes: i64,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_PORT),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost/icue_checkin".to_string()),
            token_secret: env::var("TICKET_TOKEN_SECRET")
                .unwrap_or_else(|_| "insecure-dev-only-ticket-secret".to_string()),
            grace_minutes: env::var("CHECKIN_GRACE_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_GRACE_MINUTES),
        }
    }
}
