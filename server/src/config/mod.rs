use std::env;
use std::fmt::Display;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::services::reservations::DEFAULT_MAX_PARTICIPANTS;
use crate::services::validation::DEFAULT_VALIDATION_LEAD_MINUTES;
use crate::services::EngineSettings;
use crate::utils::RetryPolicy;

pub mod cors;
pub mod security;

pub use cors::create_cors_layer;
pub use security::with_security_headers;

const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_TRANSIENT_RETRY_ATTEMPTS: u32 = 4;
const DEFAULT_DELIVERY_QUEUE_CAPACITY: usize = 1024;
const DEFAULT_DELIVERY_RETRY_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone)]
pub struct Config {
    /// `None` runs the engine on the in-memory store.
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub bind_addr: SocketAddr,
    pub cors_allowed_origins: Option<String>,
    pub production: bool,
    pub max_participants: usize,
    pub validation_lead_minutes: i64,
    pub transient_retry_attempts: u32,
    pub delivery_queue_capacity: usize,
    pub delivery_retry_attempts: u32,
    pub expiry_sweep_interval: Option<Duration>,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let default_bind = SocketAddr::from(([0, 0, 0, 0], 3001));
        Self {
            database_url: non_empty("DATABASE_URL"),
            database_max_connections: parse_or(
                &lookup,
                "DATABASE_MAX_CONNECTIONS",
                DEFAULT_MAX_CONNECTIONS,
            ),
            bind_addr: parse_or(&lookup, "BIND_ADDR", default_bind),
            cors_allowed_origins: non_empty("CORS_ALLOWED_ORIGINS"),
            production: lookup("RUST_ENV")
                .map(|v| v.eq_ignore_ascii_case("production"))
                .unwrap_or(false),
            max_participants: parse_or(
                &lookup,
                "MAX_PARTICIPANTS_PER_RESERVATION",
                DEFAULT_MAX_PARTICIPANTS,
            )
            .max(1),
            validation_lead_minutes: parse_or(
                &lookup,
                "VALIDATION_LEAD_MINUTES",
                DEFAULT_VALIDATION_LEAD_MINUTES,
            )
            .max(0),
            transient_retry_attempts: parse_or(
                &lookup,
                "TRANSIENT_RETRY_ATTEMPTS",
                DEFAULT_TRANSIENT_RETRY_ATTEMPTS,
            )
            .max(1),
            delivery_queue_capacity: parse_or(
                &lookup,
                "DELIVERY_QUEUE_CAPACITY",
                DEFAULT_DELIVERY_QUEUE_CAPACITY,
            )
            .max(1),
            delivery_retry_attempts: parse_or(
                &lookup,
                "DELIVERY_RETRY_ATTEMPTS",
                DEFAULT_DELIVERY_RETRY_ATTEMPTS,
            )
            .max(1),
            expiry_sweep_interval: non_empty("EXPIRY_SWEEP_INTERVAL_SECS")
                .and_then(|raw| match raw.trim().parse::<u64>() {
                    Ok(0) => None,
                    Ok(secs) => Some(Duration::from_secs(secs)),
                    Err(e) => {
                        warn!("Config: ignoring EXPIRY_SWEEP_INTERVAL_SECS='{}': {}", raw, e);
                        None
                    }
                }),
        }
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            max_participants: self.max_participants,
            validation_lead: chrono::Duration::minutes(self.validation_lead_minutes),
            transient_retry: RetryPolicy::transient()
                .with_max_attempts(self.transient_retry_attempts),
        }
    }

    pub fn delivery_retry(&self) -> RetryPolicy {
        RetryPolicy::external().with_max_attempts(self.delivery_retry_attempts)
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match lookup(key) {
        None => default,
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(e) => {
                warn!("Config: invalid {}='{}' ({}), using {}", key, raw, e, default);
                default
            }
        },
    }
}
