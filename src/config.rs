use std::env;
use std::time::Duration;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub backend: StorageBackend,
    pub database_url: Option<String>,
    pub storage_timeout: Duration,
    pub retry_attempts: u32,
    pub retry_base_delay: Duration,
    pub event_buffer_size: usize,
    pub trend_window_days: i64,
    pub activity_limit: usize,
    pub pending_backlog_threshold: u64,
    pub success_rate_floor: f64,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        let database_url = env::var("DATABASE_URL").ok();
        let backend = match env::var("STORAGE_BACKEND") {
            Ok(raw) => match raw.as_str() {
                "postgres" => StorageBackend::Postgres,
                "memory" => StorageBackend::Memory,
                other => {
                    return Err(AppError::Internal(format!(
                        "invalid STORAGE_BACKEND: {other}"
                    )))
                }
            },
            Err(_) if database_url.is_some() => StorageBackend::Postgres,
            Err(_) => StorageBackend::Memory,
        };

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            backend,
            database_url,
            storage_timeout: Duration::from_millis(parse_or_default("STORAGE_TIMEOUT_MS", 5_000)?),
            retry_attempts: parse_or_default("STORAGE_RETRY_ATTEMPTS", 3)?,
            retry_base_delay: Duration::from_millis(parse_or_default(
                "STORAGE_RETRY_DELAY_MS",
                100,
            )?),
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            trend_window_days: parse_or_default("TREND_WINDOW_DAYS", 30)?,
            activity_limit: parse_or_default("ACTIVITY_FEED_SIZE", 10)?,
            pending_backlog_threshold: parse_or_default("PENDING_BACKLOG_ALERT", 10)?,
            success_rate_floor: parse_or_default("SUCCESS_RATE_FLOOR", 50.0)?,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            log_level: "info".to_string(),
            backend: StorageBackend::Memory,
            database_url: None,
            storage_timeout: Duration::from_millis(5_000),
            retry_attempts: 3,
            retry_base_delay: Duration::from_millis(100),
            event_buffer_size: 1024,
            trend_window_days: 30,
            activity_limit: 10,
            pending_backlog_threshold: 10,
            success_rate_floor: 50.0,
        }
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
