use std::env;
use std::time::Duration;

use crate::engine::dispatcher::DispatchPolicy;
use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub event_buffer_size: usize,
    pub assignment_timeout_secs: u64,
    pub expiry_sweep_interval_secs: u64,
    pub max_dispatch_attempts: Option<u32>,
    pub webhook_secret: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            assignment_timeout_secs: parse_or_default("ASSIGNMENT_TIMEOUT_SECS", 600)?,
            expiry_sweep_interval_secs: parse_or_default("EXPIRY_SWEEP_INTERVAL_SECS", 30)?,
            max_dispatch_attempts: parse_optional("MAX_DISPATCH_ATTEMPTS")?,
            webhook_secret: env::var("WEBHOOK_SECRET")
                .ok()
                .filter(|secret| !secret.is_empty()),
        })
    }

    pub fn dispatch_policy(&self) -> DispatchPolicy {
        DispatchPolicy {
            assignment_timeout: Duration::from_secs(self.assignment_timeout_secs),
            max_attempts: self.max_dispatch_attempts,
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.expiry_sweep_interval_secs.max(1))
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    Ok(parse_optional(key)?.unwrap_or(default))
}

fn parse_optional<T>(key: &str) -> Result<Option<T>, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) if raw.trim().is_empty() => Ok(None),
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(None),
    }
}
