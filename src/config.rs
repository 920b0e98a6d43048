//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;
use std::time::Duration;

use crate::event_bus::RetryConfig;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Environment (development, production)
    pub environment: String,

    /// Retries after the first attempt for retried event handlers
    pub event_retry_max_retries: u32,

    pub event_retry_initial_delay_ms: u64,

    pub event_retry_max_delay_ms: u64,

    pub event_retry_backoff_multiplier: f64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url =
            lookup("DATABASE_URL").ok_or(ConfigError::MissingEnv("DATABASE_URL"))?;

        let database_max_connections = parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?;

        let environment = lookup("ENVIRONMENT").unwrap_or_else(|| "development".to_string());

        let event_retry_max_retries = parse_or(&lookup, "EVENT_RETRY_MAX_RETRIES", 3)?;
        let event_retry_initial_delay_ms = parse_or(&lookup, "EVENT_RETRY_INITIAL_DELAY_MS", 100)?;
        let event_retry_max_delay_ms = parse_or(&lookup, "EVENT_RETRY_MAX_DELAY_MS", 5000)?;
        let event_retry_backoff_multiplier: f64 =
            parse_or(&lookup, "EVENT_RETRY_BACKOFF_MULTIPLIER", 2.0)?;

        if !event_retry_backoff_multiplier.is_finite() || event_retry_backoff_multiplier < 1.0 {
            return Err(ConfigError::InvalidValue("EVENT_RETRY_BACKOFF_MULTIPLIER"));
        }

        Ok(Self {
            database_url,
            database_max_connections,
            environment,
            event_retry_max_retries,
            event_retry_initial_delay_ms,
            event_retry_max_delay_ms,
            event_retry_backoff_multiplier,
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Retry policy for the balance projection subscription
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.event_retry_max_retries,
            initial_delay: Duration::from_millis(self.event_retry_initial_delay_ms),
            max_delay: Duration::from_millis(self.event_retry_max_delay_ms),
            backoff_multiplier: self.event_retry_backoff_multiplier,
        }
    }
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(name) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue(name)),
        None => Ok(default),
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}
