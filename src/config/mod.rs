//! Configuration management for UniGoods
//!
//! This module handles loading and validating configuration from environment variables,
//! with support for different environments (development, staging, production).

use std::env;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid environment value: {0}")]
    InvalidValue(String),

    #[error("Invalid port number: {0}")]
    InvalidPort(String),
}

/// Application environment
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    /// Parse environment from string
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        match s.to_lowercase().as_str() {
            "dev" | "development" => Ok(Environment::Development),
            "staging" => Ok(Environment::Staging),
            "prod" | "production" => Ok(Environment::Production),
            _ => Err(ConfigError::InvalidValue(format!(
                "Invalid environment: '{}'. Expected: dev, staging, or prod",
                s
            ))),
        }
    }

    /// Check if this is a production environment
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }

    /// Get the environment name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }
}

/// Which store implementation backs the services
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageBackend {
    #[default]
    Postgres,
    Memory,
}

impl StorageBackend {
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(StorageBackend::Postgres),
            "memory" | "in-memory" => Ok(StorageBackend::Memory),
            _ => Err(ConfigError::InvalidValue(format!(
                "Invalid storage backend: '{}'. Expected: postgres or memory",
                s
            ))),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL (empty when running on the in-memory backend)
    pub database_url: String,

    /// Store implementation
    pub storage: StorageBackend,

    /// Current environment
    pub environment: Environment,

    /// Server port
    pub port: u16,

    /// Maximum database connections
    pub db_max_connections: u32,

    /// Rate limit: requests per second per IP
    pub rate_limit_rps: u32,

    /// CORS allowed origins
    pub cors_allowed_origins: Option<String>,

    /// Log level (RUST_LOG)
    pub log_level: String,

    /// Shared secret used to verify bearer tokens
    pub jwt_secret: String,

    /// Whether a pending trade may be marked completed without being accepted
    pub allow_direct_completion: bool,

    /// Pending proposals older than this are expired (None disables the sweep)
    pub trade_proposal_ttl_hours: Option<i64>,

    /// Interval between expiry sweeps
    pub trade_expiry_sweep_seconds: u64,

    /// JSON file of users loaded into the in-memory directory at startup
    pub seed_users_file: Option<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors)
        dotenvy::dotenv().ok();

        let environment = env::var("ENVIRONMENT")
            .map(|s| Environment::parse(&s))
            .unwrap_or(Ok(Environment::Development))?;

        let storage = env::var("STORAGE_BACKEND")
            .map(|s| StorageBackend::parse(&s))
            .unwrap_or(Ok(StorageBackend::Postgres))?;

        let database_url = match (env::var("DATABASE_URL"), storage) {
            (Ok(url), _) => url,
            (Err(_), StorageBackend::Memory) => String::new(),
            (Err(_), StorageBackend::Postgres) => {
                return Err(ConfigError::MissingEnvVar("DATABASE_URL".to_string()))
            }
        };

        let port = env::var("PORT")
            .unwrap_or_else(|_| "3001".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort("PORT must be a valid number".to_string()))?;

        let db_max_connections = env::var("DB_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "5".to_string())
            .parse::<u32>()
            .unwrap_or(5);

        let rate_limit_rps = env::var("RATE_LIMIT_RPS")
            .unwrap_or_else(|_| "100".to_string())
            .parse::<u32>()
            .unwrap_or(100);

        let cors_allowed_origins = env::var("CORS_ALLOWED_ORIGINS").ok();

        let log_level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let jwt_secret = env::var("JWT_SECRET")
            .unwrap_or_else(|_| "development-secret-change-in-production".to_string());

        if environment.is_production() && jwt_secret == "development-secret-change-in-production"
        {
            return Err(ConfigError::MissingEnvVar("JWT_SECRET".to_string()));
        }

        let allow_direct_completion = match env::var("ALLOW_DIRECT_COMPLETION") {
            Ok(v) => parse_bool(&v).ok_or_else(|| {
                ConfigError::InvalidValue(format!(
                    "ALLOW_DIRECT_COMPLETION must be true or false, got '{}'",
                    v
                ))
            })?,
            Err(_) => true,
        };

        let trade_proposal_ttl_hours = env::var("TRADE_PROPOSAL_TTL_HOURS")
            .ok()
            .map(|v| parse_ttl_hours(&v))
            .transpose()?;

        let trade_expiry_sweep_seconds = env::var("TRADE_EXPIRY_SWEEP_SECONDS")
            .unwrap_or_else(|_| "300".to_string())
            .parse::<u64>()
            .unwrap_or(300)
            .max(1);

        let seed_users_file = env::var("SEED_USERS_FILE").ok().filter(|s| !s.is_empty());

        Ok(Config {
            database_url,
            storage,
            environment,
            port,
            db_max_connections,
            rate_limit_rps,
            cors_allowed_origins,
            log_level,
            jwt_secret,
            allow_direct_completion,
            trade_proposal_ttl_hours,
            trade_expiry_sweep_seconds,
            seed_users_file,
        })
    }

    /// Get database URL (useful for logging masked version)
    pub fn database_url_masked(&self) -> String {
        // Mask password in database URL for logging
        if let Some(at_pos) = self.database_url.find('@') {
            if let Some(colon_pos) = self.database_url[..at_pos].rfind(':') {
                let prefix = &self.database_url[..colon_pos + 1];
                let suffix = &self.database_url[at_pos..];
                return format!("{}****{}", prefix, suffix);
            }
        }
        self.database_url.clone()
    }
}

/// Longest proposal lifetime accepted from configuration (one year)
pub const MAX_TRADE_PROPOSAL_TTL_HOURS: i64 = 24 * 365;

fn parse_ttl_hours(value: &str) -> Result<i64, ConfigError> {
    let hours = value.trim().parse::<i64>().map_err(|_| {
        ConfigError::InvalidValue(format!(
            "TRADE_PROPOSAL_TTL_HOURS must be a number, got '{}'",
            value
        ))
    })?;

    if !(1..=MAX_TRADE_PROPOSAL_TTL_HOURS).contains(&hours) {
        return Err(ConfigError::InvalidValue(format!(
            "TRADE_PROPOSAL_TTL_HOURS must be between 1 and {}, got {}",
            MAX_TRADE_PROPOSAL_TTL_HOURS, hours
        )));
    }
    Ok(hours)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
