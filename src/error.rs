//! Unified error handling for the forex trading assistant
//!
//! One error type covers the whole decision-and-execution pipeline so the
//! taxonomy (connectivity / validation / partial failure / staleness) stays
//! consistent across components.

use std::fmt;
use std::io;

/// Main error type for the trading core
#[derive(Debug)]
pub enum TradingError {
    // Connectivity errors — surfaced to the caller, never auto-retried here
    NotConnected,
    ApiConnection(String),
    ApiTimeout(String),
    ApiResponse(String),

    // Broker rejections on write paths
    OrderFailed(String),
    OrderRejected(String),

    // Validation / risk errors — never retried, order simply rejected
    RiskViolation(String),
    ValidationFailed(String),
    InvalidParameter(String, String), // (parameter_name, reason)

    // Close-all completed for some legs only
    PartialFailure {
        succeeded: Vec<u64>,
        failed: Vec<(u64, String)>,
    },

    // Risk-critical read with nothing fresher than the TTL allows
    StaleData(String),

    // Configuration errors
    ConfigNotFound(String),
    ConfigParse(String),
    ConfigValidation(String),

    // Persistence errors
    DatabaseConnection(String),
    DatabaseQuery(String),
    DatabaseMigration(String),

    // General errors
    Internal(String),
}

impl TradingError {
    /// Check if the error is worth retrying after a backoff
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TradingError::ApiTimeout(_)
                | TradingError::ApiConnection(_)
                | TradingError::NotConnected
        )
    }

    /// Get error category for logging/metrics
    pub fn category(&self) -> &'static str {
        match self {
            TradingError::NotConnected
            | TradingError::ApiConnection(_)
            | TradingError::ApiTimeout(_)
            | TradingError::ApiResponse(_) => "connectivity",

            TradingError::OrderFailed(_) | TradingError::OrderRejected(_) => "order",

            TradingError::RiskViolation(_)
            | TradingError::ValidationFailed(_)
            | TradingError::InvalidParameter(_, _) => "validation",

            TradingError::PartialFailure { .. } => "partial",
            TradingError::StaleData(_) => "staleness",

            TradingError::ConfigNotFound(_)
            | TradingError::ConfigParse(_)
            | TradingError::ConfigValidation(_) => "config",

            TradingError::DatabaseConnection(_)
            | TradingError::DatabaseQuery(_)
            | TradingError::DatabaseMigration(_) => "database",

            TradingError::Internal(_) => "internal",
        }
    }
}

impl fmt::Display for TradingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradingError::NotConnected => {
                write!(f, "Broker bridge not connected")
            }
            TradingError::ApiConnection(msg) => {
                write!(f, "Broker connection error: {}", msg)
            }
            TradingError::ApiTimeout(msg) => {
                write!(f, "Broker request timed out: {}", msg)
            }
            TradingError::ApiResponse(msg) => {
                write!(f, "Broker response error: {}", msg)
            }

            TradingError::OrderFailed(msg) => {
                write!(f, "Order failed: {}", msg)
            }
            TradingError::OrderRejected(msg) => {
                write!(f, "Order rejected: {}", msg)
            }

            TradingError::RiskViolation(msg) => {
                write!(f, "Risk check failed: {}", msg)
            }
            TradingError::ValidationFailed(msg) => {
                write!(f, "Validation failed: {}", msg)
            }
            TradingError::InvalidParameter(param, reason) => {
                write!(f, "Invalid parameter '{}': {}", param, reason)
            }

            TradingError::PartialFailure { succeeded, failed } => {
                write!(
                    f,
                    "Partial failure: {} closed, {} failed",
                    succeeded.len(),
                    failed.len()
                )
            }
            TradingError::StaleData(msg) => {
                write!(f, "Stale data for risk-critical read: {}", msg)
            }

            TradingError::ConfigNotFound(path) => {
                write!(f, "Configuration file not found: {}", path)
            }
            TradingError::ConfigParse(msg) => {
                write!(f, "Configuration parse error: {}", msg)
            }
            TradingError::ConfigValidation(msg) => {
                write!(f, "Configuration validation error: {}", msg)
            }

            TradingError::DatabaseConnection(msg) => {
                write!(f, "Database connection error: {}", msg)
            }
            TradingError::DatabaseQuery(msg) => {
                write!(f, "Database query error: {}", msg)
            }
            TradingError::DatabaseMigration(msg) => {
                write!(f, "Database migration error: {}", msg)
            }

            TradingError::Internal(msg) => {
                write!(f, "Internal error: {}", msg)
            }
        }
    }
}

impl std::error::Error for TradingError {}

// Conversion implementations for common error types

impl From<io::Error> for TradingError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::TimedOut => TradingError::ApiTimeout(err.to_string()),
            io::ErrorKind::ConnectionRefused => TradingError::ApiConnection(err.to_string()),
            _ => TradingError::Internal(format!("IO error: {}", err)),
        }
    }
}

impl From<rusqlite::Error> for TradingError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::QueryReturnedNoRows => {
                TradingError::DatabaseQuery("Query returned no rows".to_string())
            }
            _ => TradingError::DatabaseQuery(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for TradingError {
    fn from(err: serde_json::Error) -> Self {
        TradingError::ApiResponse(format!("JSON parse error: {}", err))
    }
}

impl From<toml::de::Error> for TradingError {
    fn from(err: toml::de::Error) -> Self {
        TradingError::ConfigParse(format!("TOML parse error: {}", err))
    }
}

impl From<reqwest::Error> for TradingError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TradingError::ApiTimeout(err.to_string())
        } else if err.is_connect() {
            TradingError::ApiConnection(err.to_string())
        } else if err.is_status() {
            TradingError::ApiResponse(err.to_string())
        } else {
            TradingError::ApiConnection(err.to_string())
        }
    }
}

impl From<crate::config::ConfigError> for TradingError {
    fn from(err: crate::config::ConfigError) -> Self {
        use crate::config::ConfigError;
        match err {
            ConfigError::FileRead(msg) => TradingError::ConfigNotFound(msg),
            ConfigError::FileWrite(msg) => TradingError::Internal(msg),
            ConfigError::Parse(msg) => TradingError::ConfigParse(msg),
            ConfigError::Serialize(msg) => TradingError::Internal(msg),
            ConfigError::Validation(msg) => TradingError::ConfigValidation(msg),
        }
    }
}

/// Result type alias using TradingError
pub type TradingResult<T> = Result<T, TradingError>;
