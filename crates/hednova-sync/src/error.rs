//! # Integration Error Types
//!
//! Error types for fetch, session and cycle operations.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Integration Error Categories                         │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │     Remote      │  │       Database          │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Transport      │  │  Connection             │ │
//! │  │  ConfigLoad...  │  │  Timeout        │  │  Transaction            │ │
//! │  │  UnknownFeed    │  │  Auth           │  │  Database               │ │
//! │  │                 │  │  SessionRejected│  │                         │ │
//! │  │                 │  │  Remote, Decode │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! No variant is fatal to the process: the orchestrator records it in the
//! cycle report and the next scheduled tick is the retry.

use hednova_db::DbError;
use thiserror::Error;

/// Result type alias for integration operations.
pub type IntegrationResult<T> = Result<T, IntegrationError>;

/// Integration error type covering all possible cycle failures.
#[derive(Debug, Error)]
pub enum IntegrationError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid integrator configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Feed code with neither a built-in nor an inline table spec.
    #[error("Unknown feed code: {0}")]
    UnknownFeed(String),

    // =========================================================================
    // Remote Errors
    // =========================================================================
    /// Network failure talking to the remote service.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Request exceeded its timeout.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Authentication returned a non-success status.
    #[error("Authentication failed (code {code}): {message}")]
    Auth { code: String, message: String },

    /// The remote service rejected the session token.
    #[error("Session rejected (code {code})")]
    SessionRejected { code: String },

    /// Report fetch returned a non-success status.
    #[error("Remote error (code {code}): {message}")]
    Remote { code: String, message: String },

    /// Malformed payload or unexpected JSON shape.
    #[error("Decode error: {0}")]
    Decode(String),

    // =========================================================================
    // Database Errors
    // =========================================================================
    /// Database unreachable.
    #[error("Database connection failed: {0}")]
    Connection(String),

    /// A table synchronization failed and was rolled back.
    #[error("Transaction on {table} failed: {message}")]
    Transaction { table: String, message: String },

    /// Any other database failure.
    #[error("Database error: {0}")]
    Database(String),

    // =========================================================================
    // Cycle Errors
    // =========================================================================
    /// Another cycle or feed run holds the running flag.
    #[error("A cycle is already running")]
    Busy,

    /// Neither login nor the session store produced a token.
    #[error("No session available")]
    NoSession,
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<DbError> for IntegrationError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::ConnectionFailed(msg) => IntegrationError::Connection(msg),
            DbError::PoolExhausted => {
                IntegrationError::Connection("connection pool exhausted".to_string())
            }
            DbError::TransactionFailed { table, message } => {
                IntegrationError::Transaction { table, message }
            }
            other => IntegrationError::Database(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for IntegrationError {
    fn from(err: serde_json::Error) -> Self {
        IntegrationError::Decode(err.to_string())
    }
}

impl From<base64::DecodeError> for IntegrationError {
    fn from(err: base64::DecodeError) -> Self {
        IntegrationError::Decode(err.to_string())
    }
}

impl From<url::ParseError> for IntegrationError {
    fn from(err: url::ParseError) -> Self {
        IntegrationError::InvalidConfig(format!("invalid URL: {}", err))
    }
}

impl From<std::io::Error> for IntegrationError {
    fn from(err: std::io::Error) -> Self {
        IntegrationError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for IntegrationError {
    fn from(err: toml::de::Error) -> Self {
        IntegrationError::ConfigLoadFailed(err.to_string())
    }
}

impl From<hednova_core::CoreError> for IntegrationError {
    fn from(err: hednova_core::CoreError) -> Self {
        IntegrationError::InvalidConfig(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl IntegrationError {
    /// True for failures the next cycle may not see again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            IntegrationError::Transport(_)
                | IntegrationError::Timeout(_)
                | IntegrationError::SessionRejected { .. }
                | IntegrationError::Connection(_)
                | IntegrationError::Transaction { .. }
                | IntegrationError::Busy
                | IntegrationError::NoSession
        )
    }

    /// True when the session must be refreshed before trying again.
    pub fn requires_reauth(&self) -> bool {
        matches!(self, IntegrationError::SessionRejected { .. })
    }

    /// True for configuration problems.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            IntegrationError::InvalidConfig(_)
                | IntegrationError::ConfigLoadFailed(_)
                | IntegrationError::UnknownFeed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(IntegrationError::Transport("refused".into()).is_retryable());
        assert!(IntegrationError::Timeout(30).is_retryable());
        assert!(IntegrationError::Connection("locked".into()).is_retryable());

        assert!(!IntegrationError::InvalidConfig("bad".into()).is_retryable());
        assert!(!IntegrationError::Decode("bad base64".into()).is_retryable());
    }

    #[test]
    fn test_reauth() {
        let rejected = IntegrationError::SessionRejected { code: "401".into() };
        assert!(rejected.requires_reauth());
        assert!(!IntegrationError::Remote {
            code: "500".into(),
            message: "boom".into()
        }
        .requires_reauth());
    }

    #[test]
    fn test_db_error_mapping() {
        let err: IntegrationError = DbError::ConnectionFailed("unable to open".into()).into();
        assert!(matches!(err, IntegrationError::Connection(_)));

        let err: IntegrationError = DbError::transaction("KR_CARI00", "constraint").into();
        assert!(matches!(err, IntegrationError::Transaction { ref table, .. } if table == "KR_CARI00"));
    }
}
