//! Error types shared by the store, the PAC renderer and the HTTP layer

use thiserror::Error;

/// Library error type
#[derive(Error, Debug)]
pub enum PacError {
    /// Input rejected at the boundary (bad port, blank host, unknown type...)
    #[error("Invalid input: {message}")]
    Validation { message: String },

    #[error("Host {id} not found")]
    HostNotFound { id: u32 },

    #[error("Rule not found: {key}")]
    RuleNotFound { key: String },

    /// A host cannot be removed while rules still point at it
    #[error("Host {id} is referenced by rule(s): {patterns}")]
    HostInUse { id: u32, patterns: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PacError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// True for errors caused by the caller rather than the service
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. }
                | Self::HostNotFound { .. }
                | Self::RuleNotFound { .. }
                | Self::HostInUse { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, PacError>;
