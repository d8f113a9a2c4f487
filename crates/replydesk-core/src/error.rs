//! Error types for the core library.

use thiserror::Error;

use crate::store::{EmailId, TemplateId, UserId};

/// Errors raised by storage, configuration and client construction.
#[derive(Debug, Error)]
pub enum Error {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// `OAuth2` client error.
    #[error("OAuth error: {0}")]
    OAuth(#[from] replydesk_oauth::Error),

    /// User not found.
    #[error("User not found: {0}")]
    UserNotFound(UserId),

    /// Template not found (or not owned by the caller).
    #[error("Template not found: {0}")]
    TemplateNotFound(TemplateId),

    /// Email record not found (or not owned by the caller).
    #[error("Email not found: {0}")]
    EmailNotFound(EmailId),

    /// A record was rejected before being written.
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// Stored data could not be interpreted.
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Outcome of a request-level operation.
///
/// Every orchestrator operation returns exactly one of these on failure;
/// nothing is swallowed or retried on the way up.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// User or resource absent.
    #[error("Not found: {0}")]
    NotFound(String),

    /// No delegated credential stored for the user.
    #[error("Gmail not connected")]
    NotConnected,

    /// Refresh token missing, rejected, or the refresh call failed.
    #[error("Gmail authorization could not be renewed, reconnect the account: {0}")]
    RefreshFailed(String),

    /// Initial authorization code exchange failed.
    #[error("Gmail authorization failed: {0}")]
    ExchangeFailed(String),

    /// Mail provider fault during an authorized call.
    #[error("Mail provider error: {0}")]
    Provider(String),

    /// Language-model provider fault.
    #[error("Inference error: {0}")]
    Inference(String),

    /// Caller-supplied input rejected before any provider call.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Store write or read failed.
    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl ServiceError {
    /// Stable machine-readable kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::NotConnected => "not_connected",
            Self::RefreshFailed(_) => "refresh_failed",
            Self::ExchangeFailed(_) => "exchange_failed",
            Self::Provider(_) => "provider_error",
            Self::Inference(_) => "inference_error",
            Self::InvalidInput(_) => "invalid_input",
            Self::Persistence(_) => "persistence_error",
        }
    }

    /// Whether the user can fix this themselves (connect, reconnect, correct input).
    #[must_use]
    pub const fn is_user_actionable(&self) -> bool {
        matches!(
            self,
            Self::NotConnected
                | Self::RefreshFailed(_)
                | Self::ExchangeFailed(_)
                | Self::InvalidInput(_)
        )
    }
}

impl From<Error> for ServiceError {
    fn from(err: Error) -> Self {
        match err {
            Error::UserNotFound(_) | Error::TemplateNotFound(_) | Error::EmailNotFound(_) => {
                Self::NotFound(err.to_string())
            }
            Error::InvalidRecord(msg) => Self::InvalidInput(msg),
            other => Self::Persistence(other.to_string()),
        }
    }
}

/// Result type for request-level operations.
pub type ServiceResult<T> = std::result::Result<T, ServiceError>;
