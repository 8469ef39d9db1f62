//! Error types for the APSpace access layer

use thiserror::Error;

/// Result type alias for APSpace operations
pub type Result<T> = std::result::Result<T, Error>;

/// Result type for the ticket cascade and request pipeline
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Top-level error type for the application
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Interactive prompt error: {0}")]
    Dialoguer(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Operation failed: {0}")]
    Other(String),
}

impl From<dialoguer::Error> for Error {
    fn from(err: dialoguer::Error) -> Self {
        Error::Dialoguer(err.to_string())
    }
}

/// Errors raised by the ticket cascade and the request pipeline.
///
/// `Clone` so a single in-flight result can be handed to every caller
/// sharing it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("{}", authentication_message(.password_must_change))]
    AuthenticationFailure { password_must_change: bool },

    #[error("You are not authorized to use APSpace.")]
    AuthorizationFailure,

    #[error("Failed to acquire service ticket: {0}")]
    TicketAcquisition(String),

    #[error("Timed out acquiring service ticket after {0:?}")]
    TicketTimeout(std::time::Duration),

    #[error("Request failed with status {status}: {body}")]
    Client { status: u16, body: String },

    #[error("Server error: {0}")]
    TransientServer(String),

    #[error("You are now offline.")]
    Offline,

    #[error("Invalid API response: {0}")]
    InvalidResponse(String),
}

fn authentication_message(password_must_change: &bool) -> &'static str {
    if *password_must_change {
        "Your password has expired. Change it before logging in again."
    } else {
        "Invalid username or password. Run `apspace login` to sign in again."
    }
}

impl ApiError {
    /// Whether the failure is worth another attempt after a backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, ApiError::TransientServer(_))
    }

    /// Whether the failure came from the ticket cascade.
    pub fn is_ticket_failure(&self) -> bool {
        matches!(
            self,
            ApiError::AuthenticationFailure { .. }
                | ApiError::AuthorizationFailure
                | ApiError::TicketAcquisition(_)
                | ApiError::TicketTimeout(_)
        )
    }

    /// HTTP status of a client error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Client { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::TransientServer("Request timed out".to_string())
        } else if err.is_connect() {
            ApiError::TransientServer("Failed to connect to API".to_string())
        } else if err.is_decode() {
            ApiError::InvalidResponse(err.to_string())
        } else {
            ApiError::TransientServer(err.to_string())
        }
    }
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to save configuration: {0}")]
    SaveError(String),

    #[error("Username not configured. Run `apspace login` to sign in.")]
    MissingUsername,
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

/// Key-value store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Could not determine cache directory")]
    NoHome,

    #[error("Store I/O error: {0}")]
    Io(String),

    #[error("Store database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Stored value is not valid JSON: {0}")]
    Corrupt(String),

    #[error("Store task failed: {0}")]
    Task(String),
}
