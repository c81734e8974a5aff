//! Error types for the console access layer

use thiserror::Error;

/// Console access errors
#[derive(Debug, Error)]
pub enum AccessError {
    /// No session token in the session store
    #[error("No session token")]
    NoSessionToken,

    /// No user identity (or one without a user ID) in the session store
    #[error("No user identity in session")]
    NoUserIdentity,

    /// Permission API returned a non-200 code, or the request itself failed
    #[error("Permission fetch failed: {0}")]
    PermissionFetchFailed(String),

    /// Authenticated, but lacking the grant needed for a route or action
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// A populate attempt outlived the session it was started for
    #[error("Permission fetch superseded by a session change")]
    Superseded,

    /// The API answered HTTP 401; the session has been cleared
    #[error("Session rejected by server (HTTP 401)")]
    Unauthorized,

    /// Login endpoint answered with a non-200 code
    #[error("Login failed ({code}): {message}")]
    LoginFailed {
        code: i64,
        message: String,
    },

    /// Non-2xx HTTP status other than 401
    #[error("Unexpected HTTP status {0}")]
    UnexpectedStatus(u16),

    /// Transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Malformed JSON payload
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Session store could not be read or written
    #[error("Session storage error: {0}")]
    Storage(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AccessError {
    /// Whether the error means the user must sign in again
    pub fn requires_login(&self) -> bool {
        matches!(
            self,
            AccessError::NoSessionToken
                | AccessError::NoUserIdentity
                | AccessError::PermissionFetchFailed(_)
                | AccessError::Unauthorized
        )
    }
}

/// Result type for console access operations
pub type Result<T> = std::result::Result<T, AccessError>;
