//! Unified error handling for txfetch
//!
//! Every failure the request core can surface is a variant of [`ClientError`].
//! The type is `Clone` because callers joined on one shared pending request
//! must all observe the same failure.

use std::{fmt, time::Duration};

use http::StatusCode;

/// Unified error types for the request core
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Transport deadline exceeded; never retried
    Timeout(Duration),

    /// Transport-level failure (connect, TLS, body read)
    Network(String),

    /// Non-2xx response without a handled unauthorized signal
    Http { status: StatusCode, message: String },

    /// Re-authentication finished but the session token never changed
    AuthRefreshTimeout(Duration),

    /// The session gate reported that authentication failed
    AuthRefreshFailed,

    /// The request was rejected again after a refreshed session
    Unauthorized(String),

    /// Response body is not the expected JSON
    Decode(String),

    /// Login was rejected or returned no session token
    LoginFailed(String),

    /// Configuration-related errors
    Configuration(String),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Timeout(after) => {
                write!(f, "Request timeout after {}s", after.as_secs_f32())
            }
            ClientError::Network(msg) => write!(f, "Network error: {msg}"),
            ClientError::Http { status, message } => {
                write!(f, "HTTP {}: {message}", status.as_u16())
            }
            ClientError::AuthRefreshTimeout(after) => write!(
                f,
                "Session token not updated within {}s after login",
                after.as_secs_f32()
            ),
            ClientError::AuthRefreshFailed => write!(f, "Authentication failed"),
            ClientError::Unauthorized(msg) => write!(f, "Unauthorized: {msg}"),
            ClientError::Decode(msg) => write!(f, "Invalid response body: {msg}"),
            ClientError::LoginFailed(msg) => write!(f, "Login failed: {msg}"),
            ClientError::Configuration(msg) => write!(f, "Configuration error: {msg}"),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Decode(err.to_string())
    }
}

/// Result type alias for request core operations
pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Helper trait for adding context to errors
pub trait ErrorContext<T> {
    fn with_context(self, context: &str) -> ClientResult<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: fmt::Display,
{
    fn with_context(self, context: &str) -> ClientResult<T> {
        self.map_err(|e| ClientError::Configuration(format!("{context}: {e}")))
    }
}

/// Convenience macro for configuration errors
#[macro_export]
macro_rules! config_error {
    ($msg:expr) => {
        $crate::core::ClientError::Configuration($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::core::ClientError::Configuration(format!($fmt, $($arg)*))
    };
}
