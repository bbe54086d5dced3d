//! Error types for REST adapter operations.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::remote::RemoteError;

/// Fallback wait when a 429 response carries no reset header.
pub(crate) const DEFAULT_RATE_LIMIT_RESET_MINUTES: i64 = 15;

/// Errors that can occur when talking to the REST API.
#[derive(Debug, Error)]
pub enum RestError {
    /// HTTP request failed before a response arrived.
    #[error("HTTP error: {0}")]
    Http(String),

    /// JSON parsing failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// API returned an error response.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Rate limit exceeded.
    #[error("Rate limit exceeded. Resets at {reset_at}")]
    RateLimited { reset_at: DateTime<Utc> },

    /// A response decoded but violated the expected shape.
    #[error("Unexpected response: {0}")]
    Shape(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl From<RestError> for RemoteError {
    fn from(err: RestError) -> Self {
        match err {
            RestError::Http(message) => RemoteError::Network { message },
            RestError::Json(e) => RemoteError::InvalidResponse {
                message: format!("JSON parse error: {}", e),
            },
            RestError::Api { status, message } => match status {
                401 => RemoteError::AuthRequired,
                404 => RemoteError::NotFound { resource: message },
                429 => RemoteError::RateLimited {
                    reset_at: Utc::now()
                        + chrono::Duration::minutes(DEFAULT_RATE_LIMIT_RESET_MINUTES),
                },
                _ => RemoteError::Api { status, message },
            },
            RestError::RateLimited { reset_at } => RemoteError::RateLimited { reset_at },
            RestError::Shape(message) => RemoteError::InvalidResponse { message },
            RestError::Config(message) => RemoteError::Internal { message },
        }
    }
}
