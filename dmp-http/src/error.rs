//! Errors produced by [`crate::MarketClient`].

use http::StatusCode;

use dmp::error::BackendError;

/// Errors that can occur while talking to the marketplace backend.
#[derive(Debug, thiserror::Error)]
pub enum MarketClientError {
    /// URL parse error.
    #[error("URL parse error: {context}: {source}")]
    UrlParse {
        /// Human-readable context.
        context: &'static str,
        /// The underlying parse error.
        #[source]
        source: url::ParseError,
    },
    /// HTTP transport error.
    #[error("HTTP error: {context}: {source}")]
    Http {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
    /// JSON deserialization error.
    #[error("Failed to deserialize JSON: {context}: {source}")]
    JsonDeserialization {
        /// Human-readable context.
        context: &'static str,
        /// The underlying serde error.
        #[source]
        source: serde_json::Error,
    },
    /// Non-success HTTP status.
    #[error("Unexpected HTTP status {status}: {context}: {message}")]
    HttpStatus {
        /// Human-readable context.
        context: &'static str,
        /// The HTTP status code.
        status: StatusCode,
        /// Reason extracted from the response body.
        message: String,
    },
    /// Failed to read response body.
    #[error("Failed to read response body as text: {context}: {source}")]
    ResponseBodyRead {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
}

impl From<MarketClientError> for BackendError {
    fn from(err: MarketClientError) -> Self {
        match err {
            MarketClientError::HttpStatus {
                status, message, ..
            } if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN => {
                Self::Unauthorized(message)
            }
            MarketClientError::HttpStatus {
                status, message, ..
            } => Self::Rejected {
                status: status.as_u16(),
                message,
            },
            MarketClientError::JsonDeserialization { .. } => {
                Self::InvalidResponse(err.to_string())
            }
            MarketClientError::UrlParse { .. }
            | MarketClientError::Http { .. }
            | MarketClientError::ResponseBodyRead { .. } => Self::Transport(err.to_string()),
        }
    }
}
