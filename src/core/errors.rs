use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Error body returned by the exchange for HTTP status >= 400
///
/// When the body cannot be decoded the payload is left degenerate
/// (`code = 0`, empty message) instead of being turned into a decode error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub code: i64,
    #[serde(rename = "msg", default)]
    pub message: String,
}

impl ApiError {
    /// Decode an error body, falling back to the degenerate payload
    pub fn from_body(body: &[u8]) -> Self {
        serde_json::from_slice(body).unwrap_or_default()
    }

    pub fn is_degenerate(&self) -> bool {
        self.code == 0 && self.message.is_empty()
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<APIError> code={}, msg={}", self.code, self.message)
    }
}

#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("WebSocket error: {0}")]
    WebSocketError(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Connection timeout: {0}")]
    ConnectionTimeout(String),

    #[error("Request cancelled")]
    Cancelled,

    #[error("API error (HTTP {status}): {error}")]
    ApiError { status: u16, error: ApiError },

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Configuration error: {0}")]
    ConfigError(#[from] crate::core::config::ConfigError),

    #[error("Other error: {0}")]
    Other(String),
}

impl ExchangeError {
    /// True when the exchange itself rejected the request
    pub fn is_api_error(&self) -> bool {
        matches!(self, Self::ApiError { .. })
    }

    /// True for failures that never reached the exchange's business logic
    pub fn is_transport_error(&self) -> bool {
        matches!(
            self,
            Self::HttpError(_)
                | Self::WebSocketError(_)
                | Self::NetworkError(_)
                | Self::ConnectionTimeout(_)
                | Self::Cancelled
        )
    }

    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            Self::ApiError { error, .. } => Some(error),
            _ => None,
        }
    }
}
