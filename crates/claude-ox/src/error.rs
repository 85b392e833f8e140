use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Categorizes errors for retry logic and handling
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rate limiting - should retry with backoff
    RateLimit,
    /// Authentication/authorization issues - should not retry
    Auth,
    /// Invalid request format - should not retry
    InvalidRequest,
    /// Server overloaded - may retry
    ServerOverloaded,
    /// Network/connection issues - may retry
    Network,
    /// API temporarily unavailable - may retry
    ServiceUnavailable,
    /// Unknown/other errors
    Other,
}

/// Error envelope carried by `error` stream events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorInfo {
    pub r#type: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorDetail {
    pub message: String,
    #[serde(default)]
    pub r#type: Option<String>,
    #[serde(default)]
    pub param: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Error)]
pub enum ClaudeRequestError {
    /// Errors from the HTTP client
    #[error(transparent)]
    ReqwestError(#[from] reqwest::Error),

    /// JSON serialization/deserialization errors
    #[error(transparent)]
    SerdeError(#[from] serde_json::Error),

    /// Invalid request errors from the API
    #[error("Invalid request error: {message}")]
    InvalidRequestError {
        message: String,
        param: Option<String>,
        code: Option<String>,
    },

    /// Authentication error
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Permission denied
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Resource not found
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Rate limit exceeded
    #[error("Rate limit exceeded")]
    RateLimit,

    /// API overloaded
    #[error("API overloaded: {0}")]
    Overloaded(String),

    /// Generic API error
    #[error("API error: {0}")]
    Generic(String),

    /// Non-success HTTP status with no structured error body
    #[error("API error (status {status}): {message}")]
    Http { status: u16, message: String },

    /// Unexpected response from the API
    #[error("Unexpected response from API: {0}")]
    UnexpectedResponse(String),

    /// Invalid event data in stream
    #[error("Invalid event data: {0}")]
    InvalidEventData(String),

    /// Stream error
    #[error("Stream error: {0}")]
    Stream(String),

    /// A `message_start` event arrived without its message snapshot
    #[error("invalid message start event")]
    InvalidMessageStart,

    /// A block or delta event arrived before any `message_start`
    #[error("no message start event found")]
    MessageNotStarted,

    /// A `content_block_start` event arrived without its block payload
    #[error("no content block found in event")]
    MissingContentBlock,

    /// A `content_block_delta` event arrived without delta or index
    #[error("invalid content block delta event")]
    InvalidContentBlockDelta,

    /// A `message_delta` event arrived without its delta payload
    #[error("invalid message delta event")]
    InvalidMessageDelta,

    /// A delta addressed an index with no in-progress block
    #[error("content block not found for index {0}")]
    ContentBlockNotFound(usize),

    /// A delta's kind does not match the block it addresses
    #[error("in-progress block at index {index} is not a {expected} content")]
    BlockTypeMismatch {
        index: usize,
        expected: &'static str,
    },

    /// Request validation: empty message list
    #[error("no messages provided")]
    NoMessages,

    /// Request validation: a message with no content blocks
    #[error("empty message detected (index {0})")]
    EmptyMessage(usize),

    /// Prefill requires its closing tag in the first text block
    #[error("prefill closing tag not found")]
    PrefillClosingTagNotFound,

    /// Prefill requires a text block to attach to
    #[error("no text content found in message")]
    NoTextContent,
}

impl ClaudeRequestError {
    /// Returns the error kind for categorizing errors in retry logic
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RateLimit => ErrorKind::RateLimit,
            Self::Authentication(_) | Self::PermissionDenied(_) => ErrorKind::Auth,
            Self::InvalidRequestError { .. } | Self::NotFound(_) => ErrorKind::InvalidRequest,
            Self::Overloaded(_) => ErrorKind::ServerOverloaded,
            Self::ReqwestError(e) => {
                if e.is_timeout() || e.is_connect() || e.is_request() {
                    ErrorKind::Network
                } else {
                    ErrorKind::Other
                }
            }
            Self::Http { status, .. } => match status {
                500 | 503 | 504 | 520 => ErrorKind::ServiceUnavailable,
                _ => ErrorKind::Other,
            },
            Self::Generic(_) | Self::UnexpectedResponse(_) => ErrorKind::ServiceUnavailable,
            Self::SerdeError(_) | Self::InvalidEventData(_) | Self::Stream(_) => ErrorKind::Other,
            Self::InvalidMessageStart
            | Self::MessageNotStarted
            | Self::MissingContentBlock
            | Self::InvalidContentBlockDelta
            | Self::InvalidMessageDelta
            | Self::ContentBlockNotFound(_)
            | Self::BlockTypeMismatch { .. } => ErrorKind::Other,
            Self::NoMessages
            | Self::EmptyMessage(_)
            | Self::PrefillClosingTagNotFound
            | Self::NoTextContent => ErrorKind::InvalidRequest,
        }
    }

    /// Returns true if this error should be retried
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::RateLimit
                | ErrorKind::ServerOverloaded
                | ErrorKind::Network
                | ErrorKind::ServiceUnavailable
        )
    }
}

impl From<ErrorInfo> for ClaudeRequestError {
    fn from(error: ErrorInfo) -> Self {
        match error.r#type.as_str() {
            "invalid_request_error" => ClaudeRequestError::InvalidRequestError {
                message: error.message,
                param: None,
                code: None,
            },
            "authentication_error" => ClaudeRequestError::Authentication(error.message),
            "permission_error" => ClaudeRequestError::PermissionDenied(error.message),
            "not_found_error" => ClaudeRequestError::NotFound(error.message),
            "rate_limit_error" => ClaudeRequestError::RateLimit,
            "api_error" => ClaudeRequestError::Generic(error.message),
            "overloaded_error" => ClaudeRequestError::Overloaded(error.message),
            _ => ClaudeRequestError::UnexpectedResponse(format!(
                "Unknown error type: {}",
                error.r#type
            )),
        }
    }
}

impl From<claude_ox_common::CommonRequestError> for ClaudeRequestError {
    fn from(error: claude_ox_common::CommonRequestError) -> Self {
        use claude_ox_common::CommonRequestError;
        match error {
            CommonRequestError::Http(e) => ClaudeRequestError::ReqwestError(e),
            CommonRequestError::Json(e) => ClaudeRequestError::SerdeError(e),
            CommonRequestError::InvalidEventData(message) => {
                ClaudeRequestError::InvalidEventData(message)
            }
            CommonRequestError::Utf8Error(e) => {
                ClaudeRequestError::Stream(format!("invalid UTF-8 in stream: {e}"))
            }
            CommonRequestError::Callback(e) => ClaudeRequestError::Stream(e.to_string()),
        }
    }
}

/// Parse an error response from the API.
/// This function handles both JSON format errors and plain text errors.
pub fn parse_error_response(
    status: reqwest::StatusCode,
    bytes: bytes::Bytes,
) -> ClaudeRequestError {
    // Try to parse as a structured API error first
    if let Ok(payload) = serde_json::from_slice::<ApiErrorResponse>(&bytes) {
        match payload.error.r#type.as_deref() {
            Some("invalid_request_error") => ClaudeRequestError::InvalidRequestError {
                message: payload.error.message,
                param: payload.error.param,
                code: payload.error.code,
            },
            Some("authentication_error") => {
                ClaudeRequestError::Authentication(payload.error.message)
            }
            Some("permission_error") => {
                ClaudeRequestError::PermissionDenied(payload.error.message)
            }
            Some("not_found_error") => ClaudeRequestError::NotFound(payload.error.message),
            Some("rate_limit_error") => ClaudeRequestError::RateLimit,
            Some("api_error") => ClaudeRequestError::Generic(payload.error.message),
            Some("overloaded_error") => ClaudeRequestError::Overloaded(payload.error.message),
            _ => ClaudeRequestError::UnexpectedResponse(payload.error.message),
        }
    } else {
        // Fall back to status-based classification
        let error_text = String::from_utf8_lossy(&bytes).to_string();
        match status.as_u16() {
            429 => ClaudeRequestError::RateLimit,
            401 => ClaudeRequestError::Authentication(error_text),
            403 => ClaudeRequestError::PermissionDenied(error_text),
            404 => ClaudeRequestError::NotFound(error_text),
            code => ClaudeRequestError::Http {
                status: code,
                message: error_text,
            },
        }
    }
}
