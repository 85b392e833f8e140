use thiserror::Error;

/// Errors produced by the shared HTTP and SSE layers
#[derive(Error, Debug)]
pub enum CommonRequestError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid event data in streaming response
    #[error("Invalid event data: {0}")]
    InvalidEventData(String),

    /// UTF-8 conversion error
    #[error("UTF-8 conversion error: {0}")]
    Utf8Error(#[from] std::string::FromUtf8Error),

    /// A raw-line callback rejected the stream
    #[error("Stream line callback failed: {0}")]
    Callback(#[source] Box<dyn std::error::Error + Send + Sync>),
}
