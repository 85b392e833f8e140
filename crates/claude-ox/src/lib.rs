#![cfg_attr(not(test), deny(unsafe_code))]
#![warn(
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::missing_docs_in_private_items
)]

pub mod error;
mod internal;
pub mod message;
pub mod model;
pub mod prelude;
pub mod request;
pub mod response;
pub mod streaming;
pub mod tool;
pub mod usage;

// Re-export main types
pub use error::ClaudeRequestError;
pub use model::Model;
pub use request::ChatRequest;
pub use response::{ChatResponse, StreamEvent};
pub use streaming::{ChatStream, ResponseAccumulator};
pub use usage::Usage;

use backon::{ExponentialBuilder, Retryable};
use bon::Builder;
use core::fmt;
#[cfg(feature = "leaky-bucket")]
use leaky_bucket::RateLimiter;
#[cfg(feature = "leaky-bucket")]
use std::sync::Arc;
use std::time::Duration;

use crate::internal::ClaudeRequestHelper;

const BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_RETRIES: usize = 6;
const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_secs(2);

#[derive(Clone, Builder)]
pub struct Claude {
    #[builder(into)]
    pub(crate) api_key: String,
    #[builder(default)]
    pub(crate) client: reqwest::Client,
    #[cfg(feature = "leaky-bucket")]
    pub(crate) leaky_bucket: Option<Arc<RateLimiter>>,
    #[builder(default = BASE_URL.to_string(), into)]
    pub(crate) base_url: String,
    #[builder(default = API_VERSION.to_string(), into)]
    pub(crate) api_version: String,
    #[builder(default = DEFAULT_MAX_RETRIES)]
    pub(crate) max_retries: usize,
    #[builder(default = DEFAULT_RETRY_BASE_DELAY)]
    pub(crate) retry_base_delay: Duration,
}

impl Claude {
    /// Create a new Claude client with the provided API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            client: reqwest::Client::new(),
            #[cfg(feature = "leaky-bucket")]
            leaky_bucket: None,
            base_url: BASE_URL.to_string(),
            api_version: API_VERSION.to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base_delay: DEFAULT_RETRY_BASE_DELAY,
        }
    }

    pub fn load_from_env() -> Result<Self, std::env::VarError> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")?;
        Ok(Self::builder().api_key(api_key).build())
    }

    /// Create request helper for internal use
    fn request_helper(&self) -> ClaudeRequestHelper {
        ClaudeRequestHelper::new(
            self.client.clone(),
            &self.base_url,
            &self.api_key,
            &self.api_version,
        )
    }

    /// Backoff schedule shared by `send` and `stream`.
    fn retry_policy(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.retry_base_delay)
            .with_max_times(self.max_retries)
    }
}

impl Claude {
    /// Send a chat request and wait for the complete response.
    ///
    /// Transient failures (rate limits, overload, network errors) are
    /// retried with exponential backoff up to `max_retries` attempts.
    pub async fn send(
        &self,
        request: &request::ChatRequest,
    ) -> Result<response::ChatResponse, ClaudeRequestError> {
        let request_data = prepare_request(request)?;

        #[cfg(feature = "leaky-bucket")]
        if let Some(ref limiter) = self.leaky_bucket {
            limiter.acquire_one().await;
        }

        let helper = self.request_helper();
        let response = (|| async { helper.send_chat_request(&request_data).await })
            .retry(self.retry_policy())
            .when(ClaudeRequestError::is_retryable)
            .notify(|err: &ClaudeRequestError, delay: Duration| {
                log::warn!("Retrying request in {delay:?}: {err}");
            })
            .await?;

        if response.content.is_empty() {
            return Err(ClaudeRequestError::UnexpectedResponse(
                "empty response from anthropic api".to_string(),
            ));
        }

        Ok(response)
    }

    /// Open a streaming chat session.
    ///
    /// Retries cover only the connection attempt. Once events are flowing
    /// the stream is not reconnected, and decode failures end it.
    pub async fn stream(
        &self,
        request: &request::ChatRequest,
    ) -> Result<streaming::ChatStream, ClaudeRequestError> {
        let mut request_data = prepare_request(request)?;
        request_data.stream = Some(true);

        #[cfg(feature = "leaky-bucket")]
        if let Some(ref limiter) = self.leaky_bucket {
            limiter.acquire_one().await;
        }

        let helper = self.request_helper();
        let reader = (|| async { helper.open_event_stream(&request_data).await })
            .retry(self.retry_policy())
            .when(ClaudeRequestError::is_retryable)
            .notify(|err: &ClaudeRequestError, delay: Duration| {
                log::warn!("Retrying stream connect in {delay:?}: {err}");
            })
            .await?;

        Ok(streaming::ChatStream::new(reader))
    }
}

/// Validate messages and normalize a copy of the request for submission.
///
/// Assistant content is reordered so tool-use blocks come last, and
/// server-assigned message ids are stripped. The caller's request is left
/// untouched.
fn prepare_request(request: &ChatRequest) -> Result<ChatRequest, ClaudeRequestError> {
    if request.messages.is_empty() {
        return Err(ClaudeRequestError::NoMessages);
    }
    for (index, message) in request.messages.iter().enumerate() {
        if message.is_empty() {
            return Err(ClaudeRequestError::EmptyMessage(index));
        }
    }

    let mut prepared = request.clone();
    prepared.messages.reorder_tool_use_blocks();
    for message in prepared.messages.iter_mut() {
        message.id = None;
    }
    Ok(prepared)
}

impl fmt::Debug for Claude {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Claude")
            .field("api_key", &"[REDACTED]")
            .field("client", &self.client)
            .field("base_url", &self.base_url)
            .field("api_version", &self.api_version)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Content, Message, Role, Text};
    use crate::tool::ToolUse;
    use serde_json::json;

    #[test]
    fn builder_fills_in_endpoint_defaults() {
        let client = Claude::builder().api_key("test-key").build();
        assert_eq!(client.base_url, BASE_URL);
        assert_eq!(client.api_version, API_VERSION);
        assert_eq!(client.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(client.retry_base_delay, DEFAULT_RETRY_BASE_DELAY);
    }

    #[test]
    fn debug_output_redacts_the_api_key() {
        let client = Claude::new("sk-secret");
        let rendered = format!("{client:?}");
        assert!(rendered.contains("[REDACTED]"));
        assert!(!rendered.contains("sk-secret"));
    }

    #[test]
    fn requests_without_messages_are_rejected() {
        let request = ChatRequest::builder().build();
        assert!(matches!(
            prepare_request(&request),
            Err(ClaudeRequestError::NoMessages)
        ));
    }

    #[test]
    fn empty_messages_are_rejected_with_their_index() {
        let request = ChatRequest::builder()
            .message(Message::from("hello"))
            .message(Message::new(Role::Assistant, Vec::new()))
            .build();
        assert!(matches!(
            prepare_request(&request),
            Err(ClaudeRequestError::EmptyMessage(1))
        ));
    }

    #[test]
    fn preparation_reorders_and_strips_ids_on_a_copy() {
        let mut assistant = Message::assistant(vec![Content::ToolUse(ToolUse::new(
            "toolu_1".to_string(),
            "get_weather".to_string(),
            json!({}),
        ))]);
        assistant.content.push(Content::Text(Text::new("done")));
        assistant.id = Some("msg_1".to_string());

        let request = ChatRequest::builder()
            .message(Message::from("hi"))
            .message(assistant)
            .build();

        let prepared = prepare_request(&request).unwrap();

        let blocks = &prepared.messages[1].content;
        assert!(matches!(blocks[0], Content::Text(_)));
        assert!(matches!(blocks[1], Content::ToolUse(_)));
        assert_eq!(prepared.messages[1].id, None);

        // The caller's request keeps its original shape.
        assert!(matches!(
            request.messages[1].content[0],
            Content::ToolUse(_)
        ));
        assert_eq!(request.messages[1].id.as_deref(), Some("msg_1"));
    }
}
