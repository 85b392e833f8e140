use claude_ox_common::{
    AuthMethod, Endpoint, HttpMethod, RequestBuilder, RequestConfig, SseLineReader,
};

use crate::{
    error::{self, ClaudeRequestError},
    request::ChatRequest,
    response::{ChatResponse, StreamEvent},
};

/// Path of the messages endpoint, relative to the configured base URL.
pub(crate) const CHAT_PATH: &str = "v1/messages";

/// Wraps the shared [`RequestBuilder`] with the headers every call to the
/// API needs: `x-api-key` for authentication and `anthropic-version` for
/// wire-format selection.
pub(crate) struct ClaudeRequestHelper {
    builder: RequestBuilder,
}

impl ClaudeRequestHelper {
    pub(crate) fn new(
        client: reqwest::Client,
        base_url: &str,
        api_key: &str,
        api_version: &str,
    ) -> Self {
        let config = RequestConfig::new(base_url)
            .with_auth(AuthMethod::ApiKey {
                header_name: "x-api-key".to_string(),
                key: api_key.to_string(),
            })
            .with_header("anthropic-version", api_version);

        Self {
            builder: RequestBuilder::new(client, config),
        }
    }

    /// Send a chat request and decode the complete response body.
    pub(crate) async fn send_chat_request(
        &self,
        request: &ChatRequest,
    ) -> Result<ChatResponse, ClaudeRequestError> {
        let endpoint = Endpoint::new(CHAT_PATH, HttpMethod::Post);
        let res = self
            .builder
            .build_request(&endpoint)?
            .json(request)
            .send()
            .await?;

        if res.status().is_success() {
            Ok(res.json().await?)
        } else {
            let status = res.status();
            let bytes = res.bytes().await?;
            Err(error::parse_error_response(status, bytes))
        }
    }

    /// Open a streaming connection and hand back the SSE line reader.
    ///
    /// The status is checked before any event is decoded, so a rejected
    /// connection surfaces here as a typed error rather than mid-stream.
    pub(crate) async fn open_event_stream(
        &self,
        request: &ChatRequest,
    ) -> Result<SseLineReader<StreamEvent>, ClaudeRequestError> {
        let endpoint = Endpoint::new(CHAT_PATH, HttpMethod::Post);
        let res = self
            .builder
            .build_request(&endpoint)?
            .json(request)
            .send()
            .await?;

        if !res.status().is_success() {
            let status = res.status();
            let bytes = res.bytes().await?;
            return Err(error::parse_error_response(status, bytes));
        }

        Ok(SseLineReader::from_response(res))
    }
}
