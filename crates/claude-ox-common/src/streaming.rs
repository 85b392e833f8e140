use crate::error::CommonRequestError;
use futures_util::{StreamExt, stream::BoxStream};
use serde::Deserialize;
use std::marker::PhantomData;

/// Callback invoked with every raw line read from the SSE transport,
/// including lines the reader goes on to ignore. Returning an error aborts
/// the stream.
pub type LineCallback =
    Box<dyn FnMut(&str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> + Send>;

/// Server-Sent Events reader that decodes one typed value per `data` line.
///
/// Lines may arrive split across arbitrarily many transport chunks; the
/// reader buffers bytes until a full line is available. Blank lines and SSE
/// framing fields (`event:`, `id:`, comments) are skipped, a literal
/// `[DONE]` token ends the stream cleanly, and a JSON decode failure is
/// surfaced exactly once, after which the reader reports end of stream.
pub struct SseLineReader<T> {
    byte_stream: BoxStream<'static, Result<bytes::Bytes, CommonRequestError>>,
    buffer: Vec<u8>,
    line_callback: Option<LineCallback>,
    done: bool,
    _event: PhantomData<fn() -> T>,
}

impl<T: for<'de> Deserialize<'de>> SseLineReader<T> {
    pub fn new<S>(stream: S) -> Self
    where
        S: futures_util::Stream<Item = Result<bytes::Bytes, CommonRequestError>>
            + Send
            + 'static,
    {
        Self {
            byte_stream: Box::pin(stream),
            buffer: Vec::new(),
            line_callback: None,
            done: false,
            _event: PhantomData,
        }
    }

    pub fn from_response(response: reqwest::Response) -> Self {
        Self::new(
            response
                .bytes_stream()
                .map(|chunk| chunk.map_err(CommonRequestError::from)),
        )
    }

    /// Set an optional callback that observes every raw line.
    #[must_use]
    pub fn with_line_callback(mut self, callback: LineCallback) -> Self {
        self.line_callback = Some(callback);
        self
    }

    /// Get the next decoded event from the stream.
    ///
    /// Returns `Ok(None)` once the stream has ended, whether by `[DONE]`,
    /// transport end, or a previously surfaced terminal error.
    pub async fn next_event(&mut self) -> Result<Option<T>, CommonRequestError> {
        if self.done {
            return Ok(None);
        }
        match self.advance().await {
            Ok(Some(event)) => Ok(Some(event)),
            Ok(None) => {
                self.done = true;
                Ok(None)
            }
            Err(err) => {
                self.done = true;
                Err(err)
            }
        }
    }

    async fn advance(&mut self) -> Result<Option<T>, CommonRequestError> {
        loop {
            // Drain complete lines already in the buffer
            while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
                let line_bytes = self.buffer.drain(..=pos).collect::<Vec<u8>>();
                let line = String::from_utf8(line_bytes)?;
                if let Some(event) = self.process_line(&line)? {
                    return Ok(Some(event));
                }
                if self.done {
                    return Ok(None);
                }
            }

            if let Some(chunk) = self.byte_stream.next().await {
                self.buffer.extend_from_slice(&chunk?);
            } else {
                // Transport ended; a trailing unterminated line still counts
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                let line = String::from_utf8(std::mem::take(&mut self.buffer))?;
                return self.process_line(&line);
            }
        }
    }

    fn process_line(&mut self, line: &str) -> Result<Option<T>, CommonRequestError> {
        if let Some(callback) = self.line_callback.as_mut() {
            callback(line).map_err(CommonRequestError::Callback)?;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }

        let data = trimmed.strip_prefix("data:").map_or(trimmed, str::trim_start);

        if data == "[DONE]" {
            self.done = true;
            return Ok(None);
        }

        // Non-JSON lines are SSE framing (event:, id:, comments)
        if !data.starts_with('{') {
            return Ok(None);
        }

        let event: T = serde_json::from_str(data).map_err(|e| {
            CommonRequestError::InvalidEventData(format!("JSON parse error: {e}"))
        })?;
        Ok(Some(event))
    }
}
