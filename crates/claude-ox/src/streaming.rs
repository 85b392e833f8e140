//! Streaming response assembly: a pull-based event iterator over the SSE
//! wire and an accumulator that folds events back into a [`ChatResponse`].

use std::{
    collections::BTreeMap,
    sync::atomic::{AtomicBool, Ordering},
};

use futures_util::stream::BoxStream;

use claude_ox_common::streaming::SseLineReader;

use crate::{
    error::ClaudeRequestError,
    message::{Citation, Content, RedactedThinking, ServerToolUse, Text, Thinking},
    response::{ChatResponse, ContentBlockDelta, StartContentBlock, StreamEvent},
    tool::ToolUse,
    usage::Usage,
};

/// A content block being assembled from start + delta events. Tool input
/// stays raw text until materialization; partial JSON is never parsed
/// incrementally.
#[derive(Debug, Clone)]
enum BlockInProgress {
    Text {
        text: String,
        citations: Vec<Citation>,
    },
    ToolUse {
        id: String,
        name: String,
        input_json: String,
    },
    ServerToolUse {
        id: String,
        name: String,
        input_json: String,
    },
    Thinking {
        thinking: String,
        signature: String,
    },
    RedactedThinking {
        data: String,
    },
    Unsupported,
}

impl BlockInProgress {
    fn from_start(block: &StartContentBlock) -> Self {
        match block {
            StartContentBlock::Text { text, citations } => Self::Text {
                text: text.clone(),
                citations: citations.clone().unwrap_or_default(),
            },
            StartContentBlock::ToolUse { id, name } => Self::ToolUse {
                id: id.clone(),
                name: name.clone(),
                input_json: String::new(),
            },
            StartContentBlock::ServerToolUse { id, name } => Self::ServerToolUse {
                id: id.clone(),
                name: name.clone(),
                input_json: String::new(),
            },
            StartContentBlock::Thinking {
                thinking,
                signature,
            } => Self::Thinking {
                thinking: thinking.clone(),
                signature: signature.clone().unwrap_or_default(),
            },
            StartContentBlock::RedactedThinking { data } => Self::RedactedThinking {
                data: data.clone(),
            },
            StartContentBlock::Unrecognized => Self::Unsupported,
        }
    }

    fn materialize(&self) -> Option<Content> {
        match self {
            Self::Text { text, citations } => Some(Content::Text(Text {
                text: text.clone(),
                citations: if citations.is_empty() {
                    None
                } else {
                    Some(citations.clone())
                },
                cache_control: None,
            })),
            Self::ToolUse {
                id,
                name,
                input_json,
            } => Some(Content::ToolUse(ToolUse::new(
                id.clone(),
                name.clone(),
                parse_input_json(input_json),
            ))),
            Self::ServerToolUse {
                id,
                name,
                input_json,
            } => Some(Content::ServerToolUse(ServerToolUse {
                id: id.clone(),
                name: name.clone(),
                input: parse_input_json(input_json),
            })),
            Self::Thinking {
                thinking,
                signature,
            } => Some(Content::Thinking(Thinking {
                thinking: thinking.clone(),
                signature: if signature.is_empty() {
                    None
                } else {
                    Some(signature.clone())
                },
            })),
            Self::RedactedThinking { data } => Some(Content::RedactedThinking(RedactedThinking {
                data: data.clone(),
            })),
            Self::Unsupported => None,
        }
    }
}

/// Accumulated tool input may be empty or cut off mid-stream; snapshots
/// fall back to an empty object rather than failing.
fn parse_input_json(input_json: &str) -> serde_json::Value {
    serde_json::from_str(input_json).unwrap_or_else(|_| serde_json::json!({}))
}

/// Folds a stream of events into the response they describe.
///
/// Blocks are keyed by index in a `BTreeMap` because starts may address
/// indices out of order; `message_stop` freezes the table into content
/// sorted by ascending index, skipping gaps.
#[derive(Debug, Default, Clone)]
pub struct ResponseAccumulator {
    response: Option<ChatResponse>,
    blocks: BTreeMap<usize, BlockInProgress>,
    complete: bool,
    pending_usage: Option<Usage>,
}

impl ResponseAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_event(&mut self, event: &StreamEvent) -> Result<(), ClaudeRequestError> {
        match event {
            StreamEvent::MessageStart { message, .. } => {
                let Some(snapshot) = message else {
                    return Err(ClaudeRequestError::InvalidMessageStart);
                };
                let mut response = snapshot.clone();
                if let Some(pending) = self.pending_usage.take() {
                    response.usage.add(&pending);
                }
                self.response = Some(response);
                // The snapshot's embedded usage is adopted wholesale; an
                // event-level payload on message_start is not re-added.
                return Ok(());
            }
            StreamEvent::ContentBlockStart {
                index,
                content_block,
                ..
            } => {
                if self.response.is_none() {
                    return Err(ClaudeRequestError::MessageNotStarted);
                }
                let Some(block) = content_block else {
                    return Err(ClaudeRequestError::MissingContentBlock);
                };
                let in_progress = BlockInProgress::from_start(block);
                // Without an explicit index, the next slot is assumed to be
                // the current table size. Interleaved with sparse explicit
                // indices this can collide; the last write wins.
                let key = index.unwrap_or(self.blocks.len());
                self.blocks.insert(key, in_progress);
            }
            StreamEvent::ContentBlockDelta { index, delta, .. } => {
                if self.response.is_none() {
                    return Err(ClaudeRequestError::MessageNotStarted);
                }
                let (Some(index), Some(delta)) = (index, delta) else {
                    return Err(ClaudeRequestError::InvalidContentBlockDelta);
                };
                self.apply_delta(*index, delta)?;
            }
            StreamEvent::MessageDelta { delta, .. } => {
                let Some(response) = self.response.as_mut() else {
                    return Err(ClaudeRequestError::MessageNotStarted);
                };
                let Some(delta) = delta else {
                    return Err(ClaudeRequestError::InvalidMessageDelta);
                };
                if let Some(stop_reason) = delta.stop_reason {
                    response.stop_reason = Some(stop_reason);
                }
                if let Some(stop_sequence) = &delta.stop_sequence {
                    if !stop_sequence.is_empty() {
                        response.stop_sequence = Some(stop_sequence.clone());
                    }
                }
            }
            StreamEvent::MessageStop { .. } => {
                self.complete = true;
                self.freeze_blocks();
            }
            StreamEvent::ContentBlockStop { .. }
            | StreamEvent::Ping { .. }
            | StreamEvent::Error { .. }
            | StreamEvent::Unknown => {}
        }

        if let Some(usage) = event.usage() {
            match self.response.as_mut() {
                Some(response) => response.usage.add(usage),
                // Usage arriving before message_start is parked and folded
                // in once the snapshot exists.
                None => self
                    .pending_usage
                    .get_or_insert_with(Usage::default)
                    .add(usage),
            }
        }
        Ok(())
    }

    fn apply_delta(
        &mut self,
        index: usize,
        delta: &ContentBlockDelta,
    ) -> Result<(), ClaudeRequestError> {
        let Some(block) = self.blocks.get_mut(&index) else {
            return Err(ClaudeRequestError::ContentBlockNotFound(index));
        };
        match delta {
            ContentBlockDelta::TextDelta { text } => {
                let BlockInProgress::Text { text: existing, .. } = block else {
                    return Err(ClaudeRequestError::BlockTypeMismatch {
                        index,
                        expected: "text",
                    });
                };
                existing.push_str(text);
            }
            ContentBlockDelta::InputJsonDelta { partial_json } => match block {
                BlockInProgress::ToolUse { input_json, .. }
                | BlockInProgress::ServerToolUse { input_json, .. } => {
                    input_json.push_str(partial_json);
                }
                _ => {
                    return Err(ClaudeRequestError::BlockTypeMismatch {
                        index,
                        expected: "tool_use",
                    });
                }
            },
            ContentBlockDelta::ThinkingDelta { thinking } => {
                let BlockInProgress::Thinking {
                    thinking: existing, ..
                } = block
                else {
                    return Err(ClaudeRequestError::BlockTypeMismatch {
                        index,
                        expected: "thinking",
                    });
                };
                existing.push_str(thinking);
            }
            ContentBlockDelta::SignatureDelta { signature } => {
                let BlockInProgress::Thinking {
                    signature: existing,
                    ..
                } = block
                else {
                    return Err(ClaudeRequestError::BlockTypeMismatch {
                        index,
                        expected: "thinking",
                    });
                };
                existing.push_str(signature);
            }
            ContentBlockDelta::CitationsDelta { citation } => {
                let BlockInProgress::Text { citations, .. } = block else {
                    return Err(ClaudeRequestError::BlockTypeMismatch {
                        index,
                        expected: "text",
                    });
                };
                citations.push(citation.clone());
            }
            // Delta kinds this build does not know are skipped, matching
            // the tolerant decode of the event layer.
            ContentBlockDelta::Unknown => {}
        }
        Ok(())
    }

    fn freeze_blocks(&mut self) {
        let Some(response) = self.response.as_mut() else {
            return;
        };
        response.content = self
            .blocks
            .values()
            .filter_map(BlockInProgress::materialize)
            .collect();
    }

    /// True only after `message_stop` was seen.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Best-effort snapshot of the response so far. Before `message_stop`
    /// this materializes the in-progress blocks so mid-stream snapshots are
    /// structurally valid; the materialization is idempotent.
    pub fn response(&mut self) -> Option<&ChatResponse> {
        if !self.complete && !self.blocks.is_empty() {
            self.freeze_blocks();
        }
        self.response.as_ref()
    }

    /// Running usage totals, `None` before `message_start`.
    pub fn usage(&self) -> Option<&Usage> {
        self.response.as_ref().map(|response| &response.usage)
    }

    pub fn into_response(mut self) -> Option<ChatResponse> {
        if !self.complete && !self.blocks.is_empty() {
            self.freeze_blocks();
        }
        self.response
    }
}

/// A live streaming response: a single-pass cursor over decoded events.
///
/// API `error` events surface as typed errors, unknown event kinds are
/// skipped, and an optional prefill is injected into the first text block.
/// The underlying connection is released exactly once, by the first of
/// `close()`, drop, or stream exhaustion.
pub struct ChatStream {
    reader: Option<SseLineReader<StreamEvent>>,
    prefill: Option<String>,
    prefill_closing_tag: Option<String>,
    closed: AtomicBool,
}

impl std::fmt::Debug for ChatStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatStream")
            .field("open", &self.reader.is_some())
            .field("prefill", &self.prefill)
            .field("prefill_closing_tag", &self.prefill_closing_tag)
            .finish_non_exhaustive()
    }
}

impl ChatStream {
    pub(crate) fn new(reader: SseLineReader<StreamEvent>) -> Self {
        Self {
            reader: Some(reader),
            prefill: None,
            prefill_closing_tag: None,
            closed: AtomicBool::new(false),
        }
    }

    /// Text to prepend to the first streamed text block, exactly once.
    #[must_use]
    pub fn with_prefill(mut self, prefill: impl Into<String>) -> Self {
        let prefill = prefill.into();
        if !prefill.is_empty() {
            self.prefill = Some(prefill);
        }
        self
    }

    /// Defers prefill injection until a text block start already contains
    /// this tag.
    #[must_use]
    pub fn with_prefill_closing_tag(mut self, closing_tag: impl Into<String>) -> Self {
        let closing_tag = closing_tag.into();
        if !closing_tag.is_empty() {
            self.prefill_closing_tag = Some(closing_tag);
        }
        self
    }

    /// Observes every raw line before decoding; a callback error aborts the
    /// stream.
    #[must_use]
    pub fn with_line_callback<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> + Send + 'static,
    {
        if let Some(reader) = self.reader.take() {
            self.reader = Some(reader.with_line_callback(Box::new(callback)));
        }
        self
    }

    /// Advances to the next event. Returns `Ok(None)` at clean end of
    /// stream; a terminal error is returned once, then `Ok(None)`.
    pub async fn next_event(&mut self) -> Result<Option<StreamEvent>, ClaudeRequestError> {
        loop {
            let Some(reader) = self.reader.as_mut() else {
                return Ok(None);
            };
            let event = match reader.next_event().await {
                Ok(Some(event)) => event,
                Ok(None) => {
                    self.close();
                    return Ok(None);
                }
                Err(e) => {
                    self.close();
                    return Err(e.into());
                }
            };
            match event {
                StreamEvent::Error { error } => {
                    self.close();
                    return Err(error.into());
                }
                StreamEvent::Unknown => continue,
                mut event => {
                    self.maybe_inject_prefill(&mut event);
                    return Ok(Some(event));
                }
            }
        }
    }

    fn maybe_inject_prefill(&mut self, event: &mut StreamEvent) {
        let Some(prefill) = self.prefill.take() else {
            return;
        };
        if let StreamEvent::ContentBlockStart {
            content_block: Some(StartContentBlock::Text { text, .. }),
            ..
        } = event
        {
            let tag_satisfied = match self.prefill_closing_tag.as_deref() {
                Some(tag) => text.contains(tag),
                None => true,
            };
            if tag_satisfied {
                text.insert_str(0, &prefill);
                return;
            }
        }
        self.prefill = Some(prefill);
    }

    /// Releases the underlying connection. Safe to call repeatedly; only
    /// the first call drops the transport.
    pub fn close(&mut self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.reader = None;
        }
    }

    /// Adapts the cursor into a `Stream` of events.
    pub fn into_stream(mut self) -> BoxStream<'static, Result<StreamEvent, ClaudeRequestError>> {
        Box::pin(async_stream::try_stream! {
            while let Some(event) = self.next_event().await? {
                yield event;
            }
        })
    }

    /// Drains the stream into an accumulator and returns the final
    /// response.
    pub async fn collect_response(mut self) -> Result<ChatResponse, ClaudeRequestError> {
        let mut accumulator = ResponseAccumulator::new();
        while let Some(event) = self.next_event().await? {
            accumulator.add_event(&event)?;
        }
        accumulator.into_response().ok_or_else(|| {
            ClaudeRequestError::UnexpectedResponse("stream ended before message_start".to_string())
        })
    }
}

impl Drop for ChatStream {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::{MessageDelta, StopReason};
    use claude_ox_common::CommonRequestError;

    use bytes::Bytes;
    use futures_util::StreamExt;
    use serde_json::json;
    use std::sync::Arc;

    fn message_start(id: &str) -> StreamEvent {
        serde_json::from_value(json!({
            "type": "message_start",
            "message": {
                "id": id,
                "type": "message",
                "role": "assistant",
                "content": [],
                "model": "claude-sonnet-4-20250514",
                "stop_reason": null,
                "stop_sequence": null,
                "usage": {"input_tokens": 5}
            }
        }))
        .unwrap()
    }

    fn text_start(index: Option<usize>, text: &str) -> StreamEvent {
        StreamEvent::ContentBlockStart {
            index,
            content_block: Some(StartContentBlock::Text {
                text: text.to_string(),
                citations: None,
            }),
            usage: None,
        }
    }

    fn text_delta(index: usize, text: &str) -> StreamEvent {
        StreamEvent::ContentBlockDelta {
            index: Some(index),
            delta: Some(ContentBlockDelta::TextDelta {
                text: text.to_string(),
            }),
            usage: None,
        }
    }

    fn message_stop() -> StreamEvent {
        StreamEvent::MessageStop { usage: None }
    }

    #[test]
    fn minimal_stream_accumulates_to_a_response() {
        let mut acc = ResponseAccumulator::new();
        acc.add_event(&message_start("m1")).unwrap();
        acc.add_event(&text_start(Some(0), "")).unwrap();
        acc.add_event(&text_delta(0, "Hi")).unwrap();
        acc.add_event(&StreamEvent::MessageDelta {
            delta: Some(MessageDelta {
                stop_reason: Some(StopReason::EndTurn),
                stop_sequence: None,
            }),
            usage: None,
        })
        .unwrap();
        acc.add_event(&message_stop()).unwrap();

        assert!(acc.is_complete());
        let response = acc.into_response().unwrap();
        assert_eq!(response.id, "m1");
        assert_eq!(response.stop_reason, Some(StopReason::EndTurn));
        assert_eq!(response.content.len(), 1);
        assert_eq!(response.content[0].as_text().unwrap().as_str(), "Hi");
    }

    #[test]
    fn events_before_message_start_are_rejected() {
        let mut acc = ResponseAccumulator::new();

        let err = acc.add_event(&text_start(Some(0), "")).unwrap_err();
        assert!(matches!(err, ClaudeRequestError::MessageNotStarted));

        let err = acc.add_event(&text_delta(0, "Hi")).unwrap_err();
        assert!(matches!(err, ClaudeRequestError::MessageNotStarted));

        let err = acc
            .add_event(&StreamEvent::MessageDelta {
                delta: Some(MessageDelta {
                    stop_reason: Some(StopReason::EndTurn),
                    stop_sequence: None,
                }),
                usage: None,
            })
            .unwrap_err();
        assert!(matches!(err, ClaudeRequestError::MessageNotStarted));
    }

    #[test]
    fn message_start_requires_a_snapshot() {
        let mut acc = ResponseAccumulator::new();
        let err = acc
            .add_event(&StreamEvent::MessageStart {
                message: None,
                usage: None,
            })
            .unwrap_err();
        assert!(matches!(err, ClaudeRequestError::InvalidMessageStart));
    }

    #[test]
    fn out_of_order_indices_freeze_ascending() {
        let mut acc = ResponseAccumulator::new();
        acc.add_event(&message_start("m1")).unwrap();
        acc.add_event(&text_start(Some(1), "second")).unwrap();
        acc.add_event(&text_start(Some(0), "first")).unwrap();
        acc.add_event(&message_stop()).unwrap();

        let response = acc.into_response().unwrap();
        assert_eq!(response.content[0].as_text().unwrap().as_str(), "first");
        assert_eq!(response.content[1].as_text().unwrap().as_str(), "second");
    }

    #[test]
    fn text_deltas_append_and_mismatches_error() {
        let mut acc = ResponseAccumulator::new();
        acc.add_event(&message_start("m1")).unwrap();
        acc.add_event(&text_start(Some(0), "Hello")).unwrap();
        acc.add_event(&text_delta(0, " ")).unwrap();
        acc.add_event(&text_delta(0, "world")).unwrap();

        let err = acc
            .add_event(&StreamEvent::ContentBlockDelta {
                index: Some(0),
                delta: Some(ContentBlockDelta::InputJsonDelta {
                    partial_json: "{}".to_string(),
                }),
                usage: None,
            })
            .unwrap_err();
        assert!(err.to_string().contains("is not a tool_use content"));

        acc.add_event(&message_stop()).unwrap();
        let response = acc.into_response().unwrap();
        assert_eq!(
            response.content[0].as_text().unwrap().as_str(),
            "Hello world"
        );
    }

    #[test]
    fn usage_sums_across_event_kinds() {
        let mut acc = ResponseAccumulator::new();
        acc.add_event(&message_start("m1")).unwrap();
        acc.add_event(&StreamEvent::Ping {
            usage: Some(Usage {
                output_tokens: Some(2),
                ..Usage::default()
            }),
        })
        .unwrap();
        acc.add_event(&StreamEvent::MessageDelta {
            delta: Some(MessageDelta {
                stop_reason: None,
                stop_sequence: None,
            }),
            usage: Some(Usage {
                output_tokens: Some(7),
                ..Usage::default()
            }),
        })
        .unwrap();
        acc.add_event(&StreamEvent::MessageStop {
            usage: Some(Usage {
                cache_read_input_tokens: Some(1),
                ..Usage::default()
            }),
        })
        .unwrap();

        let usage = acc.usage().unwrap();
        assert_eq!(usage.input_tokens, Some(5));
        assert_eq!(usage.output_tokens, Some(9));
        assert_eq!(usage.cache_read_input_tokens, Some(1));
    }

    #[test]
    fn usage_before_message_start_is_parked() {
        let mut acc = ResponseAccumulator::new();
        acc.add_event(&StreamEvent::Ping {
            usage: Some(Usage {
                input_tokens: Some(3),
                ..Usage::default()
            }),
        })
        .unwrap();
        assert!(acc.usage().is_none());

        acc.add_event(&message_start("m1")).unwrap();
        assert_eq!(acc.usage().unwrap().input_tokens, Some(8));
    }

    #[test]
    fn unindexed_start_appends_at_table_size() {
        let mut acc = ResponseAccumulator::new();
        acc.add_event(&message_start("m1")).unwrap();
        acc.add_event(&text_start(None, "a")).unwrap();
        acc.add_event(&text_start(None, "b")).unwrap();
        acc.add_event(&message_stop()).unwrap();

        let response = acc.into_response().unwrap();
        assert_eq!(response.content.len(), 2);
        assert_eq!(response.content[0].as_text().unwrap().as_str(), "a");
        assert_eq!(response.content[1].as_text().unwrap().as_str(), "b");
    }

    #[test]
    fn unindexed_start_after_sparse_index_collides() {
        // With one block parked at explicit index 1, the size heuristic
        // also computes 1 for the next unindexed start and overwrites it.
        let mut acc = ResponseAccumulator::new();
        acc.add_event(&message_start("m1")).unwrap();
        acc.add_event(&text_start(Some(1), "explicit")).unwrap();
        acc.add_event(&text_start(None, "appended")).unwrap();
        acc.add_event(&message_stop()).unwrap();

        let response = acc.into_response().unwrap();
        assert_eq!(response.content.len(), 1);
        assert_eq!(response.content[0].as_text().unwrap().as_str(), "appended");
    }

    #[test]
    fn tool_use_input_parses_at_freeze() {
        let mut acc = ResponseAccumulator::new();
        acc.add_event(&message_start("m1")).unwrap();
        acc.add_event(&StreamEvent::ContentBlockStart {
            index: Some(0),
            content_block: Some(StartContentBlock::ToolUse {
                id: "toolu_1".to_string(),
                name: "get_weather".to_string(),
            }),
            usage: None,
        })
        .unwrap();
        acc.add_event(&StreamEvent::ContentBlockDelta {
            index: Some(0),
            delta: Some(ContentBlockDelta::InputJsonDelta {
                partial_json: "{\"locat".to_string(),
            }),
            usage: None,
        })
        .unwrap();
        acc.add_event(&StreamEvent::ContentBlockDelta {
            index: Some(0),
            delta: Some(ContentBlockDelta::InputJsonDelta {
                partial_json: "ion\": \"Paris\"}".to_string(),
            }),
            usage: None,
        })
        .unwrap();
        acc.add_event(&message_stop()).unwrap();

        let response = acc.into_response().unwrap();
        let tool_use = response.content[0].as_tool_use().unwrap();
        assert_eq!(tool_use.id, "toolu_1");
        assert_eq!(tool_use.input, json!({"location": "Paris"}));
    }

    #[test]
    fn empty_tool_input_materializes_as_empty_object() {
        let mut acc = ResponseAccumulator::new();
        acc.add_event(&message_start("m1")).unwrap();
        acc.add_event(&StreamEvent::ContentBlockStart {
            index: Some(0),
            content_block: Some(StartContentBlock::ToolUse {
                id: "toolu_1".to_string(),
                name: "noop".to_string(),
            }),
            usage: None,
        })
        .unwrap();
        acc.add_event(&message_stop()).unwrap();

        let response = acc.into_response().unwrap();
        assert_eq!(response.content[0].as_tool_use().unwrap().input, json!({}));
    }

    #[test]
    fn signature_delta_keeps_thinking_text() {
        let mut acc = ResponseAccumulator::new();
        acc.add_event(&message_start("m1")).unwrap();
        acc.add_event(&StreamEvent::ContentBlockStart {
            index: Some(0),
            content_block: Some(StartContentBlock::Thinking {
                thinking: "deliberating".to_string(),
                signature: None,
            }),
            usage: None,
        })
        .unwrap();
        acc.add_event(&StreamEvent::ContentBlockDelta {
            index: Some(0),
            delta: Some(ContentBlockDelta::SignatureDelta {
                signature: "c2ln".to_string(),
            }),
            usage: None,
        })
        .unwrap();
        acc.add_event(&message_stop()).unwrap();

        let response = acc.into_response().unwrap();
        let thinking = response.content[0].as_thinking().unwrap();
        assert_eq!(thinking.thinking, "deliberating");
        assert_eq!(thinking.signature, Some("c2ln".to_string()));
    }

    #[test]
    fn citations_delta_appends_to_text_block() {
        let mut acc = ResponseAccumulator::new();
        acc.add_event(&message_start("m1")).unwrap();
        acc.add_event(&text_start(Some(0), "quoted")).unwrap();
        acc.add_event(&StreamEvent::ContentBlockDelta {
            index: Some(0),
            delta: Some(ContentBlockDelta::CitationsDelta {
                citation: Citation::CharLocation {
                    cited_text: Some("quoted".to_string()),
                    document_index: Some(0),
                    document_title: None,
                    start_char_index: Some(0),
                    end_char_index: Some(6),
                },
            }),
            usage: None,
        })
        .unwrap();
        acc.add_event(&message_stop()).unwrap();

        let response = acc.into_response().unwrap();
        let text = response.content[0].as_text().unwrap();
        assert_eq!(text.citations.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn unknown_delta_kinds_are_ignored() {
        let mut acc = ResponseAccumulator::new();
        acc.add_event(&message_start("m1")).unwrap();
        acc.add_event(&text_start(Some(0), "hi")).unwrap();
        acc.add_event(&StreamEvent::ContentBlockDelta {
            index: Some(0),
            delta: Some(ContentBlockDelta::Unknown),
            usage: None,
        })
        .unwrap();
        acc.add_event(&message_stop()).unwrap();

        let response = acc.into_response().unwrap();
        assert_eq!(response.content[0].as_text().unwrap().as_str(), "hi");
    }

    #[test]
    fn unrecognized_start_blocks_drop_at_freeze() {
        let mut acc = ResponseAccumulator::new();
        acc.add_event(&message_start("m1")).unwrap();
        acc.add_event(&StreamEvent::ContentBlockStart {
            index: Some(0),
            content_block: Some(StartContentBlock::Unrecognized),
            usage: None,
        })
        .unwrap();
        acc.add_event(&text_start(Some(1), "kept")).unwrap();

        let err = acc.add_event(&text_delta(0, "ignored")).unwrap_err();
        assert!(matches!(
            err,
            ClaudeRequestError::BlockTypeMismatch { index: 0, .. }
        ));

        acc.add_event(&message_stop()).unwrap();
        let response = acc.into_response().unwrap();
        assert_eq!(response.content.len(), 1);
        assert_eq!(response.content[0].as_text().unwrap().as_str(), "kept");
    }

    #[test]
    fn message_delta_never_erases_terminal_state() {
        let mut acc = ResponseAccumulator::new();
        acc.add_event(&message_start("m1")).unwrap();
        acc.add_event(&StreamEvent::MessageDelta {
            delta: Some(MessageDelta {
                stop_reason: Some(StopReason::EndTurn),
                stop_sequence: Some("DONE".to_string()),
            }),
            usage: None,
        })
        .unwrap();
        acc.add_event(&StreamEvent::MessageDelta {
            delta: Some(MessageDelta {
                stop_reason: None,
                stop_sequence: Some(String::new()),
            }),
            usage: None,
        })
        .unwrap();

        let response = acc.response().unwrap();
        assert_eq!(response.stop_reason, Some(StopReason::EndTurn));
        assert_eq!(response.stop_sequence, Some("DONE".to_string()));
    }

    #[test]
    fn missing_index_or_delta_is_invalid() {
        let mut acc = ResponseAccumulator::new();
        acc.add_event(&message_start("m1")).unwrap();

        let err = acc
            .add_event(&StreamEvent::ContentBlockDelta {
                index: None,
                delta: Some(ContentBlockDelta::TextDelta {
                    text: "x".to_string(),
                }),
                usage: None,
            })
            .unwrap_err();
        assert!(matches!(err, ClaudeRequestError::InvalidContentBlockDelta));

        let err = acc.add_event(&text_delta(5, "x")).unwrap_err();
        assert_eq!(err.to_string(), "content block not found for index 5");
    }

    #[test]
    fn mid_stream_snapshot_matches_final_freeze() {
        let mut acc = ResponseAccumulator::new();
        acc.add_event(&message_start("m1")).unwrap();
        acc.add_event(&text_start(Some(0), "Hel")).unwrap();

        let snapshot = acc.response().unwrap().clone();
        assert_eq!(snapshot.content[0].as_text().unwrap().as_str(), "Hel");
        assert!(!acc.is_complete());

        acc.add_event(&text_delta(0, "lo")).unwrap();
        acc.add_event(&message_stop()).unwrap();
        let response = acc.into_response().unwrap();
        assert_eq!(response.content[0].as_text().unwrap().as_str(), "Hello");
    }

    fn stream_over(events: Vec<serde_json::Value>) -> ChatStream {
        let chunks: Vec<Result<Bytes, CommonRequestError>> = events
            .into_iter()
            .map(|event| Ok(Bytes::from(format!("data: {event}\n"))))
            .collect();
        ChatStream::new(SseLineReader::new(futures_util::stream::iter(chunks)))
    }

    fn text_start_json(index: usize, text: &str) -> serde_json::Value {
        json!({
            "type": "content_block_start",
            "index": index,
            "content_block": {"type": "text", "text": text}
        })
    }

    #[tokio::test]
    async fn stream_skips_unknown_events() {
        let mut stream = stream_over(vec![
            json!({"type": "ping"}),
            json!({"type": "brand_new_event", "payload": 1}),
            json!({"type": "message_stop"}),
        ]);

        assert!(matches!(
            stream.next_event().await.unwrap(),
            Some(StreamEvent::Ping { .. })
        ));
        assert!(matches!(
            stream.next_event().await.unwrap(),
            Some(StreamEvent::MessageStop { .. })
        ));
        assert!(stream.next_event().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn error_events_become_typed_errors() {
        let mut stream = stream_over(vec![
            json!({"type": "ping"}),
            json!({"type": "error", "error": {"type": "overloaded_error", "message": "busy"}}),
            json!({"type": "message_stop"}),
        ]);

        stream.next_event().await.unwrap();
        let err = stream.next_event().await.unwrap_err();
        assert!(matches!(err, ClaudeRequestError::Overloaded(_)));
        assert!(err.is_retryable());

        // The stream is closed after a terminal error.
        assert!(stream.next_event().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn prefill_prepends_first_text_block_only() {
        let mut stream = stream_over(vec![
            text_start_json(0, "body"),
            text_start_json(1, "later"),
        ])
        .with_prefill("<answer>");

        let first = stream.next_event().await.unwrap().unwrap();
        match first {
            StreamEvent::ContentBlockStart {
                content_block: Some(StartContentBlock::Text { text, .. }),
                ..
            } => assert_eq!(text, "<answer>body"),
            other => panic!("unexpected event: {other:?}"),
        }

        let second = stream.next_event().await.unwrap().unwrap();
        match second {
            StreamEvent::ContentBlockStart {
                content_block: Some(StartContentBlock::Text { text, .. }),
                ..
            } => assert_eq!(text, "later"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn prefill_waits_for_the_closing_tag() {
        let mut stream = stream_over(vec![
            text_start_json(0, "abc"),
            text_start_json(1, "xyz</r>"),
        ])
        .with_prefill("<r>")
        .with_prefill_closing_tag("</r>");

        let first = stream.next_event().await.unwrap().unwrap();
        match first {
            StreamEvent::ContentBlockStart {
                content_block: Some(StartContentBlock::Text { text, .. }),
                ..
            } => assert_eq!(text, "abc"),
            other => panic!("unexpected event: {other:?}"),
        }

        let second = stream.next_event().await.unwrap().unwrap();
        match second {
            StreamEvent::ContentBlockStart {
                content_block: Some(StartContentBlock::Text { text, .. }),
                ..
            } => assert_eq!(text, "<r>xyz</r>"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn close_releases_the_transport_once() {
        let guard = Arc::new(());
        let held = Arc::clone(&guard);
        let byte_stream = futures_util::stream::unfold(
            (held, false),
            |(held, sent)| async move {
                if sent {
                    None
                } else {
                    let chunk: Result<Bytes, CommonRequestError> =
                        Ok(Bytes::from_static(b"data: {\"type\":\"ping\"}\n"));
                    Some((chunk, (held, true)))
                }
            },
        );
        let mut stream = ChatStream::new(SseLineReader::new(byte_stream));

        assert_eq!(Arc::strong_count(&guard), 2);
        stream.next_event().await.unwrap();

        stream.close();
        assert_eq!(Arc::strong_count(&guard), 1);

        stream.close();
        assert_eq!(Arc::strong_count(&guard), 1);
        assert!(stream.next_event().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn into_stream_yields_the_same_events() {
        let stream = stream_over(vec![
            json!({"type": "ping"}),
            json!({"type": "message_stop"}),
        ]);

        let events: Vec<_> = stream.into_stream().collect().await;
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(Result::is_ok));
    }

    #[tokio::test]
    async fn collect_response_drives_the_accumulator() {
        let stream = stream_over(vec![
            json!({
                "type": "message_start",
                "message": {
                    "id": "m1",
                    "type": "message",
                    "role": "assistant",
                    "content": [],
                    "model": "claude-sonnet-4-20250514",
                    "stop_reason": null,
                    "stop_sequence": null,
                    "usage": {"input_tokens": 11}
                }
            }),
            text_start_json(0, ""),
            json!({
                "type": "content_block_delta",
                "index": 0,
                "delta": {"type": "text_delta", "text": "Hi"}
            }),
            json!({
                "type": "message_delta",
                "delta": {"stop_reason": "end_turn", "stop_sequence": null},
                "usage": {"output_tokens": 2}
            }),
            json!({"type": "message_stop"}),
        ]);

        let response = stream.collect_response().await.unwrap();
        assert_eq!(response.id, "m1");
        assert_eq!(response.text_content(), vec!["Hi"]);
        assert_eq!(response.stop_reason, Some(StopReason::EndTurn));
        assert_eq!(response.usage.input_tokens, Some(11));
        assert_eq!(response.usage.output_tokens, Some(2));
    }

    #[tokio::test]
    async fn collect_response_without_message_start_errors() {
        let stream = stream_over(vec![json!({"type": "ping"})]);
        let err = stream.collect_response().await.unwrap_err();
        assert!(matches!(err, ClaudeRequestError::UnexpectedResponse(_)));
    }
}
