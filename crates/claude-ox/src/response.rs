use serde::{Deserialize, Serialize};

use crate::{
    error::ErrorInfo,
    message::{Citation, Content, Message, Role},
    usage::Usage,
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    StopSequence,
    ToolUse,
    PauseTurn,
    Refusal,
}

/// A complete message response, or the in-progress snapshot of one while a
/// stream is being accumulated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub r#type: String,
    pub role: Role,
    #[serde(default)]
    pub content: Vec<Content>,
    #[serde(default)]
    pub model: String,
    pub stop_reason: Option<StopReason>,
    pub stop_sequence: Option<String>,
    #[serde(default)]
    pub usage: Usage,
}

impl ChatResponse {
    pub fn text_content(&self) -> Vec<&str> {
        self.content
            .iter()
            .filter_map(|content| {
                if let Content::Text(text) = content {
                    Some(text.as_str())
                } else {
                    None
                }
            })
            .collect()
    }

    pub fn tool_uses(&self) -> impl Iterator<Item = &crate::tool::ToolUse> {
        self.content.iter().filter_map(|content| {
            if let Content::ToolUse(tool_use) = content {
                Some(tool_use)
            } else {
                None
            }
        })
    }

    pub fn has_tool_use(&self) -> bool {
        self.content
            .iter()
            .any(|content| matches!(content, Content::ToolUse(_)))
    }

    pub fn thinking_content(&self) -> Vec<&str> {
        self.content
            .iter()
            .filter_map(|content| {
                if let Content::Thinking(thinking) = content {
                    Some(thinking.thinking.as_str())
                } else {
                    None
                }
            })
            .collect()
    }

    pub fn thinking_blocks(&self) -> impl Iterator<Item = &crate::message::Thinking> {
        self.content.iter().filter_map(|content| {
            if let Content::Thinking(thinking) = content {
                Some(thinking)
            } else {
                None
            }
        })
    }

    pub fn has_thinking(&self) -> bool {
        self.content
            .iter()
            .any(|content| matches!(content, Content::Thinking(_)))
    }

    /// Converts the response into a conversation message, keeping the
    /// server-assigned id so it can be stripped again on resubmission.
    pub fn to_message(&self) -> Message {
        Message {
            id: Some(self.id.clone()),
            role: self.role,
            content: self.content.clone(),
        }
    }
}

impl From<ChatResponse> for Message {
    fn from(response: ChatResponse) -> Self {
        Message {
            id: Some(response.id),
            role: response.role,
            content: response.content,
        }
    }
}

impl std::fmt::Display for ChatResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut content_summary = Vec::new();

        let text_parts = self.text_content();
        if !text_parts.is_empty() {
            content_summary.push(format!("text: [{}]", text_parts.join(", ")));
        }

        let thinking_parts = self.thinking_content();
        if !thinking_parts.is_empty() {
            content_summary.push(format!("thinking: [{}]", thinking_parts.len()));
        }

        if self.has_tool_use() {
            content_summary.push("tools".to_string());
        }

        write!(
            f,
            "ChatResponse {{ id: {}, type: {}, role: {:?}, model: {}, content: {} }}",
            self.id,
            self.r#type,
            self.role,
            self.model,
            content_summary.join(", ")
        )
    }
}

// Streaming types.
//
// Every concrete event may carry an incremental `usage` payload; the
// accumulator folds them in regardless of event kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    MessageStart {
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<ChatResponse>,
        #[serde(skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
    },
    ContentBlockStart {
        #[serde(skip_serializing_if = "Option::is_none")]
        index: Option<usize>,
        #[serde(skip_serializing_if = "Option::is_none")]
        content_block: Option<StartContentBlock>,
        #[serde(skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
    },
    ContentBlockDelta {
        #[serde(skip_serializing_if = "Option::is_none")]
        index: Option<usize>,
        #[serde(skip_serializing_if = "Option::is_none")]
        delta: Option<ContentBlockDelta>,
        #[serde(skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
    },
    ContentBlockStop {
        #[serde(skip_serializing_if = "Option::is_none")]
        index: Option<usize>,
        #[serde(skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
    },
    MessageDelta {
        #[serde(skip_serializing_if = "Option::is_none")]
        delta: Option<MessageDelta>,
        #[serde(skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
    },
    MessageStop {
        #[serde(skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
    },
    Ping {
        #[serde(skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
    },
    Error {
        error: ErrorInfo,
    },
    #[serde(other)]
    Unknown,
}

impl StreamEvent {
    /// Incremental usage attached to this event, whatever its kind.
    pub fn usage(&self) -> Option<&Usage> {
        match self {
            Self::MessageStart { usage, .. }
            | Self::ContentBlockStart { usage, .. }
            | Self::ContentBlockDelta { usage, .. }
            | Self::ContentBlockStop { usage, .. }
            | Self::MessageDelta { usage, .. }
            | Self::MessageStop { usage }
            | Self::Ping { usage } => usage.as_ref(),
            Self::Error { .. } | Self::Unknown => None,
        }
    }
}

/// The seed block carried by a `content_block_start` event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StartContentBlock {
    Text {
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        citations: Option<Vec<Citation>>,
    },
    ToolUse {
        id: String,
        name: String,
    },
    ServerToolUse {
        id: String,
        name: String,
    },
    Thinking {
        thinking: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },
    RedactedThinking {
        data: String,
    },
    #[serde(other)]
    Unrecognized,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlockDelta {
    TextDelta { text: String },
    InputJsonDelta { partial_json: String },
    ThinkingDelta { thinking: String },
    SignatureDelta { signature: String },
    CitationsDelta { citation: Citation },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageDelta {
    pub stop_reason: Option<StopReason>,
    pub stop_sequence: Option<String>,
}
