use serde::{Deserialize, Serialize};
use std::fmt;

use crate::message::{CacheControl, ContentSource};

/// Guides the model's choice of which tool to call, if any.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolChoice {
    Auto {
        #[serde(skip_serializing_if = "Option::is_none")]
        disable_parallel_tool_use: Option<bool>,
    },
    Any {
        #[serde(skip_serializing_if = "Option::is_none")]
        disable_parallel_tool_use: Option<bool>,
    },
    Tool {
        name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        disable_parallel_tool_use: Option<bool>,
    },
    None,
}

impl ToolChoice {
    pub fn auto() -> Self {
        Self::Auto {
            disable_parallel_tool_use: None,
        }
    }

    pub fn any() -> Self {
        Self::Any {
            disable_parallel_tool_use: None,
        }
    }

    pub fn tool(name: impl Into<String>) -> Self {
        Self::Tool {
            name: name.into(),
            disable_parallel_tool_use: None,
        }
    }

    pub fn none() -> Self {
        Self::None
    }
}

/// A tool definition the model may call: name, description, and the JSON
/// schema of its input.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tool {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub input_schema: serde_json::Value,
}

impl Tool {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: Some(description.into()),
            input_schema: serde_json::json!({"type": "object"}),
        }
    }

    pub fn with_schema(mut self, schema: serde_json::Value) -> Self {
        self.input_schema = schema;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolUse {
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
}

impl ToolUse {
    pub fn new(id: String, name: String, input: serde_json::Value) -> Self {
        Self { id, name, input }
    }
}

impl fmt::Display for ToolUse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ToolUse(id: {}, name: {})", self.id, self.name)
    }
}

/// Accumulates the partial JSON fragments streamed for a tool call and
/// parses them once complete.
#[derive(Debug, Default, Clone)]
pub struct ToolUseBuilder {
    id: String,
    name: String,
    input: String,
}

impl ToolUseBuilder {
    pub fn new(id: String, name: String) -> Self {
        Self {
            id,
            name,
            input: String::new(),
        }
    }

    pub fn push_str(&mut self, s: &str) {
        self.input.push_str(s);
    }

    pub fn build(self) -> Result<ToolUse, serde_json::Error> {
        let input: serde_json::Value = serde_json::from_str(&self.input)?;
        Ok(ToolUse {
            id: self.id,
            name: self.name,
            input,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolResult {
    pub tool_use_id: String,
    pub content: ToolResultContents,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<CacheControl>,
}

/// A tool result body: either a bare string or structured blocks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ToolResultContents {
    String(String),
    Blocks(Vec<ToolResultContent>),
}

impl From<String> for ToolResultContents {
    fn from(text: String) -> Self {
        Self::String(text)
    }
}

impl From<&str> for ToolResultContents {
    fn from(text: &str) -> Self {
        Self::String(text.to_owned())
    }
}

impl From<Vec<ToolResultContent>> for ToolResultContents {
    fn from(blocks: Vec<ToolResultContent>) -> Self {
        Self::Blocks(blocks)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolResultContent {
    Text { text: String },
    Image { source: ContentSource },
}

impl ToolResult {
    pub fn new(tool_use_id: String, content: impl Into<ToolResultContents>) -> Self {
        Self {
            tool_use_id,
            content: content.into(),
            is_error: None,
            cache_control: None,
        }
    }

    pub fn text(tool_use_id: String, text: String) -> Self {
        Self {
            tool_use_id,
            content: ToolResultContents::Blocks(vec![ToolResultContent::Text { text }]),
            is_error: None,
            cache_control: None,
        }
    }

    pub fn error(tool_use_id: String, error: String) -> Self {
        Self {
            tool_use_id,
            content: ToolResultContents::Blocks(vec![ToolResultContent::Text { text: error }]),
            is_error: Some(true),
            cache_control: None,
        }
    }
}

impl fmt::Display for ToolResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ToolResult(id: {})", self.tool_use_id)
    }
}
