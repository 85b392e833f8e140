//! Common imports for working with the Claude API.
//!
//! This module re-exports the most commonly used types and traits.
//!
//! ```rust,no_run
//! use claude_ox::prelude::*;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Claude::new("your-api-key");
//! let request = ChatRequest::builder()
//!     .model(Model::Claude35Haiku20241022)
//!     .messages(vec![Message::from("Hello!")])
//!     .temperature(0.7)
//!     .build();
//!
//! let response = client.send(&request).await?;
//! # Ok(())
//! # }
//! ```

pub use crate::{
    ChatRequest,
    ChatResponse,
    Claude,
    ClaudeRequestError,
    Model,
    StreamEvent,
    message::{Content, ContentSource, Message, Messages, Role, Text},
    streaming::{ChatStream, ResponseAccumulator},
    tool::{Tool, ToolChoice, ToolResult, ToolResultContent, ToolUse},
    usage::Usage,
};
