pub mod citations;
pub mod message;

pub use citations::{Citation, CitationsConfig};
pub use message::{
    CacheControl, CodeExecutionResult, CodeExecutionToolResult, Content, ContentChunk,
    ContentSource, ContentType, Document, Image, McpToolResult, McpToolUse, Message, Messages,
    RedactedThinking, Refusal, Role, ServerToolUse, StringOrContents, Text, Thinking,
    WebSearchResult, WebSearchToolResult,
};
