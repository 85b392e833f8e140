use std::{fmt, path::Path};

use base64::Engine;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::{
    error::ClaudeRequestError,
    tool::{ToolResult, ToolUse},
};

use super::citations::{Citation, CitationsConfig};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// Cache hint attached to a content block or tool definition.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CacheControl {
    Ephemeral,
    Persistent,
}

/// Where the bytes of an image or document come from.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentSource {
    Base64 { media_type: String, data: String },
    Url { url: String },
    Text { media_type: String, data: String },
    File { file_id: String },
}

impl ContentSource {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, std::io::Error> {
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        let base64_data = base64::engine::general_purpose::STANDARD.encode(data);
        let media_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .to_string();

        Ok(ContentSource::Base64 {
            media_type,
            data: base64_data,
        })
    }
}

impl fmt::Display for ContentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentSource::Base64 { media_type, data } => {
                let truncated_data = if data.len() > 20 {
                    format!("{}...", &data[..20])
                } else {
                    data.clone()
                };
                write!(f, "Base64 ({}, {})", media_type, truncated_data)
            }
            ContentSource::Url { url } => write!(f, "Url ({})", url),
            ContentSource::Text { media_type, .. } => write!(f, "Text ({})", media_type),
            ContentSource::File { file_id } => write!(f, "File ({})", file_id),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Image {
    pub source: ContentSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<CacheControl>,
}

impl Image {
    pub fn new(source: ContentSource) -> Self {
        Self {
            source,
            cache_control: None,
        }
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, std::io::Error> {
        let source = ContentSource::from_path(path)?;
        Ok(Self::new(source))
    }

    pub fn from_base64(media_type: String, data: String) -> Self {
        let source = ContentSource::Base64 { media_type, data };
        Self::new(source)
    }
}

impl fmt::Display for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Image: {}", self.source)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Document {
    pub source: ContentSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub citations: Option<CitationsConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<CacheControl>,
}

impl Document {
    pub fn new(source: ContentSource) -> Self {
        Self {
            source,
            title: None,
            context: None,
            citations: None,
            cache_control: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_citations(mut self, config: CitationsConfig) -> Self {
        self.citations = Some(config);
        self
    }
}

#[derive(Debug, Default, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Text {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub citations: Option<Vec<Citation>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<CacheControl>,
}

impl Text {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            citations: None,
            cache_control: None,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn push_str(&mut self, string: &str) {
        self.text.push_str(string);
    }
}

impl From<String> for Text {
    fn from(text: String) -> Self {
        Text::new(text)
    }
}

impl From<&str> for Text {
    fn from(text: &str) -> Self {
        Text::new(text)
    }
}

impl From<&String> for Text {
    fn from(text: &String) -> Self {
        Text::new(text.clone())
    }
}

impl From<Box<str>> for Text {
    fn from(text: Box<str>) -> Self {
        Text::new(text.into_string())
    }
}

impl From<std::borrow::Cow<'_, str>> for Text {
    fn from(text: std::borrow::Cow<'_, str>) -> Self {
        Text::new(text.into_owned())
    }
}

impl From<serde_json::Value> for Text {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(s) => Text::new(s),
            _ => Text::new(value.to_string()),
        }
    }
}

impl From<Text> for String {
    fn from(text: Text) -> Self {
        text.text
    }
}

impl fmt::Display for Text {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.text)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Thinking {
    pub thinking: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl Thinking {
    pub fn new(thinking: impl Into<String>) -> Self {
        Self {
            thinking: thinking.into(),
            signature: None,
        }
    }

    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = Some(signature.into());
        self
    }
}

impl fmt::Display for Thinking {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Thinking: {}", self.thinking)
    }
}

/// An opaque, encrypted reasoning block returned in place of thinking text.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RedactedThinking {
    pub data: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ServerToolUse {
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct WebSearchResult {
    pub r#type: String,
    pub url: String,
    pub title: String,
    pub encrypted_content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_age: Option<String>,
}

impl WebSearchResult {
    pub fn new(
        url: impl Into<String>,
        title: impl Into<String>,
        encrypted_content: impl Into<String>,
    ) -> Self {
        Self {
            r#type: "web_search_result".to_string(),
            url: url.into(),
            title: title.into(),
            encrypted_content: encrypted_content.into(),
            page_age: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct WebSearchToolResult {
    pub tool_use_id: String,
    pub content: Vec<WebSearchResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct McpToolUse {
    pub id: String,
    pub name: String,
    pub server_name: String,
    pub input: serde_json::Value,
}

/// A fragment of tool output forwarded verbatim from an MCP server.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ContentChunk {
    pub r#type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct McpToolResult {
    pub tool_use_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
    pub content: Vec<ContentChunk>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct CodeExecutionResult {
    pub r#type: String,
    pub stdout: String,
    pub stderr: String,
    pub return_code: i32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct CodeExecutionToolResult {
    pub tool_use_id: String,
    pub content: CodeExecutionResult,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Refusal {
    pub text: String,
}

/// Discriminant of a [`Content`] block, matching the wire `type` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum ContentType {
    Text,
    Image,
    Document,
    Thinking,
    RedactedThinking,
    ToolUse,
    ToolResult,
    ServerToolUse,
    WebSearchToolResult,
    McpToolUse,
    McpToolResult,
    CodeExecutionToolResult,
    Refusal,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Content {
    Text(Text),
    Image(Image),
    Document(Document),
    Thinking(Thinking),
    RedactedThinking(RedactedThinking),
    ToolUse(ToolUse),
    ToolResult(ToolResult),
    ServerToolUse(ServerToolUse),
    WebSearchToolResult(WebSearchToolResult),
    McpToolUse(McpToolUse),
    McpToolResult(McpToolResult),
    CodeExecutionToolResult(CodeExecutionToolResult),
    Refusal(Refusal),
}

impl Content {
    pub fn text<T: Into<String>>(text: T) -> Self {
        Self::Text(Text::new(text))
    }

    pub fn image(source: ContentSource) -> Self {
        Self::Image(Image::new(source))
    }

    pub fn document(source: ContentSource) -> Self {
        Self::Document(Document::new(source))
    }

    pub fn thinking<T: Into<String>>(thinking: T) -> Self {
        Self::Thinking(Thinking::new(thinking))
    }

    pub fn tool_use(tool_use: ToolUse) -> Self {
        Self::ToolUse(tool_use)
    }

    pub fn tool_result(tool_result: ToolResult) -> Self {
        Self::ToolResult(tool_result)
    }

    pub fn content_type(&self) -> ContentType {
        match self {
            Self::Text(_) => ContentType::Text,
            Self::Image(_) => ContentType::Image,
            Self::Document(_) => ContentType::Document,
            Self::Thinking(_) => ContentType::Thinking,
            Self::RedactedThinking(_) => ContentType::RedactedThinking,
            Self::ToolUse(_) => ContentType::ToolUse,
            Self::ToolResult(_) => ContentType::ToolResult,
            Self::ServerToolUse(_) => ContentType::ServerToolUse,
            Self::WebSearchToolResult(_) => ContentType::WebSearchToolResult,
            Self::McpToolUse(_) => ContentType::McpToolUse,
            Self::McpToolResult(_) => ContentType::McpToolResult,
            Self::CodeExecutionToolResult(_) => ContentType::CodeExecutionToolResult,
            Self::Refusal(_) => ContentType::Refusal,
        }
    }

    pub fn as_text(&self) -> Option<&Text> {
        if let Self::Text(v) = self {
            Some(v)
        } else {
            None
        }
    }

    pub fn as_image(&self) -> Option<&Image> {
        if let Self::Image(v) = self {
            Some(v)
        } else {
            None
        }
    }

    pub fn as_thinking(&self) -> Option<&Thinking> {
        if let Self::Thinking(v) = self {
            Some(v)
        } else {
            None
        }
    }

    pub fn as_tool_use(&self) -> Option<&ToolUse> {
        if let Self::ToolUse(v) = self {
            Some(v)
        } else {
            None
        }
    }

    pub fn as_tool_result(&self) -> Option<&ToolResult> {
        if let Self::ToolResult(v) = self {
            Some(v)
        } else {
            None
        }
    }

    pub fn as_json(&self) -> Option<serde_json::Value> {
        match self {
            Self::Text(text) => serde_json::from_str(&text.text).ok(),
            _ => None,
        }
    }
}

impl<T: Into<Text>> From<T> for Content {
    fn from(text: T) -> Self {
        Content::Text(text.into())
    }
}

impl From<Image> for Content {
    fn from(image: Image) -> Self {
        Content::Image(image)
    }
}

impl From<Document> for Content {
    fn from(document: Document) -> Self {
        Content::Document(document)
    }
}

impl From<Thinking> for Content {
    fn from(thinking: Thinking) -> Self {
        Content::Thinking(thinking)
    }
}

impl From<ToolUse> for Content {
    fn from(tool_use: ToolUse) -> Self {
        Content::ToolUse(tool_use)
    }
}

impl From<ToolResult> for Content {
    fn from(tool_result: ToolResult) -> Self {
        Content::ToolResult(tool_result)
    }
}

impl fmt::Display for Content {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => fmt::Display::fmt(text, f),
            Self::Image(image) => fmt::Display::fmt(image, f),
            Self::Thinking(thinking) => fmt::Display::fmt(thinking, f),
            Self::ToolUse(tool_use) => fmt::Display::fmt(tool_use, f),
            Self::ToolResult(tool_result) => fmt::Display::fmt(tool_result, f),
            other => write!(f, "[{}]", other.content_type()),
        }
    }
}

/// A system prompt: either a bare string or structured content blocks.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum StringOrContents {
    String(String),
    Contents(Vec<Content>),
}

impl From<String> for StringOrContents {
    fn from(text: String) -> Self {
        Self::String(text)
    }
}

impl From<&str> for StringOrContents {
    fn from(text: &str) -> Self {
        Self::String(text.to_owned())
    }
}

impl From<Vec<Content>> for StringOrContents {
    fn from(contents: Vec<Content>) -> Self {
        Self::Contents(contents)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Message {
    /// Server-assigned identifier. Present on responses, stripped before
    /// submission because the API rejects it on input.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub role: Role,
    pub content: Vec<Content>,
}

impl Message {
    pub fn new(role: Role, content: Vec<Content>) -> Self {
        Self {
            id: None,
            role,
            content,
        }
    }

    pub fn user<T: Into<Content>>(content: Vec<T>) -> Self {
        Self {
            id: None,
            role: Role::User,
            content: content.into_iter().map(Into::into).collect(),
        }
    }

    pub fn assistant<T: Into<Content>>(content: Vec<T>) -> Self {
        Self {
            id: None,
            role: Role::Assistant,
            content: content.into_iter().map(Into::into).collect(),
        }
    }

    pub fn add_content<T: Into<Content>>(&mut self, content: T) {
        self.content.push(content.into());
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    /// Prepends `prefill` to the first text block. With a non-empty
    /// `closing_tag`, that block must already contain the tag.
    pub fn apply_prefill(
        &mut self,
        prefill: &str,
        closing_tag: &str,
    ) -> Result<(), ClaudeRequestError> {
        if prefill.is_empty() {
            return Ok(());
        }
        for block in &mut self.content {
            if let Content::Text(text) = block {
                if closing_tag.is_empty() || text.text.contains(closing_tag) {
                    text.text.insert_str(0, prefill);
                    return Ok(());
                }
                return Err(ClaudeRequestError::PrefillClosingTagNotFound);
            }
        }
        Err(ClaudeRequestError::NoTextContent)
    }
}

impl<T: Into<Content>> From<T> for Message {
    fn from(content: T) -> Self {
        Message::user(vec![content])
    }
}

impl From<Vec<Content>> for Message {
    fn from(content: Vec<Content>) -> Self {
        Message::user(content)
    }
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: ", self.role)?;
        for (i, content) in self.content.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}", content)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Messages(pub Vec<Message>);

impl Messages {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self(Vec::with_capacity(capacity))
    }

    pub fn push<T: Into<Message>>(&mut self, message: T) {
        self.0.push(message.into());
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.0.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Message> {
        self.0.iter_mut()
    }

    pub fn last(&self) -> Option<&Message> {
        self.0.last()
    }

    pub fn last_mut(&mut self) -> Option<&mut Message> {
        self.0.last_mut()
    }

    /// Moves tool-use blocks after all other blocks inside each assistant
    /// message, keeping relative order within both groups. The API has been
    /// observed to reject assistant turns where a tool call precedes its
    /// accompanying text.
    pub fn reorder_tool_use_blocks(&mut self) {
        for message in &mut self.0 {
            if message.role != Role::Assistant || message.content.len() < 2 {
                continue;
            }
            let has_tool_use = message
                .content
                .iter()
                .any(|block| matches!(block, Content::ToolUse(_)));
            let has_other = message
                .content
                .iter()
                .any(|block| !matches!(block, Content::ToolUse(_)));
            if !has_tool_use || !has_other {
                continue;
            }
            let blocks = std::mem::take(&mut message.content);
            let (tool_use, mut others): (Vec<_>, Vec<_>) = blocks
                .into_iter()
                .partition(|block| matches!(block, Content::ToolUse(_)));
            others.extend(tool_use);
            message.content = others;
        }
    }
}

impl From<Message> for Messages {
    fn from(value: Message) -> Self {
        Messages(vec![value])
    }
}

impl<T> From<Vec<T>> for Messages
where
    T: Into<Message>,
{
    fn from(value: Vec<T>) -> Self {
        Messages(value.into_iter().map(Into::into).collect())
    }
}

impl FromIterator<Message> for Messages {
    fn from_iter<T: IntoIterator<Item = Message>>(iter: T) -> Self {
        Messages(iter.into_iter().collect())
    }
}

impl std::ops::Index<usize> for Messages {
    type Output = Message;
    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

impl std::ops::IndexMut<usize> for Messages {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.0[index]
    }
}

impl IntoIterator for Messages {
    type Item = Message;
    type IntoIter = std::vec::IntoIter<Self::Item>;
    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Messages {
    type Item = &'a Message;
    type IntoIter = std::slice::Iter<'a, Message>;
    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl<'a> IntoIterator for &'a mut Messages {
    type Item = &'a mut Message;
    type IntoIter = std::slice::IterMut<'a, Message>;
    fn into_iter(self) -> Self::IntoIter {
        self.0.iter_mut()
    }
}
