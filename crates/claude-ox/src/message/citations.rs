use serde::{Deserialize, Serialize};

/// Enables citation tracking on a document block.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CitationsConfig {
    pub enabled: bool,
}

impl CitationsConfig {
    pub fn enabled() -> Self {
        Self { enabled: true }
    }
}

/// A reference attached to generated text, pointing at the cited source.
///
/// Citations arrive on text blocks in responses and stream in through
/// `citations_delta` events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Citation {
    /// A character span within a document supplied in the request
    CharLocation {
        #[serde(skip_serializing_if = "Option::is_none")]
        cited_text: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        document_index: Option<usize>,
        #[serde(skip_serializing_if = "Option::is_none")]
        document_title: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        start_char_index: Option<usize>,
        #[serde(skip_serializing_if = "Option::is_none")]
        end_char_index: Option<usize>,
    },
    /// A pointer into a web search result
    WebSearchResultLocation {
        url: String,
        title: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        encrypted_index: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        cited_text: Option<String>,
    },
}
