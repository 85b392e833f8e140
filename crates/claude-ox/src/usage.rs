use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Usage {
    pub input_tokens: Option<u32>,
    pub output_tokens: Option<u32>,
    pub cache_creation_input_tokens: Option<u32>,
    pub cache_read_input_tokens: Option<u32>,
}

impl Usage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add incremental usage counters onto this record.
    ///
    /// Counters absent on both sides stay absent, so a report that never
    /// mentions cache tokens does not invent a zero for them.
    pub fn add(&mut self, other: &Usage) {
        fn merge(lhs: &mut Option<u32>, rhs: Option<u32>) {
            if let Some(value) = rhs {
                *lhs = Some(lhs.unwrap_or(0).saturating_add(value));
            }
        }
        merge(&mut self.input_tokens, other.input_tokens);
        merge(&mut self.output_tokens, other.output_tokens);
        merge(
            &mut self.cache_creation_input_tokens,
            other.cache_creation_input_tokens,
        );
        merge(
            &mut self.cache_read_input_tokens,
            other.cache_read_input_tokens,
        );
    }

    pub fn total_tokens(&self) -> u32 {
        self.input_tokens.unwrap_or(0) + self.output_tokens.unwrap_or(0)
    }

    pub fn total_input_tokens(&self) -> u32 {
        self.input_tokens.unwrap_or(0)
            + self.cache_creation_input_tokens.unwrap_or(0)
            + self.cache_read_input_tokens.unwrap_or(0)
    }
}
