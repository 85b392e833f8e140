#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    PartialOrd,
    strum::EnumString,
    strum::Display,
    strum::IntoStaticStr,
)]
pub enum Model {
    // Claude 4 models (latest)
    #[strum(to_string = "claude-opus-4-1-20250805")]
    ClaudeOpus41,
    #[strum(to_string = "claude-opus-4-20250514")]
    ClaudeOpus4,
    #[strum(to_string = "claude-sonnet-4-20250514")]
    ClaudeSonnet4,

    // Claude 3.7 models
    #[strum(to_string = "claude-3-7-sonnet-20250219")]
    Claude37Sonnet,
    #[strum(to_string = "claude-3-7-sonnet-latest")]
    Claude37SonnetLatest,

    // Claude 3.5 models
    #[strum(to_string = "claude-3-5-sonnet-20241022")]
    Claude35Sonnet20241022,
    #[strum(to_string = "claude-3-5-sonnet-latest")]
    Claude35SonnetLatest,
    #[strum(to_string = "claude-3-5-haiku-20241022")]
    Claude35Haiku20241022,
    #[strum(to_string = "claude-3-5-haiku-latest")]
    Claude35HaikuLatest,

    // Claude 3 models
    #[strum(to_string = "claude-3-opus-20240229")]
    Claude3Opus20240229,
    #[strum(to_string = "claude-3-haiku-20240307")]
    Claude3Haiku20240307,
}

impl Default for Model {
    fn default() -> Self {
        Model::ClaudeSonnet4
    }
}

impl From<Model> for String {
    fn from(model: Model) -> Self {
        model.to_string()
    }
}
