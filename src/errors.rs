use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeskPilotError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Perception error: {0}")]
    Perception(String),

    #[error("Decision model error: {0}")]
    Decision(String),

    #[error("SSE parsing error: {0}")]
    SseParsing(String),

    #[error("Screen capture error: {0}")]
    Capture(String),

    #[error("Input injection error: {0}")]
    Input(String),

    #[error("Malformed model response: {0}")]
    MalformedResponse(String),

    #[error("Invalid element index {index}; available indices: {available}")]
    InvalidIndex { index: i64, available: String },

    #[error("Action '{action_type}' needs an element index or x/y coordinates")]
    MissingTarget { action_type: String },

    #[error("Coordinate ({x}, {y}) cannot be translated to the virtual desktop")]
    CoordinateOverflow { x: i32, y: i32 },

    #[error("Screen {screen} not found; available screens: {}", screen_range(.count))]
    ScreenOutOfRange { screen: u32, count: usize },

    #[error("Operator channel error: {0}")]
    Operator(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Base64 error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Task cancelled")]
    Cancelled,
}

fn screen_range(count: &usize) -> String {
    match *count {
        0 => "none".to_string(),
        1 => "0".to_string(),
        n => format!("0-{}", n - 1),
    }
}

impl DeskPilotError {
    /// Errors that only invalidate the current step. A caller may re-prompt
    /// the decision model instead of abandoning the run.
    pub fn is_step_local(&self) -> bool {
        matches!(
            self,
            DeskPilotError::MalformedResponse(_)
                | DeskPilotError::InvalidIndex { .. }
                | DeskPilotError::MissingTarget { .. }
                | DeskPilotError::CoordinateOverflow { .. }
        )
    }
}

impl serde::Serialize for DeskPilotError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_str(self.to_string().as_str())
    }
}

pub type DeskPilotResult<T> = Result<T, DeskPilotError>;
