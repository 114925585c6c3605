use thiserror::Error;

#[derive(Debug, Error)]
pub enum SmithrunError {
    #[error("Tool call failed for '{tool_name}': {reason}")]
    ToolCallFailed { tool_name: String, reason: String },
    #[error("Operation panicked: {0}")]
    Panicked(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Serialization/deserialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("{0}")]
    Custom(String),
}

impl SmithrunError {
    pub fn custom(message: impl Into<String>) -> Self {
        SmithrunError::Custom(message.into())
    }
}
