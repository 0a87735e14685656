use thiserror::Error;

pub type Result<T> = std::result::Result<T, FusionError>;

#[derive(Error, Debug)]
pub enum FusionError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Pipeline '{pipeline}' failed: {message}")]
    Executor { pipeline: String, message: String },

    #[error("Malformed scoreDetails: {0}")]
    MalformedScoreDetails(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl FusionError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Stable machine-readable code, used for error envelopes.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration_error",
            Self::InvalidInput(_) => "invalid_input",
            Self::Executor { .. } => "pipeline_failed",
            Self::MalformedScoreDetails(_) => "malformed_score_details",
            Self::Serialization(_) => "serialization_error",
        }
    }
}
