use thiserror::Error;

use crate::types::ShapeId;

#[derive(Debug, Error)]
pub enum MakeRealError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("First select something to make real.")]
    NothingSelected,

    #[error("Shape not found: {0}")]
    ShapeNotFound(ShapeId),

    #[error("Export error: {0}")]
    Export(String),

    #[error("Could not contact OpenAI.")]
    ProviderUnavailable(#[source] anyhow::Error),

    #[error("{0}")]
    Provider(String),

    #[error("Could not generate a design from those wireframes.")]
    GenerationFailed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl MakeRealError {
    /// Whether the error was caused by the caller's input rather than a failing collaborator.
    pub fn is_input_error(&self) -> bool {
        matches!(self, Self::NothingSelected | Self::ShapeNotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, MakeRealError>;
