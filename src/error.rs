use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum InsightsError {
    #[error("Extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("Timed out waiting for {resource} after {attempts} attempts ({waited:?})")]
    Timeout {
        resource: String,
        attempts: u32,
        waited: Duration,
    },

    #[error("Invalid upload: {0}")]
    InvalidUpload(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[cfg(feature = "gemini")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, InsightsError>;
