use thiserror::Error;
use std::io;
use std::path::PathBuf;

/// Custom error types for grain-size analysis
#[derive(Error, Debug)]
pub enum GrainSizeError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Image decoding error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to load configuration from {path}: {source}")]
    ConfigLoad {
        source: toml::de::Error,
        path: PathBuf,
    },

    #[error("Invalid input: {0}")]
    Input(String),

    #[error("Invalid input path: {0}")]
    InvalidPath(PathBuf),

    #[error("Numeric degeneracy: {0}")]
    NumericDegeneracy(String),

    #[error("Row sampling failed after {attempts} attempts (last sampling: {sampling})")]
    RetryExhausted {
        attempts: usize,
        sampling: String,
    },

    #[error("CSV output error: {0}")]
    CsvOutput(#[from] csv::Error),

    #[error("JSON output error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GrainSizeError {
    /// Configuration and input errors abort the image immediately and are never retried
    pub fn is_input_or_config(&self) -> bool {
        matches!(
            self,
            GrainSizeError::Config(_)
                | GrainSizeError::ConfigLoad { .. }
                | GrainSizeError::Input(_)
                | GrainSizeError::InvalidPath(_)
                | GrainSizeError::Image(_)
                | GrainSizeError::Io(_)
        )
    }
}

/// Type alias for Result with our custom error type
pub type Result<T> = std::result::Result<T, GrainSizeError>;
