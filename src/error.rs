//! Error types for clearcast.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClearcastError {
    // Model store errors
    #[error("Model '{name}' not found in catalog")]
    UnknownModel { name: String },

    #[error("Model file not found at {path}")]
    ModelNotFound { path: String },

    #[error("Failed to load speech model: {message}")]
    ModelLoad { message: String },

    #[error("Model download failed: {message}")]
    Download { message: String },

    // Analysis errors
    #[error("Speech inference failed: {message}")]
    Inference { message: String },

    #[error("Resampling failed: {message}")]
    Resample { message: String },

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Failed to serialize configuration: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, ClearcastError>;
