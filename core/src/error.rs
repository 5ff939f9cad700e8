//! Error types for mlbridge.

use std::path::PathBuf;
use thiserror::Error;

use crate::tensor::DType;

/// Result type alias for mlbridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Errors that can occur while loading, binding or predicting.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Model loading or compilation failed.
    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    /// A buffer could not be bridged into a tensor or feature.
    #[error("Bind failed: {0}")]
    Bind(String),

    /// The engine reported an inference error.
    #[error("Inference failed: {0}")]
    Inference(String),

    /// Predict was called without a loaded model.
    #[error("ran predict without a model loaded into memory")]
    NotLoaded,

    /// Invalid tensor.
    #[error("Invalid tensor: {0}")]
    Tensor(String),

    /// The requested output does not exist in the result.
    #[error("No output named `{0}`")]
    MissingOutput(String),

    /// The requested element type does not match the stored output.
    #[error("Output `{name}` holds {actual}, requested {requested}")]
    TypeMismatch {
        name: String,
        requested: DType,
        actual: DType,
    },

    /// Batch index past the end of the batch.
    #[error("Batch index {index} out of range for batch of {count}")]
    IndexOutOfRange { index: usize, count: usize },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// YAML parsing error.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON parsing error.
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// File not found.
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),
}

impl BridgeError {
    /// Create a model load error.
    pub fn model_load(msg: impl Into<String>) -> Self {
        Self::ModelLoad(msg.into())
    }

    /// Create a bind error.
    pub fn bind(msg: impl Into<String>) -> Self {
        Self::Bind(msg.into())
    }

    /// Create an inference error.
    pub fn inference(msg: impl Into<String>) -> Self {
        Self::Inference(msg.into())
    }

    /// Create a tensor error.
    pub fn tensor(msg: impl Into<String>) -> Self {
        Self::Tensor(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
