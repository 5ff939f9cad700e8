//! Configuration types for mlbridge.

use serde::Deserialize;
use std::path::PathBuf;

use crate::engine::ComputeBackend;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Model configuration.
    #[serde(default)]
    pub model: ModelConfig,

    /// Inference configuration.
    #[serde(default)]
    pub inference: InferenceConfig,
}

/// Model configuration.
#[derive(Debug, Deserialize)]
pub struct ModelConfig {
    /// Path to the model source or compiled artifact.
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Whether `path` is already compiled.
    #[serde(default)]
    pub compiled: bool,

    /// Compute units the engine may use.
    #[serde(default)]
    pub compute_backend: ComputeBackend,

    /// Directory for compiled artifacts.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    /// Artifact name inside `cache_dir`.
    #[serde(default = "default_cache_name")]
    pub cache_name: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: None,
            compiled: false,
            compute_backend: ComputeBackend::default(),
            cache_dir: None,
            cache_name: default_cache_name(),
        }
    }
}

/// Inference configuration.
#[derive(Debug, Deserialize)]
pub struct InferenceConfig {
    /// Number of inputs submitted per batch prediction.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Output format (json, pretty).
    #[serde(default = "default_format")]
    pub format: String,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            format: default_format(),
        }
    }
}

fn default_cache_name() -> String {
    "model.mlc.json".to_string()
}

fn default_batch_size() -> usize {
    1
}

fn default_format() -> String {
    "json".to_string()
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<std::path::Path>) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml_str(yaml: &str) -> crate::error::Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        if config.inference.batch_size == 0 {
            return Err(crate::error::BridgeError::config("batch_size must be at least 1"));
        }
        Ok(config)
    }
}
