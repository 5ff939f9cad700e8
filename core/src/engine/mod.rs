//! The native inference engine seen from the boundary.
//!
//! The engine is an external collaborator: it compiles model sources,
//! materializes native models and runs predictions. The boundary layer only
//! relies on the traits below.

pub mod interp;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{BridgeError, Result};
use crate::features::{FeatureDictionary, OutputBackings};
use crate::tensor::{DType, ReleaseBuffer, TensorSlice};

pub use interp::InterpEngine;

/// Hardware execution target for a model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComputeBackend {
    /// CPU only.
    Cpu,
    /// CPU plus neural accelerator.
    #[default]
    #[serde(rename = "cpu_and_ne", alias = "cpu_and_neural_engine", alias = "ane")]
    CpuAndNeuralEngine,
    /// CPU plus GPU.
    #[serde(alias = "gpu")]
    CpuAndGpu,
}

impl FromStr for ComputeBackend {
    type Err = BridgeError;

    /// Parse a backend string like "cpu", "cpu_and_ne", "cpu_and_gpu".
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "cpu" => Ok(Self::Cpu),
            "cpu_and_ne" | "cpu_and_neural_engine" | "ane" => Ok(Self::CpuAndNeuralEngine),
            "cpu_and_gpu" | "gpu" => Ok(Self::CpuAndGpu),
            other => Err(BridgeError::config(format!(
                "Invalid compute backend: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for ComputeBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => write!(f, "cpu"),
            Self::CpuAndNeuralEngine => write!(f, "cpu_and_ne"),
            Self::CpuAndGpu => write!(f, "cpu_and_gpu"),
        }
    }
}

/// What a model input or output looks like.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeatureKind {
    Tensor { dtype: DType, shape: Vec<usize> },
    Image { width: usize, height: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureDescription {
    pub name: String,
    #[serde(flatten)]
    pub kind: FeatureKind,
}

impl FeatureDescription {
    pub fn tensor(name: impl Into<String>, dtype: DType, shape: Vec<usize>) -> Self {
        Self {
            name: name.into(),
            kind: FeatureKind::Tensor { dtype, shape },
        }
    }

    pub fn shape(&self) -> Option<&[usize]> {
        match &self.kind {
            FeatureKind::Tensor { shape, .. } => Some(shape),
            FeatureKind::Image { .. } => None,
        }
    }

    pub fn dtype(&self) -> Option<DType> {
        match &self.kind {
            FeatureKind::Tensor { dtype, .. } => Some(*dtype),
            FeatureKind::Image { .. } => None,
        }
    }
}

impl fmt::Display for FeatureDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            FeatureKind::Tensor { dtype, shape } => {
                write!(f, "{}: MultiArray ({} {:?})", self.name, dtype, shape)
            }
            FeatureKind::Image { width, height } => {
                write!(f, "{}: Image (BGRA {}x{})", self.name, width, height)
            }
        }
    }
}

/// Read-only snapshot of a loaded model's interface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescription {
    pub inputs: Vec<FeatureDescription>,
    pub outputs: Vec<FeatureDescription>,
}

impl ModelDescription {
    pub fn input_names(&self) -> Vec<&str> {
        self.inputs.iter().map(|d| d.name.as_str()).collect()
    }

    pub fn output_names(&self) -> Vec<&str> {
        self.outputs.iter().map(|d| d.name.as_str()).collect()
    }

    pub fn input(&self, name: &str) -> Option<&FeatureDescription> {
        self.inputs.iter().find(|d| d.name == name)
    }

    pub fn output(&self, name: &str) -> Option<&FeatureDescription> {
        self.outputs.iter().find(|d| d.name == name)
    }

    pub fn input_shape(&self, name: &str) -> Option<&[usize]> {
        self.input(name).and_then(FeatureDescription::shape)
    }

    pub fn output_shape(&self, name: &str) -> Option<&[usize]> {
        self.output(name).and_then(FeatureDescription::shape)
    }

    pub fn output_type(&self, name: &str) -> Option<DType> {
        self.output(name).and_then(FeatureDescription::dtype)
    }
}

/// Output tensor exposed by the engine.
///
/// Borrows engine-owned memory that the next prediction may overwrite.
#[derive(Debug, Clone, Copy)]
pub struct TensorRef<'a> {
    pub shape: &'a [usize],
    pub data: TensorSlice<'a>,
}

/// Non-backed outputs of one prediction, keyed by name.
pub type EngineOutputs<'a> = BTreeMap<String, TensorRef<'a>>;

/// An inference engine able to compile and materialize models.
pub trait InferenceEngine: Send + Sync + 'static {
    /// A parsed, compiled in-memory model asset.
    type Asset: Send + Sync + 'static;
    /// A materialized native model.
    type Model: NativeModel;

    fn name(&self) -> &'static str;

    /// Compile a model source into a temporary compiled artifact.
    fn compile(&self, path: &Path) -> Result<PathBuf>;

    /// Parse a compiled asset, taking ownership of its bytes.
    fn parse_asset(&self, bytes: ReleaseBuffer<u8>) -> Result<Self::Asset>;

    /// Materialize a model from a parsed asset.
    fn load_asset(&self, asset: &Self::Asset, backend: ComputeBackend) -> Result<Self::Model>;

    /// Materialize a model from a compiled artifact on disk.
    fn load_path(&self, path: &Path, backend: ComputeBackend) -> Result<Self::Model>;
}

/// A loaded model owned by a handle.
pub trait NativeModel: Send + 'static {
    fn describe(&self) -> ModelDescription;

    /// Run a single prediction.
    ///
    /// Consumes `inputs`; their buffers are released whenever the engine
    /// drops them. Outputs named in `backings` are written into those buffers
    /// and left out of the returned map.
    fn predict(
        &mut self,
        inputs: FeatureDictionary,
        backings: &mut OutputBackings<'_>,
    ) -> Result<EngineOutputs<'_>>;

    /// Run one prediction per dictionary as a single batch request.
    fn predict_batch(&mut self, batch: Vec<FeatureDictionary>) -> Result<Vec<EngineOutputs<'_>>>;
}
