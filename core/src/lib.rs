//! mlbridge: a boundary layer for running compiled ML models from foreign callers.
//!
//! The crate lets a caller outside Rust hand raw buffers to an inference
//! engine without copying them. Input buffers carry a release callback and
//! change owner exactly once, when they are bound; output buffers can be
//! registered as write-through targets so the engine fills caller memory
//! directly.
//!
//! # Example
//!
//! ```ignore
//! use mlbridge::{ComputeBackend, InterpEngine, ModelHandle, ReleaseBuffer};
//!
//! // Compile and load a graph
//! let mut model = ModelHandle::from_path(InterpEngine::new(), "sum.yaml", false, ComputeBackend::Cpu);
//! model.load()?;
//!
//! // Hand over an input buffer; it is released once the engine is done
//! model.bind_input("x", &[1, 3, 2], ReleaseBuffer::from_vec(vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0]))?;
//!
//! // Run inference
//! let result = model.predict()?;
//! println!("y = {:?}", result.output_f32("y")?);
//! ```
//!
//! # Foreign callers
//!
//! Build the `cdylib` and use the `mlb_*` functions in [`inference::ffi`].
//!
//! ```bash
//! cargo build --release
//! ```

#[macro_use]
mod macros;

pub mod cache;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod features;
pub mod inference;
pub mod tensor;

// Re-export commonly used types
pub use cache::ArtifactCache;
pub use engine::{ComputeBackend, InferenceEngine, InterpEngine, ModelDescription, NativeModel};
pub use error::{BridgeError, Result};
pub use features::{FeatureDictionary, FeatureValue, OutputBackings, PixelBuffer};
pub use inference::{
    BatchModelHandle, BatchResultView, Materialization, ModelHandle, ModelState, PredictRequest,
    ResultView,
};
pub use tensor::{BackingTensor, BindFailure, DType, Element, ReleaseBuffer, StridedTensor, F16};
