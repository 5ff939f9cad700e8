//! Batched model handle.

use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

use super::loader::{ModelCore, ModelState};
use super::result::BatchResultView;
use crate::engine::{ComputeBackend, InferenceEngine, ModelDescription, NativeModel};
use crate::error::Result;
use crate::features::{FeatureDictionary, PixelBuffer};
use crate::tensor::{BindFailure, Element, ReleaseBuffer, StridedTensor};

/// Handle submitting one input dictionary per batch position.
///
/// Batch results are always detached: there is no output backing path,
/// since one buffer per output name cannot hold per-item results.
pub struct BatchModelHandle<E: InferenceEngine> {
    core: ModelCore<E>,
    inputs: Vec<FeatureDictionary>,
}

impl<E: InferenceEngine> BatchModelHandle<E> {
    pub fn from_asset(engine: E, bytes: ReleaseBuffer<u8>, backend: ComputeBackend) -> Self {
        Self::from_asset_shared(Arc::new(engine), bytes, backend)
    }

    pub fn from_asset_shared(engine: Arc<E>, bytes: ReleaseBuffer<u8>, backend: ComputeBackend) -> Self {
        Self {
            core: ModelCore::from_asset(engine, bytes, backend),
            inputs: Vec::new(),
        }
    }

    pub fn from_path(
        engine: E,
        path: impl AsRef<Path>,
        compiled: bool,
        backend: ComputeBackend,
    ) -> Self {
        Self::from_path_shared(Arc::new(engine), path, compiled, backend)
    }

    pub fn from_path_shared(
        engine: Arc<E>,
        path: impl AsRef<Path>,
        compiled: bool,
        backend: ComputeBackend,
    ) -> Self {
        Self {
            core: ModelCore::from_path(engine, path, compiled, backend),
            inputs: Vec::new(),
        }
    }

    pub fn state(&self) -> ModelState {
        self.core.state()
    }

    pub fn has_failed_to_load(&self) -> bool {
        self.state() == ModelState::FailedToLoad
    }

    pub fn backend(&self) -> ComputeBackend {
        self.core.backend()
    }

    pub fn compiled_path(&self) -> Option<&Path> {
        self.core.compiled_path()
    }

    /// Blocking load.
    ///
    /// # Panics
    ///
    /// Panics inside a tokio runtime; use [`BatchModelHandle::load_async`]
    /// there.
    pub fn load(&mut self) -> Result<()> {
        self.core.load()
    }

    pub async fn load_async(&mut self) -> Result<()> {
        self.core.load_async().await
    }

    pub fn unload(&mut self) -> Result<()> {
        self.core.unload()
    }

    pub fn describe(&self) -> Option<ModelDescription> {
        self.core.describe()
    }

    /// Number of staged batch positions, including empty ones.
    pub fn pending(&self) -> usize {
        self.inputs.len()
    }

    /// Dictionary for batch position `index`, growing the batch with empty
    /// dictionaries as needed.
    fn slot(&mut self, index: usize) -> &mut FeatureDictionary {
        if self.inputs.len() <= index {
            self.inputs.resize_with(index + 1, FeatureDictionary::default);
        }
        &mut self.inputs[index]
    }

    /// Bind input `name` at batch position `index`.
    pub fn bind_input<T: Element>(
        &mut self,
        name: &str,
        shape: &[usize],
        buffer: ReleaseBuffer<T>,
        index: usize,
    ) -> std::result::Result<(), BindFailure<T>> {
        let tensor = StridedTensor::bridge(shape, buffer).map_err(|failure| {
            warn!("Unexpected input error for `{}`[{}]: {}", name, index, failure);
            failure
        })?;
        self.slot(index).insert(name, tensor);
        Ok(())
    }

    pub fn bind_array<T: Element>(
        &mut self,
        name: &str,
        array: ndarray::ArrayD<T>,
        index: usize,
    ) -> Result<()> {
        let tensor = StridedTensor::from_array(array)?;
        self.slot(index).insert(name, tensor);
        Ok(())
    }

    pub fn bind_pixel_buffer(&mut self, name: &str, image: PixelBuffer, index: usize) {
        self.slot(index).insert(name, image);
    }

    /// Submit every staged dictionary as one batch.
    ///
    /// The staged dictionaries are consumed whether or not the batch
    /// succeeds.
    pub fn predict(&mut self) -> Result<BatchResultView> {
        let batch = std::mem::take(&mut self.inputs);
        let model = self.core.loaded_mut()?;
        debug!(items = batch.len(), "running batch prediction");
        let outputs = model.predict_batch(batch)?;
        BatchResultView::from_engine(outputs)
    }
}
