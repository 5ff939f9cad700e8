//! Single-prediction model handle.

use ndarray::ArrayD;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

use super::loader::{ModelCore, ModelState};
use super::result::ResultView;
use crate::engine::{ComputeBackend, InferenceEngine, ModelDescription, NativeModel};
use crate::error::{BridgeError, Result};
use crate::features::{FeatureDictionary, OutputBackings, PixelBuffer};
use crate::tensor::{BackingTensor, BindFailure, Element, ReleaseBuffer, StridedTensor};

/// Inputs and output backings for exactly one prediction.
///
/// Consumed by [`ModelHandle::run`]; input buffers are released by the
/// engine, backings stay borrowed from the caller for `'b`.
#[derive(Debug, Default)]
pub struct PredictRequest<'b> {
    inputs: FeatureDictionary,
    backings: OutputBackings<'b>,
}

impl<'b> PredictRequest<'b> {
    pub fn new() -> Self {
        Self {
            inputs: FeatureDictionary::new(),
            backings: OutputBackings::new(),
        }
    }

    /// Bridge `buffer` and bind it as input `name`, replacing any earlier
    /// binding with that name.
    pub fn bind_input<T: Element>(
        &mut self,
        name: &str,
        shape: &[usize],
        buffer: ReleaseBuffer<T>,
    ) -> std::result::Result<(), BindFailure<T>> {
        let tensor = StridedTensor::bridge(shape, buffer).map_err(|failure| {
            warn!("Unexpected input error for `{}`: {}", name, failure);
            failure
        })?;
        self.inputs.insert(name, tensor);
        Ok(())
    }

    /// Bind an owned array as input `name`.
    pub fn bind_array<T: Element>(&mut self, name: &str, array: ArrayD<T>) -> Result<()> {
        let tensor = StridedTensor::from_array(array)?;
        self.inputs.insert(name, tensor);
        Ok(())
    }

    pub fn bind_pixel_buffer(&mut self, name: &str, image: PixelBuffer) {
        self.inputs.insert(name, image);
    }

    /// Register `data` as the write-through target for output `name`.
    pub fn bind_output_backing<T: Element>(
        &mut self,
        name: &str,
        shape: &[usize],
        data: &'b mut [T],
    ) -> Result<()> {
        let backing = BackingTensor::bridge(shape, data).map_err(|e| {
            warn!("Unexpected output error for `{}`: {}", name, e);
            e
        })?;
        self.backings.insert(name, backing);
        Ok(())
    }

    pub(crate) fn insert_backing(&mut self, name: &str, backing: BackingTensor<'b>) {
        self.backings.insert(name, backing);
    }

    pub fn inputs(&self) -> &FeatureDictionary {
        &self.inputs
    }

    pub fn backings(&self) -> &OutputBackings<'b> {
        &self.backings
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty() && self.backings.is_empty()
    }
}

/// Handle owning one native model and its staged prediction state.
///
/// Operations on one handle must not run concurrently; the handle does not
/// serialize itself. Independent handles need no coordination.
///
/// # Example
///
/// ```ignore
/// use mlbridge::{ComputeBackend, InterpEngine, ModelHandle, ReleaseBuffer};
///
/// let mut model = ModelHandle::from_path(InterpEngine::new(), "sum.yaml", false, ComputeBackend::Cpu);
/// model.load()?;
/// model.bind_input("x", &[1, 3, 2], ReleaseBuffer::from_vec(vec![1.0f32; 6]))?;
/// let result = model.predict()?;
/// println!("y = {:?}", result.output_f32("y")?);
/// ```
pub struct ModelHandle<E: InferenceEngine> {
    core: ModelCore<E>,
    staged: PredictRequest<'static>,
}

impl<E: InferenceEngine> ModelHandle<E> {
    /// Create a handle from compiled asset bytes.
    ///
    /// The bytes are always consumed. If the engine cannot parse them the
    /// handle is `FailedToLoad` and every later operation fails without
    /// touching the engine.
    pub fn from_asset(engine: E, bytes: ReleaseBuffer<u8>, backend: ComputeBackend) -> Self {
        Self::from_asset_shared(Arc::new(engine), bytes, backend)
    }

    pub fn from_asset_shared(engine: Arc<E>, bytes: ReleaseBuffer<u8>, backend: ComputeBackend) -> Self {
        Self {
            core: ModelCore::from_asset(engine, bytes, backend),
            staged: PredictRequest::new(),
        }
    }

    /// Create a handle from a model on disk, compiling it first unless
    /// `compiled` is set. Compile failure leaves the handle `FailedToLoad`.
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
            staged: PredictRequest::new(),
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

    pub fn engine(&self) -> &E {
        self.core.engine()
    }

    /// Path of the compiled artifact, if the handle was built from disk.
    pub fn compiled_path(&self) -> Option<&Path> {
        self.core.compiled_path()
    }

    /// Materialize the model; blocks until the engine is done.
    ///
    /// # Panics
    ///
    /// Panics when called from inside a tokio runtime, where blocking on the
    /// load thread is not allowed. Use [`ModelHandle::load_async`] there.
    pub fn load(&mut self) -> Result<()> {
        self.core.load()
    }

    /// Materialize the model without blocking an async runtime thread.
    pub async fn load_async(&mut self) -> Result<()> {
        self.core.load_async().await
    }

    /// Drop the native model. The handle can be loaded again.
    pub fn unload(&mut self) -> Result<()> {
        self.core.unload()
    }

    /// Interface of the loaded model; `None` unless loaded.
    pub fn describe(&self) -> Option<ModelDescription> {
        self.core.describe()
    }

    /// Stage input `name` for the next [`ModelHandle::predict`].
    pub fn bind_input<T: Element>(
        &mut self,
        name: &str,
        shape: &[usize],
        buffer: ReleaseBuffer<T>,
    ) -> std::result::Result<(), BindFailure<T>> {
        self.staged.bind_input(name, shape, buffer)
    }

    pub fn bind_array<T: Element>(&mut self, name: &str, array: ArrayD<T>) -> Result<()> {
        self.staged.bind_array(name, array)
    }

    pub fn bind_pixel_buffer(&mut self, name: &str, image: PixelBuffer) {
        self.staged.bind_pixel_buffer(name, image)
    }

    /// Stage a write-through output target for the next prediction.
    ///
    /// The caller keeps ownership of the memory; see
    /// [`BackingTensor::from_raw`] for the lifetime contract of foreign
    /// buffers.
    pub fn bind_output_backing(&mut self, name: &str, backing: BackingTensor<'static>) -> Result<()> {
        if self.has_failed_to_load() {
            return Err(BridgeError::model_load("model failed to load; handle is unusable"));
        }
        self.staged.insert_backing(name, backing);
        Ok(())
    }

    /// Run the staged request.
    ///
    /// Staged inputs and backings are consumed whether or not the prediction
    /// succeeds, leaving the handle ready for the next bind/predict cycle.
    pub fn predict(&mut self) -> Result<ResultView<'static>> {
        let request = std::mem::take(&mut self.staged);
        self.run(request)
    }

    /// Run an explicit request.
    ///
    /// With output backings the result is zero-copy over the caller's
    /// buffers; otherwise every output is copied before returning, since the
    /// engine may reuse its own output memory on the next call.
    pub fn run<'b>(&mut self, request: PredictRequest<'b>) -> Result<ResultView<'b>> {
        let PredictRequest {
            inputs,
            mut backings,
        } = request;
        let model = self.core.loaded_mut()?;
        debug!(
            inputs = inputs.len(),
            backings = backings.len(),
            "running prediction"
        );
        let outputs = model.predict(inputs, &mut backings)?;
        if backings.is_empty() {
            ResultView::detached(outputs)
        } else {
            ResultView::backed(backings, outputs)
        }
    }
}

impl<E: InferenceEngine + Default> ModelHandle<E> {
    /// Shorthand for [`ModelHandle::from_path`] with a default engine.
    pub fn open(path: impl AsRef<Path>, compiled: bool, backend: ComputeBackend) -> Self {
        Self::from_path(E::default(), path, compiled, backend)
    }
}
