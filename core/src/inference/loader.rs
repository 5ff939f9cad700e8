//! Model source and load state shared by single and batch handles.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::engine::{ComputeBackend, InferenceEngine, ModelDescription, NativeModel};
use crate::error::{BridgeError, Result};
use crate::tensor::ReleaseBuffer;

/// Lifecycle state of a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelState {
    /// Construction failed; terminal.
    FailedToLoad,
    Unloaded,
    Loaded,
}

/// Where a handle materializes its model from.
pub(crate) enum ModelSource<E: InferenceEngine> {
    /// Parsed in-memory compiled asset.
    Asset(Arc<E::Asset>),
    /// Compiled artifact on disk.
    Compiled(PathBuf),
}

impl<E: InferenceEngine> Clone for ModelSource<E> {
    fn clone(&self) -> Self {
        match self {
            Self::Asset(asset) => Self::Asset(Arc::clone(asset)),
            Self::Compiled(path) => Self::Compiled(path.clone()),
        }
    }
}

type LoadReceiver<M> = oneshot::Receiver<Result<M>>;

/// Engine, source, backend and the loaded native model.
pub(crate) struct ModelCore<E: InferenceEngine> {
    engine: Arc<E>,
    backend: ComputeBackend,
    source: Option<ModelSource<E>>,
    model: Option<E::Model>,
}

impl<E: InferenceEngine> ModelCore<E> {
    /// Parse a compiled asset. The bytes are consumed either way; a parse
    /// failure leaves the core in `FailedToLoad`.
    pub(crate) fn from_asset(engine: Arc<E>, bytes: ReleaseBuffer<u8>, backend: ComputeBackend) -> Self {
        let source = match engine.parse_asset(bytes) {
            Ok(asset) => Some(ModelSource::Asset(Arc::new(asset))),
            Err(e) => {
                warn!(engine = engine.name(), "failed to parse compiled asset: {}", e);
                None
            }
        };
        Self {
            engine,
            backend,
            source,
            model: None,
        }
    }

    /// Use a compiled artifact, compiling `path` first unless `compiled`.
    pub(crate) fn from_path(
        engine: Arc<E>,
        path: impl AsRef<Path>,
        compiled: bool,
        backend: ComputeBackend,
    ) -> Self {
        let path = path.as_ref();
        let source = if compiled {
            Some(ModelSource::Compiled(path.to_path_buf()))
        } else {
            match engine.compile(path) {
                Ok(compiled_path) => {
                    info!("Compiled {} -> {}", path.display(), compiled_path.display());
                    Some(ModelSource::Compiled(compiled_path))
                }
                Err(e) => {
                    warn!("failed to compile {}: {}", path.display(), e);
                    None
                }
            }
        };
        Self {
            engine,
            backend,
            source,
            model: None,
        }
    }

    pub(crate) fn state(&self) -> ModelState {
        match (&self.source, &self.model) {
            (None, _) => ModelState::FailedToLoad,
            (Some(_), None) => ModelState::Unloaded,
            (Some(_), Some(_)) => ModelState::Loaded,
        }
    }

    pub(crate) fn backend(&self) -> ComputeBackend {
        self.backend
    }

    pub(crate) fn engine(&self) -> &E {
        &self.engine
    }

    pub(crate) fn compiled_path(&self) -> Option<&Path> {
        match &self.source {
            Some(ModelSource::Compiled(path)) => Some(path),
            _ => None,
        }
    }

    fn source(&self) -> Result<&ModelSource<E>> {
        self.source
            .as_ref()
            .ok_or_else(|| BridgeError::model_load("model failed to load; handle is unusable"))
    }

    /// Start materialization on a dedicated thread.
    ///
    /// The result arrives through the returned one-shot receiver. There is no
    /// cancellation: the thread runs until the engine returns.
    fn spawn_load(&self) -> Result<LoadReceiver<E::Model>> {
        let source = self.source()?.clone();
        let engine = Arc::clone(&self.engine);
        let backend = self.backend;
        let (tx, rx) = oneshot::channel();
        std::thread::Builder::new()
            .name("mlbridge-load".into())
            .spawn(move || {
                let result = match &source {
                    ModelSource::Asset(asset) => engine.load_asset(asset, backend),
                    ModelSource::Compiled(path) => engine.load_path(path, backend),
                };
                // The receiver only disappears if the caller itself went away.
                let _ = tx.send(result);
            })?;
        Ok(rx)
    }

    fn finish_load(
        &mut self,
        received: std::result::Result<Result<E::Model>, oneshot::error::RecvError>,
    ) -> Result<()> {
        let result = received
            .map_err(|_| BridgeError::model_load("load task ended without reporting"))
            .and_then(|r| r);
        match result {
            Ok(model) => {
                self.model = Some(model);
                debug!(backend = %self.backend, "model loaded");
                Ok(())
            }
            Err(e) => {
                self.model = None;
                Err(e)
            }
        }
    }

    /// Materialize the model, blocking until the load thread reports back.
    ///
    /// Must not be called from inside an async runtime; use
    /// [`ModelCore::load_async`] there.
    pub(crate) fn load(&mut self) -> Result<()> {
        let rx = self.spawn_load()?;
        let received = rx.blocking_recv();
        self.finish_load(received)
    }

    pub(crate) async fn load_async(&mut self) -> Result<()> {
        let rx = self.spawn_load()?;
        let received = rx.await;
        self.finish_load(received)
    }

    pub(crate) fn unload(&mut self) -> Result<()> {
        self.source()?;
        self.model = None;
        Ok(())
    }

    pub(crate) fn describe(&self) -> Option<ModelDescription> {
        self.model.as_ref().map(NativeModel::describe)
    }

    /// The loaded model, or why there is none.
    pub(crate) fn loaded_mut(&mut self) -> Result<&mut E::Model> {
        self.source()?;
        self.model.as_mut().ok_or(BridgeError::NotLoaded)
    }
}
