//! Permanent store for compiled model artifacts.
//!
//! Artifacts are keyed by a caller-chosen name. Writing a new artifact under
//! an existing name replaces the old one atomically: the compiled bytes are
//! staged in a temp file inside the store and renamed over the target.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::engine::InferenceEngine;
use crate::error::{BridgeError, Result};

#[derive(Debug, Clone)]
pub struct ArtifactCache {
    dir: PathBuf,
}

impl ArtifactCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where the artifact for `name` lives, whether or not it exists yet.
    pub fn path_for(&self, name: &str) -> Result<PathBuf> {
        let valid = !name.is_empty()
            && name != "."
            && name != ".."
            && !name.contains(|c: char| c == '/' || c == '\\');
        if !valid {
            return Err(BridgeError::config(format!("Invalid artifact name: {:?}", name)));
        }
        Ok(self.dir.join(name))
    }

    /// The stored artifact for `name`, if present.
    pub fn get(&self, name: &str) -> Result<Option<PathBuf>> {
        let path = self.path_for(name)?;
        Ok(path.is_file().then_some(path))
    }

    /// Compile `model` and store the artifact under `name`.
    pub fn compile_into<E: InferenceEngine>(
        &self,
        engine: &E,
        model: impl AsRef<Path>,
        name: &str,
    ) -> Result<PathBuf> {
        let model = model.as_ref();
        let target = self.path_for(name)?;
        let compiled = engine.compile(model)?;
        let stored = self.store(&compiled, &target);
        // The engine's temporary artifact is no longer needed either way.
        let _ = fs::remove_file(&compiled);
        stored?;
        info!("Stored compiled {} at {}", model.display(), target.display());
        Ok(target)
    }

    /// Atomically place the file at `compiled` under `target`.
    fn store(&self, compiled: &Path, target: &Path) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let mut staged = tempfile::NamedTempFile::new_in(&self.dir)?;
        io::copy(&mut fs::File::open(compiled)?, staged.as_file_mut())?;
        staged.as_file().sync_all()?;
        staged.persist(target).map_err(|e| BridgeError::Io(e.error))?;
        Ok(())
    }
}
