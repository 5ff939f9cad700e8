//! Model handles and prediction results.
//!
//! This module provides the safe handles a caller drives (load, bind,
//! predict, unload) and the exported C ABI for callers in other languages.

mod batch;
pub mod ffi;
mod loader;
mod model;
mod result;

pub use batch::BatchModelHandle;
pub use loader::ModelState;
pub use model::{ModelHandle, PredictRequest};
pub use result::{BatchResultView, Materialization, ResultView};
