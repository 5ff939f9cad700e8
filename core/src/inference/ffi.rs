//! Exported C ABI for foreign callers.
//!
//! Handles are opaque boxes created and destroyed through this module.
//! Every entry point catches panics, so nothing unwinds into the caller.
//! Failures are reported through a return value (`-1`, null) plus a
//! thread-local message read back with [`mlb_last_error`].
//!
//! Ownership at the boundary:
//!
//! - `bind_input_*` take a release callback. It runs exactly once after a
//!   successful bind (when the engine is done with the data), and never when
//!   the bind fails; on failure the caller still owns the buffer.
//! - `bind_output_*` borrow the caller's buffer. Nothing is released; the
//!   memory must stay valid until the prediction that used it is freed.
//! - `mlb_prediction_output_*` return copies owned by the caller, freed
//!   with the matching `mlb_free_*`. `mlb_prediction_output_view_*` return
//!   pointers owned by the prediction.

use std::any::Any;
use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::ptr::{self, NonNull};

use super::{BatchModelHandle, BatchResultView, ModelHandle, ResultView};
use crate::cache::ArtifactCache;
use crate::engine::{ComputeBackend, InferenceEngine, InterpEngine};
use crate::error::{BridgeError, Result};
use crate::features::PixelBuffer;
use crate::tensor::{BackingTensor, ReleaseBuffer, ReleaseFn, F16};

/// Single-prediction handle exposed to C.
pub type FfiModel = ModelHandle<InterpEngine>;

/// Batch handle exposed to C.
pub type FfiBatchModel = BatchModelHandle<InterpEngine>;

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn to_cstring(message: impl Into<String>) -> CString {
    let mut message: String = message.into();
    message.retain(|c| c != '\0');
    CString::new(message).unwrap_or_default()
}

fn set_error(message: impl Into<String>) {
    let message = to_cstring(message);
    LAST_ERROR.with(|cell| *cell.borrow_mut() = Some(message));
}

fn clear_error() {
    LAST_ERROR.with(|cell| *cell.borrow_mut() = None);
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}

/// Run `f`, turning a panic into an error.
fn catch<R>(f: impl FnOnce() -> Result<R>) -> Result<R> {
    catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
        Err(BridgeError::inference(format!(
            "panic at the C boundary: {}",
            panic_message(payload.as_ref())
        )))
    })
}

/// Run `f`, recording any failure as the last error and returning `fallback`.
fn guard<R>(fallback: R, f: impl FnOnce() -> Result<R>) -> R {
    match catch(f) {
        Ok(value) => {
            clear_error();
            value
        }
        Err(e) => {
            set_error(e.to_string());
            fallback
        }
    }
}

unsafe fn handle_mut<'a, H>(ptr: *mut H) -> Result<&'a mut H> {
    ptr.as_mut().ok_or_else(|| BridgeError::bind("null handle"))
}

unsafe fn handle_ref<'a, H>(ptr: *const H) -> Result<&'a H> {
    ptr.as_ref().ok_or_else(|| BridgeError::bind("null handle"))
}

unsafe fn c_str<'a>(ptr: *const c_char) -> Result<&'a str> {
    if ptr.is_null() {
        return Err(BridgeError::bind("null string pointer"));
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map_err(|e| BridgeError::bind(format!("string is not UTF-8: {}", e)))
}

unsafe fn shape_slice<'a>(shape: *const usize, ndim: usize) -> Result<&'a [usize]> {
    if ndim == 0 {
        return Ok(&[]);
    }
    if shape.is_null() {
        return Err(BridgeError::bind("null shape pointer"));
    }
    Ok(std::slice::from_raw_parts(shape, ndim))
}

/// Map the C backend code: 0 = CPU, 1 = CPU and neural engine, 2 = CPU and GPU.
fn backend_from_raw(code: c_int) -> Result<ComputeBackend> {
    match code {
        0 => Ok(ComputeBackend::Cpu),
        1 => Ok(ComputeBackend::CpuAndNeuralEngine),
        2 => Ok(ComputeBackend::CpuAndGpu),
        other => Err(BridgeError::config(format!("Invalid compute backend code: {}", other))),
    }
}

/// Wrap asset bytes handed over by the caller. A null `release` leaves the
/// memory with the caller, who must keep it alive until the handle is freed.
unsafe fn asset_buffer(
    data: *mut u8,
    len: usize,
    release: Option<ReleaseFn<u8>>,
) -> Result<ReleaseBuffer<u8>> {
    let buffer = match release {
        Some(release) => ReleaseBuffer::from_raw(data, len, release),
        None => NonNull::new(data).map(|ptr| ReleaseBuffer::from_parts(ptr, len, |_, _| {})),
    };
    buffer.ok_or_else(|| BridgeError::model_load("asset data pointer is null"))
}

/// Wrap input data handed over by the caller. Without a release callback
/// nothing is taken; the caller keeps the buffer.
unsafe fn input_buffer<T: Send + 'static>(
    data: *mut T,
    len: usize,
    release: Option<ReleaseFn<T>>,
) -> Result<ReleaseBuffer<T>> {
    let release = release.ok_or_else(|| BridgeError::bind("input release callback is null"))?;
    ReleaseBuffer::from_raw(data, len, release)
        .ok_or_else(|| BridgeError::bind("input data pointer is null"))
}

/// Give a rejected buffer back to the caller without releasing it.
fn reject<T>(error: BridgeError, buffer: ReleaseBuffer<T>) -> BridgeError {
    let _ = buffer.into_raw();
    error
}

fn boxed_slice<T>(data: Vec<T>, out_len: *mut usize) -> *mut T {
    let data = data.into_boxed_slice();
    if !out_len.is_null() {
        // SAFETY: checked non-null; the caller provides a writable slot.
        unsafe { *out_len = data.len() };
    }
    Box::into_raw(data) as *mut T
}

unsafe fn free_boxed_slice<T>(ptr: *mut T, len: usize) {
    if !ptr.is_null() {
        drop(Box::from_raw(ptr::slice_from_raw_parts_mut(ptr, len)));
    }
}

/// Message of the last failed call on this thread, or null.
///
/// The pointer stays valid until the next call into this library on the
/// same thread.
#[no_mangle]
pub extern "C" fn mlb_last_error() -> *const c_char {
    LAST_ERROR.with(|cell| match &*cell.borrow() {
        Some(message) => message.as_ptr(),
        None => ptr::null(),
    })
}

/// Free a string returned by this library.
///
/// # Safety
///
/// `ptr` must come from this library and not have been freed.
#[no_mangle]
pub unsafe extern "C" fn mlb_string_free(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

/// Compile a model source. With a non-null `cache_dir` the artifact is
/// stored there under `name`; otherwise it lands in a temporary file.
///
/// Returns the artifact path (free with [`mlb_string_free`]) or null.
///
/// # Safety
///
/// String arguments must be null or valid NUL-terminated strings.
#[no_mangle]
pub unsafe extern "C" fn mlb_compile_to_path(
    model_path: *const c_char,
    cache_dir: *const c_char,
    name: *const c_char,
) -> *mut c_char {
    guard(ptr::null_mut(), || {
        let model_path = Path::new(c_str(model_path)?);
        let engine = InterpEngine::new();
        let compiled = if cache_dir.is_null() {
            engine.compile(model_path)?
        } else {
            ArtifactCache::new(c_str(cache_dir)?).compile_into(&engine, model_path, c_str(name)?)?
        };
        Ok(to_cstring(compiled.to_string_lossy()).into_raw())
    })
}

macro_rules! ffi_lifecycle {
    ($handle:ty, $from_asset:ident, $from_path:ident, $free:ident, $load:ident, $unload:ident, $failed:ident, $describe:ident) => {
        /// Create a handle from compiled asset bytes.
        ///
        /// The bytes are consumed even when the returned handle has failed
        /// to load; null is returned only for invalid arguments, in which
        /// case a non-null buffer is still released.
        ///
        /// # Safety
        ///
        /// `data` must point to `len` bytes that `release` may free.
        #[no_mangle]
        pub unsafe extern "C" fn $from_asset(
            data: *mut u8,
            len: usize,
            release: Option<ReleaseFn<u8>>,
            backend: c_int,
        ) -> *mut $handle {
            guard(ptr::null_mut(), || {
                let bytes = asset_buffer(data, len, release)?;
                let backend = backend_from_raw(backend)?;
                let handle = <$handle>::from_asset(InterpEngine::new(), bytes, backend);
                Ok(Box::into_raw(Box::new(handle)))
            })
        }

        /// Create a handle from a model on disk, compiling it first unless
        /// `compiled` is non-zero.
        ///
        /// # Safety
        ///
        /// `path` must be a valid NUL-terminated string.
        #[no_mangle]
        pub unsafe extern "C" fn $from_path(
            path: *const c_char,
            compiled: c_int,
            backend: c_int,
        ) -> *mut $handle {
            guard(ptr::null_mut(), || {
                let path = c_str(path)?;
                let backend = backend_from_raw(backend)?;
                let handle = <$handle>::from_path(InterpEngine::new(), path, compiled != 0, backend);
                Ok(Box::into_raw(Box::new(handle)))
            })
        }

        /// # Safety
        ///
        /// `handle` must be null or a live handle from this library.
        #[no_mangle]
        pub unsafe extern "C" fn $free(handle: *mut $handle) {
            if !handle.is_null() {
                let _ = catch(|| {
                    drop(Box::from_raw(handle));
                    Ok(())
                });
            }
        }

        /// Blocks until the model is materialized. Returns 0 or -1.
        ///
        /// # Safety
        ///
        /// `handle` must be a live handle from this library.
        #[no_mangle]
        pub unsafe extern "C" fn $load(handle: *mut $handle) -> c_int {
            guard(-1, || {
                handle_mut(handle)?.load()?;
                Ok(0)
            })
        }

        /// # Safety
        ///
        /// `handle` must be a live handle from this library.
        #[no_mangle]
        pub unsafe extern "C" fn $unload(handle: *mut $handle) -> c_int {
            guard(-1, || {
                handle_mut(handle)?.unload()?;
                Ok(0)
            })
        }

        /// 1 if the handle failed to load, 0 if not, -1 for a null handle.
        ///
        /// # Safety
        ///
        /// `handle` must be null or a live handle from this library.
        #[no_mangle]
        pub unsafe extern "C" fn $failed(handle: *const $handle) -> c_int {
            guard(-1, || Ok(c_int::from(handle_ref(handle)?.has_failed_to_load())))
        }

        /// Model interface as JSON (free with [`mlb_string_free`]), or null
        /// when the model is not loaded.
        ///
        /// # Safety
        ///
        /// `handle` must be a live handle from this library.
        #[no_mangle]
        pub unsafe extern "C" fn $describe(handle: *const $handle) -> *mut c_char {
            guard(ptr::null_mut(), || {
                let description = handle_ref(handle)?
                    .describe()
                    .ok_or(BridgeError::NotLoaded)?;
                Ok(to_cstring(serde_json::to_string(&description)?).into_raw())
            })
        }
    };
}

ffi_lifecycle!(
    FfiModel,
    mlb_model_from_asset,
    mlb_model_from_path,
    mlb_model_free,
    mlb_model_load,
    mlb_model_unload,
    mlb_model_failed_to_load,
    mlb_model_description_json
);

ffi_lifecycle!(
    FfiBatchModel,
    mlb_batch_model_from_asset,
    mlb_batch_model_from_path,
    mlb_batch_model_free,
    mlb_batch_model_load,
    mlb_batch_model_unload,
    mlb_batch_model_failed_to_load,
    mlb_batch_model_description_json
);

/// Bind a BGRA image as input `name`. Returns 0 or -1.
///
/// # Safety
///
/// `data` must point to `len` bytes that `release` may free; `model` and
/// `name` must be valid. A null `release` fails the bind.
#[no_mangle]
pub unsafe extern "C" fn mlb_model_bind_input_bgra(
    model: *mut FfiModel,
    name: *const c_char,
    width: usize,
    height: usize,
    data: *mut u8,
    len: usize,
    release: Option<ReleaseFn<u8>>,
) -> c_int {
    guard(-1, || {
        let model = handle_mut(model)?;
        let name = c_str(name)?;
        let buffer = input_buffer(data, len, release)?;
        let image = PixelBuffer::bgra(width, height, buffer)
            .map_err(|failure| {
                let (error, buffer) = failure.into_parts();
                reject(error, buffer)
            })?;
        model.bind_pixel_buffer(name, image);
        Ok(0)
    })
}

/// Bind a BGRA image as input `name` at batch position `index`.
///
/// # Safety
///
/// Same contract as [`mlb_model_bind_input_bgra`].
#[no_mangle]
pub unsafe extern "C" fn mlb_batch_model_bind_input_bgra(
    model: *mut FfiBatchModel,
    index: usize,
    name: *const c_char,
    width: usize,
    height: usize,
    data: *mut u8,
    len: usize,
    release: Option<ReleaseFn<u8>>,
) -> c_int {
    guard(-1, || {
        let model = handle_mut(model)?;
        let name = c_str(name)?;
        let buffer = input_buffer(data, len, release)?;
        let image = PixelBuffer::bgra(width, height, buffer)
            .map_err(|failure| {
                let (error, buffer) = failure.into_parts();
                reject(error, buffer)
            })?;
        model.bind_pixel_buffer(name, image, index);
        Ok(0)
    })
}

/// Outcome of one prediction.
///
/// A failed prediction has an error and no outputs.
pub struct FfiPrediction {
    view: Option<ResultView<'static>>,
    error: Option<CString>,
    names: Vec<CString>,
}

impl FfiPrediction {
    fn new(result: Result<ResultView<'static>>) -> Self {
        match result {
            Ok(view) => {
                let names = view.output_names().into_iter().map(to_cstring).collect();
                Self {
                    view: Some(view),
                    error: None,
                    names,
                }
            }
            Err(e) => {
                set_error(e.to_string());
                Self {
                    view: None,
                    error: Some(to_cstring(e.to_string())),
                    names: Vec::new(),
                }
            }
        }
    }

    fn view(&self) -> Result<&ResultView<'static>> {
        self.view
            .as_ref()
            .ok_or_else(|| BridgeError::inference("prediction failed; it has no outputs"))
    }
}

/// Run the staged inputs and backings. Never returns null.
///
/// Staged state is cleared whether or not the prediction succeeds.
///
/// # Safety
///
/// `model` must be a live handle. Buffers bound with `bind_output_*` must
/// stay valid until the returned prediction is freed.
#[no_mangle]
pub unsafe extern "C" fn mlb_model_predict(model: *mut FfiModel) -> *mut FfiPrediction {
    let result = catch(|| handle_mut(model)?.predict());
    if result.is_ok() {
        clear_error();
    }
    Box::into_raw(Box::new(FfiPrediction::new(result)))
}

/// Error message of a failed prediction, or null on success.
///
/// # Safety
///
/// `prediction` must be a live prediction from this library.
#[no_mangle]
pub unsafe extern "C" fn mlb_prediction_error(prediction: *const FfiPrediction) -> *const c_char {
    match prediction.as_ref() {
        Some(p) => p.error.as_ref().map_or(ptr::null(), |e| e.as_ptr()),
        None => ptr::null(),
    }
}

/// 1 if backed outputs alias the caller's buffers, else 0.
///
/// # Safety
///
/// `prediction` must be a live prediction from this library.
#[no_mangle]
pub unsafe extern "C" fn mlb_prediction_is_zero_copy(prediction: *const FfiPrediction) -> c_int {
    guard(0, || Ok(c_int::from(handle_ref(prediction)?.view()?.is_zero_copy())))
}

/// # Safety
///
/// `prediction` must be a live prediction from this library.
#[no_mangle]
pub unsafe extern "C" fn mlb_prediction_output_count(prediction: *const FfiPrediction) -> usize {
    match prediction.as_ref() {
        Some(p) => p.names.len(),
        None => 0,
    }
}

/// Name of output `index` in sorted order, or null when out of range.
/// Owned by the prediction.
///
/// # Safety
///
/// `prediction` must be a live prediction from this library.
#[no_mangle]
pub unsafe extern "C" fn mlb_prediction_output_name(
    prediction: *const FfiPrediction,
    index: usize,
) -> *const c_char {
    guard(ptr::null(), || {
        let prediction = handle_ref(prediction)?;
        let name = prediction.names.get(index).ok_or(BridgeError::IndexOutOfRange {
            index,
            count: prediction.names.len(),
        })?;
        Ok(name.as_ptr())
    })
}

/// Shape of output `name`, owned by the prediction; writes the rank to
/// `out_ndim`. Null when the output is absent.
///
/// # Safety
///
/// `prediction` and `name` must be valid; `out_ndim` must be writable.
#[no_mangle]
pub unsafe extern "C" fn mlb_prediction_output_shape(
    prediction: *const FfiPrediction,
    name: *const c_char,
    out_ndim: *mut usize,
) -> *const usize {
    guard(ptr::null(), || {
        let name = c_str(name)?;
        let shape = handle_ref(prediction)?
            .view()?
            .shape(name)
            .ok_or_else(|| BridgeError::MissingOutput(name.to_string()))?;
        if let Some(out) = out_ndim.as_mut() {
            *out = shape.len();
        }
        Ok(shape.as_ptr())
    })
}

/// # Safety
///
/// `prediction` must be null or a live prediction from this library.
#[no_mangle]
pub unsafe extern "C" fn mlb_prediction_free(prediction: *mut FfiPrediction) {
    if !prediction.is_null() {
        drop(Box::from_raw(prediction));
    }
}

/// Outcome of one batch prediction, one [`FfiPrediction`] per item.
pub struct FfiBatchPrediction {
    items: Vec<FfiPrediction>,
    error: Option<CString>,
}

impl FfiBatchPrediction {
    fn new(result: Result<BatchResultView>) -> Self {
        match result {
            Ok(batch) => Self {
                items: batch
                    .into_outputs()
                    .into_iter()
                    .map(|view| FfiPrediction::new(Ok(view)))
                    .collect(),
                error: None,
            },
            Err(e) => {
                set_error(e.to_string());
                Self {
                    items: Vec::new(),
                    error: Some(to_cstring(e.to_string())),
                }
            }
        }
    }
}

/// Run every staged batch position as one request. Never returns null.
///
/// # Safety
///
/// `model` must be a live batch handle.
#[no_mangle]
pub unsafe extern "C" fn mlb_batch_model_predict(model: *mut FfiBatchModel) -> *mut FfiBatchPrediction {
    let result = catch(|| handle_mut(model)?.predict());
    if result.is_ok() {
        clear_error();
    }
    Box::into_raw(Box::new(FfiBatchPrediction::new(result)))
}

/// # Safety
///
/// `batch` must be a live batch prediction from this library.
#[no_mangle]
pub unsafe extern "C" fn mlb_batch_prediction_error(batch: *const FfiBatchPrediction) -> *const c_char {
    match batch.as_ref() {
        Some(b) => b.error.as_ref().map_or(ptr::null(), |e| e.as_ptr()),
        None => ptr::null(),
    }
}

/// # Safety
///
/// `batch` must be a live batch prediction from this library.
#[no_mangle]
pub unsafe extern "C" fn mlb_batch_prediction_count(batch: *const FfiBatchPrediction) -> usize {
    match batch.as_ref() {
        Some(b) => b.items.len(),
        None => 0,
    }
}

/// Prediction for item `index`, owned by the batch; null when out of range.
///
/// # Safety
///
/// `batch` must be a live batch prediction from this library.
#[no_mangle]
pub unsafe extern "C" fn mlb_batch_prediction_output_at(
    batch: *const FfiBatchPrediction,
    index: usize,
) -> *const FfiPrediction {
    guard(ptr::null(), || {
        let batch = handle_ref(batch)?;
        let item = batch.items.get(index).ok_or(BridgeError::IndexOutOfRange {
            index,
            count: batch.items.len(),
        })?;
        Ok(item as *const FfiPrediction)
    })
}

/// # Safety
///
/// `batch` must be null or a live batch prediction from this library.
#[no_mangle]
pub unsafe extern "C" fn mlb_batch_prediction_free(batch: *mut FfiBatchPrediction) {
    if !batch.is_null() {
        drop(Box::from_raw(batch));
    }
}

macro_rules! ffi_dtype {
    (
        $ty:ty,
        $bind_input:ident,
        $bind_output:ident,
        $batch_bind_input:ident,
        $output:ident,
        $output_view:ident,
        $free:ident
    ) => {
        /// Bind `len` elements as input `name` with the given shape.
        /// Returns 0 or -1.
        ///
        /// On success `release` runs exactly once, after the engine is done
        /// with the data. On failure, including a null `release`, it never
        /// runs.
        ///
        /// # Safety
        ///
        /// `data` must point to `len` elements that `release` may free;
        /// `shape` must point to `ndim` dimensions.
        #[no_mangle]
        pub unsafe extern "C" fn $bind_input(
            model: *mut FfiModel,
            name: *const c_char,
            shape: *const usize,
            ndim: usize,
            data: *mut $ty,
            len: usize,
            release: Option<ReleaseFn<$ty>>,
        ) -> c_int {
            guard(-1, || {
                let model = handle_mut(model)?;
                let name = c_str(name)?;
                let shape = shape_slice(shape, ndim)?;
                let buffer = input_buffer(data, len, release)?;
                model.bind_input(name, shape, buffer).map_err(|failure| {
                    let (error, buffer) = failure.into_parts();
                    reject(error, buffer)
                })?;
                Ok(0)
            })
        }

        /// Register `len` caller-owned elements as the write-through target
        /// for output `name`. Returns 0 or -1.
        ///
        /// # Safety
        ///
        /// `data` must stay valid and untouched until the prediction that
        /// uses it has been freed.
        #[no_mangle]
        pub unsafe extern "C" fn $bind_output(
            model: *mut FfiModel,
            name: *const c_char,
            shape: *const usize,
            ndim: usize,
            data: *mut $ty,
            len: usize,
        ) -> c_int {
            guard(-1, || {
                let model = handle_mut(model)?;
                let name = c_str(name)?;
                let shape = shape_slice(shape, ndim)?;
                let backing = BackingTensor::from_raw(shape, data, len)?;
                model.bind_output_backing(name, backing)?;
                Ok(0)
            })
        }

        /// Batch counterpart of the single-model bind, at position `index`.
        ///
        /// # Safety
        ///
        /// Same contract as the single-model bind.
        #[no_mangle]
        pub unsafe extern "C" fn $batch_bind_input(
            model: *mut FfiBatchModel,
            index: usize,
            name: *const c_char,
            shape: *const usize,
            ndim: usize,
            data: *mut $ty,
            len: usize,
            release: Option<ReleaseFn<$ty>>,
        ) -> c_int {
            guard(-1, || {
                let model = handle_mut(model)?;
                let name = c_str(name)?;
                let shape = shape_slice(shape, ndim)?;
                let buffer = input_buffer(data, len, release)?;
                model.bind_input(name, shape, buffer, index).map_err(|failure| {
                    let (error, buffer) = failure.into_parts();
                    reject(error, buffer)
                })?;
                Ok(0)
            })
        }

        /// Row-major copy of output `name`, owned by the caller and freed
        /// with the matching `mlb_free_*`. Writes the element count to
        /// `out_len`. Null on failure.
        ///
        /// # Safety
        ///
        /// `prediction` and `name` must be valid.
        #[no_mangle]
        pub unsafe extern "C" fn $output(
            prediction: *const FfiPrediction,
            name: *const c_char,
            out_len: *mut usize,
        ) -> *mut $ty {
            guard(ptr::null_mut(), || {
                let name = c_str(name)?;
                let data = handle_ref(prediction)?.view()?.output_vec::<$ty>(name)?;
                Ok(boxed_slice(data, out_len))
            })
        }

        /// Pointer to the data of output `name`, owned by the prediction.
        /// For a backed output in a zero-copy prediction this is the
        /// caller's own backing buffer.
        ///
        /// # Safety
        ///
        /// `prediction` and `name` must be valid.
        #[no_mangle]
        pub unsafe extern "C" fn $output_view(
            prediction: *const FfiPrediction,
            name: *const c_char,
            out_len: *mut usize,
        ) -> *const $ty {
            guard(ptr::null(), || {
                let name = c_str(name)?;
                let view = handle_ref(prediction)?.view()?.output::<$ty>(name)?;
                if let Some(out) = out_len.as_mut() {
                    *out = view.len();
                }
                Ok(view.as_ptr())
            })
        }

        /// Free a copy returned by the matching output function.
        ///
        /// # Safety
        ///
        /// `ptr` and `len` must come from that function.
        #[no_mangle]
        pub unsafe extern "C" fn $free(ptr: *mut $ty, len: usize) {
            free_boxed_slice(ptr, len)
        }
    };
}

ffi_dtype!(
    f32,
    mlb_model_bind_input_f32,
    mlb_model_bind_output_f32,
    mlb_batch_model_bind_input_f32,
    mlb_prediction_output_f32,
    mlb_prediction_output_view_f32,
    mlb_free_f32
);

ffi_dtype!(
    F16,
    mlb_model_bind_input_f16,
    mlb_model_bind_output_f16,
    mlb_batch_model_bind_input_f16,
    mlb_prediction_output_f16,
    mlb_prediction_output_view_f16,
    mlb_free_f16
);

ffi_dtype!(
    i32,
    mlb_model_bind_input_i32,
    mlb_model_bind_output_i32,
    mlb_batch_model_bind_input_i32,
    mlb_prediction_output_i32,
    mlb_prediction_output_view_i32,
    mlb_free_i32
);

ffi_dtype!(
    u16,
    mlb_model_bind_input_u16,
    mlb_model_bind_output_u16,
    mlb_batch_model_bind_input_u16,
    mlb_prediction_output_u16,
    mlb_prediction_output_view_u16,
    mlb_free_u16
);
