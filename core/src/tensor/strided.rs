//! Strided tensor bridge.
//!
//! Turns a flat buffer plus a shape into the row-major strided tensor the
//! engine consumes. Input tensors own their buffer through a
//! [`ReleaseBuffer`]; output backings only borrow the caller's memory.

use ndarray::ArrayD;
use std::fmt;

use super::buffer::ReleaseBuffer;
use super::dtype::{DType, Element, TensorSlice, TensorSliceMut};
use crate::error::{BridgeError, Result};

/// Row-major element strides for `shape`; the last dimension is contiguous.
pub fn row_major_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![0; shape.len()];
    let mut running = 1usize;
    for (stride, dim) in strides.iter_mut().zip(shape).rev() {
        *stride = running;
        running = running.saturating_mul(*dim);
    }
    strides
}

/// Check that `shape` describes exactly `len` elements.
///
/// Returns the element count on success.
pub fn validate_layout(shape: &[usize], len: usize) -> Result<usize> {
    if shape.is_empty() {
        return Err(BridgeError::bind("shape must have at least one dimension"));
    }
    if let Some(axis) = shape.iter().position(|&d| d == 0) {
        return Err(BridgeError::bind(format!(
            "dimension {} of shape {:?} is zero",
            axis, shape
        )));
    }
    if len == 0 {
        return Err(BridgeError::bind("buffer is empty"));
    }
    let numel = shape
        .iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .ok_or_else(|| BridgeError::bind(format!("shape {:?} overflows usize", shape)))?;
    if numel != len {
        return Err(BridgeError::bind(format!(
            "shape {:?} needs {} elements, buffer holds {}",
            shape, numel, len
        )));
    }
    Ok(numel)
}

/// Engine-owned element storage tagged with its type.
#[derive(Debug)]
pub enum TensorBuffer {
    F32(ReleaseBuffer<f32>),
    F16(ReleaseBuffer<super::F16>),
    I32(ReleaseBuffer<i32>),
    U16(ReleaseBuffer<u16>),
}

impl TensorBuffer {
    pub fn as_slice(&self) -> TensorSlice<'_> {
        each_dtype!(self, TensorBuffer, b => Element::wrap_slice(b.as_slice()))
    }
}

/// A bridge attempt the engine rejected.
///
/// Carries the untouched buffer back: ownership was never transferred and
/// the release has not run. Dropping the failure releases the buffer.
pub struct BindFailure<T> {
    pub error: BridgeError,
    pub buffer: ReleaseBuffer<T>,
}

impl<T> BindFailure<T> {
    pub fn new(error: BridgeError, buffer: ReleaseBuffer<T>) -> Self {
        Self { error, buffer }
    }

    pub fn into_parts(self) -> (BridgeError, ReleaseBuffer<T>) {
        (self.error, self.buffer)
    }
}

impl<T> fmt::Debug for BindFailure<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindFailure")
            .field("error", &self.error)
            .field("buffer", &self.buffer)
            .finish()
    }
}

impl<T> fmt::Display for BindFailure<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.error, f)
    }
}

impl<T> std::error::Error for BindFailure<T> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl<T> From<BindFailure<T>> for BridgeError {
    fn from(failure: BindFailure<T>) -> Self {
        failure.error
    }
}

/// Multidimensional array over a transferred buffer.
#[derive(Debug)]
pub struct StridedTensor {
    shape: Vec<usize>,
    strides: Vec<usize>,
    buffer: TensorBuffer,
}

impl StridedTensor {
    /// Bridge `buffer` into a row-major tensor of the given shape.
    ///
    /// On success the tensor owns the buffer and its release runs exactly
    /// once, whenever the tensor is dropped. On failure the buffer comes back
    /// inside the [`BindFailure`].
    pub fn bridge<T: Element>(
        shape: &[usize],
        buffer: ReleaseBuffer<T>,
    ) -> std::result::Result<Self, BindFailure<T>> {
        if let Err(error) = validate_layout(shape, buffer.len()) {
            return Err(BindFailure::new(error, buffer));
        }
        Ok(Self {
            shape: shape.to_vec(),
            strides: row_major_strides(shape),
            buffer: T::into_buffer(buffer),
        })
    }

    /// Copy an array into a fresh standard-layout buffer and bridge it.
    pub fn from_array<T: Element>(array: ArrayD<T>) -> Result<Self> {
        let shape = array.shape().to_vec();
        let data: Vec<T> = array.as_standard_layout().iter().copied().collect();
        Self::bridge(&shape, ReleaseBuffer::from_vec(data)).map_err(BridgeError::from)
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    pub fn dtype(&self) -> DType {
        self.data().dtype()
    }

    pub fn len(&self) -> usize {
        self.data().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element data tagged with its type.
    pub fn data(&self) -> TensorSlice<'_> {
        self.buffer.as_slice()
    }

    /// Typed element data, or `None` if `T` is not this tensor's dtype.
    pub fn as_slice<T: Element>(&self) -> Option<&[T]> {
        T::buffer_ref(&self.buffer).map(ReleaseBuffer::as_slice)
    }
}

/// Write-through output target over caller-owned memory.
///
/// The engine writes the prediction for this output straight into the
/// borrowed buffer. Nothing is ever released: the caller keeps ownership.
#[derive(Debug)]
pub struct BackingTensor<'b> {
    shape: Vec<usize>,
    strides: Vec<usize>,
    data: TensorSliceMut<'b>,
}

impl<'b> BackingTensor<'b> {
    pub fn bridge<T: Element>(shape: &[usize], data: &'b mut [T]) -> Result<Self> {
        validate_layout(shape, data.len())?;
        Ok(Self {
            shape: shape.to_vec(),
            strides: row_major_strides(shape),
            data: T::wrap_slice_mut(data),
        })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    pub fn dtype(&self) -> DType {
        self.data.dtype()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Mutable access for the engine.
    pub fn data_mut(&mut self) -> TensorSliceMut<'_> {
        self.data.reborrow()
    }

    pub(crate) fn into_parts(self) -> (Vec<usize>, TensorSliceMut<'b>) {
        (self.shape, self.data)
    }
}

impl BackingTensor<'static> {
    /// Bridge a foreign output buffer.
    ///
    /// # Safety
    ///
    /// `ptr` must point to `len` elements that stay valid, and are not read
    /// or written by anyone else, until the prediction that uses this backing
    /// and every view derived from it have been dropped.
    pub unsafe fn from_raw<T: Element>(shape: &[usize], ptr: *mut T, len: usize) -> Result<Self> {
        if ptr.is_null() {
            return Err(BridgeError::bind("output backing pointer is null"));
        }
        Self::bridge(shape, std::slice::from_raw_parts_mut(ptr, len))
    }
}
