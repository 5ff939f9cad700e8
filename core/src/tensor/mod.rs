//! Tensors at the boundary.
//!
//! Element types, the ownership-transfer token for caller buffers, and the
//! strided bridge that turns a flat buffer plus shape into an engine tensor.

mod buffer;
mod dtype;
mod strided;

pub use buffer::{ReleaseBuffer, ReleaseFn};
pub use dtype::{DType, Element, TensorArray, TensorSlice, TensorSliceMut, F16};
pub use strided::{
    row_major_strides, validate_layout, BackingTensor, BindFailure, StridedTensor, TensorBuffer,
};
