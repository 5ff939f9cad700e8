//! Element types that may cross the boundary.

use ndarray::{ArrayD, ArrayViewD, IxDyn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::buffer::ReleaseBuffer;
use super::strided::TensorBuffer;
use crate::error::{BridgeError, Result};

/// Element type tag carried by every tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    /// IEEE single precision.
    F32,
    /// IEEE half precision.
    F16,
    /// Signed 32-bit integer.
    I32,
    /// Unsigned 16-bit integer.
    U16,
}

impl DType {
    /// Size of one element in bytes.
    pub fn size_in_bytes(self) -> usize {
        match self {
            Self::F32 | Self::I32 => 4,
            Self::F16 | Self::U16 => 2,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::F32 => "f32",
            Self::F16 => "f16",
            Self::I32 => "i32",
            Self::U16 => "u16",
        };
        f.write_str(name)
    }
}

impl FromStr for DType {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "f32" | "float32" => Ok(Self::F32),
            "f16" | "float16" => Ok(Self::F16),
            "i32" | "int32" => Ok(Self::I32),
            "u16" | "uint16" => Ok(Self::U16),
            other => Err(BridgeError::config(format!("Invalid element type: {}", other))),
        }
    }
}

/// IEEE-754 half precision value stored as its raw bits.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct F16(u16);

impl F16 {
    pub const ZERO: F16 = F16(0);

    pub const fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    pub const fn to_bits(self) -> u16 {
        self.0
    }

    /// Round-to-nearest-even conversion. Results below the normal range
    /// round into the subnormals; anything under half the smallest subnormal
    /// becomes signed zero.
    pub fn from_f32(value: f32) -> Self {
        let bits = value.to_bits();
        let sign = (bits >> 16) & 0x8000;
        let f32_exp = (bits >> 23) & 0xFF;
        let mantissa = bits & 0x7F_FFFF;

        if f32_exp == 0xFF && mantissa != 0 {
            return Self((sign | 0x7E00) as u16);
        }

        let exp = f32_exp as i32 - 127 + 15;
        if exp < -10 {
            return Self(sign as u16);
        }
        if exp <= 0 {
            // value = (mantissa | hidden) * 2^(exp - 38); subnormal units are 2^-24.
            let full = mantissa | 0x80_0000;
            let shift = (14 - exp) as u32;
            let truncated = full >> shift;
            let round_bit = (full >> (shift - 1)) & 1;
            let sticky = full & ((1 << (shift - 1)) - 1);
            let rounded = if round_bit != 0 && (sticky != 0 || (truncated & 1) != 0) {
                truncated + 1
            } else {
                truncated
            };
            // A carry into bit 10 lands exactly on the smallest normal.
            return Self((sign | rounded) as u16);
        }
        if exp >= 31 {
            return Self((sign | 0x7C00) as u16);
        }

        let truncated = mantissa >> 13;
        let round_bit = (mantissa >> 12) & 1;
        let sticky = mantissa & 0xFFF;
        let rounded = if round_bit != 0 && (sticky != 0 || (truncated & 1) != 0) {
            truncated + 1
        } else {
            truncated
        };
        if rounded >= 0x400 {
            let exp = exp + 1;
            if exp >= 31 {
                return Self((sign | 0x7C00) as u16);
            }
            return Self((sign | ((exp as u32) << 10)) as u16);
        }
        Self((sign | ((exp as u32) << 10) | rounded) as u16)
    }

    pub fn to_f32(self) -> f32 {
        let h = self.0;
        let sign = ((h >> 15) & 1) as u32;
        let exp = ((h >> 10) & 0x1F) as u32;
        let mantissa = (h & 0x3FF) as u32;
        match exp {
            0 => {
                // Subnormal: mantissa * 2^-24.
                let magnitude = mantissa as f32 * f32::from_bits(0x3380_0000);
                if sign == 1 {
                    -magnitude
                } else {
                    magnitude
                }
            }
            31 => f32::from_bits((sign << 31) | 0x7F80_0000 | (mantissa << 13)),
            _ => f32::from_bits((sign << 31) | ((exp + 127 - 15) << 23) | (mantissa << 13)),
        }
    }
}

impl fmt::Debug for F16 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}f16", self.to_f32())
    }
}

impl fmt::Display for F16 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.to_f32(), f)
    }
}

/// Borrowed element data tagged with its type.
#[derive(Debug, Clone, Copy)]
pub enum TensorSlice<'a> {
    F32(&'a [f32]),
    F16(&'a [F16]),
    I32(&'a [i32]),
    U16(&'a [u16]),
}

impl<'a> TensorSlice<'a> {
    pub fn dtype(&self) -> DType {
        each_dtype!(self, TensorSlice, s => element_dtype(*s))
    }

    pub fn len(&self) -> usize {
        each_dtype!(self, TensorSlice, s => s.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lossy widening of every element to `f32`.
    pub fn to_f32_vec(&self) -> Vec<f32> {
        each_dtype!(self, TensorSlice, s => s.iter().map(|v| v.to_f32()).collect())
    }

    /// Copy into a freshly allocated array of the given shape.
    pub fn to_array(&self, shape: &[usize]) -> Result<TensorArray> {
        each_dtype!(self, TensorSlice, s => {
            let array = ArrayD::from_shape_vec(IxDyn(shape), s.to_vec())
                .map_err(|e| BridgeError::tensor(format!("Array shape error: {}", e)))?;
            Ok(Element::into_array(array))
        })
    }
}

/// Mutable element data tagged with its type.
#[derive(Debug)]
pub enum TensorSliceMut<'a> {
    F32(&'a mut [f32]),
    F16(&'a mut [F16]),
    I32(&'a mut [i32]),
    U16(&'a mut [u16]),
}

impl<'a> TensorSliceMut<'a> {
    pub fn dtype(&self) -> DType {
        each_dtype!(self, TensorSliceMut, s => element_dtype(&**s))
    }

    pub fn len(&self) -> usize {
        each_dtype!(self, TensorSliceMut, s => s.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reborrow as a shorter-lived mutable view.
    pub fn reborrow(&mut self) -> TensorSliceMut<'_> {
        each_dtype!(self, TensorSliceMut, s => Element::wrap_slice_mut(&mut **s))
    }

    /// Give up mutability, keeping the full lifetime.
    pub fn into_shared(self) -> TensorSlice<'a> {
        each_dtype!(self, TensorSliceMut, s => Element::wrap_slice(&*s))
    }

    /// Overwrite every element from `values`, converting to this dtype.
    pub fn fill_from_f32(&mut self, values: &[f32]) -> Result<()> {
        if values.len() != self.len() {
            return Err(BridgeError::tensor(format!(
                "cannot write {} values into a buffer of {}",
                values.len(),
                self.len()
            )));
        }
        each_dtype!(self, TensorSliceMut, s => {
            for (dst, src) in s.iter_mut().zip(values) {
                *dst = Element::from_f32(*src);
            }
        });
        Ok(())
    }
}

/// Owned, caller-safe array tagged with its type.
#[derive(Debug, Clone, PartialEq)]
pub enum TensorArray {
    F32(ArrayD<f32>),
    F16(ArrayD<F16>),
    I32(ArrayD<i32>),
    U16(ArrayD<u16>),
}

impl TensorArray {
    pub fn dtype(&self) -> DType {
        match self {
            Self::F32(_) => DType::F32,
            Self::F16(_) => DType::F16,
            Self::I32(_) => DType::I32,
            Self::U16(_) => DType::U16,
        }
    }

    pub fn shape(&self) -> &[usize] {
        each_dtype!(self, TensorArray, a => a.shape())
    }

    pub fn len(&self) -> usize {
        each_dtype!(self, TensorArray, a => a.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn element_dtype<T: Element>(_: &[T]) -> DType {
    T::DTYPE
}

mod sealed {
    pub trait Sealed {}
}

/// A scalar type that may be bound at the boundary.
///
/// Sealed; implemented for `f32`, [`F16`], `i32` and `u16`. The conversions
/// between typed data and the tagged variants live here so that type dispatch
/// happens once, on the tag.
pub trait Element:
    sealed::Sealed + Copy + Default + PartialEq + fmt::Debug + Send + Sync + 'static
{
    const DTYPE: DType;

    /// Lossy conversion from `f32` (saturating for integers).
    fn from_f32(value: f32) -> Self;

    /// Lossy conversion to `f32`.
    fn to_f32(self) -> f32;

    fn wrap_slice(slice: &[Self]) -> TensorSlice<'_>;

    fn wrap_slice_mut(slice: &mut [Self]) -> TensorSliceMut<'_>;

    fn unwrap_slice(slice: TensorSlice<'_>) -> Option<&[Self]>;

    fn into_array(array: ArrayD<Self>) -> TensorArray;

    fn array_view(array: &TensorArray) -> Option<ArrayViewD<'_, Self>>;

    fn into_buffer(buffer: ReleaseBuffer<Self>) -> TensorBuffer;

    fn buffer_ref(buffer: &TensorBuffer) -> Option<&ReleaseBuffer<Self>>;
}

macro_rules! impl_element {
    ($ty:ty, $variant:ident, $from:expr, $to:expr) => {
        impl sealed::Sealed for $ty {}

        impl Element for $ty {
            const DTYPE: DType = DType::$variant;

            fn from_f32(value: f32) -> Self {
                let convert: fn(f32) -> $ty = $from;
                convert(value)
            }

            fn to_f32(self) -> f32 {
                let convert: fn($ty) -> f32 = $to;
                convert(self)
            }

            fn wrap_slice(slice: &[Self]) -> TensorSlice<'_> {
                TensorSlice::$variant(slice)
            }

            fn wrap_slice_mut(slice: &mut [Self]) -> TensorSliceMut<'_> {
                TensorSliceMut::$variant(slice)
            }

            fn unwrap_slice(slice: TensorSlice<'_>) -> Option<&[Self]> {
                match slice {
                    TensorSlice::$variant(s) => Some(s),
                    _ => None,
                }
            }

            fn into_array(array: ArrayD<Self>) -> TensorArray {
                TensorArray::$variant(array)
            }

            fn array_view(array: &TensorArray) -> Option<ArrayViewD<'_, Self>> {
                match array {
                    TensorArray::$variant(a) => Some(a.view()),
                    _ => None,
                }
            }

            fn into_buffer(buffer: ReleaseBuffer<Self>) -> TensorBuffer {
                TensorBuffer::$variant(buffer)
            }

            fn buffer_ref(buffer: &TensorBuffer) -> Option<&ReleaseBuffer<Self>> {
                match buffer {
                    TensorBuffer::$variant(b) => Some(b),
                    _ => None,
                }
            }
        }
    };
}

impl_element!(f32, F32, |v| v, |v| v);
impl_element!(F16, F16, F16::from_f32, F16::to_f32);
impl_element!(i32, I32, |v| v as i32, |v| v as f32);
impl_element!(u16, U16, |v| v as u16, |v| v as f32);
