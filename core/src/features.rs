//! Named features handed to the engine.

use std::collections::btree_map::{self, BTreeMap};

use crate::error::BridgeError;
use crate::tensor::{BackingTensor, BindFailure, DType, ReleaseBuffer, StridedTensor};

/// Packed 32-bit BGRA image owned through a release token.
#[derive(Debug)]
pub struct PixelBuffer {
    width: usize,
    height: usize,
    data: ReleaseBuffer<u8>,
}

impl PixelBuffer {
    /// Bytes per pixel of the BGRA layout.
    pub const CHANNELS: usize = 4;

    /// Wrap `width * height * 4` bytes of BGRA data.
    ///
    /// On failure the buffer is handed back unreleased.
    pub fn bgra(
        width: usize,
        height: usize,
        data: ReleaseBuffer<u8>,
    ) -> std::result::Result<Self, BindFailure<u8>> {
        let expected = width
            .checked_mul(height)
            .and_then(|n| n.checked_mul(Self::CHANNELS));
        match expected {
            Some(n) if n > 0 && n == data.len() => Ok(Self {
                width,
                height,
                data,
            }),
            _ => {
                let error = BridgeError::bind(format!(
                    "{}x{} BGRA image needs {} bytes, buffer holds {}",
                    width,
                    height,
                    width.saturating_mul(height).saturating_mul(Self::CHANNELS),
                    data.len()
                ));
                Err(BindFailure::new(error, data))
            }
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Row pitch in bytes.
    pub fn bytes_per_row(&self) -> usize {
        self.width * Self::CHANNELS
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.data.as_slice()
    }
}

/// A named value consumed by the engine.
#[derive(Debug)]
pub enum FeatureValue {
    Tensor(StridedTensor),
    PixelBuffer(PixelBuffer),
}

impl FeatureValue {
    pub fn as_tensor(&self) -> Option<&StridedTensor> {
        match self {
            Self::Tensor(t) => Some(t),
            Self::PixelBuffer(_) => None,
        }
    }

    pub fn dtype(&self) -> Option<DType> {
        self.as_tensor().map(StridedTensor::dtype)
    }
}

impl From<StridedTensor> for FeatureValue {
    fn from(tensor: StridedTensor) -> Self {
        Self::Tensor(tensor)
    }
}

impl From<PixelBuffer> for FeatureValue {
    fn from(image: PixelBuffer) -> Self {
        Self::PixelBuffer(image)
    }
}

/// Input features for one prediction, keyed by unique name.
///
/// Dropping the dictionary (or overwriting an entry) releases the buffers it
/// owns.
#[derive(Debug, Default)]
pub struct FeatureDictionary {
    features: BTreeMap<String, FeatureValue>,
}

impl FeatureDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a feature, returning any value previously bound to `name`.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        value: impl Into<FeatureValue>,
    ) -> Option<FeatureValue> {
        self.features.insert(name.into(), value.into())
    }

    pub fn get(&self, name: &str) -> Option<&FeatureValue> {
        self.features.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<FeatureValue> {
        self.features.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.features.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.features.keys().map(String::as_str)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, FeatureValue> {
        self.features.iter()
    }
}

impl IntoIterator for FeatureDictionary {
    type Item = (String, FeatureValue);
    type IntoIter = btree_map::IntoIter<String, FeatureValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.features.into_iter()
    }
}

/// Caller-owned write-through targets for one prediction, keyed by output name.
#[derive(Debug, Default)]
pub struct OutputBackings<'b> {
    backings: BTreeMap<String, BackingTensor<'b>>,
}

impl<'b> OutputBackings<'b> {
    pub fn new() -> Self {
        Self {
            backings: BTreeMap::new(),
        }
    }

    pub fn insert(
        &mut self,
        name: impl Into<String>,
        backing: BackingTensor<'b>,
    ) -> Option<BackingTensor<'b>> {
        self.backings.insert(name.into(), backing)
    }

    pub fn get(&self, name: &str) -> Option<&BackingTensor<'b>> {
        self.backings.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut BackingTensor<'b>> {
        self.backings.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.backings.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.backings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backings.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.backings.keys().map(String::as_str)
    }
}

impl<'b> IntoIterator for OutputBackings<'b> {
    type Item = (String, BackingTensor<'b>);
    type IntoIter = btree_map::IntoIter<String, BackingTensor<'b>>;

    fn into_iter(self) -> Self::IntoIter {
        self.backings.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ptr::NonNull;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counted_tensor(count: Arc<AtomicUsize>) -> StridedTensor {
        let mut data = std::mem::ManuallyDrop::new(vec![1.0f32, 2.0].into_boxed_slice());
        let ptr = NonNull::new(data.as_mut_ptr()).unwrap();
        let buffer = unsafe {
            ReleaseBuffer::from_parts(ptr, 2, move |ptr, len| {
                count.fetch_add(1, Ordering::SeqCst);
                drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(
                    ptr.as_ptr(),
                    len,
                )));
            })
        };
        StridedTensor::bridge(&[2], buffer).unwrap()
    }

    #[test]
    fn test_overwrite_releases_previous_binding() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut dict = FeatureDictionary::new();
        assert!(dict.insert("x", counted_tensor(count.clone())).is_none());
        let previous = dict.insert("x", counted_tensor(count.clone()));
        assert_eq!(dict.len(), 1);
        drop(previous);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        drop(dict);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_pixel_buffer_validates_length() {
        let image = PixelBuffer::bgra(2, 3, ReleaseBuffer::from_vec(vec![0u8; 24])).unwrap();
        assert_eq!(image.bytes_per_row(), 8);
        assert_eq!(image.as_bytes().len(), 24);

        let failure = PixelBuffer::bgra(2, 3, ReleaseBuffer::from_vec(vec![0u8; 23])).unwrap_err();
        assert_eq!(failure.buffer.len(), 23);
        assert!(PixelBuffer::bgra(0, 3, ReleaseBuffer::from_vec(vec![0u8; 4])).is_err());
    }

    #[test]
    fn test_dictionary_names_are_sorted() {
        let mut dict = FeatureDictionary::new();
        dict.insert("b", StridedTensor::bridge(&[1], ReleaseBuffer::from_vec(vec![1i32])).unwrap());
        dict.insert("a", StridedTensor::bridge(&[1], ReleaseBuffer::from_vec(vec![2u16])).unwrap());
        assert_eq!(dict.names().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(dict.get("a").and_then(FeatureValue::dtype), Some(DType::U16));
    }
}
