//! Move-only ownership token for buffers that cross the boundary.
//!
//! A [`ReleaseBuffer`] pairs a pointer and length with the one function that
//! may free them. Whoever holds the token owns the memory; dropping the token
//! runs the release exactly once. Handing the token to the engine is the
//! ownership transfer.

use std::fmt;
use std::ptr::NonNull;

/// Release callback supplied by a foreign allocator.
///
/// Called with the original pointer and element count.
pub type ReleaseFn<T> = unsafe extern "C" fn(ptr: *mut T, len: usize);

type Release<T> = Box<dyn FnOnce(NonNull<T>, usize) + Send>;

/// Owned view over `len` contiguous elements, freed by its release on drop.
pub struct ReleaseBuffer<T> {
    ptr: NonNull<T>,
    len: usize,
    release: Option<Release<T>>,
}

// SAFETY: the token has unique ownership of the elements, and the release
// closure is `Send`. Shared access only ever reads the elements.
unsafe impl<T: Send> Send for ReleaseBuffer<T> {}
unsafe impl<T: Sync> Sync for ReleaseBuffer<T> {}

impl<T: Send + 'static> ReleaseBuffer<T> {
    /// Take ownership of a Rust allocation.
    pub fn from_vec(data: Vec<T>) -> Self {
        let boxed = data.into_boxed_slice();
        let len = boxed.len();
        let raw = Box::into_raw(boxed) as *mut T;
        // SAFETY: `Box::into_raw` never returns null.
        let ptr = unsafe { NonNull::new_unchecked(raw) };
        let release: Release<T> = Box::new(|ptr: NonNull<T>, len| {
            // SAFETY: reconstructs exactly the boxed slice leaked above.
            drop(unsafe { Box::from_raw(std::ptr::slice_from_raw_parts_mut(ptr.as_ptr(), len)) });
        });
        Self {
            ptr,
            len,
            release: Some(release),
        }
    }

    /// Take ownership of a foreign buffer freed by `release`.
    ///
    /// Returns `None` for a null pointer, in which case nothing is released.
    ///
    /// # Safety
    ///
    /// `ptr` must point to `len` initialized elements that stay valid and
    /// unaliased until `release` is called, and `release` must accept exactly
    /// this pointer and length.
    pub unsafe fn from_raw(ptr: *mut T, len: usize, release: ReleaseFn<T>) -> Option<Self> {
        let ptr = NonNull::new(ptr)?;
        Some(Self::from_parts(ptr, len, move |ptr: NonNull<T>, len| {
            release(ptr.as_ptr(), len)
        }))
    }

    /// Take ownership of a buffer freed by an arbitrary closure.
    ///
    /// # Safety
    ///
    /// Same contract as [`ReleaseBuffer::from_raw`].
    pub unsafe fn from_parts<F>(ptr: NonNull<T>, len: usize, release: F) -> Self
    where
        F: FnOnce(NonNull<T>, usize) + Send + 'static,
    {
        Self {
            ptr,
            len,
            release: Some(Box::new(release)),
        }
    }
}

impl<T> ReleaseBuffer<T> {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_ptr(&self) -> *const T {
        self.ptr.as_ptr()
    }

    pub fn as_slice(&self) -> &[T] {
        // SAFETY: the constructor contract guarantees `len` valid elements
        // for as long as the token is alive.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// Give ownership back without running the release.
    ///
    /// The caller becomes responsible for freeing the returned buffer.
    pub fn into_raw(mut self) -> (*mut T, usize) {
        self.release = None;
        (self.ptr.as_ptr(), self.len)
    }
}

impl<T> Drop for ReleaseBuffer<T> {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release(self.ptr, self.len);
        }
    }
}

impl<T> fmt::Debug for ReleaseBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReleaseBuffer")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .field("armed", &self.release.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counted(data: Vec<f32>, count: Arc<AtomicUsize>) -> ReleaseBuffer<f32> {
        let mut data = std::mem::ManuallyDrop::new(data.into_boxed_slice());
        let ptr = NonNull::new(data.as_mut_ptr()).unwrap();
        let len = data.len();
        unsafe {
            ReleaseBuffer::from_parts(ptr, len, move |ptr, len| {
                count.fetch_add(1, Ordering::SeqCst);
                drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(
                    ptr.as_ptr(),
                    len,
                )));
            })
        }
    }

    #[test]
    fn test_release_runs_once_on_drop() {
        let count = Arc::new(AtomicUsize::new(0));
        let buffer = counted(vec![1.0, 2.0, 3.0], count.clone());
        assert_eq!(buffer.as_slice(), &[1.0, 2.0, 3.0]);
        let moved = buffer;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        drop(moved);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_into_raw_disarms_release() {
        let count = Arc::new(AtomicUsize::new(0));
        let buffer = counted(vec![4.0, 5.0], count.clone());
        let (ptr, len) = buffer.into_raw();
        assert_eq!(count.load(Ordering::SeqCst), 0);
        // Ownership came back; free it ourselves.
        drop(unsafe { Box::from_raw(std::ptr::slice_from_raw_parts_mut(ptr, len)) });
    }

    #[test]
    fn test_from_raw_rejects_null() {
        unsafe extern "C" fn never(_: *mut i32, _: usize) {
            panic!("release must not run for a null buffer");
        }
        let buffer = unsafe { ReleaseBuffer::from_raw(std::ptr::null_mut(), 4, never) };
        assert!(buffer.is_none());
    }

    #[test]
    fn test_from_vec_round_trip() {
        let buffer = ReleaseBuffer::from_vec(vec![7u16, 8, 9]);
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.as_slice(), &[7, 8, 9]);
        assert!(format!("{:?}", buffer).contains("armed: true"));
    }
}
