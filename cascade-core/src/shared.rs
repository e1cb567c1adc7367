//! Shared ownership for large detector buffers.
//!
//! Derived graphs and images are value types that get returned and copied
//! freely; their payloads can be a full detector frame. `SharedBuffer`
//! gives them reference-counted, immutable-after-construction storage:
//! cloning acquires another handle on the same allocation, dropping the
//! last handle frees it.

use crate::{Error, Result};
use std::sync::Arc;

/// A reference-counted flat buffer.
///
/// The contents are frozen at construction. All clones observe the same
/// storage; the allocation is released when the last clone is dropped.
#[derive(Debug)]
pub struct SharedBuffer<T> {
    data: Arc<[T]>,
}

impl<T> Clone for SharedBuffer<T> {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
        }
    }
}

impl<T: Default + Clone> SharedBuffer<T> {
    /// Allocates a zero-filled buffer of `len` elements.
    ///
    /// # Errors
    /// Returns [`Error::AllocationFailure`] (and logs it) if the
    /// reservation fails; the caller receives no buffer and must treat
    /// the result as empty.
    pub fn alloc_zeroed(len: usize) -> Result<Self> {
        let mut vec = Vec::new();
        if vec.try_reserve_exact(len).is_err() {
            log::error!("could not allocate shared buffer of {len} elements");
            return Err(Error::AllocationFailure { len });
        }
        vec.resize(len, T::default());
        Ok(Self::from_vec(vec))
    }
}

impl<T> SharedBuffer<T> {
    /// Freezes an already-filled vector into a shared buffer.
    pub fn from_vec(vec: Vec<T>) -> Self {
        Self {
            data: Arc::from(vec),
        }
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True if the buffer holds no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Read access to the elements.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Number of live handles on this allocation.
    #[must_use]
    pub fn handles(&self) -> usize {
        Arc::strong_count(&self.data)
    }

    /// True if both handles point at the same allocation.
    #[must_use]
    pub fn same_storage(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

impl<T> std::ops::Deref for SharedBuffer<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clone_shares_storage() {
        let buf = SharedBuffer::from_vec(vec![1u32, 2, 3]);
        let alias = buf.clone();
        assert!(buf.same_storage(&alias));
        assert_eq!(buf.handles(), 2);
        assert_eq!(alias.as_slice(), &[1, 2, 3]);
    }

    #[test]
    fn test_drop_releases_handle() {
        let buf = SharedBuffer::from_vec(vec![0u32; 16]);
        {
            let _alias = buf.clone();
            assert_eq!(buf.handles(), 2);
        }
        assert_eq!(buf.handles(), 1);
    }

    #[test]
    fn test_alloc_zeroed() {
        let buf = SharedBuffer::<u32>::alloc_zeroed(8).unwrap();
        assert_eq!(buf.len(), 8);
        assert!(buf.iter().all(|&v| v == 0));
    }

    #[test]
    fn test_empty_buffer() {
        let buf = SharedBuffer::<f64>::alloc_zeroed(0).unwrap();
        assert!(buf.is_empty());
    }
}
