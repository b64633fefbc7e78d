//! The interface shared by every engine.
use core::ptr::NonNull;

use crate::error::AllocError;

/// A pointer-based allocator.
///
/// This trait is object-safe, so engines can be swapped behind
/// `dyn Allocator`.
///
/// # Examples
///
/// ```
/// use tlsf_region::{Allocator, FixedTlsf, OomPolicy};
///
/// fn fill(alloc: &mut dyn Allocator) {
///     let ptr = alloc.acquire(64).unwrap();
///     unsafe {
///         ptr.as_ptr().write_bytes(0x42, 64);
///         assert!(alloc.segment_size(ptr) >= 64);
///         alloc.release(ptr);
///     }
/// }
///
/// fill(&mut FixedTlsf::<16, 3, 4>::new(4096, OomPolicy::ReturnError).unwrap());
/// ```
pub trait Allocator {
    /// Attempt to allocate a memory block with a payload of at least `size`
    /// bytes.
    fn acquire(&mut self, size: usize) -> Result<NonNull<u8>, AllocError>;

    /// Change the payload size of a memory block, moving it if necessary.
    ///
    /// On failure, the original memory block is left intact.
    ///
    /// # Safety
    ///
    /// `ptr` must denote a memory block previously allocated by `self` and
    /// not released yet. Pointers to the block are invalidated if the block
    /// is moved.
    unsafe fn resize(&mut self, ptr: NonNull<u8>, new_size: usize)
        -> Result<NonNull<u8>, AllocError>;

    /// Release a memory block.
    ///
    /// # Safety
    ///
    /// `ptr` must denote a memory block previously allocated by `self` and
    /// not released yet.
    unsafe fn release(&mut self, ptr: NonNull<u8>);

    /// The number of payload bytes that are free. Fragmentation may prevent
    /// a request of this size from succeeding.
    fn remaining_capacity(&self) -> usize;

    /// Get the payload size of an allocated memory block.
    ///
    /// # Safety
    ///
    /// `ptr` must denote a memory block previously allocated by `self` and
    /// not released yet.
    unsafe fn segment_size(&self, ptr: NonNull<u8>) -> usize;

    /// The payload size range covered by the smallest first level list.
    fn min_bucket_span(&self) -> usize;

    /// The minimum payload size of a memory block.
    fn min_block_size(&self) -> usize;
}

impl<T: Allocator + ?Sized> Allocator for &mut T {
    #[inline]
    fn acquire(&mut self, size: usize) -> Result<NonNull<u8>, AllocError> {
        (**self).acquire(size)
    }

    #[inline]
    unsafe fn resize(
        &mut self,
        ptr: NonNull<u8>,
        new_size: usize,
    ) -> Result<NonNull<u8>, AllocError> {
        (**self).resize(ptr, new_size)
    }

    #[inline]
    unsafe fn release(&mut self, ptr: NonNull<u8>) {
        (**self).release(ptr)
    }

    #[inline]
    fn remaining_capacity(&self) -> usize {
        (**self).remaining_capacity()
    }

    #[inline]
    unsafe fn segment_size(&self, ptr: NonNull<u8>) -> usize {
        (**self).segment_size(ptr)
    }

    #[inline]
    fn min_bucket_span(&self) -> usize {
        (**self).min_bucket_span()
    }

    #[inline]
    fn min_block_size(&self) -> usize {
        (**self).min_block_size()
    }
}
