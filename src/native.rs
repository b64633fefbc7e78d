//! The platform's `malloc` behind the [`Allocator`] interface.
use core::ptr::NonNull;

use crate::{allocator::Allocator, error::AllocError};

/// Forwards every request to the C library's allocator.
///
/// This holds no state. Memory blocks are owned by the C library, so they
/// are not released when a `NativeAlloc` is dropped.
#[cfg_attr(feature = "doc_cfg", doc(cfg(unix)))]
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeAlloc;

impl NativeAlloc {
    #[cold]
    fn out_of_memory(requested: usize) -> AllocError {
        log::trace!("malloc failed to provide {} bytes", requested);
        AllocError { requested }
    }
}

impl Allocator for NativeAlloc {
    #[inline]
    fn acquire(&mut self, size: usize) -> Result<NonNull<u8>, AllocError> {
        // Safety: `malloc` is safe to call with any size
        let ptr = unsafe { libc::malloc(size.max(1)) };
        NonNull::new(ptr.cast()).ok_or_else(|| Self::out_of_memory(size))
    }

    #[inline]
    unsafe fn resize(
        &mut self,
        ptr: NonNull<u8>,
        new_size: usize,
    ) -> Result<NonNull<u8>, AllocError> {
        // Safety: `ptr` came from `malloc` or `realloc` (upheld by the caller).
        //         `realloc` leaves the original block intact on failure.
        let new_ptr = libc::realloc(ptr.as_ptr().cast(), new_size.max(1));
        NonNull::new(new_ptr.cast()).ok_or_else(|| Self::out_of_memory(new_size))
    }

    #[inline]
    unsafe fn release(&mut self, ptr: NonNull<u8>) {
        libc::free(ptr.as_ptr().cast());
    }

    #[inline]
    fn remaining_capacity(&self) -> usize {
        usize::MAX
    }

    #[inline]
    unsafe fn segment_size(&self, ptr: NonNull<u8>) -> usize {
        usable_size(ptr)
    }

    #[inline]
    fn min_bucket_span(&self) -> usize {
        0
    }

    #[inline]
    fn min_block_size(&self) -> usize {
        0
    }
}

cfg_if::cfg_if! {
    if #[cfg(all(target_os = "linux", target_env = "gnu"))] {
        #[inline]
        unsafe fn usable_size(ptr: NonNull<u8>) -> usize {
            libc::malloc_usable_size(ptr.as_ptr().cast())
        }
    } else if #[cfg(any(target_os = "macos", target_os = "ios"))] {
        #[inline]
        unsafe fn usable_size(ptr: NonNull<u8>) -> usize {
            libc::malloc_size(ptr.as_ptr() as *const _)
        }
    } else {
        /// The block size is unknown on this platform.
        #[inline]
        unsafe fn usable_size(_ptr: NonNull<u8>) -> usize {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_resize_release() {
        let mut alloc = NativeAlloc;
        assert_eq!(alloc.remaining_capacity(), usize::MAX);

        let ptr = alloc.acquire(16).unwrap();
        unsafe {
            ptr.as_ptr().write_bytes(0x77, 16);
            let ptr = alloc.resize(ptr, 4096).unwrap();
            assert_eq!(*ptr.as_ptr().add(15), 0x77);
            if cfg!(all(target_os = "linux", target_env = "gnu")) {
                assert!(alloc.segment_size(ptr) >= 4096);
            }
            alloc.release(ptr);
        }
    }

    #[test]
    fn zero_size() {
        let mut alloc = NativeAlloc;
        let ptr = alloc.acquire(0).unwrap();
        unsafe { alloc.release(ptr) };
    }
}
