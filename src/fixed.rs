//! An engine owning its region.
use core::ptr::NonNull;

use crate::{
    allocator::Allocator,
    error::{AllocError, ConfigError, OomPolicy},
    region::Region,
    tlsf::Tlsf,
};

/// [`Tlsf`] managing a region allocated from the global heap. The region is
/// released when this is dropped.
///
/// # Examples
///
/// ```
/// use tlsf_region::{FixedTlsf, OomPolicy};
///
/// let mut tlsf = FixedTlsf::<20, 4, 4>::new(1 << 16, OomPolicy::ReturnError).unwrap();
/// let mut segment = tlsf.tlsf_mut().allocate(100).unwrap();
/// tlsf.tlsf_mut().payload_mut(&segment)[..5].copy_from_slice(b"hello");
/// tlsf.tlsf_mut().reallocate(&mut segment, 1000).unwrap();
/// assert_eq!(&tlsf.tlsf().payload(&segment)[..5], b"hello");
/// ```
#[derive(Debug)]
pub struct FixedTlsf<const MEM_BITS: u32, const FL_BITS: u32, const SL_BITS: u32> {
    tlsf: Tlsf<'static, MEM_BITS, FL_BITS, SL_BITS>,
}

impl<const MEM_BITS: u32, const FL_BITS: u32, const SL_BITS: u32>
    FixedTlsf<MEM_BITS, FL_BITS, SL_BITS>
{
    /// The largest region size accepted by [`Self::new`]. Larger requests are
    /// clamped to this.
    pub const MAX_SIZE: usize = Tlsf::<'static, MEM_BITS, FL_BITS, SL_BITS>::MAX_REGION_SIZE;

    /// Allocate a region of `size` bytes (up to [`Self::MAX_SIZE`]) and
    /// construct an engine managing it.
    pub fn new(size: usize, oom_policy: OomPolicy) -> Result<Self, ConfigError> {
        let size = size.min(Self::MAX_SIZE);
        let min = Tlsf::<'static, MEM_BITS, FL_BITS, SL_BITS>::MIN_REGION_SIZE;
        if size < min {
            // Don't bother allocating
            return Err(ConfigError::RegionTooSmall { len: size, min });
        }
        Ok(Self {
            tlsf: Tlsf::new(Region::new_boxed(size), oom_policy)?,
        })
    }

    #[inline]
    pub fn tlsf(&self) -> &Tlsf<'static, MEM_BITS, FL_BITS, SL_BITS> {
        &self.tlsf
    }

    #[inline]
    pub fn tlsf_mut(&mut self) -> &mut Tlsf<'static, MEM_BITS, FL_BITS, SL_BITS> {
        &mut self.tlsf
    }
}

impl<const MEM_BITS: u32, const FL_BITS: u32, const SL_BITS: u32> Allocator
    for FixedTlsf<MEM_BITS, FL_BITS, SL_BITS>
{
    #[inline]
    fn acquire(&mut self, size: usize) -> Result<NonNull<u8>, AllocError> {
        self.tlsf.acquire(size)
    }

    #[inline]
    unsafe fn resize(
        &mut self,
        ptr: NonNull<u8>,
        new_size: usize,
    ) -> Result<NonNull<u8>, AllocError> {
        self.tlsf.resize(ptr, new_size)
    }

    #[inline]
    unsafe fn release(&mut self, ptr: NonNull<u8>) {
        self.tlsf.release(ptr)
    }

    #[inline]
    fn remaining_capacity(&self) -> usize {
        self.tlsf.remaining_capacity()
    }

    #[inline]
    unsafe fn segment_size(&self, ptr: NonNull<u8>) -> usize {
        self.tlsf.segment_size(ptr)
    }

    #[inline]
    fn min_bucket_span(&self) -> usize {
        self.tlsf.min_bucket_span()
    }

    #[inline]
    fn min_block_size(&self) -> usize {
        self.tlsf.min_block_size()
    }
}
