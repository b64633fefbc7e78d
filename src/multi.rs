//! A growable allocator built on top of [`FixedTlsf`].
use alloc::vec::Vec;
use core::ptr::{self, NonNull};

use crate::{
    allocator::Allocator,
    error::{AllocError, ConfigError, OomPolicy},
    fixed::FixedTlsf,
};

#[cfg(test)]
mod tests;

/// Manages a list of equally-sized [`FixedTlsf`] regions, adding a new region
/// whenever the existing ones can't satisfy a request.
///
/// Regions are never released before the `MultiTlsf` is dropped, even if
/// they become empty. A region added for a request it can't serve either is
/// discarded right away.
///
/// # Examples
///
/// ```
/// use tlsf_region::{Allocator, MultiTlsf, OomPolicy};
///
/// let mut multi = MultiTlsf::<16, 3, 4>::new(4096, OomPolicy::ReturnError).unwrap();
/// let ptrs: Vec<_> = (0..4).map(|_| multi.acquire(2000).unwrap()).collect();
/// assert!(multi.region_count() > 1);
/// for ptr in ptrs {
///     unsafe { multi.release(ptr) };
/// }
/// ```
#[derive(Debug)]
pub struct MultiTlsf<const MEM_BITS: u32, const FL_BITS: u32, const SL_BITS: u32> {
    region_size: usize,
    regions: Vec<FixedTlsf<MEM_BITS, FL_BITS, SL_BITS>>,
    oom_policy: OomPolicy,
}

impl<const MEM_BITS: u32, const FL_BITS: u32, const SL_BITS: u32>
    MultiTlsf<MEM_BITS, FL_BITS, SL_BITS>
{
    /// Construct a `MultiTlsf` with one region of `region_size` bytes.
    ///
    /// `oom_policy` applies to requests no single region can satisfy.
    pub fn new(region_size: usize, oom_policy: OomPolicy) -> Result<Self, ConfigError> {
        let region_size = region_size.min(FixedTlsf::<MEM_BITS, FL_BITS, SL_BITS>::MAX_SIZE);
        let mut this = Self {
            region_size,
            regions: Vec::new(),
            oom_policy,
        };
        this.add_region()?;
        Ok(this)
    }

    /// The size of each region.
    #[inline]
    pub fn region_size(&self) -> usize {
        self.region_size
    }

    #[inline]
    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    #[inline]
    pub fn regions(&self) -> &[FixedTlsf<MEM_BITS, FL_BITS, SL_BITS>] {
        &self.regions
    }

    /// Find the region containing `ptr`.
    pub fn locate(&self, ptr: NonNull<u8>) -> Option<usize> {
        let addr = ptr.as_ptr() as usize;
        self.regions
            .iter()
            .position(|region| region.tlsf().address_range().contains(&addr))
    }

    /// Validate every region's internal structure.
    ///
    /// # Panics
    ///
    /// Panics if an inconsistency is found.
    pub fn check(&self) {
        for region in &self.regions {
            region.tlsf().check();
        }
    }

    fn add_region(&mut self) -> Result<usize, ConfigError> {
        log::debug!(
            "adding region #{} of {} bytes",
            self.regions.len(),
            self.region_size
        );
        let region = FixedTlsf::new(self.region_size, OomPolicy::ReturnError)?;
        self.regions.push(region);
        Ok(self.regions.len() - 1)
    }

    #[inline]
    #[track_caller]
    fn locate_or_panic(&self, ptr: NonNull<u8>) -> usize {
        match self.locate(ptr) {
            Some(i) => i,
            None => panic!("{:p} does not belong to any region", ptr),
        }
    }

    #[cold]
    fn out_of_memory(&self, requested: usize) -> AllocError {
        log::trace!(
            "no region can hold {} bytes (region size = {})",
            requested,
            self.region_size
        );
        let error = AllocError { requested };
        if self.oom_policy == OomPolicy::Panic {
            panic!("{}", error);
        }
        error
    }
}

impl<const MEM_BITS: u32, const FL_BITS: u32, const SL_BITS: u32> Allocator
    for MultiTlsf<MEM_BITS, FL_BITS, SL_BITS>
{
    fn acquire(&mut self, size: usize) -> Result<NonNull<u8>, AllocError> {
        for region in self.regions.iter_mut() {
            if let Ok(ptr) = region.acquire(size) {
                return Ok(ptr);
            }
        }

        // A fresh region is the last resort. Don't create one that is too
        // small to begin with.
        if size > self.regions[0].tlsf().capacity() {
            return Err(self.out_of_memory(size));
        }
        let i = self
            .add_region()
            .map_err(|_| self.out_of_memory(size))?;
        match self.regions[i].acquire(size) {
            Ok(ptr) => Ok(ptr),
            Err(_) => {
                // The request maps past the only free block of an empty
                // region
                log::trace!("dropping the unused region #{}", i);
                self.regions.pop();
                Err(self.out_of_memory(size))
            }
        }
    }

    unsafe fn resize(
        &mut self,
        ptr: NonNull<u8>,
        new_size: usize,
    ) -> Result<NonNull<u8>, AllocError> {
        let i = self.locate_or_panic(ptr);
        if let Ok(new_ptr) = self.regions[i].resize(ptr, new_size) {
            return Ok(new_ptr);
        }

        log::trace!(
            "region #{} can't resize {:p} to {} bytes, moving it elsewhere",
            i,
            ptr,
            new_size
        );
        let old_size = self.regions[i].segment_size(ptr);
        let new_ptr = self.acquire(new_size)?;
        // Safety: `new_ptr` is a fresh allocation of at least `new_size`
        //         bytes, so it can't overlap with `ptr`
        ptr::copy_nonoverlapping(ptr.as_ptr(), new_ptr.as_ptr(), old_size.min(new_size));
        self.regions[i].release(ptr);
        Ok(new_ptr)
    }

    unsafe fn release(&mut self, ptr: NonNull<u8>) {
        let i = self.locate_or_panic(ptr);
        self.regions[i].release(ptr);
    }

    fn remaining_capacity(&self) -> usize {
        self.regions
            .iter()
            .map(|region| region.remaining_capacity())
            .sum()
    }

    unsafe fn segment_size(&self, ptr: NonNull<u8>) -> usize {
        let i = self.locate_or_panic(ptr);
        self.regions[i].segment_size(ptr)
    }

    fn min_bucket_span(&self) -> usize {
        self.regions[0].min_bucket_span()
    }

    fn min_block_size(&self) -> usize {
        self.regions[0].min_block_size()
    }
}
