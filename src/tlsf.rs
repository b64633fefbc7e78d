//! The TLSF allocator core
use alloc::{boxed::Box, vec};
use core::{iter, mem, ops::Range, ptr::NonNull};

use crate::{
    allocator::Allocator,
    block::{Block, BlockArena, HeaderLayout},
    error::{AllocError, ConfigError, OomPolicy},
    int::{bits_from, lsb, BinInteger},
    region::Region,
};

mod map;

use self::map::MapParams;

#[doc = svgbobdoc::transform!(
/// The TLSF engine managing a single [`Region`].
///
/// # Data Structure Overview
///
/// <center>
/// ```svgbob
///   First level
///                                                                  FL_BITS = 3
///                               ,-----+-----+-----+-----+-----+-----+-----+-----,
///              fl_bitmap: u32 = |  0  |  0  |  0  |  1  |  0  |  0  |  0  |  0  |
///                               +-----+-----+-----+-----+-----+-----+-----+-----+
///                      min size | 2¹¹ | 2¹⁰ |  2⁹ |  2⁸ |  2⁷ |  2⁶ |  2⁵ |  0  |
///                               '-----+-----+-----+--+--+-----+-----+-----+-----'
///                                                    |
/// ╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶|╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶
///   Second Level                                     |
///                                                    v                     SL_BITS = 3
///                                  ,-----+-----+-----+-----+-----+-----+-----+-----,
///            "sl_bitmap[4]: u32" = |  0  |  0  |  1  |  0  |  0  |  0  |  0  |  0  |
///                                  +-----+-----+-----+-----+-----+-----+-----+-----+
///               min size 2⁸(1+n/8) |  7  |  6  |  5  |  4  |  3  |  2  |  1  |  0  |
///                                  +-----+-----+-----+-----+-----+-----+-----+-----+
///                       first_free |     |     |  O  |     |     |     |     |     |
///                                  '-----+-----+--|--+-----+-----+-----+-----+-----'
///                                                 |
///                                                 |  size = 416..448
///                                                 |
/// ╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶|╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶
///   Free blocks (offsets into the region)         |
///                                                 |
///             ,-----------------------------------'
///             | ,---+---+-------,    ,---+---+-------,    ,---+---+-------,
///             '-+>O | O-+-------+----+>O | O-+-------+----+>O |   |       |
///               +---+---'       |    +---+---'       |    +---+---'       |
///               |               |    |               |    |               |
///               |               |    |               |    |               |
///               '---------------'    '---------------'    '---------------'
///                   416 bytes            432 bytes            416 bytes
/// ```
/// </center>
///
/// # Properties
///
/// The region's first block is a used, zero-sized sentinel and its last byte
/// is an in-use marker. Every other byte belongs to exactly one block.
///
/// The first level list `0` covers payload sizes below
/// [`MIN_BUCKET_SPAN`](Self::MIN_BUCKET_SPAN) and the first level list `n`
/// (`n > 0`) covers `MIN_BUCKET_SPAN << (n - 1) .. MIN_BUCKET_SPAN << n`. Each
/// of them is divided linearly into `1 << SL_BITS` second level lists.
///
/// The smallest payload handed out is
/// [`MIN_BLOCK_SIZE`](Self::MIN_BLOCK_SIZE) bytes, and each block carries
/// [`OVERHEAD`](Self::OVERHEAD) bytes of header and footer.
///
/// # Parameters
///
///  - `MEM_BITS`: the address space of a region. A region must be shorter
///    than `1 << MEM_BITS` bytes.
///  - `FL_BITS`: `log2` of the number of first level lists (`1..=5`).
///  - `SL_BITS`: `log2` of the number of second level lists per first level
///    list (`0..=5`).
///
/// `MEM_BITS + 1 - (1 << FL_BITS) >= SL_BITS` must hold.
)]
#[derive(Debug)]
pub struct Tlsf<'pool, const MEM_BITS: u32, const FL_BITS: u32, const SL_BITS: u32> {
    blocks: BlockArena<'pool>,
    fl_bitmap: u32,
    /// `[u32; 1 << FL_BITS]`
    sl_bitmap: Box<[u32]>,
    /// `[Option<Block>; 1 << (FL_BITS + SL_BITS)]`
    first_free: Box<[Option<Block>]>,
    /// The sum of the payload sizes of all free blocks
    remaining: usize,
    oom_policy: OomPolicy,
}

/// A memory block allocated by [`Tlsf`], identified by the offset of its
/// payload in the region.
///
/// A `Segment` is only meaningful to the engine that produced it.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct Segment(usize);

impl Segment {
    /// The payload's offset from the start of the region.
    #[inline]
    pub fn offset(&self) -> usize {
        self.0
    }
}

const POISON_ACQUIRED: u8 = 0xac;
const POISON_RELEASED: u8 = 0xfc;
const POISON_GROWN: u8 = 0xca;

impl<'pool, const MEM_BITS: u32, const FL_BITS: u32, const SL_BITS: u32>
    Tlsf<'pool, MEM_BITS, FL_BITS, SL_BITS>
{
    const MAP: MapParams = MapParams::new(MEM_BITS, FL_BITS, SL_BITS);

    const LAYOUT: HeaderLayout = HeaderLayout::new(MEM_BITS, FL_BITS + SL_BITS);

    /// Evaluates successfully if the parameters are valid.
    const VALID: () = Self::MAP.validate();

    /// The payload size range covered by the first level list `0`.
    pub const MIN_BUCKET_SPAN: usize = {
        let () = Self::VALID;
        Self::MAP.min_bucket_span()
    };

    /// The minimum payload size of a block.
    pub const MIN_BLOCK_SIZE: usize = {
        let () = Self::VALID;
        Self::MAP.min_block_size()
    };

    /// The number of bytes a block occupies in addition to its payload.
    pub const OVERHEAD: usize = Self::LAYOUT.overhead();

    /// The number of bytes of a region not available to its first free
    /// block: the head sentinel and the tail marker.
    pub const PADDING_SIZE: usize = Self::OVERHEAD + 1;

    /// The smallest region that can hold one minimum-size block.
    pub const MIN_REGION_SIZE: usize = 2 * Self::OVERHEAD + 1 + Self::MIN_BLOCK_SIZE;

    /// The largest accepted region. Region sizes must be less than
    /// `1 << MEM_BITS`.
    pub const MAX_REGION_SIZE: usize = if MEM_BITS >= usize::BITS {
        usize::MAX
    } else {
        (1 << MEM_BITS) - 1
    };

    /// Construct an engine managing `region`.
    ///
    /// # Examples
    ///
    /// ```
    /// use tlsf_region::{OomPolicy, Region, Tlsf};
    /// let mut pool = vec![0u8; 4095];
    /// let tlsf: Tlsf<'_, 12, 3, 2> =
    ///     Tlsf::new(Region::from_slice(&mut pool), OomPolicy::ReturnError).unwrap();
    /// assert_eq!(tlsf.remaining(), tlsf.capacity());
    /// ```
    pub fn new(region: Region<'pool>, oom_policy: OomPolicy) -> Result<Self, ConfigError> {
        let () = Self::VALID;

        let len = region.len();
        if len < Self::MIN_REGION_SIZE {
            return Err(ConfigError::RegionTooSmall {
                len,
                min: Self::MIN_REGION_SIZE,
            });
        }
        if len > Self::MAX_REGION_SIZE {
            return Err(ConfigError::RegionTooLarge {
                len,
                max: Self::MAX_REGION_SIZE,
            });
        }

        let mut this = Self {
            blocks: BlockArena::new(region, Self::LAYOUT),
            fl_bitmap: 0,
            sl_bitmap: vec![0; Self::MAP.fl_count()].into_boxed_slice(),
            first_free: vec![None; Self::MAP.bucket_count()].into_boxed_slice(),
            remaining: 0,
            oom_policy,
        };

        this.blocks.init_sentinel(Block(0));
        this.blocks.region.write_u8(len - 1, 1);

        let first = Block(Self::OVERHEAD);
        this.blocks.init_free(first, len - Self::PADDING_SIZE, 0);
        this.push_free(first);

        Ok(this)
    }

    /// Construct an engine managing a caller-supplied buffer.
    #[inline]
    pub fn from_slice(buf: &'pool mut [u8], oom_policy: OomPolicy) -> Result<Self, ConfigError> {
        Self::new(Region::from_slice(buf), oom_policy)
    }

    #[inline]
    pub fn oom_policy(&self) -> OomPolicy {
        self.oom_policy
    }

    /// The sum of the payload sizes of all free blocks.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    /// The payload size of the single free block a fresh engine starts with.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.blocks.region.len() - Self::PADDING_SIZE - Self::OVERHEAD
    }

    /// The address range of the managed region.
    #[inline]
    pub fn address_range(&self) -> Range<usize> {
        self.blocks.region.address_range()
    }

    /// Get the region this engine manages.
    #[inline]
    pub fn region(&self) -> &Region<'pool> {
        &self.blocks.region
    }

    /// Insert a free block to the list matching its payload size.
    ///
    /// The block must have its in-use flag cleared and must not be linked to
    /// any list.
    fn push_free(&mut self, block: Block) {
        let size = self.blocks.payload_size(block);
        let bucket = Self::MAP.map_floor(size);
        self.blocks.set_bucket(block, bucket);
        self.blocks.set_free_prev(block, None);

        match self.first_free[bucket] {
            Some(head) => self.blocks.insert_before(block, head),
            None => {
                self.blocks.set_free_next(block, None);
                self.add_flag(bucket);
            }
        }
        self.first_free[bucket] = Some(block);

        self.remaining += size;
    }

    /// Remove a free block from its list. The block stays marked as free.
    fn unlink_free(&mut self, block: Block) {
        let bucket = self.blocks.bucket(block);
        debug_assert_eq!(
            bucket,
            Self::MAP.map_floor(self.blocks.payload_size(block)),
            "{:?} is in a wrong list",
            block
        );

        if self.first_free[bucket] == Some(block) {
            let next = self.blocks.free_next(block);
            self.first_free[bucket] = next;
            if next.is_none() {
                // The free list is now empty - update the bitmap
                self.drop_flag(bucket);
            }
        }
        self.blocks.detach(block);

        self.remaining -= self.blocks.payload_size(block);
    }

    #[inline]
    fn add_flag(&mut self, bucket: usize) {
        let fl = Self::MAP.first_level(bucket);
        self.sl_bitmap[fl as usize].set_bit(Self::MAP.second_level(bucket));
        self.fl_bitmap.set_bit(fl);
    }

    #[inline]
    fn drop_flag(&mut self, bucket: usize) {
        let fl = Self::MAP.first_level(bucket);
        let sl_bitmap = &mut self.sl_bitmap[fl as usize];
        sl_bitmap.clear_bit(Self::MAP.second_level(bucket));
        if *sl_bitmap == 0 {
            self.fl_bitmap.clear_bit(fl);
        }
    }

    /// Find a non-empty free list whose every item can hold `size` bytes.
    /// The returned flag indicates whether the list may hold blocks large
    /// enough to be worth splitting.
    fn search_suitable_free_list(&self, size: usize) -> Option<(usize, bool)> {
        // Every block in the next list is at least as large as `size`
        let bucket = Self::MAP.map_floor(size) + 1;
        if bucket >= Self::MAP.bucket_count() {
            return None;
        }
        if self.first_free[bucket].is_some() {
            return Some((bucket, false));
        }

        let fl = Self::MAP.first_level(bucket);
        let sl = Self::MAP.second_level(bucket);

        let sl_map = self.sl_bitmap[fl as usize] & bits_from(sl);
        if sl_map != 0 {
            return Some((Self::MAP.compose(fl, lsb(sl_map)), true));
        }

        // Any list at a higher first level will do
        let fl_map = self.fl_bitmap & bits_from(fl + 1);
        if fl_map != 0 {
            let fl = lsb(fl_map);
            let sl_map = self.sl_bitmap[fl as usize];
            debug_assert_ne!(sl_map, 0);
            return Some((Self::MAP.compose(fl, lsb(sl_map)), true));
        }

        None
    }

    /// Remove the first block of a non-empty list and mark it as used.
    fn take_first(&mut self, bucket: usize) -> Block {
        let block = match self.first_free[bucket] {
            Some(block) => block,
            None => unreachable!("free list {} is empty", bucket),
        };
        self.unlink_free(block);
        self.blocks.set_used(block, true);
        block
    }

    /// Shrink a used block to `size` bytes and return the excess to a free
    /// list, if the excess is large enough to form a block.
    fn split_off_excess(&mut self, block: Block, size: usize) {
        if let Some((rest, rest_size)) = self.blocks.split(block, size, Self::MIN_BLOCK_SIZE) {
            self.blocks.init_free(rest, rest_size, 0);
            self.push_free(rest);
        }
    }

    #[inline]
    fn poison(&mut self, offset: usize, len: usize, byte: u8) {
        if cfg!(any(debug_assertions, feature = "poison")) {
            self.blocks.region.fill(offset, len, byte);
        }
    }

    #[cold]
    fn out_of_memory(&self, requested: usize) -> AllocError {
        log::trace!(
            "out of memory: requested {} bytes, {} bytes free",
            requested,
            self.remaining
        );
        let error = AllocError { requested };
        if self.oom_policy == OomPolicy::Panic {
            panic!("{}", error);
        }
        error
    }

    /// Attempt to allocate a block with a payload of at least `size` bytes.
    ///
    /// The payload size is rounded up to [`MIN_BLOCK_SIZE`](Self::MIN_BLOCK_SIZE).
    ///
    /// # Panics
    ///
    /// Panics instead of returning `Err` if the engine was constructed with
    /// [`OomPolicy::Panic`].
    pub fn allocate(&mut self, size: usize) -> Result<Segment, AllocError> {
        let size = size.max(Self::MIN_BLOCK_SIZE);
        if size > self.remaining {
            return Err(self.out_of_memory(size));
        }

        let (bucket, split) = match self.search_suitable_free_list(size) {
            Some(x) => x,
            None => return Err(self.out_of_memory(size)),
        };

        let block = self.take_first(bucket);
        debug_assert!(self.blocks.payload_size(block) >= size);
        if split {
            self.split_off_excess(block, size);
        }

        let payload = self.blocks.payload(block);
        self.poison(payload, size, POISON_ACQUIRED);
        Ok(Segment(payload))
    }

    /// Deallocate a block, merging it with its free neighbors.
    pub fn deallocate(&mut self, segment: Segment) {
        let mut block = self.used_block(&segment);

        let size = self.blocks.payload_size(block);
        self.poison(segment.0, size, POISON_RELEASED);
        self.blocks.set_used(block, false);

        if self.blocks.can_combine_prev(block) {
            self.unlink_free(self.blocks.prev(block));
            block = self.blocks.combine_prev(block);
        }

        if self.blocks.can_combine_next(block) {
            self.unlink_free(self.blocks.next(block));
            self.blocks.combine_next(block);
        }

        self.push_free(block);
    }

    /// Change the payload size of a block.
    ///
    /// The block is shrunk or grown in place when possible. Otherwise, a new
    /// block is allocated, the payload is copied over, and `segment` is
    /// updated to point to the new block.
    ///
    /// On failure, the original block is left intact.
    ///
    /// # Panics
    ///
    /// Panics instead of returning `Err` if the engine was constructed with
    /// [`OomPolicy::Panic`].
    pub fn reallocate(&mut self, segment: &mut Segment, size: usize) -> Result<(), AllocError> {
        let size = size.max(Self::MIN_BLOCK_SIZE);
        let block = self.used_block(segment);
        let cur_size = self.blocks.payload_size(block);
        let next = self.blocks.next(block);

        if size <= cur_size {
            let excess = cur_size - size;
            if excess < Self::MIN_BLOCK_SIZE + Self::OVERHEAD {
                // Too small to form a block
                return Ok(());
            }

            if self.blocks.is_used(next) {
                self.split_off_excess(block, size);
            } else {
                // Give the excess to the next block
                self.unlink_free(next);
                self.blocks.adjust_payload_size(block, size);
                let next = self.blocks.append_prev_mem(next, excess);
                self.push_free(next);
            }
            return Ok(());
        }

        if !self.blocks.is_used(next) && cur_size + self.blocks.block_size(next) >= size {
            // Grow in place
            self.unlink_free(next);
            self.blocks.combine_next(block);
            self.split_off_excess(block, size);

            let new_size = self.blocks.payload_size(block);
            self.poison(segment.0 + cur_size, new_size - cur_size, POISON_GROWN);
            return Ok(());
        }

        let new_segment = self.allocate(size)?;
        self.blocks
            .region
            .copy_within(segment.0, new_segment.0, cur_size.min(size));
        let old_segment = mem::replace(segment, new_segment);
        self.deallocate(old_segment);
        Ok(())
    }

    /// Get the block owning a segment, checking that it is in use.
    #[inline]
    #[track_caller]
    fn used_block(&self, segment: &Segment) -> Block {
        let block = self.blocks.block_of_payload(segment.0);
        debug_assert!(
            self.blocks.is_used(block),
            "{:?} does not refer to an allocated block",
            segment
        );
        block
    }

    /// The payload size of an allocated block. This may be larger than the
    /// requested size.
    #[inline]
    pub fn segment_len(&self, segment: &Segment) -> usize {
        self.blocks.payload_size(self.used_block(segment))
    }

    #[inline]
    pub fn payload(&self, segment: &Segment) -> &[u8] {
        let len = self.segment_len(segment);
        self.blocks.region.slice(segment.0, len)
    }

    #[inline]
    pub fn payload_mut(&mut self, segment: &Segment) -> &mut [u8] {
        let len = self.segment_len(segment);
        self.blocks.region.slice_mut(segment.0, len)
    }

    /// Get a pointer to the payload of an allocated block.
    #[inline]
    pub fn segment_ptr(&self, segment: &Segment) -> NonNull<u8> {
        self.blocks.region.ptr(segment.0)
    }

    /// Convert a payload pointer back into a [`Segment`].
    ///
    /// Returns `None` if `ptr` does not point inside the region's usable
    /// area. The pointer is not checked to refer to an allocated block.
    #[inline]
    pub fn segment_of(&self, ptr: NonNull<u8>) -> Option<Segment> {
        let offset = self.blocks.region.offset_of(ptr)?;
        let first_payload = Self::OVERHEAD + Self::LAYOUT.header_len();
        if offset >= first_payload && offset < self.blocks.region.len() - 1 {
            Some(Segment(offset))
        } else {
            None
        }
    }

    /// Iterate over the blocks in a free list.
    fn free_list(&self, bucket: usize) -> impl Iterator<Item = Block> + '_ {
        iter::successors(self.first_free[bucket], move |&block| {
            self.blocks.free_next(block)
        })
    }

    /// Validate the engine's internal structure.
    ///
    /// This walks every block of the region, so it's only suitable for
    /// debugging and testing.
    ///
    /// # Panics
    ///
    /// Panics if an inconsistency is found.
    pub fn check(&self) {
        let blocks = &self.blocks;
        let end = Block(blocks.region.len() - 1);

        assert!(blocks.is_used(Block(0)), "the head sentinel is not in use");
        assert_eq!(blocks.payload_size(Block(0)), 0, "the head sentinel has a payload");
        assert_eq!(blocks.region.read_u8(end.0), 1, "the tail marker is clobbered");

        let mut block = Block(0);
        let mut prev_free = false;
        let mut free_count = 0;
        let mut free_bytes = 0;
        loop {
            let next = blocks.next(block);
            assert!(next <= end, "{:?} overruns the region", block);
            assert_eq!(blocks.prev(next), block, "{:?} has a broken footer", block);

            if blocks.is_used(block) {
                prev_free = false;
            } else {
                assert!(!prev_free, "{:?} follows another free block", block);
                prev_free = true;

                let size = blocks.payload_size(block);
                let bucket = blocks.bucket(block);
                assert_eq!(
                    bucket,
                    Self::MAP.map_floor(size),
                    "{:?} ({} bytes) has a wrong list index",
                    block,
                    size
                );
                assert!(
                    self.free_list(bucket).any(|b| b == block),
                    "{:?} is not reachable from its free list",
                    block
                );

                free_count += 1;
                free_bytes += size;
            }

            if next == end {
                break;
            }
            block = next;
        }

        assert_eq!(free_bytes, self.remaining, "the free byte count is out of sync");

        let mut listed = 0;
        for (bucket, first_free) in self.first_free.iter().enumerate() {
            let fl = Self::MAP.first_level(bucket);
            let sl = Self::MAP.second_level(bucket);
            assert_eq!(
                self.sl_bitmap[fl as usize].get_bit(sl),
                first_free.is_some(),
                "the bitmap disagrees with free list {}",
                bucket
            );

            let mut prev = None;
            for block in self.free_list(bucket) {
                assert!(!blocks.is_used(block), "{:?} is used but listed", block);
                assert_eq!(blocks.bucket(block), bucket);
                assert_eq!(blocks.free_prev(block), prev, "{:?} has a broken link", block);
                prev = Some(block);
                listed += 1;
                assert!(listed <= free_count, "free list {} is corrupted", bucket);
            }
        }
        assert_eq!(listed, free_count, "some free blocks are not listed");

        for (fl, &sl_bitmap) in self.sl_bitmap.iter().enumerate() {
            assert_eq!(self.fl_bitmap.get_bit(fl as u32), sl_bitmap != 0);
        }
        assert_eq!(self.fl_bitmap & bits_from(Self::MAP.fl_count() as u32), 0);
    }
}

impl<const MEM_BITS: u32, const FL_BITS: u32, const SL_BITS: u32> Allocator
    for Tlsf<'_, MEM_BITS, FL_BITS, SL_BITS>
{
    fn acquire(&mut self, size: usize) -> Result<NonNull<u8>, AllocError> {
        let segment = self.allocate(size)?;
        Ok(self.segment_ptr(&segment))
    }

    unsafe fn resize(&mut self, ptr: NonNull<u8>, new_size: usize) -> Result<NonNull<u8>, AllocError> {
        let mut segment = self.foreign_checked(ptr);
        self.reallocate(&mut segment, new_size)?;
        Ok(self.segment_ptr(&segment))
    }

    unsafe fn release(&mut self, ptr: NonNull<u8>) {
        let segment = self.foreign_checked(ptr);
        self.deallocate(segment);
    }

    fn remaining_capacity(&self) -> usize {
        self.remaining
    }

    unsafe fn segment_size(&self, ptr: NonNull<u8>) -> usize {
        self.segment_len(&self.foreign_checked(ptr))
    }

    fn min_bucket_span(&self) -> usize {
        Self::MIN_BUCKET_SPAN
    }

    fn min_block_size(&self) -> usize {
        Self::MIN_BLOCK_SIZE
    }
}

impl<const MEM_BITS: u32, const FL_BITS: u32, const SL_BITS: u32>
    Tlsf<'_, MEM_BITS, FL_BITS, SL_BITS>
{
    #[inline]
    #[track_caller]
    fn foreign_checked(&self, ptr: NonNull<u8>) -> Segment {
        match self.segment_of(ptr) {
            Some(segment) => segment,
            None => panic!("{:p} does not belong to this region", ptr),
        }
    }
}
