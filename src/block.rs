//! Boundary-tagged memory blocks.
//!
//! A block is identified by the offset of its header in the region. Header
//! fields are serialized at fixed offsets:
//!
//! ```text
//!  +0            in-use flag (1 byte)
//!  +1            bucket index       ┐
//!  +1+I          previous free      │ free-list head, only meaningful
//!  +1+I+W        next free          ┘ while the block is free
//!  +1+I+2W       payload size
//!  +HEADER_LEN   payload ...
//!  +HEADER_LEN+payload_size
//!                footer: the total block size (W bytes)
//! ```
//!
//! `W` is the width of the smallest unsigned integer holding `MEM_BITS` bits
//! and `I` is the width of the bucket index. Free-list links are header
//! offsets, with `0` (the head sentinel, which is never free) meaning "none".
use crate::{int::uint_width_for_bits, region::Region};

/// The offset of a block header in a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct Block(pub usize);

/// Field widths of a block header.
#[derive(Debug, Clone, Copy)]
pub(crate) struct HeaderLayout {
    /// The width of sizes, offsets, and links
    size_width: usize,
    /// The width of the bucket index
    index_width: usize,
}

impl HeaderLayout {
    pub const fn new(mem_bits: u32, index_bits: u32) -> Self {
        Self {
            size_width: uint_width_for_bits(mem_bits),
            index_width: uint_width_for_bits(index_bits),
        }
    }

    #[inline]
    pub const fn size_width(&self) -> usize {
        self.size_width
    }

    #[inline]
    pub const fn index_width(&self) -> usize {
        self.index_width
    }

    #[inline]
    pub const fn index_offset(&self) -> usize {
        1
    }

    #[inline]
    pub const fn prev_offset(&self) -> usize {
        self.index_offset() + self.index_width
    }

    #[inline]
    pub const fn next_offset(&self) -> usize {
        self.prev_offset() + self.size_width
    }

    #[inline]
    const fn size_offset(&self) -> usize {
        self.next_offset() + self.size_width
    }

    /// The number of bytes preceding the payload.
    #[inline]
    pub const fn header_len(&self) -> usize {
        self.size_offset() + self.size_width
    }

    /// The number of bytes a block occupies besides its payload.
    #[inline]
    pub const fn overhead(&self) -> usize {
        self.header_len() + self.size_width
    }
}

/// A region viewed as a sequence of blocks.
#[derive(Debug)]
pub(crate) struct BlockArena<'pool> {
    pub(crate) region: Region<'pool>,
    pub(crate) layout: HeaderLayout,
}

impl<'pool> BlockArena<'pool> {
    pub fn new(region: Region<'pool>, layout: HeaderLayout) -> Self {
        Self { region, layout }
    }

    /// Write the header of a permanently used, zero-sized block.
    pub fn init_sentinel(&mut self, block: Block) {
        self.region.write_u8(block.0, 1);
        self.set_bucket(block, 0);
        self.set_free_prev(block, None);
        self.set_free_next(block, None);
        self.set_payload_size(block, 0);
    }

    /// Write the header of a free block spanning `block_size` bytes (header
    /// and footer included). The block is not linked to any list.
    pub fn init_free(&mut self, block: Block, block_size: usize, bucket: usize) {
        debug_assert!(block_size >= self.layout.overhead());
        self.region.write_u8(block.0, 0);
        self.set_bucket(block, bucket);
        self.set_free_prev(block, None);
        self.set_free_next(block, None);
        self.set_payload_size(block, block_size - self.layout.overhead());
    }

    #[inline]
    pub fn is_used(&self, block: Block) -> bool {
        let flag = self.region.read_u8(block.0);
        debug_assert!(flag <= 1, "corrupted in-use flag {:#04x} at {:?}", flag, block);
        flag != 0
    }

    /// Change the in-use flag. A block becoming used is detached from its
    /// free list.
    ///
    /// The bucket's list head and the bitmap are not updated.
    pub fn set_used(&mut self, block: Block, used: bool) {
        debug_assert_ne!(
            self.is_used(block),
            used,
            "{:?} is already in the requested state",
            block
        );
        self.region.write_u8(block.0, used as u8);
        if used {
            self.detach(block);
        }
    }

    #[inline]
    pub fn payload_size(&self, block: Block) -> usize {
        self.region
            .read_uint(block.0 + self.layout.size_offset(), self.layout.size_width)
    }

    /// The number of bytes occupied by the block.
    #[inline]
    pub fn block_size(&self, block: Block) -> usize {
        self.layout.overhead() + self.payload_size(block)
    }

    /// The offset of the block's payload.
    #[inline]
    pub fn payload(&self, block: Block) -> usize {
        block.0 + self.layout.header_len()
    }

    /// The block owning the payload at `payload`.
    #[inline]
    pub fn block_of_payload(&self, payload: usize) -> Block {
        debug_assert!(payload >= self.layout.header_len());
        Block(payload.wrapping_sub(self.layout.header_len()))
    }

    /// Update the payload size. This is the only place where the size field
    /// is written; the footer is rewritten with it.
    #[inline]
    fn set_payload_size(&mut self, block: Block, size: usize) {
        let w = self.layout.size_width;
        self.region.write_uint(block.0 + self.layout.size_offset(), w, size);
        self.write_footer(block, size);
    }

    #[inline]
    fn write_footer(&mut self, block: Block, payload_size: usize) {
        let w = self.layout.size_width;
        let off = block.0 + self.layout.header_len() + payload_size;
        self.region
            .write_uint(off, w, self.layout.overhead() + payload_size);
    }

    /// Read the footer of the block physically preceding `block`.
    #[inline]
    fn read_prev_footer(&self, block: Block) -> usize {
        let w = self.layout.size_width;
        self.region.read_uint(block.0 - w, w)
    }

    #[inline]
    pub fn next(&self, block: Block) -> Block {
        Block(block.0 + self.block_size(block))
    }

    #[inline]
    pub fn prev(&self, block: Block) -> Block {
        Block(block.0 - self.read_prev_footer(block))
    }

    #[inline]
    pub fn can_combine_next(&self, block: Block) -> bool {
        !self.is_used(self.next(block))
    }

    #[inline]
    pub fn can_combine_prev(&self, block: Block) -> bool {
        !self.is_used(self.prev(block))
    }

    /// Absorb the next block, which must be free and already unlinked.
    pub fn combine_next(&mut self, block: Block) {
        let next = self.next(block);
        debug_assert!(!self.is_used(next), "combining with a used block");
        let size = self.payload_size(block) + self.block_size(next);
        self.set_payload_size(block, size);
    }

    /// Let the previous block, which must be free and already unlinked,
    /// absorb `block`. Returns the merged block.
    pub fn combine_prev(&mut self, block: Block) -> Block {
        let prev = self.prev(block);
        debug_assert!(!self.is_used(prev), "combining with a used block");
        let size = self.payload_size(prev) + self.block_size(block);
        self.set_payload_size(prev, size);
        prev
    }

    /// Move the header of a free block `span` bytes backward, growing the
    /// block by `span` bytes. Payload bytes are not moved.
    pub fn append_prev_mem(&mut self, block: Block, span: usize) -> Block {
        debug_assert!(!self.is_used(block));
        let new_block = Block(block.0 - span);
        let size = self.payload_size(block);
        self.region
            .copy_within(block.0, new_block.0, self.layout.header_len());
        self.set_payload_size(new_block, size + span);
        new_block
    }

    /// Set the payload size of a block whose new extent has already been
    /// validated by the caller.
    #[inline]
    pub fn adjust_payload_size(&mut self, block: Block, size: usize) {
        self.set_payload_size(block, size);
    }

    /// Shrink the block to `requested` payload bytes if the remainder can form
    /// a block with at least `min_payload` payload bytes.
    ///
    /// Returns the location and total size of the remainder. The remainder's
    /// header is not written.
    pub fn split(
        &mut self,
        block: Block,
        requested: usize,
        min_payload: usize,
    ) -> Option<(Block, usize)> {
        let size = self.payload_size(block);
        if size >= requested + self.layout.overhead() + min_payload {
            self.set_payload_size(block, requested);
            Some((self.next(block), size - requested))
        } else {
            None
        }
    }
}
