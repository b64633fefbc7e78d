//! The free-list head embedded in every free block: a bucket index and
//! intrusive links to the neighbors in the bucket's list.
use crate::block::{Block, BlockArena};

impl BlockArena<'_> {
    #[inline]
    pub fn bucket(&self, block: Block) -> usize {
        self.region
            .read_uint(block.0 + self.layout.index_offset(), self.layout.index_width())
    }

    #[inline]
    pub fn set_bucket(&mut self, block: Block, bucket: usize) {
        let (off, w) = (block.0 + self.layout.index_offset(), self.layout.index_width());
        self.region.write_uint(off, w, bucket);
    }

    #[inline]
    fn read_link(&self, off: usize) -> Option<Block> {
        match self.region.read_uint(off, self.layout.size_width()) {
            0 => None,
            x => Some(Block(x)),
        }
    }

    #[inline]
    fn write_link(&mut self, off: usize, link: Option<Block>) {
        let w = self.layout.size_width();
        self.region.write_uint(off, w, link.map_or(0, |b| b.0));
    }

    #[inline]
    pub fn free_prev(&self, block: Block) -> Option<Block> {
        self.read_link(block.0 + self.layout.prev_offset())
    }

    #[inline]
    pub fn free_next(&self, block: Block) -> Option<Block> {
        self.read_link(block.0 + self.layout.next_offset())
    }

    #[inline]
    pub fn set_free_prev(&mut self, block: Block, link: Option<Block>) {
        self.write_link(block.0 + self.layout.prev_offset(), link);
    }

    #[inline]
    pub fn set_free_next(&mut self, block: Block, link: Option<Block>) {
        self.write_link(block.0 + self.layout.next_offset(), link);
    }

    /// Link `new_block` in front of `anchor`.
    pub fn insert_before(&mut self, new_block: Block, anchor: Block) {
        let prev = self.free_prev(anchor);
        if let Some(prev) = prev {
            self.set_free_next(prev, Some(new_block));
        }
        self.set_free_prev(new_block, prev);
        self.set_free_next(new_block, Some(anchor));
        self.set_free_prev(anchor, Some(new_block));
    }

    /// Unlink `block` from its neighbors. Emptying the bucket is left to the
    /// caller.
    pub fn detach(&mut self, block: Block) {
        let prev = self.free_prev(block);
        let next = self.free_next(block);
        if let Some(prev) = prev {
            self.set_free_next(prev, next);
        }
        if let Some(next) = next {
            self.set_free_prev(next, prev);
        }
        self.set_free_prev(block, None);
        self.set_free_next(block, None);
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        block::{Block, BlockArena, HeaderLayout},
        region::Region,
    };

    fn arena_with_blocks(n: usize) -> (BlockArena<'static>, std::vec::Vec<Block>) {
        let layout = HeaderLayout::new(16, 8);
        let oh = layout.overhead();
        let mut arena = BlockArena::new(Region::new_boxed(oh * (n + 1) + 32 * n + 1), layout);
        arena.init_sentinel(Block(0));
        let blocks: std::vec::Vec<_> = (0..n).map(|i| Block(oh + i * (oh + 32))).collect();
        for &b in &blocks {
            arena.init_free(b, oh + 32, 0);
        }
        (arena, blocks)
    }

    #[test]
    fn insert_and_detach() {
        let (mut arena, blocks) = arena_with_blocks(3);
        let [a, b, c] = [blocks[0], blocks[1], blocks[2]];

        // c <- b <- a (a pushed last, so it's the head)
        arena.insert_before(b, c);
        arena.insert_before(a, b);
        assert_eq!(arena.free_prev(a), None);
        assert_eq!(arena.free_next(a), Some(b));
        assert_eq!(arena.free_next(b), Some(c));
        assert_eq!(arena.free_prev(c), Some(b));

        arena.detach(b);
        assert_eq!(arena.free_next(a), Some(c));
        assert_eq!(arena.free_prev(c), Some(a));
        assert_eq!(arena.free_next(b), None);

        arena.detach(a);
        assert_eq!(arena.free_prev(c), None);
    }

    #[test]
    fn insert_in_the_middle() {
        let (mut arena, blocks) = arena_with_blocks(3);
        let [a, b, c] = [blocks[0], blocks[1], blocks[2]];
        arena.insert_before(a, c);
        arena.insert_before(b, c);
        assert_eq!(arena.free_next(a), Some(b));
        assert_eq!(arena.free_prev(b), Some(a));
        assert_eq!(arena.free_next(b), Some(c));
        assert_eq!(arena.free_prev(c), Some(b));
    }

    #[test]
    fn bucket_field() {
        let (mut arena, blocks) = arena_with_blocks(1);
        arena.set_bucket(blocks[0], 0xab);
        assert_eq!(arena.bucket(blocks[0]), 0xab);
        assert_eq!(arena.payload_size(blocks[0]), 32);
    }
}
