use std::{collections::BTreeMap, ops::Range};

/// Tracks which address ranges are handed out to detect overlapping
/// allocations. Every allocation must span at least `min_block_size` bytes.
pub struct ShadowAllocator {
    regions: BTreeMap<usize, SaRegion>,
    min_block_size: usize,
}

#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum SaRegion {
    Free,
    Used,
    Invalid,
}

impl ShadowAllocator {
    pub fn new(min_block_size: usize) -> Self {
        Self {
            regions: Some((0, SaRegion::Invalid)).into_iter().collect(),
            min_block_size,
        }
    }

    pub fn convert_range(
        &mut self,
        range: Range<usize>,
        old_region: SaRegion,
        new_region: SaRegion,
    ) {
        if range.is_empty() {
            return;
        }

        assert_ne!(old_region, new_region);
        log::trace!(
            "sa: converting {:?} from {:?} to {:?}",
            range,
            old_region,
            new_region
        );

        let (&addr, &region) = self.regions.range(0..range.end).rev().next().unwrap();
        if addr > range.start {
            panic!("there's a discontinuity in range {:?}", range);
        } else if region != old_region {
            panic!(
                "range {:?} is {:?} (expected {:?})",
                range, region, old_region
            );
        }

        // Insert an element at `range.start`
        if addr == range.start {
            *self.regions.get_mut(&addr).unwrap() = new_region;
        } else {
            self.regions.insert(range.start, new_region);
        }

        // An element that doesn't mark a discontinuity is redundant
        if let Some((_, &region)) = self.regions.range(0..range.start).rev().next() {
            if region == new_region {
                self.regions.remove(&range.start);
            }
        }

        if let Some(&end_region) = self.regions.get(&range.end) {
            if end_region == new_region {
                self.regions.remove(&range.end);
            }
        } else {
            // Insert an element at `range.end`
            self.regions.insert(range.end, old_region);
        }
    }

    pub fn insert_free_block(&mut self, range: Range<usize>) {
        self.convert_range(range, SaRegion::Invalid, SaRegion::Free);
    }

    pub fn allocate(&mut self, start: usize, len: usize) {
        assert!(
            len >= self.min_block_size,
            "block at {} is {} bytes long (minimum is {})",
            start,
            len,
            self.min_block_size
        );
        self.convert_range(start..start + len, SaRegion::Free, SaRegion::Used);
    }

    pub fn deallocate(&mut self, start: usize, len: usize) {
        self.convert_range(start..start + len, SaRegion::Used, SaRegion::Free);
    }
}

/// The pseudo-random number generator used by the stress tests.
pub struct Xorshift32(pub u32);

impl Xorshift32 {
    pub fn next(&mut self) -> u32 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 17;
        self.0 ^= self.0 << 5;
        !self.0
    }

    /// Fisher-Yates shuffle.
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = self.next() as usize % (i + 1);
            items.swap(i, j);
        }
    }
}

#[test]
fn shadow_detects_overlap() {
    let mut sa = ShadowAllocator::new(8);
    sa.insert_free_block(100..200);
    sa.allocate(110, 20);
    sa.allocate(130, 10);
    sa.deallocate(110, 20);
    let result = std::panic::catch_unwind(move || sa.allocate(125, 10));
    assert!(result.is_err());
}

#[test]
#[should_panic(expected = "minimum is 8")]
fn shadow_rejects_short_block() {
    let mut sa = ShadowAllocator::new(8);
    sa.insert_free_block(0..64);
    sa.allocate(16, 4);
}
