//! Mapping payload sizes to free lists.
use crate::int::msb;

#[derive(Debug, Copy, Clone)]
pub(crate) struct MapParams {
    pub mem_bits: u32,
    /// `log2` of the number of first level lists
    pub fl_bits: u32,
    /// `log2` of the number of second level lists per first level list
    pub sl_bits: u32,
}

impl MapParams {
    pub const fn new(mem_bits: u32, fl_bits: u32, sl_bits: u32) -> Self {
        Self {
            mem_bits,
            fl_bits,
            sl_bits,
        }
    }

    /// Evaluates successfully if the parameters are valid.
    pub const fn validate(&self) {
        if self.fl_bits == 0 || self.fl_bits > 5 {
            panic!("`FL_BITS` must be in range `1..=5`");
        }
        if self.sl_bits > 5 {
            panic!("`SL_BITS` must be in range `0..=5`");
        }
        if self.mem_bits == 0 || self.mem_bits > usize::BITS {
            panic!("`MEM_BITS` must be in range `1..=usize::BITS`");
        }
        if (self.mem_bits as i64) + 1 - (1i64 << self.fl_bits) < self.sl_bits as i64 {
            panic!("`MEM_BITS + 1 - 2^FL_BITS` must not be less than `SL_BITS`");
        }
    }

    /// The number of first-level lists.
    #[inline]
    pub const fn fl_count(&self) -> usize {
        1 << self.fl_bits
    }

    /// The number of second-level lists per first-level list.
    #[inline]
    pub const fn sl_count(&self) -> usize {
        1 << self.sl_bits
    }

    #[inline]
    pub const fn bucket_count(&self) -> usize {
        1 << (self.fl_bits + self.sl_bits)
    }

    /// Sizes below `1 << fl_shift` belong to the first-level list `0`.
    #[inline]
    const fn fl_shift(&self) -> u32 {
        self.mem_bits + 1 - (1 << self.fl_bits)
    }

    /// The size range covered by the first-level list `0`.
    #[inline]
    pub const fn min_bucket_span(&self) -> usize {
        1 << self.fl_shift()
    }

    /// The size range covered by the smallest second-level list, which is also
    /// the minimum payload size.
    #[inline]
    pub const fn min_block_size(&self) -> usize {
        self.min_bucket_span() >> self.sl_bits
    }

    /// Find the list to store a free block of the specified payload size.
    #[inline]
    pub fn map_floor(&self, size: usize) -> usize {
        let fl_shift = self.fl_shift();
        let shifted = size >> fl_shift;
        debug_assert!(
            shifted <= u32::MAX as usize,
            "size {} exceeds the configured address space",
            size
        );
        let fl = if shifted == 0 {
            0
        } else {
            msb(shifted as u32) + 1
        };
        debug_assert!(
            (fl as usize) < self.fl_count(),
            "size {} exceeds the configured address space",
            size
        );

        let sl_shift = fl_shift + fl.saturating_sub(1) - self.sl_bits;
        let sl = (size >> sl_shift) & (self.sl_count() - 1);

        self.compose(fl, sl as u32)
    }

    #[inline]
    pub const fn compose(&self, fl: u32, sl: u32) -> usize {
        ((fl as usize) << self.sl_bits) | sl as usize
    }

    #[inline]
    pub const fn first_level(&self, bucket: usize) -> u32 {
        (bucket >> self.sl_bits) as u32
    }

    #[inline]
    pub const fn second_level(&self, bucket: usize) -> u32 {
        (bucket & (self.sl_count() - 1)) as u32
    }
}
