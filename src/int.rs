//! Bit-scan helpers for the bitmap index and field width selection.

/// Get the index of the most significant set bit of `x`.
///
/// Returns `0` if `x` is zero, which matches the behavior of a `bsr`
/// instruction fed with `x | 1`.
#[inline]
pub const fn msb(x: u32) -> u32 {
    31 - (x | 1).leading_zeros()
}

/// Get the index of the least significant set bit of `x`.
///
/// Returns `31` if `x` is zero.
#[inline]
pub const fn lsb(x: u32) -> u32 {
    (x | 0x8000_0000).trailing_zeros()
}

/// Clear every bit below the most significant set bit, leaving only that bit.
#[inline]
pub const fn low_clear(mut x: u32) -> u32 {
    x |= x >> 1;
    x |= x >> 2;
    x |= x >> 4;
    x |= x >> 8;
    x |= x >> 16;
    x & !(x >> 1)
}

/// A mask of the bits at positions `>= i`. `i` may be `32`, in which case the
/// mask is empty.
#[inline]
pub const fn bits_from(i: u32) -> u32 {
    if i >= 32 {
        0
    } else {
        u32::MAX << i
    }
}

/// The width in bytes of the smallest unsigned integer type (`u8`, `u16`,
/// `u32`, or `u64`) that can hold a `bits`-bit value.
#[inline]
pub const fn uint_width_for_bits(bits: u32) -> usize {
    match bits {
        0..=8 => 1,
        9..=16 => 2,
        17..=32 => 4,
        _ => 8,
    }
}

/// Operations on a bitmap word.
pub trait BinInteger: Copy + Eq {
    const ZERO: Self;
    const BITS: u32;

    fn get_bit(&self, i: u32) -> bool;
    fn set_bit(&mut self, i: u32);
    fn clear_bit(&mut self, i: u32);
}

impl BinInteger for u32 {
    const ZERO: Self = 0;
    const BITS: u32 = 32;

    #[inline]
    fn get_bit(&self, i: u32) -> bool {
        (*self >> i) & 1 != 0
    }

    #[inline]
    fn set_bit(&mut self, i: u32) {
        *self |= 1 << i;
    }

    #[inline]
    fn clear_bit(&mut self, i: u32) {
        *self &= !(1 << i);
    }
}
