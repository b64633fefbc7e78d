//! Backing storage of an engine. Every raw memory access performed by this
//! crate goes through [`Region`].
use alloc::{boxed::Box, vec};
use core::{
    fmt,
    marker::PhantomData,
    ops::Range,
    ptr::{self, NonNull},
};

/// A contiguous byte buffer, either borrowed for `'pool` or owned.
///
/// Accesses are made through raw pointers derived from the original buffer,
/// so pointers handed out by [`Self::ptr`] stay valid across later accesses
/// to other parts of the region.
pub struct Region<'pool> {
    base: NonNull<u8>,
    len: usize,
    owned: bool,
    _phantom: PhantomData<&'pool mut [u8]>,
}

// Safety: `Region` either owns its buffer or holds the only (mutable) borrow
//         of it. `&Region` only permits reads.
unsafe impl Send for Region<'_> {}
unsafe impl Sync for Region<'_> {}

impl fmt::Debug for Region<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Region")
            .field("base", &self.base)
            .field("len", &self.len)
            .field("owned", &self.owned)
            .finish()
    }
}

impl<'pool> Region<'pool> {
    /// Wrap a caller-supplied buffer.
    #[inline]
    pub fn from_slice(buf: &'pool mut [u8]) -> Self {
        Self {
            len: buf.len(),
            base: NonNull::from(buf).cast(),
            owned: false,
            _phantom: PhantomData,
        }
    }
}

impl Region<'static> {
    /// Allocate a zero-filled buffer of `len` bytes from the global heap. The
    /// buffer is released when the `Region` is dropped.
    pub fn new_boxed(len: usize) -> Self {
        let buf: Box<[u8]> = vec![0u8; len].into_boxed_slice();
        Self {
            len: buf.len(),
            base: NonNull::from(Box::leak(buf)).cast(),
            owned: true,
            _phantom: PhantomData,
        }
    }
}

impl Drop for Region<'_> {
    fn drop(&mut self) {
        if self.owned {
            // Safety: `base` and `len` came from the `Box` leaked by
            //         `new_boxed`, and nothing else has reclaimed it.
            drop(unsafe {
                Box::from_raw(ptr::slice_from_raw_parts_mut(self.base.as_ptr(), self.len))
            });
        }
    }
}

impl Region<'_> {
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether the region owns its buffer.
    #[inline]
    pub fn is_owned(&self) -> bool {
        self.owned
    }

    /// The address range occupied by the region.
    #[inline]
    pub fn address_range(&self) -> Range<usize> {
        let start = self.base.as_ptr() as usize;
        start..start + self.len
    }

    #[inline]
    #[track_caller]
    fn check_range(&self, off: usize, len: usize) {
        assert!(
            off <= self.len && len <= self.len - off,
            "region access {}..{} is out of bounds (len = {})",
            off,
            off.wrapping_add(len),
            self.len
        );
    }

    /// Get a pointer to the byte at `off`. `off` may be equal to the length.
    #[inline]
    pub fn ptr(&self, off: usize) -> NonNull<u8> {
        self.check_range(off, 0);
        // Safety: `off` is in bounds (or one past the end)
        unsafe { NonNull::new_unchecked(self.base.as_ptr().add(off)) }
    }

    /// Convert a pointer into the region into an offset.
    #[inline]
    pub fn offset_of(&self, ptr: NonNull<u8>) -> Option<usize> {
        let off = (ptr.as_ptr() as usize).wrapping_sub(self.base.as_ptr() as usize);
        if off < self.len {
            Some(off)
        } else {
            None
        }
    }

    #[inline]
    pub fn read_u8(&self, off: usize) -> u8 {
        self.check_range(off, 1);
        // Safety: in bounds
        unsafe { *self.base.as_ptr().add(off) }
    }

    #[inline]
    pub fn write_u8(&mut self, off: usize, value: u8) {
        self.check_range(off, 1);
        // Safety: in bounds
        unsafe { *self.base.as_ptr().add(off) = value };
    }

    /// Read a little-endian unsigned integer `width` bytes long.
    #[inline]
    pub fn read_uint(&self, off: usize, width: usize) -> usize {
        debug_assert!(width <= 8);
        self.check_range(off, width);
        let mut bytes = [0u8; 8];
        // Safety: the source is in bounds, `bytes` is large enough
        unsafe { ptr::copy_nonoverlapping(self.base.as_ptr().add(off), bytes.as_mut_ptr(), width) };
        u64::from_le_bytes(bytes) as usize
    }

    /// Write a little-endian unsigned integer `width` bytes long. `value` must
    /// be representable in `width` bytes.
    #[inline]
    pub fn write_uint(&mut self, off: usize, width: usize, value: usize) {
        debug_assert!(width <= 8);
        debug_assert!(
            width == 8 || (value as u64) >> (width * 8) == 0,
            "{} does not fit in {} bytes",
            value,
            width
        );
        self.check_range(off, width);
        let bytes = (value as u64).to_le_bytes();
        // Safety: the destination is in bounds
        unsafe { ptr::copy_nonoverlapping(bytes.as_ptr(), self.base.as_ptr().add(off), width) };
    }

    /// Set `len` bytes starting at `off` to `byte`.
    #[inline]
    pub fn fill(&mut self, off: usize, len: usize, byte: u8) {
        self.check_range(off, len);
        // Safety: in bounds
        unsafe { ptr::write_bytes(self.base.as_ptr().add(off), byte, len) };
    }

    /// Copy `len` bytes from `src` to `dst`. The ranges may overlap.
    #[inline]
    pub fn copy_within(&mut self, src: usize, dst: usize, len: usize) {
        self.check_range(src, len);
        self.check_range(dst, len);
        // Safety: both ranges are in bounds; `ptr::copy` handles overlaps
        unsafe { ptr::copy(self.base.as_ptr().add(src), self.base.as_ptr().add(dst), len) };
    }

    #[inline]
    pub fn slice(&self, off: usize, len: usize) -> &[u8] {
        self.check_range(off, len);
        // Safety: in bounds, and the buffer is always initialized
        unsafe { core::slice::from_raw_parts(self.base.as_ptr().add(off), len) }
    }

    #[inline]
    pub fn slice_mut(&mut self, off: usize, len: usize) -> &mut [u8] {
        self.check_range(off, len);
        // Safety: in bounds, initialized, and `&mut self` rules out other
        //         references created through this `Region`
        unsafe { core::slice::from_raw_parts_mut(self.base.as_ptr().add(off), len) }
    }
}
