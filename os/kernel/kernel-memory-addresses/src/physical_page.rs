use crate::{OFFSET_MASK, PAGE_SHIFT, page_round_down};
use core::fmt;

/// Physical frame base.
///
/// A `PhysicalPage` is the **page-aligned base** of a 4 KiB physical frame.
/// It serves as the identity of a frame: the frame table keys its entries by
/// it, and the page pool hands it out and takes it back.
///
/// ### Examples
/// ```rust
/// # use kernel_memory_addresses::*;
/// let frame = PhysicalPage::containing(0x0010_2042);
/// assert_eq!(frame.as_u64(), 0x0010_2000);
/// assert_eq!(frame.index_from(0x0010_0000), 2);
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalPage(u64);

impl PhysicalPage {
    /// Frame containing physical address `pa`.
    #[inline]
    #[must_use]
    pub const fn containing(pa: u64) -> Self {
        Self(page_round_down(pa))
    }

    /// Frame `index` frames above `base`.
    ///
    /// `base` must be page aligned.
    #[inline]
    #[must_use]
    pub const fn nth_from(base: u64, index: u64) -> Self {
        debug_assert!(base & OFFSET_MASK == 0);
        Self(base + (index << PAGE_SHIFT))
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Number of frames between `base` and this frame.
    #[inline]
    #[must_use]
    pub const fn index_from(self, base: u64) -> u64 {
        (self.0 - base) >> PAGE_SHIFT
    }
}

impl fmt::Display for PhysicalPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:012X}", self.0)
    }
}

impl fmt::Debug for PhysicalPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysicalPage(0x{:012X})", self.0)
    }
}
