use crate::{OFFSET_MASK, PAGE_SIZE_U64, VirtualAddress, pages_spanning};
use core::fmt;

/// Virtual page base.
///
/// A `VirtualPage` is the **page-aligned base** of a 4 KiB user page. It is
/// the key under which per-thread page descriptors and page-table mappings
/// are stored.
///
/// ### Invariants
/// - The low 12 bits of the base are always zero.
///
/// ### Examples
/// ```rust
/// # use kernel_memory_addresses::*;
/// let va = VirtualAddress::new(0x0804_8123);
/// let vp = VirtualPage::containing(va);
/// assert_eq!(vp.base().as_u64(), 0x0804_8000);
/// assert_eq!(VirtualPage::try_from(va), Err(va));
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VirtualPage(u64);

impl VirtualPage {
    /// Page size in bytes.
    pub const SIZE: u64 = PAGE_SIZE_U64;

    #[inline]
    #[must_use]
    pub(crate) const fn from_aligned(base: u64) -> Self {
        debug_assert!(base & OFFSET_MASK == 0);
        Self(base)
    }

    /// Page that contains `addr` (aligns down to page boundary).
    #[inline]
    #[must_use]
    pub const fn containing(addr: VirtualAddress) -> Self {
        addr.page()
    }

    #[inline]
    #[must_use]
    pub const fn base(self) -> VirtualAddress {
        VirtualAddress::new(self.0)
    }

    /// Virtual page number.
    #[inline]
    #[must_use]
    pub const fn number(self) -> u64 {
        self.0 / PAGE_SIZE_U64
    }

    /// The page `n` pages above this one.
    #[inline]
    #[must_use]
    pub const fn offset_by(self, n: u64) -> Self {
        Self(self.0 + n * PAGE_SIZE_U64)
    }

    /// The page directly above this one.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        self.offset_by(1)
    }

    /// The page directly below this one.
    #[inline]
    #[must_use]
    pub const fn prev(self) -> Self {
        Self(self.0 - PAGE_SIZE_U64)
    }
}

impl fmt::Display for VirtualPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

impl fmt::Debug for VirtualPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VirtualPage(0x{:08X})", self.0)
    }
}

impl TryFrom<VirtualAddress> for VirtualPage {
    type Error = VirtualAddress;

    /// Accepts only page-aligned addresses; hands back the address otherwise.
    #[inline]
    fn try_from(va: VirtualAddress) -> Result<Self, VirtualAddress> {
        if va.is_page_aligned() {
            Ok(va.page())
        } else {
            Err(va)
        }
    }
}

/// A run of consecutive virtual pages, `[start, start + len)`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct VirtualPageRange {
    start: VirtualPage,
    len: u64,
}

impl VirtualPageRange {
    #[inline]
    #[must_use]
    pub const fn new(start: VirtualPage, len: u64) -> Self {
        Self { start, len }
    }

    /// The pages needed to hold `bytes` bytes starting at `start`.
    #[inline]
    #[must_use]
    pub const fn covering(start: VirtualPage, bytes: u64) -> Self {
        Self::new(start, pages_spanning(bytes))
    }

    #[inline]
    #[must_use]
    pub const fn start(&self) -> VirtualPage {
        self.start
    }

    /// Number of pages in the range.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> u64 {
        self.len
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// First address past the range, or `None` if it would overflow.
    #[inline]
    #[must_use]
    pub const fn end(&self) -> Option<VirtualAddress> {
        match self.len.checked_mul(PAGE_SIZE_U64) {
            Some(bytes) => self.start.base().checked_add(bytes),
            None => None,
        }
    }

    #[inline]
    #[must_use]
    pub const fn contains(&self, page: VirtualPage) -> bool {
        page.0 >= self.start.0 && (page.0 - self.start.0) / PAGE_SIZE_U64 < self.len
    }

    pub fn iter(&self) -> impl Iterator<Item = VirtualPage> + use<> {
        let start = self.start;
        (0..self.len).map(move |i| start.offset_by(i))
    }
}
