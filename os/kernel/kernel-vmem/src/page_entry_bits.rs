use bitfield_struct::bitfield;
use kernel_memory_addresses::PhysicalPage;

/// A 4 KiB leaf page table entry in its raw bitfield form.
///
/// Only the leaf (PTE) layout matters for user paging: every user mapping
/// is a single 4 KiB page.
///
/// ### Bit layout
///
/// | Bits      | Name / Mnemonic   | Meaning |
/// |-----------|-------------------|----------|
/// | 0         | `P` (present)     | Valid entry if set |
/// | 1         | `RW`              | Writable if set |
/// | 2         | `US`              | User-mode accessible if set |
/// | 3–4       | `PWT`, `PCD`      | Caching, unused for user pages |
/// | 5         | `A`               | Accessed |
/// | 6         | `D`               | Dirty |
/// | 7–11      | `PAT`, `G`, avail | Unused for user pages |
/// | 12–51     | `addr`            | Physical frame bits [51:12] |
/// | 52–62     | OS avail          | Unused |
/// | 63        | `NX`              | Execute disable |
///
/// ### Example
/// ```rust
/// # use kernel_memory_addresses::PhysicalPage;
/// # use kernel_vmem::PageEntryBits;
/// let frame = PhysicalPage::containing(0x0012_3000);
/// let e = PageEntryBits::user_leaf(frame, true);
/// assert!(e.present() && e.writable() && e.user_access());
/// assert!(!e.accessed() && !e.dirty());
/// assert_eq!(e.frame(), frame);
/// ```
#[bitfield(u64)]
pub struct PageEntryBits {
    /// Present (P, bit 0).
    pub present: bool,

    /// Writable (RW, bit 1).
    pub writable: bool,

    /// User/Supervisor (US, bit 2).
    pub user_access: bool,

    #[bits(2)]
    __: u8,

    /// Accessed (A, bit 5).
    ///
    /// Set by the CPU on any access through this entry. The clock scan
    /// clears it to give the page a second chance.
    pub accessed: bool,

    /// Dirty (D, bit 6).
    ///
    /// Set by the CPU on the first write through this entry. Decides
    /// whether an evicted page must be persisted.
    pub dirty: bool,

    #[bits(5)]
    __: u8,

    /// Physical address bits [51:12] (bits 12..=51).
    #[bits(40)]
    frame_bits_51_12: u64,

    #[bits(11)]
    __: u16,

    /// No-Execute (NX, bit 63).
    pub no_execute: bool,
}

impl PageEntryBits {
    /// A present user leaf mapping `frame`, accessed and dirty clear.
    #[inline]
    #[must_use]
    pub const fn user_leaf(frame: PhysicalPage, writable: bool) -> Self {
        Self::new()
            .with_present(true)
            .with_writable(writable)
            .with_user_access(true)
            .with_frame_bits_51_12(frame.as_u64() >> 12)
    }

    #[inline]
    #[must_use]
    pub const fn frame(&self) -> PhysicalPage {
        PhysicalPage::containing(self.frame_bits_51_12() << 12)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_layout_matches_hardware_bits() {
        let frame = PhysicalPage::containing(0x0000_0010_2000_0000);
        let e = PageEntryBits::user_leaf(frame, false)
            .with_accessed(true)
            .with_dirty(true);
        let raw = e.into_bits();
        assert_eq!(raw & 0b111, 0b101, "P and US set, RW clear");
        assert_ne!(raw & (1 << 5), 0, "A is bit 5");
        assert_ne!(raw & (1 << 6), 0, "D is bit 6");
        assert_eq!(raw & 0x000F_FFFF_FFFF_F000, frame.as_u64());
        assert_eq!(e.frame(), frame);
    }
}
