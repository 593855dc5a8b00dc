//! # User Page Directory Access
//!
//! The paging core never walks hardware page tables itself. It reads and
//! changes user mappings through the [`PageDirectory`] trait: one instance per
//! address space, keyed by [`VirtualPage`].
//!
//! ## What you get
//! - The [`PageDirectory`] contract: install/remove a mapping, and query and
//!   clear the hardware-maintained **accessed** and **dirty** bits.
//! - [`PageEntryBits`], the x86 leaf entry layout the bits are read from.
//! - [`SoftPageDirectory`], a page directory held in ordinary memory that
//!   mimics the MMU's bookkeeping. It is what the host-side tests run against
//!   and what the kernel uses before its own tables are up.
//!
//! ## Accessed and dirty bits
//!
//! ```text
//!   user load  ──►  MMU sets A
//!   user store ──►  MMU sets A and D
//!   clock scan ──►  reads A, clears A (second chance)
//!   eviction   ──►  reads D to decide swap / write-back / drop
//!   new mapping──►  A and D start clear
//! ```
//!
//! Kernel code that touches user pages through the frame's kernel alias does
//! not go through the user mapping, so the MMU does not see it. Such code calls
//! [`PageDirectory::record_access`] to keep the bits honest.

#![cfg_attr(not(any(test, doctest)), no_std)]

extern crate alloc;

mod page_directory;
mod page_entry_bits;

pub use crate::page_directory::SoftPageDirectory;
pub use crate::page_entry_bits::PageEntryBits;
use kernel_memory_addresses::{PhysicalPage, VirtualPage};

/// Error returned by [`PageDirectory::set_mapping`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MapError {
    /// No memory left for an intermediate page table.
    #[error("out of memory for page tables while mapping {0}")]
    OutOfMemory(VirtualPage),
}

/// Per-address-space view of the user page tables.
///
/// Queries on a page that has no present mapping return `None`/`false`; the
/// mutating calls on such a page are no-ops.
pub trait PageDirectory: Send + Sync {
    /// Frame currently mapped at `page`, if any.
    fn get_mapping(&self, page: VirtualPage) -> Option<PhysicalPage>;

    /// Map `page` to `frame`. Accessed and dirty start clear.
    ///
    /// # Errors
    /// [`MapError::OutOfMemory`] if a page table could not be allocated.
    fn set_mapping(
        &self,
        page: VirtualPage,
        frame: PhysicalPage,
        writable: bool,
    ) -> Result<(), MapError>;

    /// Remove the mapping for `page`. Subsequent accesses fault.
    fn clear_mapping(&self, page: VirtualPage);

    /// Whether `page` has been written since it was mapped.
    fn is_dirty(&self, page: VirtualPage) -> bool;

    /// Whether `page` has been accessed since the bit was last cleared.
    fn is_accessed(&self, page: VirtualPage) -> bool;

    /// Clear the accessed bit of `page`.
    fn clear_accessed(&self, page: VirtualPage);

    /// Whether the mapping of `page` allows user writes.
    fn is_writable(&self, page: VirtualPage) -> bool;

    /// Note an access the MMU did not observe.
    ///
    /// Sets the accessed bit, and the dirty bit too when `write` is set.
    /// Returns `false` if `page` is not mapped, or if `write` is set and the
    /// mapping is read-only; the bits are left untouched in that case.
    fn record_access(&self, page: VirtualPage, write: bool) -> bool;
}
