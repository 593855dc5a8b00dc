//! # User Page and Frame Address Types
//!
//! Strongly typed wrappers for the addresses the paging code passes around:
//! user virtual addresses, the virtual pages that contain them, and the
//! physical frames that back those pages.
//!
//! ## Overview
//!
//! | Type | Meaning |
//! |------|---------|
//! | [`VirtualAddress`] | A raw user-space virtual address, e.g. a faulting address or a stack pointer. |
//! | [`VirtualPage`] | The page-aligned base of a 4 KiB virtual page. Key of every per-thread page table. |
//! | [`PhysicalPage`] | The page-aligned base of a 4 KiB physical frame. Identity of a frame table entry. |
//!
//! Only 4 KiB pages are modelled: demand paging, eviction and swap all work at
//! that granularity, so the page size is a crate constant ([`PAGE_SIZE`])
//! rather than a type parameter.
//!
//! ## Typical Usage
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let va = VirtualAddress::new(0x0804_8123);
//! let page = va.page();
//! assert_eq!(page.base().as_u64(), 0x0804_8000);
//! assert_eq!(va.page_offset(), 0x123);
//!
//! // Pages step in whole 4 KiB units.
//! assert_eq!(page.next().base().as_u64(), 0x0804_9000);
//! ```
//!
//! ## Design Notes
//!
//! - The types are `#[repr(transparent)]` and implement `Copy`, `Eq`, `Ord`
//!   and `Hash`, so they can be used directly as map keys.
//! - Alignment helpers are `const fn`.
//! - Virtual and physical values never convert into each other implicitly.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

mod physical_page;
mod virtual_address;
mod virtual_page;

pub use physical_page::PhysicalPage;
pub use virtual_address::VirtualAddress;
pub use virtual_page::{VirtualPage, VirtualPageRange};

/// log2 of [`PAGE_SIZE`].
pub const PAGE_SHIFT: u32 = 12;

/// Size of a page (and of a frame, and of a swap slot) in bytes.
pub const PAGE_SIZE: usize = 1 << PAGE_SHIFT;

/// [`PAGE_SIZE`] as a `u64`, for address arithmetic.
pub const PAGE_SIZE_U64: u64 = 1 << PAGE_SHIFT;

/// The contents of one page.
pub type PageBytes = [u8; PAGE_SIZE];

/// Mask selecting the in-page offset bits of an address.
const OFFSET_MASK: u64 = PAGE_SIZE_U64 - 1;

/// Round `x` down to a page boundary.
#[inline]
#[must_use]
pub const fn page_round_down(x: u64) -> u64 {
    x & !OFFSET_MASK
}

/// Round `x` up to a page boundary, saturating at the last page.
#[inline]
#[must_use]
pub const fn page_round_up(x: u64) -> u64 {
    match x.checked_add(OFFSET_MASK) {
        Some(v) => page_round_down(v),
        None => page_round_down(u64::MAX),
    }
}

/// Number of pages needed to hold `bytes` bytes.
#[inline]
#[must_use]
pub const fn pages_spanning(bytes: u64) -> u64 {
    bytes.div_ceil(PAGE_SIZE_U64)
}
