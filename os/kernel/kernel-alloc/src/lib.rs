//! # User Page Pool
//!
//! This crate provides the raw page pool that backs every user page in the
//! system: a fixed number of 4 KiB physical frames, handed out one at a time
//! and taken back when a page is released.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │        Frame Table / Eviction (kernel-vm)           │
//! │    • owns every frame it checks out                 │
//! │    • evicts when the pool runs dry                  │
//! └─────────────────┬───────────────────────────────────┘
//!                   │ get_page / free_page / with_page
//! ┌─────────────────▼───────────────────────────────────┐
//! │               PagePool                              │
//! │    • fixed capacity, never grows                    │
//! │    • optional zero-fill on allocation               │
//! │    • byte access to a checked-out frame             │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! The pool knows nothing about owners or virtual pages. Running out of pages
//! is an ordinary `None`; deciding what to do about it (evict, or halt) is the
//! frame table's job.
//!
//! ## Core Components
//!
//! ### [`PagePool`]
//! The contract the frame table consumes.
//!
//! ### Bitmap Page Pool ([`frame_alloc`])
//! A self-contained arena of `capacity` frames with one bit of bookkeeping per
//! frame. Frames are identified by physical page addresses starting at
//! [`USER_POOL_BASE`](kernel_info::memory::USER_POOL_BASE).
//!
//! ## Usage
//! ```rust
//! use kernel_alloc::{PagePool, frame_alloc::BitmapPagePool};
//!
//! let pool = BitmapPagePool::new(2);
//! let a = pool.get_page(true).unwrap();
//! let b = pool.get_page(false).unwrap();
//! assert!(pool.get_page(false).is_none());
//!
//! pool.with_page(a, |bytes| bytes[0] = 0xAA);
//! assert_eq!(pool.with_page(a, |bytes| bytes[0]), 0xAA);
//!
//! pool.free_page(b);
//! assert_eq!(pool.available(), 1);
//! # pool.free_page(a);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

extern crate alloc;

pub mod frame_alloc;

use kernel_memory_addresses::{PageBytes, PhysicalPage};

/// Fixed-capacity source of user page frames.
///
/// Every method is individually thread safe. A frame returned by
/// [`get_page`](Self::get_page) belongs to the caller until it is passed back
/// to [`free_page`](Self::free_page).
pub trait PagePool: Send + Sync {
    /// Check out one frame, or `None` if all frames are in use.
    ///
    /// With `zero` set, the frame's contents are cleared before it is returned.
    fn get_page(&self, zero: bool) -> Option<PhysicalPage>;

    /// Return a frame to the pool.
    fn free_page(&self, frame: PhysicalPage);

    /// Total number of frames the pool manages.
    fn capacity(&self) -> usize;

    /// Run `f` with the bytes of a checked-out frame.
    fn with_page<R>(&self, frame: PhysicalPage, f: impl FnOnce(&mut PageBytes) -> R) -> R;
}
