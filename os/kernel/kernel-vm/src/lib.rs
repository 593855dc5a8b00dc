//! # Demand-Paged Virtual Memory
//!
//! The part of the kernel that decides which physical frame backs which user
//! page at any instant. A bounded pool of frames is shared by every user
//! process; pages that are not resident are brought in on the first fault,
//! and frames are reclaimed under pressure by evicting a page and persisting
//! its contents to swap or to its backing file.
//!
//! ## Architecture Overview
//!
//! ```text
//!   page-fault handler      syscall layer          process loader
//!          │                      │                       │
//!   resolve_fault        check_user_buffer        register_segment
//!          │              copy_{to,from}_user     setup_stack / install_page
//!          │              mmap / munmap                   │
//!          └──────────────────────┼───────────────────────┘
//!                                 ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Vm                                                           │
//! │  ┌──────────────────────┐   ┌──────────────────────────────┐ │
//! │  │ AddressSpace (tid)   │   │ Frame table                  │ │
//! │  │  • page descriptors  │◄──│  • frame → (owner, page)     │ │
//! │  │  • mmap table        │   │  • clock ring                │ │
//! │  │  • PageDirectory     │   └──────────────┬───────────────┘ │
//! │  └──────────────────────┘                  │ pool exhausted  │
//! │                                    ┌───────▼────────┐        │
//! │                                    │ Eviction       │        │
//! │                                    │  second chance │        │
//! │                                    └───────┬────────┘        │
//! └────────────────────────────────────────────┼─────────────────┘
//!                 ┌──────────────┬─────────────┼──────────────┐
//!                 ▼              ▼             ▼              ▼
//!             PagePool      SwapDevice      VmFile     PageDirectory
//! ```
//!
//! ## Page lifecycle
//!
//! Every user page that is not simply resident has a [`PageDescriptor`]
//! saying where its contents come from ([`Backing`]) and where they are now
//! ([`Location`]):
//!
//! ```text
//!            fault                      evict (dirty or anonymous)
//!  Unloaded ───────► Resident(frame) ─────────────────────────────► Swapped(slot)
//!     ▲                │      ▲                                        │
//!     │  evict (clean  │      └────────────── fault ───────────────────┘
//!     └─ file page, or ┘
//!        mmap page written back)
//! ```
//!
//! Stack pages grown on demand start out without a descriptor; the first time
//! one is evicted it gets an anonymous one.
//!
//! ## Fatal conditions
//!
//! Some failures leave the kernel with no way forward: eviction finds no
//! victim, swap is full, or a victim's contents cannot be persisted. These are
//! never returned as errors. They end in [`halt`], which does not return.
//!
//! ## Locking
//!
//! Locks are always taken in this order; any prefix may be skipped:
//!
//! 1. the eviction lock
//! 2. an address space's mmap table
//! 3. an address space's page descriptors
//! 4. the frame table
//! 5. the address-space registry
//!
//! A thread never holds its own page descriptors while allocating a frame.
//! Holding them does pin the thread's resident pages: eviction has to take
//! them before it may touch a victim.

#![cfg_attr(not(any(test, doctest)), no_std)]

extern crate alloc;

mod clock;
mod error;
mod evict;
mod fault;
mod file;
mod frame;
mod mmap;
mod page;
mod space;
mod swap;
mod vm;

pub use crate::error::{FaultError, InstallError, MmapError, SptError, SwapError, VmFatal, halt};
pub use crate::fault::{PageFault, PageFaultCode};
pub use crate::file::{FileSpan, VmFile};
pub use crate::frame::FrameEntry;
pub use crate::mmap::MapId;
pub use crate::page::{Backing, BackingKind, Location, PageDescriptor, PageSummary};
pub use crate::space::{AddressSpace, TeardownSummary};
pub use crate::swap::{SwapDevice, SwapSlot};
pub use crate::vm::{StackLimits, Vm};

use core::fmt;
use kernel_alloc::PagePool;
use kernel_vmem::PageDirectory;

/// The collaborators a [`Vm`] is built from.
///
/// Implemented once by the kernel (hardware page tables, the disk swap
/// partition, the file system) and once by the tests (in-memory doubles).
pub trait Platform: 'static {
    type Pool: PagePool;
    type Directory: PageDirectory;
    type Swap: SwapDevice;
    type File: VmFile;
}

/// Identifier of a user thread, i.e. of the address space it runs in.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Tid(pub u32);

impl fmt::Display for Tid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tid {}", self.0)
    }
}
