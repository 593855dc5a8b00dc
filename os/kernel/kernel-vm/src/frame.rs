//! # Frame Table
//!
//! One entry per frame checked out of the page pool, keyed by the frame
//! itself. An entry records which thread owns the frame and, once bound, the
//! user page it backs. The owner's [`PageDirectory`](kernel_vmem::PageDirectory)
//! entry for that page is the back-reference eviction follows to read and
//! clear the accessed and dirty bits.
//!
//! ```text
//!   allocate_frame ──► { owner, page: None }  not evictable yet
//!   bind           ──► { owner, page: Some }  joins the clock scan
//!   evict          ──► { requester, page: None }
//!   free_frame     ──► entry removed, frame back to the pool
//! ```

use crate::clock::{ClockRing, Probe};
use crate::vm::Vm;
use crate::{Platform, Tid};
use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use kernel_alloc::PagePool;
use kernel_memory_addresses::{PhysicalPage, VirtualPage};

/// Bookkeeping for one frame in use.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FrameEntry {
    pub frame: PhysicalPage,
    pub owner: Tid,
    /// The user page the frame backs, once bound.
    pub page: Option<VirtualPage>,
}

/// The registry behind the frame table lock.
pub(crate) struct FrameTable {
    entries: BTreeMap<PhysicalPage, FrameEntry>,
    clock: ClockRing<PhysicalPage>,
}

impl FrameTable {
    pub(crate) const fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            clock: ClockRing::new(),
        }
    }

    /// # Panics
    /// If `frame` is already registered.
    pub(crate) fn register(&mut self, frame: PhysicalPage, owner: Tid) {
        let entry = FrameEntry {
            frame,
            owner,
            page: None,
        };
        if let Some(old) = self.entries.insert(frame, entry) {
            panic!("frame {frame} registered twice (held by {})", old.owner);
        }
        self.clock.insert(frame);
        log::trace!("frame {frame} registered to {owner}");
    }

    /// # Panics
    /// If `frame` is not registered.
    pub(crate) fn bind(&mut self, frame: PhysicalPage, page: VirtualPage) {
        let Some(entry) = self.entries.get_mut(&frame) else {
            panic!("bind of untracked frame {frame}");
        };
        entry.page = Some(page);
        log::trace!("frame {frame} bound to {page} of {}", entry.owner);
    }

    /// Hand a freshly evicted frame to `owner`, unbound.
    pub(crate) fn reassign(&mut self, frame: PhysicalPage, owner: Tid) {
        let Some(entry) = self.entries.get_mut(&frame) else {
            panic!("reassign of untracked frame {frame}");
        };
        entry.owner = owner;
        entry.page = None;
    }

    /// # Panics
    /// If `frame` is not registered.
    pub(crate) fn remove(&mut self, frame: PhysicalPage) -> FrameEntry {
        let Some(entry) = self.entries.remove(&frame) else {
            panic!("free of untracked frame {frame}");
        };
        self.clock.remove(frame);
        log::trace!("frame {frame} released by {}", entry.owner);
        entry
    }

    pub(crate) fn get(&self, frame: PhysicalPage) -> Option<FrameEntry> {
        self.entries.get(&frame).copied()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn owned_by(&self, owner: Tid) -> Vec<FrameEntry> {
        self.entries
            .values()
            .filter(|e| e.owner == owner)
            .copied()
            .collect()
    }

    /// Run the clock over bound frames. Unbound frames are skipped.
    pub(crate) fn select_victim(
        &mut self,
        mut probe: impl FnMut(&FrameEntry, VirtualPage) -> Probe,
    ) -> Option<FrameEntry> {
        let entries = &self.entries;
        let frame = self.clock.select(|frame| match entries.get(&frame) {
            Some(entry) => entry.page.map_or(Probe::Skip, |page| probe(entry, page)),
            None => Probe::Skip,
        })?;
        self.get(frame)
    }
}

impl<P: Platform> Vm<P> {
    /// Check out a frame for `owner`, evicting a page if the pool is empty.
    ///
    /// The frame is registered but not bound: it cannot be evicted until
    /// [`bind`](Self::bind) says which page it serves. Frames obtained by
    /// eviction are always zeroed.
    ///
    /// Halts the kernel if the pool is empty and nothing can be evicted.
    pub fn allocate_frame(&self, owner: Tid, zero: bool) -> PhysicalPage {
        if let Some(frame) = self.pool.get_page(zero) {
            self.frames.lock().register(frame, owner);
            log::debug!("allocated frame {frame} for {owner}");
            return frame;
        }
        self.evict_one(owner)
    }

    /// Record that `frame` now backs `page` of its owner.
    ///
    /// # Panics
    /// If `frame` is not in the frame table.
    pub fn bind(&self, frame: PhysicalPage, page: VirtualPage) {
        self.frames.lock().bind(frame, page);
    }

    /// Return `frame` to the pool.
    ///
    /// The caller must already have removed any mapping of the frame.
    ///
    /// # Panics
    /// If `frame` is not in the frame table.
    pub fn free_frame(&self, frame: PhysicalPage) {
        self.frames.lock().remove(frame);
        self.pool.free_page(frame);
    }

    #[must_use]
    pub fn lookup_frame(&self, frame: PhysicalPage) -> Option<FrameEntry> {
        self.frames.lock().get(frame)
    }

    /// Number of frames currently checked out.
    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.frames.lock().len()
    }

    /// Frames currently owned by `owner`.
    #[must_use]
    pub fn frames_of(&self, owner: Tid) -> Vec<FrameEntry> {
        self.frames.lock().owned_by(owner)
    }
}
