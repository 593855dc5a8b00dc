//! # Address Spaces
//!
//! Everything the paging code keeps per user thread, and its teardown on
//! process exit.

use crate::mmap::MmapTable;
use crate::page::{Location, PageTable};
use crate::swap::SwapDevice;
use crate::vm::Vm;
use crate::{Platform, Tid};
use alloc::sync::Arc;
use kernel_vmem::PageDirectory;
use spin::Mutex;

/// The user address space of one thread.
pub struct AddressSpace<P: Platform> {
    tid: Tid,
    pub(crate) directory: P::Directory,
    pub(crate) pages: Mutex<PageTable<P::File>>,
    pub(crate) mmaps: Mutex<MmapTable<P::File>>,
}

impl<P: Platform> AddressSpace<P> {
    pub(crate) const fn new(tid: Tid, directory: P::Directory) -> Self {
        Self {
            tid,
            directory,
            pages: Mutex::new(PageTable::new()),
            mmaps: Mutex::new(MmapTable::new()),
        }
    }

    #[must_use]
    pub const fn tid(&self) -> Tid {
        self.tid
    }

    /// The hardware view of this address space.
    #[must_use]
    pub const fn directory(&self) -> &P::Directory {
        &self.directory
    }

    /// Number of page descriptors.
    #[must_use]
    pub fn descriptor_count(&self) -> usize {
        self.pages.lock().len()
    }
}

/// What [`Vm::teardown`] released.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct TeardownSummary {
    pub frames: usize,
    pub swap_slots: usize,
    pub mappings: usize,
}

impl<P: Platform> Vm<P> {
    /// Register the address space of a new thread.
    ///
    /// # Panics
    /// If `tid` already has one.
    pub fn create_address_space(&self, tid: Tid, directory: P::Directory) -> Arc<AddressSpace<P>> {
        let space = Arc::new(AddressSpace::new(tid, directory));
        let previous = self.spaces.lock().insert(tid, Arc::clone(&space));
        assert!(previous.is_none(), "{tid} already has an address space");
        log::info!("{tid}: address space created");
        space
    }

    /// Release everything `tid` holds: its mappings (dirty pages are written
    /// back first), its swap slots, its frames and its page descriptors.
    ///
    /// # Panics
    /// If `tid` has no address space.
    pub fn teardown(&self, tid: Tid) -> TeardownSummary {
        let _evicting = self.eviction.lock();
        let Some(space) = self.spaces.lock().remove(&tid) else {
            panic!("teardown of unknown {tid}");
        };

        let mut summary = TeardownSummary::default();
        let ids = space.mmaps.lock().ids();
        for id in ids {
            if self.unmap(&space, id).is_ok() {
                summary.mappings += 1;
            }
        }

        let mut pages = space.pages.lock();
        for descriptor in pages.drain() {
            if let Location::Swapped(slot) = descriptor.location() {
                self.swap.free_slot(slot);
                summary.swap_slots += 1;
            }
        }
        for entry in self.frames_of(tid) {
            if let Some(page) = entry.page {
                space.directory.clear_mapping(page);
            }
            self.free_frame(entry.frame);
            summary.frames += 1;
        }
        drop(pages);

        log::info!(
            "{tid}: address space destroyed, released {} frames, {} swap slots, {} mappings",
            summary.frames,
            summary.swap_slots,
            summary.mappings
        );
        summary
    }
}
