//! # Eviction
//!
//! When the pool runs dry a frame is taken from some resident page. The
//! victim is chosen by a second-chance clock over the frame table; its
//! contents are then saved where the next fault will find them:
//!
//! | Page                                   | Goes to                  |
//! |----------------------------------------|--------------------------|
//! | mmap page, dirty                       | its file                 |
//! | mmap page, clean                       | nowhere, re-read on fault|
//! | executable page, clean and unmodified  | nowhere, re-read on fault|
//! | anything else                          | a swap slot              |
//!
//! The whole sequence runs under the eviction lock, so two evictions never
//! race for the same victim and nobody reuses a frame mid-save.

use crate::clock::Probe;
use crate::error::{VmFatal, halt};
use crate::frame::FrameEntry;
use crate::page::Disposal;
use crate::swap::{SwapDevice, SwapSlot};
use crate::vm::Vm;
use crate::{Platform, Tid};
use kernel_alloc::PagePool;
use kernel_memory_addresses::{PhysicalPage, VirtualPage};
use kernel_vmem::PageDirectory;

impl<P: Platform> Vm<P> {
    /// Free up a frame for `requester` by evicting a resident page.
    ///
    /// The frame comes back zeroed, registered to `requester` and unbound.
    /// Halts if no frame can be evicted.
    pub(crate) fn evict_one(&self, requester: Tid) -> PhysicalPage {
        let _evicting = self.eviction.lock();
        loop {
            // Someone may have released a frame while we waited for the lock.
            if let Some(frame) = self.pool.get_page(true) {
                self.frames.lock().register(frame, requester);
                return frame;
            }
            let Some(victim) = self.select_victim() else {
                halt(VmFatal::NoVictim);
            };
            if let Some(frame) = self.evict(victim, requester) {
                return frame;
            }
        }
    }

    /// Run the clock over bound frames whose owner still maps them.
    fn select_victim(&self) -> Option<FrameEntry> {
        let mut frames = self.frames.lock();
        frames.select_victim(|entry, page| {
            let Some(space) = self.spaces.lock().get(&entry.owner).cloned() else {
                return Probe::Skip;
            };
            let directory = &space.directory;
            if directory.get_mapping(page) != Some(entry.frame) {
                Probe::Skip
            } else if directory.is_accessed(page) {
                directory.clear_accessed(page);
                log::trace!("clock: {page} of {} gets a second chance", entry.owner);
                Probe::Accessed
            } else {
                Probe::Idle
            }
        })
    }

    /// Evict `victim` and hand its frame to `requester`.
    ///
    /// Returns `None` if the victim changed before its owner's page table
    /// could be locked; the caller picks another.
    fn evict(&self, victim: FrameEntry, requester: Tid) -> Option<PhysicalPage> {
        let page = victim.page?;
        let space = self.address_space(victim.owner)?;
        let mut pages = space.pages.lock();
        let directory = &space.directory;
        let unchanged = self.frames.lock().get(victim.frame) == Some(victim)
            && directory.get_mapping(page) == Some(victim.frame);
        if !unchanged {
            log::trace!("victim {} changed hands, rescanning", victim.frame);
            return None;
        }

        let dirty = directory.is_dirty(page);
        let writable = directory.is_writable(page);
        // The owner faults from here on, and waits on `pages` until we are done.
        directory.clear_mapping(page);

        let descriptor = pages.get_or_insert_anonymous(page, writable);
        let disposal = descriptor.disposal(dirty);
        log::debug!(
            "evicting {page} of {} from {}: {disposal:?}",
            victim.owner,
            victim.frame
        );
        let slot = match disposal {
            Disposal::Drop => None,
            Disposal::WriteBack => {
                self.write_back(descriptor, victim.frame);
                None
            }
            Disposal::Swap => Some(self.swap_out(page, victim.frame)),
        };
        descriptor.mark_evicted(slot, writable);

        self.pool.with_page(victim.frame, |bytes| bytes.fill(0));
        self.frames.lock().reassign(victim.frame, requester);
        drop(pages);
        Some(victim.frame)
    }

    fn swap_out(&self, page: VirtualPage, frame: PhysicalPage) -> SwapSlot {
        let slot = self
            .swap
            .alloc_slot()
            .unwrap_or_else(|source| halt(VmFatal::SwapOut { page, source }));
        if let Err(source) = self
            .pool
            .with_page(frame, |bytes| self.swap.write_slot(slot, bytes))
        {
            halt(VmFatal::SwapOut { page, source });
        }
        log::debug!("swapped out {page} to {slot}");
        slot
    }
}
