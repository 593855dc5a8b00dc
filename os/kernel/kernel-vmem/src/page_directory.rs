//! A page directory kept in ordinary memory.

use crate::{MapError, PageDirectory, PageEntryBits};
use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use kernel_memory_addresses::{PhysicalPage, VirtualPage};
use spin::Mutex;

/// Software page directory.
///
/// Stores one [`PageEntryBits`] leaf per mapped page and updates the
/// accessed/dirty bits the way the MMU would when [`PageDirectory::record_access`]
/// reports an access.
///
/// An optional entry limit stands in for running out of page-table memory:
/// once `limit` pages are mapped, mapping a further page fails with
/// [`MapError::OutOfMemory`].
#[derive(Default)]
pub struct SoftPageDirectory {
    entries: Mutex<BTreeMap<VirtualPage, PageEntryBits>>,
    limit: Option<usize>,
}

impl SoftPageDirectory {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            limit: None,
        }
    }

    /// A directory that refuses to hold more than `limit` mappings.
    #[must_use]
    pub const fn with_limit(limit: usize) -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            limit: Some(limit),
        }
    }

    /// All currently mapped pages, in address order.
    #[must_use]
    pub fn mapped_pages(&self) -> Vec<VirtualPage> {
        self.entries.lock().keys().copied().collect()
    }

    /// Raw entry of `page`, if mapped.
    #[must_use]
    pub fn entry(&self, page: VirtualPage) -> Option<PageEntryBits> {
        self.entries.lock().get(&page).copied()
    }

    fn query(&self, page: VirtualPage, f: impl FnOnce(&PageEntryBits) -> bool) -> bool {
        self.entries.lock().get(&page).is_some_and(f)
    }
}

impl PageDirectory for SoftPageDirectory {
    fn get_mapping(&self, page: VirtualPage) -> Option<PhysicalPage> {
        self.entry(page).map(|e| e.frame())
    }

    fn set_mapping(
        &self,
        page: VirtualPage,
        frame: PhysicalPage,
        writable: bool,
    ) -> Result<(), MapError> {
        let mut entries = self.entries.lock();
        let full = self.limit.is_some_and(|limit| entries.len() >= limit);
        if full && !entries.contains_key(&page) {
            return Err(MapError::OutOfMemory(page));
        }
        entries.insert(page, PageEntryBits::user_leaf(frame, writable));
        Ok(())
    }

    fn clear_mapping(&self, page: VirtualPage) {
        self.entries.lock().remove(&page);
    }

    fn is_dirty(&self, page: VirtualPage) -> bool {
        self.query(page, PageEntryBits::dirty)
    }

    fn is_accessed(&self, page: VirtualPage) -> bool {
        self.query(page, PageEntryBits::accessed)
    }

    fn clear_accessed(&self, page: VirtualPage) {
        if let Some(e) = self.entries.lock().get_mut(&page) {
            e.set_accessed(false);
        }
    }

    fn is_writable(&self, page: VirtualPage) -> bool {
        self.query(page, PageEntryBits::writable)
    }

    fn record_access(&self, page: VirtualPage, write: bool) -> bool {
        let mut entries = self.entries.lock();
        let Some(e) = entries.get_mut(&page) else {
            return false;
        };
        if write && !e.writable() {
            return false;
        }
        e.set_accessed(true);
        if write {
            e.set_dirty(true);
        }
        true
    }
}
