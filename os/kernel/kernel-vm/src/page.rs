//! # Supplemental Page Table
//!
//! Per-thread descriptors of user pages whose contents can be rebuilt when
//! they are not resident. The hardware page table only knows what is mapped
//! right now; this table knows where everything else went.

use crate::error::SptError;
use crate::file::FileSpan;
use crate::mmap::MapId;
use crate::swap::SwapSlot;
use alloc::collections::BTreeMap;
use kernel_memory_addresses::{PhysicalPage, VirtualPage};

/// Where a page's contents originally come from.
pub enum Backing<F> {
    /// Zero filled on first use; swap is its only store afterwards.
    Anonymous,
    /// A segment of an executable, loaded lazily.
    Executable(FileSpan<F>),
    /// A page of a memory-mapped file. Written back to the file, never swapped.
    Mapped { map: MapId, span: FileSpan<F> },
}

/// [`Backing`] without the file handle.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BackingKind {
    Anonymous,
    Executable,
    Mapped(MapId),
}

/// Where a page's contents are right now.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Location {
    Resident(PhysicalPage),
    /// Rebuilt from the backing on the next fault.
    Unloaded,
    Swapped(SwapSlot),
}

/// How eviction disposes of a page's contents.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Disposal {
    /// Nothing to save: the backing reproduces the page.
    Drop,
    /// Write the page back into its mapped file.
    WriteBack,
    Swap,
}

/// Descriptor of one user page.
pub struct PageDescriptor<F> {
    page: VirtualPage,
    backing: Backing<F>,
    location: Location,
    writable: bool,
    /// The page no longer matches its backing file.
    modified: bool,
}

/// A copy of a descriptor's state, as handed out by lookups.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PageSummary {
    pub page: VirtualPage,
    pub kind: BackingKind,
    pub location: Location,
    pub writable: bool,
    pub modified: bool,
}

impl<F> PageDescriptor<F> {
    /// A not-yet-loaded page with the given backing.
    #[must_use]
    pub const fn new(page: VirtualPage, backing: Backing<F>, writable: bool) -> Self {
        Self {
            page,
            backing,
            location: Location::Unloaded,
            writable,
            modified: false,
        }
    }

    #[must_use]
    pub const fn anonymous(page: VirtualPage, writable: bool) -> Self {
        Self::new(page, Backing::Anonymous, writable)
    }

    #[must_use]
    pub const fn page(&self) -> VirtualPage {
        self.page
    }

    #[must_use]
    pub const fn backing(&self) -> &Backing<F> {
        &self.backing
    }

    #[must_use]
    pub const fn location(&self) -> Location {
        self.location
    }

    #[must_use]
    pub const fn writable(&self) -> bool {
        self.writable
    }

    #[must_use]
    pub const fn is_resident(&self) -> bool {
        matches!(self.location, Location::Resident(_))
    }

    #[must_use]
    pub fn summary(&self) -> PageSummary {
        PageSummary {
            page: self.page,
            kind: match self.backing {
                Backing::Anonymous => BackingKind::Anonymous,
                Backing::Executable(_) => BackingKind::Executable,
                Backing::Mapped { map, .. } => BackingKind::Mapped(map),
            },
            location: self.location,
            writable: self.writable,
            modified: self.modified,
        }
    }

    /// The file span, for file-backed pages.
    pub(crate) fn span(&self) -> Option<&FileSpan<F>> {
        match &self.backing {
            Backing::Anonymous => None,
            Backing::Executable(span) | Backing::Mapped { span, .. } => Some(span),
        }
    }

    /// Decide what eviction does with this page, given the dirty bit of its
    /// mapping.
    pub(crate) fn disposal(&self, dirty: bool) -> Disposal {
        match self.backing {
            Backing::Mapped { .. } if dirty => Disposal::WriteBack,
            Backing::Mapped { .. } => Disposal::Drop,
            Backing::Executable(_) if !dirty && !self.modified => Disposal::Drop,
            Backing::Executable(_) | Backing::Anonymous => Disposal::Swap,
        }
    }

    pub(crate) fn mark_resident(&mut self, frame: PhysicalPage) {
        self.location = Location::Resident(frame);
    }

    /// Record an eviction.
    ///
    /// `writable` is the mapping's writable bit at the time of eviction.
    pub(crate) fn mark_evicted(&mut self, slot: Option<SwapSlot>, writable: bool) {
        self.writable = writable;
        match slot {
            Some(slot) => {
                self.location = Location::Swapped(slot);
                self.modified = !matches!(self.backing, Backing::Anonymous);
            }
            None => self.location = Location::Unloaded,
        }
    }
}

/// All descriptors of one thread.
pub(crate) struct PageTable<F> {
    pages: BTreeMap<VirtualPage, PageDescriptor<F>>,
}

impl<F> PageTable<F> {
    pub(crate) const fn new() -> Self {
        Self {
            pages: BTreeMap::new(),
        }
    }

    pub(crate) fn get(&self, page: VirtualPage) -> Option<&PageDescriptor<F>> {
        self.pages.get(&page)
    }

    pub(crate) fn get_mut(&mut self, page: VirtualPage) -> Option<&mut PageDescriptor<F>> {
        self.pages.get_mut(&page)
    }

    pub(crate) fn contains(&self, page: VirtualPage) -> bool {
        self.pages.contains_key(&page)
    }

    pub(crate) fn insert(&mut self, descriptor: PageDescriptor<F>) -> Result<(), SptError> {
        let page = descriptor.page;
        if self.pages.contains_key(&page) {
            return Err(SptError::Duplicate(page));
        }
        self.pages.insert(page, descriptor);
        Ok(())
    }

    /// The descriptor of `page`, creating an anonymous one if there is none.
    pub(crate) fn get_or_insert_anonymous(
        &mut self,
        page: VirtualPage,
        writable: bool,
    ) -> &mut PageDescriptor<F> {
        self.pages
            .entry(page)
            .or_insert_with(|| PageDescriptor::anonymous(page, writable))
    }

    pub(crate) fn remove(&mut self, page: VirtualPage) -> Option<PageDescriptor<F>> {
        self.pages.remove(&page)
    }

    pub(crate) fn len(&self) -> usize {
        self.pages.len()
    }

    /// Take every descriptor out of the table.
    pub(crate) fn drain(&mut self) -> impl Iterator<Item = PageDescriptor<F>> + use<F> {
        core::mem::take(&mut self.pages).into_values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::sync::Arc;
    use kernel_memory_addresses::VirtualAddress;

    struct NoFile;

    fn page(addr: u64) -> VirtualPage {
        VirtualAddress::new(addr).page()
    }

    fn span() -> FileSpan<NoFile> {
        FileSpan {
            file: Arc::new(NoFile),
            offset: 0,
            read_bytes: 100,
        }
    }

    #[test]
    fn mapped_pages_are_written_back_or_dropped() {
        let d = PageDescriptor::new(
            page(0x1000_0000),
            Backing::Mapped {
                map: MapId(0),
                span: span(),
            },
            true,
        );
        assert_eq!(d.disposal(true), Disposal::WriteBack);
        assert_eq!(d.disposal(false), Disposal::Drop);
    }

    #[test]
    fn executable_pages_swap_once_modified() {
        let mut d = PageDescriptor::new(page(0x0804_8000), Backing::Executable(span()), true);
        assert_eq!(d.disposal(false), Disposal::Drop);
        assert_eq!(d.disposal(true), Disposal::Swap);

        d.mark_evicted(Some(SwapSlot(4)), true);
        assert_eq!(d.location(), Location::Swapped(SwapSlot(4)));
        assert!(d.summary().modified);

        d.mark_resident(PhysicalPage::containing(0x0010_0000));
        assert_eq!(d.disposal(false), Disposal::Swap, "file copy is stale");
    }

    #[test]
    fn anonymous_pages_always_swap() {
        let mut d = PageDescriptor::<NoFile>::anonymous(page(0xBFFF_F000), true);
        assert_eq!(d.disposal(false), Disposal::Swap);
        d.mark_evicted(Some(SwapSlot(0)), false);
        let s = d.summary();
        assert_eq!(s.kind, BackingKind::Anonymous);
        assert!(!s.modified && !s.writable);
    }

    #[test]
    fn dropped_pages_become_unloaded() {
        let mut d = PageDescriptor::new(page(0x0804_8000), Backing::Executable(span()), false);
        d.mark_resident(PhysicalPage::containing(0x0010_0000));
        assert!(d.is_resident());
        d.mark_evicted(None, false);
        assert_eq!(d.location(), Location::Unloaded);
        assert!(!d.summary().modified);
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let mut table = PageTable::<NoFile>::new();
        table.insert(PageDescriptor::anonymous(page(0x1000), true)).unwrap();
        assert_eq!(
            table.insert(PageDescriptor::anonymous(page(0x1000), false)),
            Err(SptError::Duplicate(page(0x1000)))
        );
        assert_eq!(table.len(), 1);
        assert!(table.get(page(0x1000)).is_some_and(PageDescriptor::writable));
    }

    #[test]
    fn evicting_an_untracked_page_creates_an_anonymous_descriptor() {
        let mut table = PageTable::<NoFile>::new();
        let d = table.get_or_insert_anonymous(page(0xBFFF_E000), true);
        assert_eq!(d.summary().kind, BackingKind::Anonymous);
        assert!(table.contains(page(0xBFFF_E000)));
        assert_eq!(table.drain().count(), 1);
        assert_eq!(table.len(), 0);
    }
}
