//! # Memory-Mapped Files
//!
//! `mmap` lays a file over a run of user pages. Nothing is read up front:
//! each page gets a descriptor that loads its slice of the file on the first
//! fault. Pages written by the process go back to the file when they are
//! evicted or unmapped; they never take up swap.

use crate::error::{MmapError, VmFatal, halt};
use crate::file::{FileSpan, VmFile, page_share};
use crate::page::{Backing, Location, PageDescriptor};
use crate::space::AddressSpace;
use crate::vm::Vm;
use crate::{Platform, Tid};
use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;
use kernel_alloc::PagePool;
use kernel_info::memory::USER_SPACE_END;
use kernel_memory_addresses::{PhysicalPage, VirtualAddress, VirtualPage, VirtualPageRange};
use kernel_vmem::PageDirectory;

/// Identifier of a mapping, unique within its address space.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct MapId(pub u32);

impl fmt::Display for MapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One live mapping.
pub(crate) struct Mapping<F> {
    /// The reopened handle. Closed when the mapping and all its pages are gone.
    pub(crate) file: Arc<F>,
    pub(crate) pages: VirtualPageRange,
}

/// The mappings of one address space.
pub(crate) struct MmapTable<F> {
    next: u32,
    maps: BTreeMap<MapId, Mapping<F>>,
}

impl<F> MmapTable<F> {
    pub(crate) const fn new() -> Self {
        Self {
            next: 0,
            maps: BTreeMap::new(),
        }
    }

    fn insert(&mut self, mapping: Mapping<F>) -> MapId {
        let id = MapId(self.next);
        self.next += 1;
        self.maps.insert(id, mapping);
        id
    }

    pub(crate) fn remove(&mut self, id: MapId) -> Option<Mapping<F>> {
        self.maps.remove(&id)
    }

    pub(crate) fn ids(&self) -> Vec<MapId> {
        self.maps.keys().copied().collect()
    }

    fn overlaps(&self, page: VirtualPage) -> bool {
        self.maps.values().any(|m| m.pages.contains(page))
    }
}

impl<P: Platform> Vm<P> {
    /// Map `file`, open in `tid` as descriptor `fd`, at `addr`.
    ///
    /// The file is reopened, so the mapping outlives `fd`. Every page the file
    /// spans gets a descriptor; the tail of the last page reads as zero.
    ///
    /// # Errors
    /// Nothing is created when the request is rejected:
    /// - [`MmapError::NullAddress`], [`MmapError::Misaligned`] for a bad `addr`,
    /// - [`MmapError::ReservedDescriptor`] for the console descriptors 0 and 1,
    /// - [`MmapError::EmptyFile`] for a zero-length file,
    /// - [`MmapError::OutOfUserSpace`] if the range reaches kernel space,
    /// - [`MmapError::Overlap`] if a page is already described or mapped,
    /// - [`MmapError::ReopenFailed`] if the file cannot be reopened.
    ///
    /// # Panics
    /// If `tid` has no address space.
    pub fn mmap(
        &self,
        tid: Tid,
        fd: i32,
        file: &P::File,
        addr: VirtualAddress,
    ) -> Result<MapId, MmapError> {
        if addr.is_null() {
            return Err(MmapError::NullAddress);
        }
        let Ok(base) = VirtualPage::try_from(addr) else {
            return Err(MmapError::Misaligned(addr));
        };
        if fd == 0 || fd == 1 {
            return Err(MmapError::ReservedDescriptor(fd));
        }
        let length = file.length();
        if length == 0 {
            return Err(MmapError::EmptyFile);
        }
        let pages = VirtualPageRange::covering(base, length);
        if pages.end().is_none_or(|end| end.as_u64() > USER_SPACE_END) {
            return Err(MmapError::OutOfUserSpace(addr));
        }

        let space = self.space(tid);
        let mut maps = space.mmaps.lock();
        let mut descriptors = space.pages.lock();
        if let Some(page) = pages.iter().find(|&page| {
            descriptors.contains(page)
                || maps.overlaps(page)
                || space.directory.get_mapping(page).is_some()
        }) {
            return Err(MmapError::Overlap(page));
        }

        let file = Arc::new(file.reopen().ok_or(MmapError::ReopenFailed)?);
        let id = maps.insert(Mapping {
            file: Arc::clone(&file),
            pages,
        });
        for page in pages.iter() {
            let offset = page.base().as_u64() - addr.as_u64();
            let read_bytes = page_share(length - offset);
            let span = FileSpan::new(Arc::clone(&file), offset, read_bytes);
            let inserted = descriptors.insert(PageDescriptor::new(
                page,
                Backing::Mapped { map: id, span },
                true,
            ));
            debug_assert!(inserted.is_ok(), "overlap check missed {page}");
        }
        log::info!(
            "{tid}: mapped {} pages at {} as mapping {id}",
            pages.len(),
            pages.start()
        );
        Ok(id)
    }

    /// Remove mapping `id` of `tid`, writing dirty pages back to the file.
    ///
    /// # Errors
    /// [`MmapError::UnknownMapping`] if `tid` has no such mapping.
    ///
    /// # Panics
    /// If `tid` has no address space.
    pub fn munmap(&self, tid: Tid, id: MapId) -> Result<(), MmapError> {
        let space = self.space(tid);
        let _evicting = self.eviction.lock();
        self.unmap(&space, id)
    }

    /// Tear down one mapping. The caller holds the eviction lock.
    pub(crate) fn unmap(&self, space: &AddressSpace<P>, id: MapId) -> Result<(), MmapError> {
        let mut maps = space.mmaps.lock();
        let mapping = maps.remove(id).ok_or(MmapError::UnknownMapping(id))?;
        let mut descriptors = space.pages.lock();
        let mut written = 0usize;
        for page in mapping.pages.iter() {
            let Some(descriptor) = descriptors.remove(page) else {
                continue;
            };
            match descriptor.location() {
                Location::Resident(frame) => {
                    if space.directory.is_dirty(page) {
                        self.write_back(&descriptor, frame);
                        written += 1;
                    }
                    space.directory.clear_mapping(page);
                    self.free_frame(frame);
                }
                Location::Unloaded => {}
                Location::Swapped(slot) => {
                    panic!("mapped page {page} of {} found in swap {slot}", space.tid());
                }
            }
        }
        drop(descriptors);
        drop(mapping.file);
        log::info!(
            "{}: unmapped mapping {id}, {written} pages written back",
            space.tid()
        );
        Ok(())
    }

    /// Write a resident file-backed page to its file.
    ///
    /// Halts if the file takes fewer bytes than the page holds for it.
    pub(crate) fn write_back(&self, descriptor: &PageDescriptor<P::File>, frame: PhysicalPage) {
        let Some(span) = descriptor.span() else {
            return;
        };
        let written = self.pool.with_page(frame, |bytes| span.store_from(bytes));
        if written != span.read_bytes {
            halt(VmFatal::ShortWriteBack {
                page: descriptor.page(),
                expected: span.read_bytes,
                written,
            });
        }
        log::debug!(
            "wrote back {} ({written} bytes at offset {:#x})",
            descriptor.page(),
            span.offset
        );
    }
}
