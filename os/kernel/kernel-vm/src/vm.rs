use crate::error::{FaultError, InstallError, SptError};
use crate::file::{FileSpan, page_share};
use crate::frame::FrameTable;
use crate::page::{Backing, PageDescriptor, PageSummary};
use crate::space::AddressSpace;
use crate::{Platform, Tid};
use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use kernel_info::memory::{MAX_STACK_SIZE, STACK_SLACK, USER_STACK_TOP};
use kernel_memory_addresses::{
    PAGE_SIZE_U64, PhysicalPage, VirtualAddress, VirtualPage, VirtualPageRange,
};
use kernel_vmem::PageDirectory;
use spin::Mutex;

/// Where the user stack lives and how far it may grow.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct StackLimits {
    /// One past the highest stack byte.
    pub top: u64,
    pub max_size: u64,
    /// How far below the stack pointer an access still counts as a push.
    pub slack: u64,
}

impl Default for StackLimits {
    fn default() -> Self {
        Self {
            top: USER_STACK_TOP,
            max_size: MAX_STACK_SIZE,
            slack: STACK_SLACK,
        }
    }
}

impl StackLimits {
    /// Lowest address the stack may reach.
    #[must_use]
    pub const fn floor(&self) -> u64 {
        self.top - self.max_size
    }

    /// Whether an access to `addr` with the stack pointer at `sp` may grow the
    /// stack.
    ///
    /// # Errors
    /// - [`FaultError::Unmapped`] if `addr` is too far below `sp` or not in
    ///   the stack region at all,
    /// - [`FaultError::StackOverflow`] if it is a push beyond the maximum
    ///   stack size.
    pub const fn check_growth(
        &self,
        addr: VirtualAddress,
        sp: VirtualAddress,
    ) -> Result<(), FaultError> {
        let a = addr.as_u64();
        if a < sp.as_u64().saturating_sub(self.slack) || a >= self.top {
            Err(FaultError::Unmapped(addr))
        } else if a < self.floor() {
            Err(FaultError::StackOverflow(addr))
        } else {
            Ok(())
        }
    }
}

/// The virtual memory manager.
///
/// One per kernel. Owns the frame table and the registry of user address
/// spaces, and borrows its storage from the page pool and swap device it was
/// built with.
pub struct Vm<P: Platform> {
    pub(crate) pool: P::Pool,
    pub(crate) swap: P::Swap,
    pub(crate) frames: Mutex<FrameTable>,
    /// Serializes evictions, and keeps mapping and process teardown out of
    /// their way.
    pub(crate) eviction: Mutex<()>,
    pub(crate) spaces: Mutex<BTreeMap<Tid, Arc<AddressSpace<P>>>>,
    limits: StackLimits,
}

impl<P: Platform> Vm<P> {
    #[must_use]
    pub fn new(pool: P::Pool, swap: P::Swap) -> Self {
        Self {
            pool,
            swap,
            frames: Mutex::new(FrameTable::new()),
            eviction: Mutex::new(()),
            spaces: Mutex::new(BTreeMap::new()),
            limits: StackLimits::default(),
        }
    }

    #[must_use]
    pub fn with_stack_limits(mut self, limits: StackLimits) -> Self {
        self.limits = limits;
        self
    }

    #[must_use]
    pub const fn stack_limits(&self) -> &StackLimits {
        &self.limits
    }

    #[must_use]
    pub const fn pool(&self) -> &P::Pool {
        &self.pool
    }

    #[must_use]
    pub const fn swap(&self) -> &P::Swap {
        &self.swap
    }

    #[must_use]
    pub fn address_space(&self, tid: Tid) -> Option<Arc<AddressSpace<P>>> {
        self.spaces.lock().get(&tid).cloned()
    }

    /// # Panics
    /// If `tid` has no address space.
    pub(crate) fn space(&self, tid: Tid) -> Arc<AddressSpace<P>> {
        let Some(space) = self.address_space(tid) else {
            panic!("unknown {tid}");
        };
        space
    }

    /// The descriptor of `page` in `tid`, if any. `None` as well once `tid`
    /// has no address space.
    #[must_use]
    pub fn lookup_page(&self, tid: Tid, page: VirtualPage) -> Option<PageSummary> {
        self.address_space(tid)?
            .pages
            .lock()
            .get(page)
            .map(PageDescriptor::summary)
    }

    /// Add a descriptor for a page that is not loaded yet.
    ///
    /// # Errors
    /// [`SptError::Duplicate`] if the page already has one.
    ///
    /// # Panics
    /// If `tid` has no address space.
    pub fn insert_page(
        &self,
        tid: Tid,
        descriptor: PageDescriptor<P::File>,
    ) -> Result<(), SptError> {
        self.space(tid).pages.lock().insert(descriptor)
    }

    /// Describe an executable segment for lazy loading.
    ///
    /// The segment occupies `read_bytes + zero_bytes` bytes from `base`; the
    /// first `read_bytes` come from `file` at `offset`, the rest is zero.
    /// Pages with nothing to read are plain anonymous pages.
    ///
    /// # Errors
    /// [`SptError::Duplicate`] if any page of the segment already has a
    /// descriptor. No descriptor is added in that case.
    ///
    /// # Panics
    /// If the segment size overflows or is not a whole number of pages, if
    /// `offset + read_bytes` overflows, or if `tid` has no address space.
    #[allow(clippy::too_many_arguments)]
    pub fn register_segment(
        &self,
        tid: Tid,
        file: &Arc<P::File>,
        offset: u64,
        base: VirtualPage,
        read_bytes: u64,
        zero_bytes: u64,
        writable: bool,
    ) -> Result<(), SptError> {
        let Some(size) = read_bytes.checked_add(zero_bytes) else {
            panic!("segment at {base} overflows: {read_bytes:#x} + {zero_bytes:#x} bytes");
        };
        assert!(
            size.is_multiple_of(PAGE_SIZE_U64),
            "segment at {base} is not page sized: {size:#x} bytes"
        );
        assert!(
            offset.checked_add(read_bytes).is_some(),
            "segment at {base} reads beyond any file offset: {offset:#x} + {read_bytes:#x}"
        );
        let range = VirtualPageRange::covering(base, size);
        let space = self.space(tid);
        let mut pages = space.pages.lock();
        if let Some(page) = range.iter().find(|&page| pages.contains(page)) {
            return Err(SptError::Duplicate(page));
        }

        let mut remaining = read_bytes;
        let mut offset = offset;
        for page in range.iter() {
            let share = remaining.min(PAGE_SIZE_U64);
            let backing = if share == 0 {
                Backing::Anonymous
            } else {
                Backing::Executable(FileSpan::new(Arc::clone(file), offset, page_share(share)))
            };
            pages.insert(PageDescriptor::new(page, backing, writable))?;
            remaining -= share;
            offset += share;
        }
        log::debug!(
            "{tid}: segment of {} pages at {base}, {read_bytes:#x} bytes from file",
            range.len()
        );
        Ok(())
    }

    /// Map `frame` at `page` of `tid` and bind it there.
    ///
    /// `frame` must come from [`allocate_frame`](Self::allocate_frame) for
    /// `tid`. On failure it is released.
    ///
    /// # Errors
    /// - [`InstallError::AlreadyMapped`] if `page` is mapped or described,
    /// - [`InstallError::Map`] if the page directory cannot take the mapping.
    ///
    /// # Panics
    /// If `tid` has no address space.
    pub fn install_page(
        &self,
        tid: Tid,
        page: VirtualPage,
        frame: PhysicalPage,
        writable: bool,
    ) -> Result<(), InstallError> {
        let space = self.space(tid);
        let pages = space.pages.lock();
        let result = if pages.contains(page) || space.directory.get_mapping(page).is_some() {
            Err(InstallError::AlreadyMapped(page))
        } else {
            space
                .directory
                .set_mapping(page, frame, writable)
                .map_err(InstallError::from)
        };
        match result {
            Ok(()) => self.bind(frame, page),
            Err(_) => self.free_frame(frame),
        }
        drop(pages);
        result
    }

    /// Give `tid` its first stack page, zeroed, directly below the stack top.
    ///
    /// Returns the initial stack pointer.
    ///
    /// # Errors
    /// See [`install_page`](Self::install_page).
    ///
    /// # Panics
    /// If `tid` has no address space.
    pub fn setup_stack(&self, tid: Tid) -> Result<VirtualAddress, InstallError> {
        let top = VirtualAddress::new(self.limits.top);
        let frame = self.allocate_frame(tid, true);
        self.install_page(tid, (top - PAGE_SIZE_U64).page(), frame, true)?;
        Ok(top)
    }
}
