//! # Fault Resolution
//!
//! Turns a page fault on a user address into a resident page, or into an
//! error that gets the process killed.
//!
//! ```text
//!  fault at addr
//!     │
//!     ├─ kernel address / protection violation ───────────► FaultError
//!     ├─ already mapped ──────────────────────────────────► Ok (spurious)
//!     ├─ descriptor, not resident ─► frame ◄─ swap | file | zeros ─► map ─► Ok
//!     ├─ no descriptor, push just below sp, within stack ─► zeroed frame ─► Ok
//!     └─ otherwise ───────────────────────────────────────► FaultError
//! ```
//!
//! The syscall layer goes through the same path: [`Vm::check_user_buffer`]
//! faults a user buffer in before the kernel touches it, and
//! [`Vm::copy_to_user`] / [`Vm::copy_from_user`] copy through the frames while
//! recording the accessed and dirty bits the MMU would have set.

use crate::error::{FaultError, VmFatal, halt};
use crate::page::Location;
use crate::space::AddressSpace;
use crate::swap::SwapDevice;
use crate::vm::Vm;
use crate::{Platform, Tid};
use bitfield_struct::bitfield;
use kernel_alloc::PagePool;
use kernel_info::memory::USER_SPACE_END;
use kernel_memory_addresses::{PAGE_SIZE, PageBytes, VirtualAddress};
use kernel_vmem::PageDirectory;

/// Page-fault error code, as pushed by the CPU.
///
/// Reference: Intel SDM Vol. 3A, §6.15 "Page-Fault Exception (#PF)".
#[bitfield(u32)]
pub struct PageFaultCode {
    /// 0 = non-present page.
    /// 1 = protection violation (page present but access disallowed).
    pub present: bool, // bit 0

    /// 0 = read or execute.
    /// 1 = write access.
    pub write: bool, // bit 1

    /// 0 = supervisor.
    /// 1 = user mode.
    pub user: bool, // bit 2

    #[bits(29)]
    __: u32,
}

impl PageFaultCode {
    /// A not-present fault raised by user code.
    #[must_use]
    pub const fn user_access(write: bool) -> Self {
        Self::new().with_user(true).with_write(write)
    }

    #[must_use]
    pub const fn explain(&self) -> &'static str {
        match (self.present(), self.write()) {
            (false, _) => "non-present page",
            (true, true) => "write to protected page",
            (true, false) => "read of protected page",
        }
    }
}

/// Everything the fault handler knows about a fault.
#[derive(Debug, Copy, Clone)]
pub struct PageFault {
    /// The faulting address (CR2).
    pub address: VirtualAddress,
    /// User stack pointer at the time of the fault.
    pub stack_pointer: VirtualAddress,
    pub code: PageFaultCode,
}

impl PageFault {
    /// A not-present fault from user code.
    #[must_use]
    pub const fn user(address: VirtualAddress, stack_pointer: VirtualAddress, write: bool) -> Self {
        Self {
            address,
            stack_pointer,
            code: PageFaultCode::user_access(write),
        }
    }
}

impl<P: Platform> Vm<P> {
    /// Make the page at `fault.address` resident in `tid`.
    ///
    /// # Errors
    /// The access is illegal and the process must die:
    /// - [`FaultError::KernelAddress`] for addresses outside user space,
    /// - [`FaultError::ProtectionViolation`] for faults on present pages and
    ///   writes to read-only pages,
    /// - [`FaultError::Unmapped`] if nothing lives at the address,
    /// - [`FaultError::StackOverflow`] for stack growth beyond the stack limit,
    /// - [`FaultError::PageTable`] if the page directory cannot map the page.
    ///
    /// # Panics
    /// If `tid` has no address space.
    pub fn resolve_fault(&self, tid: Tid, fault: PageFault) -> Result<(), FaultError> {
        let result = self.try_resolve(tid, fault);
        if let Err(err) = &result {
            log::warn!("{tid}: illegal access ({}): {err}", fault.code.explain());
        }
        result
    }

    fn try_resolve(&self, tid: Tid, fault: PageFault) -> Result<(), FaultError> {
        let addr = fault.address;
        if addr.as_u64() >= USER_SPACE_END {
            return Err(FaultError::KernelAddress(addr));
        }
        if fault.code.present() {
            return Err(FaultError::ProtectionViolation(addr));
        }

        let space = self.space(tid);
        let page = addr.page();
        if space.directory.get_mapping(page).is_some() {
            return Ok(());
        }

        let described = space.pages.lock().get(page).map(|d| (d.location(), d.writable()));
        match described {
            Some((_, false)) if fault.code.write() => Err(FaultError::ProtectionViolation(addr)),
            Some((Location::Resident(_), _)) => Ok(()),
            Some(_) => self.load_page(tid, &space, addr),
            None => {
                self.stack_limits().check_growth(addr, fault.stack_pointer)?;
                self.grow_stack(tid, &space, addr)
            }
        }
    }

    /// Bring a described page back into a fresh frame.
    fn load_page(
        &self,
        tid: Tid,
        space: &AddressSpace<P>,
        addr: VirtualAddress,
    ) -> Result<(), FaultError> {
        let page = addr.page();
        let frame = self.allocate_frame(tid, false);
        let mut pages = space.pages.lock();
        let descriptor = match pages.get_mut(page) {
            Some(d) if !d.is_resident() => d,
            other => {
                let resident = other.is_some();
                drop(pages);
                self.free_frame(frame);
                return if resident {
                    Ok(())
                } else {
                    Err(FaultError::Unmapped(addr))
                };
            }
        };

        let location = descriptor.location();
        self.pool.with_page(frame, |bytes| match (location, descriptor.span()) {
            (Location::Swapped(slot), _) => {
                if let Err(source) = self.swap.read_slot(slot, bytes) {
                    halt(VmFatal::SwapIn { page, source });
                }
            }
            (_, Some(span)) => span.load_into(bytes),
            (_, None) => bytes.fill(0),
        });

        if let Err(err) = space
            .directory
            .set_mapping(page, frame, descriptor.writable())
        {
            drop(pages);
            self.free_frame(frame);
            return Err(FaultError::PageTable(page, err));
        }
        if let Location::Swapped(slot) = location {
            self.swap.free_slot(slot);
        }
        descriptor.mark_resident(frame);
        self.bind(frame, page);
        drop(pages);
        log::debug!("{tid}: loaded {page} into {frame} from {location:?}");
        Ok(())
    }

    /// Add a zeroed stack page below the current stack.
    fn grow_stack(
        &self,
        tid: Tid,
        space: &AddressSpace<P>,
        addr: VirtualAddress,
    ) -> Result<(), FaultError> {
        let page = addr.page();
        let frame = self.allocate_frame(tid, true);
        let pages = space.pages.lock();
        let taken = pages.contains(page) || space.directory.get_mapping(page).is_some();
        let mapped = if taken {
            Ok(())
        } else {
            space.directory.set_mapping(page, frame, true)
        };
        match mapped {
            Ok(()) if !taken => {
                self.bind(frame, page);
                log::debug!("{tid}: stack grown to {page}");
                Ok(())
            }
            Ok(()) => {
                drop(pages);
                self.free_frame(frame);
                Ok(())
            }
            Err(err) => {
                drop(pages);
                self.free_frame(frame);
                Err(FaultError::PageTable(page, err))
            }
        }
    }

    /// Fault in every page of the user buffer `[addr, addr + len)`.
    ///
    /// With `write` set, the buffer must also be writable. The pages may be
    /// evicted again right after; callers copy through
    /// [`copy_to_user`](Self::copy_to_user) and
    /// [`copy_from_user`](Self::copy_from_user), which fault them back in.
    ///
    /// # Errors
    /// As [`resolve_fault`](Self::resolve_fault).
    ///
    /// # Panics
    /// If `tid` has no address space.
    pub fn check_user_buffer(
        &self,
        tid: Tid,
        addr: VirtualAddress,
        len: usize,
        sp: VirtualAddress,
        write: bool,
    ) -> Result<(), FaultError> {
        self.for_each_user_page(tid, addr, len, sp, write, None::<fn(usize, usize, &mut PageBytes)>)
    }

    /// Copy `src` into user memory at `dst`.
    ///
    /// # Errors
    /// As [`check_user_buffer`](Self::check_user_buffer). Bytes before the
    /// failing page have been copied.
    ///
    /// # Panics
    /// If `tid` has no address space.
    pub fn copy_to_user(
        &self,
        tid: Tid,
        dst: VirtualAddress,
        src: &[u8],
        sp: VirtualAddress,
    ) -> Result<(), FaultError> {
        let copy = |done: usize, offset: usize, page: &mut PageBytes| {
            let n = (PAGE_SIZE - offset).min(src.len() - done);
            page[offset..offset + n].copy_from_slice(&src[done..done + n]);
        };
        self.for_each_user_page(tid, dst, src.len(), sp, true, Some(copy))
    }

    /// Copy user memory at `src` into `dst`.
    ///
    /// # Errors
    /// As [`check_user_buffer`](Self::check_user_buffer).
    ///
    /// # Panics
    /// If `tid` has no address space.
    pub fn copy_from_user(
        &self,
        tid: Tid,
        src: VirtualAddress,
        dst: &mut [u8],
        sp: VirtualAddress,
    ) -> Result<(), FaultError> {
        let len = dst.len();
        let copy = |done: usize, offset: usize, page: &mut PageBytes| {
            let n = (PAGE_SIZE - offset).min(len - done);
            dst[done..done + n].copy_from_slice(&page[offset..offset + n]);
        };
        self.for_each_user_page(tid, src, len, sp, false, Some(copy))
    }

    /// Walk the user pages of `[addr, addr + len)`, faulting each one in.
    ///
    /// With `touch` given, it is called as `touch(bytes_done, offset_in_page,
    /// page_bytes)` with the page pinned, and the access is recorded in the
    /// page directory.
    #[allow(clippy::too_many_arguments)]
    fn for_each_user_page(
        &self,
        tid: Tid,
        addr: VirtualAddress,
        len: usize,
        sp: VirtualAddress,
        write: bool,
        mut touch: Option<impl FnMut(usize, usize, &mut PageBytes)>,
    ) -> Result<(), FaultError> {
        if len == 0 {
            return Ok(());
        }
        let end = addr
            .checked_add(len as u64)
            .filter(|end| end.as_u64() <= USER_SPACE_END)
            .ok_or(FaultError::KernelAddress(addr))?;

        let space = self.space(tid);
        let mut cursor = addr;
        while cursor < end {
            let fault = PageFault::user(cursor, sp, write);
            match touch.as_mut() {
                Some(touch) => {
                    let done = usize::try_from(cursor.as_u64() - addr.as_u64())
                        .map_err(|_| FaultError::KernelAddress(cursor))?;
                    let offset = cursor.page_offset();
                    self.with_resident(tid, &space, fault, |bytes| touch(done, offset, bytes))?;
                }
                None => self.ensure_resident(tid, &space, fault)?,
            }
            cursor = cursor.page().next().base().min(end);
        }
        Ok(())
    }

    /// Fault in the page at `fault.address` unless it is mapped, and check
    /// that it allows the access.
    ///
    /// The writable bit is only read while the page is seen mapped under the
    /// owner's descriptor lock; an eviction in between sends us round again.
    fn ensure_resident(
        &self,
        tid: Tid,
        space: &AddressSpace<P>,
        fault: PageFault,
    ) -> Result<(), FaultError> {
        let page = fault.address.page();
        loop {
            {
                let _pinned = space.pages.lock();
                if space.directory.get_mapping(page).is_some() {
                    if fault.code.write() && !space.directory.is_writable(page) {
                        return Err(FaultError::ProtectionViolation(fault.address));
                    }
                    return Ok(());
                }
            }
            self.resolve_fault(tid, fault)?;
        }
    }

    /// Run `f` on the frame of the page at `fault.address`, faulting it in
    /// first if needed.
    ///
    /// The owner's descriptors stay locked while `f` runs, so eviction cannot
    /// take the frame away underneath it.
    fn with_resident(
        &self,
        tid: Tid,
        space: &AddressSpace<P>,
        fault: PageFault,
        f: impl FnOnce(&mut PageBytes),
    ) -> Result<(), FaultError> {
        let page = fault.address.page();
        let mut f = Some(f);
        loop {
            {
                let _pinned = space.pages.lock();
                if let Some(frame) = space.directory.get_mapping(page) {
                    if !space.directory.record_access(page, fault.code.write()) {
                        return Err(FaultError::ProtectionViolation(fault.address));
                    }
                    if let Some(f) = f.take() {
                        self.pool.with_page(frame, f);
                    }
                    return Ok(());
                }
            }
            self.resolve_fault(tid, fault)?;
        }
    }
}
