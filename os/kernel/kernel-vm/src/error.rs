use crate::mmap::MapId;
use crate::swap::SwapSlot;
use kernel_memory_addresses::{VirtualAddress, VirtualPage};
use kernel_vmem::MapError;

/// An access the fault handler refuses to resolve.
///
/// The faulting process gets killed; the kernel carries on.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FaultError {
    #[error("access to kernel address {0}")]
    KernelAddress(VirtualAddress),
    #[error("protection violation at {0}")]
    ProtectionViolation(VirtualAddress),
    #[error("no page at {0}")]
    Unmapped(VirtualAddress),
    #[error("stack access at {0} outside the stack limit")]
    StackOverflow(VirtualAddress),
    #[error("could not map {0}: {1}")]
    PageTable(VirtualPage, MapError),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MmapError {
    #[error("cannot map at the null address")]
    NullAddress,
    #[error("mapping address {0} is not page aligned")]
    Misaligned(VirtualAddress),
    #[error("descriptor {0} cannot be mapped")]
    ReservedDescriptor(i32),
    #[error("cannot map an empty file")]
    EmptyFile,
    #[error("mapping at {0} extends past user space")]
    OutOfUserSpace(VirtualAddress),
    #[error("mapping overlaps page {0}")]
    Overlap(VirtualPage),
    #[error("could not reopen the file")]
    ReopenFailed,
    #[error("no mapping with id {0}")]
    UnknownMapping(MapId),
}

/// Error returned when adding a page descriptor.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SptError {
    #[error("page {0} already has a descriptor")]
    Duplicate(VirtualPage),
}

/// Error returned by [`install_page`](crate::Vm::install_page).
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InstallError {
    #[error("page {0} is already mapped")]
    AlreadyMapped(VirtualPage),
    #[error(transparent)]
    Map(#[from] MapError),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SwapError {
    #[error("no free swap slot")]
    Full,
    #[error("I/O error on swap {0}")]
    Io(SwapSlot),
}

/// A condition the kernel cannot recover from.
///
/// Only ever handed to [`halt`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VmFatal {
    #[error("no frame can be evicted")]
    NoVictim,
    #[error("cannot swap out {page}: {source}")]
    SwapOut { page: VirtualPage, source: SwapError },
    #[error("cannot swap in {page}: {source}")]
    SwapIn { page: VirtualPage, source: SwapError },
    #[error("short write-back of {page}: {written} of {expected} bytes")]
    ShortWriteBack {
        page: VirtualPage,
        expected: usize,
        written: usize,
    },
}

/// Stop the kernel.
///
/// # Panics
/// Always.
#[cold]
pub fn halt(reason: VmFatal) -> ! {
    log::error!("kernel halted: {reason}");
    panic!("kernel halted: {reason}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic(expected = "kernel halted: no frame can be evicted")]
    fn halt_panics_with_reason() {
        halt(VmFatal::NoVictim);
    }

    #[test]
    fn install_error_wraps_map_error() {
        let page = VirtualAddress::new(0x1000).page();
        let err: InstallError = MapError::OutOfMemory(page).into();
        assert_eq!(err, InstallError::Map(MapError::OutOfMemory(page)));
    }
}
