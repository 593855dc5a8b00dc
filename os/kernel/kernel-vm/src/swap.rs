use crate::error::SwapError;
use core::fmt;
use kernel_memory_addresses::PageBytes;

/// Index of one page-sized slot on the swap device.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct SwapSlot(pub u32);

impl fmt::Display for SwapSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot {}", self.0)
    }
}

/// A fixed number of page-sized slots on a block device.
///
/// Each call is an individually thread-safe operation. A slot returned by
/// [`alloc_slot`](Self::alloc_slot) is owned by exactly one page descriptor
/// until it is released with [`free_slot`](Self::free_slot).
pub trait SwapDevice: Send + Sync {
    /// Claim a free slot.
    ///
    /// # Errors
    /// [`SwapError::Full`] if every slot is taken.
    fn alloc_slot(&self) -> Result<SwapSlot, SwapError>;

    fn free_slot(&self, slot: SwapSlot);

    /// Store a full page in `slot`.
    ///
    /// # Errors
    /// [`SwapError::Io`] if the device could not be written.
    fn write_slot(&self, slot: SwapSlot, page: &PageBytes) -> Result<(), SwapError>;

    /// Read the full page stored in `slot`.
    ///
    /// # Errors
    /// [`SwapError::Io`] if the device could not be read.
    fn read_slot(&self, slot: SwapSlot, page: &mut PageBytes) -> Result<(), SwapError>;
}
