#![allow(dead_code, clippy::cast_possible_truncation)]

use kernel_alloc::frame_alloc::BitmapPagePool;
use kernel_memory_addresses::{PAGE_SIZE, PageBytes, VirtualAddress, VirtualPage};
use kernel_vm::{Platform, SwapDevice, SwapError, SwapSlot, Tid, Vm, VmFile};
use kernel_vmem::{PageDirectory, SoftPageDirectory};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub struct TestPlatform;

impl Platform for TestPlatform {
    type Pool = BitmapPagePool;
    type Directory = SoftPageDirectory;
    type Swap = MemSwap;
    type File = MemFile;
}

pub type TestVm = Vm<TestPlatform>;

/// A VM with `frames` user frames and `slots` swap slots.
pub fn vm(frames: usize, slots: usize) -> TestVm {
    Vm::new(BitmapPagePool::new(frames), MemSwap::new(slots))
}

/// A VM with one address space, `tid 1`.
pub fn vm_with_process(frames: usize, slots: usize) -> TestVm {
    with_process(vm(frames, slots))
}

/// A VM with `frames` user frames on top of `swap`, and address space `tid 1`.
pub fn vm_with_swap(frames: usize, swap: MemSwap) -> TestVm {
    with_process(Vm::new(BitmapPagePool::new(frames), swap))
}

fn with_process(vm: TestVm) -> TestVm {
    vm.create_address_space(TID, SoftPageDirectory::new());
    vm
}

pub const TID: Tid = Tid(1);

/// Stack pointer far away from every test address below the stack.
pub const FAR_SP: VirtualAddress = VirtualAddress::new(0xBFFF_F000);

pub fn page(addr: u64) -> VirtualPage {
    VirtualAddress::new(addr).page()
}

/// A page worth of bytes derived from `seed`.
pub fn pattern(seed: u8) -> Vec<u8> {
    (0..PAGE_SIZE)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect()
}

/// Pretend user code touched `page`, as the MMU would record it.
pub fn touch(vm: &TestVm, tid: Tid, page: VirtualPage, write: bool) {
    let space = vm.address_space(tid).expect("address space");
    assert!(space.directory().record_access(page, write));
}

/// Evict whatever the clock picks by checking out one frame for `tid 99`,
/// then give the frame straight back.
pub fn force_eviction(vm: &TestVm) {
    let frame = vm.allocate_frame(Tid(99), false);
    vm.free_frame(frame);
}

/// Swap device held in memory.
pub struct MemSwap {
    slots: Mutex<Vec<Option<Box<PageBytes>>>>,
    writes: AtomicUsize,
    broken: bool,
}

impl MemSwap {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Mutex::new((0..capacity).map(|_| None).collect()),
            writes: AtomicUsize::new(0),
            broken: false,
        }
    }

    /// Slots can be claimed, but every write fails.
    pub fn broken(capacity: usize) -> Self {
        Self {
            broken: true,
            ..Self::new(capacity)
        }
    }

    pub fn in_use(&self) -> usize {
        self.slots.lock().unwrap().iter().filter(|s| s.is_some()).count()
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn index(slot: SwapSlot) -> usize {
        slot.0 as usize
    }
}

impl SwapDevice for MemSwap {
    fn alloc_slot(&self) -> Result<SwapSlot, SwapError> {
        let mut slots = self.slots.lock().unwrap();
        let index = slots.iter().position(Option::is_none).ok_or(SwapError::Full)?;
        slots[index] = Some(Box::new([0; PAGE_SIZE]));
        Ok(SwapSlot(u32::try_from(index).unwrap()))
    }

    fn free_slot(&self, slot: SwapSlot) {
        let mut slots = self.slots.lock().unwrap();
        assert!(slots[Self::index(slot)].take().is_some(), "double free of {slot}");
    }

    fn write_slot(&self, slot: SwapSlot, page: &PageBytes) -> Result<(), SwapError> {
        if self.broken {
            return Err(SwapError::Io(slot));
        }
        let mut slots = self.slots.lock().unwrap();
        let stored = slots[Self::index(slot)].as_mut().ok_or(SwapError::Io(slot))?;
        stored.copy_from_slice(page);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn read_slot(&self, slot: SwapSlot, page: &mut PageBytes) -> Result<(), SwapError> {
        let slots = self.slots.lock().unwrap();
        let stored = slots[Self::index(slot)].as_ref().ok_or(SwapError::Io(slot))?;
        page.copy_from_slice(&stored[..]);
        Ok(())
    }
}

/// A file held in memory. Every handle counts itself as open until dropped.
pub struct MemFile {
    data: Arc<Mutex<Vec<u8>>>,
    open: Arc<AtomicUsize>,
    writes: Arc<AtomicUsize>,
    short_writes: bool,
}

impl MemFile {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            data: Arc::new(Mutex::new(bytes)),
            open: Arc::new(AtomicUsize::new(1)),
            writes: Arc::new(AtomicUsize::new(0)),
            short_writes: false,
        }
    }

    /// Every write through this file, or a handle reopened from it, stores
    /// one byte less than asked.
    pub fn with_short_writes(bytes: Vec<u8>) -> Self {
        Self {
            data: Arc::new(Mutex::new(bytes)),
            open: Arc::new(AtomicUsize::new(1)),
            writes: Arc::new(AtomicUsize::new(0)),
            short_writes: true,
        }
    }

    pub fn contents(&self) -> Vec<u8> {
        self.data.lock().unwrap().clone()
    }

    /// Handles open on this file, this one included.
    pub fn open_handles(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    /// Number of `write_at` calls through any handle.
    pub fn write_calls(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl Drop for MemFile {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}

impl VmFile for MemFile {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> usize {
        let data = self.data.lock().unwrap();
        let start = (offset as usize).min(data.len());
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        n
    }

    /// Writes never extend the file.
    fn write_at(&self, offset: u64, buf: &[u8]) -> usize {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut data = self.data.lock().unwrap();
        let start = (offset as usize).min(data.len());
        let mut n = buf.len().min(data.len() - start);
        if self.short_writes {
            n = n.saturating_sub(1);
        }
        data[start..start + n].copy_from_slice(&buf[..n]);
        n
    }

    fn reopen(&self) -> Option<Self> {
        self.open.fetch_add(1, Ordering::SeqCst);
        Some(Self {
            data: Arc::clone(&self.data),
            open: Arc::clone(&self.open),
            writes: Arc::clone(&self.writes),
            short_writes: self.short_writes,
        })
    }

    fn length(&self) -> u64 {
        self.data.lock().unwrap().len() as u64
    }
}
