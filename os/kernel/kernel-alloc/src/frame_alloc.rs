//! Bitmap-tracked arena of user frames.

use crate::PagePool;
use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;
use kernel_info::memory::USER_POOL_BASE;
use kernel_memory_addresses::{PAGE_SIZE, PageBytes, PhysicalPage};
use spin::Mutex;

const BITS_PER_WORD: usize = u64::BITS as usize;

/// A fixed arena of `capacity` frames with one in-use bit per frame.
///
/// Allocation takes the lowest free frame. The frame contents live in the
/// arena itself; [`PagePool::with_page`] locks only the frame being touched.
pub struct BitmapPagePool {
    base: u64,
    frames: Box<[Mutex<PageBytes>]>,
    used: Mutex<Bitmap>,
}

struct Bitmap {
    words: Vec<u64>,
    in_use: usize,
}

impl BitmapPagePool {
    /// Pool of `capacity` frames starting at [`USER_POOL_BASE`].
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self::with_base(USER_POOL_BASE, capacity)
    }

    /// Pool of `capacity` frames whose first frame sits at physical `base`.
    ///
    /// # Panics
    /// If `base` is not page aligned.
    #[must_use]
    pub fn with_base(base: u64, capacity: usize) -> Self {
        assert!(
            PhysicalPage::containing(base).as_u64() == base,
            "pool base {base:#x} is not page aligned"
        );
        let frames = (0..capacity)
            .map(|_| Mutex::new([0u8; PAGE_SIZE]))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            base,
            frames,
            used: Mutex::new(Bitmap {
                words: vec![0; capacity.div_ceil(BITS_PER_WORD)],
                in_use: 0,
            }),
        }
    }

    /// Number of frames currently free.
    #[must_use]
    pub fn available(&self) -> usize {
        self.frames.len() - self.used.lock().in_use
    }

    /// Whether `frame` is currently checked out.
    #[must_use]
    pub fn is_allocated(&self, frame: PhysicalPage) -> bool {
        self.index_of(frame)
            .is_some_and(|index| self.used.lock().get(index))
    }

    #[allow(clippy::cast_possible_truncation)]
    fn index_of(&self, frame: PhysicalPage) -> Option<usize> {
        if frame.as_u64() < self.base {
            return None;
        }
        let index = frame.index_from(self.base) as usize;
        (index < self.frames.len()).then_some(index)
    }

    fn frame_at(&self, index: usize) -> PhysicalPage {
        PhysicalPage::nth_from(self.base, index as u64)
    }

    fn slot(&self, frame: PhysicalPage) -> &Mutex<PageBytes> {
        let Some(index) = self.index_of(frame) else {
            panic!("frame {frame} does not belong to this pool");
        };
        &self.frames[index]
    }
}

impl Bitmap {
    fn get(&self, index: usize) -> bool {
        self.words[index / BITS_PER_WORD] & (1 << (index % BITS_PER_WORD)) != 0
    }

    fn set(&mut self, index: usize, value: bool) {
        let word = &mut self.words[index / BITS_PER_WORD];
        let mask = 1 << (index % BITS_PER_WORD);
        if value {
            *word |= mask;
        } else {
            *word &= !mask;
        }
    }

    /// Lowest clear bit below `limit`.
    fn first_free(&self, limit: usize) -> Option<usize> {
        self.words
            .iter()
            .enumerate()
            .find(|(_, w)| **w != u64::MAX)
            .map(|(i, w)| i * BITS_PER_WORD + w.trailing_ones() as usize)
            .filter(|index| *index < limit)
    }
}

impl PagePool for BitmapPagePool {
    fn get_page(&self, zero: bool) -> Option<PhysicalPage> {
        let index = {
            let mut used = self.used.lock();
            let index = used.first_free(self.frames.len())?;
            used.set(index, true);
            used.in_use += 1;
            index
        };
        if zero {
            self.frames[index].lock().fill(0);
        }
        Some(self.frame_at(index))
    }

    /// # Panics
    /// If `frame` is not part of this pool or is already free.
    fn free_page(&self, frame: PhysicalPage) {
        let Some(index) = self.index_of(frame) else {
            panic!("frame {frame} does not belong to this pool");
        };
        let mut used = self.used.lock();
        assert!(used.get(index), "double free of frame {frame}");
        used.set(index, false);
        used.in_use -= 1;
    }

    fn capacity(&self) -> usize {
        self.frames.len()
    }

    fn with_page<R>(&self, frame: PhysicalPage, f: impl FnOnce(&mut PageBytes) -> R) -> R {
        let mut bytes = self.slot(frame).lock();
        f(&mut *bytes)
    }
}
