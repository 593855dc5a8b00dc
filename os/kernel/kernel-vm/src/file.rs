use alloc::sync::Arc;
use kernel_memory_addresses::{PAGE_SIZE, PAGE_SIZE_U64, PageBytes};

/// An open file as the paging code sees it.
///
/// Closing is dropping: the last [`Arc`] to a reopened handle closes it.
pub trait VmFile: Send + Sync + Sized {
    /// Read up to `buf.len()` bytes at `offset`. Returns the number read.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> usize;

    /// Write `buf` at `offset`. Returns the number of bytes written.
    fn write_at(&self, offset: u64, buf: &[u8]) -> usize;

    /// An independent handle to the same file, or `None` if none could be
    /// opened.
    fn reopen(&self) -> Option<Self>;

    /// File length in bytes.
    fn length(&self) -> u64;
}

/// Bytes of a page that come from the file when `remaining` file bytes are
/// left at the page's offset.
#[allow(clippy::cast_possible_truncation)]
pub(crate) const fn page_share(remaining: u64) -> usize {
    if remaining < PAGE_SIZE_U64 {
        remaining as usize
    } else {
        PAGE_SIZE
    }
}

/// The part of a file that backs one page.
///
/// The first `read_bytes` bytes of the page come from `file` at `offset`;
/// the rest of the page is zero.
pub struct FileSpan<F> {
    pub file: Arc<F>,
    pub offset: u64,
    pub read_bytes: usize,
}

impl<F> Clone for FileSpan<F> {
    fn clone(&self) -> Self {
        Self {
            file: Arc::clone(&self.file),
            offset: self.offset,
            read_bytes: self.read_bytes,
        }
    }
}

impl<F: VmFile> FileSpan<F> {
    #[must_use]
    pub fn new(file: Arc<F>, offset: u64, read_bytes: usize) -> Self {
        debug_assert!(read_bytes <= PAGE_SIZE);
        Self {
            file,
            offset,
            read_bytes,
        }
    }

    /// Fill `page` from the file, zero padding whatever the file does not
    /// provide.
    pub(crate) fn load_into(&self, page: &mut PageBytes) {
        let read = self
            .file
            .read_at(self.offset, &mut page[..self.read_bytes])
            .min(self.read_bytes);
        if read < self.read_bytes {
            log::debug!(
                "short read at offset {:#x}: {read} of {} bytes",
                self.offset,
                self.read_bytes
            );
        }
        page[read..].fill(0);
    }

    /// Write the file's share of `page` back. Returns the number of bytes
    /// written.
    pub(crate) fn store_from(&self, page: &PageBytes) -> usize {
        self.file.write_at(self.offset, &page[..self.read_bytes])
    }
}
