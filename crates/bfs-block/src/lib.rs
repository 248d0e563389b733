#![forbid(unsafe_code)]
//! Block I/O layer.
//!
//! Provides the `BlockDevice` trait (whole-block transfers addressed by
//! absolute block number), the byte-addressed `ByteDevice` it is usually
//! built on, and file-backed and in-memory implementations of the latter.
//! There are no partial-block device operations.

use bfs_error::{BfsError, Result};
use bfs_types::{BLOCK_SIZE, BLOCK_SIZE_U64, Block, BlockNumber, ByteOffset};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::Path;
use std::sync::Arc;

/// Byte-addressed device for fixed-offset I/O (pread/pwrite semantics).
pub trait ByteDevice: Send + Sync {
    /// Total length in bytes.
    fn len_bytes(&self) -> u64;

    /// Read exactly `buf.len()` bytes from `offset` into `buf`.
    fn read_exact_at(&self, offset: ByteOffset, buf: &mut [u8]) -> Result<()>;

    /// Write all bytes in `buf` to `offset`.
    fn write_all_at(&self, offset: ByteOffset, buf: &[u8]) -> Result<()>;

    /// Flush pending writes to stable storage.
    fn sync(&self) -> Result<()>;
}

fn checked_end(offset: ByteOffset, len: usize, op: &str) -> Result<u64> {
    let len = u64::try_from(len)
        .map_err(|_| BfsError::Format(format!("{op} length overflows u64")))?;
    offset
        .checked_add(len)
        .map(|end| end.0)
        .ok_or_else(|| BfsError::Format(format!("{op} range overflows u64")))
}

/// File-backed byte device using `pread`/`pwrite` style I/O.
///
/// This uses `std::os::unix::fs::FileExt`, which is thread-safe and does not
/// require a shared seek position.
#[derive(Debug, Clone)]
pub struct FileByteDevice {
    file: Arc<File>,
    len: u64,
    writable: bool,
}

impl FileByteDevice {
    /// Open an existing image, read-write if permitted, else read-only.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let (file, writable) = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path.as_ref())
            .map(|file| (file, true))
            .or_else(|_| {
                OpenOptions::new()
                    .read(true)
                    .open(path.as_ref())
                    .map(|file| (file, false))
            })?;
        let len = file.metadata()?.len();
        Ok(Self {
            file: Arc::new(file),
            len,
            writable,
        })
    }

    /// Create (or truncate) an image of `block_count` zeroed blocks.
    pub fn create(path: impl AsRef<Path>, block_count: u64) -> Result<Self> {
        let len = block_count.checked_mul(BLOCK_SIZE_U64).ok_or_else(|| {
            BfsError::Format(format!("image of {block_count} blocks overflows u64"))
        })?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path.as_ref())?;
        file.set_len(len)?;
        Ok(Self {
            file: Arc::new(file),
            len,
            writable: true,
        })
    }

    #[must_use]
    pub fn is_writable(&self) -> bool {
        self.writable
    }
}

impl ByteDevice for FileByteDevice {
    fn len_bytes(&self) -> u64 {
        self.len
    }

    fn read_exact_at(&self, offset: ByteOffset, buf: &mut [u8]) -> Result<()> {
        let end = checked_end(offset, buf.len(), "read")?;
        if end > self.len {
            return Err(BfsError::Format(format!(
                "read out of bounds: offset={offset} len={} file_len={}",
                buf.len(),
                self.len
            )));
        }
        self.file.read_exact_at(buf, offset.0)?;
        Ok(())
    }

    fn write_all_at(&self, offset: ByteOffset, buf: &[u8]) -> Result<()> {
        if !self.writable {
            return Err(BfsError::Io(std::io::Error::from(
                std::io::ErrorKind::PermissionDenied,
            )));
        }
        let end = checked_end(offset, buf.len(), "write")?;
        if end > self.len {
            return Err(BfsError::Format(format!(
                "write out of bounds: offset={offset} len={} file_len={}",
                buf.len(),
                self.len
            )));
        }
        self.file.write_all_at(buf, offset.0)?;
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }
}

/// In-memory byte device. Starts zeroed.
#[derive(Debug)]
pub struct MemoryByteDevice {
    bytes: Mutex<Vec<u8>>,
}

impl MemoryByteDevice {
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self {
            bytes: Mutex::new(vec![0_u8; len]),
        }
    }

    /// A zeroed device holding exactly `block_count` blocks.
    #[must_use]
    pub fn with_blocks(block_count: usize) -> Self {
        Self::new(block_count.saturating_mul(BLOCK_SIZE))
    }
}

impl ByteDevice for MemoryByteDevice {
    fn len_bytes(&self) -> u64 {
        u64::try_from(self.bytes.lock().len()).unwrap_or(0)
    }

    fn read_exact_at(&self, offset: ByteOffset, buf: &mut [u8]) -> Result<()> {
        let start = usize::try_from(offset.0)
            .map_err(|_| BfsError::Format("offset overflow".to_owned()))?;
        let end = start
            .checked_add(buf.len())
            .ok_or_else(|| BfsError::Format("read range overflow".to_owned()))?;
        let bytes = self.bytes.lock();
        if end > bytes.len() {
            return Err(BfsError::Format(format!(
                "read out of bounds: offset={offset} len={} device_len={}",
                buf.len(),
                bytes.len()
            )));
        }
        buf.copy_from_slice(&bytes[start..end]);
        drop(bytes);
        Ok(())
    }

    fn write_all_at(&self, offset: ByteOffset, buf: &[u8]) -> Result<()> {
        let start = usize::try_from(offset.0)
            .map_err(|_| BfsError::Format("offset overflow".to_owned()))?;
        let end = start
            .checked_add(buf.len())
            .ok_or_else(|| BfsError::Format("write range overflow".to_owned()))?;
        let mut bytes = self.bytes.lock();
        if end > bytes.len() {
            return Err(BfsError::Format(format!(
                "write out of bounds: offset={offset} len={} device_len={}",
                buf.len(),
                bytes.len()
            )));
        }
        bytes[start..end].copy_from_slice(buf);
        drop(bytes);
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        Ok(())
    }
}

/// Block-addressed I/O interface.
///
/// Transfers are always one whole block of `BLOCK_SIZE` bytes.
pub trait BlockDevice: Send + Sync {
    /// Read block `block` into `buf`.
    fn read_block(&self, block: BlockNumber, buf: &mut Block) -> Result<()>;

    /// Write `buf` to block `block`.
    fn write_block(&self, block: BlockNumber, buf: &Block) -> Result<()>;

    /// Total number of blocks.
    fn block_count(&self) -> u64;

    /// Flush pending writes to stable storage.
    fn sync(&self) -> Result<()>;
}

impl<T: BlockDevice + ?Sized> BlockDevice for &T {
    fn read_block(&self, block: BlockNumber, buf: &mut Block) -> Result<()> {
        (**self).read_block(block, buf)
    }

    fn write_block(&self, block: BlockNumber, buf: &Block) -> Result<()> {
        (**self).write_block(block, buf)
    }

    fn block_count(&self) -> u64 {
        (**self).block_count()
    }

    fn sync(&self) -> Result<()> {
        (**self).sync()
    }
}

/// Adapts a [`ByteDevice`] into a [`BlockDevice`] of `BLOCK_SIZE` blocks.
#[derive(Debug)]
pub struct ByteBlockDevice<D: ByteDevice> {
    inner: D,
    block_count: u64,
}

impl<D: ByteDevice> ByteBlockDevice<D> {
    pub fn new(inner: D) -> Result<Self> {
        let len = inner.len_bytes();
        let remainder = len % BLOCK_SIZE_U64;
        if remainder != 0 {
            return Err(BfsError::Format(format!(
                "image length is not block-aligned: len_bytes={len} block_size={BLOCK_SIZE} remainder={remainder}"
            )));
        }
        let block_count = len / BLOCK_SIZE_U64;
        if block_count == 0 {
            return Err(BfsError::Format("image holds no blocks".to_owned()));
        }
        Ok(Self { inner, block_count })
    }

    #[must_use]
    pub fn inner(&self) -> &D {
        &self.inner
    }

    fn offset_of(&self, block: BlockNumber) -> Result<ByteOffset> {
        if block.0 >= self.block_count {
            return Err(BfsError::Format(format!(
                "block out of range: block={block} block_count={}",
                self.block_count
            )));
        }
        block
            .to_byte_offset()
            .ok_or_else(|| BfsError::Format("block offset overflow".to_owned()))
    }
}

impl<D: ByteDevice> BlockDevice for ByteBlockDevice<D> {
    fn read_block(&self, block: BlockNumber, buf: &mut Block) -> Result<()> {
        let offset = self.offset_of(block)?;
        self.inner.read_exact_at(offset, buf)
    }

    fn write_block(&self, block: BlockNumber, buf: &Block) -> Result<()> {
        let offset = self.offset_of(block)?;
        self.inner.write_all_at(offset, buf)
    }

    fn block_count(&self) -> u64 {
        self.block_count
    }

    fn sync(&self) -> Result<()> {
        self.inner.sync()
    }
}

/// In-memory block device with `block_count` zeroed blocks.
pub type MemoryBlockDevice = ByteBlockDevice<MemoryByteDevice>;

impl MemoryBlockDevice {
    pub fn in_memory(block_count: usize) -> Result<Self> {
        Self::new(MemoryByteDevice::with_blocks(block_count))
    }
}
