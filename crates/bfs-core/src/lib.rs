#![forbid(unsafe_code)]
//! Byte-range file I/O over a fixed-size block store.
//!
//! A [`FileSystem`] pairs a [`BlockDevice`] with a [`Volume`] and exposes a
//! descriptor-based file API: create, open, close, read, write, seek, tell
//! and size. Reads and writes are translated into whole-block transfers by
//! [`file_io`], which talks to the volume only through the [`FileMap`]
//! trait.

pub mod file_io;
mod oft;
pub mod seek;
pub mod span;
mod volume;

pub use oft::{OpenFile, OpenFileTable};
pub use volume::{Volume, VolumeOptions};

use bfs_block::BlockDevice;
use bfs_error::Result;
use bfs_types::{BlockNumber, FileBlockNumber, FileDescriptor, InodeNumber, Whence};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Block mapping and bookkeeping the byte-range translator depends on.
///
/// Implementations own file sizes, logical-to-physical block maps and
/// per-descriptor cursors. None of these methods touch block contents.
pub trait FileMap {
    /// Inode bound to an open descriptor.
    fn inode_of(&self, fd: FileDescriptor) -> Result<InodeNumber>;

    /// Physical block backing `fbn`, or `None` for a hole. Never allocates.
    fn resolve(&self, ino: InodeNumber, fbn: FileBlockNumber) -> Result<Option<BlockNumber>>;

    /// Allocate a physical block and bind it at `fbn`, which must be a hole.
    fn allocate(&mut self, ino: InodeNumber, fbn: FileBlockNumber) -> Result<BlockNumber>;

    /// Make the file's block map able to address logical blocks up to `last`.
    fn extend(&mut self, ino: InodeNumber, last: FileBlockNumber) -> Result<()>;

    fn size(&self, ino: InodeNumber) -> Result<u64>;

    fn set_size(&mut self, ino: InodeNumber, size: u64) -> Result<()>;

    fn cursor(&self, fd: FileDescriptor) -> Result<u64>;

    fn set_cursor(&mut self, fd: FileDescriptor, cursor: u64) -> Result<()>;
}

/// Point-in-time view of an open file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStat {
    pub fd: FileDescriptor,
    pub ino: InodeNumber,
    pub size: u64,
    pub cursor: u64,
    /// Physical blocks bound to the file. Holes are not counted.
    pub allocated_blocks: usize,
}

/// A mounted volume and the device holding its blocks.
#[derive(Debug)]
pub struct FileSystem<D: BlockDevice> {
    dev: D,
    volume: Volume,
}

impl<D: BlockDevice> FileSystem<D> {
    /// Mount an empty volume spanning every block of `dev`.
    pub fn mount(dev: D, options: VolumeOptions) -> Result<Self> {
        let volume = Volume::new(dev.block_count(), options)?;
        info!(block_count = dev.block_count(), "mounted");
        Ok(Self { dev, volume })
    }

    #[must_use]
    pub fn device(&self) -> &D {
        &self.dev
    }

    #[must_use]
    pub fn volume(&self) -> &Volume {
        &self.volume
    }

    pub fn sync(&self) -> Result<()> {
        self.dev.sync()
    }

    // ── Namespace ───────────────────────────────────────────────────────

    /// Create `name` (truncating it if it exists) and open it.
    pub fn create(&mut self, name: &str) -> Result<FileDescriptor> {
        self.volume.create(name)
    }

    pub fn open(&mut self, name: &str) -> Result<FileDescriptor> {
        self.volume.open(name)
    }

    pub fn close(&mut self, fd: FileDescriptor) -> Result<()> {
        self.volume.close(fd).map(drop)
    }

    // ── Data ────────────────────────────────────────────────────────────

    /// See [`file_io::read`].
    pub fn read(&mut self, fd: FileDescriptor, buf: &mut [u8]) -> Result<usize> {
        file_io::read(&mut self.volume, &self.dev, fd, buf)
    }

    /// See [`file_io::write`].
    pub fn write(&mut self, fd: FileDescriptor, buf: &[u8]) -> Result<usize> {
        file_io::write(&mut self.volume, &self.dev, fd, buf)
    }

    pub fn seek(&mut self, fd: FileDescriptor, offset: i64, whence: Whence) -> Result<u64> {
        seek::seek(&mut self.volume, fd, offset, whence)
    }

    pub fn seek_raw(&mut self, fd: FileDescriptor, offset: i64, whence: i32) -> Result<u64> {
        seek::seek_raw(&mut self.volume, fd, offset, whence)
    }

    pub fn tell(&self, fd: FileDescriptor) -> Result<u64> {
        self.volume.cursor(fd)
    }

    pub fn size(&self, fd: FileDescriptor) -> Result<u64> {
        self.volume.size(self.volume.inode_of(fd)?)
    }

    pub fn stat(&self, fd: FileDescriptor) -> Result<FileStat> {
        let ino = self.volume.inode_of(fd)?;
        let record = self.volume.inode(ino)?;
        Ok(FileStat {
            fd,
            ino,
            size: record.size,
            cursor: self.volume.cursor(fd)?,
            allocated_blocks: record.allocated_blocks(),
        })
    }
}
