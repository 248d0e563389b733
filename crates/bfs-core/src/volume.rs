//! In-memory volume state: allocator, inode table, directory and open files.

use crate::FileMap;
use crate::oft::{OpenFile, OpenFileTable};
use bfs_alloc::BlockAllocator;
use bfs_dir::Directory;
use bfs_error::{BfsError, Result};
use bfs_inode::{InodeRecord, InodeTable};
use bfs_types::{BlockNumber, FileBlockNumber, FileDescriptor, InodeNumber};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Volume geometry and table sizes.
///
/// The block count always comes from the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeOptions {
    /// Leading blocks kept for volume metadata (superblock, inode block,
    /// directory block). Never handed out to files.
    pub reserved_blocks: u32,
    pub max_inodes: usize,
    pub max_open_files: usize,
    /// Per-file limit on addressable logical blocks.
    pub max_file_blocks: u64,
}

impl Default for VolumeOptions {
    fn default() -> Self {
        Self {
            reserved_blocks: 3,
            max_inodes: 64,
            max_open_files: 32,
            max_file_blocks: 1024,
        }
    }
}

/// Everything a mounted volume tracks besides block contents.
#[derive(Debug, Clone)]
pub struct Volume {
    allocator: BlockAllocator,
    inodes: InodeTable,
    dir: Directory,
    files: OpenFileTable,
}

impl Volume {
    /// Fresh, empty volume over a device of `block_count` blocks.
    pub fn new(block_count: u64, options: VolumeOptions) -> Result<Self> {
        let allocator = BlockAllocator::new(block_count, options.reserved_blocks)?;
        info!(
            block_count,
            data_blocks = allocator.free_blocks(),
            max_inodes = options.max_inodes,
            "volume initialized"
        );
        Ok(Self {
            inodes: InodeTable::new(options.max_inodes, options.max_file_blocks),
            files: OpenFileTable::new(options.max_open_files),
            dir: Directory::new(),
            allocator,
        })
    }

    // ── Namespace ───────────────────────────────────────────────────────

    /// Create `name`, or truncate it to empty if it already exists, and open it.
    ///
    /// Truncation releases every block the file held. Descriptors already
    /// open on the file keep their cursors. A failed call leaves the
    /// namespace and every file untouched.
    pub fn create(&mut self, name: &str) -> Result<FileDescriptor> {
        if !self.files.has_free_slot() {
            return Err(BfsError::TooManyOpenFiles);
        }
        let ino = if let Some(ino) = self.dir.get(name) {
            let released = self.inodes.truncate(ino)?;
            for block in &released {
                self.allocator.free(*block)?;
            }
            debug!(name, %ino, released = released.len(), "truncated existing file");
            ino
        } else {
            bfs_dir::validate_name(name)?;
            let ino = self.inodes.alloc()?;
            self.dir.insert(name, ino)?;
            debug!(name, %ino, "created file");
            ino
        };
        self.files.open(ino)
    }

    /// Open an existing file with its cursor at 0.
    pub fn open(&mut self, name: &str) -> Result<FileDescriptor> {
        let ino = self.dir.lookup(name)?;
        self.files.open(ino)
    }

    /// Release `fd`. The file and its size persist.
    pub fn close(&mut self, fd: FileDescriptor) -> Result<OpenFile> {
        self.files.close(fd)
    }

    pub fn lookup(&self, name: &str) -> Result<InodeNumber> {
        self.dir.lookup(name)
    }

    pub fn inode(&self, ino: InodeNumber) -> Result<&InodeRecord> {
        self.inodes.get(ino)
    }

    #[must_use]
    pub fn free_blocks(&self) -> u32 {
        self.allocator.free_blocks()
    }
}

impl FileMap for Volume {
    fn inode_of(&self, fd: FileDescriptor) -> Result<InodeNumber> {
        Ok(self.files.get(fd)?.ino)
    }

    fn resolve(&self, ino: InodeNumber, fbn: FileBlockNumber) -> Result<Option<BlockNumber>> {
        self.inodes.resolve(ino, fbn)
    }

    fn allocate(&mut self, ino: InodeNumber, fbn: FileBlockNumber) -> Result<BlockNumber> {
        let goal = self
            .inodes
            .get(ino)?
            .last_block()
            .and_then(|last| last.checked_add(1));
        let block = self.allocator.alloc(goal)?;
        if let Err(err) = self.inodes.bind(ino, fbn, block) {
            self.allocator.free(block)?;
            return Err(err);
        }
        Ok(block)
    }

    fn extend(&mut self, ino: InodeNumber, last: FileBlockNumber) -> Result<()> {
        self.inodes.extend(ino, last)
    }

    fn size(&self, ino: InodeNumber) -> Result<u64> {
        self.inodes.size(ino)
    }

    fn set_size(&mut self, ino: InodeNumber, size: u64) -> Result<()> {
        self.inodes.set_size(ino, size)
    }

    fn cursor(&self, fd: FileDescriptor) -> Result<u64> {
        Ok(self.files.get(fd)?.cursor)
    }

    fn set_cursor(&mut self, fd: FileDescriptor, cursor: u64) -> Result<()> {
        self.files.get_mut(fd)?.cursor = cursor;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn volume() -> Volume {
        Volume::new(64, VolumeOptions::default()).expect("volume")
    }

    #[test]
    fn create_open_close_lifecycle() {
        let mut vol = volume();
        let fd = vol.create("notes").unwrap();
        let ino = vol.inode_of(fd).unwrap();
        vol.set_size(ino, 77).unwrap();
        vol.set_cursor(fd, 12).unwrap();
        assert_eq!(vol.close(fd).unwrap().cursor, 12);
        assert!(matches!(vol.cursor(fd), Err(BfsError::BadDescriptor(_))));

        let fd = vol.open("notes").unwrap();
        assert_eq!(vol.cursor(fd).unwrap(), 0);
        assert_eq!(vol.size(vol.inode_of(fd).unwrap()).unwrap(), 77);
        assert_eq!(vol.lookup("notes").unwrap(), ino);
    }

    #[test]
    fn open_unknown_name_fails() {
        let mut vol = volume();
        assert!(matches!(vol.open("missing"), Err(BfsError::NotFound(_))));
    }

    #[test]
    fn allocate_skips_reserved_blocks_and_stays_contiguous() {
        let mut vol = volume();
        let fd = vol.create("f").unwrap();
        let ino = vol.inode_of(fd).unwrap();
        let first = vol.allocate(ino, FileBlockNumber(0)).unwrap();
        let second = vol.allocate(ino, FileBlockNumber(1)).unwrap();
        assert_eq!(first, BlockNumber(3));
        assert_eq!(second, BlockNumber(4));
        assert_eq!(vol.resolve(ino, FileBlockNumber(1)).unwrap(), Some(second));
        assert_eq!(vol.free_blocks(), 59);
    }

    #[test]
    fn allocate_past_file_limit_returns_block() {
        let options = VolumeOptions {
            max_file_blocks: 2,
            ..VolumeOptions::default()
        };
        let mut vol = Volume::new(16, options).unwrap();
        let fd = vol.create("f").unwrap();
        let ino = vol.inode_of(fd).unwrap();
        let before = vol.free_blocks();
        let err = vol.allocate(ino, FileBlockNumber(2)).unwrap_err();
        assert!(matches!(err, BfsError::FileTooLarge { .. }));
        assert_eq!(vol.free_blocks(), before);
    }

    #[test]
    fn create_existing_name_truncates() {
        let mut vol = volume();
        let fd = vol.create("log").unwrap();
        let ino = vol.inode_of(fd).unwrap();
        let before = vol.free_blocks();
        let block = vol.allocate(ino, FileBlockNumber(0)).unwrap();
        vol.set_size(ino, 300).unwrap();
        vol.close(fd).unwrap();

        let fd = vol.create("log").unwrap();
        assert_eq!(vol.inode_of(fd).unwrap(), ino);
        assert_eq!(vol.size(ino).unwrap(), 0);
        assert_eq!(vol.resolve(ino, FileBlockNumber(0)).unwrap(), None);
        assert_eq!(vol.free_blocks(), before);
        // The released block is the first one handed out again.
        let again = vol.allocate(ino, FileBlockNumber(0)).unwrap();
        assert_eq!(again, block);
    }

    fn single_descriptor_volume() -> Volume {
        let options = VolumeOptions {
            max_open_files: 1,
            ..VolumeOptions::default()
        };
        Volume::new(64, options).unwrap()
    }

    #[test]
    fn truncating_create_with_full_table_keeps_file() {
        let mut vol = single_descriptor_volume();
        let fd = vol.create("keep").unwrap();
        let ino = vol.inode_of(fd).unwrap();
        let block = vol.allocate(ino, FileBlockNumber(0)).unwrap();
        vol.set_size(ino, 8).unwrap();
        let free = vol.free_blocks();

        assert!(matches!(vol.create("keep"), Err(BfsError::TooManyOpenFiles)));
        assert_eq!(vol.size(ino).unwrap(), 8);
        assert_eq!(vol.resolve(ino, FileBlockNumber(0)).unwrap(), Some(block));
        assert_eq!(vol.free_blocks(), free);
    }

    #[test]
    fn new_name_create_with_full_table_leaves_no_entry() {
        let options = VolumeOptions {
            max_open_files: 1,
            max_inodes: 2,
            ..VolumeOptions::default()
        };
        let mut vol = Volume::new(64, options).unwrap();
        let fd = vol.create("a").unwrap();

        assert!(matches!(vol.create("b"), Err(BfsError::TooManyOpenFiles)));
        assert!(matches!(vol.lookup("b"), Err(BfsError::NotFound(_))));

        vol.close(fd).unwrap();
        assert!(matches!(vol.open("b"), Err(BfsError::NotFound(_))));
        // The failed call did not consume the second inode.
        vol.create("b").expect("second inode is still free");
    }

    #[test]
    fn invalid_name_consumes_no_inode() {
        let options = VolumeOptions {
            max_inodes: 1,
            ..VolumeOptions::default()
        };
        let mut vol = Volume::new(16, options).unwrap();
        assert!(matches!(vol.create(""), Err(BfsError::InvalidName(_))));
        vol.create("ok").expect("the only inode is still free");
        assert!(matches!(vol.create("second"), Err(BfsError::NoFreeInode)));
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let options: VolumeOptions =
            serde_json::from_str(r#"{"max_open_files": 4}"#).expect("parse options");
        assert_eq!(options.max_open_files, 4);
        assert_eq!(options.reserved_blocks, 3);
        assert_eq!(options.max_file_blocks, 1024);
    }
}
