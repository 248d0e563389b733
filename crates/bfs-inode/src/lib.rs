#![forbid(unsafe_code)]
//! Inode management.
//!
//! Each inode records a file's size and the mapping from logical file blocks
//! to physical blocks. A logical block with no mapping is a hole. The table
//! never touches the block store and never allocates physical blocks itself;
//! callers bind blocks they obtained from the allocator.

use bfs_error::{BfsError, Result};
use bfs_types::{BlockNumber, FileBlockNumber, InodeNumber};
use std::collections::BTreeMap;
use tracing::trace;

/// Metadata for one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InodeRecord {
    /// File size in bytes.
    pub size: u64,
    /// Number of logical blocks the block map has been extended to address.
    pub mapped_blocks: u64,
    blocks: BTreeMap<FileBlockNumber, BlockNumber>,
}

impl InodeRecord {
    /// Physical block bound to `fbn`, or `None` for a hole.
    #[must_use]
    pub fn block(&self, fbn: FileBlockNumber) -> Option<BlockNumber> {
        self.blocks.get(&fbn).copied()
    }

    /// Number of physical blocks bound to this file.
    #[must_use]
    pub fn allocated_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Physical block at the highest mapped logical position, used as an
    /// allocation goal so a file's blocks stay close together.
    #[must_use]
    pub fn last_block(&self) -> Option<BlockNumber> {
        self.blocks.values().next_back().copied()
    }
}

/// Fixed-capacity table of inodes, indexed by `InodeNumber`.
///
/// Inode numbers start at 1. Slot `n - 1` holds inode `n`.
#[derive(Debug, Clone)]
pub struct InodeTable {
    slots: Vec<Option<InodeRecord>>,
    max_file_blocks: u64,
}

impl InodeTable {
    #[must_use]
    pub fn new(max_inodes: usize, max_file_blocks: u64) -> Self {
        Self {
            slots: vec![None; max_inodes],
            max_file_blocks,
        }
    }

    /// Claim a free slot for a new, empty file.
    pub fn alloc(&mut self) -> Result<InodeNumber> {
        let Some(idx) = self.slots.iter().position(Option::is_none) else {
            return Err(BfsError::NoFreeInode);
        };
        self.slots[idx] = Some(InodeRecord::default());
        let ino = InodeNumber(idx as u64 + 1);
        trace!(%ino, "allocated inode");
        Ok(ino)
    }

    pub fn get(&self, ino: InodeNumber) -> Result<&InodeRecord> {
        Self::slot_index(ino)
            .and_then(|idx| self.slots.get(idx))
            .and_then(Option::as_ref)
            .ok_or_else(|| BfsError::NotFound(format!("inode {ino}")))
    }

    fn get_mut(&mut self, ino: InodeNumber) -> Result<&mut InodeRecord> {
        Self::slot_index(ino)
            .and_then(|idx| self.slots.get_mut(idx))
            .and_then(Option::as_mut)
            .ok_or_else(|| BfsError::NotFound(format!("inode {ino}")))
    }

    fn slot_index(ino: InodeNumber) -> Option<usize> {
        ino.0
            .checked_sub(1)
            .and_then(|idx| usize::try_from(idx).ok())
    }

    pub fn size(&self, ino: InodeNumber) -> Result<u64> {
        Ok(self.get(ino)?.size)
    }

    pub fn set_size(&mut self, ino: InodeNumber, size: u64) -> Result<()> {
        self.get_mut(ino)?.size = size;
        Ok(())
    }

    /// Physical block for `fbn`, never allocating.
    pub fn resolve(&self, ino: InodeNumber, fbn: FileBlockNumber) -> Result<Option<BlockNumber>> {
        Ok(self.get(ino)?.block(fbn))
    }

    /// Grow the block map so it can address logical blocks up to `last`.
    pub fn extend(&mut self, ino: InodeNumber, last: FileBlockNumber) -> Result<()> {
        let limit = self.max_file_blocks;
        let record = self.get_mut(ino)?;
        check_addressable(ino, last, limit)?;
        record.mapped_blocks = record.mapped_blocks.max(last.0 + 1);
        Ok(())
    }

    /// Bind `block` at logical position `fbn`. The position must be a hole.
    pub fn bind(&mut self, ino: InodeNumber, fbn: FileBlockNumber, block: BlockNumber) -> Result<()> {
        let limit = self.max_file_blocks;
        let record = self.get_mut(ino)?;
        check_addressable(ino, fbn, limit)?;
        if let Some(existing) = record.blocks.get(&fbn) {
            return Err(BfsError::BlockAlreadyBound {
                ino: ino.0,
                fbn: fbn.0,
                block: existing.0,
            });
        }
        record.blocks.insert(fbn, block);
        record.mapped_blocks = record.mapped_blocks.max(fbn.0 + 1);
        Ok(())
    }

    /// Reset a file to empty, returning the physical blocks it held.
    pub fn truncate(&mut self, ino: InodeNumber) -> Result<Vec<BlockNumber>> {
        let record = self.get_mut(ino)?;
        let released = std::mem::take(&mut record.blocks).into_values().collect();
        record.size = 0;
        record.mapped_blocks = 0;
        Ok(released)
    }
}

fn check_addressable(ino: InodeNumber, fbn: FileBlockNumber, limit: u64) -> Result<()> {
    if fbn.0 >= limit {
        return Err(BfsError::FileTooLarge {
            ino: ino.0,
            fbn: fbn.0,
            limit,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_hands_out_sequential_numbers_until_full() {
        let mut table = InodeTable::new(2, 16);
        assert_eq!(table.alloc().unwrap(), InodeNumber(1));
        assert_eq!(table.alloc().unwrap(), InodeNumber(2));
        assert!(matches!(table.alloc(), Err(BfsError::NoFreeInode)));
    }

    #[test]
    fn unknown_inode_is_not_found() {
        let table = InodeTable::new(4, 16);
        assert!(matches!(table.size(InodeNumber(1)), Err(BfsError::NotFound(_))));
        assert!(matches!(table.size(InodeNumber(0)), Err(BfsError::NotFound(_))));
        assert!(matches!(table.size(InodeNumber(99)), Err(BfsError::NotFound(_))));
    }

    #[test]
    fn bind_and_resolve() {
        let mut table = InodeTable::new(4, 16);
        let ino = table.alloc().unwrap();
        assert_eq!(table.resolve(ino, FileBlockNumber(0)).unwrap(), None);

        table.bind(ino, FileBlockNumber(2), BlockNumber(40)).unwrap();
        assert_eq!(
            table.resolve(ino, FileBlockNumber(2)).unwrap(),
            Some(BlockNumber(40))
        );
        assert_eq!(table.resolve(ino, FileBlockNumber(1)).unwrap(), None);
        assert_eq!(table.get(ino).unwrap().mapped_blocks, 3);
        assert_eq!(table.get(ino).unwrap().last_block(), Some(BlockNumber(40)));

        let err = table
            .bind(ino, FileBlockNumber(2), BlockNumber(41))
            .unwrap_err();
        assert!(
            matches!(
                err,
                BfsError::BlockAlreadyBound {
                    fbn: 2,
                    block: 40,
                    ..
                }
            ),
            "{err:?}"
        );
    }

    #[test]
    fn extend_respects_file_limit() {
        let mut table = InodeTable::new(4, 8);
        let ino = table.alloc().unwrap();
        table.extend(ino, FileBlockNumber(7)).unwrap();
        assert_eq!(table.get(ino).unwrap().mapped_blocks, 8);

        let err = table.extend(ino, FileBlockNumber(8)).unwrap_err();
        assert!(matches!(
            err,
            BfsError::FileTooLarge {
                fbn: 8,
                limit: 8,
                ..
            }
        ));
        assert!(
            table
                .bind(ino, FileBlockNumber(8), BlockNumber(9))
                .is_err()
        );
        // Extending never shrinks the map.
        table.extend(ino, FileBlockNumber(1)).unwrap();
        assert_eq!(table.get(ino).unwrap().mapped_blocks, 8);
    }

    #[test]
    fn truncate_releases_blocks() {
        let mut table = InodeTable::new(4, 16);
        let ino = table.alloc().unwrap();
        table.bind(ino, FileBlockNumber(0), BlockNumber(10)).unwrap();
        table.bind(ino, FileBlockNumber(1), BlockNumber(11)).unwrap();
        table.set_size(ino, 700).unwrap();

        let released = table.truncate(ino).unwrap();
        assert_eq!(released, vec![BlockNumber(10), BlockNumber(11)]);
        assert_eq!(table.size(ino).unwrap(), 0);
        assert_eq!(table.get(ino).unwrap().allocated_blocks(), 0);
    }
}
