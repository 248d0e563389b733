//! Open-file table.

use bfs_error::{BfsError, Result};
use bfs_types::{FileDescriptor, InodeNumber};
use tracing::trace;

/// State of one open session on a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenFile {
    pub ino: InodeNumber,
    pub cursor: u64,
}

/// Fixed-capacity table binding descriptors to open files.
///
/// A descriptor is the index of its slot. Closing a descriptor frees the slot
/// for reuse, and `open` always hands out the lowest free one.
#[derive(Debug, Clone)]
pub struct OpenFileTable {
    slots: Vec<Option<OpenFile>>,
}

impl OpenFileTable {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
        }
    }

    /// Start a session on `ino` with the cursor at 0.
    pub fn open(&mut self, ino: InodeNumber) -> Result<FileDescriptor> {
        let Some(idx) = self.slots.iter().position(Option::is_none) else {
            return Err(BfsError::TooManyOpenFiles);
        };
        let fd = u32::try_from(idx)
            .map(FileDescriptor)
            .map_err(|_| BfsError::TooManyOpenFiles)?;
        self.slots[idx] = Some(OpenFile { ino, cursor: 0 });
        trace!(%fd, %ino, "opened descriptor");
        Ok(fd)
    }

    /// End the session bound to `fd`, returning its final state.
    pub fn close(&mut self, fd: FileDescriptor) -> Result<OpenFile> {
        let slot = self
            .slots
            .get_mut(fd.0 as usize)
            .ok_or(BfsError::BadDescriptor(fd.0))?;
        let file = slot.take().ok_or(BfsError::BadDescriptor(fd.0))?;
        trace!(%fd, ino = %file.ino, "closed descriptor");
        Ok(file)
    }

    pub fn get(&self, fd: FileDescriptor) -> Result<&OpenFile> {
        self.slots
            .get(fd.0 as usize)
            .and_then(Option::as_ref)
            .ok_or(BfsError::BadDescriptor(fd.0))
    }

    pub fn get_mut(&mut self, fd: FileDescriptor) -> Result<&mut OpenFile> {
        self.slots
            .get_mut(fd.0 as usize)
            .and_then(Option::as_mut)
            .ok_or(BfsError::BadDescriptor(fd.0))
    }

    /// Whether `open` would succeed right now.
    #[must_use]
    pub fn has_free_slot(&self) -> bool {
        self.slots.iter().any(Option::is_none)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowest_free_slot_is_reused() {
        let mut table = OpenFileTable::new(3);
        let a = table.open(InodeNumber(1)).unwrap();
        let b = table.open(InodeNumber(2)).unwrap();
        assert_eq!((a, b), (FileDescriptor(0), FileDescriptor(1)));

        table.close(a).unwrap();
        assert_eq!(table.open(InodeNumber(3)).unwrap(), FileDescriptor(0));
    }

    #[test]
    fn capacity_is_enforced() {
        let mut table = OpenFileTable::new(1);
        assert!(table.has_free_slot());
        table.open(InodeNumber(1)).unwrap();
        assert!(!table.has_free_slot());
        assert!(matches!(
            table.open(InodeNumber(1)),
            Err(BfsError::TooManyOpenFiles)
        ));
    }

    #[test]
    fn stale_descriptors_are_rejected() {
        let mut table = OpenFileTable::new(2);
        let fd = table.open(InodeNumber(7)).unwrap();
        table.get_mut(fd).unwrap().cursor = 42;
        let closed = table.close(fd).unwrap();
        assert_eq!(closed.cursor, 42);

        assert!(matches!(table.get(fd), Err(BfsError::BadDescriptor(0))));
        assert!(matches!(table.close(fd), Err(BfsError::BadDescriptor(0))));
        assert!(matches!(
            table.get(FileDescriptor(99)),
            Err(BfsError::BadDescriptor(99))
        ));
    }
}
