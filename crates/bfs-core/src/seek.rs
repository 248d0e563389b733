//! Cursor positioning.

use crate::FileMap;
use bfs_error::{BfsError, Result};
use bfs_types::{FileDescriptor, Whence};
use tracing::debug;

/// Cursor that results from seeking by `offset` relative to `whence`.
///
/// An absolute seek rejects a negative offset outright. Relative seeks may
/// move backwards but never before byte 0. The result is not clamped to the
/// file size.
pub fn target_cursor(whence: Whence, offset: i64, cursor: u64, size: u64) -> Result<u64> {
    let base = match whence {
        Whence::Set => {
            return u64::try_from(offset).map_err(|_| BfsError::NegativeOffset { offset });
        }
        Whence::Current => cursor,
        Whence::End => size,
    };
    base.checked_add_signed(offset).ok_or_else(|| {
        if offset < 0 {
            BfsError::NegativeCursor { base, offset }
        } else {
            BfsError::OffsetOverflow {
                base,
                len: offset.unsigned_abs(),
            }
        }
    })
}

/// Move the cursor of `fd` and return its new value.
///
/// Touches neither storage nor the file size.
pub fn seek<M>(map: &mut M, fd: FileDescriptor, offset: i64, whence: Whence) -> Result<u64>
where
    M: FileMap + ?Sized,
{
    let cursor = map.cursor(fd)?;
    let size = match whence {
        Whence::End => map.size(map.inode_of(fd)?)?,
        Whence::Set | Whence::Current => 0,
    };
    let target = target_cursor(whence, offset, cursor, size)?;
    map.set_cursor(fd, target)?;
    debug!(%fd, %whence, offset, from = cursor, to = target, "seek");
    Ok(target)
}

/// [`seek`] with a POSIX-style numeric `whence`.
pub fn seek_raw<M>(map: &mut M, fd: FileDescriptor, offset: i64, whence: i32) -> Result<u64>
where
    M: FileMap + ?Sized,
{
    let whence = Whence::from_raw(whence).ok_or(BfsError::BadWhence(whence))?;
    seek(map, fd, offset, whence)
}
