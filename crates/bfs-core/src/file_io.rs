//! Byte-range translation: reads and writes at a descriptor's cursor.
//!
//! Both directions walk the range one logical block at a time. Every block
//! is read from the device at most once and written at most once per call.

use crate::FileMap;
use crate::span::{BlockSpan, SpanSegment, blocks_wholly_inside};
use bfs_block::BlockDevice;
use bfs_error::{BfsError, ErrorKind, Result};
use bfs_types::{BLOCK_SIZE, Block, BlockNumber, FileBlockNumber, FileDescriptor, InodeNumber};
use tracing::{debug, trace, warn};

/// Copy bytes from the file at the cursor of `fd` into `buf`.
///
/// Returns `min(buf.len(), size - cursor)`, which is 0 at or past
/// end-of-file. Holes read as zeros. The cursor advances by the count
/// returned.
pub fn read<M, D>(map: &mut M, dev: &D, fd: FileDescriptor, buf: &mut [u8]) -> Result<usize>
where
    M: FileMap + ?Sized,
    D: BlockDevice + ?Sized,
{
    if buf.is_empty() {
        return Err(BfsError::InvalidLength { len: 0 });
    }
    let ino = map.inode_of(fd)?;
    let size = map.size(ino)?;
    let cursor = map.cursor(fd)?;

    let remaining = size.saturating_sub(cursor);
    let to_read = usize::try_from(remaining).map_or(buf.len(), |r| r.min(buf.len()));
    debug!(%fd, %ino, cursor, len = buf.len(), size, to_read, "read");
    if to_read == 0 {
        return Ok(0);
    }

    let span = BlockSpan::new(cursor, to_read)?;
    let end = span.end();
    for seg in span {
        let dst = &mut buf[seg.buf_range()];
        match map.resolve(ino, seg.fbn)? {
            Some(block) => {
                let mut scratch: Block = [0; BLOCK_SIZE];
                dev.read_block(block, &mut scratch)?;
                trace!(%ino, fbn = %seg.fbn, %block, "read block");
                dst.copy_from_slice(&scratch[seg.block_range()]);
            }
            None => dst.fill(0),
        }
    }

    map.set_cursor(fd, end)?;
    Ok(to_read)
}

/// Write all of `buf` at the cursor of `fd`.
///
/// A write that ends past the current size grows the file to exactly its
/// end. A write that starts past the current size first zero-fills the whole
/// blocks of the gap. Returns `buf.len()`; the cursor advances by the same.
///
/// If allocation fails part way, the error is returned as is: the size has
/// already grown and blocks that were not yet written read back as zeros.
/// The cursor does not move.
pub fn write<M, D>(map: &mut M, dev: &D, fd: FileDescriptor, buf: &[u8]) -> Result<usize>
where
    M: FileMap + ?Sized,
    D: BlockDevice + ?Sized,
{
    if buf.is_empty() {
        return Err(BfsError::InvalidLength { len: 0 });
    }
    let ino = map.inode_of(fd)?;
    let old_size = map.size(ino)?;
    let cursor = map.cursor(fd)?;

    let span = BlockSpan::new(cursor, buf.len())?;
    let end = span.end();
    debug!(%fd, %ino, cursor, len = buf.len(), size = old_size, "write");

    if end > old_size {
        map.extend(ino, FileBlockNumber::containing(end - 1))?;
    }
    if cursor > old_size {
        fill_gap(map, dev, ino, old_size, cursor)?;
    }
    if end > old_size {
        map.set_size(ino, end)?;
    }

    for seg in span {
        write_segment(map, dev, ino, &seg, &buf[seg.buf_range()]).inspect_err(|err| {
            if err.kind() == ErrorKind::Allocation {
                warn!(%ino, fbn = %seg.fbn, error = %err, "allocation failed mid-write");
            }
        })?;
    }

    map.set_cursor(fd, end)?;
    Ok(buf.len())
}

/// Zero every logical block lying wholly inside `[old_size, cursor)`.
///
/// The block holding the old end-of-file is left alone: its bytes past the
/// old size are already zero, and its live bytes must survive.
fn fill_gap<M, D>(map: &mut M, dev: &D, ino: InodeNumber, old_size: u64, cursor: u64) -> Result<()>
where
    M: FileMap + ?Sized,
    D: BlockDevice + ?Sized,
{
    let zeros: Block = [0; BLOCK_SIZE];
    for fbn in blocks_wholly_inside(old_size, cursor) {
        let block = resolve_or_allocate(map, ino, fbn)?;
        dev.write_block(block, &zeros)?;
        trace!(%ino, %fbn, %block, "zero-filled gap block");
    }
    Ok(())
}

fn write_segment<M, D>(
    map: &mut M,
    dev: &D,
    ino: InodeNumber,
    seg: &SpanSegment,
    data: &[u8],
) -> Result<()>
where
    M: FileMap + ?Sized,
    D: BlockDevice + ?Sized,
{
    let mut scratch: Block = [0; BLOCK_SIZE];
    let block = match map.resolve(ino, seg.fbn)? {
        Some(block) => {
            if !seg.is_full_block() {
                dev.read_block(block, &mut scratch)?;
            }
            block
        }
        None => map.allocate(ino, seg.fbn)?,
    };
    scratch[seg.block_range()].copy_from_slice(data);
    dev.write_block(block, &scratch)?;
    trace!(%ino, fbn = %seg.fbn, %block, offset = seg.offset_in_block, len = seg.len, "wrote block");
    Ok(())
}

fn resolve_or_allocate<M>(map: &mut M, ino: InodeNumber, fbn: FileBlockNumber) -> Result<BlockNumber>
where
    M: FileMap + ?Sized,
{
    match map.resolve(ino, fbn)? {
        Some(block) => Ok(block),
        None => map.allocate(ino, fbn),
    }
}
