//! Logical Block Span decomposition.
//!
//! A byte range `[start, start + len)` in a file is split into one segment
//! per logical block it touches. Only the first and last segments can be
//! partial; every segment in between covers a whole block.

use bfs_error::{BfsError, Result};
use bfs_types::{BLOCK_SIZE, FileBlockNumber, offset_in_block};
use std::ops::Range;

/// The part of one logical block covered by a byte range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpanSegment {
    pub fbn: FileBlockNumber,
    /// First covered byte within the block.
    pub offset_in_block: usize,
    /// Number of covered bytes, at least 1 and at most `BLOCK_SIZE`.
    pub len: usize,
    /// Position of this segment's first byte in the caller's buffer.
    pub buf_offset: usize,
}

impl SpanSegment {
    #[must_use]
    pub fn is_full_block(&self) -> bool {
        self.len == BLOCK_SIZE
    }

    /// Covered bytes, as indices into a block buffer.
    #[must_use]
    pub fn block_range(&self) -> Range<usize> {
        self.offset_in_block..self.offset_in_block + self.len
    }

    /// Covered bytes, as indices into the caller's buffer.
    #[must_use]
    pub fn buf_range(&self) -> Range<usize> {
        self.buf_offset..self.buf_offset + self.len
    }
}

/// Iterator over the segments of a byte range, in file order.
#[derive(Debug, Clone)]
pub struct BlockSpan {
    start: u64,
    len: usize,
    done: usize,
}

impl BlockSpan {
    /// Decompose `[start, start + len)`. Fails if the end is not representable.
    pub fn new(start: u64, len: usize) -> Result<Self> {
        let len_u64 = len as u64;
        if start.checked_add(len_u64).is_none() {
            return Err(BfsError::OffsetOverflow {
                base: start,
                len: len_u64,
            });
        }
        Ok(Self {
            start,
            len,
            done: 0,
        })
    }

    /// One past the last byte of the range.
    #[must_use]
    pub fn end(&self) -> u64 {
        self.start + self.len as u64
    }
}

impl Iterator for BlockSpan {
    type Item = SpanSegment;

    fn next(&mut self) -> Option<SpanSegment> {
        if self.done >= self.len {
            return None;
        }
        let pos = self.start + self.done as u64;
        let offset_in_block = offset_in_block(pos);
        let len = (BLOCK_SIZE - offset_in_block).min(self.len - self.done);
        let segment = SpanSegment {
            fbn: FileBlockNumber::containing(pos),
            offset_in_block,
            len,
            buf_offset: self.done,
        };
        self.done += len;
        Some(segment)
    }
}

/// Logical blocks lying wholly inside `[start, end)`.
pub fn blocks_wholly_inside(start: u64, end: u64) -> impl Iterator<Item = FileBlockNumber> {
    let first = FileBlockNumber::first_at_or_after(start).0;
    let stop = FileBlockNumber::containing(end).0;
    (first..stop).map(FileBlockNumber)
}
