#![forbid(unsafe_code)]
//! Shared newtypes and constants for BFS.
//!
//! Physical and logical block numbers are distinct types so that a file's
//! logical position (`FileBlockNumber`) can never be handed to the block
//! store where an absolute address (`BlockNumber`) is expected.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Size in bytes of one block, shared by the block store and every layer above.
pub const BLOCK_SIZE: usize = 512;

/// `BLOCK_SIZE` as a `u64`, for byte-offset arithmetic.
pub const BLOCK_SIZE_U64: u64 = BLOCK_SIZE as u64;

/// One whole block of data. Block transfers always move exactly this much.
pub type Block = [u8; BLOCK_SIZE];

/// Raw `whence` values accepted by [`Whence::from_raw`].
pub const SEEK_SET: i32 = 0;
pub const SEEK_CUR: i32 = 1;
pub const SEEK_END: i32 = 2;

/// Absolute block number on the block store (a "dbn").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockNumber(pub u64);

/// Block index within a single file's byte stream (an "fbn").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FileBlockNumber(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InodeNumber(pub u64);

/// Handle for one open session on a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FileDescriptor(pub u32);

/// Byte offset on a `ByteDevice` (pread/pwrite semantics).
///
/// This is a unit-carrying wrapper to prevent mixing bytes and blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ByteOffset(pub u64);

impl BlockNumber {
    /// Byte offset of the first byte of this block on the device.
    #[must_use]
    pub fn to_byte_offset(self) -> Option<ByteOffset> {
        self.0.checked_mul(BLOCK_SIZE_U64).map(ByteOffset)
    }

    #[must_use]
    pub fn checked_add(self, blocks: u64) -> Option<Self> {
        self.0.checked_add(blocks).map(Self)
    }
}

impl FileBlockNumber {
    /// The logical block containing the file byte at `offset`.
    #[must_use]
    pub fn containing(offset: u64) -> Self {
        Self(offset / BLOCK_SIZE_U64)
    }

    /// The first logical block that starts at or after `offset`.
    #[must_use]
    pub fn first_at_or_after(offset: u64) -> Self {
        Self(offset.div_ceil(BLOCK_SIZE_U64))
    }

}

/// Position of `offset` inside its block.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn offset_in_block(offset: u64) -> usize {
    // Always < BLOCK_SIZE.
    (offset % BLOCK_SIZE_U64) as usize
}

impl ByteOffset {
    /// Add a byte count, returning `None` on overflow.
    #[must_use]
    pub fn checked_add(self, bytes: u64) -> Option<Self> {
        self.0.checked_add(bytes).map(Self)
    }
}

/// Reference point for a seek.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Whence {
    /// Absolute offset from the start of the file.
    Set,
    /// Relative to the current cursor.
    Current,
    /// Relative to the current file size.
    End,
}

impl Whence {
    /// Decode a POSIX-style `whence` value. Unknown values yield `None`.
    #[must_use]
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            SEEK_SET => Some(Self::Set),
            SEEK_CUR => Some(Self::Current),
            SEEK_END => Some(Self::End),
            _ => None,
        }
    }
}

impl fmt::Display for BlockNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for FileBlockNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for InodeNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for FileDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ByteOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for Whence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Set => "set",
            Self::Current => "current",
            Self::End => "end",
        };
        f.write_str(name)
    }
}
