#![forbid(unsafe_code)]
//! BFS public API facade.
//!
//! Re-exports the file API from `bfs-core` together with the device, error
//! and type crates it is expressed in. This is the crate that downstream
//! consumers (CLI, harness) depend on.

pub use bfs_block::{
    BlockDevice, ByteBlockDevice, ByteDevice, FileByteDevice, MemoryBlockDevice, MemoryByteDevice,
};
pub use bfs_core::*;
pub use bfs_error::{BfsError, ErrorKind, Result};
pub use bfs_types::{
    BLOCK_SIZE, BlockNumber, FileBlockNumber, FileDescriptor, InodeNumber, SEEK_CUR, SEEK_END,
    SEEK_SET, Whence,
};
