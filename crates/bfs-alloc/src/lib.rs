#![forbid(unsafe_code)]
//! Free-block allocation.
//!
//! ## Design
//!
//! The allocator is layered:
//!
//! 1. **Bitmap** — raw bit manipulation on a free-block bitmap.
//! 2. **BlockAllocator** — goal-directed single-block allocation over the
//!    whole device, with the leading metadata blocks permanently reserved.
//!
//! The bitmap is held in memory; persisting it is the on-disk layout's
//! concern, not the allocator's.

use bfs_error::{BfsError, Result};
use bfs_types::BlockNumber;
use tracing::{debug, trace};

// ── Bitmap operations ───────────────────────────────────────────────────────

/// Get bit `idx` from a bitmap byte slice.
#[must_use]
pub fn bitmap_get(bitmap: &[u8], idx: u32) -> bool {
    let byte_idx = (idx / 8) as usize;
    let bit_idx = idx % 8;
    if byte_idx >= bitmap.len() {
        return false;
    }
    (bitmap[byte_idx] >> bit_idx) & 1 == 1
}

/// Set bit `idx` in a bitmap byte slice.
pub fn bitmap_set(bitmap: &mut [u8], idx: u32) {
    let byte_idx = (idx / 8) as usize;
    let bit_idx = idx % 8;
    if byte_idx < bitmap.len() {
        bitmap[byte_idx] |= 1 << bit_idx;
    }
}

/// Clear bit `idx` in a bitmap byte slice.
pub fn bitmap_clear(bitmap: &mut [u8], idx: u32) {
    let byte_idx = (idx / 8) as usize;
    let bit_idx = idx % 8;
    if byte_idx < bitmap.len() {
        bitmap[byte_idx] &= !(1 << bit_idx);
    }
}

/// Find the first free (zero) bit in the first `count` bits of `bitmap`,
/// starting from `start`.
#[must_use]
pub fn bitmap_find_free(bitmap: &[u8], count: u32, start: u32) -> Option<u32> {
    for idx in start..count {
        if !bitmap_get(bitmap, idx) {
            return Some(idx);
        }
    }
    // Wrap around: search from 0 to start.
    (0..start.min(count)).find(|&idx| !bitmap_get(bitmap, idx))
}

// ── Block allocator ─────────────────────────────────────────────────────────

/// Bitmap-backed allocator over every block of a device.
///
/// Blocks `0..reserved` hold volume metadata and are never handed out or
/// freed.
#[derive(Debug, Clone)]
pub struct BlockAllocator {
    bitmap: Vec<u8>,
    total: u32,
    reserved: u32,
    free: u32,
}

impl BlockAllocator {
    /// Build an allocator for `total_blocks` blocks, the first `reserved` of
    /// which are marked in use.
    pub fn new(total_blocks: u64, reserved: u32) -> Result<Self> {
        let total = u32::try_from(total_blocks).map_err(|_| {
            BfsError::Format(format!(
                "device of {total_blocks} blocks exceeds allocator range"
            ))
        })?;
        if reserved >= total {
            return Err(BfsError::Format(format!(
                "reserved blocks ({reserved}) leave no data blocks on a {total}-block device"
            )));
        }

        let mut bitmap = vec![0_u8; total.div_ceil(8) as usize];
        for idx in 0..reserved {
            bitmap_set(&mut bitmap, idx);
        }
        Ok(Self {
            bitmap,
            total,
            reserved,
            free: total - reserved,
        })
    }

    /// Allocate one block, preferring the first free block at or after `goal`.
    pub fn alloc(&mut self, goal: Option<BlockNumber>) -> Result<BlockNumber> {
        let start = goal
            .and_then(|g| u32::try_from(g.0).ok())
            .filter(|g| *g >= self.reserved && *g < self.total)
            .unwrap_or(self.reserved);

        let Some(idx) = bitmap_find_free(&self.bitmap, self.total, start) else {
            debug!(total = self.total, "block allocator exhausted");
            return Err(BfsError::NoSpace);
        };
        bitmap_set(&mut self.bitmap, idx);
        self.free -= 1;
        trace!(block = idx, free = self.free, "allocated block");
        Ok(BlockNumber(u64::from(idx)))
    }

    /// Return `block` to the free pool.
    pub fn free(&mut self, block: BlockNumber) -> Result<()> {
        let idx = self.index_of(block)?;
        if idx < self.reserved {
            return Err(BfsError::Format(format!(
                "cannot free reserved metadata block {block}"
            )));
        }
        if !bitmap_get(&self.bitmap, idx) {
            return Err(BfsError::Format(format!("double free of block {block}")));
        }
        bitmap_clear(&mut self.bitmap, idx);
        self.free += 1;
        trace!(block = idx, free = self.free, "freed block");
        Ok(())
    }

    #[must_use]
    pub fn free_blocks(&self) -> u32 {
        self.free
    }

    fn index_of(&self, block: BlockNumber) -> Result<u32> {
        u32::try_from(block.0)
            .ok()
            .filter(|idx| *idx < self.total)
            .ok_or_else(|| {
                BfsError::Format(format!(
                    "block out of range: block={block} block_count={}",
                    self.total
                ))
            })
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
