#![forbid(unsafe_code)]
//! File-backed images survive close and reopen.

use bfs_block::{BlockDevice, ByteBlockDevice, ByteDevice, FileByteDevice};
use bfs_error::BfsError;
use bfs_types::{BLOCK_SIZE, BlockNumber};

fn block_payload(block: u64, salt: u8) -> [u8; BLOCK_SIZE] {
    let mut out = [salt; BLOCK_SIZE];
    out[..8].copy_from_slice(&block.to_le_bytes());
    out
}

#[test]
fn blocks_persist_across_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("volume.img");

    {
        let dev = ByteBlockDevice::new(FileByteDevice::create(&path, 16).expect("create"))
            .expect("block device");
        assert_eq!(dev.block_count(), 16);
        for block in [0_u64, 5, 15] {
            dev.write_block(BlockNumber(block), &block_payload(block, 0xA5))
                .expect("write");
        }
        dev.sync().expect("sync");
    }

    let dev = ByteBlockDevice::new(FileByteDevice::open(&path).expect("open")).expect("reopen");
    assert!(dev.inner().is_writable());
    assert_eq!(dev.inner().len_bytes(), 16 * BLOCK_SIZE as u64);
    let mut buf = [0_u8; BLOCK_SIZE];
    for block in [0_u64, 5, 15] {
        dev.read_block(BlockNumber(block), &mut buf).expect("read");
        assert_eq!(buf, block_payload(block, 0xA5));
    }
    dev.read_block(BlockNumber(6), &mut buf).expect("read untouched");
    assert_eq!(buf, [0_u8; BLOCK_SIZE]);
}

#[test]
fn truncated_image_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("short.img");
    std::fs::write(&path, vec![0_u8; BLOCK_SIZE * 3 + 100]).expect("write image");

    let err = ByteBlockDevice::new(FileByteDevice::open(&path).expect("open")).unwrap_err();
    assert!(matches!(err, BfsError::Format(_)));
    assert!(err.to_string().contains("not block-aligned"), "{err}");
}
