#![forbid(unsafe_code)]

pub mod fsx;

/// CRC-32C of `bytes` as 8 lowercase hex digits.
#[must_use]
pub fn crc32c_hex(bytes: &[u8]) -> String {
    format!("{:08x}", crc32c::crc32c(bytes))
}
