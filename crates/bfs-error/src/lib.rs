#![forbid(unsafe_code)]
//! Error types for BFS.
//!
//! # Error Taxonomy
//!
//! Every `BfsError` variant belongs to exactly one [`ErrorKind`]:
//!
//! | Kind | Variants | Raised by |
//! |------|----------|-----------|
//! | `InvalidArgument` | `InvalidLength`, `NegativeOffset`, `NegativeCursor`, `BadWhence`, `OffsetOverflow`, `InvalidName` | byte-range translator, seek, directory |
//! | `Allocation` | `NoSpace`, `FileTooLarge`, `BlockAlreadyBound` | allocation service, surfaced through read/write |
//! | `Lookup` | `NotFound`, `Exists`, `BadDescriptor`, `TooManyOpenFiles`, `NoFreeInode` | allocation service (name and descriptor tables) |
//! | `Device` | `Io`, `Format` | block store |
//!
//! The file API never retries and never terminates the process. A failure is
//! returned to the caller, which decides whether to abort or recover. Reading
//! at or past end-of-file is not an error: it returns 0 bytes.
//!
//! ## errno Mapping
//!
//! Every variant maps to exactly one POSIX errno via [`BfsError::to_errno`].
//! The mapping is exhaustive (no wildcard arms) so adding a new variant is a
//! compile error until its errno is assigned.
//!
//! | Variant | errno |
//! |---------|-------|
//! | `Io` | raw OS error, else `EIO` |
//! | `Format` | `EINVAL` |
//! | `InvalidLength` | `EINVAL` |
//! | `NegativeOffset` | `EINVAL` |
//! | `NegativeCursor` | `EINVAL` |
//! | `BadWhence` | `EINVAL` |
//! | `OffsetOverflow` | `EFBIG` |
//! | `InvalidName` | `EINVAL` |
//! | `NoSpace` | `ENOSPC` |
//! | `FileTooLarge` | `EFBIG` |
//! | `BlockAlreadyBound` | `EEXIST` |
//! | `NotFound` | `ENOENT` |
//! | `Exists` | `EEXIST` |
//! | `BadDescriptor` | `EBADF` |
//! | `TooManyOpenFiles` | `EMFILE` |
//! | `NoFreeInode` | `ENOSPC` |
//!
//! ## Design Constraints
//!
//! - `bfs-error` MUST NOT depend on `bfs-types`; payloads are plain integers.
//! - All string payloads are owned (`String`).

use thiserror::Error;

/// Coarse classification of a [`BfsError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The caller passed a length, offset or mode the API cannot honor.
    InvalidArgument,
    /// The allocation service could not provide a physical block.
    Allocation,
    /// A name, inode or descriptor could not be resolved.
    Lookup,
    /// The block store failed or was misconfigured.
    Device,
}

/// Unified error type for all BFS operations.
#[derive(Debug, Error)]
pub enum BfsError {
    /// Operating system I/O error (wraps `std::io::Error`).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid device geometry or out-of-range block address.
    #[error("invalid device format: {0}")]
    Format(String),

    /// A read or write was asked to transfer zero bytes.
    #[error("invalid transfer length: {len}")]
    InvalidLength { len: usize },

    /// An absolute seek was given a negative offset.
    #[error("negative seek offset: {offset}")]
    NegativeOffset { offset: i64 },

    /// A relative seek would move the cursor before the start of the file.
    #[error("seek from {base} by {offset} yields a negative cursor")]
    NegativeCursor { base: u64, offset: i64 },

    /// Unknown seek mode.
    #[error("invalid whence: {0}")]
    BadWhence(i32),

    /// A byte offset computation exceeded the representable range.
    #[error("byte offset overflow: {base} + {len}")]
    OffsetOverflow { base: u64, len: u64 },

    /// A directory entry name is empty, too long, or contains `/` or NUL.
    #[error("invalid file name: {0}")]
    InvalidName(String),

    /// No free blocks available.
    #[error("no space left on device")]
    NoSpace,

    /// The file's block map cannot address the requested logical block.
    #[error("file too large: inode {ino} cannot map logical block {fbn} (limit {limit} blocks)")]
    FileTooLarge { ino: u64, fbn: u64, limit: u64 },

    /// The logical block already has a physical block behind it.
    #[error("inode {ino} logical block {fbn} already bound to block {block}")]
    BlockAlreadyBound { ino: u64, fbn: u64, block: u64 },

    /// File name or inode not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A directory entry with this name already exists.
    #[error("already exists: {0}")]
    Exists(String),

    /// The descriptor is not bound to an open file.
    #[error("bad file descriptor: {0}")]
    BadDescriptor(u32),

    /// The open-file table has no free slot.
    #[error("too many open files")]
    TooManyOpenFiles,

    /// The inode table has no free slot.
    #[error("no free inode")]
    NoFreeInode,
}

impl BfsError {
    /// Convert this error into a POSIX errno.
    ///
    /// The mapping is exhaustive: every variant has an explicit arm.
    #[must_use]
    pub fn to_errno(&self) -> libc::c_int {
        match self {
            Self::Io(err) => err.raw_os_error().unwrap_or(libc::EIO),
            Self::Format(_)
            | Self::InvalidLength { .. }
            | Self::NegativeOffset { .. }
            | Self::NegativeCursor { .. }
            | Self::BadWhence(_)
            | Self::InvalidName(_) => libc::EINVAL,
            Self::OffsetOverflow { .. } | Self::FileTooLarge { .. } => libc::EFBIG,
            Self::NoSpace | Self::NoFreeInode => libc::ENOSPC,
            Self::BlockAlreadyBound { .. } | Self::Exists(_) => libc::EEXIST,
            Self::NotFound(_) => libc::ENOENT,
            Self::BadDescriptor(_) => libc::EBADF,
            Self::TooManyOpenFiles => libc::EMFILE,
        }
    }

    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidLength { .. }
            | Self::NegativeOffset { .. }
            | Self::NegativeCursor { .. }
            | Self::BadWhence(_)
            | Self::OffsetOverflow { .. }
            | Self::InvalidName(_) => ErrorKind::InvalidArgument,
            Self::NoSpace | Self::FileTooLarge { .. } | Self::BlockAlreadyBound { .. } => {
                ErrorKind::Allocation
            }
            Self::NotFound(_)
            | Self::Exists(_)
            | Self::BadDescriptor(_)
            | Self::TooManyOpenFiles
            | Self::NoFreeInode => ErrorKind::Lookup,
            Self::Io(_) | Self::Format(_) => ErrorKind::Device,
        }
    }
}

/// Result alias using `BfsError`.
pub type Result<T> = std::result::Result<T, BfsError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn all_variants() -> Vec<BfsError> {
        vec![
            BfsError::Io(std::io::Error::other("test")),
            BfsError::Format("test".into()),
            BfsError::InvalidLength { len: 0 },
            BfsError::NegativeOffset { offset: -1 },
            BfsError::NegativeCursor {
                base: 4,
                offset: -5,
            },
            BfsError::BadWhence(7),
            BfsError::OffsetOverflow {
                base: u64::MAX,
                len: 1,
            },
            BfsError::InvalidName(String::new()),
            BfsError::NoSpace,
            BfsError::FileTooLarge {
                ino: 1,
                fbn: 2048,
                limit: 1024,
            },
            BfsError::BlockAlreadyBound {
                ino: 1,
                fbn: 0,
                block: 3,
            },
            BfsError::NotFound("test".into()),
            BfsError::Exists("test".into()),
            BfsError::BadDescriptor(9),
            BfsError::TooManyOpenFiles,
            BfsError::NoFreeInode,
        ]
    }

    #[test]
    fn errno_mapping_covers_all_variants() {
        let expected = [
            libc::EIO,
            libc::EINVAL,
            libc::EINVAL,
            libc::EINVAL,
            libc::EINVAL,
            libc::EINVAL,
            libc::EFBIG,
            libc::EINVAL,
            libc::ENOSPC,
            libc::EFBIG,
            libc::EEXIST,
            libc::ENOENT,
            libc::EEXIST,
            libc::EBADF,
            libc::EMFILE,
            libc::ENOSPC,
        ];
        let cases = all_variants();
        assert_eq!(cases.len(), expected.len());
        for (error, expected_errno) in cases.iter().zip(expected) {
            assert_eq!(error.to_errno(), expected_errno, "wrong errno for {error:?}");
        }
    }

    #[test]
    fn io_error_preserves_raw_os_error() {
        let raw = std::io::Error::from_raw_os_error(libc::EPERM);
        let err = BfsError::Io(raw);
        assert_eq!(err.to_errno(), libc::EPERM);
    }

    #[test]
    fn kinds_partition_variants() {
        let kinds: Vec<ErrorKind> = all_variants().iter().map(BfsError::kind).collect();
        assert_eq!(
            kinds,
            vec![
                ErrorKind::Device,
                ErrorKind::Device,
                ErrorKind::InvalidArgument,
                ErrorKind::InvalidArgument,
                ErrorKind::InvalidArgument,
                ErrorKind::InvalidArgument,
                ErrorKind::InvalidArgument,
                ErrorKind::InvalidArgument,
                ErrorKind::Allocation,
                ErrorKind::Allocation,
                ErrorKind::Allocation,
                ErrorKind::Lookup,
                ErrorKind::Lookup,
                ErrorKind::Lookup,
                ErrorKind::Lookup,
                ErrorKind::Lookup,
            ]
        );
    }

    #[test]
    fn namespace_errors_are_not_device_faults() {
        assert_eq!(
            BfsError::InvalidName(String::new()).kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(BfsError::Exists("a".into()).kind(), ErrorKind::Lookup);
        let rebind = BfsError::BlockAlreadyBound {
            ino: 1,
            fbn: 0,
            block: 3,
        };
        assert_eq!(rebind.kind(), ErrorKind::Allocation);
        assert_eq!(rebind.to_errno(), libc::EEXIST);
    }

    #[test]
    fn display_formatting() {
        let err = BfsError::NegativeCursor {
            base: 10,
            offset: -11,
        };
        assert_eq!(
            err.to_string(),
            "seek from 10 by -11 yields a negative cursor"
        );

        let big = BfsError::FileTooLarge {
            ino: 3,
            fbn: 1024,
            limit: 1024,
        };
        assert_eq!(
            big.to_string(),
            "file too large: inode 3 cannot map logical block 1024 (limit 1024 blocks)"
        );

        assert_eq!(BfsError::BadWhence(5).to_string(), "invalid whence: 5");
        assert_eq!(BfsError::NoSpace.to_string(), "no space left on device");
        assert_eq!(BfsError::BadDescriptor(4).to_string(), "bad file descriptor: 4");
        assert_eq!(
            BfsError::InvalidName("a/b".into()).to_string(),
            "invalid file name: a/b"
        );
    }
}
