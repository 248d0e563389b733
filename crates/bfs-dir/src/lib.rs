#![forbid(unsafe_code)]
//! Directory operations.
//!
//! A volume has a single flat namespace: every file name maps directly to an
//! inode. There are no subdirectories, `.` or `..` entries.

use bfs_error::{BfsError, Result};
use bfs_types::InodeNumber;
use std::collections::BTreeMap;

/// Longest accepted file name, in bytes.
pub const MAX_NAME_LEN: usize = 255;

/// Check that `name` can be stored as a directory entry.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(BfsError::InvalidName("name cannot be empty".to_owned()));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(BfsError::InvalidName(format!(
            "name exceeds {MAX_NAME_LEN} bytes"
        )));
    }
    if name.contains(['/', '\0']) {
        return Err(BfsError::InvalidName(format!(
            "{name:?} contains a path separator or NUL"
        )));
    }
    Ok(())
}

/// Name table for one volume, kept in name order.
#[derive(Debug, Clone, Default)]
pub struct Directory {
    entries: BTreeMap<String, InodeNumber>,
}

impl Directory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `name`, returning `None` when no such entry exists.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<InodeNumber> {
        self.entries.get(name).copied()
    }

    /// Resolve `name`, failing with `NotFound` when absent.
    pub fn lookup(&self, name: &str) -> Result<InodeNumber> {
        self.get(name)
            .ok_or_else(|| BfsError::NotFound(name.to_owned()))
    }

    /// Add a new entry. The name must be valid and not already present.
    pub fn insert(&mut self, name: &str, ino: InodeNumber) -> Result<()> {
        validate_name(name)?;
        if self.entries.contains_key(name) {
            return Err(BfsError::Exists(name.to_owned()));
        }
        self.entries.insert(name.to_owned(), ino);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_lookup() {
        let mut dir = Directory::new();
        dir.insert("alpha", InodeNumber(1)).expect("insert");
        dir.insert("beta", InodeNumber(2)).expect("insert");

        assert_eq!(dir.lookup("alpha").unwrap(), InodeNumber(1));
        assert_eq!(dir.get("beta"), Some(InodeNumber(2)));
    }

    #[test]
    fn missing_name_is_not_found() {
        let dir = Directory::new();
        let err = dir.lookup("ghost").unwrap_err();
        assert!(matches!(err, BfsError::NotFound(ref name) if name == "ghost"));
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let mut dir = Directory::new();
        dir.insert("a", InodeNumber(1)).unwrap();
        let err = dir.insert("a", InodeNumber(2)).unwrap_err();
        assert!(matches!(err, BfsError::Exists(ref name) if name == "a"), "{err:?}");
        assert_eq!(dir.lookup("a").unwrap(), InodeNumber(1));
    }

    #[test]
    fn invalid_names_are_rejected() {
        let mut dir = Directory::new();
        for bad in [String::new(), "x".repeat(256), "a/b".to_owned(), "nul\0".to_owned()] {
            let err = dir.insert(&bad, InodeNumber(1)).unwrap_err();
            assert!(matches!(err, BfsError::InvalidName(_)), "{bad:?}: {err:?}");
        }
        dir.insert(&"x".repeat(255), InodeNumber(1))
            .expect("255-byte name fits");
    }
}
