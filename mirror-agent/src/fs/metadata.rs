//! Per-entry metadata captured while snapshotting a tree.
//!
//! An [`Entry`] records what the comparator needs to decide whether a replica
//! entry matches its source counterpart: kind, size and modification time,
//! plus a content fingerprint that is only computed on demand.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::SystemTime;

/// Kind of a mirrored filesystem object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,

    /// A link kept as a link. Only ever captured in the replica, where it is
    /// removed and replaced rather than followed.
    Symlink,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKind::File => f.write_str("file"),
            EntryKind::Directory => f.write_str("directory"),
            EntryKind::Symlink => f.write_str("symbolic link"),
        }
    }
}

/// SHA-256 digest of a file's content.
pub type Fingerprint = [u8; 32];

/// One filesystem object under a root.
#[derive(Debug)]
pub struct Entry {
    /// Path relative to the root; the identity key across trees
    pub relative_path: PathBuf,

    pub kind: EntryKind,

    /// Size in bytes (0 for directories)
    pub size: u64,

    /// Last modification time
    pub modified: SystemTime,

    fingerprint: OnceLock<Fingerprint>,
}

impl Entry {
    pub fn new(relative_path: PathBuf, kind: EntryKind, size: u64, modified: SystemTime) -> Self {
        Self {
            relative_path,
            kind,
            size: if kind == EntryKind::Directory { 0 } else { size },
            modified,
            fingerprint: OnceLock::new(),
        }
    }

    /// Build an entry from metadata. Metadata from `symlink_metadata` of a
    /// link yields a [`EntryKind::Symlink`] entry.
    pub fn from_metadata(relative_path: PathBuf, metadata: &fs::Metadata) -> io::Result<Self> {
        let kind = if metadata.is_symlink() {
            EntryKind::Symlink
        } else if metadata.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::File
        };

        Ok(Self::new(relative_path, kind, metadata.len(), metadata.modified()?))
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    /// Content fingerprint of this entry, read from `root` on first use and
    /// cached for the lifetime of the snapshot.
    pub fn fingerprint(&self, root: &Path) -> io::Result<Fingerprint> {
        if let Some(fp) = self.fingerprint.get() {
            return Ok(*fp);
        }

        let fp = hash_file(&root.join(&self.relative_path))?;
        Ok(*self.fingerprint.get_or_init(|| fp))
    }
}

/// Stream a file through SHA-256.
pub fn hash_file(path: &Path) -> io::Result<Fingerprint> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_entry_from_file_metadata() -> io::Result<()> {
        let mut temp_file = NamedTempFile::new()?;
        temp_file.write_all(b"test content")?;
        temp_file.flush()?;

        let metadata = fs::metadata(temp_file.path())?;
        let entry = Entry::from_metadata(PathBuf::from("file.txt"), &metadata)?;

        assert_eq!(entry.size, 12);
        assert_eq!(entry.kind, EntryKind::File);
        assert!(!entry.is_dir());

        Ok(())
    }

    #[test]
    fn test_directory_size_is_zero() -> io::Result<()> {
        let temp_dir = TempDir::new()?;
        let metadata = fs::metadata(temp_dir.path())?;
        let entry = Entry::from_metadata(PathBuf::from("dir"), &metadata)?;

        assert!(entry.is_dir());
        assert_eq!(entry.size, 0);

        Ok(())
    }

    #[test]
    #[cfg(unix)]
    fn test_link_metadata_is_symlink() -> io::Result<()> {
        let temp_dir = TempDir::new()?;
        let link = temp_dir.path().join("link");
        std::os::unix::fs::symlink(temp_dir.path(), &link)?;

        let entry = Entry::from_metadata(PathBuf::from("link"), &fs::symlink_metadata(&link)?)?;
        assert_eq!(entry.kind, EntryKind::Symlink);
        assert!(!entry.is_dir());
        assert_eq!(entry.kind.to_string(), "symbolic link");

        Ok(())
    }

    #[test]
    fn test_fingerprint_tracks_content() -> io::Result<()> {
        let temp_dir = TempDir::new()?;
        fs::write(temp_dir.path().join("a.txt"), b"same")?;
        fs::write(temp_dir.path().join("b.txt"), b"same")?;
        fs::write(temp_dir.path().join("c.txt"), b"diff")?;

        let now = SystemTime::now();
        let a = Entry::new(PathBuf::from("a.txt"), EntryKind::File, 4, now);
        let b = Entry::new(PathBuf::from("b.txt"), EntryKind::File, 4, now);
        let c = Entry::new(PathBuf::from("c.txt"), EntryKind::File, 4, now);

        assert_eq!(a.fingerprint(temp_dir.path())?, b.fingerprint(temp_dir.path())?);
        assert_ne!(a.fingerprint(temp_dir.path())?, c.fingerprint(temp_dir.path())?);

        Ok(())
    }

    #[test]
    fn test_fingerprint_is_cached() -> io::Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("a.txt");
        fs::write(&path, b"first")?;

        let entry = Entry::new(PathBuf::from("a.txt"), EntryKind::File, 5, SystemTime::now());
        let first = entry.fingerprint(temp_dir.path())?;

        fs::write(&path, b"second")?;
        assert_eq!(entry.fingerprint(temp_dir.path())?, first);

        Ok(())
    }

    #[test]
    fn test_fingerprint_missing_file_errors() {
        let temp_dir = TempDir::new().unwrap();
        let entry = Entry::new(PathBuf::from("gone.txt"), EntryKind::File, 0, SystemTime::now());
        assert!(entry.fingerprint(temp_dir.path()).is_err());
    }
}
