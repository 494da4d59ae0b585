//! Application of planned actions to the replica tree.
//!
//! Each call performs exactly one action. File content is first copied into a
//! temporary sibling and then renamed over the target, so a replica file is
//! either the old version or the complete new one.

use crate::fs::metadata::EntryKind;
use crate::sync::compare::Action;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::warn;

const PARTIAL_SUFFIX: &str = ".mirror-partial";

/// What a successfully applied action did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    /// File content copied. `modified` is the timestamp carried over from the
    /// source, or `None` if it could not be replicated.
    Copied {
        bytes: u64,
        modified: Option<SystemTime>,
    },
    DirectoryCreated,
    Removed,
}

/// Apply one action against `replica_root`, reading content from `source_root`.
///
/// # Returns
/// * `Ok(ActionOutcome)` - The action took effect
/// * `Err(io::Error)` - The replica is left as it was before the call
pub fn apply_action(action: &Action, source_root: &Path, replica_root: &Path) -> io::Result<ActionOutcome> {
    let target = replica_root.join(action.path());

    match action {
        Action::Create { kind: EntryKind::Directory, .. } => {
            fs::create_dir_all(&target)?;
            Ok(ActionOutcome::DirectoryCreated)
        }
        Action::Create { path, kind: EntryKind::File } | Action::Update { path } => {
            copy_file(&source_root.join(path), &target)
        }
        Action::Create { kind: EntryKind::Symlink, .. } => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "symbolic links are never created in the replica",
        )),
        // Removes the link itself, never what it points at
        Action::Delete { kind: EntryKind::File | EntryKind::Symlink, .. } => {
            fs::remove_file(&target)?;
            Ok(ActionOutcome::Removed)
        }
        Action::Delete { kind: EntryKind::Directory, .. } => {
            fs::remove_dir(&target)?;
            Ok(ActionOutcome::Removed)
        }
    }
}

/// Copy `source` to `target` through a temporary sibling, carrying the
/// modification time over on a best-effort basis.
pub fn copy_file(source: &Path, target: &Path) -> io::Result<ActionOutcome> {
    let partial = partial_path(target);

    let bytes = match fs::copy(source, &partial) {
        Ok(bytes) => bytes,
        Err(e) => {
            let _ = fs::remove_file(&partial);
            return Err(e);
        }
    };

    let modified = match preserve_mtime(source, &partial) {
        Ok(modified) => Some(modified),
        Err(e) => {
            warn!(path = %target.display(), error = %e, "Could not replicate modification time");
            None
        }
    };

    if let Err(e) = fs::rename(&partial, target) {
        let _ = fs::remove_file(&partial);
        return Err(e);
    }

    Ok(ActionOutcome::Copied { bytes, modified })
}

/// The copy already carries the source permissions, which may forbid
/// writing. On Unix the owner may set timestamps through a read-only handle.
fn preserve_mtime(source: &Path, target: &Path) -> io::Result<SystemTime> {
    let modified = fs::metadata(source)?.modified()?;

    #[cfg(unix)]
    let file = File::open(target)?;
    #[cfg(not(unix))]
    let file = File::options().write(true).open(target)?;

    file.set_modified(modified)?;
    Ok(modified)
}

fn partial_path(target: &Path) -> PathBuf {
    let mut name = OsString::from(".");
    name.push(target.file_name().unwrap_or_default());
    name.push(PARTIAL_SUFFIX);
    target.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn file_action(path: &str) -> Action {
        Action::Create { path: PathBuf::from(path), kind: EntryKind::File }
    }

    #[test]
    fn test_create_file_copies_content_and_mtime() -> io::Result<()> {
        let source = TempDir::new()?;
        let replica = TempDir::new()?;
        let mtime = SystemTime::UNIX_EPOCH + Duration::from_secs(100);

        fs::write(source.path().join("f1.txt"), b"hello")?;
        File::options()
            .write(true)
            .open(source.path().join("f1.txt"))?
            .set_modified(mtime)?;

        let outcome = apply_action(&file_action("f1.txt"), source.path(), replica.path())?;
        assert_eq!(outcome, ActionOutcome::Copied { bytes: 5, modified: Some(mtime) });

        let copied = replica.path().join("f1.txt");
        assert_eq!(fs::read(&copied)?, b"hello");
        assert_eq!(fs::metadata(&copied)?.modified()?, mtime);
        assert!(!replica.path().join(".f1.txt.mirror-partial").exists());

        Ok(())
    }

    #[test]
    #[cfg(unix)]
    fn test_read_only_source_keeps_mtime() -> io::Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let source = TempDir::new()?;
        let replica = TempDir::new()?;
        let mtime = SystemTime::UNIX_EPOCH + Duration::from_secs(100);
        let path = source.path().join("ro.txt");

        fs::write(&path, b"frozen")?;
        File::options().write(true).open(&path)?.set_modified(mtime)?;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o444))?;

        let outcome = apply_action(&file_action("ro.txt"), source.path(), replica.path())?;
        assert_eq!(outcome, ActionOutcome::Copied { bytes: 6, modified: Some(mtime) });

        let copied = fs::metadata(replica.path().join("ro.txt"))?;
        assert_eq!(copied.modified()?, mtime);
        assert_eq!(copied.permissions().mode() & 0o777, 0o444);

        // Rewriting a read-only replica file replaces it through the rename
        let update = Action::Update { path: PathBuf::from("ro.txt") };
        apply_action(&update, source.path(), replica.path())?;
        assert_eq!(fs::metadata(replica.path().join("ro.txt"))?.modified()?, mtime);

        Ok(())
    }

    #[test]
    fn test_update_overwrites_existing_file() -> io::Result<()> {
        let source = TempDir::new()?;
        let replica = TempDir::new()?;

        fs::write(source.path().join("f1.txt"), b"new content")?;
        fs::write(replica.path().join("f1.txt"), b"old")?;

        let action = Action::Update { path: PathBuf::from("f1.txt") };
        apply_action(&action, source.path(), replica.path())?;

        assert_eq!(fs::read(replica.path().join("f1.txt"))?, b"new content");
        Ok(())
    }

    #[test]
    fn test_create_directory() -> io::Result<()> {
        let source = TempDir::new()?;
        let replica = TempDir::new()?;

        let action = Action::Create { path: PathBuf::from("a/b"), kind: EntryKind::Directory };
        let outcome = apply_action(&action, source.path(), replica.path())?;

        assert_eq!(outcome, ActionOutcome::DirectoryCreated);
        assert!(replica.path().join("a/b").is_dir());
        Ok(())
    }

    #[test]
    fn test_delete_file_and_empty_directory() -> io::Result<()> {
        let source = TempDir::new()?;
        let replica = TempDir::new()?;
        fs::create_dir(replica.path().join("a"))?;
        fs::write(replica.path().join("a/b.txt"), b"b")?;

        let file = Action::Delete { path: PathBuf::from("a/b.txt"), kind: EntryKind::File };
        let dir = Action::Delete { path: PathBuf::from("a"), kind: EntryKind::Directory };

        assert_eq!(apply_action(&file, source.path(), replica.path())?, ActionOutcome::Removed);
        assert_eq!(apply_action(&dir, source.path(), replica.path())?, ActionOutcome::Removed);
        assert!(!replica.path().join("a").exists());
        Ok(())
    }

    #[test]
    fn test_delete_non_empty_directory_fails() -> io::Result<()> {
        let source = TempDir::new()?;
        let replica = TempDir::new()?;
        fs::create_dir(replica.path().join("a"))?;
        fs::write(replica.path().join("a/b.txt"), b"b")?;

        let dir = Action::Delete { path: PathBuf::from("a"), kind: EntryKind::Directory };
        assert!(apply_action(&dir, source.path(), replica.path()).is_err());
        assert!(replica.path().join("a/b.txt").exists());
        Ok(())
    }

    #[test]
    #[cfg(unix)]
    fn test_delete_symlink_removes_only_the_link() -> io::Result<()> {
        let source = TempDir::new()?;
        let replica = TempDir::new()?;
        let outside = TempDir::new()?;
        fs::write(outside.path().join("x.txt"), b"x")?;
        std::os::unix::fs::symlink(outside.path(), replica.path().join("d"))?;

        let delete = Action::Delete { path: PathBuf::from("d"), kind: EntryKind::Symlink };
        assert_eq!(apply_action(&delete, source.path(), replica.path())?, ActionOutcome::Removed);
        assert!(fs::symlink_metadata(replica.path().join("d")).is_err());
        assert!(outside.path().join("x.txt").exists());

        let create = Action::Create { path: PathBuf::from("d"), kind: EntryKind::Symlink };
        assert!(apply_action(&create, source.path(), replica.path()).is_err());
        Ok(())
    }

    #[test]
    fn test_missing_source_leaves_no_partial_file() -> io::Result<()> {
        let source = TempDir::new()?;
        let replica = TempDir::new()?;

        let result = apply_action(&file_action("gone.txt"), source.path(), replica.path());
        assert!(result.is_err());
        assert_eq!(fs::read_dir(replica.path())?.count(), 0);
        Ok(())
    }

    #[test]
    fn test_partial_path_is_hidden_sibling() {
        assert_eq!(
            partial_path(Path::new("/replica/a/f1.txt")),
            PathBuf::from("/replica/a/.f1.txt.mirror-partial")
        );
    }
}
