//! Directory traversal into immutable tree snapshots.
//!
//! A [`Snapshot`] is rebuilt from scratch every cycle by walking one root in
//! lexicographic order. Entries that cannot be read are recorded as skipped
//! instead of aborting the walk.

use crate::fs::metadata::Entry;
use crate::utils::{MirrorError, Result};
use std::collections::BTreeMap;
use std::fs;
use std::ops::Bound;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// How symbolic links met during a walk are captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkPolicy {
    /// Links to files are captured as the file they point at; links to
    /// directories and broken links are skipped
    #[default]
    Resolve,

    /// Every link is captured as a
    /// [`Symlink`](crate::fs::metadata::EntryKind::Symlink) entry and never
    /// followed
    Preserve,
}

/// Options for directory walking
#[derive(Debug, Clone, Default)]
pub struct WalkOptions {
    /// Entries whose file name contains any of these patterns are ignored
    pub exclude_patterns: Vec<String>,

    pub links: LinkPolicy,
}

/// An entry the walk could not capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntry {
    /// Path relative to the root (empty when the root listing itself failed)
    pub relative_path: PathBuf,

    pub reason: String,
}

/// Ordered-by-path view of one root at a point in time.
#[derive(Debug)]
pub struct Snapshot {
    root: PathBuf,
    entries: BTreeMap<PathBuf, Entry>,
    skipped: Vec<SkippedEntry>,
}

impl Snapshot {
    /// Walk `root` and capture every entry beneath it.
    ///
    /// # Arguments
    /// * `root` - Root directory to walk
    /// * `role` - "source" or "replica", used in error messages
    /// * `options` - Walking options
    ///
    /// # Returns
    /// * `Ok(Snapshot)` - Even when individual entries were skipped
    /// * `Err(MirrorError::RootUnavailable)` - If `root` is missing or not a directory
    pub fn capture(root: &Path, role: &'static str, options: &WalkOptions) -> Result<Self> {
        check_root(root, role)?;

        let mut entries = BTreeMap::new();
        let mut skipped = Vec::new();

        let walker = WalkDir::new(root)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !should_exclude(e, &options.exclude_patterns));

        for result in walker {
            let entry = match result {
                Ok(entry) => entry,
                Err(err) => {
                    let relative_path = err
                        .path()
                        .map(|p| relative_to(p, root))
                        .unwrap_or_default();
                    skipped.push(SkippedEntry {
                        relative_path,
                        reason: err.to_string(),
                    });
                    continue;
                }
            };

            let relative_path = relative_to(entry.path(), root);
            match capture_entry(&entry, relative_path.clone(), options.links) {
                Ok(captured) => {
                    entries.insert(relative_path, captured);
                }
                Err(reason) => skipped.push(SkippedEntry {
                    relative_path,
                    reason,
                }),
            }
        }

        Ok(Self {
            root: root.to_path_buf(),
            entries,
            skipped,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn get(&self, relative_path: &Path) -> Option<&Entry> {
        self.entries.get(relative_path)
    }

    pub fn contains(&self, relative_path: &Path) -> bool {
        self.entries.contains_key(relative_path)
    }

    /// Entries in lexicographic, component-wise path order (parents first).
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Entry> {
        self.entries.values()
    }

    /// Entries strictly beneath `relative_path`, parents first.
    pub fn descendants(&self, relative_path: &Path) -> Vec<&Entry> {
        self.entries
            .range::<Path, _>((Bound::Excluded(relative_path), Bound::Unbounded))
            .take_while(|(path, _)| path.starts_with(relative_path))
            .map(|(_, entry)| entry)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn skipped(&self) -> &[SkippedEntry] {
        &self.skipped
    }

    /// True if `relative_path` is a skipped entry or lies beneath one.
    pub fn is_shadowed_by_skip(&self, relative_path: &Path) -> bool {
        self.skipped
            .iter()
            .any(|s| relative_path.starts_with(&s.relative_path))
    }
}

/// Verify that `root` exists and is a directory.
pub fn check_root(root: &Path, role: &'static str) -> Result<()> {
    let metadata = fs::metadata(root).map_err(|e| MirrorError::RootUnavailable {
        role,
        path: root.to_path_buf(),
        reason: e.to_string(),
    })?;

    if !metadata.is_dir() {
        return Err(MirrorError::RootUnavailable {
            role,
            path: root.to_path_buf(),
            reason: "not a directory".to_string(),
        });
    }

    Ok(())
}

/// Capture one walked entry according to `links`.
fn capture_entry(entry: &DirEntry, relative_path: PathBuf, links: LinkPolicy) -> std::result::Result<Entry, String> {
    let file_type = entry.file_type();

    let metadata = if file_type.is_symlink() && links == LinkPolicy::Resolve {
        match fs::metadata(entry.path()) {
            Ok(resolved) if resolved.is_dir() => {
                return Err("symbolic link to a directory".to_string());
            }
            Ok(resolved) => resolved,
            Err(e) => return Err(format!("broken symbolic link: {e}")),
        }
    } else {
        entry.metadata().map_err(|e| e.to_string())?
    };

    if !metadata.is_file() && !metadata.is_dir() && !metadata.is_symlink() {
        return Err("unsupported file type".to_string());
    }

    Entry::from_metadata(relative_path, &metadata).map_err(|e| e.to_string())
}

fn relative_to(path: &Path, root: &Path) -> PathBuf {
    path.strip_prefix(root).unwrap_or(path).to_path_buf()
}

/// Check if a directory entry should be excluded based on patterns
fn should_exclude(entry: &DirEntry, patterns: &[String]) -> bool {
    if entry.depth() == 0 {
        return false;
    }

    let file_name = entry.file_name().to_string_lossy();
    patterns.iter().any(|pattern| file_name.contains(pattern.as_str()))
}
