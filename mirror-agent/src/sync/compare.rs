//! Tree comparison producing the ordered action plan for one cycle.
//!
//! The plan is split in two phases. Phase one holds creates and updates in
//! parent-first order; a path whose kind changed keeps its deletes grouped
//! with the create that replaces it. Phase two holds the remaining deletes in
//! child-first order. Applying the flattened plan front to back never creates
//! inside a missing parent and never removes a non-empty directory.

use crate::fs::metadata::{Entry, EntryKind};
use crate::fs::walker::{LinkPolicy, SkippedEntry, Snapshot, WalkOptions};
use crate::utils::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// How two files with the same relative path are judged equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompareMode {
    /// Size and modification time only
    #[default]
    Metadata,

    /// Size and modification time, then content hash when both agree
    Checksum,
}

#[derive(Debug, Clone, Default)]
pub struct CompareOptions {
    pub mode: CompareMode,

    /// Largest modification time difference still treated as equal
    pub modify_window: Duration,
}

/// One intended change to the replica.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Create { path: PathBuf, kind: EntryKind },
    Update { path: PathBuf },
    Delete { path: PathBuf, kind: EntryKind },
}

impl Action {
    pub fn path(&self) -> &Path {
        match self {
            Action::Create { path, .. } | Action::Update { path } | Action::Delete { path, .. } => path,
        }
    }

    pub fn depth(&self) -> usize {
        self.path().components().count()
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Create { path, kind } => write!(f, "create {kind} '{}'", path.display()),
            Action::Update { path } => write!(f, "update file '{}'", path.display()),
            Action::Delete { path, kind } => write!(f, "delete {kind} '{}'", path.display()),
        }
    }
}

/// A phase-one unit of work. Usually a single create or update; a kind swap
/// carries the deletes that must run before its create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub depth: usize,
    pub actions: Vec<Action>,
}

/// A skipped entry annotated with the tree it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skipped {
    pub root: &'static str,
    pub entry: SkippedEntry,
}

/// Result of comparing two trees.
#[derive(Debug, Default)]
pub struct Plan {
    steps: Vec<Step>,
    deletes: Vec<Action>,
    pub skipped: Vec<Skipped>,
}

impl Plan {
    /// Phase one, parents first.
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Phase two, children first.
    pub fn deletes(&self) -> &[Action] {
        &self.deletes
    }

    /// The full ordered action sequence.
    pub fn actions(&self) -> impl Iterator<Item = &Action> {
        self.steps
            .iter()
            .flat_map(|step| step.actions.iter())
            .chain(self.deletes.iter())
    }

    pub fn len(&self) -> usize {
        self.steps.iter().map(|s| s.actions.len()).sum::<usize>() + self.deletes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty() && self.deletes.is_empty()
    }
}

/// Snapshot both roots and compute the action plan. Never writes to either tree.
///
/// Links inside the replica are always captured as links, so a link standing
/// where the source has a directory is replaced instead of written through.
pub fn diff(
    source_root: &Path,
    replica_root: &Path,
    options: &CompareOptions,
    walk: &WalkOptions,
) -> Result<Plan> {
    let source = Snapshot::capture(source_root, "source", walk)?;
    let replica_walk = WalkOptions {
        links: LinkPolicy::Preserve,
        ..walk.clone()
    };
    let replica = Snapshot::capture(replica_root, "replica", &replica_walk)?;

    let mut plan = diff_snapshots(&source, &replica, options);
    plan.skipped = source
        .skipped()
        .iter()
        .map(|entry| Skipped { root: "source", entry: entry.clone() })
        .chain(
            replica
                .skipped()
                .iter()
                .map(|entry| Skipped { root: "replica", entry: entry.clone() }),
        )
        .collect();

    Ok(plan)
}

/// Compare two captured snapshots.
pub fn diff_snapshots(source: &Snapshot, replica: &Snapshot, options: &CompareOptions) -> Plan {
    let mut steps = Vec::new();
    // Replica directories replaced by files; everything below them is
    // already deleted inside the swap step.
    let mut swapped_dirs: Vec<&Path> = Vec::new();

    for src in source.iter() {
        let path = &src.relative_path;
        let depth = path.components().count();

        let Some(rep) = replica.get(path) else {
            steps.push(Step {
                depth,
                actions: vec![Action::Create { path: path.clone(), kind: src.kind }],
            });
            continue;
        };

        if rep.kind != src.kind {
            let mut actions = Vec::new();
            if rep.is_dir() {
                actions.extend(replica.descendants(path).into_iter().rev().map(|child| Action::Delete {
                    path: child.relative_path.clone(),
                    kind: child.kind,
                }));
                swapped_dirs.push(path);
            }
            actions.push(Action::Delete { path: path.clone(), kind: rep.kind });
            actions.push(Action::Create { path: path.clone(), kind: src.kind });
            steps.push(Step { depth, actions });
            continue;
        }

        if !src.is_dir() && file_changed(src, source.root(), rep, replica.root(), options) {
            steps.push(Step {
                depth,
                actions: vec![Action::Update { path: path.clone() }],
            });
        }
    }

    let deletes = replica
        .iter()
        .rev()
        .filter(|rep| !source.contains(&rep.relative_path))
        .filter(|rep| !swapped_dirs.iter().any(|dir| rep.relative_path.starts_with(dir)))
        .filter(|rep| !source.is_shadowed_by_skip(&rep.relative_path))
        .map(|rep| Action::Delete {
            path: rep.relative_path.clone(),
            kind: rep.kind,
        })
        .collect();

    Plan {
        steps,
        deletes,
        skipped: Vec::new(),
    }
}

fn file_changed(
    src: &Entry,
    source_root: &Path,
    rep: &Entry,
    replica_root: &Path,
    options: &CompareOptions,
) -> bool {
    if src.size != rep.size {
        return true;
    }

    if time_delta(src.modified, rep.modified) > options.modify_window {
        return true;
    }

    match options.mode {
        CompareMode::Metadata => false,
        CompareMode::Checksum => {
            match (src.fingerprint(source_root), rep.fingerprint(replica_root)) {
                (Ok(a), Ok(b)) => a != b,
                // Unreadable content counts as changed; the copy will surface the error
                _ => true,
            }
        }
    }
}

fn time_delta(a: SystemTime, b: SystemTime) -> Duration {
    match a.duration_since(b) {
        Ok(d) => d,
        Err(e) => e.duration(),
    }
}
