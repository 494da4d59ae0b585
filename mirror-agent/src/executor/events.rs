//! Structured events emitted by the driver and the sinks that consume them.

use crate::sync::{Action, ActionOutcome};
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    ActionApplied {
        action: Action,
        outcome: ActionOutcome,
    },
    ActionFailed {
        action: Action,
        error: String,
    },
    EntrySkipped {
        root: &'static str,
        path: PathBuf,
        reason: String,
    },
    CycleSummary {
        cycle: u64,
        applied: usize,
        failed: usize,
        skipped: usize,
        duration_ms: u64,
    },
    FatalCycleError {
        cycle: u64,
        reason: String,
    },
}

/// Receiver of driver events. Called from blocking worker threads.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: SyncEvent);
}

impl EventSink for mpsc::UnboundedSender<SyncEvent> {
    fn emit(&self, event: SyncEvent) {
        // A dropped receiver only means nobody is listening anymore
        let _ = self.send(event);
    }
}

/// Renders every event as one tracing record.
#[derive(Debug, Clone)]
pub struct TracingSink {
    source_root: PathBuf,
    replica_root: PathBuf,
}

impl TracingSink {
    pub fn new(source_root: impl Into<PathBuf>, replica_root: impl Into<PathBuf>) -> Self {
        Self {
            source_root: source_root.into(),
            replica_root: replica_root.into(),
        }
    }

    fn root_for(&self, root: &str) -> &Path {
        if root == "source" {
            &self.source_root
        } else {
            &self.replica_root
        }
    }
}

impl EventSink for TracingSink {
    fn emit(&self, event: SyncEvent) {
        match event {
            SyncEvent::ActionApplied { action, outcome } => {
                let replica_path = self.replica_root.join(action.path());
                let when = match &outcome {
                    ActionOutcome::Copied { modified: Some(t), .. } => format_time(*t),
                    _ => format_time(SystemTime::now()),
                };
                match outcome {
                    ActionOutcome::Copied { bytes, .. } => info!(
                        path = %replica_path.display(),
                        bytes,
                        modified = %when,
                        "Applied {action}"
                    ),
                    ActionOutcome::DirectoryCreated | ActionOutcome::Removed => info!(
                        path = %replica_path.display(),
                        at = %when,
                        "Applied {action}"
                    ),
                }
            }
            SyncEvent::ActionFailed { action, error } => {
                error!(path = %self.replica_root.join(action.path()).display(), "{error}");
            }
            SyncEvent::EntrySkipped { root, path, reason } => {
                warn!(
                    root,
                    path = %self.root_for(root).join(&path).display(),
                    reason = %reason,
                    "Skipped unreadable entry"
                );
            }
            SyncEvent::CycleSummary {
                cycle,
                applied,
                failed,
                skipped,
                duration_ms,
            } => {
                info!(cycle, applied, failed, skipped, duration_ms, "Sync cycle complete");
            }
            SyncEvent::FatalCycleError { cycle, reason } => {
                error!(cycle, reason = %reason, "Sync cycle aborted");
            }
        }
    }
}

fn format_time(t: SystemTime) -> String {
    DateTime::<Local>::from(t).format(DATETIME_FORMAT).to_string()
}
