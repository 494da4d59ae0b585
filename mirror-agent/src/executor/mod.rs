//! Mirror driver - Runs the periodic compare/apply loop.
//!
//! Each cycle walks both roots, applies the resulting plan to the replica and
//! reports a summary. Cycles never overlap. The loop only ends when its
//! cancellation token fires, and it checks the token only between cycles, so
//! an in-flight plan is always applied to completion.

pub mod events;

use crate::fs::walker::WalkOptions;
use crate::sync::{apply_action, diff, Action, CompareOptions, Plan};
use crate::utils::{MirrorError, Result};
use events::{EventSink, SyncEvent};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Everything a driver needs to know about the two trees.
#[derive(Debug, Clone)]
pub struct DriverOptions {
    pub source: PathBuf,
    pub replica: PathBuf,
    pub interval: Duration,
    pub compare: CompareOptions,
    pub walk: WalkOptions,

    /// Upper bound on concurrently applied actions (1 = sequential)
    pub workers: usize,

    /// Create the replica root when it is missing
    pub create_replica_root: bool,
}

impl DriverOptions {
    pub fn new(source: impl Into<PathBuf>, replica: impl Into<PathBuf>, interval: Duration) -> Self {
        Self {
            source: source.into(),
            replica: replica.into(),
            interval,
            compare: CompareOptions::default(),
            walk: WalkOptions::default(),
            workers: 1,
            create_replica_root: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Idle,
    Comparing,
    Applying,
    Reporting,
    Sleeping,
    Stopped,
}

/// Outcome of one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub cycle: u64,
    pub applied: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration: Duration,

    /// Set when the cycle was abandoned before applying anything
    pub fatal: Option<String>,
}

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    applied: usize,
    failed: usize,
}

impl Tally {
    fn add(&mut self, other: Tally) {
        self.applied += other.applied;
        self.failed += other.failed;
    }
}

/// Main mirror driver
pub struct Driver {
    options: Arc<DriverOptions>,
    sink: Arc<dyn EventSink>,
    cancel_token: CancellationToken,
    state_tx: watch::Sender<DriverState>,
    cycle: u64,
}

impl Driver {
    /// Create a new driver with its own cancellation token
    pub fn new(options: DriverOptions, sink: Arc<dyn EventSink>) -> Self {
        Self::with_cancel(options, sink, CancellationToken::new())
    }

    /// Create a new driver stopped by an externally owned token
    pub fn with_cancel(options: DriverOptions, sink: Arc<dyn EventSink>, cancel_token: CancellationToken) -> Self {
        let (state_tx, _) = watch::channel(DriverState::Idle);
        Self {
            options: Arc::new(options),
            sink,
            cancel_token,
            state_tx,
            cycle: 0,
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Observe state transitions
    pub fn subscribe(&self) -> watch::Receiver<DriverState> {
        self.state_tx.subscribe()
    }

    pub fn state(&self) -> DriverState {
        *self.state_tx.borrow()
    }

    /// Run cycles until cancelled. Each cycle starts `interval` after the
    /// previous one started, or immediately if the previous one overran.
    pub async fn run(&mut self) {
        info!(
            source = %self.options.source.display(),
            replica = %self.options.replica.display(),
            interval_secs = self.options.interval.as_secs(),
            "Starting mirror driver"
        );

        loop {
            if self.cancel_token.is_cancelled() {
                break;
            }

            let deadline = Instant::now() + self.options.interval;
            self.run_cycle().await;

            self.set_state(DriverState::Sleeping);
            if self.cancel_token.is_cancelled() {
                break;
            }

            tokio::select! {
                _ = self.cancel_token.cancelled() => break,
                _ = tokio::time::sleep_until(deadline) => {}
            }
        }

        self.set_state(DriverState::Stopped);
        info!(cycles = self.cycle, "Mirror driver stopped");
    }

    /// Perform exactly one compare/apply/report pass.
    pub async fn run_cycle(&mut self) -> CycleReport {
        let started = Instant::now();
        self.cycle += 1;
        let cycle = self.cycle;
        let mut report = CycleReport {
            cycle,
            ..CycleReport::default()
        };

        self.set_state(DriverState::Comparing);
        let plan = match self.compare().await {
            Ok(plan) => plan,
            Err(e) => {
                let reason = e.to_string();
                self.sink.emit(SyncEvent::FatalCycleError {
                    cycle,
                    reason: reason.clone(),
                });
                report.fatal = Some(reason);
                report.duration = started.elapsed();
                return report;
            }
        };

        report.skipped = plan.skipped.len();
        for skipped in &plan.skipped {
            self.sink.emit(SyncEvent::EntrySkipped {
                root: skipped.root,
                path: skipped.entry.relative_path.clone(),
                reason: skipped.entry.reason.clone(),
            });
        }

        debug!(cycle, actions = plan.len(), "Plan computed");

        self.set_state(DriverState::Applying);
        let tally = if self.options.workers > 1 {
            self.apply_parallel(plan).await
        } else {
            self.apply_sequential(plan).await
        };
        report.applied = tally.applied;
        report.failed = tally.failed;

        self.set_state(DriverState::Reporting);
        report.duration = started.elapsed();
        self.sink.emit(SyncEvent::CycleSummary {
            cycle,
            applied: report.applied,
            failed: report.failed,
            skipped: report.skipped,
            duration_ms: report.duration.as_millis() as u64,
        });

        report
    }

    async fn compare(&self) -> Result<Plan> {
        let options = self.options.clone();
        tokio::task::spawn_blocking(move || {
            if options.create_replica_root && !options.replica.exists() {
                std::fs::create_dir_all(&options.replica).map_err(|e| MirrorError::RootUnavailable {
                    role: "replica",
                    path: options.replica.clone(),
                    reason: e.to_string(),
                })?;
                info!(path = %options.replica.display(), "Created replica root");
            }

            diff(&options.source, &options.replica, &options.compare, &options.walk)
        })
        .await?
    }

    async fn apply_sequential(&self, plan: Plan) -> Tally {
        let options = self.options.clone();
        let sink = self.sink.clone();
        let actions: Vec<Action> = plan.actions().cloned().collect();
        let count = actions.len();

        let result = tokio::task::spawn_blocking(move || {
            let mut tally = Tally::default();
            for action in actions {
                tally.add(apply_one(action, &options.source, &options.replica, sink.as_ref()));
            }
            tally
        })
        .await;

        result.unwrap_or_else(|e| {
            error!(error = %e, "Apply task failed");
            Tally { applied: 0, failed: count }
        })
    }

    /// Phase one runs depth level by depth level (shallowest first) so a
    /// parent is always in place before its children. Phase two starts only
    /// after phase one has drained and runs deepest level first.
    async fn apply_parallel(&self, plan: Plan) -> Tally {
        let semaphore = Arc::new(Semaphore::new(self.options.workers));
        let mut tally = Tally::default();

        let max_depth = plan.steps().iter().map(|s| s.depth).max().unwrap_or(0);
        for depth in 1..=max_depth {
            let wave: Vec<Vec<Action>> = plan
                .steps()
                .iter()
                .filter(|s| s.depth == depth)
                .map(|s| s.actions.clone())
                .collect();
            tally.add(self.run_wave(wave, &semaphore).await);
        }

        let max_depth = plan.deletes().iter().map(Action::depth).max().unwrap_or(0);
        for depth in (1..=max_depth).rev() {
            let wave: Vec<Vec<Action>> = plan
                .deletes()
                .iter()
                .filter(|a| a.depth() == depth)
                .map(|a| vec![a.clone()])
                .collect();
            tally.add(self.run_wave(wave, &semaphore).await);
        }

        tally
    }

    /// Run independent action groups concurrently and wait for all of them.
    async fn run_wave(&self, wave: Vec<Vec<Action>>, semaphore: &Arc<Semaphore>) -> Tally {
        let mut tally = Tally::default();
        let mut tasks = JoinSet::new();

        for group in wave {
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let options = self.options.clone();
            let sink = self.sink.clone();

            tasks.spawn_blocking(move || {
                let _permit = permit;
                let mut tally = Tally::default();
                for action in group {
                    tally.add(apply_one(action, &options.source, &options.replica, sink.as_ref()));
                }
                tally
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(group_tally) => tally.add(group_tally),
                Err(e) => {
                    error!(error = %e, "Apply task failed");
                    tally.failed += 1;
                }
            }
        }

        tally
    }

    fn set_state(&self, state: DriverState) {
        self.state_tx.send_replace(state);
    }
}

fn apply_one(action: Action, source: &Path, replica: &Path, sink: &dyn EventSink) -> Tally {
    match apply_action(&action, source, replica) {
        Ok(outcome) => {
            sink.emit(SyncEvent::ActionApplied { action, outcome });
            Tally { applied: 1, failed: 0 }
        }
        Err(source) => {
            let error = MirrorError::Apply {
                action: action.to_string(),
                source,
            };
            sink.emit(SyncEvent::ActionFailed {
                action,
                error: error.to_string(),
            });
            Tally { applied: 0, failed: 1 }
        }
    }
}
