//! Configuration management for the mirror agent.
//!
//! Loads configuration from TOML file with environment variable overrides.

use crate::executor::DriverOptions;
use crate::fs::walker::WalkOptions;
use crate::sync::{CompareMode, CompareOptions};
use crate::utils::{MirrorError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub mirror: MirrorConfig,
    #[serde(default)]
    pub compare: CompareConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub performance: PerformanceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorConfig {
    /// Tree that is mirrored (read-only)
    #[serde(default)]
    pub source: PathBuf,

    /// Tree kept identical to the source
    #[serde(default)]
    pub replica: PathBuf,

    /// Seconds between the starts of consecutive cycles
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Create the replica root when it does not exist
    #[serde(default = "default_true")]
    pub create_replica_root: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompareConfig {
    /// metadata or checksum
    #[serde(default)]
    pub mode: CompareMode,

    /// Timestamp tolerance in milliseconds
    #[serde(default)]
    pub modify_window_ms: u64,

    /// File name fragments ignored in both trees
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log destination; a bare name gets a `.log` extension
    #[serde(default)]
    pub file: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    /// Maximum concurrently applied actions
    #[serde(default = "default_workers")]
    pub workers: usize,
}

// Default values
fn default_interval_secs() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_workers() -> usize {
    1
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            source: PathBuf::new(),
            replica: PathBuf::new(),
            interval_secs: default_interval_secs(),
            create_replica_root: default_true(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `MIRROR_*` overrides from the process environment (and `.env`).
    pub fn apply_env(&mut self) -> Result<()> {
        let _ = dotenvy::dotenv();
        self.apply_vars(|key| std::env::var(key).ok())
    }

    fn apply_vars(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(source) = var("MIRROR_SOURCE") {
            self.mirror.source = PathBuf::from(source);
        }
        if let Some(replica) = var("MIRROR_REPLICA") {
            self.mirror.replica = PathBuf::from(replica);
        }
        if let Some(interval) = var("MIRROR_INTERVAL_SECS") {
            self.mirror.interval_secs = interval.parse().map_err(|_| {
                MirrorError::Config(format!("MIRROR_INTERVAL_SECS must be an integer, got '{interval}'"))
            })?;
        }
        if let Some(level) = var("MIRROR_LOG_LEVEL") {
            self.log.level = level;
        }
        if let Some(file) = var("MIRROR_LOG_FILE") {
            self.log.file = Some(file);
        }
        if let Some(workers) = var("MIRROR_WORKERS") {
            self.performance.workers = workers.parse().map_err(|_| {
                MirrorError::Config(format!("MIRROR_WORKERS must be an integer, got '{workers}'"))
            })?;
        }
        Ok(())
    }

    /// Reject configurations the driver cannot run with.
    pub fn validate(&self) -> Result<()> {
        let source = &self.mirror.source;
        let replica = &self.mirror.replica;

        if source.as_os_str().is_empty() {
            return Err(MirrorError::Config("source path is required".into()));
        }
        if replica.as_os_str().is_empty() {
            return Err(MirrorError::Config("replica path is required".into()));
        }
        if self.mirror.interval_secs == 0 {
            return Err(MirrorError::Config("interval must be a positive number of seconds".into()));
        }
        if self.performance.workers == 0 {
            return Err(MirrorError::Config("workers must be at least 1".into()));
        }

        let source = normalize(source);
        let replica = normalize(replica);
        if source == replica {
            return Err(MirrorError::Config("source and replica must differ".into()));
        }
        if replica.starts_with(&source) || source.starts_with(&replica) {
            return Err(MirrorError::Config(
                "source and replica must not be nested inside each other".into(),
            ));
        }

        Ok(())
    }

    pub fn driver_options(&self) -> DriverOptions {
        DriverOptions {
            source: self.mirror.source.clone(),
            replica: self.mirror.replica.clone(),
            interval: Duration::from_secs(self.mirror.interval_secs),
            compare: CompareOptions {
                mode: self.compare.mode,
                modify_window: Duration::from_millis(self.compare.modify_window_ms),
            },
            walk: WalkOptions {
                exclude_patterns: self.compare.exclude_patterns.clone(),
                ..WalkOptions::default()
            },
            workers: self.performance.workers,
            create_replica_root: self.mirror.create_replica_root,
        }
    }
}

/// Absolute form of `path` with symlinks resolved through its deepest
/// existing ancestor, so paths that do not exist yet still compare correctly.
fn normalize(path: &Path) -> PathBuf {
    let absolute = std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf());

    let mut existing = absolute.as_path();
    let mut missing = Vec::new();
    loop {
        if let Ok(canonical) = existing.canonicalize() {
            return missing.iter().rev().fold(canonical, |acc, name| acc.join(name));
        }
        let (Some(parent), Some(name)) = (existing.parent(), existing.file_name()) else {
            break;
        };
        missing.push(name.to_os_string());
        existing = parent;
    }

    absolute
}
