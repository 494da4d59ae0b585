//! Custom error types for the mirror agent.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MirrorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("{role} root unavailable: {path}: {reason}")]
    RootUnavailable {
        role: &'static str,
        path: PathBuf,
        reason: String,
    },

    #[error("Failed to {action}: {source}")]
    Apply {
        action: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, MirrorError>;
