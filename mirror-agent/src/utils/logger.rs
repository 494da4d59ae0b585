//! Logging configuration using tracing.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Resolve a log destination identifier to the file it appends to.
///
/// A bare name such as `mirror` becomes `mirror.log`; a name that already
/// carries an extension is used as-is.
pub fn log_file_path(destination: &str) -> PathBuf {
    let path = PathBuf::from(destination);
    if path.extension().is_some() {
        path
    } else {
        PathBuf::from(format!("{destination}.log"))
    }
}

/// Initialize logging with the specified level, optionally teeing every
/// record into `log_file` (appended, no ANSI colors).
pub fn init(level: &str, log_file: Option<&Path>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .boxed(),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .try_init()?;

    Ok(())
}
