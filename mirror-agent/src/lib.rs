//! Mirror Agent Library
//!
//! Keeps a replica directory tree identical to a source tree by re-running a
//! full compare-and-apply cycle on a fixed interval.

pub mod config;
pub mod daemon;
pub mod executor;
pub mod fs;
pub mod sync;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use executor::events::{EventSink, SyncEvent, TracingSink};
pub use executor::{CycleReport, Driver, DriverOptions, DriverState};
pub use sync::{diff, Action, Plan};
pub use utils::{MirrorError, Result};
