//! Tree comparison and replica mutation.

pub mod apply;
pub mod compare;

pub use apply::{apply_action, ActionOutcome};
pub use compare::{diff, Action, CompareMode, CompareOptions, Plan, Step};
