//! The file restorer (component B, §4.B): per-file fast-path decisions,
//! block and whole-file restore, and atomic materialisation.

pub mod atomic;
pub mod restore;

pub use restore::{restore_file, Decision, JobSpec, Outcome, RestoreContext};
