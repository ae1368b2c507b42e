//! Stable exit codes for trackfix CLI commands.

/// Command succeeded; for `run`/`evaluate`, at least one candidate was accepted.
pub const OK: i32 = 0;
/// Command failed due to invalid config, unreadable files, or other errors.
pub const INVALID: i32 = 1;
/// `run` or `evaluate` finished normally but no candidate passed every dataset.
pub const NO_ACCEPTED: i32 = 2;
