//! Generate → build → execute → validate → select loop for GPS track-correction programs.
//!
//! The crate repeatedly asks an external code generator for a candidate program,
//! compiles it, runs it against a fixed set of GPS datasets, statistically checks
//! its corrected output, and keeps the fastest candidate that passes everywhere.
//! The architecture keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (geometry, validation rules, failure
//!   taxonomy, feedback text, stop policy, report aggregation). No I/O.
//! - **[`io`]**: Side-effecting operations (config, datasets, subprocesses,
//!   artifact and report files). Isolated behind traits so tests can use fakes.
//!
//! Orchestration modules ([`evaluate`], [`looping`]) coordinate core logic with
//! I/O to implement CLI commands.

pub mod core;
pub mod evaluate;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod looping;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
