//! Structured failure taxonomy.
//!
//! Each layer converts its failures into one of these values instead of
//! propagating an error, so a single bad candidate or dataset never aborts the
//! run. Values are rendered to text only for generation feedback and the report.

use serde::Serialize;
use thiserror::Error;

/// The code generator produced nothing usable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GenerationError {
    #[error("generator could not be started: {message}")]
    Spawn { message: String },
    #[error("generator timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },
    #[error("generator exited with status {code:?}: {stderr}")]
    NonZeroExit { code: Option<i32>, stderr: String },
    #[error("generator returned no source code")]
    EmptyResponse,
    #[error("generation prompt could not be rendered: {message}")]
    Prompt { message: String },
}

/// A built candidate did not produce a parseable document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionFailure {
    #[error("candidate could not be started: {message}")]
    Spawn { message: String },
    #[error("candidate timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },
    #[error("candidate exited with status {code:?}: {stderr}")]
    NonZeroExit { code: Option<i32>, stderr: String },
    #[error("candidate output is not valid JSON: {message}")]
    MalformedOutput { message: String },
    /// The runner itself broke; the candidate is not to blame.
    #[error("execution runner failed: {message}")]
    Runner { message: String },
}

/// A well-formed run whose output breaks an acceptance rule.
#[derive(Debug, Clone, PartialEq, Serialize, Error)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum Rejection {
    #[error("output is not a JSON object")]
    NotAnObject,
    #[error("no corrected points produced")]
    NoCorrectedPoints,
    #[error("field '{field}' must be {expected}")]
    MalformedField { field: String, expected: String },
    #[error("corrected point {index}: {detail}")]
    MalformedPoint { index: usize, detail: String },
    #[error("anomalous speed {speed:.2} m/s between points {from} and {to}")]
    AnomalousSpeed { from: usize, to: usize, speed: f64 },
    #[error("no valid intervals for speed calculation")]
    NoValidIntervals,
    #[error(
        "max speed {max:.2} m/s deviates {deviation:.2}% from mean {mean:.2} m/s (tolerance {tolerance}%)"
    )]
    ExcessiveDeviation {
        max: f64,
        mean: f64,
        deviation: f64,
        tolerance: f64,
    },
}

/// Why a single dataset did not pass within an iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Error)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum DatasetFailure {
    #[error("dataset load failed: {message}")]
    Load { message: String },
    #[error(transparent)]
    Execution(#[from] ExecutionFailure),
    #[error("rejected: {0}")]
    Rejected(#[from] Rejection),
}
