//! Shared value types for pipeline core logic.
//!
//! These types define stable contracts between components. Everything here is a
//! plain value: produced once, passed by reference, never mutated after an
//! iteration completes.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::failure::{DatasetFailure, ExecutionFailure, Rejection};
use crate::core::feedback::IterationOutcome;

/// One GPS sample. Coordinates are degrees × 1e6, `time` is unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: i64,
    pub lon: i64,
    pub time: i64,
}

impl GeoPoint {
    pub fn new(lat: i64, lon: i64, time: i64) -> Self {
        Self { lat, lon, time }
    }

    /// Latitude in decimal degrees.
    pub fn lat_degrees(&self) -> f64 {
        self.lat as f64 / 1e6
    }

    /// Longitude in decimal degrees.
    pub fn lon_degrees(&self) -> f64 {
        self.lon as f64 / 1e6
    }
}

/// Ordered points loaded from one dataset file. Immutable after loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataset {
    /// File name the dataset was loaded from (used as its identity in results).
    pub name: String,
    pub points: Vec<GeoPoint>,
}

/// Generated source text for one iteration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateArtifact {
    pub iteration: u32,
    pub source: String,
}

/// Result of compiling a candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildOutcome {
    pub succeeded: bool,
    pub timed_out: bool,
    /// Compiler stderr/stdout (or a runner-generated explanation).
    pub diagnostics: String,
}

impl BuildOutcome {
    pub fn success(diagnostics: impl Into<String>) -> Self {
        Self {
            succeeded: true,
            timed_out: false,
            diagnostics: diagnostics.into(),
        }
    }

    pub fn failure(diagnostics: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            timed_out: false,
            diagnostics: diagnostics.into(),
        }
    }
}

/// Result of invoking a built candidate on one dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutcome {
    pub elapsed: Duration,
    /// Parsed stdout document, or the reason the run did not produce one.
    pub output: Result<Value, ExecutionFailure>,
}

impl ExecutionOutcome {
    pub fn completed(elapsed: Duration, output: Value) -> Self {
        Self {
            elapsed,
            output: Ok(output),
        }
    }

    pub fn failed(failure: ExecutionFailure) -> Self {
        Self {
            elapsed: Duration::ZERO,
            output: Err(failure),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.output.is_ok()
    }

    /// Wall-clock seconds; failed runs count as zero since they did not complete.
    pub fn exec_time_secs(&self) -> f64 {
        if self.succeeded() {
            self.elapsed.as_secs_f64()
        } else {
            0.0
        }
    }
}

/// Statistical verdict on a candidate's corrected output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationOutcome {
    pub accepted: bool,
    pub anomalies_detected: i64,
    pub anomalies_corrected: i64,
    pub avg_speed: f64,
    pub median_speed: f64,
    pub rejection: Option<Rejection>,
}

impl ValidationOutcome {
    /// Human-readable reason; empty when accepted.
    pub fn reason(&self) -> String {
        self.rejection
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default()
    }
}

/// Outcome for one dataset within one iteration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestResult {
    pub dataset: String,
    /// Seconds the candidate ran; zero when execution failed.
    pub exec_time: f64,
    /// Present only when execution produced a document to validate.
    pub validation: Option<ValidationOutcome>,
    pub failure: Option<DatasetFailure>,
}

impl TestResult {
    pub fn accepted(&self) -> bool {
        self.failure.is_none()
    }

    pub fn error(&self) -> String {
        self.failure
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default()
    }
}

/// Everything recorded about one attempted iteration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IterationRecord {
    /// 0-based position in the run history.
    pub index: u32,
    /// `None` when generation failed.
    pub candidate: Option<CandidateArtifact>,
    /// `None` when no build was attempted.
    pub build: Option<BuildOutcome>,
    pub test_results: Vec<TestResult>,
    pub overall_accepted: bool,
    pub avg_exec_time: f64,
    pub outcome: IterationOutcome,
    /// Text handed to the next generation request.
    pub feedback: String,
}

impl IterationRecord {
    pub fn build_succeeded(&self) -> bool {
        self.build.as_ref().is_some_and(|build| build.succeeded)
    }
}
