//! Iteration outcome classification and the feedback text derived from it.

use std::fmt::Write as _;

use serde::Serialize;

use crate::core::failure::{DatasetFailure, GenerationError};
use crate::core::types::TestResult;

/// Upper bound on compiler diagnostics copied into feedback.
pub const MAX_DIAGNOSTIC_CHARS: usize = 4_000;

/// Structured summary of how an iteration ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IterationOutcome {
    GenerationFailed {
        error: GenerationError,
    },
    BuildFailed {
        diagnostics: String,
        timed_out: bool,
    },
    DatasetsFailed {
        failures: Vec<(String, DatasetFailure)>,
    },
    Passed {
        avg_exec_time: f64,
    },
}

impl IterationOutcome {
    /// Classify finished test results; any failing dataset makes the iteration fail.
    pub fn from_results(results: &[TestResult], avg_exec_time: f64) -> Self {
        let failures: Vec<(String, DatasetFailure)> = results
            .iter()
            .filter_map(|result| {
                result
                    .failure
                    .clone()
                    .map(|failure| (result.dataset.clone(), failure))
            })
            .collect();
        if failures.is_empty() {
            IterationOutcome::Passed { avg_exec_time }
        } else {
            IterationOutcome::DatasetsFailed { failures }
        }
    }

    pub fn passed(&self) -> bool {
        matches!(self, IterationOutcome::Passed { .. })
    }

    /// Render the text handed to the next generation request.
    pub fn feedback(&self) -> String {
        match self {
            IterationOutcome::GenerationFailed { error } => {
                format!("generation failed: {error}")
            }
            IterationOutcome::BuildFailed {
                diagnostics,
                timed_out,
            } => {
                let mut text = String::from("build failed");
                if *timed_out {
                    text.push_str(" (timed out)");
                }
                let diagnostics = truncate_chars(diagnostics.trim(), MAX_DIAGNOSTIC_CHARS);
                if !diagnostics.is_empty() {
                    text.push_str(":\n");
                    text.push_str(diagnostics);
                }
                text
            }
            IterationOutcome::DatasetsFailed { failures } => {
                let mut text = String::from("test failures:");
                for (dataset, failure) in failures {
                    let _ = write!(text, "\n  {dataset}: {failure}");
                }
                text
            }
            IterationOutcome::Passed { avg_exec_time } => {
                format!("all tests passed. average execution time: {avg_exec_time:.4} s.")
            }
        }
    }
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((cut, _)) => &text[..cut],
        None => text,
    }
}
