//! Reduce the iteration history to a run report.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::core::stop::LoopStop;
use crate::core::types::{IterationRecord, TestResult};

/// Summary of the whole run, persisted once at the end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub total_iterations: u32,
    pub successful_iterations: u32,
    /// `None` when no iteration was accepted.
    pub best_iteration: Option<u32>,
    pub best_exec_time: Option<f64>,
    pub iterations: Vec<IterationDigest>,
    pub best_algorithm_code: Option<String>,
    pub stop_reason: LoopStop,
    pub performance_trend: PerformanceTrend,
}

/// One row of the audit trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IterationDigest {
    pub iteration: u32,
    pub compile_success: bool,
    pub overall_success: bool,
    pub avg_exec_time: f64,
    pub feedback: String,
    pub source_sha256: Option<String>,
    pub test_results_summary: Vec<TestDigest>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestDigest {
    pub test_file: String,
    pub success: bool,
    pub exec_time: f64,
    pub anomalies_detected: Option<i64>,
    pub anomalies_corrected: Option<i64>,
    pub avg_speed: Option<f64>,
    pub median_speed: Option<f64>,
    pub error: Option<String>,
}

/// First accepted iteration compared with the fastest one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "trend", rename_all = "camelCase")]
pub enum PerformanceTrend {
    #[serde(rename_all = "camelCase")]
    Improved {
        first_iteration: u32,
        best_iteration: u32,
        first_exec_time: f64,
        best_exec_time: f64,
        percent: f64,
    },
    #[serde(rename_all = "camelCase")]
    Unchanged { best_iteration: u32 },
    InsufficientData,
}

/// Build the report for a finished run.
///
/// The best iteration is the accepted one with the lowest average execution
/// time; ties keep the earliest.
pub fn summarize(history: &[IterationRecord], stop: LoopStop) -> RunReport {
    let accepted: Vec<&IterationRecord> = history
        .iter()
        .filter(|record| record.overall_accepted)
        .collect();

    let mut best: Option<&IterationRecord> = None;
    for &record in &accepted {
        if best.is_none_or(|current| record.avg_exec_time < current.avg_exec_time) {
            best = Some(record);
        }
    }

    RunReport {
        total_iterations: history.len() as u32,
        successful_iterations: accepted.len() as u32,
        best_iteration: best.map(|record| record.index),
        best_exec_time: best.map(|record| record.avg_exec_time),
        iterations: history.iter().map(digest).collect(),
        best_algorithm_code: best
            .and_then(|record| record.candidate.as_ref())
            .map(|candidate| candidate.source.clone()),
        stop_reason: stop,
        performance_trend: trend(&accepted, best),
    }
}

fn trend(accepted: &[&IterationRecord], best: Option<&IterationRecord>) -> PerformanceTrend {
    let (Some(first), Some(best)) = (accepted.first(), best) else {
        return PerformanceTrend::InsufficientData;
    };
    if accepted.len() < 2 {
        return PerformanceTrend::InsufficientData;
    }
    if first.index == best.index || first.avg_exec_time <= 0.0 {
        return PerformanceTrend::Unchanged {
            best_iteration: best.index,
        };
    }
    let percent = (first.avg_exec_time - best.avg_exec_time) * 100.0 / first.avg_exec_time;
    PerformanceTrend::Improved {
        first_iteration: first.index,
        best_iteration: best.index,
        first_exec_time: first.avg_exec_time,
        best_exec_time: best.avg_exec_time,
        percent,
    }
}

fn digest(record: &IterationRecord) -> IterationDigest {
    IterationDigest {
        iteration: record.index,
        compile_success: record.build_succeeded(),
        overall_success: record.overall_accepted,
        avg_exec_time: record.avg_exec_time,
        feedback: record.feedback.clone(),
        source_sha256: record
            .candidate
            .as_ref()
            .map(|candidate| sha256_hex(&candidate.source)),
        test_results_summary: record.test_results.iter().map(test_digest).collect(),
    }
}

fn test_digest(result: &TestResult) -> TestDigest {
    let validation = result.validation.as_ref();
    TestDigest {
        test_file: result.dataset.clone(),
        success: result.accepted(),
        exec_time: result.exec_time,
        anomalies_detected: validation.map(|v| v.anomalies_detected),
        anomalies_corrected: validation.map(|v| v.anomalies_corrected),
        avg_speed: validation.map(|v| v.avg_speed),
        median_speed: validation.map(|v| v.median_speed),
        error: result.failure.as_ref().map(ToString::to_string),
    }
}

pub fn sha256_hex(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}
