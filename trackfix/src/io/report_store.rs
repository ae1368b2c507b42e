//! Persisted run report (`<output_dir>/report.json`).

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::report::RunReport;
use crate::io::artifacts::{RunPaths, write_json, write_text};

/// Report plus the time it was written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedReport {
    /// RFC 3339 timestamp.
    pub generated_at: String,
    #[serde(flatten)]
    pub report: RunReport,
}

/// Write the report and, when one exists, the best candidate's source.
pub fn write_report(paths: &RunPaths, report: &RunReport) -> Result<PersistedReport> {
    let persisted = PersistedReport {
        generated_at: Utc::now().to_rfc3339(),
        report: report.clone(),
    };
    write_json(&paths.report_path, &persisted)?;
    if let Some(source) = &report.best_algorithm_code {
        write_text(&paths.best_source_path, source)?;
    }
    info!(
        path = %paths.report_path.display(),
        best_iteration = ?report.best_iteration,
        "report written"
    );
    Ok(persisted)
}

pub fn load_report(path: &Path) -> Result<PersistedReport> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read report {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse report {}", path.display()))
}
