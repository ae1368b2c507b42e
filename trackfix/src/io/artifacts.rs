//! On-disk layout of a run under `<output_dir>/`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::core::types::IterationRecord;

/// Run-level paths.
#[derive(Debug, Clone)]
pub struct RunPaths {
    pub output_dir: PathBuf,
    pub inputs_dir: PathBuf,
    pub iterations_dir: PathBuf,
    pub report_path: PathBuf,
    pub best_source_path: PathBuf,
}

impl RunPaths {
    pub fn new(output_dir: &Path) -> Self {
        Self {
            output_dir: output_dir.to_path_buf(),
            inputs_dir: output_dir.join("inputs"),
            iterations_dir: output_dir.join("iterations"),
            report_path: output_dir.join("report.json"),
            best_source_path: output_dir.join("best_candidate.cpp"),
        }
    }

    pub fn iteration(&self, index: u32) -> IterationPaths {
        IterationPaths::at(self.iterations_dir.join(index.to_string()))
    }
}

/// Per-iteration artifact paths. Every iteration gets its own directory, so
/// artifacts from different iterations never collide.
#[derive(Debug, Clone)]
pub struct IterationPaths {
    pub dir: PathBuf,
    pub prompt_path: PathBuf,
    pub generator_log_path: PathBuf,
    pub source_path: PathBuf,
    pub artifact_path: PathBuf,
    pub build_log_path: PathBuf,
    pub record_path: PathBuf,
}

impl IterationPaths {
    pub fn at(dir: PathBuf) -> Self {
        Self {
            prompt_path: dir.join("prompt.md"),
            generator_log_path: dir.join("generator.log"),
            source_path: dir.join("candidate.cpp"),
            artifact_path: dir.join(format!("candidate{}", std::env::consts::EXE_SUFFIX)),
            build_log_path: dir.join("build.log"),
            record_path: dir.join("record.json"),
            dir,
        }
    }

    /// Raw stdout of the candidate for `dataset`.
    pub fn output_path(&self, dataset: &str) -> PathBuf {
        self.dir.join(format!("output_{dataset}.json"))
    }

    pub fn create(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("create iteration dir {}", self.dir.display()))
    }

    pub fn write_prompt(&self, prompt: &str) -> Result<()> {
        write_text(&self.prompt_path, prompt)
    }

    pub fn write_source(&self, source: &str) -> Result<()> {
        let mut buf = source.to_string();
        if !buf.ends_with('\n') {
            buf.push('\n');
        }
        write_text(&self.source_path, &buf)
    }

    pub fn write_record(&self, record: &IterationRecord) -> Result<()> {
        write_json(&self.record_path, record)
    }
}

pub(crate) fn write_text(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}

pub(crate) fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value)
        .with_context(|| format!("serialize {}", path.display()))?;
    buf.push('\n');
    write_text(path, &buf)
}
