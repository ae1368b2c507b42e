//! Pipeline configuration stored in `trackfix.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::stop::StopPolicy;
use crate::core::validator::ValidationLimits;
use crate::io::dataset::duplicate_dataset_name;

/// Default config file name, resolved against the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "trackfix.toml";

/// Pipeline configuration (TOML).
///
/// Missing fields fall back to the defaults below, so an empty file or no
/// file at all yields a runnable configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory receiving per-iteration artifacts and the final report.
    pub output_dir: PathBuf,

    /// Dataset files, evaluated in this order every iteration.
    pub datasets: Vec<PathBuf>,

    /// Stop once this many iterations pass every dataset.
    pub success_target: u32,

    /// Hard cap on attempted iterations.
    pub max_attempts: u32,

    /// Sleep between iterations, in milliseconds.
    pub pacing_delay_ms: u64,

    /// Bound on captured stdout/stderr per child process.
    pub output_limit_bytes: usize,

    pub validation: ValidationLimits,
    pub generator: GeneratorConfig,
    pub build: BuildConfig,
    pub execution: ExecutionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Command receiving the prompt on stdin and answering on stdout.
    pub command: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            command: ["codex", "exec", "--skip-git-repo-check", "-"]
                .into_iter()
                .map(String::from)
                .collect(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BuildConfig {
    /// Compiler invocation; `{source}` and `{artifact}` are substituted per iteration.
    pub command: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            command: [
                "g++",
                "{source}",
                "-Iinclude",
                "-o",
                "{artifact}",
                "-std=c++17",
                "-O3",
                "-Wall",
                "-Wextra",
                "-pedantic",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExecutionConfig {
    pub timeout_secs: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self { timeout_secs: 60 }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("results"),
            datasets: ["points.json", "points2.json", "points3.json"]
                .into_iter()
                .map(PathBuf::from)
                .collect(),
            success_target: 15,
            max_attempts: 50,
            pacing_delay_ms: 2_000,
            output_limit_bytes: 1_000_000,
            validation: ValidationLimits::default(),
            generator: GeneratorConfig::default(),
            build: BuildConfig::default(),
            execution: ExecutionConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.datasets.is_empty() {
            return Err(anyhow!("datasets must list at least one file"));
        }
        if let Some(name) = duplicate_dataset_name(&self.datasets) {
            return Err(anyhow!("datasets must have distinct file names ({name} repeats)"));
        }
        if self.success_target == 0 {
            return Err(anyhow!("success_target must be > 0"));
        }
        if self.max_attempts == 0 {
            return Err(anyhow!("max_attempts must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.generator.timeout_secs == 0 {
            return Err(anyhow!("generator.timeout_secs must be > 0"));
        }
        if self.build.timeout_secs == 0 {
            return Err(anyhow!("build.timeout_secs must be > 0"));
        }
        if self.execution.timeout_secs == 0 {
            return Err(anyhow!("execution.timeout_secs must be > 0"));
        }
        if !is_runnable(&self.generator.command) {
            return Err(anyhow!("generator.command must be a non-empty array"));
        }
        if !is_runnable(&self.build.command) {
            return Err(anyhow!("build.command must be a non-empty array"));
        }
        if !is_positive(self.validation.anomaly_speed_threshold_mps) {
            return Err(anyhow!("validation.anomaly_speed_threshold_mps must be > 0"));
        }
        if !is_positive(self.validation.speed_deviation_tolerance_percent) {
            return Err(anyhow!(
                "validation.speed_deviation_tolerance_percent must be > 0"
            ));
        }
        if self.success_target > self.max_attempts {
            warn!(
                success_target = self.success_target,
                max_attempts = self.max_attempts,
                "success_target exceeds max_attempts; the run can only stop at the cap"
            );
        }
        Ok(())
    }

    pub fn stop_policy(&self) -> StopPolicy {
        StopPolicy {
            success_target: self.success_target,
            max_attempts: self.max_attempts,
        }
    }

    pub fn pacing_delay(&self) -> Duration {
        Duration::from_millis(self.pacing_delay_ms)
    }

    pub fn generator_timeout(&self) -> Duration {
        Duration::from_secs(self.generator.timeout_secs)
    }

    pub fn build_timeout(&self) -> Duration {
        Duration::from_secs(self.build.timeout_secs)
    }

    pub fn execution_timeout(&self) -> Duration {
        Duration::from_secs(self.execution.timeout_secs)
    }
}

fn is_positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

fn is_runnable(command: &[String]) -> bool {
    command.first().is_some_and(|program| !program.trim().is_empty())
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `PipelineConfig::default()`.
pub fn load_config(path: &Path) -> Result<PipelineConfig> {
    if !path.exists() {
        let cfg = PipelineConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: PipelineConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &PipelineConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
