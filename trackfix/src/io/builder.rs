//! Build step adapter: compile a candidate source into an executable artifact.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::core::types::BuildOutcome;
use crate::io::process::run_command_with_timeout;

const SOURCE_PLACEHOLDER: &str = "{source}";
const ARTIFACT_PLACEHOLDER: &str = "{artifact}";

#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub source_path: PathBuf,
    pub artifact_path: PathBuf,
    pub log_path: PathBuf,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

pub trait BuildRunner {
    /// Compile `request.source_path`. Compiler failures are an `Ok` outcome;
    /// `Err` is reserved for the runner itself breaking.
    fn build(&self, request: &BuildRequest) -> Result<BuildOutcome>;
}

/// Runs the configured compiler command.
pub struct CommandBuildRunner {
    command: Vec<String>,
}

impl CommandBuildRunner {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

impl BuildRunner for CommandBuildRunner {
    #[instrument(skip_all, fields(source = %request.source_path.display()))]
    fn build(&self, request: &BuildRequest) -> Result<BuildOutcome> {
        let argv = expand_command(&self.command, &request.source_path, &request.artifact_path);
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| anyhow!("build command is empty"))?;
        info!(program = %program, "building candidate");

        if let Some(parent) = request.artifact_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create artifact dir {}", parent.display()))?;
        }
        // A stale artifact would mask a compiler that exits 0 without output.
        if request.artifact_path.exists() {
            fs::remove_file(&request.artifact_path).with_context(|| {
                format!("remove stale artifact {}", request.artifact_path.display())
            })?;
        }

        let mut cmd = Command::new(program);
        cmd.args(args);
        let output = match run_command_with_timeout(
            cmd,
            None,
            request.timeout,
            request.output_limit_bytes,
        ) {
            Ok(output) => output,
            Err(err) => {
                let diagnostics = format!("could not run build command: {err:#}");
                write_build_log(&request.log_path, &diagnostics)?;
                return Ok(BuildOutcome::failure(diagnostics));
            }
        };
        write_build_log(&request.log_path, &output.combined_log("build"))?;

        let mut diagnostics = output.stderr_lossy();
        if diagnostics.trim().is_empty() {
            diagnostics = output.stdout_lossy();
        }

        if output.timed_out {
            warn!(timeout_secs = request.timeout.as_secs(), "build timed out");
            return Ok(BuildOutcome {
                succeeded: false,
                timed_out: true,
                diagnostics: format!(
                    "build timed out after {}s\n{diagnostics}",
                    request.timeout.as_secs()
                ),
            });
        }
        if !output.status.success() {
            debug!(exit_code = ?output.status.code(), "build failed");
            return Ok(BuildOutcome::failure(diagnostics));
        }
        if !request.artifact_path.is_file() {
            return Ok(BuildOutcome::failure(format!(
                "build succeeded but produced no artifact at {}",
                request.artifact_path.display()
            )));
        }
        debug!(elapsed_ms = output.elapsed.as_millis() as u64, "build succeeded");
        Ok(BuildOutcome::success(diagnostics))
    }
}

/// Substitute `{source}` and `{artifact}` in every argument.
pub fn expand_command(template: &[String], source: &Path, artifact: &Path) -> Vec<String> {
    let source = source.display().to_string();
    let artifact = artifact.display().to_string();
    template
        .iter()
        .map(|arg| {
            arg.replace(SOURCE_PLACEHOLDER, &source)
                .replace(ARTIFACT_PLACEHOLDER, &artifact)
        })
        .collect()
}

fn write_build_log(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create build log dir {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("write build log {}", path.display()))
}
