//! Run a built candidate against one dataset and capture its JSON answer.

use std::fs;
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::core::failure::ExecutionFailure;
use crate::core::types::ExecutionOutcome;
use crate::io::process::run_command_with_timeout;

#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub artifact_path: PathBuf,
    /// Dataset file passed as the only argument.
    pub input_path: PathBuf,
    /// Where the raw stdout is kept for auditing.
    pub output_path: PathBuf,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

pub trait ExecutionRunner {
    /// Run the artifact once. Candidate misbehaviour is an `Ok` outcome.
    fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionOutcome>;
}

/// Spawns the artifact as a child process.
pub struct ProcessExecutionRunner;

impl ExecutionRunner for ProcessExecutionRunner {
    #[instrument(skip_all, fields(input = %request.input_path.display()))]
    fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionOutcome> {
        let mut cmd = Command::new(&request.artifact_path);
        cmd.arg(&request.input_path);
        let output = match run_command_with_timeout(
            cmd,
            None,
            request.timeout,
            request.output_limit_bytes,
        ) {
            Ok(output) => output,
            Err(err) => {
                warn!(error = %format!("{err:#}"), "candidate did not start");
                return Ok(ExecutionOutcome::failed(ExecutionFailure::Spawn {
                    message: format!("{err:#}"),
                }));
            }
        };

        if let Err(err) = keep_output(request, &output.stdout) {
            warn!(error = %format!("{err:#}"), "candidate output not kept");
        }

        if output.timed_out {
            return Ok(ExecutionOutcome::failed(ExecutionFailure::Timeout {
                timeout_secs: request.timeout.as_secs(),
            }));
        }
        if !output.status.success() {
            return Ok(ExecutionOutcome::failed(ExecutionFailure::NonZeroExit {
                code: output.status.code(),
                stderr: output.stderr_lossy().trim().to_string(),
            }));
        }
        if output.stdout_truncated > 0 {
            return Ok(ExecutionOutcome::failed(ExecutionFailure::MalformedOutput {
                message: format!(
                    "stdout exceeded {} bytes ({} discarded)",
                    request.output_limit_bytes, output.stdout_truncated
                ),
            }));
        }

        match serde_json::from_slice::<Value>(&output.stdout) {
            Ok(document) => {
                debug!(elapsed_ms = output.elapsed.as_millis() as u64, "candidate finished");
                Ok(ExecutionOutcome::completed(output.elapsed, document))
            }
            Err(err) => Ok(ExecutionOutcome::failed(
                ExecutionFailure::MalformedOutput {
                    message: err.to_string(),
                },
            )),
        }
    }
}

fn keep_output(request: &ExecutionRequest, stdout: &[u8]) -> Result<()> {
    if let Some(parent) = request.output_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create output dir {}", parent.display()))?;
    }
    fs::write(&request.output_path, stdout)
        .with_context(|| format!("write {}", request.output_path.display()))
}
