//! Code generation backend.
//!
//! The [`Generator`] trait decouples the iteration loop from the service that
//! writes candidate programs. [`CommandGenerator`] pipes the prompt into a
//! configured command (by default `codex exec`) and reads the answer from
//! stdout. Tests use scripted generators that return canned responses.

use std::fs;
use std::path::PathBuf;
use std::process::Command;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::Context;
use regex::Regex;
use tracing::{debug, info, instrument, warn};

use crate::core::failure::GenerationError;
use crate::io::process::run_command_with_timeout;

/// Parameters for one generation request.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub iteration: u32,
    pub prompt: String,
    /// Where the backend writes its raw stdout/stderr.
    pub log_path: PathBuf,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

/// Abstraction over code generation backends.
pub trait Generator {
    /// Return the raw response text for `request`.
    fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError>;
}

/// Generator that runs an external command with the prompt on stdin.
pub struct CommandGenerator {
    command: Vec<String>,
}

impl CommandGenerator {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

impl Generator for CommandGenerator {
    #[instrument(skip_all, fields(iteration = request.iteration, timeout_secs = request.timeout.as_secs()))]
    fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let Some((program, args)) = self.command.split_first() else {
            return Err(GenerationError::Spawn {
                message: "generator command is empty".to_string(),
            });
        };
        info!(program = %program, "requesting candidate");

        let mut cmd = Command::new(program);
        cmd.args(args);
        let output = run_command_with_timeout(
            cmd,
            Some(request.prompt.as_bytes()),
            request.timeout,
            request.output_limit_bytes,
        )
        .map_err(|err| GenerationError::Spawn {
            message: format!("{err:#}"),
        })?;

        if let Some(parent) = request.log_path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        if let Err(err) = fs::write(&request.log_path, output.combined_log("generator"))
            .with_context(|| format!("write {}", request.log_path.display()))
        {
            warn!(error = %format!("{err:#}"), "generator log not written");
        }

        if output.timed_out {
            return Err(GenerationError::Timeout {
                timeout_secs: request.timeout.as_secs(),
            });
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "generator failed");
            return Err(GenerationError::NonZeroExit {
                code: output.status.code(),
                stderr: output.stderr_lossy().trim().to_string(),
            });
        }
        debug!(bytes = output.stdout.len(), "generator responded");
        Ok(output.stdout_lossy())
    }
}

static FENCED_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```([A-Za-z0-9_+-]*)[^\n]*\n(.*?)```").expect("fence regex should compile")
});

/// Pull the candidate source out of a response.
///
/// Prefers the first ```` ```cpp ```` block, then any fenced block, then the
/// whole response. Returns `None` when nothing but whitespace remains.
pub fn extract_source(response: &str) -> Option<String> {
    let blocks: Vec<(&str, &str)> = FENCED_BLOCK_RE
        .captures_iter(response)
        .filter_map(|caps| Some((caps.get(1)?.as_str(), caps.get(2)?.as_str())))
        .collect();

    let source = blocks
        .iter()
        .find(|(lang, _)| matches!(lang.to_ascii_lowercase().as_str(), "cpp" | "c++" | "cxx"))
        .or_else(|| blocks.first())
        .map_or(response, |(_, body)| *body)
        .trim();

    (!source.is_empty()).then(|| source.to_string())
}

/// Request a response and extract the candidate source from it.
pub fn generate_candidate<G: Generator>(
    generator: &G,
    request: &GenerationRequest,
) -> Result<String, GenerationError> {
    let response = generator.generate(request)?;
    extract_source(&response).ok_or(GenerationError::EmptyResponse)
}
