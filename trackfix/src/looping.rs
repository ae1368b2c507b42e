//! The generate → build → execute → validate loop.

use std::thread;

use anyhow::Result;
use tracing::{debug, info, info_span, warn};

use crate::core::failure::GenerationError;
use crate::core::feedback::IterationOutcome;
use crate::core::stop::LoopStop;
use crate::core::types::{BuildOutcome, CandidateArtifact, IterationRecord};
use crate::evaluate::{CandidateEvaluation, evaluate_candidate};
use crate::io::artifacts::RunPaths;
use crate::io::builder::BuildRunner;
use crate::io::config::PipelineConfig;
use crate::io::dataset::DatasetSlot;
use crate::io::execution::ExecutionRunner;
use crate::io::generator::{GenerationRequest, Generator, generate_candidate};
use crate::io::prompt::PromptEngine;

/// Summary of a loop invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopOutcome {
    /// Every attempted iteration, in order.
    pub history: Vec<IterationRecord>,
    pub stop: LoopStop,
}

/// Drives successive candidate generations until the success target or the
/// attempt cap is reached. Owns the iteration history for the whole run.
pub struct IterationController<'a, G, B, R> {
    generator: &'a G,
    builder: &'a B,
    runner: &'a R,
    config: &'a PipelineConfig,
    paths: &'a RunPaths,
    datasets: &'a [DatasetSlot],
    prompts: PromptEngine,
}

impl<'a, G: Generator, B: BuildRunner, R: ExecutionRunner> IterationController<'a, G, B, R> {
    pub fn new(
        generator: &'a G,
        builder: &'a B,
        runner: &'a R,
        config: &'a PipelineConfig,
        paths: &'a RunPaths,
        datasets: &'a [DatasetSlot],
    ) -> Self {
        Self {
            generator,
            builder,
            runner,
            config,
            paths,
            datasets,
            prompts: PromptEngine::new(),
        }
    }

    /// Run iterations until the stop policy fires.
    ///
    /// `on_iteration` sees each record right after it is appended. Neither
    /// candidate failures nor audit-file I/O failures stop the loop.
    pub fn run<F: FnMut(&IterationRecord)>(&self, mut on_iteration: F) -> Result<LoopOutcome> {
        let policy = self.config.stop_policy();
        let mut history: Vec<IterationRecord> = Vec::new();
        let mut successes = 0u32;

        loop {
            let attempts = history.len() as u32;
            if let Some(stop) = policy.check(attempts, successes) {
                info!(attempts, successes, ?stop, "loop finished");
                return Ok(LoopOutcome { history, stop });
            }
            if attempts > 0 && self.config.pacing_delay_ms > 0 {
                thread::sleep(self.config.pacing_delay());
            }

            let feedback = history.last().map(|record| record.feedback.as_str());
            let record = self.run_iteration(attempts, feedback)?;
            if record.overall_accepted {
                successes += 1;
            }
            on_iteration(&record);
            history.push(record);
        }
    }

    /// Run one iteration and persist its record.
    ///
    /// A source file that cannot be saved fails the build; other audit writes
    /// are logged and skipped.
    pub fn run_iteration(&self, index: u32, feedback: Option<&str>) -> Result<IterationRecord> {
        let _span = info_span!("iteration", index).entered();
        let paths = self.paths.iteration(index);
        if let Err(err) = paths.create() {
            warn!(error = %format!("{err:#}"), "iteration dir not created");
        }

        let generated = self
            .prompts
            .render_generation(&self.config.validation, feedback)
            .map_err(|err| GenerationError::Prompt {
                message: format!("{err:#}"),
            })
            .and_then(|prompt| {
                if let Err(err) = paths.write_prompt(&prompt) {
                    warn!(error = %format!("{err:#}"), "prompt not saved");
                }
                let request = GenerationRequest {
                    iteration: index,
                    prompt,
                    log_path: paths.generator_log_path.clone(),
                    timeout: self.config.generator_timeout(),
                    output_limit_bytes: self.config.output_limit_bytes,
                };
                generate_candidate(self.generator, &request)
            });

        let record = match generated {
            Err(error) => {
                warn!(%error, "generation failed");
                let outcome = IterationOutcome::GenerationFailed { error };
                IterationRecord {
                    index,
                    candidate: None,
                    build: None,
                    test_results: Vec::new(),
                    overall_accepted: false,
                    avg_exec_time: 0.0,
                    feedback: outcome.feedback(),
                    outcome,
                }
            }
            Ok(source) => {
                debug!(bytes = source.len(), "candidate generated");
                let evaluation = match paths.write_source(&source) {
                    Ok(()) => evaluate_candidate(
                        self.builder,
                        self.runner,
                        self.config,
                        &paths,
                        self.datasets,
                    )?,
                    Err(err) => {
                        warn!(error = %format!("{err:#}"), "candidate source not saved");
                        CandidateEvaluation::build_failed(BuildOutcome::failure(format!(
                            "candidate source not saved: {err:#}"
                        )))
                    }
                };
                IterationRecord {
                    index,
                    candidate: Some(CandidateArtifact {
                        iteration: index,
                        source,
                    }),
                    build: Some(evaluation.build),
                    test_results: evaluation.test_results,
                    overall_accepted: evaluation.overall_accepted,
                    avg_exec_time: evaluation.avg_exec_time,
                    feedback: evaluation.outcome.feedback(),
                    outcome: evaluation.outcome,
                }
            }
        };

        if let Err(err) = paths.write_record(&record) {
            warn!(error = %format!("{err:#}"), "iteration record not saved");
        }
        Ok(record)
    }
}
