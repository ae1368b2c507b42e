//! Candidate evaluation: build once, then run and validate every dataset in order.

use anyhow::Result;
use tracing::{debug, info, instrument, warn};

use crate::core::failure::{DatasetFailure, ExecutionFailure};
use crate::core::feedback::IterationOutcome;
use crate::core::types::{BuildOutcome, ExecutionOutcome, TestResult};
use crate::core::validator::validate;
use crate::io::artifacts::IterationPaths;
use crate::io::builder::{BuildRequest, BuildRunner};
use crate::io::config::PipelineConfig;
use crate::io::dataset::DatasetSlot;
use crate::io::execution::{ExecutionRequest, ExecutionRunner};

/// Everything the evaluator learned about one candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateEvaluation {
    pub build: BuildOutcome,
    /// One entry per dataset, in configured order; empty when the build failed.
    pub test_results: Vec<TestResult>,
    pub overall_accepted: bool,
    pub avg_exec_time: f64,
    pub outcome: IterationOutcome,
}

impl CandidateEvaluation {
    /// Evaluation of a candidate that never got an artifact; no dataset runs.
    pub fn build_failed(build: BuildOutcome) -> Self {
        let outcome = IterationOutcome::BuildFailed {
            diagnostics: build.diagnostics.clone(),
            timed_out: build.timed_out,
        };
        Self {
            build,
            test_results: Vec::new(),
            overall_accepted: false,
            avg_exec_time: 0.0,
            outcome,
        }
    }
}

/// Build the candidate at `paths.source_path` and evaluate it against `datasets`.
///
/// Datasets run strictly one after another against the same artifact. Every
/// problem with the candidate or its runners becomes part of the evaluation.
#[instrument(skip_all, fields(dir = %paths.dir.display()))]
pub fn evaluate_candidate<B: BuildRunner, R: ExecutionRunner>(
    builder: &B,
    runner: &R,
    config: &PipelineConfig,
    paths: &IterationPaths,
    datasets: &[DatasetSlot],
) -> Result<CandidateEvaluation> {
    let request = BuildRequest {
        source_path: paths.source_path.clone(),
        artifact_path: paths.artifact_path.clone(),
        log_path: paths.build_log_path.clone(),
        timeout: config.build_timeout(),
        output_limit_bytes: config.output_limit_bytes,
    };
    let build = builder.build(&request).unwrap_or_else(|err| {
        warn!(error = %format!("{err:#}"), "build runner failed");
        BuildOutcome::failure(format!("build runner failed: {err:#}"))
    });

    if !build.succeeded {
        info!(timed_out = build.timed_out, "build failed, skipping datasets");
        return Ok(CandidateEvaluation::build_failed(build));
    }

    let test_results: Vec<TestResult> = datasets
        .iter()
        .map(|slot| run_dataset(runner, config, paths, slot))
        .collect();

    let overall_accepted = test_results.iter().all(TestResult::accepted);
    let avg_exec_time = if test_results.is_empty() {
        0.0
    } else {
        test_results.iter().map(|result| result.exec_time).sum::<f64>() / test_results.len() as f64
    };
    let outcome = IterationOutcome::from_results(&test_results, avg_exec_time);
    debug!(overall_accepted, avg_exec_time, "candidate evaluated");

    Ok(CandidateEvaluation {
        build,
        test_results,
        overall_accepted,
        avg_exec_time,
        outcome,
    })
}

fn run_dataset<R: ExecutionRunner>(
    runner: &R,
    config: &PipelineConfig,
    paths: &IterationPaths,
    slot: &DatasetSlot,
) -> TestResult {
    let dataset = match &slot.dataset {
        Ok(dataset) => dataset,
        Err(err) => {
            return TestResult {
                dataset: slot.name.clone(),
                exec_time: 0.0,
                validation: None,
                failure: Some(DatasetFailure::Load {
                    message: err.to_string(),
                }),
            };
        }
    };

    let request = ExecutionRequest {
        artifact_path: paths.artifact_path.clone(),
        input_path: slot.input_path.clone(),
        output_path: paths.output_path(&slot.name),
        timeout: config.execution_timeout(),
        output_limit_bytes: config.output_limit_bytes,
    };
    let execution = runner.execute(&request).unwrap_or_else(|err| {
        warn!(dataset = %slot.name, error = %format!("{err:#}"), "execution runner failed");
        ExecutionOutcome::failed(ExecutionFailure::Runner {
            message: format!("{err:#}"),
        })
    });
    let exec_time = execution.exec_time_secs();

    let result = match execution.output {
        Ok(document) => {
            let validation = validate(dataset, &document, &config.validation);
            let failure = validation.rejection.clone().map(DatasetFailure::Rejected);
            TestResult {
                dataset: slot.name.clone(),
                exec_time,
                validation: Some(validation),
                failure,
            }
        }
        Err(failure) => TestResult {
            dataset: slot.name.clone(),
            exec_time,
            validation: None,
            failure: Some(DatasetFailure::Execution(failure)),
        },
    };
    if result.accepted() {
        info!(dataset = %slot.name, exec_time, "dataset passed");
    } else {
        info!(dataset = %slot.name, error = %result.error(), "dataset failed");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::failure::Rejection;
    use crate::test_support::{
        ScriptedBuilder, ScriptedRunner, TestWorkspace, corrected_output, track_with_speeds,
    };
    use anyhow::anyhow;
    use serde_json::json;
    use std::time::Duration;

    struct BrokenRunner;

    impl ExecutionRunner for BrokenRunner {
        fn execute(&self, _request: &ExecutionRequest) -> Result<ExecutionOutcome> {
            Err(anyhow!("no space left on device"))
        }
    }

    #[test]
    fn build_failure_short_circuits_without_executions() {
        let workspace = TestWorkspace::new(2).expect("workspace");
        let builder = ScriptedBuilder::new(vec![BuildOutcome::failure("error: expected ';'")]);
        let runner = ScriptedRunner::new(Vec::new());
        let paths = workspace.iteration(0);

        let evaluation =
            evaluate_candidate(&builder, &runner, &workspace.config, &paths, &workspace.slots)
                .expect("evaluate");

        assert!(!evaluation.overall_accepted);
        assert!(evaluation.test_results.is_empty());
        assert_eq!(evaluation.avg_exec_time, 0.0);
        assert!(evaluation.outcome.feedback().starts_with("build failed"));
        assert_eq!(runner.calls(), 0);
    }

    #[test]
    fn all_datasets_pass_and_time_is_averaged() {
        let workspace = TestWorkspace::new(2).expect("workspace");
        let builder = ScriptedBuilder::passing();
        let good = corrected_output(&track_with_speeds(&[10.0, 11.0], 10));
        let runner = ScriptedRunner::new(vec![
            ExecutionOutcome::completed(Duration::from_millis(100), good.clone()),
            ExecutionOutcome::completed(Duration::from_millis(300), good),
        ]);

        let evaluation = evaluate_candidate(
            &builder,
            &runner,
            &workspace.config,
            &workspace.iteration(0),
            &workspace.slots,
        )
        .expect("evaluate");

        assert!(evaluation.overall_accepted);
        assert_eq!(evaluation.test_results.len(), 2);
        assert!((evaluation.avg_exec_time - 0.2).abs() < 1e-9);
        assert!(evaluation.outcome.passed());
        assert_eq!(runner.calls(), 2);
    }

    #[test]
    fn one_failing_dataset_fails_iteration_and_counts_zero_time() {
        let workspace = TestWorkspace::new(3).expect("workspace");
        let builder = ScriptedBuilder::passing();
        let good = corrected_output(&track_with_speeds(&[10.0, 11.0], 10));
        let runner = ScriptedRunner::new(vec![
            ExecutionOutcome::completed(Duration::from_millis(300), good.clone()),
            ExecutionOutcome::failed(ExecutionFailure::Timeout { timeout_secs: 60 }),
            ExecutionOutcome::completed(Duration::from_millis(300), json!({"corrected_points": []})),
        ]);

        let evaluation = evaluate_candidate(
            &builder,
            &runner,
            &workspace.config,
            &workspace.iteration(0),
            &workspace.slots,
        )
        .expect("evaluate");

        assert!(!evaluation.overall_accepted);
        assert!((evaluation.avg_exec_time - 0.2).abs() < 1e-9);
        let results = &evaluation.test_results;
        assert!(results[0].accepted());
        assert_eq!(
            results[1].failure,
            Some(DatasetFailure::Execution(ExecutionFailure::Timeout {
                timeout_secs: 60
            }))
        );
        assert_eq!(
            results[2].failure,
            Some(DatasetFailure::Rejected(Rejection::NoCorrectedPoints))
        );
        let feedback = evaluation.outcome.feedback();
        assert!(feedback.contains("points2.json: candidate timed out"), "{feedback}");
        assert!(feedback.contains("points3.json: rejected: no corrected points produced"));
    }

    #[test]
    fn unloadable_dataset_fails_without_execution() {
        let mut workspace = TestWorkspace::new(1).expect("workspace");
        workspace.add_missing_dataset("broken.json").expect("slot");
        let builder = ScriptedBuilder::passing();
        let good = corrected_output(&track_with_speeds(&[10.0], 10));
        let runner = ScriptedRunner::new(vec![ExecutionOutcome::completed(
            Duration::from_millis(10),
            good,
        )]);

        let evaluation = evaluate_candidate(
            &builder,
            &runner,
            &workspace.config,
            &workspace.iteration(0),
            &workspace.slots,
        )
        .expect("evaluate");

        assert!(!evaluation.overall_accepted);
        assert_eq!(runner.calls(), 1);
        assert!(matches!(
            evaluation.test_results[1].failure,
            Some(DatasetFailure::Load { .. })
        ));
    }

    #[test]
    fn runner_error_is_not_blamed_on_the_candidate() {
        let workspace = TestWorkspace::new(1).expect("workspace");
        let evaluation = evaluate_candidate(
            &ScriptedBuilder::passing(),
            &BrokenRunner,
            &workspace.config,
            &workspace.iteration(0),
            &workspace.slots,
        )
        .expect("evaluate");

        assert!(!evaluation.overall_accepted);
        assert_eq!(
            evaluation.test_results[0].failure,
            Some(DatasetFailure::Execution(ExecutionFailure::Runner {
                message: "no space left on device".to_string(),
            }))
        );
        let feedback = evaluation.outcome.feedback();
        assert!(feedback.contains("execution runner failed"), "{feedback}");
        assert!(!feedback.contains("could not be started"), "{feedback}");
    }
}
