//! End-to-end tests through real subprocesses.
//!
//! Candidates are shell scripts: the "build" copies the source to the artifact
//! path and marks it executable, so the real generator, builder and execution
//! runner are exercised without a C++ toolchain.

#![cfg(unix)]

use std::fs;
use std::path::Path;

use trackfix::core::failure::{DatasetFailure, ExecutionFailure, GenerationError};
use trackfix::core::report::summarize;
use trackfix::core::stop::LoopStop;
use trackfix::evaluate::evaluate_candidate;
use trackfix::io::builder::CommandBuildRunner;
use trackfix::io::execution::ProcessExecutionRunner;
use trackfix::io::generator::{CommandGenerator, GenerationRequest, generate_candidate};
use trackfix::io::report_store::write_report;
use trackfix::looping::IterationController;
use trackfix::test_support::TestWorkspace;

const ECHO_CANDIDATE: &str = "#!/bin/sh\nprintf '{\"anomalies_detected\": 0, \"anomalies_corrected\": 0, \"corrected_points\": '\ncat \"$1\"\nprintf '}'\n";

fn shell_workspace(datasets: usize) -> TestWorkspace {
    let mut workspace = TestWorkspace::new(datasets).expect("workspace");
    workspace.config.build.command = [
        "sh",
        "-c",
        "cp \"$0\" \"$1\" && chmod +x \"$1\"",
        "{source}",
        "{artifact}",
    ]
    .into_iter()
    .map(String::from)
    .collect();
    workspace
}

fn evaluate_script(workspace: &TestWorkspace, script: &str) -> trackfix::evaluate::CandidateEvaluation {
    let paths = workspace.iteration(0);
    paths.write_source(script).expect("write source");
    let builder = CommandBuildRunner::new(workspace.config.build.command.clone());
    evaluate_candidate(
        &builder,
        &ProcessExecutionRunner,
        &workspace.config,
        &paths,
        &workspace.slots,
    )
    .expect("evaluate")
}

fn write_generator(dir: &Path, response: &str) -> Vec<String> {
    let response_path = dir.join("response.md");
    fs::write(&response_path, response).expect("write response");
    let script = dir.join("generator.sh");
    fs::write(
        &script,
        format!("cat >/dev/null\ncat '{}'\n", response_path.display()),
    )
    .expect("write generator");
    vec!["sh".to_string(), script.display().to_string()]
}

#[test]
fn full_loop_accepts_shell_candidate() {
    let mut workspace = shell_workspace(2);
    workspace.config.success_target = 1;
    workspace.config.max_attempts = 3;
    workspace.config.generator.command = write_generator(
        workspace.temp.path(),
        &format!("Here you go:\n```cpp\n{ECHO_CANDIDATE}```\n"),
    );

    let generator = CommandGenerator::new(workspace.config.generator.command.clone());
    let builder = CommandBuildRunner::new(workspace.config.build.command.clone());
    let controller = IterationController::new(
        &generator,
        &builder,
        &ProcessExecutionRunner,
        &workspace.config,
        &workspace.run_paths,
        &workspace.slots,
    );

    let outcome = controller.run(|_| {}).expect("run");
    assert_eq!(outcome.stop, LoopStop::TargetReached { successes: 1 });
    let record = &outcome.history[0];
    assert!(record.overall_accepted, "{}", record.feedback);
    assert!(record.test_results.iter().all(|result| result.exec_time > 0.0));

    let paths = workspace.run_paths.iteration(0);
    assert!(
        fs::read_to_string(&paths.source_path)
            .expect("source")
            .starts_with("#!/bin/sh")
    );
    assert!(paths.artifact_path.is_file());
    assert!(paths.output_path("points.json").is_file());
    assert!(paths.generator_log_path.is_file());

    let report = summarize(&outcome.history, outcome.stop);
    write_report(&workspace.run_paths, &report).expect("write report");
    assert_eq!(
        fs::read_to_string(&workspace.run_paths.best_source_path).expect("best"),
        ECHO_CANDIDATE.trim()
    );
}

#[test]
fn compiler_error_is_build_failure_with_diagnostics() {
    let mut workspace = shell_workspace(1);
    workspace.config.build.command = vec![
        "sh".to_string(),
        "-c".to_string(),
        "echo 'candidate.cpp:2:5: error: expected ;' >&2; exit 1".to_string(),
    ];
    let evaluation = evaluate_script(&workspace, ECHO_CANDIDATE);
    assert!(!evaluation.build.succeeded);
    assert!(evaluation.test_results.is_empty());
    assert_eq!(
        evaluation.outcome.feedback(),
        "build failed:\ncandidate.cpp:2:5: error: expected ;"
    );
}

#[test]
fn slow_candidate_times_out() {
    let mut workspace = shell_workspace(1);
    workspace.config.execution.timeout_secs = 1;
    let evaluation = evaluate_script(&workspace, "#!/bin/sh\nexec sleep 5\n");
    assert!(!evaluation.overall_accepted);
    assert_eq!(
        evaluation.test_results[0].failure,
        Some(DatasetFailure::Execution(ExecutionFailure::Timeout {
            timeout_secs: 1
        }))
    );
    assert_eq!(evaluation.avg_exec_time, 0.0);
}

#[test]
fn non_zero_exit_is_reported_with_stderr() {
    let workspace = shell_workspace(1);
    let evaluation = evaluate_script(&workspace, "#!/bin/sh\necho boom >&2\nexit 3\n");
    assert_eq!(
        evaluation.test_results[0].failure,
        Some(DatasetFailure::Execution(ExecutionFailure::NonZeroExit {
            code: Some(3),
            stderr: "boom".to_string(),
        }))
    );
}

#[test]
fn non_json_output_is_malformed() {
    let workspace = shell_workspace(1);
    let evaluation = evaluate_script(&workspace, "#!/bin/sh\necho 'done, corrected 3 points'\n");
    assert!(matches!(
        evaluation.test_results[0].failure,
        Some(DatasetFailure::Execution(
            ExecutionFailure::MalformedOutput { .. }
        ))
    ));
    let raw = fs::read_to_string(workspace.run_paths.iteration(0).output_path("points.json"))
        .expect("raw output");
    assert_eq!(raw, "done, corrected 3 points\n");
}

#[test]
fn generator_exit_status_is_generation_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    let generator = CommandGenerator::new(vec![
        "sh".to_string(),
        "-c".to_string(),
        "cat >/dev/null; echo quota exceeded >&2; exit 7".to_string(),
    ]);
    let request = GenerationRequest {
        iteration: 0,
        prompt: "write code".to_string(),
        log_path: temp.path().join("generator.log"),
        timeout: std::time::Duration::from_secs(10),
        output_limit_bytes: 4096,
    };
    assert_eq!(
        generate_candidate(&generator, &request),
        Err(GenerationError::NonZeroExit {
            code: Some(7),
            stderr: "quota exceeded".to_string(),
        })
    );
    assert!(request.log_path.is_file());
}
