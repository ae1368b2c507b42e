//! Command-line entry point for the track-correction candidate pipeline.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::warn;

use trackfix::core::report::{PerformanceTrend, RunReport, summarize};
use trackfix::core::types::{IterationRecord, TestResult};
use trackfix::evaluate::evaluate_candidate;
use trackfix::exit_codes;
use trackfix::io::artifacts::{IterationPaths, RunPaths};
use trackfix::io::builder::CommandBuildRunner;
use trackfix::io::config::{DEFAULT_CONFIG_FILE, PipelineConfig, load_config, write_config};
use trackfix::io::dataset::{DatasetSlot, prepare_datasets};
use trackfix::io::execution::ProcessExecutionRunner;
use trackfix::io::generator::CommandGenerator;
use trackfix::io::report_store::{load_report, write_report};
use trackfix::logging;
use trackfix::looping::IterationController;

#[derive(Parser)]
#[command(
    name = "trackfix",
    version,
    about = "Generate, build and validate GPS track-correction programs"
)]
struct Cli {
    /// Pipeline config file.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write the default config file.
    Init {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
    /// Run the generate/build/validate loop and write the report.
    Run,
    /// Build and validate an existing candidate source without generating.
    Evaluate {
        /// C++ source file to evaluate.
        source: PathBuf,
    },
    /// Summarize the persisted report.
    Report,
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{err:#}");
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force } => cmd_init(&cli.config, force),
        Command::Run => cmd_run(&cli.config),
        Command::Evaluate { source } => cmd_evaluate(&cli.config, &source),
        Command::Report => cmd_report(&cli.config),
    }
}

fn cmd_init(config_path: &Path, force: bool) -> Result<i32> {
    if !force && config_path.exists() {
        println!(
            "config exists: {} (use --force to overwrite)",
            config_path.display()
        );
        return Ok(exit_codes::OK);
    }
    write_config(config_path, &PipelineConfig::default())?;
    println!("wrote {}", config_path.display());
    Ok(exit_codes::OK)
}

fn cmd_run(config_path: &Path) -> Result<i32> {
    let config = load_config(config_path)?;
    let paths = RunPaths::new(&config.output_dir);
    let slots = prepare_run_datasets(&config, &paths)?;

    let generator = CommandGenerator::new(config.generator.command.clone());
    let builder = CommandBuildRunner::new(config.build.command.clone());
    let controller = IterationController::new(
        &generator,
        &builder,
        &ProcessExecutionRunner,
        &config,
        &paths,
        &slots,
    );
    let outcome = controller.run(print_iteration)?;

    let report = summarize(&outcome.history, outcome.stop);
    write_report(&paths, &report)?;
    print_report(&report);
    println!("report: path={}", paths.report_path.display());

    Ok(if report.successful_iterations > 0 {
        exit_codes::OK
    } else {
        exit_codes::NO_ACCEPTED
    })
}

fn cmd_evaluate(config_path: &Path, source_path: &Path) -> Result<i32> {
    let source = fs::read_to_string(source_path)
        .with_context(|| format!("read candidate {}", source_path.display()))?;
    let config = load_config(config_path)?;
    let run_paths = RunPaths::new(&config.output_dir);
    let slots = prepare_run_datasets(&config, &run_paths)?;

    let paths = IterationPaths::at(config.output_dir.join("evaluate"));
    paths.create()?;
    paths.write_source(&source)?;

    let builder = CommandBuildRunner::new(config.build.command.clone());
    let evaluation =
        evaluate_candidate(&builder, &ProcessExecutionRunner, &config, &paths, &slots)?;

    println!("evaluate: {}", evaluation.outcome.feedback());
    print_test_results(&evaluation.test_results);
    Ok(if evaluation.overall_accepted {
        exit_codes::OK
    } else {
        exit_codes::NO_ACCEPTED
    })
}

fn cmd_report(config_path: &Path) -> Result<i32> {
    let config = load_config(config_path)?;
    let paths = RunPaths::new(&config.output_dir);
    let persisted = load_report(&paths.report_path)?;
    println!("report: generated_at={}", persisted.generated_at);
    print_report(&persisted.report);
    Ok(exit_codes::OK)
}

fn prepare_run_datasets(config: &PipelineConfig, paths: &RunPaths) -> Result<Vec<DatasetSlot>> {
    let slots = prepare_datasets(&config.datasets, &paths.inputs_dir)?;
    if slots.iter().all(|slot| slot.dataset.is_err()) {
        warn!("no dataset could be loaded; every candidate will fail");
    }
    for slot in &slots {
        if let Err(err) = &slot.dataset {
            eprintln!("dataset {}: {err}", slot.name);
        }
    }
    Ok(slots)
}

fn print_iteration(record: &IterationRecord) {
    if record.overall_accepted {
        println!(
            "iteration {}: accepted avg_exec_time={:.4}s",
            record.index, record.avg_exec_time
        );
    } else {
        let headline = record.feedback.lines().next().unwrap_or_default();
        println!("iteration {}: failed ({headline})", record.index);
    }
    print_test_results(&record.test_results);
}

fn print_test_results(results: &[TestResult]) {
    for result in results.iter().filter(|result| !result.accepted()) {
        println!("  {}: {}", result.dataset, result.error());
    }
}

fn print_report(report: &RunReport) {
    println!("report: total_iterations={}", report.total_iterations);
    println!(
        "report: successful_iterations={}",
        report.successful_iterations
    );
    match (report.best_iteration, report.best_exec_time) {
        (Some(index), Some(time)) => {
            println!("report: best_iteration={index}");
            println!("report: best_exec_time={time:.4}");
        }
        _ => println!("report: best_iteration=none"),
    }
    match &report.performance_trend {
        PerformanceTrend::Improved {
            first_iteration,
            best_iteration,
            percent,
            ..
        } => println!(
            "report: trend=improved percent={percent:.2} first={first_iteration} best={best_iteration}"
        ),
        PerformanceTrend::Unchanged { best_iteration } => {
            println!("report: trend=unchanged best={best_iteration}");
        }
        PerformanceTrend::InsufficientData => println!("report: trend=insufficient_data"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_init() {
        let cli = Cli::parse_from(["trackfix", "init"]);
        assert!(matches!(cli.command, Command::Init { force: false }));
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_FILE));
    }

    #[test]
    fn parse_init_force() {
        let cli = Cli::parse_from(["trackfix", "init", "--force"]);
        assert!(matches!(cli.command, Command::Init { force: true }));
    }

    #[test]
    fn parse_global_config_after_subcommand() {
        let cli = Cli::parse_from(["trackfix", "run", "--config", "custom.toml"]);
        assert!(matches!(cli.command, Command::Run));
        assert_eq!(cli.config, PathBuf::from("custom.toml"));
    }

    #[test]
    fn parse_evaluate_source() {
        let cli = Cli::parse_from(["trackfix", "evaluate", "results/iterations/3/candidate.cpp"]);
        match cli.command {
            Command::Evaluate { source } => {
                assert_eq!(source, PathBuf::from("results/iterations/3/candidate.cpp"));
            }
            _ => panic!("expected evaluate"),
        }
    }
}
