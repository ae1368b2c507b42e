//! Test-only fakes and fixtures for driving the pipeline without subprocesses.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fs;
use std::path::PathBuf;

use anyhow::{Result, anyhow};
use serde_json::{Value, json};
use tempfile::TempDir;

use crate::core::failure::GenerationError;
use crate::core::geometry::EARTH_RADIUS_M;
use crate::core::types::{BuildOutcome, ExecutionOutcome, GeoPoint};
use crate::io::artifacts::{IterationPaths, RunPaths};
use crate::io::builder::{BuildRequest, BuildRunner};
use crate::io::config::PipelineConfig;
use crate::io::dataset::{DatasetSlot, prepare_datasets};
use crate::io::execution::{ExecutionRequest, ExecutionRunner};
use crate::io::generator::{GenerationRequest, Generator};

/// First timestamp of generated tracks.
pub const TRACK_START_TIME: i64 = 1_746_025_730;

/// Pops scripted values in order, repeating the last one once the script runs out.
struct Script<T: Clone> {
    queue: RefCell<VecDeque<T>>,
    last: RefCell<Option<T>>,
}

impl<T: Clone> Script<T> {
    fn new(items: Vec<T>) -> Self {
        Self {
            queue: RefCell::new(items.into()),
            last: RefCell::new(None),
        }
    }

    fn pop(&self) -> Option<T> {
        if let Some(item) = self.queue.borrow_mut().pop_front() {
            *self.last.borrow_mut() = Some(item.clone());
            return Some(item);
        }
        self.last.borrow().clone()
    }
}

/// Generator returning canned responses and remembering every prompt.
pub struct ScriptedGenerator {
    script: Script<Result<String, GenerationError>>,
    prompts: RefCell<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new(responses: Vec<Result<String, GenerationError>>) -> Self {
        Self {
            script: Script::new(responses),
            prompts: RefCell::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.borrow().clone()
    }
}

impl Generator for ScriptedGenerator {
    fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        self.prompts.borrow_mut().push(request.prompt.clone());
        self.script.pop().unwrap_or(Err(GenerationError::EmptyResponse))
    }
}

/// Build runner returning canned outcomes.
pub struct ScriptedBuilder {
    script: Script<BuildOutcome>,
    calls: Cell<usize>,
}

impl ScriptedBuilder {
    pub fn new(outcomes: Vec<BuildOutcome>) -> Self {
        Self {
            script: Script::new(outcomes),
            calls: Cell::new(0),
        }
    }

    pub fn passing() -> Self {
        Self::new(vec![BuildOutcome::success("")])
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl BuildRunner for ScriptedBuilder {
    fn build(&self, _request: &BuildRequest) -> Result<BuildOutcome> {
        self.calls.set(self.calls.get() + 1);
        self.script
            .pop()
            .ok_or_else(|| anyhow!("no scripted build outcome"))
    }
}

/// Execution runner returning canned outcomes and remembering input paths.
pub struct ScriptedRunner {
    script: Script<ExecutionOutcome>,
    inputs: RefCell<Vec<PathBuf>>,
}

impl ScriptedRunner {
    pub fn new(outcomes: Vec<ExecutionOutcome>) -> Self {
        Self {
            script: Script::new(outcomes),
            inputs: RefCell::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.inputs.borrow().len()
    }

    pub fn inputs(&self) -> Vec<PathBuf> {
        self.inputs.borrow().clone()
    }
}

impl ExecutionRunner for ScriptedRunner {
    fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionOutcome> {
        self.inputs.borrow_mut().push(request.input_path.clone());
        self.script
            .pop()
            .ok_or_else(|| anyhow!("no scripted execution outcome"))
    }
}

/// Temporary directory with datasets, a fast config and prepared dataset slots.
pub struct TestWorkspace {
    pub temp: TempDir,
    pub config: PipelineConfig,
    pub run_paths: RunPaths,
    pub slots: Vec<DatasetSlot>,
}

impl TestWorkspace {
    /// Create `datasets` valid track files named `points.json`, `points2.json`, ...
    pub fn new(datasets: usize) -> Result<Self> {
        let temp = tempfile::tempdir()?;
        let mut paths = Vec::with_capacity(datasets);
        for index in 0..datasets {
            let name = if index == 0 {
                "points.json".to_string()
            } else {
                format!("points{}.json", index + 1)
            };
            let path = temp.path().join(name);
            let track = track_with_speeds(&[10.0, 12.0, 11.0], 10);
            fs::write(&path, serde_json::to_string_pretty(&points_json(&track))?)?;
            paths.push(path);
        }

        let config = PipelineConfig {
            output_dir: temp.path().join("results"),
            datasets: paths,
            pacing_delay_ms: 0,
            ..PipelineConfig::default()
        };
        let run_paths = RunPaths::new(&config.output_dir);
        let slots = prepare_datasets(&config.datasets, &run_paths.inputs_dir)?;
        Ok(Self {
            temp,
            config,
            run_paths,
            slots,
        })
    }

    /// Register a dataset path that does not exist.
    pub fn add_missing_dataset(&mut self, name: &str) -> Result<()> {
        self.config.datasets.push(self.temp.path().join(name));
        self.slots = prepare_datasets(&self.config.datasets, &self.run_paths.inputs_dir)?;
        Ok(())
    }

    pub fn iteration(&self, index: u32) -> IterationPaths {
        let paths = self.run_paths.iteration(index);
        fs::create_dir_all(&paths.dir).expect("create iteration dir");
        paths
    }
}

/// Microdegrees of longitude spanning `meters` along the equator.
pub fn equator_microdegrees(meters: f64) -> i64 {
    (meters / (EARTH_RADIUS_M * std::f64::consts::PI / 180.0) * 1e6).round() as i64
}

/// Equatorial track whose consecutive intervals move at `speeds` (m/s), `dt` seconds apart.
pub fn track_with_speeds(speeds: &[f64], dt: i64) -> Vec<GeoPoint> {
    let mut point = GeoPoint::new(0, 0, TRACK_START_TIME);
    let mut track = vec![point];
    for speed in speeds {
        point = GeoPoint::new(
            point.lat,
            point.lon + equator_microdegrees(speed * dt as f64),
            point.time + dt,
        );
        track.push(point);
    }
    track
}

pub fn points_json(points: &[GeoPoint]) -> Value {
    json!(points)
}

/// Candidate stdout document containing `points`.
pub fn corrected_output(points: &[GeoPoint]) -> Value {
    json!({
        "corrected_points": points_json(points),
        "anomalies_detected": 0,
        "anomalies_corrected": 0,
    })
}
