//! Dataset loading, schema validation and per-run input normalization.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result, bail};
use jsonschema::{Draft, Validator};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::core::types::{Dataset, GeoPoint};
use crate::core::validator::as_integer;

const DATASET_SCHEMA: &str = include_str!("../../schemas/dataset.schema.json");

static DATASET_VALIDATOR: LazyLock<Validator> = LazyLock::new(|| {
    let schema: Value =
        serde_json::from_str(DATASET_SCHEMA).expect("dataset schema should be valid JSON");
    jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .expect("dataset schema should compile")
});

/// Why a dataset file could not be used. Reported per dataset, never fatal to the run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DatasetLoadError {
    #[error("cannot read {path}: {message}")]
    Read { path: String, message: String },
    #[error("invalid JSON in {path}: {message}")]
    Parse { path: String, message: String },
    #[error("{path} does not match the dataset schema: {}", .messages.join("; "))]
    Schema { path: String, messages: Vec<String> },
}

/// One configured dataset as prepared for a run.
#[derive(Debug, Clone)]
pub struct DatasetSlot {
    /// File name; identifies the dataset in results and artifact names.
    pub name: String,
    pub source: PathBuf,
    /// Normalized copy handed to candidates.
    pub input_path: PathBuf,
    pub dataset: Result<Dataset, DatasetLoadError>,
}

/// Read, parse and schema-check one dataset file.
pub fn load_dataset(path: &Path) -> Result<(Dataset, Value), DatasetLoadError> {
    let display = path.display().to_string();
    let contents = fs::read_to_string(path).map_err(|err| DatasetLoadError::Read {
        path: display.clone(),
        message: err.to_string(),
    })?;
    let value: Value = serde_json::from_str(&contents).map_err(|err| DatasetLoadError::Parse {
        path: display.clone(),
        message: err.to_string(),
    })?;

    let messages: Vec<String> = DATASET_VALIDATOR
        .iter_errors(&value)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        return Err(DatasetLoadError::Schema {
            path: display,
            messages,
        });
    }

    let points = value
        .as_array()
        .map(|items| items.iter().filter_map(point_from_value).collect())
        .unwrap_or_default();
    Ok((
        Dataset {
            name: dataset_name(path),
            points,
        },
        value,
    ))
}

/// Load every configured dataset once and write its normalized copy under `inputs_dir`.
///
/// Load failures are kept in the slot; only failures writing into `inputs_dir` abort,
/// as do two paths sharing a file name.
#[instrument(skip_all, fields(inputs_dir = %inputs_dir.display(), count = paths.len()))]
pub fn prepare_datasets(paths: &[PathBuf], inputs_dir: &Path) -> Result<Vec<DatasetSlot>> {
    if let Some(name) = duplicate_dataset_name(paths) {
        bail!("datasets share the file name {name}");
    }
    fs::create_dir_all(inputs_dir)
        .with_context(|| format!("create inputs dir {}", inputs_dir.display()))?;

    let mut slots = Vec::with_capacity(paths.len());
    for source in paths {
        let name = dataset_name(source);
        let input_path = inputs_dir.join(format!("input_{name}"));
        let dataset = match load_dataset(source) {
            Ok((dataset, raw)) => {
                let mut buf = serde_json::to_string_pretty(&raw).context("serialize dataset")?;
                buf.push('\n');
                fs::write(&input_path, buf)
                    .with_context(|| format!("write {}", input_path.display()))?;
                debug!(dataset = %name, points = dataset.points.len(), "dataset prepared");
                Ok(dataset)
            }
            Err(err) => {
                warn!(dataset = %name, error = %err, "dataset failed to load");
                Err(err)
            }
        };
        slots.push(DatasetSlot {
            name,
            source: source.clone(),
            input_path,
            dataset,
        });
    }
    Ok(slots)
}

/// First file name used by more than one path. Names key the input and output files.
pub fn duplicate_dataset_name(paths: &[PathBuf]) -> Option<String> {
    let mut seen = HashSet::new();
    paths
        .iter()
        .map(|path| dataset_name(path))
        .find(|name| !seen.insert(name.clone()))
}

fn dataset_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn point_from_value(item: &Value) -> Option<GeoPoint> {
    Some(GeoPoint {
        lat: as_integer(item.get("lat")?)?,
        lon: as_integer(item.get("lon")?)?,
        time: as_integer(item.get("time")?)?,
    })
}
