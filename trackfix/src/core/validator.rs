//! Statistical acceptance rules for a candidate's corrected output.
//!
//! The validator never trusts the shape of the candidate document: every field
//! access that can fail becomes a [`Rejection`] with a descriptive reason.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::core::failure::Rejection;
use crate::core::geometry::{speed, time_delta};
use crate::core::types::{Dataset, GeoPoint, ValidationOutcome};

/// Share of input points a correction may drop before a warning is logged.
const MIN_RETAINED_POINT_RATIO: f64 = 0.8;

/// Acceptance thresholds (`[validation]` in the config file).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationLimits {
    /// Any adjacent-pair speed above this (m/s) is an anomaly.
    pub anomaly_speed_threshold_mps: f64,
    /// Maximum allowed `(max - mean) / mean` gap, in percent.
    pub speed_deviation_tolerance_percent: f64,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            anomaly_speed_threshold_mps: 200.0,
            speed_deviation_tolerance_percent: 35.0,
        }
    }
}

/// Mean, median and maximum of the sampled inter-point speeds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedProfile {
    pub mean: f64,
    pub median: f64,
    pub max: f64,
}

impl SpeedProfile {
    /// Returns `None` for an empty sample.
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let mean = samples.iter().sum::<f64>() / samples.len() as f64;
        let max = samples.iter().copied().fold(f64::MIN, f64::max);

        let mut sorted = samples.to_vec();
        sorted.sort_by(f64::total_cmp);
        let mid = sorted.len() / 2;
        let median = if sorted.len() % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) / 2.0
        } else {
            sorted[mid]
        };

        Some(Self { mean, median, max })
    }

    /// Percentage by which the maximum exceeds the mean; `None` when mean is not positive.
    pub fn max_deviation_percent(&self) -> Option<f64> {
        if self.mean > 0.0 {
            Some((self.max - self.mean) * 100.0 / self.mean)
        } else {
            None
        }
    }
}

/// Reject profiles whose maximum sits further above the mean than the tolerance allows.
pub fn check_dispersion(profile: &SpeedProfile, tolerance_percent: f64) -> Result<(), Rejection> {
    match profile.max_deviation_percent() {
        Some(deviation) if deviation > tolerance_percent => Err(Rejection::ExcessiveDeviation {
            max: profile.max,
            mean: profile.mean,
            deviation,
            tolerance: tolerance_percent,
        }),
        _ => Ok(()),
    }
}

/// Validate a candidate's stdout document against the dataset it was run on.
pub fn validate(dataset: &Dataset, output: &Value, limits: &ValidationLimits) -> ValidationOutcome {
    let Some(fields) = output.as_object() else {
        return rejected(0, 0, Rejection::NotAnObject);
    };

    let detected = match read_counter(fields, "anomalies_detected") {
        Ok(value) => value,
        Err(rejection) => return rejected(0, 0, rejection),
    };
    let corrected = match read_counter(fields, "anomalies_corrected") {
        Ok(value) => value,
        Err(rejection) => return rejected(detected, 0, rejection),
    };

    let items = match fields.get("corrected_points") {
        None | Some(Value::Null) => return rejected(detected, corrected, Rejection::NoCorrectedPoints),
        Some(Value::Array(items)) if items.is_empty() => {
            return rejected(detected, corrected, Rejection::NoCorrectedPoints);
        }
        Some(Value::Array(items)) => items,
        Some(_) => {
            return rejected(
                detected,
                corrected,
                Rejection::MalformedField {
                    field: "corrected_points".to_string(),
                    expected: "an array of points".to_string(),
                },
            );
        }
    };

    let points = match parse_points(items) {
        Ok(points) => points,
        Err(rejection) => return rejected(detected, corrected, rejection),
    };
    warn_on_point_loss(dataset, points.len());

    let samples = match sample_speeds(&points, limits.anomaly_speed_threshold_mps) {
        Ok(samples) => samples,
        Err(rejection) => return rejected(detected, corrected, rejection),
    };

    let Some(profile) = SpeedProfile::from_samples(&samples) else {
        if points.len() <= 1 {
            debug!(dataset = %dataset.name, "single corrected point, nothing to evaluate");
            return accepted(detected, corrected, 0.0, 0.0);
        }
        return rejected(detected, corrected, Rejection::NoValidIntervals);
    };

    if let Err(rejection) =
        check_dispersion(&profile, limits.speed_deviation_tolerance_percent)
    {
        return ValidationOutcome {
            accepted: false,
            anomalies_detected: detected,
            anomalies_corrected: corrected,
            avg_speed: profile.mean,
            median_speed: profile.median,
            rejection: Some(rejection),
        };
    }

    accepted(detected, corrected, profile.mean, profile.median)
}

/// Collect speeds for every pair with a positive time delta.
///
/// Fails on the first pair faster than `threshold` or whose time delta overflows.
fn sample_speeds(points: &[GeoPoint], threshold: f64) -> Result<Vec<f64>, Rejection> {
    let mut samples = Vec::with_capacity(points.len().saturating_sub(1));
    for (index, pair) in points.windows(2).enumerate() {
        if time_delta(&pair[0], &pair[1]).is_none() {
            return Err(Rejection::MalformedPoint {
                index: index + 1,
                detail: "time delta overflows".to_string(),
            });
        }
        let Some(value) = speed(&pair[0], &pair[1]) else {
            continue;
        };
        if value > threshold {
            return Err(Rejection::AnomalousSpeed {
                from: index,
                to: index + 1,
                speed: value,
            });
        }
        samples.push(value);
    }
    Ok(samples)
}

fn parse_points(items: &[Value]) -> Result<Vec<GeoPoint>, Rejection> {
    items
        .iter()
        .enumerate()
        .map(|(index, item)| parse_point(index, item))
        .collect()
}

fn parse_point(index: usize, item: &Value) -> Result<GeoPoint, Rejection> {
    let Some(fields) = item.as_object() else {
        return Err(Rejection::MalformedPoint {
            index,
            detail: "not a JSON object".to_string(),
        });
    };
    let field = |key: &str| -> Result<i64, Rejection> {
        let value = fields.get(key).ok_or_else(|| Rejection::MalformedPoint {
            index,
            detail: format!("missing key '{key}'"),
        })?;
        as_integer(value).ok_or_else(|| Rejection::MalformedPoint {
            index,
            detail: format!("field '{key}' is not an integer"),
        })
    };
    Ok(GeoPoint {
        lat: field("lat")?,
        lon: field("lon")?,
        time: field("time")?,
    })
}

/// Missing counters read as zero; present ones must be integers.
fn read_counter(fields: &Map<String, Value>, key: &str) -> Result<i64, Rejection> {
    match fields.get(key) {
        None | Some(Value::Null) => Ok(0),
        Some(value) => as_integer(value).ok_or_else(|| Rejection::MalformedField {
            field: key.to_string(),
            expected: "an integer".to_string(),
        }),
    }
}

/// Accept JSON integers and floats with no fractional part (e.g. `49588396.0`).
pub(crate) fn as_integer(value: &Value) -> Option<i64> {
    if let Some(int) = value.as_i64() {
        return Some(int);
    }
    let float = value.as_f64()?;
    if float.is_finite() && float.fract() == 0.0 && float.abs() < i64::MAX as f64 {
        return Some(float as i64);
    }
    None
}

fn warn_on_point_loss(dataset: &Dataset, corrected_len: usize) {
    let original_len = dataset.points.len();
    if original_len == 0 {
        return;
    }
    let ratio = corrected_len as f64 / original_len as f64;
    if ratio < MIN_RETAINED_POINT_RATIO {
        warn!(
            dataset = %dataset.name,
            original_len,
            corrected_len,
            "correction dropped a large share of points"
        );
    }
}

fn accepted(detected: i64, corrected: i64, avg_speed: f64, median_speed: f64) -> ValidationOutcome {
    ValidationOutcome {
        accepted: true,
        anomalies_detected: detected,
        anomalies_corrected: corrected,
        avg_speed,
        median_speed,
        rejection: None,
    }
}

fn rejected(detected: i64, corrected: i64, rejection: Rejection) -> ValidationOutcome {
    ValidationOutcome {
        accepted: false,
        anomalies_detected: detected,
        anomalies_corrected: corrected,
        avg_speed: 0.0,
        median_speed: 0.0,
        rejection: Some(rejection),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{points_json, track_with_speeds};
    use serde_json::json;

    fn dataset(points: Vec<GeoPoint>) -> Dataset {
        Dataset {
            name: "points.json".to_string(),
            points,
        }
    }

    fn run(points: &[GeoPoint]) -> ValidationOutcome {
        let output = json!({
            "corrected_points": points_json(points),
            "anomalies_detected": 2,
            "anomalies_corrected": 1,
        });
        validate(&dataset(points.to_vec()), &output, &ValidationLimits::default())
    }

    #[test]
    fn accepts_steady_track_and_reports_counters() {
        let outcome = run(&track_with_speeds(&[10.0, 11.0, 12.0], 10));
        assert!(outcome.accepted, "{}", outcome.reason());
        assert_eq!(outcome.anomalies_detected, 2);
        assert_eq!(outcome.anomalies_corrected, 1);
        assert!((outcome.avg_speed - 11.0).abs() < 0.05, "{}", outcome.avg_speed);
        assert!((outcome.median_speed - 11.0).abs() < 0.05);
        assert!(outcome.reason().is_empty());
    }

    #[test]
    fn rejects_pair_above_anomaly_threshold_naming_it() {
        let outcome = run(&track_with_speeds(&[10.0, 250.0, 10.0], 10));
        assert!(!outcome.accepted);
        match outcome.rejection {
            Some(Rejection::AnomalousSpeed { from, to, speed }) => {
                assert_eq!((from, to), (1, 2));
                assert!((speed - 250.0).abs() < 0.1, "{speed}");
            }
            other => panic!("unexpected rejection {other:?}"),
        }
        assert!(outcome.reason().contains("between points 1 and 2"));
    }

    #[test]
    fn accepts_single_point_unconditionally() {
        let outcome = run(&[GeoPoint::new(49_000_000, 34_000_000, 100)]);
        assert!(outcome.accepted);
        assert_eq!(outcome.avg_speed, 0.0);
        assert_eq!(outcome.median_speed, 0.0);
    }

    #[test]
    fn rejects_missing_or_empty_corrected_points() {
        let limits = ValidationLimits::default();
        let empty = dataset(Vec::new());

        let missing = validate(&empty, &json!({"anomalies_detected": 0}), &limits);
        assert_eq!(missing.rejection, Some(Rejection::NoCorrectedPoints));
        assert_eq!(missing.reason(), "no corrected points produced");

        let blank = validate(&empty, &json!({"corrected_points": []}), &limits);
        assert_eq!(blank.rejection, Some(Rejection::NoCorrectedPoints));
    }

    #[test]
    fn rejects_when_all_intervals_are_non_positive() {
        let points = [
            GeoPoint::new(0, 0, 100),
            GeoPoint::new(0, 500, 100),
            GeoPoint::new(0, 900, 90),
        ];
        let outcome = run(&points);
        assert_eq!(outcome.rejection, Some(Rejection::NoValidIntervals));
    }

    #[test]
    fn skips_non_positive_intervals_without_rejecting() {
        // The middle pair shares a timestamp; it would be 1 km in 0 s if counted.
        let mut points = track_with_speeds(&[10.0], 10);
        let last = *points.last().expect("point");
        points.push(GeoPoint::new(last.lat, last.lon + 8_993, last.time));
        let tail = *points.last().expect("point");
        points.push(GeoPoint::new(tail.lat, tail.lon + 899, tail.time + 10));

        let outcome = run(&points);
        assert!(outcome.accepted, "{}", outcome.reason());
    }

    #[test]
    fn rejects_time_delta_that_overflows() {
        let limits = ValidationLimits::default();
        let output = json!({
            "corrected_points": [
                {"lat": 0, "lon": 0, "time": i64::MIN},
                {"lat": 0, "lon": 0, "time": i64::MAX},
            ],
        });
        let outcome = validate(&dataset(Vec::new()), &output, &limits);
        assert!(!outcome.accepted);
        assert_eq!(
            outcome.rejection,
            Some(Rejection::MalformedPoint {
                index: 1,
                detail: "time delta overflows".to_string(),
            })
        );
        assert_eq!(outcome.reason(), "corrected point 1: time delta overflows");
    }

    #[test]
    fn rejects_outlier_interval_far_above_mean() {
        let outcome = run(&track_with_speeds(&[10.0, 10.0, 30.0], 10));
        assert!(!outcome.accepted);
        assert!(matches!(
            outcome.rejection,
            Some(Rejection::ExcessiveDeviation { .. })
        ));
        // Dispersion rejections still report the computed profile.
        assert!(outcome.avg_speed > 16.0 && outcome.avg_speed < 17.0);
    }

    #[test]
    fn dispersion_boundary_is_inclusive() {
        // mean 20, max 27: exactly 35% above the mean.
        let at_boundary = SpeedProfile::from_samples(&[13.0, 27.0]).expect("profile");
        assert_eq!(at_boundary.max_deviation_percent(), Some(35.0));
        assert!(check_dispersion(&at_boundary, 35.0).is_ok());

        let below = SpeedProfile::from_samples(&[14.0, 26.0]).expect("profile");
        assert!(check_dispersion(&below, 35.0).is_ok());

        let above = SpeedProfile::from_samples(&[10.0, 30.0]).expect("profile");
        assert!(check_dispersion(&above, 35.0).is_err());
    }

    #[test]
    fn zero_mean_skips_dispersion_check() {
        let stationary = SpeedProfile::from_samples(&[0.0, 0.0]).expect("profile");
        assert_eq!(stationary.max_deviation_percent(), None);
        assert!(check_dispersion(&stationary, 35.0).is_ok());
    }

    #[test]
    fn median_handles_even_and_odd_samples() {
        let odd = SpeedProfile::from_samples(&[3.0, 1.0, 2.0]).expect("profile");
        assert_eq!(odd.median, 2.0);
        let even = SpeedProfile::from_samples(&[4.0, 1.0, 3.0, 2.0]).expect("profile");
        assert_eq!(even.median, 2.5);
        assert_eq!(even.max, 4.0);
        assert_eq!(SpeedProfile::from_samples(&[]), None);
    }

    #[test]
    fn malformed_fields_reject_with_descriptive_reason() {
        let limits = ValidationLimits::default();
        let data = dataset(Vec::new());

        let not_object = validate(&data, &json!([1, 2, 3]), &limits);
        assert_eq!(not_object.rejection, Some(Rejection::NotAnObject));

        let missing_key = validate(
            &data,
            &json!({"corrected_points": [{"lat": 1, "lon": 2, "time": 3}, {"lat": 1, "time": 4}]}),
            &limits,
        );
        assert_eq!(missing_key.reason(), "corrected point 1: missing key 'lon'");

        let bad_counter = validate(
            &data,
            &json!({"corrected_points": [{"lat": 1, "lon": 2, "time": 3}], "anomalies_detected": "two"}),
            &limits,
        );
        assert!(matches!(
            bad_counter.rejection,
            Some(Rejection::MalformedField { ref field, .. }) if field == "anomalies_detected"
        ));

        let not_array = validate(&data, &json!({"corrected_points": "none"}), &limits);
        assert!(matches!(
            not_array.rejection,
            Some(Rejection::MalformedField { .. })
        ));
    }

    #[test]
    fn accepts_integral_float_coordinates() {
        let output = json!({
            "corrected_points": [
                {"lat": 49588396.0, "lon": 34569212.0, "time": 1746025730},
                {"lat": 49588400.0, "lon": 34569300.0, "time": 1746025740},
            ],
        });
        let outcome = validate(&dataset(Vec::new()), &output, &ValidationLimits::default());
        assert!(outcome.accepted, "{}", outcome.reason());
        assert_eq!(outcome.anomalies_detected, 0);
    }
}
