//! Great-circle distance and derived speed between GPS samples.

use crate::core::types::GeoPoint;

/// Mean Earth radius used by the haversine formula, in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Haversine distance in meters between two coordinates given in decimal degrees.
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    // Rounding can push `a` just outside [0, 1] for antipodal or identical points.
    let a = a.clamp(0.0, 1.0);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

/// Distance in meters between two samples.
pub fn distance(from: &GeoPoint, to: &GeoPoint) -> f64 {
    haversine_distance(
        from.lat_degrees(),
        from.lon_degrees(),
        to.lat_degrees(),
        to.lon_degrees(),
    )
}

/// Seconds from `from` to `to`, or `None` when the difference does not fit in an `i64`.
pub fn time_delta(from: &GeoPoint, to: &GeoPoint) -> Option<i64> {
    to.time.checked_sub(from.time)
}

/// Speed in m/s from `from` to `to`, or `None` when the time delta is not positive
/// or overflows.
pub fn speed(from: &GeoPoint, to: &GeoPoint) -> Option<f64> {
    let dt = time_delta(from, to).filter(|dt| *dt > 0)?;
    Some(distance(from, to) / dt as f64)
}
