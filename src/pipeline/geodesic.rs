//! Ellipsoidal distance between two coordinates (Vincenty inverse on WGS-84).

use geo::{HaversineDistance, Point, VincentyDistance};

/// Distance in meters between two (lat, lon) points given in degrees.
///
/// Nearly antipodal points can keep Vincenty from converging; those fall back
/// to the spherical great-circle distance so the result is always finite and
/// non-negative.
pub fn distance_vincenty(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let from = Point::new(lon1, lat1);
    let to = Point::new(lon2, lat2);

    match from.vincenty_distance(&to) {
        Ok(distance) if distance.is_finite() => distance.max(0.0),
        Ok(_) => 0.0,
        Err(_) => {
            tracing::debug!("Vincenty did not converge for ({lat1}, {lon1}) -> ({lat2}, {lon2})");
            from.haversine_distance(&to)
        }
    }
}
