use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};

use crate::pipeline::geodesic::distance_vincenty;
use crate::pipeline::parse::Attributes;
use crate::types::activity::{Lap, Pause, TrackPoint};

const ATTRIB_PT_CADENCE: &str = "cadence";
const ATTRIB_PT_DIST: &str = "dist";
const ATTRIB_PT_ELE: &str = "ele";
const ATTRIB_PT_HR: &str = "hr";
const ATTRIB_PT_LAT: &str = "lat";
const ATTRIB_PT_LON: &str = "lon";
const ATTRIB_PT_POWER: &str = "power";
const ATTRIB_PT_TEMP: &str = "temp";
const ATTRIB_PT_TM: &str = "tm";

const ATTRIB_START_TIME: &str = "StartTime";
const ATTRIB_END_TIME: &str = "EndTime";
const ATTRIB_DURATION_SECONDS: &str = "DurationSeconds";

/// Parses an ISO-8601 timestamp. Values without an offset are taken as UTC.
pub fn parse_time(value: &str) -> Option<DateTime<FixedOffset>> {
    let value = value.trim();
    if let Ok(time) = DateTime::parse_from_rfc3339(value) {
        return Some(time);
    }

    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive).fixed_offset())
}

/// Coordinates of a `pt`, both `lat` and `lon` must be present.
pub fn point_coordinates(attributes: &Attributes) -> Option<(f64, f64)> {
    match (
        attributes.parse_f64(ATTRIB_PT_LAT),
        attributes.parse_f64(ATTRIB_PT_LON),
    ) {
        (Some(lat), Some(lon)) => Some((lat, lon)),
        _ => None,
    }
}

/// Running distance of one activity's track.
#[derive(Debug, Default)]
pub struct TrackAccumulator {
    distance: f64,
    prev_coordinates: Option<(f64, f64)>,
}

impl TrackAccumulator {
    /// Builds the next point from `pt` attributes. An explicit `dist` wins;
    /// otherwise the geodesic step from the previous fix is added when both
    /// fixes exist; otherwise the running distance is carried forward.
    /// The running distance never decreases.
    pub fn next_point(&mut self, attributes: &Attributes, anchor_ms: i64) -> TrackPoint {
        let coordinates = point_coordinates(attributes);

        if let Some(distance) = attributes.parse_f64(ATTRIB_PT_DIST) {
            if distance < self.distance {
                tracing::debug!("Track distance {} is below the running {}, keeping the running one", distance, self.distance);
            }
            self.distance = distance.max(self.distance);
        } else if let (Some((lat, lon)), Some((prev_lat, prev_lon))) =
            (coordinates, self.prev_coordinates)
        {
            self.distance += distance_vincenty(prev_lat, prev_lon, lat, lon);
        }

        if coordinates.is_some() {
            self.prev_coordinates = coordinates;
        }

        let time_ms = attributes.parse_f64(ATTRIB_PT_TM).and_then(|seconds| {
            let time_ms = offset_ms(anchor_ms, seconds);
            if time_ms.is_none() {
                tracing::warn!("Dropping out of range track point time tm={}", seconds);
            }
            time_ms
        });

        TrackPoint {
            time_ms,
            distance: self.distance,
            lat: coordinates.map(|(lat, _)| lat),
            lon: coordinates.map(|(_, lon)| lon),
            altitude: attributes.parse_f32(ATTRIB_PT_ELE),
            cadence: attributes.parse_f32(ATTRIB_PT_CADENCE),
            pulse: attributes.parse_f32(ATTRIB_PT_HR),
            power: attributes.parse_f32(ATTRIB_PT_POWER),
            temperature: attributes.parse_f32(ATTRIB_PT_TEMP),
        }
    }
}

/// A `Lap` needs a `StartTime`; the fractional part of `DurationSeconds` is
/// dropped.
pub fn parse_lap(attributes: &Attributes) -> Option<Lap> {
    let start_value = attributes.get_content(ATTRIB_START_TIME)?;
    let Some(start) = parse_time(start_value) else {
        tracing::warn!("Skipping lap with unreadable start time '{}'", start_value);
        return None;
    };

    let duration_seconds = attributes.parse_f64(ATTRIB_DURATION_SECONDS).unwrap_or(0.0);

    let start_ms = start.timestamp_millis();
    let Some(end_ms) = offset_ms(start_ms, duration_seconds) else {
        tracing::warn!("Skipping lap with out of range duration {}", duration_seconds);
        return None;
    };

    Some(Lap { start_ms, end_ms })
}

/// A `Pause` needs both `StartTime` and `EndTime`.
pub fn parse_pause(attributes: &Attributes) -> Option<Pause> {
    let start = attributes.get_content(ATTRIB_START_TIME).and_then(parse_time)?;
    let end = attributes.get_content(ATTRIB_END_TIME).and_then(parse_time)?;

    let start_ms = start.timestamp_millis();
    let end_ms = end.timestamp_millis();
    let Some(duration_ms) = end_ms.checked_sub(start_ms) else {
        tracing::warn!("Skipping pause with out of range times");
        return None;
    };

    Some(Pause {
        start_ms,
        end_ms,
        duration_ms,
    })
}

/// `base_ms` plus whole `seconds`, `None` when the result does not fit.
fn offset_ms(base_ms: i64, seconds: f64) -> Option<i64> {
    if !seconds.is_finite() || seconds.abs() >= (i64::MAX / 1000) as f64 {
        return None;
    }
    (seconds as i64).checked_mul(1000)?.checked_add(base_ms)
}
