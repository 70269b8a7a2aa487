use chrono::{DateTime, FixedOffset};
use chrono_tz::Tz;

/// One sample of a staged activity. Absolute values only, relative series
/// are derived when the tour is assembled.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackPoint {
    /// Epoch milliseconds, `None` when the point carried no `tm`.
    pub time_ms: Option<i64>,
    /// Running distance in meters.
    pub distance: f64,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub altitude: Option<f32>,
    pub cadence: Option<f32>,
    pub pulse: Option<f32>,
    pub power: Option<f32>,
    pub temperature: Option<f32>,
}

impl TrackPoint {
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lap {
    pub start_ms: i64,
    pub end_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pause {
    pub start_ms: i64,
    pub end_ms: i64,
    pub duration_ms: i64,
}

impl Pause {
    /// True when the pause overlaps the lap interval.
    pub fn overlaps(&self, lap: &Lap) -> bool {
        self.start_ms < lap.end_ms && self.end_ms > lap.start_ms
    }
}

/// `EquipmentItem` reference inside an activity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EquipmentRef {
    pub id: Option<String>,
    pub name: Option<String>,
}

/// Accumulator for one `Activity` element while it is being parsed.
#[derive(Debug, Clone, Default)]
pub struct StagedActivity {
    pub start_time: Option<DateTime<FixedOffset>>,
    /// Epoch milliseconds used as the base for every `pt[tm]`.
    pub start_anchor_ms: Option<i64>,
    /// Zone derived from the first GPS fix.
    pub zone: Option<Tz>,

    pub points: Vec<TrackPoint>,
    pub laps: Vec<Lap>,
    pub pauses: Vec<Pause>,
    pub equipment: Vec<EquipmentRef>,

    pub name: Option<String>,
    pub notes: Option<String>,
    pub location: Option<String>,
    pub category: Option<String>,

    pub calories: i32,
    pub duration: i32,
    pub distance: i32,
    pub elevation_up: i32,
    pub elevation_down: i32,
    pub avg_pulse: i32,
    pub max_pulse: i32,
    pub avg_power: f32,
    pub max_power: f32,
    pub avg_cadence: i32,

    /// UTC offset in whole hours.
    pub utc_offset_hours: Option<i32>,
    pub has_start_time: bool,
    pub has_gps: bool,

    pub weather_text: Option<String>,
    pub weather_conditions: Option<String>,
    pub weather_temperature: Option<f32>,
    pub weather_wind_speed: Option<i32>,

    pub custom_fields: CustomFields,
}

impl StagedActivity {
    pub fn new(start_time: Option<DateTime<FixedOffset>>) -> Self {
        Self {
            start_anchor_ms: start_time.map(|t| t.timestamp_millis()),
            start_time,
            ..Self::default()
        }
    }
}

/// Insertion-ordered custom data field name→value map. Re-inserting a name
/// replaces the value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomFields {
    entries: Vec<(String, String)>,
}

impl CustomFields {
    pub fn insert(&mut self, name: &str, value: String) {
        match self.entries.iter_mut().find(|(key, _)| key == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name.to_string(), value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
