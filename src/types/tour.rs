use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::types::catalog::{Tag, TourType};

/// Relative time series of a tour. Optional series are present when at
/// least one sample carried the value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    /// Seconds since the tour start.
    pub time: Vec<i32>,
    pub distance: Option<Vec<f32>>,
    pub altitude: Option<Vec<f32>>,
    pub latitude: Option<Vec<f64>>,
    pub longitude: Option<Vec<f64>>,
    pub pulse: Option<Vec<f32>>,
    pub cadence: Option<Vec<f32>>,
    pub power: Option<Vec<f32>>,
    pub temperature: Option<Vec<f32>>,
}

impl TimeSeries {
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn has_coordinates(&self) -> bool {
        self.latitude.as_ref().is_some_and(|lat| !lat.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TourMarker {
    pub label: String,
    pub serie_index: usize,
    /// Seconds since the tour start.
    pub relative_time: i32,
    pub absolute_time_ms: i64,
    pub distance: Option<f32>,
    pub altitude: Option<f32>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeatherClouds {
    Clear,
    PartClouds,
    Overcast,
    ScatteredShowers,
    Rain,
    Lightning,
    Snow,
}

impl WeatherClouds {
    pub fn from_conditions(conditions: &str) -> Option<Self> {
        let clouds = match conditions {
            "Clear" => WeatherClouds::Clear,
            "ScatterClouds" | "PartClouds" | "Haze" => WeatherClouds::PartClouds,
            "Overcast" | "MostClouds" | "Clouds" => WeatherClouds::Overcast,
            "ChanceRain" | "LightDrizzle" | "LightRain" => WeatherClouds::ScatteredShowers,
            "Rain" | "HeavyRain" => WeatherClouds::Rain,
            "ChanceThunder" | "Thunder" => WeatherClouds::Lightning,
            "Snow" => WeatherClouds::Snow,
            _ => return None,
        };
        Some(clouds)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Weather {
    pub text: Option<String>,
    pub clouds: Option<WeatherClouds>,
    pub temperature: Option<f32>,
    /// km/h
    pub wind_speed: Option<i32>,
}

/// Timer pauses as paired start/end epoch milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerPauses {
    pub start_ms: Vec<i64>,
    pub end_ms: Vec<i64>,
}

impl TimerPauses {
    pub fn total_seconds(&self) -> i64 {
        self.start_ms
            .iter()
            .zip(&self.end_ms)
            .map(|(start, end)| end.saturating_sub(*start).max(0))
            .fold(0i64, i64::saturating_add)
            / 1000
    }
}

/// A completely assembled tour, owned by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinishedTour {
    pub tour_id: i64,
    pub start_time: DateTime<FixedOffset>,
    pub time_zone_id: Option<String>,

    pub title: Option<String>,
    pub description: Option<String>,
    pub start_place: Option<String>,
    pub import_file_path: String,

    pub device_id: String,
    pub device_name: String,

    /// Meters
    pub distance: f32,
    pub elapsed_time: i64,
    pub recorded_time: i64,
    pub paused_time: i64,
    pub moving_time: i64,
    pub elevation_up: i32,
    pub elevation_down: i32,

    pub calories: i32,
    pub avg_pulse: f32,
    pub max_pulse: f32,
    pub avg_power: f32,
    pub max_power: i32,
    pub avg_cadence: f32,

    pub weather: Weather,
    pub time_series: TimeSeries,
    pub timer_pauses: TimerPauses,
    pub markers: Vec<TourMarker>,
    pub tags: Vec<Tag>,
    pub tour_type: Option<TourType>,
}

impl FinishedTour {
    pub fn is_manual(&self) -> bool {
        self.time_series.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_sporttracks_conditions() {
        assert_eq!(WeatherClouds::from_conditions("Haze"), Some(WeatherClouds::PartClouds));
        assert_eq!(WeatherClouds::from_conditions("HeavyRain"), Some(WeatherClouds::Rain));
        assert_eq!(WeatherClouds::from_conditions("Fog"), None);
    }

    #[test]
    fn pauses_sum_whole_seconds() {
        let pauses = TimerPauses {
            start_ms: vec![0, 10_000],
            end_ms: vec![1_500, 20_000],
        };
        assert_eq!(pauses.total_seconds(), 11);
    }
}
