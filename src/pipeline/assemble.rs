//! Turns a finished [`StagedActivity`] into a [`FinishedTour`].

use chrono::{DateTime, Datelike, FixedOffset, TimeZone, Timelike, Utc};

use crate::config::ImportConfig;
use crate::error::ParseError;
use crate::pipeline::catalog::{Catalog, ImportedTours};
use crate::pipeline::timezone::zone_id_for_offset;
use crate::types::activity::{StagedActivity, TrackPoint};
use crate::types::catalog::{Tag, TourType};
use crate::types::equipment::AuxiliaryData;
use crate::types::tour::{FinishedTour, TimeSeries, TimerPauses, TourMarker, Weather, WeatherClouds};

const CUSTOM_DATA_FIELDS_LABEL: &str = "Custom Data Fields:";

#[derive(Debug, Clone, PartialEq)]
pub enum Assembled {
    New {
        tour: Box<FinishedTour>,
        created_tags: usize,
        created_tour_types: usize,
    },
    Duplicate {
        tour_id: i64,
    },
}

pub struct TourAssembler<'a> {
    config: &'a ImportConfig,
    auxiliary: &'a AuxiliaryData,
    import_file_path: &'a str,
}

impl<'a> TourAssembler<'a> {
    pub fn new(config: &'a ImportConfig, auxiliary: &'a AuxiliaryData, import_file_path: &'a str) -> Self {
        Self {
            config,
            auxiliary,
            import_file_path,
        }
    }

    /// Builds the tour and checks it against `imported`. Tags and tour types
    /// are resolved only for new tours.
    pub fn assemble(
        &self,
        activity: StagedActivity,
        imported: &dyn ImportedTours,
        catalog: &mut dyn Catalog,
    ) -> Result<Assembled, ParseError> {
        let Some(import_start) = activity.start_time else {
            return Err(ParseError::InvalidStartTime {
                path: self.import_file_path.to_string(),
            });
        };

        let mut tour = self.build_tour(&activity, import_start);

        resolve_time_zone(&mut tour, &activity, import_start);
        apply_pauses(&mut tour, &activity);
        tour.markers = create_markers(&tour, &activity);

        tour.tour_id = create_tour_id(&tour.start_time, &self.unique_key(&tour));
        if imported.contains_tour(tour.tour_id) {
            tracing::debug!("Tour {} from '{}' is already imported", tour.tour_id, self.import_file_path);
            return Ok(Assembled::Duplicate {
                tour_id: tour.tour_id,
            });
        }

        let (tour_type, created_tour_types) = resolve_tour_type(&activity, catalog);
        tour.tour_type = tour_type;

        let (tags, created_tags) = self.resolve_tags(&activity, catalog);
        tour.tags = tags;

        tracing::debug!(
            "Assembled tour {} with {} samples, {} markers, {} tags",
            tour.tour_id,
            tour.time_series.len(),
            tour.markers.len(),
            tour.tags.len()
        );

        Ok(Assembled::New {
            tour: Box::new(tour),
            created_tags,
            created_tour_types,
        })
    }

    fn build_tour(&self, activity: &StagedActivity, import_start: DateTime<FixedOffset>) -> FinishedTour {
        let mut tour = FinishedTour {
            tour_id: 0,
            start_time: import_start,
            time_zone_id: activity.zone.map(|zone| zone.name().to_string()),
            title: activity.name.clone(),
            description: build_description(activity),
            start_place: activity.location.clone(),
            import_file_path: self.import_file_path.to_string(),
            device_id: self.config.device_id.clone(),
            device_name: self.config.device_name.clone(),
            distance: 0.0,
            elapsed_time: 0,
            recorded_time: 0,
            paused_time: 0,
            moving_time: 0,
            elevation_up: activity.elevation_up,
            elevation_down: activity.elevation_down,
            calories: activity.calories,
            avg_pulse: 0.0,
            max_pulse: 0.0,
            avg_power: 0.0,
            max_power: 0,
            avg_cadence: 0.0,
            weather: Weather {
                text: activity.weather_text.clone(),
                clouds: activity
                    .weather_conditions
                    .as_deref()
                    .and_then(WeatherClouds::from_conditions),
                temperature: activity.weather_temperature,
                wind_speed: activity.weather_wind_speed,
            },
            time_series: TimeSeries::default(),
            timer_pauses: TimerPauses::default(),
            markers: Vec::new(),
            tags: Vec::new(),
            tour_type: None,
        };

        if activity.points.is_empty() {
            // manually entered in SportTracks
            tour.distance = activity.distance as f32;
            tour.elapsed_time = i64::from(activity.duration);
            tour.device_id = self.config.manual_device_id.clone();
        } else {
            let fallback_ms = activity.start_anchor_ms.unwrap_or_else(|| import_start.timestamp_millis());
            let (series, start_ms) = build_time_series(&activity.points, fallback_ms);

            if let Some(start) = Utc.timestamp_millis_opt(start_ms).single() {
                tour.start_time = start.with_timezone(&import_start.timezone());
            }

            tour.distance = series
                .distance
                .as_ref()
                .and_then(|distance| distance.last().copied())
                .unwrap_or(0.0);

            if !activity.has_gps && activity.distance > 0 {
                tour.distance = activity.distance as f32;
            }

            tour.elapsed_time = series.time.last().map(|&t| i64::from(t)).unwrap_or(0);

            if let Some(altitude) = &series.altitude {
                let (up, down) = altitude_up_down(altitude);
                tour.elevation_up = up;
                tour.elevation_down = down;
            }

            tour.time_series = series;
        }

        apply_summaries(&mut tour, activity);

        tour
    }

    fn unique_key(&self, tour: &FinishedTour) -> String {
        let distance = tour.distance as i64;
        if distance > 0 {
            distance.to_string()
        } else {
            self.config.unique_id_suffix.clone()
        }
    }

    /// Equipment is matched by id when the pre-pass supplied equipment,
    /// otherwise by the `EquipmentItem` name.
    fn resolve_tags(&self, activity: &StagedActivity, catalog: &mut dyn Catalog) -> (Vec<Tag>, usize) {
        let mut tags: Vec<Tag> = Vec::new();
        let mut created = 0;

        for item in &activity.equipment {
            let known = item
                .id
                .as_deref()
                .and_then(|id| self.auxiliary.equipment_by_id(id).map(|equipment| (id, equipment)));

            let tag = match known {
                Some((id, equipment)) => {
                    let name = equipment.display_name();
                    match catalog
                        .find_tag_by_equipment_id(id)
                        .or_else(|| catalog.find_tag_by_name(&name))
                    {
                        Some(tag) => tag,
                        None => {
                            created += 1;
                            catalog.create_tag(&name, Some(equipment.notes_text()), Some(id.to_string()))
                        }
                    }
                }
                None => {
                    let Some(name) = item.name.as_deref() else {
                        tracing::debug!("Skipping equipment item without a name");
                        continue;
                    };
                    match catalog.find_tag_by_name(name) {
                        Some(tag) => tag,
                        None => {
                            created += 1;
                            catalog.create_tag(name, None, item.id.clone())
                        }
                    }
                }
            };

            if !tags.iter().any(|existing| existing.id == tag.id) {
                tags.push(tag);
            }
        }

        (tags, created)
    }
}

fn resolve_tour_type(activity: &StagedActivity, catalog: &mut dyn Catalog) -> (Option<TourType>, usize) {
    let Some(category) = activity.category.as_deref().filter(|c| !c.is_empty()) else {
        return (None, 0);
    };

    match catalog.find_tour_type(category) {
        Some(tour_type) => (Some(tour_type), 0),
        None => (Some(catalog.create_tour_type(category)), 1),
    }
}

fn build_description(activity: &StagedActivity) -> Option<String> {
    let mut description = activity.notes.clone().unwrap_or_default();

    if !activity.custom_fields.is_empty() {
        if !description.trim().is_empty() {
            description.push_str("\n\n");
        }
        description.push_str(CUSTOM_DATA_FIELDS_LABEL);
        for (name, value) in activity.custom_fields.iter() {
            description.push_str(&format!("\n\"{name}\" : \"{value}\""));
        }
    }

    Some(description).filter(|d| !d.is_empty())
}

/// Relative series from absolute points. Returns the series and the epoch
/// milliseconds of its first sample.
fn build_time_series(points: &[TrackPoint], fallback_start_ms: i64) -> (TimeSeries, i64) {
    let start_ms = points
        .iter()
        .find_map(|point| point.time_ms)
        .unwrap_or(fallback_start_ms);

    let mut time = Vec::with_capacity(points.len());
    let mut previous = 0;
    for point in points {
        let relative = match point.time_ms {
            Some(ms) => seconds_between(start_ms, ms),
            None => previous,
        };
        time.push(relative);
        previous = relative;
    }

    let distance = if points.iter().any(|p| p.distance > 0.0) {
        Some(points.iter().map(|p| p.distance as f32).collect())
    } else {
        None
    };

    let series = TimeSeries {
        time,
        distance,
        altitude: fill_series(points, |p| p.altitude),
        latitude: fill_series(points, |p| p.coordinates().map(|(lat, _)| lat)),
        longitude: fill_series(points, |p| p.coordinates().map(|(_, lon)| lon)),
        pulse: fill_series(points, |p| p.pulse),
        cadence: fill_series(points, |p| p.cadence),
        power: fill_series(points, |p| p.power),
        temperature: fill_series(points, |p| p.temperature),
    };

    (series, start_ms)
}

/// `None` when no point has the value. Gaps repeat the previous value,
/// leading gaps take the first known one.
fn fill_series<T, F>(points: &[TrackPoint], value: F) -> Option<Vec<T>>
where
    T: Copy,
    F: Fn(&TrackPoint) -> Option<T>,
{
    let first = points.iter().find_map(&value)?;

    let mut last = first;
    let series = points
        .iter()
        .map(|point| {
            if let Some(v) = value(point) {
                last = v;
            }
            last
        })
        .collect();

    Some(series)
}

fn altitude_up_down(altitude: &[f32]) -> (i32, i32) {
    let mut up = 0.0;
    let mut down = 0.0;

    for pair in altitude.windows(2) {
        let diff = pair[1] - pair[0];
        if diff > 0.0 {
            up += diff;
        } else {
            down -= diff;
        }
    }

    (up.round() as i32, down.round() as i32)
}

fn apply_summaries(tour: &mut FinishedTour, activity: &StagedActivity) {
    let series = &tour.time_series;

    tour.avg_power = if activity.avg_power != 0.0 {
        activity.avg_power
    } else {
        series.power.as_deref().map(mean).unwrap_or(0.0)
    };
    tour.max_power = if activity.max_power != 0.0 {
        (activity.max_power + 0.5).floor() as i32
    } else {
        series.power.as_deref().map(max).unwrap_or(0.0).round() as i32
    };

    match series.pulse.as_deref() {
        Some(pulse) => {
            tour.avg_pulse = mean(pulse);
            tour.max_pulse = max(pulse);
        }
        None => {
            tour.avg_pulse = activity.avg_pulse as f32;
            tour.max_pulse = activity.max_pulse as f32;
        }
    }

    tour.avg_cadence = match series.cadence.as_deref() {
        Some(cadence) => mean(cadence),
        None => activity.avg_cadence as f32,
    };
}

/// Mean of the non-zero values.
fn mean(values: &[f32]) -> f32 {
    let mut sum = 0.0f64;
    let mut count = 0usize;
    for &v in values {
        if v > 0.0 {
            sum += f64::from(v);
            count += 1;
        }
    }
    if count > 0 {
        (sum / count as f64) as f32
    } else {
        0.0
    }
}

fn max(values: &[f32]) -> f32 {
    values.iter().copied().fold(0.0, f32::max)
}

/// Only tours without coordinates that carried an explicit UTC offset and a
/// start time need a zone id derived from the offset.
fn resolve_time_zone(tour: &mut FinishedTour, activity: &StagedActivity, import_start: DateTime<FixedOffset>) {
    if tour.time_series.has_coordinates() || activity.utc_offset_hours.is_none() || !activity.has_start_time {
        return;
    }

    let offset_seconds = import_start.offset().local_minus_utc();
    match zone_id_for_offset(offset_seconds, import_start.with_timezone(&Utc)) {
        Some(zone_id) => tour.time_zone_id = Some(zone_id.to_string()),
        None => tracing::warn!("No time zone matches UTC offset {}s", offset_seconds),
    }
}

fn apply_pauses(tour: &mut FinishedTour, activity: &StagedActivity) {
    if !activity.pauses.is_empty() {
        tour.timer_pauses = TimerPauses {
            start_ms: activity.pauses.iter().map(|p| p.start_ms).collect(),
            end_ms: activity.pauses.iter().map(|p| p.end_ms).collect(),
        };
    }

    tour.paused_time = tour.timer_pauses.total_seconds();
    tour.recorded_time = (tour.elapsed_time - tour.paused_time).max(0);
    tour.moving_time = if tour.time_series.is_empty() {
        i64::from(activity.duration)
    } else {
        tour.recorded_time
    };
}

/// One marker per lap, numbered in file order. The lap end is shifted by the
/// pauses overlapping the lap, then located in the time series.
fn create_markers(tour: &FinishedTour, activity: &StagedActivity) -> Vec<TourMarker> {
    let series = &tour.time_series;
    if activity.laps.is_empty() || series.is_empty() {
        return Vec::new();
    }

    let tour_start_ms = activity
        .start_anchor_ms
        .unwrap_or_else(|| tour.start_time.timestamp_millis());
    let series_start_ms = tour.start_time.timestamp_millis();
    let last_index = series.len() - 1;

    activity
        .laps
        .iter()
        .enumerate()
        .map(|(index, lap)| {
            let paused_ms = activity
                .pauses
                .iter()
                .filter(|pause| pause.overlaps(lap))
                .fold(0i64, |sum, pause| sum.saturating_add(pause.duration_ms));

            let lap_end_ms = lap.end_ms.saturating_add(paused_ms);
            let relative_time = seconds_between(tour_start_ms, lap_end_ms).max(0);

            let serie_index = series
                .time
                .iter()
                .position(|&t| t >= relative_time)
                .unwrap_or(last_index)
                .min(last_index);

            TourMarker {
                label: (index + 1).to_string(),
                serie_index,
                relative_time,
                absolute_time_ms: series_start_ms.saturating_add(i64::from(relative_time) * 1000),
                distance: series.distance.as_ref().map(|d| d[serie_index]),
                altitude: series.altitude.as_ref().map(|a| a[serie_index]),
                latitude: series.latitude.as_ref().map(|lat| lat[serie_index]),
                longitude: series.longitude.as_ref().map(|lon| lon[serie_index]),
            }
        })
        .collect()
}

/// Whole seconds from `from_ms` to `to_ms`, saturated to the `i32` range.
fn seconds_between(from_ms: i64, to_ms: i64) -> i32 {
    let seconds = to_ms.saturating_sub(from_ms) / 1000;
    seconds.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

/// Start year, month, day, hour and minute followed by `unique_key`, read
/// as a number. Keys too long for an `i64` are cut to five characters.
pub fn create_tour_id(start: &DateTime<FixedOffset>, unique_key: &str) -> i64 {
    let prefix = format!(
        "{}{}{}{}{}",
        start.year(),
        start.month(),
        start.day(),
        start.hour(),
        start.minute()
    );

    if let Ok(id) = format!("{prefix}{unique_key}").parse::<i64>() {
        return id;
    }

    let short_key: String = unique_key.chars().take(5).collect();
    if let Ok(id) = format!("{prefix}{short_key}").parse::<i64>() {
        return id;
    }

    tracing::warn!("Tour id key '{}{}' is not numeric, using the start time only", prefix, unique_key);
    prefix.parse().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::catalog::InMemoryCatalog;
    use crate::types::activity::{EquipmentRef, Lap, Pause};
    use crate::types::equipment::Equipment;
    use std::collections::HashSet;

    const T0: i64 = 1_622_878_200_000; // 2021-06-05T07:30:00Z

    fn start() -> DateTime<FixedOffset> {
        Utc.timestamp_millis_opt(T0).unwrap().fixed_offset()
    }

    fn track_activity(samples: usize, step_seconds: i64) -> StagedActivity {
        let mut activity = StagedActivity::new(Some(start()));
        for i in 0..samples {
            activity.points.push(TrackPoint {
                time_ms: Some(T0 + i as i64 * step_seconds * 1000),
                distance: i as f64 * 50.0,
                altitude: Some(400.0 + (i % 3) as f32),
                pulse: Some(120.0 + i as f32),
                ..Default::default()
            });
        }
        activity
    }

    fn assemble(activity: StagedActivity) -> FinishedTour {
        let config = ImportConfig::default();
        let aux = AuxiliaryData::default();
        let mut catalog = InMemoryCatalog::new();
        match TourAssembler::new(&config, &aux, "test.fitlog")
            .assemble(activity, &HashSet::new(), &mut catalog)
            .expect("assemble")
        {
            Assembled::New { tour, .. } => *tour,
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn manual_tour_uses_summary_values() {
        let mut activity = StagedActivity::new(Some(start()));
        activity.distance = 5000;
        activity.duration = 1800;
        activity.elevation_up = 40;

        let tour = assemble(activity);
        assert_eq!(tour.distance, 5000.0);
        assert_eq!(tour.elapsed_time, 1800);
        assert_eq!(tour.moving_time, 1800);
        assert_eq!(tour.elevation_up, 40);
        assert_eq!(tour.device_id, "manual");
        assert!(tour.is_manual());
    }

    #[test]
    fn pause_inside_lap_moves_marker() {
        let mut activity = track_activity(21, 10);
        activity.laps.push(Lap {
            start_ms: T0,
            end_ms: T0 + 100_000,
        });
        activity.pauses.push(Pause {
            start_ms: T0 + 20_000,
            end_ms: T0 + 50_000,
            duration_ms: 30_000,
        });

        let tour = assemble(activity);
        assert_eq!(tour.markers.len(), 1);
        let marker = &tour.markers[0];
        assert_eq!(marker.relative_time, 130);
        assert_eq!(marker.serie_index, 13);
        assert_eq!(marker.label, "1");
        assert_eq!(marker.distance, Some(650.0));
        assert_eq!(tour.paused_time, 30);
        assert_eq!(tour.recorded_time, 170);
    }

    #[test]
    fn lap_markers_stay_in_bounds() {
        let mut activity = track_activity(5, 10);
        activity.laps.push(Lap {
            start_ms: T0 - 600_000,
            end_ms: T0 - 300_000,
        });
        activity.laps.push(Lap {
            start_ms: T0,
            end_ms: T0 + 3_600_000,
        });

        let tour = assemble(activity);
        let indices: Vec<_> = tour.markers.iter().map(|m| m.serie_index).collect();
        assert_eq!(indices, vec![0, 4]);
        assert_eq!(tour.markers[0].relative_time, 0);
        assert_eq!(tour.markers[1].label, "2");
    }

    #[test]
    fn extreme_lap_and_pause_times_saturate() {
        let mut activity = track_activity(3, 10);
        activity.laps.push(Lap {
            start_ms: T0,
            end_ms: i64::MAX - 1,
        });
        activity.pauses.push(Pause {
            start_ms: T0,
            end_ms: i64::MAX,
            duration_ms: i64::MAX - T0,
        });

        let tour = assemble(activity);
        assert_eq!(tour.markers.len(), 1);
        assert_eq!(tour.markers[0].serie_index, 2);
        assert_eq!(tour.markers[0].relative_time, i32::MAX);
        assert_eq!(tour.recorded_time, 0);
    }

    #[test]
    fn summary_distance_wins_without_gps() {
        let mut activity = track_activity(3, 10);
        activity.distance = 1234;

        let tour = assemble(activity);
        assert_eq!(tour.distance, 1234.0);
        assert_eq!(tour.elapsed_time, 20);
        assert_eq!(tour.device_id, "fitlog");
        assert_eq!(tour.avg_pulse, 121.0);
        assert_eq!(tour.max_pulse, 122.0);
    }

    #[test]
    fn duplicate_is_reported_without_catalog_writes() {
        let mut activity = track_activity(3, 10);
        activity.category = Some("Cycling".into());

        let config = ImportConfig::default();
        let aux = AuxiliaryData::default();
        let assembler = TourAssembler::new(&config, &aux, "test.fitlog");
        let mut catalog = InMemoryCatalog::new();

        let first = assembler
            .assemble(activity.clone(), &HashSet::new(), &mut catalog)
            .expect("assemble");
        let Assembled::New { tour, created_tour_types, .. } = first else {
            panic!("expected a new tour");
        };
        assert_eq!(created_tour_types, 1);

        let imported: HashSet<i64> = [tour.tour_id].into_iter().collect();
        let second = assembler
            .assemble(activity, &imported, &mut catalog)
            .expect("assemble");
        assert_eq!(second, Assembled::Duplicate { tour_id: tour.tour_id });
        assert_eq!(catalog.tour_types().len(), 1);
    }

    #[test]
    fn tags_match_prepass_equipment_by_id() {
        let mut activity = StagedActivity::new(Some(start()));
        activity.equipment.push(EquipmentRef {
            id: Some("e1".into()),
            name: Some("ignored".into()),
        });
        activity.equipment.push(EquipmentRef {
            id: None,
            name: Some("Spare wheels".into()),
        });

        let aux = AuxiliaryData {
            equipment: vec![Equipment {
                id: Some("e1".into()),
                brand: Some("Trek".into()),
                model: Some("Domane".into()),
                ..Default::default()
            }],
            ..Default::default()
        };
        let config = ImportConfig::default();
        let mut catalog = InMemoryCatalog::new();

        let result = TourAssembler::new(&config, &aux, "test.fitlogex")
            .assemble(activity, &HashSet::new(), &mut catalog)
            .expect("assemble");
        let Assembled::New { tour, created_tags, .. } = result else {
            panic!("expected a new tour");
        };

        let names: Vec<_> = tour.tags.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Trek - Domane", "Spare wheels"]);
        assert_eq!(created_tags, 2);
        assert_eq!(tour.tags[0].equipment_id.as_deref(), Some("e1"));
        assert_eq!(tour.tags[0].notes.as_deref(), Some("Id(SportTracks): e1"));
    }

    #[test]
    fn offset_only_tours_get_a_zone_id() {
        let mut activity = StagedActivity::new(Some(start().with_timezone(&FixedOffset::east_opt(3600).unwrap())));
        activity.utc_offset_hours = Some(1);
        activity.has_start_time = true;
        activity.duration = 600;

        let tour = assemble(activity);
        let zone = tour.time_zone_id.expect("zone id");
        assert!(zone.contains('/'));
    }

    #[test]
    fn description_lists_custom_fields() {
        let mut activity = StagedActivity::new(Some(start()));
        activity.notes = Some("Felt good".into());
        activity.custom_fields.insert("TRIMP", "87".into());
        activity.custom_fields.insert("Mood", "great".into());

        let tour = assemble(activity);
        assert_eq!(
            tour.description.as_deref(),
            Some("Felt good\n\nCustom Data Fields:\n\"TRIMP\" : \"87\"\n\"Mood\" : \"great\"")
        );
    }

    #[test]
    fn tour_id_from_start_and_distance() {
        assert_eq!(create_tour_id(&start(), "30500"), 2_021_657_330_500);
        assert_eq!(create_tour_id(&start(), "24168"), 2_021_657_324_168);

        // too long for i64, key is shortened
        let long_key = "12345678901234567890";
        assert_eq!(create_tour_id(&start(), long_key), 2_021_657_312_345);
    }
}
