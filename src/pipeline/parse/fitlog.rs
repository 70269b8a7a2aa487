//! Activity pass: turns every `Activity` element into a [`StagedActivity`].

use chrono::{FixedOffset, TimeZone, Utc};

use crate::error::ParseError;
use crate::pipeline::parse::accumulate::{parse_lap, parse_pause, parse_time, point_coordinates, TrackAccumulator};
use crate::pipeline::parse::{visit, Attributes, XmlHandler};
use crate::pipeline::timezone::ZoneLocator;
use crate::types::activity::{EquipmentRef, StagedActivity};
use crate::types::equipment::CustomFieldDefinitions;

const TAG_ACTIVITY: &str = "Activity";
const TAG_CADENCE: &str = "Cadence";
const TAG_CALORIES: &str = "Calories";
const TAG_CATEGORY: &str = "Category";
const TAG_CUSTOM_DATA_FIELD: &str = "CustomDataField";
const TAG_CUSTOM_DATA_FIELDS: &str = "CustomDataFields";
const TAG_DURATION: &str = "Duration";
const TAG_DISTANCE: &str = "Distance";
const TAG_ELEVATION: &str = "Elevation";
const TAG_EQUIPMENT_ITEM: &str = "EquipmentItem";
const TAG_HAS_START_TIME: &str = "HasStartTime";
const TAG_HEART_RATE: &str = "HeartRate";
const TAG_LOCATION: &str = "Location";
const TAG_NAME: &str = "Name";
const TAG_NOTES: &str = "Notes";
const TAG_POWER: &str = "Power";
const TAG_TIME_ZONE_UTC_OFFSET: &str = "TimeZoneUtcOffset";
const TAG_WEATHER: &str = "Weather";
const TAG_TRACK: &str = "Track";
const TAG_TRACK_PT: &str = "pt";
const TAG_LAPS: &str = "Laps";
const TAG_LAP: &str = "Lap";
const TAG_TRACK_CLOCK: &str = "TrackClock";
const TAG_PAUSE: &str = "Pause";

const ATTRIB_NAME: &str = "Name";
const ATTRIB_ID: &str = "Id";
const ATTRIB_START_TIME: &str = "StartTime";
const ATTRIB_TOTAL_SECONDS: &str = "TotalSeconds";
const ATTRIB_TOTAL_METERS: &str = "TotalMeters";
const ATTRIB_TOTAL_CAL: &str = "TotalCal";
const ATTRIB_ASCEND_METERS: &str = "AscendMeters";
const ATTRIB_DESCEND_METERS: &str = "DescendMeters";
const ATTRIB_AVERAGE_BPM: &str = "AverageBPM";
const ATTRIB_MAXIMUM_BPM: &str = "MaximumBPM";
const ATTRIB_AVERAGE_WATTS: &str = "AverageWatts";
const ATTRIB_MAXIMUM_WATTS: &str = "MaximumWatts";
const ATTRIB_AVERAGE_RPM: &str = "AverageRPM";
const ATTRIB_WEATHER_TEMP: &str = "Temp";
const ATTRIB_WEATHER_CONDITIONS: &str = "Conditions";
const ATTRIB_CUSTOM_FIELD_NAME: &str = "name";
const ATTRIB_CUSTOM_FIELD_VALUE: &str = "v";

const WIND_SPEED_LABEL: &str = "Wind Speed:";
const WIND_SPEED_UNIT_MPH: &str = "mph";
const KM_PER_MILE: f32 = 1.609_344;

/// Part of an activity the parser is currently inside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Summary,
    Track,
    Laps,
    Pauses,
    CustomFields,
}

impl Section {
    fn opened_by(name: &str) -> Option<Self> {
        match name {
            TAG_TRACK => Some(Section::Track),
            TAG_LAPS => Some(Section::Laps),
            TAG_TRACK_CLOCK => Some(Section::Pauses),
            TAG_CUSTOM_DATA_FIELDS => Some(Section::CustomFields),
            _ => None,
        }
    }

    fn closing_tag(self) -> Option<&'static str> {
        match self {
            Section::Summary => None,
            Section::Track => Some(TAG_TRACK),
            Section::Laps => Some(TAG_LAPS),
            Section::Pauses => Some(TAG_TRACK_CLOCK),
            Section::CustomFields => Some(TAG_CUSTOM_DATA_FIELDS),
        }
    }
}

/// Summary element whose character data is being collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextField {
    Name,
    Notes,
    Weather,
    TimeZoneUtcOffset,
    HasStartTime,
}

impl TextField {
    fn tag(self) -> &'static str {
        match self {
            TextField::Name => TAG_NAME,
            TextField::Notes => TAG_NOTES,
            TextField::Weather => TAG_WEATHER,
            TextField::TimeZoneUtcOffset => TAG_TIME_ZONE_UTC_OFFSET,
            TextField::HasStartTime => TAG_HAS_START_TIME,
        }
    }
}

struct ActivityState {
    staged: StagedActivity,
    section: Section,
    text: Option<TextField>,
    characters: String,
    track: TrackAccumulator,
}

impl ActivityState {
    fn new(attributes: &Attributes) -> Self {
        let start_time = attributes.get_content(ATTRIB_START_TIME).and_then(|value| {
            let parsed = parse_time(value);
            if parsed.is_none() {
                tracing::warn!("Activity has an unreadable start time '{}'", value);
            }
            parsed
        });

        Self {
            staged: StagedActivity::new(start_time),
            section: Section::Summary,
            text: None,
            characters: String::new(),
            track: TrackAccumulator::default(),
        }
    }
}

/// Streams every `Activity` of `bytes` into `on_activity`, in document order.
/// An error from `on_activity` stops the pass. Returns the number of
/// activities found.
pub fn parse_activities<F>(
    bytes: &[u8],
    path: &str,
    field_definitions: &CustomFieldDefinitions,
    locator: &dyn ZoneLocator,
    on_activity: F,
) -> Result<usize, ParseError>
where
    F: FnMut(StagedActivity) -> Result<(), ParseError>,
{
    let mut handler = ActivityHandler {
        path,
        field_definitions,
        locator,
        current: None,
        activities: 0,
        on_activity,
    };

    visit(bytes, &mut handler)?;

    Ok(handler.activities)
}

struct ActivityHandler<'a, F> {
    path: &'a str,
    field_definitions: &'a CustomFieldDefinitions,
    locator: &'a dyn ZoneLocator,
    current: Option<ActivityState>,
    activities: usize,
    on_activity: F,
}

impl<F> XmlHandler for ActivityHandler<'_, F>
where
    F: FnMut(StagedActivity) -> Result<(), ParseError>,
{
    fn start_element(&mut self, name: &str, attributes: &Attributes) -> Result<(), ParseError> {
        if name == TAG_ACTIVITY {
            if self.current.is_some() {
                tracing::warn!("Nested activity in '{}', dropping the unfinished one", self.path);
            }
            self.current = Some(ActivityState::new(attributes));
            return Ok(());
        }

        let Some(state) = self.current.as_mut() else {
            return Ok(());
        };

        match state.section {
            Section::Track => {
                if name == TAG_TRACK_PT {
                    add_track_point(state, attributes, self.locator, self.path)?;
                }
            }
            Section::Laps => {
                if name == TAG_LAP {
                    if let Some(lap) = parse_lap(attributes) {
                        state.staged.laps.push(lap);
                    }
                }
            }
            Section::Pauses => {
                if name == TAG_PAUSE {
                    if let Some(pause) = parse_pause(attributes) {
                        state.staged.pauses.push(pause);
                    }
                }
            }
            Section::CustomFields => {
                if name == TAG_CUSTOM_DATA_FIELD {
                    add_custom_field(&mut state.staged, attributes, self.field_definitions);
                }
            }
            Section::Summary => match Section::opened_by(name) {
                Some(section) => state.section = section,
                None => parse_summary_start(state, name, attributes),
            },
        }

        Ok(())
    }

    fn characters(&mut self, text: &str) {
        if let Some(state) = self.current.as_mut() {
            if state.text.is_some() {
                state.characters.push_str(text);
            }
        }
    }

    fn end_element(&mut self, name: &str) -> Result<(), ParseError> {
        if name == TAG_ACTIVITY {
            if let Some(state) = self.current.take() {
                self.activities += 1;
                (self.on_activity)(state.staged)?;
            }
            return Ok(());
        }

        let Some(state) = self.current.as_mut() else {
            return Ok(());
        };

        if let Some(field) = state.text {
            if field.tag() == name {
                state.text = None;
                let characters = std::mem::take(&mut state.characters);
                commit_text(&mut state.staged, field, &characters);
            }
        }

        if state.section.closing_tag() == Some(name) {
            state.section = Section::Summary;
        }

        Ok(())
    }
}

fn parse_summary_start(state: &mut ActivityState, name: &str, attributes: &Attributes) {
    let staged = &mut state.staged;

    let text_field = match name {
        TAG_NAME => Some(TextField::Name),
        TAG_NOTES => Some(TextField::Notes),
        TAG_TIME_ZONE_UTC_OFFSET => Some(TextField::TimeZoneUtcOffset),
        TAG_HAS_START_TIME => Some(TextField::HasStartTime),
        TAG_WEATHER => {
            staged.weather_temperature = attributes.parse_f32(ATTRIB_WEATHER_TEMP);
            staged.weather_conditions = attributes.get_content(ATTRIB_WEATHER_CONDITIONS).map(str::to_string);
            Some(TextField::Weather)
        }
        TAG_LOCATION => {
            staged.location = attributes.get_content(ATTRIB_NAME).map(str::to_string);
            None
        }
        TAG_CATEGORY => {
            staged.category = attributes.get_content(ATTRIB_NAME).map(str::to_string);
            None
        }
        TAG_EQUIPMENT_ITEM => {
            staged.equipment.push(EquipmentRef {
                id: attributes.get_content(ATTRIB_ID).map(str::to_string),
                name: attributes.get_content(ATTRIB_NAME).map(str::to_string),
            });
            None
        }
        TAG_CALORIES => {
            // kilocalories → calories
            staged.calories = round_half_up(attributes.parse_f32_or_zero(ATTRIB_TOTAL_CAL) * 1000.0) as i32;
            None
        }
        TAG_DURATION => {
            staged.duration = attributes.parse_int_or_zero(ATTRIB_TOTAL_SECONDS);
            None
        }
        TAG_DISTANCE => {
            staged.distance = attributes.parse_int_or_zero(ATTRIB_TOTAL_METERS);
            None
        }
        TAG_ELEVATION => {
            staged.elevation_up = attributes.parse_int_or_zero(ATTRIB_ASCEND_METERS);
            staged.elevation_down = attributes.parse_int_or_zero(ATTRIB_DESCEND_METERS);
            None
        }
        TAG_HEART_RATE => {
            staged.avg_pulse = attributes.parse_int_or_zero(ATTRIB_AVERAGE_BPM);
            staged.max_pulse = attributes.parse_int_or_zero(ATTRIB_MAXIMUM_BPM);
            None
        }
        TAG_POWER => {
            staged.avg_power = attributes.parse_f32_or_zero(ATTRIB_AVERAGE_WATTS);
            staged.max_power = attributes.parse_f32_or_zero(ATTRIB_MAXIMUM_WATTS);
            None
        }
        TAG_CADENCE => {
            staged.avg_cadence = attributes.parse_int_or_zero(ATTRIB_AVERAGE_RPM);
            None
        }
        _ => None,
    };

    if let Some(field) = text_field {
        state.text = Some(field);
        state.characters.clear();
    }
}

fn commit_text(staged: &mut StagedActivity, field: TextField, characters: &str) {
    match field {
        TextField::Name => {
            staged.name = Some(characters.to_string()).filter(|s| !s.is_empty());
        }
        TextField::Notes => {
            staged.notes = Some(characters.to_string()).filter(|s| !s.is_empty());
        }
        TextField::Weather => {
            let text = characters.trim();
            staged.weather_text = Some(text.to_string()).filter(|s| !s.is_empty());
            staged.weather_wind_speed = parse_wind_speed(text);
        }
        TextField::TimeZoneUtcOffset => apply_utc_offset(staged, characters.trim()),
        TextField::HasStartTime => {
            staged.has_start_time = characters.trim().eq_ignore_ascii_case("true");
            if !staged.has_start_time {
                truncate_start_to_date(staged);
            }
        }
    }
}

/// Re-expresses the start time at the given UTC offset (seconds, applied in
/// whole hours) and recomputes the anchor for all following points.
fn apply_utc_offset(staged: &mut StagedActivity, value: &str) {
    staged.utc_offset_hours = None;
    if value.is_empty() {
        return;
    }

    let Ok(seconds) = value.parse::<i32>() else {
        tracing::warn!("Ignoring unreadable time zone offset '{}'", value);
        return;
    };

    let hours = seconds / 3600;
    let Some(offset) = FixedOffset::east_opt(hours * 3600) else {
        tracing::warn!("Ignoring out of range time zone offset '{}'", value);
        return;
    };

    staged.utc_offset_hours = Some(hours);

    if let Some(start) = staged.start_time {
        let start = start.with_timezone(&offset);
        staged.start_time = Some(start);
        staged.start_anchor_ms = Some(start.timestamp_millis());
    }
}

/// The activity only has a date: the start becomes midnight UTC of that date.
/// The anchor is left alone.
fn truncate_start_to_date(staged: &mut StagedActivity) {
    let Some(start) = staged.start_time else {
        return;
    };

    let Some(midnight) = start.date_naive().and_hms_opt(0, 0, 0) else {
        return;
    };

    staged.start_time = Some(Utc.from_utc_datetime(&midnight).fixed_offset());
}

fn add_track_point(
    state: &mut ActivityState,
    attributes: &Attributes,
    locator: &dyn ZoneLocator,
    path: &str,
) -> Result<(), ParseError> {
    let staged = &mut state.staged;

    if staged.start_anchor_ms.is_none() {
        return Err(ParseError::InvalidStartTime {
            path: path.to_string(),
        });
    }

    if let Some((lat, lon)) = point_coordinates(attributes) {
        if !staged.has_gps {
            // First fix: the zone of the coordinates becomes the start time
            // zone, earlier points keep their time basis.
            if let (Some(start), Some(zone)) = (staged.start_time, locator.zone_at(lat, lon)) {
                let start = start.with_timezone(&zone).fixed_offset();
                staged.start_time = Some(start);
                staged.start_anchor_ms = Some(start.timestamp_millis());
                staged.zone = Some(zone);
            }
        }
        staged.has_gps = true;
    }

    let anchor_ms = staged.start_anchor_ms.unwrap_or_default();
    let point = state.track.next_point(attributes, anchor_ms);
    staged.points.push(point);

    Ok(())
}

/// Stores a custom field value, rounded to the defined decimals when a
/// definition exists. Non-numeric values of defined fields are dropped.
fn add_custom_field(staged: &mut StagedActivity, attributes: &Attributes, definitions: &CustomFieldDefinitions) {
    let (Some(name), Some(value)) = (
        attributes.get_content(ATTRIB_CUSTOM_FIELD_NAME),
        attributes.get_content(ATTRIB_CUSTOM_FIELD_VALUE),
    ) else {
        return;
    };

    match definitions.decimals(name) {
        None => staged.custom_fields.insert(name, value.to_string()),
        Some(decimals) => match format_custom_value(value, decimals) {
            Some(formatted) => staged.custom_fields.insert(name, formatted),
            None => tracing::debug!("Custom field '{}' has a non-numeric value '{}'", name, value),
        },
    }
}

/// The value is rounded to an integer first, then printed with `decimals`.
fn format_custom_value(value: &str, decimals: usize) -> Option<String> {
    let number: f64 = value.trim().parse().ok()?;
    if !number.is_finite() {
        return None;
    }
    Some(format!("{:.*}", decimals, (number + 0.5).floor()))
}

fn round_half_up(value: f32) -> f32 {
    (value + 0.5).floor()
}

/// Wind speed in km/h from weather text like `...; Wind Speed: 1.9 mph; ...`.
fn parse_wind_speed(weather_text: &str) -> Option<i32> {
    let start = weather_text.find(WIND_SPEED_LABEL)? + WIND_SPEED_LABEL.len();
    let rest = &weather_text[start..];
    let end = rest.find(WIND_SPEED_UNIT_MPH)?;

    let mph: f32 = rest[..end].trim().parse().ok()?;
    Some(round_half_up(mph * KM_PER_MILE) as i32)
}
