use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::{OffsetComponents, Tz, TZ_VARIANTS};
use tzf_rs::DefaultFinder;

/// Looks up the time zone of a coordinate.
pub trait ZoneLocator {
    fn zone_at(&self, lat: f64, lon: f64) -> Option<Tz>;
}

/// Zone boundary lookup on the bundled timezone-boundary-builder polygons.
pub struct CoordinateZoneLocator {
    finder: DefaultFinder,
}

impl CoordinateZoneLocator {
    /// Loads the boundary data, which takes a moment. Build it once.
    pub fn new() -> Self {
        Self {
            finder: DefaultFinder::new(),
        }
    }
}

impl Default for CoordinateZoneLocator {
    fn default() -> Self {
        Self::new()
    }
}

impl ZoneLocator for CoordinateZoneLocator {
    fn zone_at(&self, lat: f64, lon: f64) -> Option<Tz> {
        if !lat.is_finite() || !lon.is_finite() {
            return None;
        }

        let name = self.finder.get_tz_name(lon, lat);
        match name.parse::<Tz>() {
            Ok(zone) => Some(zone),
            Err(_) => {
                tracing::debug!("No known time zone at ({}, {}): '{}'", lat, lon, name);
                None
            }
        }
    }
}

/// Nautical time zones: 15° longitude bands mapped to `Etc/GMT±N`. Needs no
/// boundary data.
#[derive(Debug, Clone, Copy, Default)]
pub struct LongitudeZoneLocator;

impl ZoneLocator for LongitudeZoneLocator {
    fn zone_at(&self, _lat: f64, lon: f64) -> Option<Tz> {
        if !lon.is_finite() {
            return None;
        }

        let hours = ((lon / 15.0).round() as i32).clamp(-12, 12);

        // Etc zones use POSIX sign, east of Greenwich is "GMT-"
        let name = match hours {
            0 => "Etc/GMT".to_string(),
            h if h > 0 => format!("Etc/GMT-{h}"),
            h => format!("Etc/GMT+{}", -h),
        };

        name.parse::<Tz>().ok()
    }
}

/// First region zone (`Area/City`, no `Etc/` zones) in database order whose
/// standard offset at `at` equals `offset_seconds`.
pub fn zone_id_for_offset(offset_seconds: i32, at: DateTime<Utc>) -> Option<&'static str> {
    let at = at.naive_utc();

    TZ_VARIANTS
        .iter()
        .filter(|tz| tz.name().contains('/') && !tz.name().starts_with("Etc/"))
        .find(|tz| {
            let offset = tz.offset_from_utc_datetime(&at);
            offset.base_utc_offset().num_seconds() == i64::from(offset_seconds)
        })
        .map(|tz| tz.name())
}
