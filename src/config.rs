pub const DEVICE_ID_FITLOG: &str = "fitlog";
pub const DEVICE_ID_MANUAL: &str = "manual";
/// Device-specific tour id suffix for SportTracks FitLog imports.
pub const UNIQUE_ID_SUFFIX_FITLOG: &str = "24168";

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub max_file_size: usize,
    /// Resolve GPS time zones by longitude band instead of zone boundaries.
    pub longitude_zones: bool,
    pub import: ImportConfig,
}

impl Config {
    pub fn from_env() -> Self {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3000);

        let max_file_size_mb = std::env::var("MAX_FILE_SIZE_MB")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(25);

        let longitude_zones = std::env::var("FITLOG_LONGITUDE_ZONES")
            .map(|s| matches!(s.trim(), "1" | "true"))
            .unwrap_or(false);

        let mut import = ImportConfig::default();
        if let Some(device_name) = std::env::var("FITLOG_DEVICE_NAME")
            .ok()
            .filter(|s| !s.trim().is_empty())
        {
            import.device_name = device_name;
        }

        Self {
            port,
            max_file_size: max_file_size_mb * 1024 * 1024,
            longitude_zones,
            import,
        }
    }
}

/// Settings the importer stamps onto every tour.
#[derive(Debug, Clone)]
pub struct ImportConfig {
    pub device_id: String,
    pub device_name: String,
    pub manual_device_id: String,
    pub unique_id_suffix: String,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            device_id: DEVICE_ID_FITLOG.to_string(),
            device_name: "SportTracks FitLog".to_string(),
            manual_device_id: DEVICE_ID_MANUAL.to_string(),
            unique_id_suffix: UNIQUE_ID_SUFFIX_FITLOG.to_string(),
        }
    }
}
