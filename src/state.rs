use crate::config::Config;
use crate::pipeline::catalog::InMemoryCatalog;
use crate::pipeline::import::{BatchImport, BatchReport, Importer};
use crate::pipeline::timezone::{CoordinateZoneLocator, LongitudeZoneLocator, ZoneLocator};
use crate::types::tour::FinishedTour;
use dashmap::DashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    tours: Arc<DashMap<i64, FinishedTour>>,
    catalog: Arc<Mutex<InMemoryCatalog>>,
    locator: Arc<dyn ZoneLocator + Send + Sync>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let locator: Arc<dyn ZoneLocator + Send + Sync> = if config.longitude_zones {
            Arc::new(LongitudeZoneLocator)
        } else {
            Arc::new(CoordinateZoneLocator::new())
        };
        Self::with_locator(config, locator)
    }

    pub fn with_locator(config: Config, locator: Arc<dyn ZoneLocator + Send + Sync>) -> Self {
        Self {
            config: Arc::new(config),
            tours: Arc::new(DashMap::new()),
            catalog: Arc::new(Mutex::new(InMemoryCatalog::new())),
            locator,
        }
    }

    /// A batch that panicked leaves only whole tags and tour types behind, so
    /// a poisoned lock is taken over.
    fn lock_catalog(&self) -> MutexGuard<'_, InMemoryCatalog> {
        self.catalog.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Catalog lock was poisoned by an aborted import, continuing");
            PoisonError::into_inner(poisoned)
        })
    }

    /// Imports `(file name, contents)` pairs as one batch. The catalog stays
    /// locked until the whole batch is done.
    pub fn import_files(&self, files: &[(String, Vec<u8>)]) -> BatchReport {
        let mut catalog = self.lock_catalog();

        let importer = Importer::new(&self.config.import, self.locator.as_ref());
        let mut batch = BatchImport::new(importer, self.tours.as_ref());
        for (name, bytes) in files {
            batch.add_bytes(name, bytes, &mut *catalog);
        }
        let (report, tours) = batch.finish();

        for tour in tours {
            self.tours.insert(tour.tour_id, tour);
        }

        report
    }

    pub fn get(&self, tour_id: i64) -> Option<FinishedTour> {
        self.tours.get(&tour_id).map(|entry| entry.value().clone())
    }

    pub fn tour_count(&self) -> usize {
        self.tours.len()
    }

    /// All stored tours, oldest start first.
    pub fn tours(&self) -> Vec<FinishedTour> {
        let mut tours: Vec<FinishedTour> = self.tours.iter().map(|entry| entry.value().clone()).collect();
        tours.sort_by_key(|tour| (tour.start_time, tour.tour_id));
        tours
    }

    pub fn catalog(&self) -> InMemoryCatalog {
        self.lock_catalog().clone()
    }
}
