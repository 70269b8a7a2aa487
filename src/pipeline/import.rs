//! Per-file and batch import: pre-pass, activity pass, assembly.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::ImportConfig;
use crate::error::{ImportError, ParseError};
use crate::pipeline::assemble::{Assembled, TourAssembler};
use crate::pipeline::catalog::{Catalog, ImportedTours};
use crate::pipeline::parse::fitlog::parse_activities;
use crate::pipeline::parse::prepass::parse_auxiliary;
use crate::pipeline::parse::FileFormat;
use crate::pipeline::timezone::ZoneLocator;
use crate::types::equipment::AuxiliaryData;
use crate::types::tour::FinishedTour;

/// Result of importing one file.
#[derive(Debug, Default)]
pub struct FileImport {
    pub activities: usize,
    pub tours: Vec<FinishedTour>,
    pub duplicates: Vec<i64>,
    pub created_tags: usize,
    pub created_tour_types: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileOutcome {
    pub file: String,
    pub imported: Vec<i64>,
    pub duplicates: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub batch_id: Uuid,
    pub files: Vec<FileOutcome>,
    pub new_tours: usize,
    pub duplicate_tours: usize,
    pub failed_files: usize,
    pub created_tags: usize,
    pub created_tour_types: usize,
}

impl BatchReport {
    fn new() -> Self {
        Self {
            batch_id: Uuid::new_v4(),
            files: Vec::new(),
            new_tours: 0,
            duplicate_tours: 0,
            failed_files: 0,
            created_tags: 0,
            created_tour_types: 0,
        }
    }
}

/// Already imported tours plus the ones produced earlier in the same run.
struct SeenTours<'a> {
    imported: &'a dyn ImportedTours,
    produced: &'a HashSet<i64>,
}

impl ImportedTours for SeenTours<'_> {
    fn contains_tour(&self, tour_id: i64) -> bool {
        self.produced.contains(&tour_id) || self.imported.contains_tour(tour_id)
    }
}

#[derive(Clone, Copy)]
pub struct Importer<'a> {
    config: &'a ImportConfig,
    locator: &'a dyn ZoneLocator,
}

impl<'a> Importer<'a> {
    pub fn new(config: &'a ImportConfig, locator: &'a dyn ZoneLocator) -> Self {
        Self { config, locator }
    }

    pub fn import_file(
        &self,
        path: &Path,
        imported: &dyn ImportedTours,
        catalog: &mut dyn Catalog,
    ) -> Result<FileImport, ImportError> {
        let display = path.display().to_string();
        let bytes = std::fs::read(path).map_err(|source| ImportError::Io {
            path: display.clone(),
            source,
        })?;

        self.import_bytes(&display, &bytes, imported, catalog)
    }

    /// Imports the activities of one file. `name` selects the file variant
    /// and becomes the tours' import path.
    pub fn import_bytes(
        &self,
        name: &str,
        bytes: &[u8],
        imported: &dyn ImportedTours,
        catalog: &mut dyn Catalog,
    ) -> Result<FileImport, ImportError> {
        let format = FileFormat::from_filename(name)
            .ok_or_else(|| ImportError::UnsupportedFormat(name.to_string()))?;

        let auxiliary = if format.has_auxiliary_data() {
            match parse_auxiliary(bytes) {
                Ok(auxiliary) => auxiliary,
                Err(e) => {
                    tracing::warn!("Pre-pass of '{}' failed, importing without equipment and field formats: {}", name, e);
                    AuxiliaryData::default()
                }
            }
        } else {
            AuxiliaryData::default()
        };

        let assembler = TourAssembler::new(self.config, &auxiliary, name);
        let mut result = FileImport::default();
        let mut produced = HashSet::new();

        let activities = parse_activities(
            bytes,
            name,
            &auxiliary.field_definitions,
            self.locator,
            |activity| {
                let seen = SeenTours { imported, produced: &produced };
                match assembler.assemble(activity, &seen, catalog)? {
                    Assembled::New {
                        tour,
                        created_tags,
                        created_tour_types,
                    } => {
                        produced.insert(tour.tour_id);
                        result.created_tags += created_tags;
                        result.created_tour_types += created_tour_types;
                        result.tours.push(*tour);
                    }
                    Assembled::Duplicate { tour_id } => result.duplicates.push(tour_id),
                }
                Ok::<(), ParseError>(())
            },
        )?;
        result.activities = activities;

        tracing::info!(
            "Imported '{}': {} activities, {} new tours, {} duplicates",
            name,
            result.activities,
            result.tours.len(),
            result.duplicates.len()
        );

        Ok(result)
    }
}

/// Imports several files against one catalog. Tours of earlier files count
/// as imported for later ones. A failed file does not stop the batch.
pub struct BatchImport<'a> {
    importer: Importer<'a>,
    imported: &'a dyn ImportedTours,
    produced: HashSet<i64>,
    tours: Vec<FinishedTour>,
    report: BatchReport,
}

impl<'a> BatchImport<'a> {
    pub fn new(importer: Importer<'a>, imported: &'a dyn ImportedTours) -> Self {
        Self {
            importer,
            imported,
            produced: HashSet::new(),
            tours: Vec::new(),
            report: BatchReport::new(),
        }
    }

    pub fn add_bytes(&mut self, name: &str, bytes: &[u8], catalog: &mut dyn Catalog) {
        let seen = SeenTours {
            imported: self.imported,
            produced: &self.produced,
        };
        let result = self.importer.import_bytes(name, bytes, &seen, catalog);
        self.record(name, result);
    }

    pub fn add_file(&mut self, path: &Path, catalog: &mut dyn Catalog) {
        let seen = SeenTours {
            imported: self.imported,
            produced: &self.produced,
        };
        let result = self.importer.import_file(path, &seen, catalog);
        self.record(&path.display().to_string(), result);
    }

    fn record(&mut self, name: &str, result: Result<FileImport, ImportError>) {
        let outcome = match result {
            Ok(file) => {
                self.report.new_tours += file.tours.len();
                self.report.duplicate_tours += file.duplicates.len();
                self.report.created_tags += file.created_tags;
                self.report.created_tour_types += file.created_tour_types;

                let imported: Vec<i64> = file.tours.iter().map(|tour| tour.tour_id).collect();
                self.produced.extend(&imported);
                self.tours.extend(file.tours);

                FileOutcome {
                    file: name.to_string(),
                    imported,
                    duplicates: file.duplicates.len(),
                    error: None,
                }
            }
            Err(e) => {
                tracing::warn!("Failed to import '{}': {}", name, e);
                self.report.failed_files += 1;
                FileOutcome {
                    file: name.to_string(),
                    imported: Vec::new(),
                    duplicates: 0,
                    error: Some(e.to_string()),
                }
            }
        };

        self.report.files.push(outcome);
    }

    pub fn finish(self) -> (BatchReport, Vec<FinishedTour>) {
        tracing::info!(
            "Batch {}: {} files, {} new tours, {} duplicates, {} failed",
            self.report.batch_id,
            self.report.files.len(),
            self.report.new_tours,
            self.report.duplicate_tours,
            self.report.failed_files
        );
        (self.report, self.tours)
    }
}
