use crate::photoarchive_core::config::{ImportOptions, Strategy};
use crate::photoarchive_core::error::{ArchiveError, Result};
use crate::photoarchive_core::extract::ExtractedSet;
use crate::photoarchive_core::manifest::{CategoryRecord, Manifest, PhotoRecord};
use crate::photoarchive_core::operation::CancelToken;
use crate::photoarchive_core::photo::{Category, NewCategory, NewPhoto, Photo, new_local_id};
use crate::photoarchive_core::progress::{Phase, ProgressReporter, ProgressSink};
use crate::photoarchive_core::store::{PhotoStore, next_position};
use crate::photoarchive_core::workers::hash_file;
use std::collections::{HashMap, HashSet};
use std::fs;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Same name (or content) already present in the destination category.
    Duplicate,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::Duplicate => write!(f, "duplicate"),
        }
    }
}

/// Per-record result of an import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportOutcome {
    Imported { photo_id: i64 },
    Skipped(SkipReason),
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Category,
    Photo,
    /// A destination photo that Replace could not remove.
    DestinationPhoto,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFailure {
    pub kind: RecordKind,
    /// Id of the record in the archive (or destination, for cleanup failures).
    pub record_id: i64,
    pub name: String,
    pub reason: String,
}

/// Aggregate result of a completed import, possibly with failed records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub strategy: Strategy,
    pub categories_imported: usize,
    pub categories_matched: usize,
    pub categories_removed: usize,
    pub photos_imported: usize,
    pub photos_skipped: usize,
    pub photos_failed: usize,
    /// Destination photos still present after a Replace.
    pub photos_not_removed: usize,
    pub failures: Vec<RecordFailure>,
    /// Archive photo id and what happened to it, in manifest order.
    pub outcomes: Vec<(i64, ImportOutcome)>,
    /// Stopped early; records after the last outcome were not processed.
    pub cancelled: bool,
}

impl ImportSummary {
    pub fn new(strategy: Strategy) -> Self {
        ImportSummary {
            strategy,
            ..Default::default()
        }
    }

    fn record_photo(&mut self, record: &PhotoRecord, outcome: ImportOutcome) {
        match &outcome {
            ImportOutcome::Imported { .. } => self.photos_imported += 1,
            ImportOutcome::Skipped(reason) => {
                log::debug!("Skipped photo {} ({})", record.id, reason);
                self.photos_skipped += 1;
            }
            ImportOutcome::Failed(reason) => {
                log::warn!("Failed to import photo {}: {}", record.id, reason);
                self.photos_failed += 1;
                self.failures.push(RecordFailure {
                    kind: RecordKind::Photo,
                    record_id: record.id,
                    name: record.display_name().to_string(),
                    reason: reason.clone(),
                });
            }
        }
        self.outcomes.push((record.id, outcome));
    }

    fn record_category_failure(&mut self, record_id: i64, name: &str, err: &ArchiveError) {
        log::warn!("Failed to reconcile category '{}': {}", name, err);
        self.failures.push(RecordFailure {
            kind: RecordKind::Category,
            record_id,
            name: name.to_string(),
            reason: err.to_string(),
        });
    }

    fn record_removal_failure(&mut self, photo: &Photo, err: &ArchiveError) {
        log::warn!("Failed to remove destination photo {}: {}", photo.id, err);
        self.photos_not_removed += 1;
        self.failures.push(RecordFailure {
            kind: RecordKind::DestinationPhoto,
            record_id: photo.id,
            name: photo.original_name.clone(),
            reason: err.to_string(),
        });
    }

    pub fn photos_processed(&self) -> usize {
        self.photos_imported + self.photos_skipped + self.photos_failed
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// `Err(PartialImportFailure)` when any photo failed or outlived a Replace.
    pub fn into_result(self) -> Result<Self> {
        let failed = self.photos_failed + self.photos_not_removed;
        if failed > 0 {
            return Err(ArchiveError::PartialImportFailure {
                failed,
                total: self.photos_processed() + self.photos_not_removed,
            });
        }
        Ok(self)
    }
}

impl std::fmt::Display for ImportSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} photos imported, {} skipped, {} failed; {} categories created, {} matched",
            self.photos_imported,
            self.photos_skipped,
            self.photos_failed,
            self.categories_imported,
            self.categories_matched
        )?;
        if self.categories_removed > 0 {
            write!(f, ", {} removed", self.categories_removed)?;
        }
        if self.photos_not_removed > 0 {
            write!(f, "; {} old photos not removed", self.photos_not_removed)?;
        }
        if self.cancelled {
            write!(f, " (cancelled)")?;
        }
        Ok(())
    }
}

/// Lifecycle of an import run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportState {
    Idle,
    Validating,
    Extracting,
    ReconcilingCategories,
    ReconcilingPhotos,
    Completed,
    Aborted,
}

impl ImportState {
    /// Aborting is only possible before the destination has been touched.
    pub fn can_advance_to(self, next: ImportState) -> bool {
        use ImportState::*;
        matches!(
            (self, next),
            (Idle, Validating)
                | (Validating, Extracting)
                | (Validating, Aborted)
                | (Extracting, ReconcilingCategories)
                | (Extracting, Aborted)
                | (ReconcilingCategories, ReconcilingPhotos)
                | (ReconcilingPhotos, Completed)
        )
    }

    pub fn advance(&mut self, next: ImportState) -> Result<()> {
        if !self.can_advance_to(next) {
            return Err(ArchiveError::Other(format!(
                "illegal import transition {:?} -> {:?}",
                self, next
            )));
        }
        log::debug!("Import state {:?} -> {:?}", self, next);
        *self = next;
        Ok(())
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ImportState::Completed | ImportState::Aborted)
    }
}

/// Archive category id to destination category id.
#[derive(Debug, Clone, Default)]
pub struct CategoryMapping {
    ids: HashMap<i64, i64>,
    failed: HashSet<i64>,
}

impl CategoryMapping {
    pub fn get(&self, archive_id: i64) -> Option<i64> {
        self.ids.get(&archive_id).copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    fn insert(&mut self, archive_id: i64, destination_id: i64) {
        self.ids.insert(archive_id, destination_id);
    }
}

/// Destination rows read before reconciliation mutates anything.
#[derive(Debug, Clone, Default)]
pub struct Destination {
    pub categories: Vec<Category>,
    /// Only read under Replace.
    pub photos: Vec<Photo>,
}

/// Reconciliation engine, the sole writer to `store` for the duration of an import.
pub struct Reconciler<'a, S: PhotoStore> {
    store: &'a mut S,
    strategy: Strategy,
    match_content_hash: bool,
    uncategorized: Option<std::result::Result<i64, String>>,
}

impl<'a, S: PhotoStore> Reconciler<'a, S> {
    pub fn new(store: &'a mut S, options: &ImportOptions) -> Self {
        Reconciler {
            store,
            strategy: options.strategy,
            match_content_hash: options.match_content_hash,
            uncategorized: None,
        }
    }

    /// Categories then photos, returning the accumulated summary.
    ///
    /// Fails without touching the store if the destination cannot be read.
    pub fn run<P: ProgressSink>(
        mut self,
        extracted: &ExtractedSet,
        reporter: &ProgressReporter<P>,
        cancel: &CancelToken,
    ) -> Result<ImportSummary> {
        let destination = self.read_destination()?;
        let mut summary = ImportSummary::new(self.strategy);
        reporter.begin(Phase::Reconciling);
        let mapping = self.reconcile_categories(extracted.manifest(), destination, &mut summary);
        self.reconcile_photos(extracted, &mapping, &mut summary, reporter, cancel);
        Ok(summary)
    }

    pub fn read_destination(&self) -> Result<Destination> {
        let categories = self.store.categories()?;
        let photos = match self.strategy {
            Strategy::Merge => Vec::new(),
            Strategy::Replace => self.store.photos()?,
        };
        Ok(Destination { categories, photos })
    }

    /// Build the complete category mapping, mutating destination categories as the strategy requires.
    pub fn reconcile_categories(
        &mut self,
        manifest: &Manifest,
        destination: Destination,
        summary: &mut ImportSummary,
    ) -> CategoryMapping {
        log::info!(
            "Reconciling {} categories ({})",
            manifest.categories.len(),
            self.strategy
        );

        let mut records: Vec<&CategoryRecord> = manifest.categories.iter().collect();
        records.sort_by_key(|c| (c.position, c.id));

        let mapping = match self.strategy {
            Strategy::Merge => self.merge_categories(&records, &destination.categories, summary),
            Strategy::Replace => self.replace_categories(&records, destination, summary),
        };

        log::info!(
            "Category mapping complete: {} created, {} matched, {} removed",
            summary.categories_imported,
            summary.categories_matched,
            summary.categories_removed
        );
        mapping
    }

    fn merge_categories(
        &mut self,
        records: &[&CategoryRecord],
        existing: &[Category],
        summary: &mut ImportSummary,
    ) -> CategoryMapping {
        let mut mapping = CategoryMapping::default();
        let mut position = next_position(existing);

        for record in records {
            let result = match self.store.find_category_by_display_name(&record.display_name) {
                Ok(Some(existing)) => {
                    log::debug!(
                        "Category '{}' matches destination {}",
                        record.display_name,
                        existing.id
                    );
                    summary.categories_matched += 1;
                    Ok(existing.id)
                }
                Ok(None) => {
                    let created = self.store.create_category(&NewCategory {
                        name: record.name.clone(),
                        display_name: record.display_name.clone(),
                        color_hex: record.color_hex.clone(),
                        is_default: false,
                        position,
                    });
                    created.map(|category| {
                        position += 1;
                        summary.categories_imported += 1;
                        category.id
                    })
                }
                Err(e) => Err(e),
            };

            match result {
                Ok(id) => mapping.insert(record.id, id),
                Err(e) => {
                    summary.record_category_failure(record.id, &record.display_name, &e);
                    mapping.failed.insert(record.id);
                }
            }
        }
        mapping
    }

    /// Delete every destination photo, then make destination categories match the archive.
    /// Destination files are removed immediately along with their rows.
    fn replace_categories(
        &mut self,
        records: &[&CategoryRecord],
        destination: Destination,
        summary: &mut ImportSummary,
    ) -> CategoryMapping {
        log::info!("Removing {} destination photos", destination.photos.len());
        for photo in &destination.photos {
            if let Err(e) = self.store.delete_photo(photo.id) {
                summary.record_removal_failure(photo, &e);
            }
        }

        let mut by_name: HashMap<String, Category> = destination
            .categories
            .into_iter()
            .map(|c| (c.display_name.to_lowercase(), c))
            .collect();

        let mut mapping = CategoryMapping::default();
        for record in records {
            let result = match by_name.remove(&record.display_name.to_lowercase()) {
                Some(existing) => {
                    let updated = Category {
                        id: existing.id,
                        name: record.name.clone(),
                        display_name: record.display_name.clone(),
                        color_hex: record.color_hex.clone(),
                        is_default: record.is_default,
                        position: record.position,
                    };
                    self.store.update_category(&updated).map(|_| {
                        summary.categories_matched += 1;
                        existing.id
                    })
                }
                None => self
                    .store
                    .create_category(&NewCategory {
                        name: record.name.clone(),
                        display_name: record.display_name.clone(),
                        color_hex: record.color_hex.clone(),
                        is_default: record.is_default,
                        position: record.position,
                    })
                    .map(|category| {
                        summary.categories_imported += 1;
                        category.id
                    }),
            };

            match result {
                Ok(id) => mapping.insert(record.id, id),
                Err(e) => {
                    summary.record_category_failure(record.id, &record.display_name, &e);
                    mapping.failed.insert(record.id);
                }
            }
        }

        // Whatever is left has no counterpart in the archive. The default category
        // stays, but gives up the flag when the archive brings its own default.
        let archive_has_default = records.iter().any(|r| r.is_default);
        for leftover in by_name.into_values() {
            if !leftover.is_default {
                match self.store.delete_category(leftover.id) {
                    Ok(()) => summary.categories_removed += 1,
                    Err(e) => {
                        summary.record_category_failure(leftover.id, &leftover.display_name, &e)
                    }
                }
            } else if archive_has_default {
                let demoted = Category {
                    is_default: false,
                    ..leftover
                };
                if let Err(e) = self.store.update_category(&demoted) {
                    summary.record_category_failure(demoted.id, &demoted.display_name, &e);
                }
            }
        }

        mapping
    }

    /// Apply every photo record in manifest order, stopping early on cancellation.
    pub fn reconcile_photos<P: ProgressSink>(
        &mut self,
        extracted: &ExtractedSet,
        mapping: &CategoryMapping,
        summary: &mut ImportSummary,
        reporter: &ProgressReporter<P>,
        cancel: &CancelToken,
    ) {
        let photos = &extracted.manifest().photos;
        let total = photos.len() as u64;
        log::info!("Reconciling {} photos", total);

        for (i, record) in photos.iter().enumerate() {
            if cancel.is_cancelled() {
                log::info!(
                    "Import cancelled after {} of {} photos",
                    summary.photos_processed(),
                    total
                );
                summary.cancelled = true;
                break;
            }

            let outcome = self.apply_photo(extracted, mapping, record);
            summary.record_photo(record, outcome);
            reporter.report_count(Phase::Reconciling, (i + 1) as u64, total);
        }

        if total == 0 {
            reporter.report(Phase::Reconciling, 1.0);
        }
    }

    fn apply_photo(
        &mut self,
        extracted: &ExtractedSet,
        mapping: &CategoryMapping,
        record: &PhotoRecord,
    ) -> ImportOutcome {
        let category_id = match self.destination_category(mapping, record) {
            Ok(id) => id,
            Err(reason) => return ImportOutcome::Failed(reason),
        };
        let name = record.display_name().to_string();

        if self.strategy == Strategy::Merge {
            match self.store.find_photo(category_id, &name) {
                Ok(Some(_)) => return ImportOutcome::Skipped(SkipReason::Duplicate),
                Ok(None) => {}
                Err(e) => return ImportOutcome::Failed(e.to_string()),
            }
        }

        let Some(source) = extracted.photo_file(record) else {
            return ImportOutcome::Failed(format!("{} is missing from the archive", record.file_name));
        };

        let hash = match hash_file(&source) {
            Ok(hash) => hash,
            Err(e) => return ImportOutcome::Failed(format!("failed to read {}: {}", record.file_name, e)),
        };

        if self.strategy == Strategy::Merge && self.match_content_hash {
            match self.store.find_photo_by_hash(category_id, &hash) {
                Ok(Some(_)) => return ImportOutcome::Skipped(SkipReason::Duplicate),
                Ok(None) => {}
                Err(e) => return ImportOutcome::Failed(e.to_string()),
            }
        }

        let local_id = new_local_id(&name);
        let stored = match self.store.store_photo_file(&source, &local_id) {
            Ok(path) => path,
            Err(e) => return ImportOutcome::Failed(format!("failed to copy photo: {}", e)),
        };
        let file_size = fs::metadata(&stored)
            .map(|m| m.len())
            .unwrap_or(record.file_size);

        let inserted = self.store.insert_photo(&NewPhoto {
            category_id,
            local_id: local_id.clone(),
            original_name: name,
            timestamp: record.timestamp,
            is_favorite: record.is_favorite,
            file_size,
            hash: Some(hash),
        });

        match inserted {
            Ok(photo) => ImportOutcome::Imported { photo_id: photo.id },
            Err(e) => {
                if let Err(cleanup) = self.store.discard_photo_file(&local_id) {
                    log::warn!("Failed to remove orphaned file {}: {}", local_id, cleanup);
                }
                ImportOutcome::Failed(format!("failed to record photo: {}", e))
            }
        }
    }

    /// Destination category for a record; photos without one go to the fallback category.
    fn destination_category(
        &mut self,
        mapping: &CategoryMapping,
        record: &PhotoRecord,
    ) -> std::result::Result<i64, String> {
        match record.category_id {
            Some(archive_id) if mapping.failed.contains(&archive_id) => Err(format!(
                "category {} could not be reconciled",
                archive_id
            )),
            Some(archive_id) => match mapping.get(archive_id) {
                Some(id) => Ok(id),
                None => self.uncategorized_id(),
            },
            None => self.uncategorized_id(),
        }
    }

    fn uncategorized_id(&mut self) -> std::result::Result<i64, String> {
        if let Some(cached) = &self.uncategorized {
            return cached.clone();
        }
        let resolved = self
            .store
            .ensure_uncategorized()
            .map(|c| c.id)
            .map_err(|e| format!("no fallback category: {}", e));
        self.uncategorized = Some(resolved.clone());
        resolved
    }
}
