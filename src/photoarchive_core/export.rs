use crate::photoarchive_core::error::{ArchiveError, ExportWarnings, Result};
use crate::photoarchive_core::manifest::{CategoryRecord, MANIFEST_PATH, Manifest, PhotoRecord};
use crate::photoarchive_core::operation::CancelToken;
use crate::photoarchive_core::photo::{Category, Photo};
use crate::photoarchive_core::progress::{Phase, ProgressReporter, ProgressSink};
use crate::photoarchive_core::store::PhotoStore;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Summary of a finished export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportReport {
    pub archive_path: PathBuf,
    pub category_count: usize,
    pub photo_count: usize,
    /// Photo bytes written, excluding the manifest.
    pub total_bytes: u64,
    pub warnings: ExportWarnings,
}

/// A photo that passed the pre-pass, with the bytes' location and size.
struct PlannedPhoto {
    source: PathBuf,
    record: PhotoRecord,
}

/// Builds an archive from a snapshot of categories and photos.
pub struct ArchiveWriter<'a> {
    categories: &'a [Category],
    photos: &'a [Photo],
}

impl<'a> ArchiveWriter<'a> {
    pub fn new(categories: &'a [Category], photos: &'a [Photo]) -> Self {
        ArchiveWriter { categories, photos }
    }

    /// Write the archive to `destination`. `resolve` maps a photo to its bytes on disk.
    /// Photos whose bytes cannot be read are left out of the manifest and reported as warnings.
    pub fn build<F, S>(
        &self,
        destination: &Path,
        resolve: F,
        reporter: &ProgressReporter<S>,
        cancel: &CancelToken,
    ) -> Result<ExportReport>
    where
        F: Fn(&Photo) -> PathBuf,
        S: ProgressSink,
    {
        reporter.begin(Phase::Exporting);
        cancel.check()?;

        let (planned, mut warnings) = self.plan(&resolve);
        let total_bytes: u64 = planned.iter().map(|p| p.record.file_size).sum();

        let mut categories: Vec<CategoryRecord> = self
            .categories
            .iter()
            .map(CategoryRecord::from_category)
            .collect();
        categories.sort_by_key(|c| (c.position, c.id));
        let manifest = Manifest::new(
            categories,
            planned.iter().map(|p| p.record.clone()).collect(),
        );

        let parent = match destination.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)?;
        let temp = tempfile::Builder::new()
            .prefix(".export-")
            .suffix(".tmp")
            .tempfile_in(&parent)?;

        log::info!(
            "Exporting {} categories and {} photos to {}",
            manifest.categories.len(),
            manifest.photos.len(),
            destination.display()
        );

        let mut zip = ZipWriter::new(temp);
        let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        zip.start_file(MANIFEST_PATH, deflated)?;
        zip.write_all(&manifest.to_json()?)?;

        let mut written = 0u64;
        let mut photo_count = 0;
        for (i, photo) in planned.iter().enumerate() {
            cancel.check()?;

            // The manifest is sealed, so a failure here leaves the record without bytes.
            match copy_entry(&mut zip, photo) {
                Ok(n) => {
                    written += n;
                    photo_count += 1;
                }
                Err(e) => {
                    log::debug!("Failed to copy photo {}: {}", photo.record.id, e);
                    warnings.add(photo.record.id, photo.source.clone(), &e);
                }
            }

            if total_bytes > 0 {
                reporter.report(Phase::Exporting, written as f64 / total_bytes as f64);
            } else {
                reporter.report_count(Phase::Exporting, (i + 1) as u64, planned.len() as u64);
            }
        }

        let temp = zip.finish()?;
        temp.persist(destination)
            .map_err(|e| ArchiveError::Io(e.error))?;
        reporter.report(Phase::Exporting, 1.0);

        if !warnings.is_empty() {
            log::warn!(
                "{} photos could not be read and were left out:\n{}",
                warnings.len(),
                warnings
            );
        }
        log::info!(
            "Wrote {} ({} photos, {} bytes)",
            destination.display(),
            photo_count,
            written
        );

        Ok(ExportReport {
            archive_path: destination.to_path_buf(),
            category_count: manifest.categories.len(),
            photo_count,
            total_bytes: written,
            warnings,
        })
    }

    /// Stat every photo's bytes. Unreadable ones become warnings.
    fn plan<F: Fn(&Photo) -> PathBuf>(&self, resolve: &F) -> (Vec<PlannedPhoto>, ExportWarnings) {
        let mut planned = Vec::with_capacity(self.photos.len());
        let mut warnings = ExportWarnings::new();

        for photo in self.photos {
            let source = resolve(photo);
            let readable = fs::metadata(&source).and_then(|m| {
                if m.is_file() {
                    Ok(m)
                } else {
                    Err(io::Error::other("not a regular file"))
                }
            });
            match readable {
                Ok(metadata) => {
                    let record = PhotoRecord::from_photo(photo, planned.len(), metadata.len());
                    planned.push(PlannedPhoto { source, record });
                }
                Err(e) => {
                    log::debug!("Skipping photo {}: {}", photo.id, e);
                    warnings.add(photo.id, source, &e);
                }
            }
        }

        (planned, warnings)
    }
}

/// Add one photo as a stored entry. A partially written entry is removed again.
fn copy_entry<W: Write + io::Seek>(zip: &mut ZipWriter<W>, photo: &PlannedPhoto) -> io::Result<u64> {
    let mut input = File::open(&photo.source)?;
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Stored)
        .large_file(photo.record.file_size >= u64::from(u32::MAX));
    zip.start_file(photo.record.file_name.as_str(), options)
        .map_err(io::Error::other)?;
    match io::copy(&mut input, zip) {
        Ok(n) => Ok(n),
        Err(e) => {
            zip.abort_file().map_err(io::Error::other)?;
            Err(e)
        }
    }
}

/// Export everything in `store` to a single archive at `destination`.
pub fn export_store<St: PhotoStore, S: ProgressSink>(
    store: &St,
    destination: &Path,
    reporter: &ProgressReporter<S>,
    cancel: &CancelToken,
) -> Result<ExportReport> {
    let categories = store.categories()?;
    let photos = store.photos()?;
    ArchiveWriter::new(&categories, &photos).build(
        destination,
        |photo| store.photo_path(photo),
        reporter,
        cancel,
    )
}
