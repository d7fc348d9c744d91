use crate::photoarchive_core::config::ValidationLimits;
use crate::photoarchive_core::error::{ArchiveError, Result, SecurityViolation};
use crate::photoarchive_core::manifest::{MANIFEST_PATH, Manifest, PhotoRecord};
use crate::photoarchive_core::operation::CancelToken;
use crate::photoarchive_core::progress::{Phase, ProgressReporter, ProgressSink};
use crate::photoarchive_core::validate::{
    ValidationResult, is_symlink_mode, normalize_entry_path, open_archive, resolve_under,
};
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Extracted archive content, not yet part of any library.
#[derive(Debug)]
pub struct ExtractedSet {
    scratch: TempDir,
    manifest: Manifest,
    files: HashSet<PathBuf>,
}

impl ExtractedSet {
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn scratch_path(&self) -> &Path {
        self.scratch.path()
    }

    /// Number of extracted file entries, manifest included.
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Scratch location of a photo's bytes, if the archive contained them.
    pub fn photo_file(&self, record: &PhotoRecord) -> Option<PathBuf> {
        let relative = normalize_entry_path(&record.archive_path())?;
        if self.files.contains(&relative) {
            Some(self.scratch.path().join(relative))
        } else {
            None
        }
    }

    /// Remove the scratch directory now, reporting any error.
    pub fn close(self) -> Result<()> {
        self.scratch.close()?;
        Ok(())
    }

    /// Scratch set written directly, bypassing the archive.
    #[cfg(test)]
    pub(crate) fn from_files(manifest: Manifest, files: &[(&str, &[u8])]) -> Self {
        let scratch = tempfile::tempdir().unwrap();
        let mut written = HashSet::new();
        for (name, bytes) in files {
            let relative = normalize_entry_path(name).unwrap();
            let path = scratch.path().join(&relative);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, bytes).unwrap();
            written.insert(relative);
        }
        ExtractedSet {
            scratch,
            manifest,
            files: written,
        }
    }
}

/// Extract the archive at `path` into a fresh directory under `scratch_parent`.
pub fn extract<S: ProgressSink>(
    path: &Path,
    validation: &ValidationResult,
    scratch_parent: &Path,
    limits: &ValidationLimits,
    reporter: &ProgressReporter<S>,
    cancel: &CancelToken,
) -> Result<ExtractedSet> {
    reporter.begin(Phase::Extracting);
    let mut archive = open_archive(path)?;
    if archive.len() > limits.max_entries {
        return Err(SecurityViolation::EntryCountExceeded {
            count: archive.len(),
            limit: limits.max_entries,
        }
        .into());
    }

    fs::create_dir_all(scratch_parent)?;
    let scratch = tempfile::Builder::new()
        .prefix("import-")
        .tempdir_in(scratch_parent)?;
    let root = scratch.path().to_path_buf();

    log::info!(
        "Extracting {} into {}",
        path.display(),
        root.display()
    );

    let mut files = HashSet::new();
    let mut photos_done = 0u64;
    let mut total_written = 0u64;

    for i in 0..archive.len() {
        cancel.check()?;

        let mut entry = archive.by_index(i)?;
        let name = entry.name().to_string();
        if is_symlink_mode(entry.unix_mode()) {
            return Err(SecurityViolation::PathTraversal { entry: name }.into());
        }
        let destination = resolve_under(&root, &name)?;

        if entry.is_dir() {
            fs::create_dir_all(&destination)?;
            continue;
        }

        let relative = destination
            .strip_prefix(&root)
            .map(Path::to_path_buf)
            .map_err(|_| SecurityViolation::PathTraversal {
                entry: name.clone(),
            })?;
        if !files.insert(relative.clone()) {
            return Err(ArchiveError::ArchiveCorrupt(format!(
                "duplicate entry {}",
                name
            )));
        }

        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }

        let declared = entry.size();
        let written = copy_bounded(&mut entry, &destination, &name, declared)?;
        total_written += written;
        if total_written > limits.max_total_uncompressed {
            return Err(SecurityViolation::TotalSizeExceeded {
                limit: limits.max_total_uncompressed,
            }
            .into());
        }

        if relative != Path::new(MANIFEST_PATH) {
            photos_done += 1;
            reporter.report_count(
                Phase::Extracting,
                photos_done,
                validation.entry_count as u64,
            );
        }
    }

    let manifest_path = root.join(MANIFEST_PATH);
    if !files.contains(Path::new(MANIFEST_PATH)) {
        return Err(ArchiveError::ArchiveCorrupt(format!(
            "archive has no {}",
            MANIFEST_PATH
        )));
    }
    let manifest = Manifest::parse(&fs::read(&manifest_path)?)?;

    reporter.report(Phase::Extracting, 1.0);
    log::info!(
        "Extracted {} files ({} bytes), manifest lists {} categories and {} photos",
        files.len(),
        total_written,
        manifest.categories.len(),
        manifest.photos.len()
    );

    Ok(ExtractedSet {
        scratch,
        manifest,
        files,
    })
}

/// Stream an entry to `destination`, failing once more than `declared` bytes arrive.
/// Read errors mean the archive is corrupt; write errors are I/O failures.
fn copy_bounded<R: Read>(
    reader: &mut R,
    destination: &Path,
    name: &str,
    declared: u64,
) -> Result<u64> {
    let mut output = BufWriter::new(File::create(destination)?);
    let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
    let mut written = 0u64;

    loop {
        let n = reader.read(&mut buffer).map_err(|e| {
            ArchiveError::ArchiveCorrupt(format!("failed to read {}: {}", name, e))
        })?;
        if n == 0 {
            break;
        }
        written += n as u64;
        if written > declared {
            return Err(SecurityViolation::EntryTooLarge {
                entry: name.to_string(),
                declared,
            }
            .into());
        }
        output.write_all(&buffer[..n])?;
    }

    output.flush()?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::photoarchive_core::progress::NoopSink;
    use std::io::Cursor;
    use zip::ZipWriter;
    use zip::write::SimpleFileOptions;

    fn extract_into(archive: &Path, scratch_parent: &Path) -> Result<ExtractedSet> {
        extract(
            archive,
            &ValidationResult::default(),
            scratch_parent,
            &ValidationLimits::default(),
            &ProgressReporter::new(NoopSink),
            &CancelToken::new(),
        )
    }

    fn assert_path_traversal(result: Result<ExtractedSet>) {
        match result {
            Err(ArchiveError::SecurityViolation(SecurityViolation::PathTraversal { .. })) => {}
            Err(e) => panic!("expected a path traversal violation, got {}", e),
            Ok(_) => panic!("expected a path traversal violation, extraction succeeded"),
        }
    }

    #[test]
    fn test_rejects_parent_segments_without_prior_validation() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("evil.zip");
        let mut zip = ZipWriter::new(File::create(&archive).unwrap());
        zip.start_file("../evil.jpg", SimpleFileOptions::default())
            .unwrap();
        zip.write_all(b"pwn").unwrap();
        zip.finish().unwrap();

        let scratch_parent = dir.path().join("scratch");
        assert_path_traversal(extract_into(&archive, &scratch_parent));

        assert!(!dir.path().join("evil.jpg").exists());
        assert!(!scratch_parent.join("evil.jpg").exists());
        assert_eq!(fs::read_dir(&scratch_parent).unwrap().count(), 0);
    }

    #[test]
    fn test_rejects_symlink_entry() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("link.zip");
        let mut zip = ZipWriter::new(File::create(&archive).unwrap());
        zip.add_symlink("photos/0.jpg", "/etc/passwd", SimpleFileOptions::default())
            .unwrap();
        zip.finish().unwrap();

        let scratch_parent = dir.path().join("scratch");
        assert_path_traversal(extract_into(&archive, &scratch_parent));
        assert_eq!(fs::read_dir(&scratch_parent).unwrap().count(), 0);
    }

    #[test]
    fn test_copy_bounded_rejects_oversized_stream() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("out.bin");

        let mut ok = Cursor::new(vec![7u8; 100]);
        assert_eq!(copy_bounded(&mut ok, &destination, "ok", 100).unwrap(), 100);
        assert_eq!(fs::read(&destination).unwrap().len(), 100);

        let mut liar = Cursor::new(vec![7u8; 101]);
        let err = copy_bounded(&mut liar, &destination, "liar", 100).unwrap_err();
        assert!(matches!(
            err,
            ArchiveError::SecurityViolation(SecurityViolation::EntryTooLarge { declared: 100, .. })
        ));
    }

    #[test]
    fn test_missing_archive() {
        let dir = tempfile::tempdir().unwrap();
        let reporter = ProgressReporter::new(NoopSink);
        let err = extract(
            &dir.path().join("missing.zip"),
            &ValidationResult::default(),
            dir.path(),
            &ValidationLimits::default(),
            &reporter,
            &CancelToken::new(),
        )
        .unwrap_err();
        assert!(matches!(err, ArchiveError::PathNotFound(_)));
    }
}
