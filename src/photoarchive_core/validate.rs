use crate::photoarchive_core::config::ValidationLimits;
use crate::photoarchive_core::error::{ArchiveError, Result, SecurityViolation};
use crate::photoarchive_core::manifest::MANIFEST_PATH;
use crate::photoarchive_core::operation::CancelToken;
use crate::photoarchive_core::progress::{Phase, ProgressReporter, ProgressSink};
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::{Path, PathBuf};
use zip::ZipArchive;

const S_IFMT: u32 = 0o170000;
const S_IFLNK: u32 = 0o120000;

/// Central directory view of one archive entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Raw entry name as stored in the archive.
    pub name: String,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub is_dir: bool,
    pub is_symlink: bool,
}

impl ArchiveEntry {
    pub fn file(name: &str, compressed_size: u64, uncompressed_size: u64) -> Self {
        ArchiveEntry {
            name: name.to_string(),
            compressed_size,
            uncompressed_size,
            is_dir: false,
            is_symlink: false,
        }
    }

    pub fn normalized_path(&self) -> Option<PathBuf> {
        normalize_entry_path(&self.name)
    }
}

/// Read the central directory record of entry `index` without decompressing it.
pub(crate) fn read_entry<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    index: usize,
) -> Result<ArchiveEntry> {
    let file = archive.by_index_raw(index)?;
    Ok(ArchiveEntry {
        name: file.name().to_string(),
        compressed_size: file.compressed_size(),
        uncompressed_size: file.size(),
        is_dir: file.is_dir(),
        is_symlink: is_symlink_mode(file.unix_mode()),
    })
}

pub(crate) fn is_symlink_mode(mode: Option<u32>) -> bool {
    mode.map(|m| m & S_IFMT == S_IFLNK).unwrap_or(false)
}

/// Produced by pass 1 and consumed by pass 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ValidationResult {
    /// File entries other than the manifest, i.e. photos.
    pub entry_count: usize,
    /// Declared uncompressed bytes of those entries.
    pub total_uncompressed_size: u64,
    pub manifest_size: u64,
}

/// Normalize an archive entry name into a relative path.
///
/// Backslashes are treated as separators, `.` segments are dropped and `..`
/// pops the previous segment. Returns `None` when the name is empty, absolute,
/// carries a drive or stream prefix (`:`), contains NUL, or climbs above the root.
pub fn normalize_entry_path(name: &str) -> Option<PathBuf> {
    if name.is_empty() || name.contains('\0') {
        return None;
    }
    let name = name.replace('\\', "/");
    if name.starts_with('/') {
        return None;
    }

    let mut parts: Vec<&str> = Vec::new();
    for segment in name.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                parts.pop()?;
            }
            s if s.contains(':') => return None,
            s => parts.push(s),
        }
    }

    if parts.is_empty() {
        return None;
    }
    Some(parts.iter().collect())
}

/// Join a normalized entry name to `root`, refusing anything that would land outside it.
pub fn resolve_under(root: &Path, name: &str) -> std::result::Result<PathBuf, SecurityViolation> {
    let traversal = || SecurityViolation::PathTraversal {
        entry: name.to_string(),
    };
    let relative = normalize_entry_path(name).ok_or_else(traversal)?;
    let joined = root.join(relative);
    if !joined.starts_with(root) {
        return Err(traversal());
    }
    Ok(joined)
}

/// Accumulates per-entry checks.
struct Validator<'a> {
    limits: &'a ValidationLimits,
    cumulative: u64,
    result: ValidationResult,
}

impl<'a> Validator<'a> {
    fn new(limits: &'a ValidationLimits, declared_count: usize) -> std::result::Result<Self, SecurityViolation> {
        if declared_count > limits.max_entries {
            return Err(SecurityViolation::EntryCountExceeded {
                count: declared_count,
                limit: limits.max_entries,
            });
        }
        Ok(Validator {
            limits,
            cumulative: 0,
            result: ValidationResult::default(),
        })
    }

    fn check(&mut self, entry: &ArchiveEntry) -> std::result::Result<(), SecurityViolation> {
        let Some(path) = entry.normalized_path() else {
            return Err(SecurityViolation::PathTraversal {
                entry: entry.name.clone(),
            });
        };
        if entry.is_symlink {
            return Err(SecurityViolation::PathTraversal {
                entry: entry.name.clone(),
            });
        }
        if entry.is_dir {
            return Ok(());
        }

        let limit = self.limits.max_compression_ratio;
        if entry.uncompressed_size as u128 > entry.compressed_size as u128 * limit as u128 {
            return Err(SecurityViolation::CompressionRatioExceeded {
                entry: entry.name.clone(),
                ratio: entry.uncompressed_size / entry.compressed_size.max(1),
                limit,
            });
        }

        self.cumulative = self.cumulative.saturating_add(entry.uncompressed_size);
        if self.cumulative > self.limits.max_total_uncompressed {
            return Err(SecurityViolation::TotalSizeExceeded {
                limit: self.limits.max_total_uncompressed,
            });
        }

        if path == Path::new(MANIFEST_PATH) {
            self.result.manifest_size = entry.uncompressed_size;
        } else {
            self.result.entry_count += 1;
            self.result.total_uncompressed_size += entry.uncompressed_size;
        }
        Ok(())
    }

    fn finish(self) -> ValidationResult {
        self.result
    }
}

/// Validate a list of entries without touching the filesystem.
pub fn validate_entries(
    entries: &[ArchiveEntry],
    limits: &ValidationLimits,
) -> std::result::Result<ValidationResult, SecurityViolation> {
    let mut validator = Validator::new(limits, entries.len())?;
    for entry in entries {
        validator.check(entry)?;
    }
    Ok(validator.finish())
}

/// Open a zip archive. Anything the zip reader rejects is corrupt.
pub(crate) fn open_archive(path: &Path) -> Result<ZipArchive<BufReader<File>>> {
    if !path.exists() {
        return Err(ArchiveError::PathNotFound(path.to_path_buf()));
    }
    let file = File::open(path)?;
    ZipArchive::new(BufReader::new(file))
        .map_err(|e| ArchiveError::ArchiveCorrupt(format!("unreadable archive: {}", e)))
}

/// Pass 1 over the archive at `path`. Reads only the central directory.
pub fn validate_archive<S: ProgressSink>(
    path: &Path,
    limits: &ValidationLimits,
    reporter: &ProgressReporter<S>,
    cancel: &CancelToken,
) -> Result<ValidationResult> {
    reporter.begin(Phase::Validating);
    let mut archive = open_archive(path)?;
    let total = archive.len();

    log::info!("Validating {} ({} entries)", path.display(), total);
    let mut validator = Validator::new(limits, total)?;
    let mut has_manifest = false;

    for i in 0..total {
        cancel.check()?;
        let entry = read_entry(&mut archive, i)?;
        if let Err(violation) = validator.check(&entry) {
            log::warn!("Rejecting {}: {}", path.display(), violation);
            return Err(violation.into());
        }
        if !entry.is_dir && entry.normalized_path().as_deref() == Some(Path::new(MANIFEST_PATH)) {
            has_manifest = true;
        }
        reporter.report_count(Phase::Validating, (i + 1) as u64, total as u64);
    }

    if !has_manifest {
        return Err(ArchiveError::ArchiveCorrupt(format!(
            "archive has no {}",
            MANIFEST_PATH
        )));
    }

    let result = validator.finish();
    log::info!(
        "Archive valid: {} photos, {} bytes",
        result.entry_count,
        result.total_uncompressed_size
    );
    Ok(result)
}
