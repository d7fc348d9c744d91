use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArchiveError {
    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] rusqlite_migration::Error),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Directory walker error: {0}")]
    Walkdir(#[from] walkdir::Error),

    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    // Archive errors
    #[error("Archive is corrupt: {0}")]
    ArchiveCorrupt(String),

    #[error("Security violation: {0}")]
    SecurityViolation(#[from] SecurityViolation),

    #[error("Manifest error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Duplicate category name in archive: {0}")]
    DuplicateName(String),

    #[error("Import completed with {failed} of {total} photos failed")]
    PartialImportFailure { failed: usize, total: usize },

    // Operation control
    #[error("Another export or import is already in progress")]
    AlreadyInProgress,

    #[error("Operation cancelled")]
    Cancelled,

    // Library errors
    #[error("Library already exists at {0}")]
    LibraryExists(PathBuf),

    #[error("Library not found at {0}")]
    LibraryNotFound(PathBuf),

    #[error("Invalid library: missing database at {0}")]
    InvalidLibrary(PathBuf),

    #[error("Category not found: {0}")]
    CategoryNotFound(String),

    // Generic errors
    #[error("Argument error: {0}")]
    Argument(String),

    #[error("{0}")]
    Other(String),
}

/// A hostile or oversized archive, rejected before anything is written.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SecurityViolation {
    #[error("entry '{entry}' escapes the destination root")]
    PathTraversal { entry: String },

    #[error("entry '{entry}' has compression ratio {ratio} (limit {limit})")]
    CompressionRatioExceeded { entry: String, ratio: u64, limit: u64 },

    #[error("archive expands to more than {limit} bytes")]
    TotalSizeExceeded { limit: u64 },

    #[error("archive has {count} entries (limit {limit})")]
    EntryCountExceeded { count: usize, limit: usize },

    #[error("entry '{entry}' is larger than its declared size of {declared} bytes")]
    EntryTooLarge { entry: String, declared: u64 },
}

/// Cloneable classification of an [`ArchiveError`], carried by terminal progress events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ArchiveCorrupt,
    SecurityViolation,
    IoFailure,
    DuplicateName,
    PartialImportFailure,
    AlreadyInProgress,
    Cancelled,
    Other,
}

impl ArchiveError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ArchiveError::ArchiveCorrupt(_) | ArchiveError::Json(_) => ErrorKind::ArchiveCorrupt,
            ArchiveError::SecurityViolation(_) => ErrorKind::SecurityViolation,
            ArchiveError::Io(_) | ArchiveError::Walkdir(_) | ArchiveError::PathNotFound(_) => {
                ErrorKind::IoFailure
            }
            ArchiveError::DuplicateName(_) => ErrorKind::DuplicateName,
            ArchiveError::PartialImportFailure { .. } => ErrorKind::PartialImportFailure,
            ArchiveError::AlreadyInProgress => ErrorKind::AlreadyInProgress,
            ArchiveError::Cancelled => ErrorKind::Cancelled,
            _ => ErrorKind::Other,
        }
    }
}

impl From<zip::result::ZipError> for ArchiveError {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(e) => ArchiveError::Io(e),
            other => ArchiveError::ArchiveCorrupt(other.to_string()),
        }
    }
}

/// A photo that could not be read while building an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportWarning {
    pub photo_id: i64,
    pub source: PathBuf,
    pub reason: String,
}

/// Photos left out of an export. The export itself still succeeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportWarnings {
    pub warnings: Vec<ExportWarning>,
}

impl std::fmt::Display for ExportWarnings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for warning in &self.warnings {
            writeln!(
                f,
                "  photo {} ({}): {}",
                warning.photo_id,
                warning.source.display(),
                warning.reason
            )?;
        }
        Ok(())
    }
}

impl ExportWarnings {
    pub fn new() -> Self {
        Self {
            warnings: Vec::new(),
        }
    }

    pub fn add(&mut self, photo_id: i64, source: PathBuf, error: &std::io::Error) {
        self.warnings.push(ExportWarning {
            photo_id,
            source,
            reason: error.to_string(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn len(&self) -> usize {
        self.warnings.len()
    }
}

impl Default for ExportWarnings {
    fn default() -> Self {
        Self::new()
    }
}

/// Result type for photoarchive operations.
pub type Result<T> = std::result::Result<T, ArchiveError>;
