use std::path::PathBuf;

/// Default ceiling on the number of entries in an archive.
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// Default ceiling on the cumulative uncompressed size of an archive (4 GiB).
pub const DEFAULT_MAX_TOTAL_UNCOMPRESSED: u64 = 4 * 1024 * 1024 * 1024;

/// Default ceiling on a single entry's uncompressed/compressed ratio.
pub const DEFAULT_MAX_COMPRESSION_RATIO: u64 = 100;

/// Resource ceilings applied to untrusted archives before extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationLimits {
    pub max_entries: usize,
    pub max_total_uncompressed: u64,
    pub max_compression_ratio: u64,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        ValidationLimits {
            max_entries: DEFAULT_MAX_ENTRIES,
            max_total_uncompressed: DEFAULT_MAX_TOTAL_UNCOMPRESSED,
            max_compression_ratio: DEFAULT_MAX_COMPRESSION_RATIO,
        }
    }
}

/// How archive content is applied to a destination library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    /// Keep destination content; match categories by name and skip duplicate photos.
    #[default]
    Merge,
    /// Supersede destination content with the archive's.
    Replace,
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strategy::Merge => write!(f, "merge"),
            Strategy::Replace => write!(f, "replace"),
        }
    }
}

/// Options for a single import run.
#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    pub strategy: Strategy,
    pub limits: ValidationLimits,
    /// Also treat photos with identical content in the same category as duplicates.
    pub match_content_hash: bool,
    /// Parent directory for scratch extraction. Defaults to the system temp dir.
    pub scratch_parent: Option<PathBuf>,
}

impl ImportOptions {
    pub fn new(strategy: Strategy) -> Self {
        ImportOptions {
            strategy,
            ..Default::default()
        }
    }

    pub fn scratch_parent(&self) -> PathBuf {
        self.scratch_parent
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }
}
