use crate::photoarchive_core::config::{Strategy, ValidationLimits};
use crate::photoarchive_core::photo::DEFAULT_COLOR_HEX;
use clap::{Args, Parser, Subcommand, ValueEnum};
use simplelog::LevelFilter;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Back up, validate and restore categorized photo libraries")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable file logging to photoarchive.log
    #[arg(long = "log", global = true)]
    pub log: bool,

    /// Log level for file logging (debug, info, warn, error)
    #[arg(long, default_value_t = LevelFilter::Debug, global = true)]
    pub log_level: LevelFilter,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a new photo library
    Create {
        /// Path for the new library (will be created if it doesn't exist)
        #[arg(required = true)]
        library_dir: PathBuf,
    },

    /// Create a category in a library
    Category {
        /// Library to add the category to
        #[arg(required = true)]
        library_dir: PathBuf,

        /// Name shown for the category (unique, case-insensitive)
        #[arg(required = true)]
        display_name: String,

        /// Category color as #RRGGBB
        #[arg(long, default_value = DEFAULT_COLOR_HEX)]
        color: String,
    },

    /// Add image files from a directory to a library
    Add {
        /// Directory containing images
        #[arg(required = true)]
        source_dir: PathBuf,

        /// Library to add into
        #[arg(required = true)]
        library_dir: PathBuf,

        /// Category display name (defaults to Uncategorized)
        #[arg(long)]
        category: Option<String>,

        /// Mark the added photos as favorites
        #[arg(long)]
        favorite: bool,
    },

    /// List categories with photo counts
    List {
        /// Library to list
        #[arg(required = true)]
        library_dir: PathBuf,
    },

    /// Export a library to a single zip archive
    Export {
        /// Library to export
        #[arg(required = true)]
        library_dir: PathBuf,

        /// Archive file to write
        #[arg(required = true)]
        archive: PathBuf,
    },

    /// Check an archive against the safety limits without extracting it
    Validate {
        /// Archive to check
        #[arg(required = true)]
        archive: PathBuf,

        #[command(flatten)]
        limits: LimitArgs,
    },

    /// Import an archive into a library.
    ///
    /// Merge keeps existing content, reuses categories with the same name
    /// (case-insensitive) and skips photos already present in the same
    /// category. Replace deletes every photo in the library first and makes
    /// the categories match the archive; the default category is kept.
    Import {
        /// Archive to import
        #[arg(required = true)]
        archive: PathBuf,

        /// Library to import into
        #[arg(required = true)]
        library_dir: PathBuf,

        /// How archive content is combined with the library
        #[arg(long, value_enum, default_value_t = StrategyArg::Merge)]
        strategy: StrategyArg,

        /// Also skip photos whose content already exists in the category
        #[arg(long)]
        match_content: bool,

        #[command(flatten)]
        limits: LimitArgs,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum StrategyArg {
    Merge,
    Replace,
}

impl From<StrategyArg> for Strategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Merge => Strategy::Merge,
            StrategyArg::Replace => Strategy::Replace,
        }
    }
}

/// Ceilings applied to untrusted archives.
#[derive(Args, Debug, Clone)]
pub struct LimitArgs {
    /// Maximum number of entries in the archive
    #[arg(long, default_value_t = ValidationLimits::default().max_entries)]
    pub max_entries: usize,

    /// Maximum total uncompressed size in bytes
    #[arg(long, default_value_t = ValidationLimits::default().max_total_uncompressed)]
    pub max_total_size: u64,

    /// Maximum uncompressed/compressed ratio of a single entry
    #[arg(long, default_value_t = ValidationLimits::default().max_compression_ratio)]
    pub max_ratio: u64,
}

impl From<&LimitArgs> for ValidationLimits {
    fn from(args: &LimitArgs) -> Self {
        ValidationLimits {
            max_entries: args.max_entries,
            max_total_uncompressed: args.max_total_size,
            max_compression_ratio: args.max_ratio,
        }
    }
}
