pub mod cli;
pub mod config;
pub mod database;
pub mod error;
pub mod export;
pub mod extract;
pub mod library;
pub mod manifest;
pub mod operation;
pub mod photo;
pub mod progress;
pub mod reconcile;
pub mod service;
pub mod store;
pub mod validate;
pub mod workers;

pub use cli::{Cli, Commands};
pub use config::{ImportOptions, Strategy, ValidationLimits};
pub use database::Database;
pub use error::{ArchiveError, ErrorKind, SecurityViolation};
pub use export::{ArchiveWriter, ExportReport};
pub use library::Library;
pub use manifest::Manifest;
pub use operation::{CancelToken, OperationLock};
pub use progress::{Phase, ProgressEvent, ProgressReporter, ProgressSink, Terminal};
pub use reconcile::{ImportOutcome, ImportState, ImportSummary, Reconciler};
pub use service::{ArchiveService, ExportTask, ImportTask, run_export, run_import};
pub use store::{MemoryStore, PhotoStore};
pub use validate::ValidationResult;
pub use workers::hash_file;
