use crate::photoarchive_core::config::{ImportOptions, Strategy, ValidationLimits};
use crate::photoarchive_core::error::{ArchiveError, Result};
use crate::photoarchive_core::export::{ExportReport, export_store};
use crate::photoarchive_core::extract::extract;
use crate::photoarchive_core::operation::{CancelToken, OperationGuard, OperationLock};
use crate::photoarchive_core::progress::{
    NoopSink, Phase, ProgressEvent, ProgressReporter, ProgressSink, Terminal,
};
use crate::photoarchive_core::reconcile::{ImportState, ImportSummary, Reconciler};
use crate::photoarchive_core::store::PhotoStore;
use crate::photoarchive_core::validate::{self, ValidationResult};
use crossbeam_channel::{Receiver, unbounded};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

/// Export `store` to `destination`, then emit the terminal event.
pub fn run_export<St: PhotoStore, P: ProgressSink>(
    store: &St,
    destination: &Path,
    reporter: ProgressReporter<P>,
    cancel: &CancelToken,
) -> Result<ExportReport> {
    let result = export_store(store, destination, &reporter, cancel);
    match &result {
        Ok(report) => reporter.finish(Terminal::Exported(report.clone())),
        Err(e) => {
            log::warn!("Export to {} failed: {}", destination.display(), e);
            reporter.finish(Terminal::failed(e));
        }
    }
    result
}

/// Validate, extract and reconcile `archive` into `store`, then emit the terminal event.
///
/// Errors before reconciliation leave `store` untouched. Once reconciliation
/// starts the run completes; per-record failures are in the summary.
pub fn run_import<St: PhotoStore, P: ProgressSink>(
    store: &mut St,
    archive: &Path,
    options: &ImportOptions,
    reporter: ProgressReporter<P>,
    cancel: &CancelToken,
) -> Result<ImportSummary> {
    let mut state = ImportState::Idle;
    let result = import_stages(store, archive, options, &reporter, cancel, &mut state);

    match &result {
        Ok(summary) => reporter.finish(Terminal::Imported(summary.clone())),
        Err(e) => {
            if state.can_advance_to(ImportState::Aborted) {
                state = ImportState::Aborted;
            }
            log::warn!("Import of {} stopped in {:?}: {}", archive.display(), state, e);
            reporter.finish(Terminal::failed(e));
        }
    }
    result
}

fn import_stages<St: PhotoStore, P: ProgressSink>(
    store: &mut St,
    archive: &Path,
    options: &ImportOptions,
    reporter: &ProgressReporter<P>,
    cancel: &CancelToken,
    state: &mut ImportState,
) -> Result<ImportSummary> {
    log::info!("Importing {} ({})", archive.display(), options.strategy);

    state.advance(ImportState::Validating)?;
    let validation = validate::validate_archive(archive, &options.limits, reporter, cancel)?;

    state.advance(ImportState::Extracting)?;
    let extracted = extract(
        archive,
        &validation,
        &options.scratch_parent(),
        &options.limits,
        reporter,
        cancel,
    )?;
    cancel.check()?;
    let mut reconciler = Reconciler::new(store, options);
    let destination = reconciler.read_destination()?;

    state.advance(ImportState::ReconcilingCategories)?;
    reporter.begin(Phase::Reconciling);
    let mut summary = ImportSummary::new(options.strategy);
    let mapping = reconciler.reconcile_categories(extracted.manifest(), destination, &mut summary);

    state.advance(ImportState::ReconcilingPhotos)?;
    reconciler.reconcile_photos(&extracted, &mapping, &mut summary, reporter, cancel);

    state.advance(ImportState::Completed)?;
    if let Err(e) = extracted.close() {
        log::warn!("Failed to remove scratch directory: {}", e);
    }

    log::info!("Import finished: {}", summary);
    Ok(summary)
}

/// A running export or import.
pub struct OperationTask<T> {
    events: Receiver<ProgressEvent>,
    cancel: CancelToken,
    handle: JoinHandle<Result<T>>,
}

pub type ImportTask = OperationTask<ImportSummary>;
pub type ExportTask = OperationTask<ExportReport>;

impl<T> OperationTask<T> {
    /// Phase events followed by exactly one `Finished` event.
    pub fn events(&self) -> &Receiver<ProgressEvent> {
        &self.events
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Block until the operation ends.
    pub fn wait(self) -> Result<T> {
        self.handle
            .join()
            .map_err(|_| ArchiveError::Other("operation thread panicked".to_string()))?
    }
}

/// Export, validation and import against one shared store.
pub struct ArchiveService<S> {
    store: Arc<Mutex<S>>,
    lock: OperationLock,
    defaults: ImportOptions,
}

impl<S> Clone for ArchiveService<S> {
    fn clone(&self) -> Self {
        ArchiveService {
            store: Arc::clone(&self.store),
            lock: self.lock.clone(),
            defaults: self.defaults.clone(),
        }
    }
}

impl<S: PhotoStore + Send + 'static> ArchiveService<S> {
    pub fn new(store: S) -> Self {
        ArchiveService {
            store: Arc::new(Mutex::new(store)),
            lock: OperationLock::new(),
            defaults: ImportOptions::default(),
        }
    }

    pub fn with_limits(mut self, limits: ValidationLimits) -> Self {
        self.defaults.limits = limits;
        self
    }

    /// Scratch extraction goes under `dir` instead of the system temp dir.
    pub fn with_scratch_parent(mut self, dir: PathBuf) -> Self {
        self.defaults.scratch_parent = Some(dir);
        self
    }

    pub fn with_content_matching(mut self, enabled: bool) -> Self {
        self.defaults.match_content_hash = enabled;
        self
    }

    pub fn store(&self) -> Arc<Mutex<S>> {
        Arc::clone(&self.store)
    }

    pub fn is_busy(&self) -> bool {
        self.lock.is_busy()
    }

    /// Synchronous export without progress events.
    pub fn export_library(&self, destination: &Path) -> Result<ExportReport> {
        let _guard = self.lock.try_acquire()?;
        let store = lock_store(&self.store)?;
        run_export(
            &*store,
            destination,
            ProgressReporter::new(NoopSink),
            &CancelToken::new(),
        )
    }

    /// Export on a background thread.
    pub fn spawn_export(&self, destination: PathBuf) -> Result<ExportTask> {
        let guard = self.lock.try_acquire()?;
        let shared = Arc::clone(&self.store);
        spawn_task("photoarchive-export", guard, move |reporter, cancel| {
            let store = match lock_store(&shared) {
                Ok(store) => store,
                Err(e) => {
                    reporter.finish(Terminal::failed(&e));
                    return Err(e);
                }
            };
            run_export(&*store, &destination, reporter, &cancel)
        })
    }

    /// Pass 1 only. Reads the archive and nothing else.
    pub fn validate_archive(&self, path: &Path) -> Result<ValidationResult> {
        validate::validate_archive(
            path,
            &self.defaults.limits,
            &ProgressReporter::new(NoopSink),
            &CancelToken::new(),
        )
    }

    /// Import on a background thread using the service's defaults.
    /// Fails with `AlreadyInProgress` if another operation holds the lock.
    pub fn import_archive(&self, path: &Path, strategy: Strategy) -> Result<ImportTask> {
        let options = ImportOptions {
            strategy,
            ..self.defaults.clone()
        };
        self.import_with_options(path, options)
    }

    pub fn import_with_options(&self, path: &Path, options: ImportOptions) -> Result<ImportTask> {
        let guard = self.lock.try_acquire()?;
        let shared = Arc::clone(&self.store);
        let path = path.to_path_buf();
        spawn_task("photoarchive-import", guard, move |reporter, cancel| {
            let mut store = match lock_store(&shared) {
                Ok(store) => store,
                Err(e) => {
                    reporter.finish(Terminal::failed(&e));
                    return Err(e);
                }
            };
            run_import(&mut *store, &path, &options, reporter, &cancel)
        })
    }
}

fn lock_store<S>(store: &Mutex<S>) -> Result<MutexGuard<'_, S>> {
    store
        .lock()
        .map_err(|_| ArchiveError::Other("store lock poisoned".to_string()))
}

/// Run `work` on a named thread holding `guard` until it returns.
fn spawn_task<T, F>(name: &str, guard: OperationGuard, work: F) -> Result<OperationTask<T>>
where
    T: Send + 'static,
    F: FnOnce(ProgressReporter<crossbeam_channel::Sender<ProgressEvent>>, CancelToken) -> Result<T>
        + Send
        + 'static,
{
    let (tx, rx) = unbounded();
    let cancel = CancelToken::new();
    let worker_cancel = cancel.clone();

    let handle = thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            let _guard = guard;
            work(ProgressReporter::new(tx), worker_cancel)
        })?;

    Ok(OperationTask {
        events: rx,
        cancel,
        handle,
    })
}
