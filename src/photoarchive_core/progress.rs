use crate::photoarchive_core::error::{ArchiveError, ErrorKind};
use crate::photoarchive_core::export::ExportReport;
use crate::photoarchive_core::reconcile::ImportSummary;
use crossbeam_channel::Sender;
use std::cell::Cell;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Exporting,
    Validating,
    Extracting,
    Reconciling,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Exporting => "exporting",
            Phase::Validating => "validating",
            Phase::Extracting => "extracting",
            Phase::Reconciling => "reconciling",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How an operation ended.
#[derive(Debug, Clone)]
pub enum Terminal {
    Imported(ImportSummary),
    Exported(ExportReport),
    Failed { kind: ErrorKind, message: String },
}

impl Terminal {
    pub fn failed(err: &ArchiveError) -> Self {
        Terminal::Failed {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// `fraction` is in `[0, 1]` and never decreases within a phase.
    Phase { phase: Phase, fraction: f64 },
    Finished(Terminal),
}

/// Destination for progress events. Delivery must not block the operation.
pub trait ProgressSink {
    fn deliver(&self, event: ProgressEvent);
}

/// Unbounded channel delivery. A dropped receiver is ignored.
impl ProgressSink for Sender<ProgressEvent> {
    fn deliver(&self, event: ProgressEvent) {
        let _ = self.send(event);
    }
}

/// Delivers events to a closure.
pub struct FnSink<F>(pub F);

impl<F: Fn(ProgressEvent)> ProgressSink for FnSink<F> {
    fn deliver(&self, event: ProgressEvent) {
        (self.0)(event)
    }
}

pub fn fn_sink<F: Fn(ProgressEvent)>(f: F) -> FnSink<F> {
    FnSink(f)
}

/// Discards every event.
pub struct NoopSink;

impl ProgressSink for NoopSink {
    fn deliver(&self, _event: ProgressEvent) {}
}

/// Enforces phase ordering and monotonic fractions before handing events to a sink.
pub struct ProgressReporter<S: ProgressSink> {
    sink: S,
    current: Cell<Option<(Phase, f64)>>,
}

impl<S: ProgressSink> ProgressReporter<S> {
    pub fn new(sink: S) -> Self {
        ProgressReporter {
            sink,
            current: Cell::new(None),
        }
    }

    /// Enter `phase` at fraction 0. Entering an earlier phase is ignored.
    pub fn begin(&self, phase: Phase) {
        self.report(phase, 0.0);
    }

    pub fn report(&self, phase: Phase, fraction: f64) {
        let fraction = if fraction.is_nan() {
            0.0
        } else {
            fraction.clamp(0.0, 1.0)
        };

        let fraction = match self.current.get() {
            Some((current, _)) if phase < current => {
                log::debug!("Dropping out-of-order progress for {}", phase);
                return;
            }
            Some((current, last)) if phase == current && fraction < last => return,
            _ => fraction,
        };

        self.current.set(Some((phase, fraction)));
        self.sink.deliver(ProgressEvent::Phase { phase, fraction });
    }

    /// `done` out of `total` items. An empty phase counts as complete.
    pub fn report_count(&self, phase: Phase, done: u64, total: u64) {
        let fraction = if total == 0 {
            1.0
        } else {
            done as f64 / total as f64
        };
        self.report(phase, fraction);
    }

    /// Emit the single terminal event.
    pub fn finish(self, terminal: Terminal) {
        self.sink.deliver(ProgressEvent::Finished(terminal));
    }
}
