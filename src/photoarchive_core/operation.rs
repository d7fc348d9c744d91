use crate::photoarchive_core::error::{ArchiveError, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Allows a single export or import against a destination at a time.
/// A second attempt fails immediately instead of queuing.
#[derive(Debug, Clone, Default)]
pub struct OperationLock {
    busy: Arc<AtomicBool>,
}

/// Held for the duration of an operation. Dropping it releases the lock.
#[derive(Debug)]
pub struct OperationGuard {
    busy: Arc<AtomicBool>,
}

impl OperationLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self) -> Result<OperationGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| ArchiveError::AlreadyInProgress)?;
        Ok(OperationGuard {
            busy: Arc::clone(&self.busy),
        })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

/// Checked between entries and records, never in the middle of a copy.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// `Err(Cancelled)` once cancellation has been requested.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(ArchiveError::Cancelled)
        } else {
            Ok(())
        }
    }
}
