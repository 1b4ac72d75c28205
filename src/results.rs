use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

/// One match: a path whose file name contains `pattern`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanResult {
    pub path:    PathBuf,
    pub pattern: String,
}

/// Matches accumulated by the matcher threads between two flushes.
///
/// A single lock guards the whole sequence. Flushing swaps it out so the
/// lock is never held while printing.
#[derive(Debug, Default)]
pub struct ResultBuffer {
    items: Mutex<Vec<ScanResult>>,
    total: AtomicUsize,
}

impl ResultBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, result: ScanResult) {
        self.items.lock().push(result);
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    /// Matches pushed over the buffer's lifetime, flushed or not.
    pub fn total(&self) -> usize {
        self.total.load(Ordering::Relaxed)
    }

    /// Take everything accumulated so far, leaving the buffer empty.
    pub fn take(&self) -> Vec<ScanResult> {
        std::mem::take(&mut *self.items.lock())
    }
}

/// The outcome of a completed scan.
#[derive(Debug, Clone)]
pub struct ScanSummary {
    /// Matches found, including any discarded by an `exit`.
    pub matches: usize,

    /// Matches actually printed.
    pub printed: usize,

    /// Entries the walker reported.
    pub entries: usize,

    /// Traversal errors reported on the diagnostics stream.
    pub errors: usize,

    /// Wall-clock time from start to the final flush.
    pub duration: Duration,

    /// `true` if the scan was aborted with `exit`.
    pub stopped: bool,

    /// High-water mark of the walker's frontier footprint, in bytes.
    pub peak_footprint: usize,

    /// Entries walked per second. Convenience field, clamped to 0 on
    /// zero-duration runs.
    pub entries_per_sec: usize,
}

impl ScanSummary {
    /// Fill in `entries_per_sec` from the raw counts.
    pub(crate) fn compute(mut self) -> Self {
        let secs = self.duration.as_secs_f64();
        self.entries_per_sec = if secs > 0.0 {
            (self.entries as f64 / secs) as usize
        } else {
            0
        };
        self
    }
}
