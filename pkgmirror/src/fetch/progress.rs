//! Batch progress reporting.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Snapshot of batch progress, delivered on every task state change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchProgress {
    /// Tasks finished successfully (downloaded or already present).
    pub completed: usize,
    /// Tasks that exhausted their attempts.
    pub failed: usize,
    /// Tasks skipped because they were already present or recorded as failed.
    pub skipped: usize,
    /// Tasks in the batch.
    pub total: usize,
    /// Descriptor of the task that changed state (`name@version`).
    pub label: String,
}

impl FetchProgress {
    /// Tasks that reached a final state.
    pub fn finished(&self) -> usize {
        self.completed + self.failed + self.skipped
    }
}

/// Progress callback, shared by every task of a batch.
pub type ProgressCallback = Arc<dyn Fn(FetchProgress) + Send + Sync>;

/// Atomic counters behind [`FetchProgress`] snapshots.
#[derive(Clone)]
pub(crate) struct ProgressTracker {
    counters: Arc<Counters>,
    callback: Option<ProgressCallback>,
    total: usize,
}

#[derive(Default)]
struct Counters {
    completed: AtomicUsize,
    failed: AtomicUsize,
    skipped: AtomicUsize,
}

/// Which counter a state change advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProgressEvent {
    Completed,
    Failed,
    Skipped,
}

impl ProgressTracker {
    pub(crate) fn new(total: usize, callback: Option<ProgressCallback>) -> Self {
        Self {
            counters: Arc::new(Counters::default()),
            callback,
            total,
        }
    }

    pub(crate) fn record(&self, event: ProgressEvent, label: &str) {
        let counter = match event {
            ProgressEvent::Completed => &self.counters.completed,
            ProgressEvent::Failed => &self.counters.failed,
            ProgressEvent::Skipped => &self.counters.skipped,
        };
        counter.fetch_add(1, Ordering::SeqCst);

        if let Some(callback) = &self.callback {
            callback(self.snapshot(label));
        }
    }

    pub(crate) fn snapshot(&self, label: &str) -> FetchProgress {
        FetchProgress {
            completed: self.counters.completed.load(Ordering::SeqCst),
            failed: self.counters.failed.load(Ordering::SeqCst),
            skipped: self.counters.skipped.load(Ordering::SeqCst),
            total: self.total,
            label: label.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_tracker_without_callback() {
        let tracker = ProgressTracker::new(3, None);
        tracker.record(ProgressEvent::Completed, "a@1.0.0");
        tracker.record(ProgressEvent::Skipped, "b@1.0.0");
        let snapshot = tracker.snapshot("");
        assert_eq!(snapshot.completed, 1);
        assert_eq!(snapshot.skipped, 1);
        assert_eq!(snapshot.finished(), 2);
    }

    #[test]
    fn test_callback_receives_every_change() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: ProgressCallback = Arc::new(move |p| sink.lock().push(p));

        let tracker = ProgressTracker::new(2, Some(callback));
        tracker.record(ProgressEvent::Failed, "a@1.0.0");
        tracker.record(ProgressEvent::Completed, "b@1.0.0");

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].failed, 1);
        assert_eq!(seen[0].label, "a@1.0.0");
        assert_eq!(seen[1].finished(), 2);
        assert_eq!(seen[1].total, 2);
    }
}
