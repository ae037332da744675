//! Task and batch result types.

use serde::Serialize;

use super::error::FetchError;
use crate::lockfile::PackageDescriptor;

/// One descriptor's attempt sequence, owned by the engine.
#[derive(Debug, Clone)]
pub struct DownloadTask {
    /// What to fetch.
    pub descriptor: PackageDescriptor,
    /// Attempts made so far.
    pub attempts: u32,
    /// Breaker refusals waited out instead of counted as attempts.
    pub circuit_waits: u32,
    /// Error of the most recent failed attempt.
    pub last_error: Option<FetchError>,
}

impl DownloadTask {
    /// Create a task with no attempts made.
    pub fn new(descriptor: PackageDescriptor) -> Self {
        Self {
            descriptor,
            attempts: 0,
            circuit_waits: 0,
            last_error: None,
        }
    }

    /// Turn an exhausted task into its failure report.
    pub fn into_failed(self, error: FetchError) -> FailedTask {
        FailedTask {
            descriptor: self.descriptor,
            error,
            attempts: self.attempts,
        }
    }
}

/// A task that exhausted its attempts or hit a permanent error.
#[derive(Debug, Clone)]
pub struct FailedTask {
    /// What failed.
    pub descriptor: PackageDescriptor,
    /// Final error.
    pub error: FetchError,
    /// Attempts used.
    pub attempts: u32,
}

/// Final state of one task.
#[derive(Debug, Clone)]
pub enum TaskOutcome {
    /// Archive (and manifest where owned) written.
    Downloaded,
    /// Destination already complete; no network call made.
    SkippedExisting,
    /// Attempts exhausted.
    Failed(FailedTask),
    /// Stopped by cancellation.
    Cancelled,
}

/// Summary of one [`download_all`](super::FetchEngine::download_all) call.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    /// Tasks handed to the batch.
    pub total: usize,
    /// Tasks that wrote new files.
    pub downloaded: usize,
    /// Tasks whose destination was already complete.
    pub skipped_existing: usize,
    /// Tasks excluded because their key is recorded as failed.
    pub skipped_failed: usize,
    /// Tasks not completed because the batch was cancelled.
    pub cancelled: usize,
    /// Tasks that failed.
    #[serde(skip)]
    pub failed: Vec<FailedTask>,
}

impl BatchReport {
    /// Tasks that ended with their files in place.
    pub fn succeeded(&self) -> usize {
        self.downloaded + self.skipped_existing
    }

    /// Whether every task handed to the batch succeeded.
    pub fn is_complete(&self) -> bool {
        self.succeeded() == self.total
    }

    pub(crate) fn record(&mut self, outcome: TaskOutcome) {
        match outcome {
            TaskOutcome::Downloaded => self.downloaded += 1,
            TaskOutcome::SkippedExisting => self.skipped_existing += 1,
            TaskOutcome::Failed(failed) => self.failed.push(failed),
            TaskOutcome::Cancelled => self.cancelled += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_accounting() {
        let d = PackageDescriptor::new("a", "1.0.0", "https://r/a.tgz", "node_modules/a");
        let mut report = BatchReport {
            total: 4,
            ..Default::default()
        };
        report.record(TaskOutcome::Downloaded);
        report.record(TaskOutcome::SkippedExisting);
        report.record(TaskOutcome::Cancelled);
        report.record(TaskOutcome::Failed(
            DownloadTask::new(d).into_failed(FetchError::CircuitOpen),
        ));

        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.cancelled, 1);
        assert_eq!(report.failed.len(), 1);
        assert!(!report.is_complete());
    }
}
