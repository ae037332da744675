//! Bounded-concurrency package fetcher.
//!
//! # Per-task flow
//!
//! ```text
//! destination complete? ──yes──► SkippedExisting (no network)
//!        │ no
//!        ▼
//! attempt: archive ─► .partial ─► rename ─► manifest ─► package.json
//!        │ error
//!        ▼
//! transient and attempts left? ──yes──► backoff + jitter ─► attempt
//!        │ no
//!        ▼
//! Failed (recorded in the failure store, if attached)
//! ```
//!
//! A semaphore sized by [`NetworkHealthMonitor::adaptive_concurrency`]
//! bounds in-flight tasks. Individual task failures never fail the batch.
//!
//! A refusal by the open circuit breaker normally counts as a failed
//! attempt, so the main pass sets packages aside quickly. With
//! [`FetchEngine::with_circuit_wait`] a refused task instead waits until the
//! breaker admits traffic again, at most `max_attempts` times.
//!
//! [`NetworkHealthMonitor::adaptive_concurrency`]: crate::network::NetworkHealthMonitor::adaptive_concurrency

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::error::{FetchError, FetchResult};
use super::progress::{ProgressCallback, ProgressEvent, ProgressTracker};
use super::retry::RetryPolicy;
use super::task::{BatchReport, DownloadTask, TaskOutcome};
use super::writer::{self, MANIFEST_FILE};
use crate::failures::FailureIsolationStore;
use crate::lockfile::PackageDescriptor;
use crate::registry::{HttpClient, Registry};

/// Who may write `package.json` for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ManifestPolicy {
    /// Primary descriptor: always (re)write.
    Always,
    /// Supplementary with no primary for its path in the batch.
    IfMissing,
    /// Supplementary sharing its path with a primary in the batch.
    Never,
}

/// Downloads package archives and manifests into a mirror tree.
pub struct FetchEngine<C: HttpClient> {
    registry: Arc<Registry<C>>,
    root: PathBuf,
    policy: RetryPolicy,
    store: Option<Arc<FailureIsolationStore>>,
    cancel: CancellationToken,
    progress: Option<ProgressCallback>,
    circuit_wait: bool,
}

impl<C: HttpClient> Clone for FetchEngine<C> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            root: self.root.clone(),
            policy: self.policy.clone(),
            store: self.store.clone(),
            cancel: self.cancel.clone(),
            progress: self.progress.clone(),
            circuit_wait: self.circuit_wait,
        }
    }
}

impl<C: HttpClient> FetchEngine<C> {
    /// Create an engine writing under `root`.
    pub fn new(registry: Arc<Registry<C>>, root: impl Into<PathBuf>) -> Self {
        Self {
            registry,
            root: root.into(),
            policy: RetryPolicy::default(),
            store: None,
            cancel: CancellationToken::new(),
            progress: None,
            circuit_wait: false,
        }
    }

    /// Set the retry policy (builder pattern).
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Attach a failure store, enabling failure-tracking mode.
    pub fn with_failure_store(mut self, store: Arc<FailureIsolationStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use an external cancellation token.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Report progress through a callback.
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Wait out breaker refusals instead of counting them as attempts.
    pub fn with_circuit_wait(mut self, enabled: bool) -> Self {
        self.circuit_wait = enabled;
        self
    }

    /// Mirror root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Cancellation token observed by this engine.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Download every descriptor in `tasks`.
    ///
    /// With `skip_failed` set, descriptors whose key is recorded in the
    /// attached failure store are excluded and counted as `skipped_failed`.
    ///
    /// # Errors
    ///
    /// Only setup faults fail the batch: [`FetchError::CreateRoot`] when the
    /// mirror root cannot be created. Task failures are reported in
    /// [`BatchReport::failed`].
    pub async fn download_all(
        &self,
        tasks: Vec<PackageDescriptor>,
        concurrency_limit: usize,
        skip_failed: bool,
    ) -> FetchResult<BatchReport> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| FetchError::CreateRoot {
                path: self.root.clone(),
                reason: e.to_string(),
            })?;

        let mut report = BatchReport {
            total: tasks.len(),
            ..BatchReport::default()
        };
        let tracker = ProgressTracker::new(tasks.len(), self.progress.clone());

        let runnable: Vec<PackageDescriptor> = match (&self.store, skip_failed) {
            (Some(store), true) => tasks
                .into_iter()
                .filter(|d| {
                    if store.is_failed(&d.key()) {
                        report.skipped_failed += 1;
                        tracker.record(ProgressEvent::Skipped, &d.key());
                        false
                    } else {
                        true
                    }
                })
                .collect(),
            _ => tasks,
        };

        let requested = concurrency_limit.max(1);
        let concurrency = self
            .registry
            .monitor()
            .adaptive_concurrency(requested)
            .clamp(1, requested);

        tracing::info!(
            tasks = runnable.len(),
            skipped_failed = report.skipped_failed,
            concurrency,
            requested,
            "Starting fetch batch"
        );

        let primary_paths: HashSet<String> = runnable
            .iter()
            .filter(|d| d.is_primary())
            .map(|d| d.local_path.clone())
            .collect();

        let semaphore = Arc::new(Semaphore::new(concurrency));
        let mut join_set = JoinSet::new();

        for descriptor in runnable {
            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                permit = Arc::clone(&semaphore).acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                report.cancelled += 1;
                continue;
            };

            let manifest = if descriptor.is_primary() {
                ManifestPolicy::Always
            } else if primary_paths.contains(&descriptor.local_path) {
                ManifestPolicy::Never
            } else {
                ManifestPolicy::IfMissing
            };

            let engine = self.clone();
            let tracker = tracker.clone();
            join_set.spawn(async move {
                let label = descriptor.key();
                let outcome = engine.run_task(descriptor, manifest).await;
                drop(permit);
                match &outcome {
                    TaskOutcome::Downloaded => tracker.record(ProgressEvent::Completed, &label),
                    TaskOutcome::SkippedExisting => tracker.record(ProgressEvent::Skipped, &label),
                    TaskOutcome::Failed(_) => tracker.record(ProgressEvent::Failed, &label),
                    TaskOutcome::Cancelled => {}
                }
                outcome
            });
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(outcome) => report.record(outcome),
                Err(e) => tracing::error!(error = %e, "Fetch task panicked"),
            }
        }

        tracing::info!(
            total = report.total,
            downloaded = report.downloaded,
            skipped_existing = report.skipped_existing,
            skipped_failed = report.skipped_failed,
            failed = report.failed.len(),
            cancelled = report.cancelled,
            "Fetch batch finished"
        );
        Ok(report)
    }

    /// Run one descriptor's attempt sequence to a final outcome.
    async fn run_task(
        &self,
        descriptor: PackageDescriptor,
        manifest: ManifestPolicy,
    ) -> TaskOutcome {
        if self.cancel.is_cancelled() {
            return TaskOutcome::Cancelled;
        }
        if writer::is_satisfied(&self.root, &descriptor).await {
            tracing::debug!(package = %descriptor, "Already mirrored");
            self.clear_failure(&descriptor);
            return TaskOutcome::SkippedExisting;
        }

        let mut task = DownloadTask::new(descriptor);
        loop {
            task.attempts += 1;
            let error = match self.attempt(&task.descriptor, manifest).await {
                Ok(bytes) => {
                    tracing::debug!(
                        package = %task.descriptor,
                        path = %task.descriptor.local_path,
                        bytes,
                        attempts = task.attempts,
                        "Fetched"
                    );
                    self.clear_failure(&task.descriptor);
                    return TaskOutcome::Downloaded;
                }
                Err(FetchError::Cancelled) => return TaskOutcome::Cancelled,
                Err(FetchError::CircuitOpen)
                    if self.circuit_wait && task.circuit_waits < self.policy.max_attempts =>
                {
                    task.attempts -= 1;
                    task.circuit_waits += 1;
                    tracing::debug!(
                        package = %task.descriptor,
                        waits = task.circuit_waits,
                        "Circuit open, waiting before retrying"
                    );
                    if !self.registry.monitor().wait_for_admission(&self.cancel).await {
                        return TaskOutcome::Cancelled;
                    }
                    continue;
                }
                Err(e) => e,
            };

            let delay = if error.is_transient() {
                self.policy.backoff(task.attempts)
            } else {
                None
            };

            let Some(delay) = delay else {
                tracing::warn!(
                    package = %task.descriptor,
                    attempts = task.attempts,
                    error = %error,
                    "Fetch failed"
                );
                if let Some(store) = &self.store {
                    store.add_failure(&task.descriptor, &error, task.attempts);
                }
                return TaskOutcome::Failed(task.into_failed(error));
            };

            tracing::debug!(
                package = %task.descriptor,
                attempt = task.attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Retrying after backoff"
            );
            task.last_error = Some(error);

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return TaskOutcome::Cancelled,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// One attempt: archive, then manifest where this descriptor owns it.
    ///
    /// Files written by a failed attempt are removed before returning.
    async fn attempt(
        &self,
        descriptor: &PackageDescriptor,
        manifest: ManifestPolicy,
    ) -> FetchResult<u64> {
        let dest = descriptor.destination(&self.root);
        tokio::fs::create_dir_all(&dest)
            .await
            .map_err(|e| FetchError::write(&dest, e))?;

        let archive_path = dest.join(descriptor.archive_file_name());
        let manifest_path = dest.join(MANIFEST_FILE);

        let fetch_archive = !writer::exists(&archive_path).await;
        let write_manifest = match manifest {
            ManifestPolicy::Always => true,
            ManifestPolicy::IfMissing => !writer::exists(&manifest_path).await,
            ManifestPolicy::Never => false,
        };

        let mut bytes = 0;
        if fetch_archive {
            let stream = self.registry.open_stream(&descriptor.archive_url).await?;
            bytes = writer::stream_to_file(stream, &archive_path, &descriptor.version, &self.cancel)
                .await?;
        }

        if write_manifest {
            if let Err(e) = self.fetch_manifest(descriptor, &manifest_path).await {
                if fetch_archive {
                    writer::remove_quietly(&archive_path).await;
                }
                return Err(e);
            }
        }
        Ok(bytes)
    }

    async fn fetch_manifest(
        &self,
        descriptor: &PackageDescriptor,
        manifest_path: &Path,
    ) -> FetchResult<()> {
        if self.cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }
        let url = self.registry.manifest_url(
            &descriptor.name,
            &descriptor.version,
            &descriptor.archive_url,
        );
        let manifest = self.registry.version_manifest(&url).await?;
        writer::write_atomic(manifest_path, &descriptor.version, &manifest).await
    }

    fn clear_failure(&self, descriptor: &PackageDescriptor) {
        if let Some(store) = &self.store {
            if store.remove_on_success(descriptor) {
                tracing::info!(package = %descriptor, "Previously failed package recovered");
            }
        }
    }
}
