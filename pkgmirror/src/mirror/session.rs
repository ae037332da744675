//! Mirror run orchestration.
//!
//! A [`MirrorSession`] owns everything one run shares: the health monitor,
//! the failure store, the version catalog and the registry client. Nothing
//! is global; two sessions never observe each other's state.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::config::MirrorConfig;
use super::error::{MirrorError, MirrorResult};
use super::expand::{expand_major_lines, MajorLineExpansion};
use crate::failures::{failure_manifest_path, FailureIsolationStore};
use crate::fetch::{BatchReport, FetchEngine, ProgressCallback};
use crate::lockfile::{extract, top_level_path, LockSource, PackageDescriptor};
use crate::network::NetworkHealthMonitor;
use crate::registry::{HttpClient, Registry, ReqwestClient};
use crate::version::{plan, VersionCatalog};

/// Outcome of a mirror run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MirrorSummary {
    /// Descriptors scheduled (lock graph plus expansion).
    pub total: usize,
    /// Supplementary descriptors added by major-line expansion.
    pub expanded: usize,
    /// Packages whose major lines could not be expanded.
    pub unexpanded: Vec<String>,
    /// Residual failures the previous run in this mirror left behind.
    pub previously_failed: usize,
    /// Descriptors downloaded during this run.
    pub downloaded: usize,
    /// Descriptors already present before this run.
    pub skipped_existing: usize,
    /// Descriptors still failing after the last retry round.
    pub failed: usize,
    /// Descriptors not completed because the run was cancelled.
    pub cancelled: usize,
    /// Retry rounds used after the main pass.
    pub rounds: u32,
    /// Failure manifest written for residual failures.
    pub failure_manifest: Option<PathBuf>,
}

impl MirrorSummary {
    /// Descriptors whose files are in place.
    pub fn succeeded(&self) -> usize {
        self.downloaded + self.skipped_existing
    }

    /// Whether the run left nothing behind.
    pub fn is_complete(&self) -> bool {
        self.failed == 0 && self.cancelled == 0 && self.unexpanded.is_empty()
    }

    fn absorb(&mut self, report: &BatchReport) {
        self.downloaded += report.downloaded;
        self.skipped_existing += report.skipped_existing;
    }
}

/// One mirror run's shared state.
pub struct MirrorSession<C: HttpClient> {
    config: MirrorConfig,
    registry: Arc<Registry<C>>,
    store: Arc<FailureIsolationStore>,
    catalog: VersionCatalog<C>,
    cancel: CancellationToken,
    progress: Option<ProgressCallback>,
}

impl MirrorSession<ReqwestClient> {
    /// Create a session talking to the configured registry over HTTP.
    pub fn connect(config: MirrorConfig) -> MirrorResult<Self> {
        let client = ReqwestClient::with_timeout(config.timeout.as_secs())?;
        Ok(Self::with_client(client, config))
    }
}

impl<C: HttpClient> MirrorSession<C> {
    /// Create a session over an arbitrary HTTP client.
    pub fn with_client(client: C, config: MirrorConfig) -> Self {
        let monitor = Arc::new(NetworkHealthMonitor::new(config.monitor.clone()));
        let registry = Arc::new(Registry::new(client, &config.registry_url, monitor));
        let catalog = VersionCatalog::new(Arc::clone(&registry))
            .with_retry_policy(config.retry_policy.clone());
        let store = Arc::new(FailureIsolationStore::for_mirror(&config.root));

        Self {
            config,
            registry,
            store,
            catalog,
            cancel: CancellationToken::new(),
            progress: None,
        }
    }

    /// Use an external cancellation token.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.catalog = self.catalog.with_cancellation(cancel.clone());
        self.cancel = cancel;
        self
    }

    /// Report per-task progress.
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Run configuration.
    pub fn config(&self) -> &MirrorConfig {
        &self.config
    }

    /// Network health monitor of this run.
    pub fn monitor(&self) -> &Arc<NetworkHealthMonitor> {
        self.registry.monitor()
    }

    /// Failure store of this run.
    pub fn store(&self) -> &Arc<FailureIsolationStore> {
        &self.store
    }

    /// Version catalog of this run.
    pub fn catalog(&self) -> &VersionCatalog<C> {
        &self.catalog
    }

    /// Registry client of this run.
    pub fn registry(&self) -> &Arc<Registry<C>> {
        &self.registry
    }

    /// Cancellation token observed by every batch of this run.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Fetch engine wired to this session's store, registry and token.
    pub fn engine(&self) -> FetchEngine<C> {
        let engine = FetchEngine::new(Arc::clone(&self.registry), self.config.root.clone())
            .with_retry_policy(self.config.retry_policy.clone())
            .with_failure_store(Arc::clone(&self.store))
            .with_cancellation(self.cancel.clone());
        match &self.progress {
            Some(callback) => engine.with_progress(Arc::clone(callback)),
            None => engine,
        }
    }

    /// Load a lock document from `source` and mirror it.
    pub async fn mirror_source(&self, source: &dyn LockSource) -> MirrorResult<MirrorSummary> {
        tracing::info!(source = %source.describe(), "Loading lock document");
        let document = source.load()?;
        let descriptors = extract(&document)?;
        self.mirror_lock(descriptors).await
    }

    /// Mirror an extracted lock graph.
    pub async fn mirror_lock(
        &self,
        mut descriptors: Vec<PackageDescriptor>,
    ) -> MirrorResult<MirrorSummary> {
        let mut expansion = MajorLineExpansion::default();
        if self.config.all_majors {
            expansion =
                expand_major_lines(&descriptors, &self.catalog, self.config.concurrency).await;
            descriptors.extend(expansion.added.iter().cloned());
        }

        let mut summary = self.download_with_retries(descriptors).await?;
        summary.expanded = expansion.added.len();
        summary.unexpanded = expansion.skipped;
        Ok(summary)
    }

    /// Mirror one package by name.
    ///
    /// `version` defaults to the `latest` dist-tag. With major-line expansion
    /// enabled the newest release of every other major is mirrored too, all
    /// under `node_modules/<name>`.
    pub async fn mirror_package(
        &self,
        name: &str,
        version: Option<&str>,
    ) -> MirrorResult<MirrorSummary> {
        let package = self.catalog.get(name).await?;
        if package.versions.is_empty() {
            return Err(MirrorError::PackageNotFound {
                name: name.to_string(),
            });
        }
        let current = package
            .resolve(version)
            .ok_or_else(|| MirrorError::VersionNotFound {
                name: name.to_string(),
                version: version.unwrap_or("latest").to_string(),
            })?;

        let targets = if self.config.all_majors {
            plan(&current, &package.versions)
        } else {
            vec![current.clone()]
        };

        let path = top_level_path(name);
        let descriptors: Vec<PackageDescriptor> = targets
            .into_iter()
            .map(|v| {
                let archive_url = package
                    .tarball(&v)
                    .map(str::to_string)
                    .unwrap_or_else(|| self.registry.archive_url(name, &v));
                let descriptor = PackageDescriptor::new(name, v.as_str(), archive_url, path.as_str());
                if v == current {
                    descriptor
                } else {
                    descriptor.supplementary()
                }
            })
            .collect();

        let expanded = descriptors.len().saturating_sub(1);
        let mut summary = self.download_with_retries(descriptors).await?;
        summary.expanded = expanded;
        Ok(summary)
    }

    /// Main pass plus bounded retry rounds over `descriptors`.
    ///
    /// The failure store is reset first. Each retry round starts once the
    /// circuit breaker admits traffic, and its tasks wait out breaker
    /// refusals rather than spending attempts on them. Residual failures are
    /// written to `failed-packages.json` in the mirror root.
    pub async fn download_with_retries(
        &self,
        descriptors: Vec<PackageDescriptor>,
    ) -> MirrorResult<MirrorSummary> {
        let previously_failed = self.previous_failures();
        self.store.reset_for_new_session();
        let engine = self.engine();
        let retry_engine = engine.clone().with_circuit_wait(true);

        let mut summary = MirrorSummary {
            total: descriptors.len(),
            previously_failed,
            ..MirrorSummary::default()
        };

        let main = engine
            .download_all(descriptors, self.config.concurrency, true)
            .await?;
        summary.absorb(&main);
        summary.cancelled = main.cancelled;

        while self.store.can_retry() && !self.store.is_empty() && !self.cancel.is_cancelled() {
            if let Some(wait) = self.monitor().admission_delay() {
                tracing::info!(
                    wait_ms = wait.as_millis() as u64,
                    "Circuit breaker open, delaying retry round"
                );
            }
            if !self.monitor().wait_for_admission(&self.cancel).await {
                break;
            }

            let round = self.store.increment_round();
            let retry = self.store.retry_descriptors();
            tracing::info!(
                round,
                packages = retry.len(),
                concurrency = self.config.retry_concurrency,
                "Starting retry round"
            );

            let report = retry_engine
                .download_all(retry, self.config.retry_concurrency, false)
                .await?;
            summary.absorb(&report);
            summary.rounds = round;
            if report.cancelled > 0 {
                summary.cancelled += report.cancelled;
                break;
            }
        }

        summary.failed = self.store.retry_descriptors().len();
        self.finish_run(&mut summary);
        Ok(summary)
    }

    /// Residual failures recorded by the previous run, read before the
    /// store is reset.
    fn previous_failures(&self) -> usize {
        let Some(path) = self.store.state_path() else {
            return 0;
        };
        let previous = FailureIsolationStore::load(path).retry_descriptors().len();
        if previous > 0 {
            tracing::info!(
                count = previous,
                path = %path.display(),
                "Previous run left residual failures"
            );
        }
        previous
    }

    fn finish_run(&self, summary: &mut MirrorSummary) {
        if let Err(e) = self.store.persist() {
            tracing::warn!(error = %e, "Failed to persist failure store");
        }

        let manifest = failure_manifest_path(&self.config.root);
        if self.store.is_empty() {
            if manifest.exists() {
                if let Err(e) = std::fs::remove_file(&manifest) {
                    tracing::warn!(path = %manifest.display(), error = %e, "Failed to remove stale failure manifest");
                }
            }
        } else {
            match self.store.write_failure_manifest(&manifest) {
                Ok(_) => summary.failure_manifest = Some(manifest),
                Err(e) => tracing::warn!(error = %e, "Failed to write failure manifest"),
            }
        }

        tracing::info!(
            total = summary.total,
            downloaded = summary.downloaded,
            skipped_existing = summary.skipped_existing,
            failed = summary.failed,
            cancelled = summary.cancelled,
            rounds = summary.rounds,
            "Mirror run finished"
        );
    }
}
