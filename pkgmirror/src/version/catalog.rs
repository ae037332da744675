//! Per-run version catalog.
//!
//! Each package's registry document is fetched at most once per run, even
//! under concurrent first access: `moka::future::Cache::try_get_with` makes
//! every caller for the same key wait on a single in-flight fetch.
//! Transient registry errors are retried with the run's [`RetryPolicy`];
//! failed fetches are not cached, so a later lookup may try again.

use std::collections::BTreeMap;
use std::sync::Arc;

use moka::future::Cache;
use semver::Version;
use tokio_util::sync::CancellationToken;

use crate::fetch::{FetchError, FetchResult, RetryPolicy};
use crate::registry::{HttpClient, Packument, Registry};

/// Default number of package catalogs kept per run.
pub const DEFAULT_CATALOG_CAPACITY: u64 = 50_000;

/// Known versions of one package.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageCatalog {
    /// Package name.
    pub name: String,
    /// Valid semantic versions, ascending.
    pub versions: Vec<String>,
    /// Archive URL per version, where the registry published one.
    pub tarballs: BTreeMap<String, String>,
    /// Version the `latest` dist-tag points at.
    pub latest: Option<String>,
}

impl PackageCatalog {
    /// Build a catalog from a registry document, dropping invalid versions.
    pub fn from_packument(name: &str, packument: &Packument) -> Self {
        let mut parsed: Vec<Version> = packument
            .versions
            .keys()
            .filter_map(|v| Version::parse(v).ok())
            .collect();
        parsed.sort();

        let versions: Vec<String> = parsed.iter().map(Version::to_string).collect();
        let tarballs = versions
            .iter()
            .filter_map(|v| packument.tarball(v).map(|t| (v.clone(), t.to_string())))
            .collect();

        Self {
            name: name.to_string(),
            versions,
            tarballs,
            latest: packument.latest().map(str::to_string),
        }
    }

    /// Whether the catalog lists a version.
    pub fn contains(&self, version: &str) -> bool {
        self.versions.iter().any(|v| v == version)
    }

    /// Published archive URL for a version.
    pub fn tarball(&self, version: &str) -> Option<&str> {
        self.tarballs.get(version).map(String::as_str)
    }

    /// Resolve a requested version, defaulting to `latest`, then to the
    /// highest known version.
    pub fn resolve(&self, requested: Option<&str>) -> Option<String> {
        match requested {
            Some(version) => self.contains(version).then(|| version.to_string()),
            None => self
                .latest
                .clone()
                .filter(|latest| self.contains(latest))
                .or_else(|| self.versions.last().cloned()),
        }
    }
}

/// Fetch-once cache of package catalogs for one run.
pub struct VersionCatalog<C: HttpClient> {
    registry: Arc<Registry<C>>,
    cache: Cache<String, Arc<PackageCatalog>>,
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl<C: HttpClient> VersionCatalog<C> {
    /// Create an empty catalog backed by the given registry.
    pub fn new(registry: Arc<Registry<C>>) -> Self {
        Self::with_capacity(registry, DEFAULT_CATALOG_CAPACITY)
    }

    /// Create an empty catalog holding at most `capacity` packages.
    pub fn with_capacity(registry: Arc<Registry<C>>, capacity: u64) -> Self {
        Self {
            registry,
            cache: Cache::builder().max_capacity(capacity).build(),
            policy: RetryPolicy::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Set the retry policy for registry lookups (builder pattern).
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Abandon retry backoffs when `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Registry the catalog reads from.
    pub fn registry(&self) -> &Arc<Registry<C>> {
        &self.registry
    }

    /// Catalog for a package, fetching it on first use.
    pub async fn get(&self, name: &str) -> FetchResult<Arc<PackageCatalog>> {
        let registry = Arc::clone(&self.registry);
        let policy = self.policy.clone();
        let cancel = self.cancel.clone();
        let owned = name.to_string();
        self.cache
            .try_get_with(name.to_string(), async move {
                let packument = policy.run(&cancel, || registry.packument(&owned)).await?;
                let catalog = PackageCatalog::from_packument(&owned, &packument);
                tracing::debug!(
                    package = %owned,
                    versions = catalog.versions.len(),
                    "Fetched version catalog"
                );
                Ok::<_, FetchError>(Arc::new(catalog))
            })
            .await
            .map_err(|e| (*e).clone())
    }

    /// Number of catalogs currently cached.
    pub fn cached_count(&self) -> u64 {
        self.cache.entry_count()
    }
}
