//! Configuration for a mirror run.

use std::path::PathBuf;
use std::time::Duration;

use crate::config::{ConfigFile, DEFAULT_CONCURRENCY, DEFAULT_RETRY_CONCURRENCY};
use crate::fetch::RetryPolicy;
use crate::network::MonitorConfig;
use crate::registry::{DEFAULT_REGISTRY_URL, DEFAULT_TIMEOUT_SECS};

/// Configuration for a mirror run.
#[derive(Debug, Clone)]
pub struct MirrorConfig {
    /// Mirror root directory.
    pub root: PathBuf,

    /// Registry base URL.
    pub registry_url: String,

    /// HTTP request timeout.
    pub timeout: Duration,

    /// Concurrency of the main pass.
    pub concurrency: usize,

    /// Concurrency of retry rounds.
    pub retry_concurrency: usize,

    /// Whether to add the newest release of every major line.
    pub all_majors: bool,

    /// Per-task retry policy.
    pub retry_policy: RetryPolicy,

    /// Health monitor and circuit breaker settings.
    pub monitor: MonitorConfig,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("mirror"),
            registry_url: DEFAULT_REGISTRY_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            concurrency: DEFAULT_CONCURRENCY,
            retry_concurrency: DEFAULT_RETRY_CONCURRENCY,
            all_majors: true,
            retry_policy: RetryPolicy::default(),
            monitor: MonitorConfig::default(),
        }
    }
}

impl MirrorConfig {
    /// Create a configuration for the given mirror root.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Default::default()
        }
    }

    /// Set the registry URL.
    pub fn with_registry_url(mut self, url: impl Into<String>) -> Self {
        self.registry_url = url.into();
        self
    }

    /// Set the HTTP timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the main-pass concurrency.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Set the retry-round concurrency.
    pub fn with_retry_concurrency(mut self, concurrency: usize) -> Self {
        self.retry_concurrency = concurrency.max(1);
        self
    }

    /// Enable or disable major-line expansion.
    pub fn with_all_majors(mut self, all_majors: bool) -> Self {
        self.all_majors = all_majors;
        self
    }

    /// Set the per-task retry policy.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Set the circuit breaker cooldown.
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.monitor = self.monitor.with_cooldown(cooldown);
        self
    }
}

impl From<&ConfigFile> for MirrorConfig {
    fn from(file: &ConfigFile) -> Self {
        Self::new(file.mirror.directory.clone())
            .with_registry_url(file.registry.url.clone())
            .with_timeout(Duration::from_secs(file.registry.timeout_secs))
            .with_concurrency(file.mirror.concurrency)
            .with_retry_concurrency(file.mirror.retry_concurrency)
            .with_all_majors(file.mirror.all_majors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MirrorConfig::default();
        assert_eq!(config.concurrency, 30);
        assert_eq!(config.retry_concurrency, 10);
        assert!(config.all_majors);
        assert_eq!(config.retry_policy.max_attempts, 3);
    }

    #[test]
    fn test_builder_pattern() {
        let config = MirrorConfig::new("/srv/mirror")
            .with_registry_url("https://npm.internal")
            .with_concurrency(0)
            .with_all_majors(false)
            .with_cooldown(Duration::from_secs(5));

        assert_eq!(config.root, PathBuf::from("/srv/mirror"));
        assert_eq!(config.registry_url, "https://npm.internal");
        assert_eq!(config.concurrency, 1);
        assert!(!config.all_majors);
        assert_eq!(config.monitor.breaker.cooldown, Duration::from_secs(5));
    }

    #[test]
    fn test_from_config_file() {
        let mut file = ConfigFile::default();
        file.mirror.retry_concurrency = 3;
        file.registry.timeout_secs = 15;

        let config = MirrorConfig::from(&file);
        assert_eq!(config.retry_concurrency, 3);
        assert_eq!(config.timeout, Duration::from_secs(15));
    }
}
