//! npm-compatible registry client.
//!
//! Wraps an [`HttpClient`] with registry URL rules and gates every request
//! through the run's [`NetworkHealthMonitor`].

use std::sync::Arc;

use bytes::Bytes;
use futures::StreamExt;

use super::http::{ByteStream, HttpClient};
use super::types::Packument;
use crate::fetch::{FetchError, FetchResult};
use crate::lockfile::{package_basename, DEFAULT_ARCHIVE_EXTENSION};
use crate::network::{NetworkHealthMonitor, NetworkPermit};

/// Default public registry.
pub const DEFAULT_REGISTRY_URL: &str = "https://registry.npmjs.org";

/// Separator between package path and archive file in registry archive URLs.
const ARCHIVE_SEPARATOR: &str = "/-/";

/// Encode a package name for use in a registry URL path.
///
/// Scoped names keep their `@` and have the slash escaped: `@s/n` → `@s%2fn`.
pub fn encode_package_name(name: &str) -> String {
    if name.starts_with('@') {
        name.replacen('/', "%2f", 1)
    } else {
        name.to_string()
    }
}

/// Derive the version metadata URL from an archive URL.
///
/// `https://r/a/-/a-1.0.0.tgz` → `https://r/a/1.0.0`. Returns `None` when the
/// URL does not follow the registry archive layout.
pub fn metadata_url(archive_url: &str, version: &str) -> Option<String> {
    archive_url
        .find(ARCHIVE_SEPARATOR)
        .map(|idx| format!("{}/{}", &archive_url[..idx], version))
}

/// Registry access for one run.
pub struct Registry<C: HttpClient> {
    client: C,
    base_url: String,
    monitor: Arc<NetworkHealthMonitor>,
}

impl<C: HttpClient> Registry<C> {
    /// Create a registry client.
    ///
    /// A trailing slash on `base_url` is ignored.
    pub fn new(client: C, base_url: &str, monitor: Arc<NetworkHealthMonitor>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            monitor,
        }
    }

    /// Registry base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Health monitor gating this registry.
    pub fn monitor(&self) -> &Arc<NetworkHealthMonitor> {
        &self.monitor
    }

    /// `{registry}/{name}`
    pub fn package_url(&self, name: &str) -> String {
        format!("{}/{}", self.base_url, encode_package_name(name))
    }

    /// `{registry}/{name}/{version}`
    pub fn version_url(&self, name: &str, version: &str) -> String {
        format!("{}/{}", self.package_url(name), version)
    }

    /// Conventional archive location, used when a version document carries
    /// no tarball URL.
    pub fn archive_url(&self, name: &str, version: &str) -> String {
        format!(
            "{}/{}/-/{}-{}.{}",
            self.base_url,
            name,
            package_basename(name),
            version,
            DEFAULT_ARCHIVE_EXTENSION
        )
    }

    /// Metadata URL for a descriptor: derived from its archive URL when
    /// possible, otherwise built from the registry base.
    pub fn manifest_url(&self, name: &str, version: &str, archive_url: &str) -> String {
        metadata_url(archive_url, version).unwrap_or_else(|| self.version_url(name, version))
    }

    /// Fetch and parse a package document.
    pub async fn packument(&self, name: &str) -> FetchResult<Packument> {
        let url = self.package_url(name);
        let body = self.get_bytes(&url).await?;
        serde_json::from_slice(&body).map_err(|e| FetchError::MalformedPayload {
            url,
            reason: e.to_string(),
        })
    }

    /// Fetch a version manifest and check that it is a JSON object.
    ///
    /// Returns the raw bytes so the manifest can be stored unmodified.
    pub async fn version_manifest(&self, url: &str) -> FetchResult<Bytes> {
        let body = self.get_bytes(url).await?;
        match serde_json::from_slice::<serde_json::Value>(&body) {
            Ok(serde_json::Value::Object(_)) => Ok(body),
            Ok(_) => Err(FetchError::MalformedPayload {
                url: url.to_string(),
                reason: "expected a JSON object".to_string(),
            }),
            Err(e) => Err(FetchError::MalformedPayload {
                url: url.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    /// GET a URL through the health monitor.
    pub async fn get_bytes(&self, url: &str) -> FetchResult<Bytes> {
        let permit = self.monitor.acquire()?;
        let result = self.client.get_bytes(url).await;
        settle(permit, &result);
        result
    }

    /// Open a streaming GET through the health monitor.
    ///
    /// The returned stream holds the network permit; its sample is recorded
    /// when [`MonitoredStream::settle`] is called with the transfer outcome.
    pub async fn open_stream(&self, url: &str) -> FetchResult<MonitoredStream> {
        let permit = self.monitor.acquire()?;
        match self.client.get_stream(url).await {
            Ok(inner) => Ok(MonitoredStream {
                inner,
                permit: Some(permit),
            }),
            Err(e) => {
                permit.finish(e.is_network_failure());
                Err(e)
            }
        }
    }
}

/// Streaming response body paired with its network permit.
pub struct MonitoredStream {
    inner: ByteStream,
    permit: Option<NetworkPermit>,
}

impl MonitoredStream {
    /// Next body chunk, or `None` at the end of the body.
    pub async fn next_chunk(&mut self) -> Option<FetchResult<Bytes>> {
        self.inner.next().await
    }

    /// Record the transfer outcome with the health monitor.
    ///
    /// A cancelled transfer records nothing; an unfinished probe is then
    /// treated as failed when the permit drops.
    pub fn settle<T>(mut self, result: &FetchResult<T>) {
        if let Some(permit) = self.permit.take() {
            settle(permit, result);
        }
    }
}

fn settle<T>(permit: NetworkPermit, result: &FetchResult<T>) {
    match result {
        Ok(_) => permit.finish(false),
        Err(FetchError::Cancelled) => drop(permit),
        Err(e) => permit.finish(e.is_network_failure()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{CircuitState, MonitorConfig};
    use crate::registry::http::tests::MockHttpClient;

    fn registry(mock: MockHttpClient) -> Registry<MockHttpClient> {
        Registry::new(
            mock,
            "https://r/",
            Arc::new(NetworkHealthMonitor::new(MonitorConfig::default())),
        )
    }

    #[test]
    fn test_encode_scoped_name() {
        assert_eq!(encode_package_name("@babel/core"), "@babel%2fcore");
        assert_eq!(encode_package_name("lodash"), "lodash");
    }

    #[test]
    fn test_urls() {
        let reg = registry(MockHttpClient::new());
        assert_eq!(reg.package_url("@s/n"), "https://r/@s%2fn");
        assert_eq!(reg.version_url("a", "1.0.0"), "https://r/a/1.0.0");
        assert_eq!(reg.archive_url("@s/n", "1.0.0"), "https://r/@s/n/-/n-1.0.0.tgz");
    }

    #[test]
    fn test_metadata_url() {
        assert_eq!(
            metadata_url("https://r/@s/n/-/n-1.0.0.tgz", "1.0.0").as_deref(),
            Some("https://r/@s/n/1.0.0")
        );
        assert_eq!(metadata_url("https://cdn/a-1.0.0.tgz", "1.0.0"), None);
    }

    #[test]
    fn test_manifest_url_fallback() {
        let reg = registry(MockHttpClient::new());
        assert_eq!(
            reg.manifest_url("a", "1.0.0", "https://cdn/a-1.0.0.tgz"),
            "https://r/a/1.0.0"
        );
    }

    #[tokio::test]
    async fn test_packument() {
        let mock = MockHttpClient::new().with(
            "https://r/a",
            r#"{"dist-tags":{"latest":"2.0.0"},"versions":{"2.0.0":{}}}"#,
        );
        let doc = registry(mock).packument("a").await.unwrap();
        assert_eq!(doc.latest(), Some("2.0.0"));
    }

    #[tokio::test]
    async fn test_packument_malformed() {
        let mock = MockHttpClient::new().with("https://r/a", "<html>");
        let err = registry(mock).packument("a").await.unwrap_err();
        assert!(matches!(err, FetchError::MalformedPayload { .. }));
    }

    #[tokio::test]
    async fn test_version_manifest_must_be_object() {
        let mock = MockHttpClient::new()
            .with("https://r/a/1.0.0", r#"{"name":"a","version":"1.0.0"}"#)
            .with("https://r/a/2.0.0", "[1]");
        let reg = registry(mock);
        assert!(reg.version_manifest("https://r/a/1.0.0").await.is_ok());
        assert!(reg.version_manifest("https://r/a/2.0.0").await.is_err());
    }

    #[tokio::test]
    async fn test_requests_are_sampled() {
        let reg = registry(MockHttpClient::new().with("https://r/a", "{}"));
        reg.get_bytes("https://r/a").await.unwrap();
        let _ = reg.get_bytes("https://r/missing").await;
        assert_eq!(reg.monitor().total_samples(), 2);
        // A 404 is not a network failure.
        assert_eq!(reg.monitor().window_error_rate(), 0.0);
    }

    #[tokio::test]
    async fn test_open_circuit_skips_transport() {
        let mock = MockHttpClient::new().with("https://r/a", "{}");
        let reg = registry(mock);
        for _ in 0..21 {
            reg.monitor().record_sample(10, true);
        }
        assert_eq!(reg.monitor().circuit_state(), CircuitState::Open);

        let err = reg.get_bytes("https://r/a").await.unwrap_err();
        assert!(matches!(err, FetchError::CircuitOpen));
        assert_eq!(reg.client.calls(), 0);
    }
}
