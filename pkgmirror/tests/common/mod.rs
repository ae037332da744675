//! In-memory registry shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use futures::stream::{self, StreamExt};

use pkgmirror::fetch::{FetchError, FetchResult};
use pkgmirror::lockfile::PackageDescriptor;
use pkgmirror::registry::{ByteStream, HttpClient};

pub const REGISTRY: &str = "https://registry.test";

/// Serves canned bodies and tracks how many requests overlap.
#[derive(Clone, Default)]
pub struct FakeRegistry {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    bodies: Mutex<HashMap<String, Bytes>>,
    errors: Mutex<HashMap<String, FetchError>>,
    flaky: Mutex<HashMap<String, (usize, FetchError)>>,
    calls: Mutex<HashMap<String, usize>>,
    latency: Mutex<Duration>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl FakeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(self, latency: Duration) -> Self {
        *self.inner.latency.lock().unwrap() = latency;
        self
    }

    pub fn serve(&self, url: &str, body: impl Into<Bytes>) {
        self.inner
            .bodies
            .lock()
            .unwrap()
            .insert(url.to_string(), body.into());
    }

    pub fn fail(&self, url: &str, error: FetchError) {
        self.inner
            .errors
            .lock()
            .unwrap()
            .insert(url.to_string(), error);
    }

    /// Fail the next `times` requests for `url`, then respond normally.
    pub fn fail_times(&self, url: &str, times: usize, error: FetchError) {
        self.inner
            .flaky
            .lock()
            .unwrap()
            .insert(url.to_string(), (times, error));
    }

    pub fn heal(&self, url: &str) {
        self.inner.errors.lock().unwrap().remove(url);
    }

    /// Serve archive and version manifest for `name@version`.
    pub fn publish(&self, name: &str, version: &str) {
        self.serve(&archive_url(name, version), format!("{}-{}", name, version));
        self.serve(
            &format!("{}/{}/{}", REGISTRY, name, version),
            format!(r#"{{"name":"{}","version":"{}"}}"#, name, version),
        );
    }

    /// Serve a packument listing `versions`.
    pub fn packument(&self, name: &str, versions: &[&str], latest: &str) {
        let listed: Vec<String> = versions.iter().map(|v| format!(r#""{}":{{}}"#, v)).collect();
        self.serve(
            &format!("{}/{}", REGISTRY, name),
            format!(
                r#"{{"name":"{}","dist-tags":{{"latest":"{}"}},"versions":{{{}}}}}"#,
                name,
                latest,
                listed.join(",")
            ),
        );
    }

    pub fn calls(&self, url: &str) -> usize {
        self.inner.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.inner.calls.lock().unwrap().values().sum()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.inner.peak.load(Ordering::SeqCst)
    }

    async fn respond(&self, url: &str) -> FetchResult<Bytes> {
        *self
            .inner
            .calls
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default() += 1;

        let now = self.inner.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.peak.fetch_max(now, Ordering::SeqCst);

        let latency = *self.inner.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let flaky = match self.inner.flaky.lock().unwrap().get_mut(url) {
            Some((remaining, error)) if *remaining > 0 => {
                *remaining -= 1;
                Some(error.clone())
            }
            _ => None,
        };
        let error = flaky.or_else(|| self.inner.errors.lock().unwrap().get(url).cloned());
        let body = self.inner.bodies.lock().unwrap().get(url).cloned();
        self.inner.in_flight.fetch_sub(1, Ordering::SeqCst);

        match (error, body) {
            (Some(e), _) => Err(e),
            (None, Some(body)) => Ok(body),
            (None, None) => Err(FetchError::HttpStatus {
                url: url.to_string(),
                status: 404,
            }),
        }
    }
}

impl HttpClient for FakeRegistry {
    async fn get_bytes(&self, url: &str) -> FetchResult<Bytes> {
        self.respond(url).await
    }

    async fn get_stream(&self, url: &str) -> FetchResult<ByteStream> {
        let body = self.respond(url).await?;
        Ok(stream::iter(vec![Ok(body)]).boxed())
    }
}

pub fn archive_url(name: &str, version: &str) -> String {
    format!("{0}/{1}/-/{1}-{2}.tgz", REGISTRY, name, version)
}

pub fn descriptor(name: &str, version: &str) -> PackageDescriptor {
    PackageDescriptor::new(
        name,
        version,
        archive_url(name, version),
        format!("node_modules/{}", name),
    )
}

pub fn unavailable(url: &str) -> FetchError {
    FetchError::HttpStatus {
        url: url.to_string(),
        status: 503,
    }
}

pub fn connection_reset(url: &str) -> FetchError {
    FetchError::Connection {
        url: url.to_string(),
        reason: "connection reset".to_string(),
    }
}
