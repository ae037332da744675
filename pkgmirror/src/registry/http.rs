//! HTTP client abstraction for testability.

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};

use crate::fetch::{FetchError, FetchResult};

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Response body delivered chunk by chunk.
pub type ByteStream = BoxStream<'static, FetchResult<Bytes>>;

/// Trait for HTTP client operations.
///
/// Allows the registry and fetch engine to run against an in-memory
/// transport in tests. Implementations must map non-success statuses to
/// [`FetchError::HttpStatus`].
pub trait HttpClient: Send + Sync + 'static {
    /// Performs a GET request and buffers the whole body.
    fn get_bytes(&self, url: &str) -> impl Future<Output = FetchResult<Bytes>> + Send;

    /// Performs a GET request and returns the body as a stream once the
    /// response headers have arrived.
    fn get_stream(&self, url: &str) -> impl Future<Output = FetchResult<ByteStream>> + Send;
}

/// Real HTTP client implementation using reqwest.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Creates a new ReqwestClient with default configuration.
    pub fn new() -> FetchResult<Self> {
        Self::with_timeout(DEFAULT_TIMEOUT_SECS)
    }

    /// Creates a new ReqwestClient with custom timeout.
    pub fn with_timeout(timeout_secs: u64) -> FetchResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(concat!("pkgmirror/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Connection {
                url: String::new(),
                reason: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self { client })
    }

    async fn send(&self, url: &str) -> FetchResult<reqwest::Response> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }
}

impl HttpClient for ReqwestClient {
    async fn get_bytes(&self, url: &str) -> FetchResult<Bytes> {
        self.send(url)
            .await?
            .bytes()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))
    }

    async fn get_stream(&self, url: &str) -> FetchResult<ByteStream> {
        let response = self.send(url).await?;
        let url = url.to_string();

        let body = stream::unfold(Some(response), move |state| {
            let url = url.clone();
            async move {
                let mut response = state?;
                match response.chunk().await {
                    Ok(Some(chunk)) => Some((Ok(chunk), Some(response))),
                    Ok(None) => None,
                    Err(e) => Some((
                        Err(FetchError::Stream {
                            url,
                            reason: e.to_string(),
                        }),
                        None,
                    )),
                }
            }
        });

        Ok(body.boxed())
    }
}
