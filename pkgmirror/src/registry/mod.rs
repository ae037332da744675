//! Registry access.
//!
//! - `http`: transport trait and the reqwest implementation
//! - `client`: registry URL rules, packument parsing, health gating
//! - `types`: registry document types

mod client;
pub(crate) mod http;
mod types;

pub use client::{
    encode_package_name, metadata_url, MonitoredStream, Registry, DEFAULT_REGISTRY_URL,
};
pub use http::{ByteStream, HttpClient, ReqwestClient, DEFAULT_TIMEOUT_SECS};
pub use types::{Dist, Packument, PackumentVersion, LATEST_TAG};
