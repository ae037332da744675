//! pkgmirror - offline mirrors of npm package archives
//!
//! Reads a resolved dependency lock document, downloads every referenced
//! archive plus its per-version manifest into a directory tree laid out like
//! `node_modules`, and keeps that tree complete across runs.
//!
//! # Architecture
//!
//! ```text
//! LockSource ──► lockfile::extract ──► descriptors
//!                                          │
//!                     version::plan ◄──────┤ (major-line expansion)
//!                                          ▼
//!   failures::FailureIsolationStore ◄── fetch::FetchEngine ──► mirror tree
//!                                          │                       │
//!   network::NetworkHealthMonitor ◄── registry::Registry           │
//!                                                                  ▼
//!                                       audit::audit ──► audit::repair
//! ```
//!
//! [`mirror::MirrorSession`] wires one run together; nothing is global.

pub mod audit;
pub mod config;
pub mod failures;
pub mod fetch;
pub mod lockfile;
pub mod logging;
pub mod mirror;
pub mod network;
pub mod registry;
pub mod version;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
