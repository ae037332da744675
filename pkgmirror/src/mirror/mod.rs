//! Mirror runs.
//!
//! ```text
//! LockSource ─► extract ─► descriptors ─► expand_major_lines (optional)
//!                                              │
//!                                              ▼
//!            MirrorSession::download_with_retries
//!              main pass  (skip_failed, concurrency 30)
//!              retry 1..2 (failed keys only, concurrency 10)
//!                                              │
//!                                              ▼
//!                        MirrorSummary (+ failed-packages.json)
//! ```

mod config;
mod error;
mod expand;
mod session;

pub use config::MirrorConfig;
pub use error::{MirrorError, MirrorResult};
pub use expand::{expand_major_lines, MajorLineExpansion};
pub use session::{MirrorSession, MirrorSummary};
