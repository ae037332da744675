//! Mirror integrity audit.
//!
//! Walks the mirror tree and checks each package directory against its
//! manifest:
//!
//! ```text
//! node_modules/x/
//! ├── package.json      {"name": "x", "version": "2.0.0"}
//! ├── x-1.0.0.tgz
//! └── (x-2.0.0.tgz)     missing -> VersionGap
//! ```
//!
//! [`audit`] only reads. [`repair`] feeds version gaps back through the
//! version planner and the fetch engine as supplementary downloads, and
//! [`IntegrityReport::write_snapshot`] records what is still incomplete.

mod error;
mod repair;
mod report;
mod scanner;

pub use error::{AuditError, AuditResult};
pub use repair::{plan_repairs, repair, RepairSummary};
pub use report::{
    load_snapshot, snapshot_path, IntegrityReport, IssueCategory, PackageIssue, ScanError,
    SnapshotEntry, VersionGap, SNAPSHOT_FILE,
};
pub use scanner::{audit, AuditOptions};
