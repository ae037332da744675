//! Version planning.
//!
//! - `planner`: pure target-set computation (requested version plus the
//!   newest release of each major line)
//! - `catalog`: per-run, fetch-once cache of registry version lists

mod catalog;
mod planner;

pub use catalog::{PackageCatalog, VersionCatalog, DEFAULT_CATALOG_CAPACITY};
pub use planner::{highest, plan, plan_missing};
