//! Lock graph extraction.
//!
//! Turns a resolved dependency manifest into a flat list of
//! [`PackageDescriptor`]s, the unit of work for the fetch engine:
//!
//! - `document`: shape detection (flat vs nested schema)
//! - `extractor`: traversal, sanitization and version validation
//! - `source`: where lock documents come from
//! - `types`: descriptor types
//!
//! # Example
//!
//! ```
//! use pkgmirror::lockfile::extract;
//!
//! let doc = r#"{"packages": {
//!     "": {"name": "app"},
//!     "node_modules/left-pad": {
//!         "version": "1.3.0",
//!         "resolved": "https://registry.npmjs.org/left-pad/-/left-pad-1.3.0.tgz"
//!     }
//! }}"#;
//!
//! let descriptors = extract(doc).unwrap();
//! assert_eq!(descriptors.len(), 1);
//! assert_eq!(descriptors[0].key(), "left-pad@1.3.0");
//! ```

mod document;
mod error;
mod extractor;
mod source;
mod types;

pub use document::{FlatEntry, LockDocument};
pub use error::{LockfileError, LockfileResult};
pub use extractor::{extract, name_from_install_path, sanitize_resolved};
pub use source::{FileLockSource, InlineLockSource, LockSource};
pub use types::{
    archive_extension, package_basename, top_level_path, DescriptorRole, PackageDescriptor,
    DEFAULT_ARCHIVE_EXTENSION,
};
