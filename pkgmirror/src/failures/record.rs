//! Failure record types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::lockfile::PackageDescriptor;

/// A task key that exhausted its attempt budget.
///
/// Several install paths may share one `name@version` key; the first
/// failing descriptor is kept in `descriptor`, the others in `also_at`, so a
/// retry round re-fetches every affected path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    /// `name@version`
    pub key: String,
    /// First failing descriptor for this key.
    pub descriptor: PackageDescriptor,
    /// Other install paths with the same key.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub also_at: Vec<PackageDescriptor>,
    /// Most recent error message.
    pub error: String,
    /// Retry round in which the key last failed (0 = main pass).
    pub retry_round: u32,
    /// Attempts used in the most recent failing round.
    pub attempts: u32,
    /// When the key first failed in this session.
    pub first_seen_at: DateTime<Utc>,
    #[serde(skip)]
    resolved: bool,
}

impl FailureRecord {
    /// Create a record for a first failure.
    pub fn new(descriptor: PackageDescriptor, error: String, retry_round: u32, attempts: u32) -> Self {
        Self {
            key: descriptor.key(),
            descriptor,
            also_at: Vec::new(),
            error,
            retry_round,
            attempts,
            first_seen_at: Utc::now(),
            resolved: false,
        }
    }

    /// Every descriptor recorded under this key.
    pub fn descriptors(&self) -> impl Iterator<Item = &PackageDescriptor> {
        std::iter::once(&self.descriptor).chain(self.also_at.iter())
    }

    /// Fold a later failure of the same key into this record.
    pub(crate) fn merge(
        &mut self,
        descriptor: &PackageDescriptor,
        error: String,
        retry_round: u32,
        attempts: u32,
    ) {
        if !self.descriptors().any(|d| d == descriptor) {
            self.also_at.push(descriptor.clone());
        }
        self.error = error;
        self.retry_round = retry_round;
        self.attempts = attempts;
    }

    /// Drop the install path `local_path` from this record.
    ///
    /// Returns whether the path was recorded. When the first descriptor goes,
    /// the next extra path takes its place; if it was the only path the
    /// record is left as is and [`is_resolved`](Self::is_resolved) turns true.
    pub(crate) fn forget_path(&mut self, local_path: &str) -> bool {
        if let Some(idx) = self.also_at.iter().position(|d| d.local_path == local_path) {
            self.also_at.remove(idx);
            return true;
        }
        if self.descriptor.local_path != local_path || self.resolved {
            return false;
        }
        if self.also_at.is_empty() {
            self.resolved = true;
        } else {
            self.descriptor = self.also_at.remove(0);
        }
        true
    }

    /// Whether every recorded path has since succeeded.
    pub(crate) fn is_resolved(&self) -> bool {
        self.resolved
    }
}

/// One line of the failure manifest handed to the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureManifestEntry {
    /// Package name.
    pub name: String,
    /// Package version.
    pub version: String,
    /// Archive URL that could not be fetched.
    pub resolved: String,
    /// Final error message.
    pub error: String,
    /// Attempts used in the final round.
    pub attempts: u32,
}

impl From<&FailureRecord> for FailureManifestEntry {
    fn from(record: &FailureRecord) -> Self {
        Self {
            name: record.descriptor.name.clone(),
            version: record.descriptor.version.clone(),
            resolved: record.descriptor.archive_url.clone(),
            error: record.error.clone(),
            attempts: record.attempts,
        }
    }
}
