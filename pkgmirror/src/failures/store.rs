//! Failure isolation store.
//!
//! Keys that exhausted their attempt budget are recorded here so the main
//! pass can skip them and the bounded retry rounds can revisit them at
//! lower concurrency.
//!
//! # Thread Safety
//!
//! Records live in a `DashMap`, so fetch tasks of one round add and remove
//! entries concurrently without a global lock. The round counter is atomic.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use super::error::{FailureStoreError, FailureStoreResult};
use super::record::{FailureManifestEntry, FailureRecord};
use crate::fetch::FetchError;
use crate::lockfile::PackageDescriptor;

/// Maximum number of retry rounds after the main pass.
pub const MAX_RETRY_ROUNDS: u32 = 2;

/// Directory under the mirror root holding tool state.
pub const STATE_DIR: &str = ".pkgmirror";

/// Persisted session file name inside [`STATE_DIR`].
pub const SESSION_FILE: &str = "session.json";

/// Failure manifest file name in the mirror root.
pub const FAILURE_MANIFEST_FILE: &str = "failed-packages.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct SessionState {
    round: u32,
    records: Vec<FailureRecord>,
}

/// Per-run record of persistently failing keys.
#[derive(Debug, Default)]
pub struct FailureIsolationStore {
    records: DashMap<String, FailureRecord>,
    round: AtomicU32,
    state_path: Option<PathBuf>,
}

impl FailureIsolationStore {
    /// Create an in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store that persists to `<root>/.pkgmirror/session.json`.
    pub fn for_mirror(root: &Path) -> Self {
        Self {
            state_path: Some(session_path(root)),
            ..Self::default()
        }
    }

    /// Load a persisted store.
    ///
    /// A missing or unreadable file yields an empty store bound to `path`;
    /// persistence problems never fail a run.
    pub fn load(path: &Path) -> Self {
        let state = match fs::read(path) {
            Ok(bytes) => match serde_json::from_slice::<SessionState>(&bytes) {
                Ok(state) => state,
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Ignoring corrupt failure store"
                    );
                    SessionState::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => SessionState::default(),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Failure store unreadable, starting empty"
                );
                SessionState::default()
            }
        };

        let records = state
            .records
            .into_iter()
            .map(|record| (record.key.clone(), record))
            .collect();

        Self {
            records,
            round: AtomicU32::new(state.round),
            state_path: Some(path.to_path_buf()),
        }
    }

    /// Record a task that exhausted its attempts in the current round.
    pub fn add_failure(&self, descriptor: &PackageDescriptor, error: &FetchError, attempts: u32) {
        let round = self.current_round();
        let message = error.to_string();
        self.records
            .entry(descriptor.key())
            .and_modify(|record| record.merge(descriptor, message.clone(), round, attempts))
            .or_insert_with(|| {
                FailureRecord::new(descriptor.clone(), message.clone(), round, attempts)
            });

        tracing::debug!(
            package = %descriptor,
            round,
            attempts,
            error = %error,
            "Recorded failure"
        );
    }

    /// Whether a key is recorded as failed.
    pub fn is_failed(&self, key: &str) -> bool {
        self.records.contains_key(key)
    }

    /// Forget a descriptor's install path after it succeeded.
    ///
    /// Other failing paths of the same key stay recorded; the key is removed
    /// once no failing path remains. Returns whether this path was recorded.
    pub fn remove_on_success(&self, descriptor: &PackageDescriptor) -> bool {
        let Entry::Occupied(mut entry) = self.records.entry(descriptor.key()) else {
            return false;
        };
        let record = entry.get_mut();
        if !record.forget_path(&descriptor.local_path) {
            return false;
        }
        if record.is_resolved() {
            entry.remove();
        }
        true
    }

    /// Snapshot of all records, ordered by key.
    pub fn all_failures(&self) -> Vec<FailureRecord> {
        let mut records: Vec<FailureRecord> =
            self.records.iter().map(|entry| entry.value().clone()).collect();
        records.sort_by(|a, b| a.key.cmp(&b.key));
        records
    }

    /// Every descriptor to re-attempt in the next retry round.
    pub fn retry_descriptors(&self) -> Vec<PackageDescriptor> {
        self.all_failures()
            .iter()
            .flat_map(|record| record.descriptors().cloned().collect::<Vec<_>>())
            .collect()
    }

    /// Number of failed keys.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no key is recorded.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Whether another retry round is allowed.
    pub fn can_retry(&self) -> bool {
        self.current_round() < MAX_RETRY_ROUNDS
    }

    /// Advance to the next retry round and return it.
    pub fn increment_round(&self) -> u32 {
        self.round.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Current round (0 = main pass).
    pub fn current_round(&self) -> u32 {
        self.round.load(Ordering::SeqCst)
    }

    /// Clear all records and the round counter at the start of a run.
    pub fn reset_for_new_session(&self) {
        self.records.clear();
        self.round.store(0, Ordering::SeqCst);
    }

    /// Where this store persists, if anywhere.
    pub fn state_path(&self) -> Option<&Path> {
        self.state_path.as_deref()
    }

    /// Persist the store to its state path. A store without one is a no-op.
    pub fn persist(&self) -> FailureStoreResult<()> {
        let Some(path) = &self.state_path else {
            return Ok(());
        };
        let state = SessionState {
            round: self.current_round(),
            records: self.all_failures(),
        };
        let json = serde_json::to_vec_pretty(&state)?;
        write_json(path, &json)
    }

    /// Write the operator-facing manifest of residual failures.
    ///
    /// Returns the number of entries written.
    pub fn write_failure_manifest(&self, path: &Path) -> FailureStoreResult<usize> {
        let entries: Vec<FailureManifestEntry> = self
            .all_failures()
            .iter()
            .map(FailureManifestEntry::from)
            .collect();
        let json = serde_json::to_vec_pretty(&entries)?;
        write_json(path, &json)?;

        tracing::info!(
            path = %path.display(),
            count = entries.len(),
            "Wrote failure manifest"
        );
        Ok(entries.len())
    }
}

/// `<root>/.pkgmirror/session.json`
pub fn session_path(root: &Path) -> PathBuf {
    root.join(STATE_DIR).join(SESSION_FILE)
}

/// `<root>/failed-packages.json`
pub fn failure_manifest_path(root: &Path) -> PathBuf {
    root.join(FAILURE_MANIFEST_FILE)
}

fn write_json(path: &Path, json: &[u8]) -> FailureStoreResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| FailureStoreError::io(parent, e))?;
    }
    let temp = path.with_extension("json.tmp");
    fs::write(&temp, json).map_err(|e| FailureStoreError::io(&temp, e))?;
    fs::rename(&temp, path).map_err(|e| FailureStoreError::io(path, e))
}
