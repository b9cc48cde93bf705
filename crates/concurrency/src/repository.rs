//! Multi-version schema repository
//!
//! Holds exactly one "current" immutable snapshot, published under a
//! version token. Readers retain the `Arc` they were handed and are never
//! blocked by a commit; commits are serialized against each other and
//! merge against the latest snapshot, not the one the transaction read.
//!
//! A conflicting commit leaves the repository untouched.

use crate::merge::{merge_snapshot, CommitError};
use crate::overlay::MutSnapshot;
use parking_lot::{Mutex, RwLock};
use shale_core::meta::MetaSnapshot;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Token identifying one published snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SnapshotVersion(pub u64);

impl fmt::Display for SnapshotVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A snapshot-isolated read view
///
/// Cloning is cheap (`Arc` clone); the view stays valid for as long as the
/// holder keeps it, regardless of later commits.
#[derive(Debug, Clone)]
pub struct SnapshotView {
    version: SnapshotVersion,
    snapshot: Arc<MetaSnapshot>,
}

impl SnapshotView {
    /// Version token this view was published under
    pub fn version(&self) -> SnapshotVersion {
        self.version
    }

    /// The immutable schema tree
    pub fn snapshot(&self) -> &Arc<MetaSnapshot> {
        &self.snapshot
    }
}

/// The repository of committed schema snapshots
pub struct SchemaRepository {
    current: RwLock<SnapshotView>,
    commit_lock: Mutex<()>,
}

impl Default for SchemaRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaRepository {
    /// Create a repository holding an empty snapshot at version 0
    pub fn new() -> Self {
        SchemaRepository {
            current: RwLock::new(SnapshotView {
                version: SnapshotVersion(0),
                snapshot: Arc::new(MetaSnapshot::empty()),
            }),
            commit_lock: Mutex::new(()),
        }
    }

    /// Create a repository seeded from persisted catalog state
    ///
    /// Used at startup together with a `SnapshotPersistence` collaborator;
    /// the rid generator is seeded separately from the same state.
    pub fn restore(snapshot: MetaSnapshot, version: u64) -> Self {
        SchemaRepository {
            current: RwLock::new(SnapshotView {
                version: SnapshotVersion(version),
                snapshot: Arc::new(snapshot),
            }),
            commit_lock: Mutex::new(()),
        }
    }

    /// The current read view
    pub fn snapshot(&self) -> SnapshotView {
        self.current.read().clone()
    }

    /// The current version token
    pub fn version(&self) -> SnapshotVersion {
        self.current.read().version
    }

    /// Create a transaction-local overlay over the current snapshot
    pub fn create_overlay(&self) -> MutSnapshot {
        let view = self.snapshot();
        MutSnapshot::new(Arc::clone(view.snapshot()), view.version().0)
    }

    /// Merge an overlay's deltas and publish the replacement snapshot
    ///
    /// The single mutating entry point. Serialized with respect to other
    /// commits; merges against the latest snapshot, which may be newer than
    /// the one the overlay was created from. On conflict the repository is
    /// left untouched and the first conflict encountered is returned.
    ///
    /// An overlay with no recorded changes publishes nothing and returns
    /// the current version.
    ///
    /// # Errors
    ///
    /// `CommitError::Conflict` on an irreconcilable concurrent change,
    /// `CommitError::Structural` on an invariant violation.
    pub fn commit(&self, overlay: MutSnapshot) -> Result<SnapshotVersion, CommitError> {
        let _serialized = self.commit_lock.lock();
        let latest = self.snapshot();

        if !overlay.is_dirty() {
            debug!(version = %latest.version(), "empty overlay, nothing to commit");
            return Ok(latest.version());
        }

        let merged = merge_snapshot(latest.snapshot(), &overlay).map_err(|e| {
            if let CommitError::Conflict(conflict) = &e {
                warn!(
                    read_version = overlay.base_version(),
                    latest_version = %latest.version(),
                    %conflict,
                    "commit aborted on merge conflict"
                );
            }
            e
        })?;

        let next = SnapshotVersion(latest.version().0 + 1);
        *self.current.write() = SnapshotView {
            version: next,
            snapshot: Arc::new(merged),
        };
        info!(
            version = %next,
            read_version = overlay.base_version(),
            "committed schema snapshot"
        );
        Ok(next)
    }
}
