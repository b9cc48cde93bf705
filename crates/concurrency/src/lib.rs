//! Concurrency layer for the shale schema engine
//!
//! This crate implements optimistic schema evolution:
//! - MutSnapshot and friends: the transaction-local copy-on-write overlay
//! - SchemaRepository: multi-version publication of immutable snapshots
//! - Merge engine: reconciliation of concurrent schema deltas at commit
//!
//! A transaction wraps the current snapshot in an overlay, discovers new
//! tables/fields through it while shredding, and hands the overlay back to
//! `SchemaRepository::commit`, which either publishes a replacement
//! snapshot or reports the first merge conflict.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod merge;
pub mod overlay;
pub mod repository;

pub use merge::{merge_snapshot, CommitError, ConflictReason, EntityKind, MergeConflict};
pub use overlay::{
    ChangeState, CollectionDelta, DatabaseDelta, IndexDelta, MutCollection, MutDatabase,
    MutDocPart, MutSnapshot, RemovedEntity,
};
pub use repository::{SchemaRepository, SnapshotVersion, SnapshotView};
