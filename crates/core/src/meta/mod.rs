//! Schema meta model
//!
//! The immutable, committed form of the schema tree
//! (snapshot → database → collection → doc part → field/scalar/index)
//! and the builders the merge engine uses to produce a replacement
//! snapshot.
//!
//! Immutable entities are shared via `Arc` and never mutated after
//! publication; a commit supersedes the whole snapshot instead.

mod builder;
mod model;

pub use builder::{CollectionBuilder, DatabaseBuilder, DocPartBuilder, SnapshotBuilder};
pub use model::{
    IndexOrdering, MetaCollection, MetaDatabase, MetaDocPart, MetaDocPartIndex,
    MetaDocPartIndexColumn, MetaField, MetaIndex, MetaIndexField, MetaScalar, MetaSnapshot,
};
