//! Core types for the shale schema engine
//!
//! This crate defines the foundational types used throughout the system:
//! - DocValue / DocType: the closed runtime value model the shredder
//!   switches over
//! - TableRef / TableRefRegistry: arena-interned table positions in a
//!   document's nesting tree
//! - Meta model: the immutable schema tree (snapshot → database →
//!   collection → doc part → field/scalar/index) and its builders
//! - IdentifierFactory: deterministic storage identifier derivation
//! - Row carriers: DocPartRow / DocPartData / CollectionData
//! - SchemaError: the structural error taxonomy
//! - Traits: collaborator contracts (SnapshotPersistence, BackendTransaction)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod identifier;
pub mod meta;
pub mod rows;
pub mod table_ref;
pub mod traits;
pub mod value;

// Re-export commonly used types at the crate root
pub use error::{Result, SchemaError};
pub use identifier::{IdentifierConstraints, IdentifierFactory};
pub use meta::{
    CollectionBuilder, DatabaseBuilder, DocPartBuilder, IndexOrdering, MetaCollection,
    MetaDatabase, MetaDocPart, MetaDocPartIndex, MetaDocPartIndexColumn, MetaField, MetaIndex,
    MetaIndexField, MetaScalar, MetaSnapshot, SnapshotBuilder,
};
pub use rows::{CollectionData, ColumnValue, DocPartData, DocPartRow};
pub use table_ref::{TableRef, TableRefKey, TableRefRegistry};
pub use traits::{BackendTransaction, PersistedState, RidHighWaterMark, SnapshotPersistence};
pub use value::{doc_from_json, BinarySubtype, DocObject, DocType, DocValue};
