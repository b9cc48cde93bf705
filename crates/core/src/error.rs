//! Error types for the schema engine core
//!
//! This module defines the structural error taxonomy used throughout the
//! system. We use `thiserror` for automatic `Display` and `Error` trait
//! implementations.
//!
//! Structural errors are programming-contract violations (duplicate key
//! insertion, inconsistent row linkage) or resource exhaustion. They abort
//! the current transaction and are never retried. Merge conflicts are a
//! separate, expected outcome of optimistic commits and live in
//! `shale-concurrency`.

use crate::value::DocType;
use thiserror::Error;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, SchemaError>;

/// Structural error taxonomy for the schema engine
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchemaError {
    /// A document-level name could not be turned into a storage identifier
    #[error("invalid name {name:?}: {reason}")]
    InvalidName {
        /// The offending document-level name
        name: String,
        /// Why it was rejected
        reason: String,
    },

    /// A database with the same name or identifier already exists
    #[error("duplicate database {name:?} (identifier {identifier:?})")]
    DuplicateDatabase {
        /// Logical database name
        name: String,
        /// Storage identifier
        identifier: String,
    },

    /// A collection with the same name or identifier already exists in the database
    #[error("duplicate collection {name:?} (identifier {identifier:?}) in database {database:?}")]
    DuplicateCollection {
        /// Owning database name
        database: String,
        /// Logical collection name
        name: String,
        /// Storage identifier
        identifier: String,
    },

    /// A doc part with the same table position or identifier already exists
    #[error("duplicate doc part at {path:?} (identifier {identifier:?}) in collection {collection:?}")]
    DuplicateDocPart {
        /// Owning collection name
        collection: String,
        /// Table position path
        path: String,
        /// Storage identifier
        identifier: String,
    },

    /// A field with the same (name, type) pair or identifier already exists in the doc part
    #[error("duplicate field {name:?} of type {field_type:?} in doc part {doc_part:?}")]
    DuplicateField {
        /// Owning doc part identifier
        doc_part: String,
        /// Document attribute name
        name: String,
        /// Runtime value type of the column
        field_type: DocType,
    },

    /// A scalar column of the same type or identifier already exists in the doc part
    #[error("duplicate scalar of type {scalar_type:?} in doc part {doc_part:?}")]
    DuplicateScalar {
        /// Owning doc part identifier
        doc_part: String,
        /// Runtime value type of the scalar column
        scalar_type: DocType,
    },

    /// An index with the same name or identifier already exists in its scope
    #[error("duplicate index {name:?}")]
    DuplicateIndex {
        /// Index name or identifier
        name: String,
    },

    /// A referenced entity does not exist
    #[error("unknown {kind} {name:?}")]
    NotFound {
        /// Entity kind ("database", "collection", ...)
        kind: &'static str,
        /// The name that failed to resolve
        name: String,
    },

    /// Row linkage invariant violated (did/rid/pid/seq consistency)
    #[error("inconsistent row linkage: {detail}")]
    InconsistentRow {
        /// What exactly is inconsistent
        detail: String,
    },

    /// An internal invariant was violated (never expected in normal operation)
    #[error("invariant violated: {detail}")]
    Invariant {
        /// What was violated
        detail: String,
    },

    /// Row id space exhausted for one (database, collection, table) scope
    #[error("row id space exhausted for {database}.{collection} at {path}")]
    RidExhausted {
        /// Database name
        database: String,
        /// Collection name
        collection: String,
        /// Table position path
        path: String,
    },

    /// Snapshot persistence collaborator failed
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Backend write transaction collaborator failed
    #[error("backend error: {0}")]
    Backend(String),
}
