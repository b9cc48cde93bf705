//! Collaborator contracts
//!
//! This module defines the seams between the core and its collaborators:
//! the persisted snapshot loader/writer and the backend write transaction.
//! The core never performs I/O itself; swapping a collaborator
//! implementation must not break the shredder, overlay or merge engine.

use crate::error::Result;
use crate::meta::{MetaField, MetaScalar, MetaSnapshot};
use crate::rows::DocPartData;
use crate::table_ref::{TableRef, TableRefRegistry};

/// Persisted high-water mark of one row id counter scope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RidHighWaterMark {
    /// Database name
    pub database: String,
    /// Collection name
    pub collection: String,
    /// Table position
    pub table_ref: TableRef,
    /// Next id that would be issued in this scope
    pub next: i64,
}

/// Catalog state materialized by a persistence collaborator at startup
#[derive(Debug)]
pub struct PersistedState {
    /// The committed schema tree
    pub snapshot: MetaSnapshot,
    /// Version token the snapshot was persisted under
    pub version: u64,
    /// Row id counter high-water marks, so restart never reissues ids
    pub rid_marks: Vec<RidHighWaterMark>,
}

/// Loads and persists committed snapshots plus rid high-water marks
///
/// Implementations read/write the backend's catalog tables. `load` interns
/// table positions through the supplied registry so the restored snapshot
/// and the running process agree on `TableRef` indexes.
pub trait SnapshotPersistence: Send + Sync {
    /// Materialize the persisted catalog state, if any exists
    ///
    /// # Errors
    ///
    /// Returns a `Persistence` error when the catalog cannot be read.
    fn load(&self, registry: &TableRefRegistry) -> Result<Option<PersistedState>>;

    /// Persist a newly committed snapshot and the current rid marks
    ///
    /// # Errors
    ///
    /// Returns a `Persistence` error when the catalog cannot be written.
    fn persist(
        &self,
        snapshot: &MetaSnapshot,
        version: u64,
        rid_marks: &[RidHighWaterMark],
    ) -> Result<()>;
}

/// One backend write transaction receiving derived DDL/DML operations
///
/// Operations arrive in ascending table depth for one translated batch:
/// `create_doc_part` before any column or row of that table, parent tables
/// before child tables. Re-declarations are already filtered out by the
/// caller; implementations execute, they do not deduplicate.
pub trait BackendTransaction {
    /// Create the table backing a newly declared doc part
    ///
    /// # Errors
    ///
    /// Returns a `Backend` error when the operation fails.
    fn create_doc_part(
        &mut self,
        database: &str,
        collection: &str,
        identifier: &str,
        table_ref: TableRef,
    ) -> Result<()>;

    /// Add the column backing a newly declared field
    ///
    /// # Errors
    ///
    /// Returns a `Backend` error when the operation fails.
    fn add_field_column(
        &mut self,
        database: &str,
        collection: &str,
        doc_part: &str,
        field: &MetaField,
    ) -> Result<()>;

    /// Add the column backing a newly declared scalar
    ///
    /// # Errors
    ///
    /// Returns a `Backend` error when the operation fails.
    fn add_scalar_column(
        &mut self,
        database: &str,
        collection: &str,
        doc_part: &str,
        scalar: &MetaScalar,
    ) -> Result<()>;

    /// Bulk insert one table's rows
    ///
    /// # Errors
    ///
    /// Returns a `Backend` error when the operation fails.
    fn insert_rows(
        &mut self,
        database: &str,
        collection: &str,
        doc_part: &str,
        rows: &DocPartData,
    ) -> Result<()>;
}
