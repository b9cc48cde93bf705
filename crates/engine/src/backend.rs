//! Backend write derivation
//!
//! Turns one translated batch into "create table" / "add column" /
//! "bulk insert" calls on a `BackendTransaction` collaborator, in ascending
//! table depth so parent tables are always materialized before children.
//!
//! Re-declaration avoidance uses the overlay's current-batch markers: a doc
//! part or column declared by an earlier batch of the same transaction is
//! not declared again. Callers mark the boundary with
//! `MutSnapshot::begin_batch` after each applied batch.

use shale_concurrency::MutCollection;
use shale_core::rows::CollectionData;
use shale_core::traits::BackendTransaction;
use shale_core::{Result, SchemaError};
use tracing::debug;

/// Apply one translated batch to a backend write transaction
///
/// `database` is the owning database's storage identifier; `collection` is
/// the same overlay collection the batch was translated against.
///
/// # Errors
///
/// Propagates the first collaborator error; fails structurally when the
/// batch references a doc part the overlay never declared.
pub fn apply_batch(
    txn: &mut dyn BackendTransaction,
    database: &str,
    collection: &MutCollection,
    data: &CollectionData,
) -> Result<()> {
    for part_data in data.ordered_doc_part_data() {
        let part = collection
            .doc_part(part_data.table_ref())
            .ok_or_else(|| SchemaError::Invariant {
                detail: format!(
                    "batch references undeclared doc part {}",
                    part_data.table_ref()
                ),
            })?;

        if part.created_this_batch() {
            debug!(doc_part = %part.identifier(), "backend create table");
            txn.create_doc_part(
                database,
                collection.identifier(),
                part.identifier(),
                part.table_ref(),
            )?;
        }
        for field in part.fields_added_this_batch() {
            txn.add_field_column(database, collection.identifier(), part.identifier(), field)?;
        }
        for scalar in part.scalars_added_this_batch() {
            txn.add_scalar_column(database, collection.identifier(), part.identifier(), scalar)?;
        }
        if !part_data.is_empty() {
            txn.insert_rows(database, collection.identifier(), part.identifier(), part_data)?;
        }
    }
    Ok(())
}
