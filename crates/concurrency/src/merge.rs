//! Merge engine
//!
//! Reconciles one transaction's overlay deltas against the *latest*
//! committed snapshot, which may differ from the snapshot the transaction
//! originally read. The schema is treated as a 4-level tree (database →
//! collection → doc part → field/scalar/index); each level classifies a
//! change context into a closed strategy enum and executes it with an
//! exhaustive match, first applicable predicate wins:
//!
//! 1. same-id-other-name  → hard conflict (a concurrent rename cannot be
//!    reconciled automatically; identifier equality is checked before name
//!    equality because identifiers are the storage-stable key)
//! 2. same-name-other-id  → hard conflict
//! 3. not-found-on-remove → no-op (idempotent concurrent delete)
//! 4. new entity          → deep-build and insert into the parent builder
//! 5. unchanged           → no-op
//! 6. modified children   → recurse per child delta into a builder seeded
//!    from the committed entity, splice the result back
//!
//! The first conflict anywhere aborts the whole merge; the dotted path in
//! the error is assembled while unwinding, so the success path never pays
//! for error-message construction.

use crate::overlay::{
    ChangeState, CollectionDelta, DatabaseDelta, IndexDelta, MutCollection, MutDatabase,
    MutDocPart, MutSnapshot,
};
use shale_core::meta::{
    CollectionBuilder, DatabaseBuilder, DocPartBuilder, MetaCollection, MetaDatabase, MetaDocPart,
    MetaDocPartIndex, MetaField, MetaScalar, MetaSnapshot, SnapshotBuilder,
};
use shale_core::SchemaError;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Level of the schema tree a conflict was detected at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    /// Database level
    Database,
    /// Collection level
    Collection,
    /// Doc part level
    DocPart,
    /// Field leaf
    Field,
    /// Scalar leaf
    Scalar,
    /// Collection-level logical index leaf
    Index,
    /// Doc-part-level index leaf
    DocPartIndex,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EntityKind::Database => "database",
            EntityKind::Collection => "collection",
            EntityKind::DocPart => "doc part",
            EntityKind::Field => "field",
            EntityKind::Scalar => "scalar",
            EntityKind::Index => "index",
            EntityKind::DocPartIndex => "doc part index",
        };
        f.write_str(s)
    }
}

/// Why two schema identities cannot be reconciled
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConflictReason {
    /// The identifier is committed under a different name
    #[error("identifier {identifier:?} is committed under name {committed_name:?}, requested name {requested_name:?}")]
    SameIdOtherName {
        /// The contested storage identifier
        identifier: String,
        /// Name the committed entity carries
        committed_name: String,
        /// Name the transaction requested
        requested_name: String,
    },
    /// The name is committed under a different identifier
    #[error("name {name:?} is committed under identifier {committed_identifier:?}, requested identifier {requested_identifier:?}")]
    SameNameOtherId {
        /// The contested name
        name: String,
        /// Identifier the committed entity carries
        committed_identifier: String,
        /// Identifier the transaction requested
        requested_identifier: String,
    },
    /// An index name is committed with a different definition
    #[error("index {name:?} is committed with a different definition")]
    SameNameOtherDefinition {
        /// The contested index name
        name: String,
    },
}

/// A detected incompatibility between a delta and the latest snapshot
///
/// Carries the entity kind, the dotted path from the root, and both
/// conflicting identities, so the caller can retry the whole transaction
/// against the new snapshot or surface the conflict to the end user.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind} conflict at {path}: {reason}")]
pub struct MergeConflict {
    /// Level the conflict was detected at
    pub kind: EntityKind,
    /// Dotted path (`database.collection.docpart`) down to the entity
    pub path: String,
    /// The incompatibility itself
    pub reason: ConflictReason,
}

impl MergeConflict {
    fn new(kind: EntityKind, reason: ConflictReason) -> Self {
        MergeConflict {
            kind,
            // filled in while unwinding
            path: String::new(),
            reason,
        }
    }

    fn under(mut self, segment: &str) -> Self {
        if self.path.is_empty() {
            self.path = segment.to_string();
        } else {
            self.path = format!("{segment}.{}", self.path);
        }
        self
    }
}

/// Error surfaced by a commit attempt
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CommitError {
    /// Expected outcome of optimistic concurrency; retry against the new
    /// snapshot or surface to the caller
    #[error("merge conflict: {0}")]
    Conflict(#[from] MergeConflict),
    /// Invariant violation; fatal for the transaction, never retried
    #[error(transparent)]
    Structural(#[from] SchemaError),
}

impl CommitError {
    fn under(self, segment: &str) -> Self {
        match self {
            CommitError::Conflict(conflict) => CommitError::Conflict(conflict.under(segment)),
            structural => structural,
        }
    }
}

// ============================================================================
// Strategy selection
// ============================================================================

/// Strategy selected for one ADD/MODIFY change context
#[derive(Debug, PartialEq, Eq)]
enum UpsertAction {
    /// Hard conflict, abort the merge
    Conflict(ConflictReason),
    /// No committed match: deep-build and insert
    Insert,
    /// Committed match with no child deltas: no-op
    Unchanged,
    /// Committed match with child deltas: recurse and splice
    MergeChildren,
}

/// Strategy selected for one REMOVE change context
#[derive(Debug, PartialEq, Eq)]
enum RemoveAction {
    /// Hard conflict, abort the merge
    Conflict(ConflictReason),
    /// Already removed by a concurrent transaction: no-op
    NotFound,
    /// Delete from the parent builder
    Delete,
}

/// First-applicable classification shared by the named container levels
///
/// `committed_by_id` / `committed_by_name` are the (name, identifier) pairs
/// of the committed entities found under the delta's identifier and name.
fn classify_upsert(
    committed_by_id: Option<(&str, &str)>,
    committed_by_name: Option<(&str, &str)>,
    name: &str,
    identifier: &str,
    has_child_deltas: bool,
) -> UpsertAction {
    if let Some((committed_name, _)) = committed_by_id {
        if committed_name != name {
            return UpsertAction::Conflict(ConflictReason::SameIdOtherName {
                identifier: identifier.to_string(),
                committed_name: committed_name.to_string(),
                requested_name: name.to_string(),
            });
        }
    }
    if let Some((_, committed_identifier)) = committed_by_name {
        if committed_identifier != identifier {
            return UpsertAction::Conflict(ConflictReason::SameNameOtherId {
                name: name.to_string(),
                committed_identifier: committed_identifier.to_string(),
                requested_identifier: identifier.to_string(),
            });
        }
    }
    if committed_by_name.is_none() {
        return UpsertAction::Insert;
    }
    if !has_child_deltas {
        return UpsertAction::Unchanged;
    }
    UpsertAction::MergeChildren
}

fn classify_remove(
    committed_by_id: Option<(&str, &str)>,
    committed_by_name: Option<(&str, &str)>,
    name: &str,
    identifier: &str,
) -> RemoveAction {
    if let Some((committed_name, _)) = committed_by_id {
        if committed_name != name {
            return RemoveAction::Conflict(ConflictReason::SameIdOtherName {
                identifier: identifier.to_string(),
                committed_name: committed_name.to_string(),
                requested_name: name.to_string(),
            });
        }
    }
    if let Some((_, committed_identifier)) = committed_by_name {
        if committed_identifier != identifier {
            return RemoveAction::Conflict(ConflictReason::SameNameOtherId {
                name: name.to_string(),
                committed_identifier: committed_identifier.to_string(),
                requested_identifier: identifier.to_string(),
            });
        }
    }
    if committed_by_id.is_none() && committed_by_name.is_none() {
        return RemoveAction::NotFound;
    }
    RemoveAction::Delete
}

fn missing_delta(kind: EntityKind, name: &str) -> CommitError {
    // Reaching this means a non-removal delta carried no entity, which the
    // overlay cannot produce: the unreachable default of the strategy list.
    CommitError::Structural(SchemaError::Invariant {
        detail: format!("{kind} delta for {name:?} carries no entity"),
    })
}

// ============================================================================
// Merge, root down
// ============================================================================

/// Merge one overlay's deltas into `base`, producing the replacement snapshot
///
/// `base` must be the latest committed snapshot at the time of the call;
/// commit serialization is the repository's concern.
pub fn merge_snapshot(
    base: &MetaSnapshot,
    overlay: &MutSnapshot,
) -> Result<MetaSnapshot, CommitError> {
    let mut root = SnapshotBuilder::from_committed(base);
    for delta in overlay.changes() {
        merge_database(&mut root, &delta).map_err(|e| e.under(delta.name))?;
    }
    Ok(root.build())
}

fn merge_database(
    root: &mut SnapshotBuilder,
    delta: &DatabaseDelta<'_>,
) -> Result<(), CommitError> {
    let committed_by_id = root
        .database_by_identifier(delta.identifier)
        .map(|db| (db.name().to_string(), db.identifier().to_string()));
    let committed_by_name = root
        .database_by_name(delta.name)
        .map(|db| (db.name().to_string(), db.identifier().to_string()));
    let by_id = committed_by_id
        .as_ref()
        .map(|(n, i)| (n.as_str(), i.as_str()));
    let by_name = committed_by_name
        .as_ref()
        .map(|(n, i)| (n.as_str(), i.as_str()));

    match delta.state {
        ChangeState::Added | ChangeState::Modified => {
            let database = delta
                .database
                .ok_or_else(|| missing_delta(EntityKind::Database, delta.name))?;
            let child_deltas = database.changes();
            match classify_upsert(
                by_id,
                by_name,
                delta.name,
                delta.identifier,
                !child_deltas.is_empty(),
            ) {
                UpsertAction::Conflict(reason) => {
                    Err(MergeConflict::new(EntityKind::Database, reason).into())
                }
                UpsertAction::Insert => {
                    let built = build_database(database)?;
                    root.insert_database(Arc::new(built))?;
                    Ok(())
                }
                UpsertAction::Unchanged => Ok(()),
                UpsertAction::MergeChildren => {
                    let committed = root
                        .database_by_name(delta.name)
                        .cloned()
                        .ok_or_else(|| missing_delta(EntityKind::Database, delta.name))?;
                    let mut builder = DatabaseBuilder::from_committed(&committed);
                    for child in child_deltas {
                        merge_collection(&mut builder, &child)
                            .map_err(|e| e.under(child.name))?;
                    }
                    root.put_database(Arc::new(builder.build()));
                    Ok(())
                }
            }
        }
        ChangeState::Removed => {
            match classify_remove(by_id, by_name, delta.name, delta.identifier) {
                RemoveAction::Conflict(reason) => {
                    Err(MergeConflict::new(EntityKind::Database, reason).into())
                }
                RemoveAction::NotFound => Ok(()),
                RemoveAction::Delete => {
                    root.remove_database(delta.name);
                    Ok(())
                }
            }
        }
    }
}

fn merge_collection(
    parent: &mut DatabaseBuilder,
    delta: &CollectionDelta<'_>,
) -> Result<(), CommitError> {
    let committed_by_id = parent
        .collection_by_identifier(delta.identifier)
        .map(|c| (c.name().to_string(), c.identifier().to_string()));
    let committed_by_name = parent
        .collection_by_name(delta.name)
        .map(|c| (c.name().to_string(), c.identifier().to_string()));
    let by_id = committed_by_id
        .as_ref()
        .map(|(n, i)| (n.as_str(), i.as_str()));
    let by_name = committed_by_name
        .as_ref()
        .map(|(n, i)| (n.as_str(), i.as_str()));

    match delta.state {
        ChangeState::Added | ChangeState::Modified => {
            let collection = delta
                .collection
                .ok_or_else(|| missing_delta(EntityKind::Collection, delta.name))?;
            let has_children = collection.doc_part_changes().next().is_some()
                || !collection.index_changes().is_empty();
            match classify_upsert(by_id, by_name, delta.name, delta.identifier, has_children) {
                UpsertAction::Conflict(reason) => {
                    Err(MergeConflict::new(EntityKind::Collection, reason).into())
                }
                UpsertAction::Insert => {
                    let built = build_collection(collection)?;
                    parent.insert_collection(Arc::new(built))?;
                    Ok(())
                }
                UpsertAction::Unchanged => Ok(()),
                UpsertAction::MergeChildren => {
                    let committed = parent
                        .collection_by_name(delta.name)
                        .cloned()
                        .ok_or_else(|| missing_delta(EntityKind::Collection, delta.name))?;
                    let mut builder = CollectionBuilder::from_committed(&committed);
                    for part in collection.doc_part_changes() {
                        merge_doc_part(&mut builder, part)
                            .map_err(|e| e.under(part.identifier()))?;
                    }
                    for index in collection.index_changes() {
                        merge_index(&mut builder, &index)?;
                    }
                    parent.put_collection(Arc::new(builder.build()));
                    Ok(())
                }
            }
        }
        ChangeState::Removed => {
            match classify_remove(by_id, by_name, delta.name, delta.identifier) {
                RemoveAction::Conflict(reason) => {
                    Err(MergeConflict::new(EntityKind::Collection, reason).into())
                }
                RemoveAction::NotFound => Ok(()),
                RemoveAction::Delete => {
                    parent.remove_collection(delta.name);
                    Ok(())
                }
            }
        }
    }
}

fn merge_doc_part(parent: &mut CollectionBuilder, part: &MutDocPart) -> Result<(), CommitError> {
    // Doc parts are append-only in the overlay, so the change state here is
    // always ADD/MODIFY. The "name" of a doc part is its table position.
    let committed_by_id = parent.doc_part_by_identifier(part.identifier()).cloned();
    let committed_by_ref = parent.doc_part_by_ref(part.table_ref()).cloned();

    if let Some(committed) = &committed_by_id {
        if committed.table_ref() != part.table_ref() {
            return Err(MergeConflict::new(
                EntityKind::DocPart,
                ConflictReason::SameIdOtherName {
                    identifier: part.identifier().to_string(),
                    committed_name: committed.table_ref().to_string(),
                    requested_name: part.table_ref().to_string(),
                },
            )
            .into());
        }
    }
    if let Some(committed) = &committed_by_ref {
        if committed.identifier() != part.identifier() {
            return Err(MergeConflict::new(
                EntityKind::DocPart,
                ConflictReason::SameNameOtherId {
                    name: part.table_ref().to_string(),
                    committed_identifier: committed.identifier().to_string(),
                    requested_identifier: part.identifier().to_string(),
                },
            )
            .into());
        }
    }

    match committed_by_ref {
        None => {
            // New doc part
            let built = build_doc_part(part)?;
            parent.insert_doc_part(Arc::new(built))?;
            Ok(())
        }
        Some(committed) => {
            if part.added_fields().is_empty()
                && part.added_scalars().is_empty()
                && part.added_indexes().is_empty()
            {
                // Unchanged shortcut
                return Ok(());
            }
            let mut builder = DocPartBuilder::from_committed(&committed);
            for field in part.added_fields() {
                merge_field(&mut builder, field)?;
            }
            for scalar in part.added_scalars() {
                merge_scalar(&mut builder, scalar)?;
            }
            for index in part.added_indexes() {
                merge_doc_part_index(&mut builder, index)?;
            }
            parent.put_doc_part(Arc::new(builder.build()));
            Ok(())
        }
    }
}

// Leaf levels: fields, scalars and indexes have no children to recurse
// into; the same strategy shape collapses to conflict / no-op / insert.

fn merge_field(parent: &mut DocPartBuilder, field: &Arc<MetaField>) -> Result<(), CommitError> {
    let render = |f: &MetaField| format!("{}:{}", f.name, f.field_type);
    if let Some(committed) = parent.field_by_identifier(&field.identifier) {
        if committed.name != field.name || committed.field_type != field.field_type {
            return Err(MergeConflict::new(
                EntityKind::Field,
                ConflictReason::SameIdOtherName {
                    identifier: field.identifier.clone(),
                    committed_name: render(committed),
                    requested_name: render(field),
                },
            )
            .under(&field.identifier)
            .into());
        }
        // same identifier, same (name, type): already committed
        return Ok(());
    }
    if let Some(committed) = parent.field_by_name_and_type(&field.name, field.field_type) {
        // the identifier lookup above missed, so the identifiers differ
        return Err(MergeConflict::new(
            EntityKind::Field,
            ConflictReason::SameNameOtherId {
                name: render(field),
                committed_identifier: committed.identifier.clone(),
                requested_identifier: field.identifier.clone(),
            },
        )
        .under(&field.identifier)
        .into());
    }
    parent.insert_field(Arc::clone(field))?;
    Ok(())
}

fn merge_scalar(parent: &mut DocPartBuilder, scalar: &Arc<MetaScalar>) -> Result<(), CommitError> {
    if let Some(committed) = parent.scalar_by_identifier(&scalar.identifier) {
        if committed.scalar_type != scalar.scalar_type {
            return Err(MergeConflict::new(
                EntityKind::Scalar,
                ConflictReason::SameIdOtherName {
                    identifier: scalar.identifier.clone(),
                    committed_name: committed.scalar_type.to_string(),
                    requested_name: scalar.scalar_type.to_string(),
                },
            )
            .under(&scalar.identifier)
            .into());
        }
        return Ok(());
    }
    if let Some(committed) = parent.scalar_by_type(scalar.scalar_type) {
        return Err(MergeConflict::new(
            EntityKind::Scalar,
            ConflictReason::SameNameOtherId {
                name: scalar.scalar_type.to_string(),
                committed_identifier: committed.identifier.clone(),
                requested_identifier: scalar.identifier.clone(),
            },
        )
        .under(&scalar.identifier)
        .into());
    }
    parent.insert_scalar(Arc::clone(scalar))?;
    Ok(())
}

fn merge_doc_part_index(
    parent: &mut DocPartBuilder,
    index: &Arc<MetaDocPartIndex>,
) -> Result<(), CommitError> {
    if let Some(committed) = parent.index_by_identifier(&index.identifier) {
        if committed.unique != index.unique || committed.columns != index.columns {
            return Err(MergeConflict::new(
                EntityKind::DocPartIndex,
                ConflictReason::SameNameOtherDefinition {
                    name: index.identifier.clone(),
                },
            )
            .under(&index.identifier)
            .into());
        }
        return Ok(());
    }
    parent.insert_index(Arc::clone(index))?;
    Ok(())
}

fn merge_index(parent: &mut CollectionBuilder, delta: &IndexDelta<'_>) -> Result<(), CommitError> {
    match delta {
        IndexDelta::Added(index) => {
            if let Some(committed) = parent.index_by_name(&index.name) {
                if committed.unique != index.unique || committed.fields != index.fields {
                    return Err(MergeConflict::new(
                        EntityKind::Index,
                        ConflictReason::SameNameOtherDefinition {
                            name: index.name.clone(),
                        },
                    )
                    .under(&index.name)
                    .into());
                }
                // identical concurrent creation: no-op
                return Ok(());
            }
            parent.insert_index(Arc::clone(index))?;
            Ok(())
        }
        IndexDelta::Removed(removed) => {
            // idempotent: already-absent indexes were removed concurrently
            parent.remove_index(&removed.name);
            Ok(())
        }
    }
}

// ============================================================================
// Deep builds for the new-entity strategy
// ============================================================================

fn build_doc_part(part: &MutDocPart) -> Result<MetaDocPart, CommitError> {
    let mut builder = match part.base() {
        Some(base) => DocPartBuilder::from_committed(base),
        None => DocPartBuilder::new(part.table_ref(), part.identifier()),
    };
    for field in part.added_fields() {
        builder.insert_field(Arc::clone(field))?;
    }
    for scalar in part.added_scalars() {
        builder.insert_scalar(Arc::clone(scalar))?;
    }
    for index in part.added_indexes() {
        builder.insert_index(Arc::clone(index))?;
    }
    Ok(builder.build())
}

fn build_collection(collection: &MutCollection) -> Result<MetaCollection, CommitError> {
    let mut builder = match collection.base() {
        Some(base) => CollectionBuilder::from_committed(base),
        None => CollectionBuilder::new(collection.name(), collection.identifier()),
    };
    for part in collection.doc_part_changes() {
        builder.put_doc_part(Arc::new(build_doc_part(part)?));
    }
    for index in collection.index_changes() {
        match index {
            IndexDelta::Added(added) => builder.insert_index(Arc::clone(added))?,
            IndexDelta::Removed(removed) => {
                builder.remove_index(&removed.name);
            }
        }
    }
    Ok(builder.build())
}

fn build_database(database: &MutDatabase) -> Result<MetaDatabase, CommitError> {
    let mut builder = match database.base() {
        Some(base) => DatabaseBuilder::from_committed(base),
        None => DatabaseBuilder::new(database.name(), database.identifier()),
    };
    for delta in database.changes() {
        match delta.state {
            ChangeState::Removed => {
                builder.remove_collection(delta.name);
            }
            ChangeState::Added | ChangeState::Modified => {
                let collection = delta
                    .collection
                    .ok_or_else(|| missing_delta(EntityKind::Collection, delta.name))?;
                builder.put_collection(Arc::new(build_collection(collection)?));
            }
        }
    }
    Ok(builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use shale_core::value::DocType;
    use shale_core::TableRef;

    fn committed_snapshot(collections: &[(&str, &str)]) -> MetaSnapshot {
        let mut db = DatabaseBuilder::new("db", "db");
        for (name, identifier) in collections {
            db.insert_collection(Arc::new(CollectionBuilder::new(*name, *identifier).build()))
                .unwrap();
        }
        let mut snap = SnapshotBuilder::new();
        snap.insert_database(Arc::new(db.build())).unwrap();
        snap.build()
    }

    fn overlay_adding_collection(
        base: &Arc<MetaSnapshot>,
        name: &str,
        identifier: &str,
    ) -> MutSnapshot {
        let mut overlay = MutSnapshot::new(Arc::clone(base), 1);
        overlay
            .database_mut("db")
            .unwrap()
            .add_collection(name, identifier.to_string())
            .unwrap();
        overlay
    }

    #[test]
    fn test_new_collection_is_inserted() {
        let base = Arc::new(committed_snapshot(&[("a", "x")]));
        let overlay = overlay_adding_collection(&base, "b", "y");
        let merged = merge_snapshot(&base, &overlay).unwrap();
        let db = merged.database_by_name("db").unwrap();
        assert!(db.collection_by_name("a").is_some());
        assert!(db.collection_by_name("b").is_some());
    }

    #[test]
    fn test_same_id_other_name_conflict() {
        let base = Arc::new(committed_snapshot(&[("a", "x")]));
        let overlay = overlay_adding_collection(&base, "b", "x");
        let err = merge_snapshot(&base, &overlay).unwrap_err();
        match err {
            CommitError::Conflict(conflict) => {
                assert_eq!(conflict.kind, EntityKind::Collection);
                assert_eq!(conflict.path, "db.b");
                assert!(matches!(
                    conflict.reason,
                    ConflictReason::SameIdOtherName { .. }
                ));
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[test]
    fn test_same_name_other_id_conflict() {
        let base = Arc::new(committed_snapshot(&[("a", "x")]));
        let overlay = overlay_adding_collection(&base, "a", "y");
        let err = merge_snapshot(&base, &overlay).unwrap_err();
        match err {
            CommitError::Conflict(conflict) => {
                assert_eq!(conflict.kind, EntityKind::Collection);
                assert!(matches!(
                    conflict.reason,
                    ConflictReason::SameNameOtherId { .. }
                ));
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[test]
    fn test_remove_of_absent_collection_is_noop() {
        // the overlay read a snapshot that still had the collection
        let stale = Arc::new(committed_snapshot(&[("a", "x")]));
        let mut overlay = MutSnapshot::new(Arc::clone(&stale), 1);
        overlay.database_mut("db").unwrap().remove_collection("a");

        // a concurrent transaction already removed it
        let latest = committed_snapshot(&[]);
        let merged = merge_snapshot(&latest, &overlay).unwrap();
        assert!(merged
            .database_by_name("db")
            .unwrap()
            .collection_by_name("a")
            .is_none());
    }

    #[test]
    fn test_remove_deletes_committed_collection() {
        let base = Arc::new(committed_snapshot(&[("a", "x")]));
        let mut overlay = MutSnapshot::new(Arc::clone(&base), 1);
        overlay.database_mut("db").unwrap().remove_collection("a");
        let merged = merge_snapshot(&base, &overlay).unwrap();
        assert!(merged
            .database_by_name("db")
            .unwrap()
            .collection_by_name("a")
            .is_none());
    }

    #[test]
    fn test_modified_children_recurse_and_splice() {
        let base = {
            let mut part = DocPartBuilder::new(TableRef::ROOT, "a");
            part.insert_field(Arc::new(MetaField {
                name: "x".to_string(),
                identifier: "x_i".to_string(),
                field_type: DocType::Int,
            }))
            .unwrap();
            let mut col = CollectionBuilder::new("a", "a");
            col.insert_doc_part(Arc::new(part.build())).unwrap();
            let mut db = DatabaseBuilder::new("db", "db");
            db.insert_collection(Arc::new(col.build())).unwrap();
            let mut snap = SnapshotBuilder::new();
            snap.insert_database(Arc::new(db.build())).unwrap();
            Arc::new(snap.build())
        };

        let mut overlay = MutSnapshot::new(Arc::clone(&base), 1);
        overlay
            .database_mut("db")
            .unwrap()
            .collection_mut("a")
            .unwrap()
            .doc_part_mut(TableRef::ROOT)
            .unwrap()
            .add_field("y", "y_s".to_string(), DocType::String)
            .unwrap();

        let merged = merge_snapshot(&base, &overlay).unwrap();
        let part = merged
            .database_by_name("db")
            .unwrap()
            .collection_by_name("a")
            .unwrap()
            .doc_part_by_ref(TableRef::ROOT)
            .unwrap()
            .clone();
        // committed field survived, new field spliced in
        assert!(part.field_by_name_and_type("x", DocType::Int).is_some());
        assert!(part.field_by_name_and_type("y", DocType::String).is_some());
    }

    #[test]
    fn test_identical_concurrent_field_add_is_noop() {
        let base = Arc::new(committed_snapshot(&[]));
        // both transactions declare the same field with the same identifier
        let build_overlay = || {
            let mut overlay = MutSnapshot::new(Arc::clone(&base), 1);
            overlay
                .database_mut("db")
                .unwrap()
                .add_collection("a", "a".to_string())
                .unwrap()
                .add_doc_part(TableRef::ROOT, "a".to_string())
                .unwrap()
                .add_field("x", "x_i".to_string(), DocType::Int)
                .unwrap();
            overlay
        };

        let first = merge_snapshot(&base, &build_overlay()).unwrap();
        // the second overlay merges against the first result
        let merged = merge_snapshot(&first, &build_overlay()).unwrap();
        let part = merged
            .database_by_name("db")
            .unwrap()
            .collection_by_name("a")
            .unwrap()
            .doc_part_by_ref(TableRef::ROOT)
            .unwrap()
            .clone();
        assert_eq!(part.fields().count(), 1);
    }

    #[test]
    fn test_concurrent_field_add_with_other_identifier_conflicts() {
        let base = Arc::new(committed_snapshot(&[]));
        let build_overlay = |ident: &str| {
            let mut overlay = MutSnapshot::new(Arc::clone(&base), 1);
            overlay
                .database_mut("db")
                .unwrap()
                .add_collection("a", "a".to_string())
                .unwrap()
                .add_doc_part(TableRef::ROOT, "a".to_string())
                .unwrap()
                .add_field("x", ident.to_string(), DocType::Int)
                .unwrap();
            overlay
        };

        let first = merge_snapshot(&base, &build_overlay("x_i")).unwrap();
        let err = merge_snapshot(&first, &build_overlay("x_i_1")).unwrap_err();
        match err {
            CommitError::Conflict(conflict) => {
                assert_eq!(conflict.kind, EntityKind::Field);
                assert_eq!(conflict.path, "db.a.a.x_i_1");
                assert!(matches!(
                    conflict.reason,
                    ConflictReason::SameNameOtherId { .. }
                ));
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[test]
    fn test_database_level_conflict_path_is_bare_name() {
        let base = Arc::new(committed_snapshot(&[]));
        let mut overlay = MutSnapshot::new(Arc::clone(&base), 1);
        overlay.add_database("other", "db".to_string()).unwrap();
        let err = merge_snapshot(&base, &overlay).unwrap_err();
        match err {
            CommitError::Conflict(conflict) => {
                assert_eq!(conflict.kind, EntityKind::Database);
                assert_eq!(conflict.path, "other");
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[test]
    fn test_doc_part_index_merges_and_splices() {
        use shale_core::meta::{IndexOrdering, MetaDocPartIndex, MetaDocPartIndexColumn};
        use shale_core::IdentifierFactory;

        let base = Arc::new(committed_snapshot(&[]));
        let mut overlay = MutSnapshot::new(Arc::clone(&base), 1);
        let part = overlay
            .database_mut("db")
            .unwrap()
            .add_collection("a", "a".to_string())
            .unwrap()
            .add_doc_part(TableRef::ROOT, "a".to_string())
            .unwrap();
        part.add_field("x", "x_i".to_string(), DocType::Int).unwrap();
        let factory = IdentifierFactory::default();
        let identifier =
            factory.index_identifier("a", &["x_i"], |candidate| part.identifier_taken(candidate));
        part.add_index(MetaDocPartIndex {
            identifier: identifier.clone(),
            unique: true,
            columns: vec![MetaDocPartIndexColumn {
                identifier: "x_i".to_string(),
                ordering: IndexOrdering::Asc,
            }],
        })
        .unwrap();

        let merged = merge_snapshot(&base, &overlay).unwrap();
        let committed = merged
            .database_by_name("db")
            .unwrap()
            .collection_by_name("a")
            .unwrap()
            .doc_part_by_ref(TableRef::ROOT)
            .unwrap()
            .clone();
        let index = committed.index_by_identifier(&identifier).unwrap();
        assert!(index.unique);
        assert_eq!(index.columns.len(), 1);
    }

    #[test]
    fn test_index_removal_merges_idempotently() {
        let base = Arc::new(committed_snapshot(&[("a", "a")]));
        let mut overlay = MutSnapshot::new(Arc::clone(&base), 1);
        overlay
            .database_mut("db")
            .unwrap()
            .collection_mut("a")
            .unwrap()
            .remove_index("no_such_index");
        // no error: removal of an absent index is a no-op
        merge_snapshot(&base, &overlay).unwrap();
    }
}
