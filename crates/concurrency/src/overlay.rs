//! Mutable schema overlay
//!
//! A transaction-local, copy-on-write view over the committed snapshot.
//! Lookups consult the overlay's own additions first and fall through to
//! the wrapped immutable entity; mutations fail on any uniqueness violation
//! in the merged (overlay ∪ base) view.
//!
//! Every addition and removal is recorded in an ordered journal per level.
//! The journal is the *delta* the merge engine reconciles at commit time;
//! it is exposed read-only through `changes()`.
//!
//! A batch boundary (`begin_batch`) clears only the current-batch markers
//! (created-this-batch flags, per-part this-batch field/scalar lists), so a
//! transaction can shred many document batches while the backend op
//! derivation only declares each entity once. The overlay itself and its
//! transaction-level journal survive the boundary.
//!
//! An overlay is owned by exactly one transaction and never shared across
//! threads; discarding it without committing requires no cleanup.

use rustc_hash::{FxHashMap, FxHashSet};
use shale_core::meta::{
    MetaCollection, MetaDatabase, MetaDocPart, MetaDocPartIndex, MetaField, MetaIndex, MetaScalar,
    MetaSnapshot,
};
use shale_core::value::DocType;
use shale_core::{Result, SchemaError, TableRef};
use std::sync::Arc;
use tracing::debug;

/// How a journaled entity differs from the committed snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeState {
    /// Entity does not exist in the overlay's base
    Added,
    /// Entity exists in the base; child-level changes were recorded
    Modified,
    /// Entity was removed
    Removed,
}

/// Identity of a removed entity, kept for conflict classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovedEntity {
    /// Logical name the entity had
    pub name: String,
    /// Storage identifier the entity had
    pub identifier: String,
}

// ============================================================================
// Doc part level
// ============================================================================

/// Transaction-local view of one doc part
#[derive(Debug)]
pub struct MutDocPart {
    base: Option<Arc<MetaDocPart>>,
    table_ref: TableRef,
    identifier: String,
    local_fields: FxHashMap<String, Vec<Arc<MetaField>>>,
    local_field_idents: FxHashMap<String, Arc<MetaField>>,
    local_scalars: FxHashMap<DocType, Arc<MetaScalar>>,
    local_indexes: FxHashMap<String, Arc<MetaDocPartIndex>>,
    added_fields: Vec<Arc<MetaField>>,
    added_scalars: Vec<Arc<MetaScalar>>,
    added_indexes: Vec<Arc<MetaDocPartIndex>>,
    batch_fields: Vec<Arc<MetaField>>,
    batch_scalars: Vec<Arc<MetaScalar>>,
    created_this_batch: bool,
}

impl MutDocPart {
    fn new_added(table_ref: TableRef, identifier: String) -> Self {
        MutDocPart {
            base: None,
            table_ref,
            identifier,
            local_fields: FxHashMap::default(),
            local_field_idents: FxHashMap::default(),
            local_scalars: FxHashMap::default(),
            local_indexes: FxHashMap::default(),
            added_fields: Vec::new(),
            added_scalars: Vec::new(),
            added_indexes: Vec::new(),
            batch_fields: Vec::new(),
            batch_scalars: Vec::new(),
            created_this_batch: true,
        }
    }

    fn wrap(base: Arc<MetaDocPart>) -> Self {
        let table_ref = base.table_ref();
        let identifier = base.identifier().to_string();
        MutDocPart {
            base: Some(base),
            table_ref,
            identifier,
            local_fields: FxHashMap::default(),
            local_field_idents: FxHashMap::default(),
            local_scalars: FxHashMap::default(),
            local_indexes: FxHashMap::default(),
            added_fields: Vec::new(),
            added_scalars: Vec::new(),
            added_indexes: Vec::new(),
            batch_fields: Vec::new(),
            batch_scalars: Vec::new(),
            created_this_batch: false,
        }
    }

    /// Table position of this doc part
    pub fn table_ref(&self) -> TableRef {
        self.table_ref
    }

    /// Storage table identifier
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Committed entity this view wraps, if any
    pub fn base(&self) -> Option<&Arc<MetaDocPart>> {
        self.base.as_ref()
    }

    /// Field for (name, type): overlay first, then base
    pub fn field(&self, name: &str, field_type: DocType) -> Option<&Arc<MetaField>> {
        if let Some(local) = self
            .local_fields
            .get(name)
            .and_then(|fields| fields.iter().find(|f| f.field_type == field_type))
        {
            return Some(local);
        }
        self.base
            .as_ref()
            .and_then(|b| b.field_by_name_and_type(name, field_type))
    }

    /// Field by identifier: overlay first, then base
    pub fn field_by_identifier(&self, identifier: &str) -> Option<&Arc<MetaField>> {
        if let Some(local) = self.local_field_idents.get(identifier) {
            return Some(local);
        }
        self.base
            .as_ref()
            .and_then(|b| b.field_by_identifier(identifier))
    }

    /// Scalar column for a runtime type: overlay first, then base
    pub fn scalar(&self, scalar_type: DocType) -> Option<&Arc<MetaScalar>> {
        if let Some(local) = self.local_scalars.get(&scalar_type) {
            return Some(local);
        }
        self.base.as_ref().and_then(|b| b.scalar_by_type(scalar_type))
    }

    /// Per-table index by identifier: overlay first, then base
    pub fn index_by_identifier(&self, identifier: &str) -> Option<&Arc<MetaDocPartIndex>> {
        if let Some(local) = self.local_indexes.get(identifier) {
            return Some(local);
        }
        self.base
            .as_ref()
            .and_then(|b| b.index_by_identifier(identifier))
    }

    /// Whether a column or index identifier is used anywhere in the merged view
    pub fn identifier_taken(&self, identifier: &str) -> bool {
        self.local_field_idents.contains_key(identifier)
            || self
                .local_scalars
                .values()
                .any(|s| s.identifier == identifier)
            || self.local_indexes.contains_key(identifier)
            || self
                .base
                .as_ref()
                .is_some_and(|b| b.identifier_taken(identifier))
    }

    /// Declare a new field; fails when (name, type) or the identifier exists
    pub fn add_field(
        &mut self,
        name: &str,
        identifier: String,
        field_type: DocType,
    ) -> Result<Arc<MetaField>> {
        if self.field(name, field_type).is_some() || self.identifier_taken(&identifier) {
            return Err(SchemaError::DuplicateField {
                doc_part: self.identifier.clone(),
                name: name.to_string(),
                field_type,
            });
        }
        let field = Arc::new(MetaField {
            name: name.to_string(),
            identifier,
            field_type,
        });
        debug!(
            doc_part = %self.identifier,
            field = %field.identifier,
            "declared field"
        );
        self.local_fields
            .entry(field.name.clone())
            .or_default()
            .push(Arc::clone(&field));
        self.local_field_idents
            .insert(field.identifier.clone(), Arc::clone(&field));
        self.added_fields.push(Arc::clone(&field));
        self.batch_fields.push(Arc::clone(&field));
        Ok(field)
    }

    /// Declare a new scalar column; fails when the type or identifier exists
    pub fn add_scalar(&mut self, identifier: String, scalar_type: DocType) -> Result<Arc<MetaScalar>> {
        if self.scalar(scalar_type).is_some() || self.identifier_taken(&identifier) {
            return Err(SchemaError::DuplicateScalar {
                doc_part: self.identifier.clone(),
                scalar_type,
            });
        }
        let scalar = Arc::new(MetaScalar {
            identifier,
            scalar_type,
        });
        debug!(
            doc_part = %self.identifier,
            scalar = %scalar.identifier,
            "declared scalar"
        );
        self.local_scalars
            .insert(scalar_type, Arc::clone(&scalar));
        self.added_scalars.push(Arc::clone(&scalar));
        self.batch_scalars.push(Arc::clone(&scalar));
        Ok(scalar)
    }

    /// Declare a new per-table index; fails when the identifier exists
    pub fn add_index(&mut self, index: MetaDocPartIndex) -> Result<Arc<MetaDocPartIndex>> {
        if self.index_by_identifier(&index.identifier).is_some() {
            return Err(SchemaError::DuplicateIndex {
                name: index.identifier,
            });
        }
        let index = Arc::new(index);
        self.local_indexes
            .insert(index.identifier.clone(), Arc::clone(&index));
        self.added_indexes.push(Arc::clone(&index));
        Ok(index)
    }

    /// Fields added by this transaction, in declaration order
    pub fn added_fields(&self) -> &[Arc<MetaField>] {
        &self.added_fields
    }

    /// Scalars added by this transaction, in declaration order
    pub fn added_scalars(&self) -> &[Arc<MetaScalar>] {
        &self.added_scalars
    }

    /// Per-table indexes added by this transaction, in declaration order
    pub fn added_indexes(&self) -> &[Arc<MetaDocPartIndex>] {
        &self.added_indexes
    }

    /// Fields added since the last batch boundary
    pub fn fields_added_this_batch(&self) -> &[Arc<MetaField>] {
        &self.batch_fields
    }

    /// Scalars added since the last batch boundary
    pub fn scalars_added_this_batch(&self) -> &[Arc<MetaScalar>] {
        &self.batch_scalars
    }

    /// Whether this doc part was declared since the last batch boundary
    pub fn created_this_batch(&self) -> bool {
        self.created_this_batch
    }

    fn begin_batch(&mut self) {
        self.created_this_batch = false;
        self.batch_fields.clear();
        self.batch_scalars.clear();
    }

    /// Whether this view carries any transaction-level change
    pub fn is_dirty(&self) -> bool {
        self.base.is_none()
            || !self.added_fields.is_empty()
            || !self.added_scalars.is_empty()
            || !self.added_indexes.is_empty()
    }
}

// ============================================================================
// Collection level
// ============================================================================

/// Transaction-local view of one collection
#[derive(Debug)]
pub struct MutCollection {
    base: Option<Arc<MetaCollection>>,
    name: String,
    identifier: String,
    doc_parts: FxHashMap<TableRef, MutDocPart>,
    part_order: Vec<TableRef>,
    added_doc_parts: Vec<TableRef>,
    local_part_idents: FxHashSet<String>,
    local_indexes: FxHashMap<String, Arc<MetaIndex>>,
    added_indexes: Vec<String>,
    removed_indexes: Vec<RemovedEntity>,
    created_this_batch: bool,
}

impl MutCollection {
    fn new_added(name: String, identifier: String) -> Self {
        MutCollection {
            base: None,
            name,
            identifier,
            doc_parts: FxHashMap::default(),
            part_order: Vec::new(),
            added_doc_parts: Vec::new(),
            local_part_idents: FxHashSet::default(),
            local_indexes: FxHashMap::default(),
            added_indexes: Vec::new(),
            removed_indexes: Vec::new(),
            created_this_batch: true,
        }
    }

    fn wrap(base: Arc<MetaCollection>) -> Self {
        let name = base.name().to_string();
        let identifier = base.identifier().to_string();
        MutCollection {
            base: Some(base),
            name,
            identifier,
            doc_parts: FxHashMap::default(),
            part_order: Vec::new(),
            added_doc_parts: Vec::new(),
            local_part_idents: FxHashSet::default(),
            local_indexes: FxHashMap::default(),
            added_indexes: Vec::new(),
            removed_indexes: Vec::new(),
            created_this_batch: false,
        }
    }

    /// Logical collection name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Storage identifier
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Committed entity this view wraps, if any
    pub fn base(&self) -> Option<&Arc<MetaCollection>> {
        self.base.as_ref()
    }

    /// Whether a doc part exists at this position in the merged view
    pub fn has_doc_part(&self, table_ref: TableRef) -> bool {
        self.doc_parts.contains_key(&table_ref)
            || self
                .base
                .as_ref()
                .is_some_and(|b| b.doc_part_by_ref(table_ref).is_some())
    }

    /// Doc part view at a position, wrapping the committed part lazily
    ///
    /// Returns `None` when the position is unknown to the merged view.
    pub fn doc_part_mut(&mut self, table_ref: TableRef) -> Option<&mut MutDocPart> {
        if !self.doc_parts.contains_key(&table_ref) {
            let base_part = self
                .base
                .as_ref()
                .and_then(|b| b.doc_part_by_ref(table_ref))
                .cloned()?;
            self.doc_parts.insert(table_ref, MutDocPart::wrap(base_part));
            self.part_order.push(table_ref);
        }
        self.doc_parts.get_mut(&table_ref)
    }

    /// Doc part view at a position, when it was already touched or added
    pub fn doc_part(&self, table_ref: TableRef) -> Option<&MutDocPart> {
        self.doc_parts.get(&table_ref)
    }

    /// Table position owning an identifier: overlay first, then base
    pub fn doc_part_by_identifier(&self, identifier: &str) -> Option<TableRef> {
        if let Some(part) = self
            .doc_parts
            .values()
            .find(|p| p.identifier() == identifier)
        {
            return Some(part.table_ref());
        }
        self.base
            .as_ref()
            .and_then(|b| b.doc_part_by_identifier(identifier))
            .map(|p| p.table_ref())
    }

    /// Whether a table identifier is used anywhere in the merged view
    pub fn identifier_taken(&self, identifier: &str) -> bool {
        self.local_part_idents.contains(identifier)
            || self
                .base
                .as_ref()
                .is_some_and(|b| b.identifier_taken(identifier))
    }

    /// Declare a new doc part; fails when the position or identifier exists
    pub fn add_doc_part(
        &mut self,
        table_ref: TableRef,
        identifier: String,
    ) -> Result<&mut MutDocPart> {
        if self.has_doc_part(table_ref) || self.identifier_taken(&identifier) {
            return Err(SchemaError::DuplicateDocPart {
                collection: self.name.clone(),
                path: table_ref.to_string(),
                identifier,
            });
        }
        debug!(collection = %self.name, doc_part = %identifier, "declared doc part");
        self.local_part_idents.insert(identifier.clone());
        self.part_order.push(table_ref);
        self.added_doc_parts.push(table_ref);
        Ok(self
            .doc_parts
            .entry(table_ref)
            .or_insert_with(|| MutDocPart::new_added(table_ref, identifier)))
    }

    /// Logical index by name: overlay first, then base, minus removals
    pub fn index(&self, name: &str) -> Option<&Arc<MetaIndex>> {
        if let Some(local) = self.local_indexes.get(name) {
            return Some(local);
        }
        if self.removed_indexes.iter().any(|r| r.name == name) {
            return None;
        }
        self.base.as_ref().and_then(|b| b.index_by_name(name))
    }

    /// Declare a new logical index; fails when the name exists
    pub fn add_index(&mut self, index: MetaIndex) -> Result<Arc<MetaIndex>> {
        if self.index(&index.name).is_some() {
            return Err(SchemaError::DuplicateIndex { name: index.name });
        }
        let index = Arc::new(index);
        debug!(collection = %self.name, index = %index.name, "declared index");
        self.added_indexes.push(index.name.clone());
        self.local_indexes
            .insert(index.name.clone(), Arc::clone(&index));
        Ok(index)
    }

    /// Remove a logical index by name
    ///
    /// Removing an index this transaction itself added undoes the addition;
    /// removing an unknown name is recorded and merges as a no-op.
    pub fn remove_index(&mut self, name: &str) {
        if self.local_indexes.remove(name).is_some() {
            self.added_indexes.retain(|n| n != name);
            return;
        }
        self.removed_indexes.push(RemovedEntity {
            name: name.to_string(),
            identifier: name.to_string(),
        });
    }

    /// Positions of doc parts added by this transaction, in declaration order
    pub fn added_doc_parts(&self) -> &[TableRef] {
        &self.added_doc_parts
    }

    /// Whether this collection was declared since the last batch boundary
    pub fn created_this_batch(&self) -> bool {
        self.created_this_batch
    }

    /// Doc part deltas for the merge engine, in touch order
    pub fn doc_part_changes(&self) -> impl Iterator<Item = &MutDocPart> {
        self.part_order
            .iter()
            .filter_map(|r| self.doc_parts.get(r))
            .filter(|p| p.is_dirty())
    }

    /// Index deltas for the merge engine
    pub fn index_changes(&self) -> Vec<IndexDelta<'_>> {
        let mut deltas = Vec::new();
        for removed in &self.removed_indexes {
            deltas.push(IndexDelta::Removed(removed));
        }
        for name in &self.added_indexes {
            if let Some(index) = self.local_indexes.get(name) {
                deltas.push(IndexDelta::Added(index));
            }
        }
        deltas
    }

    fn begin_batch(&mut self) {
        self.created_this_batch = false;
        for part in self.doc_parts.values_mut() {
            part.begin_batch();
        }
    }

    /// Whether this view carries any transaction-level change
    pub fn is_dirty(&self) -> bool {
        self.base.is_none()
            || !self.added_doc_parts.is_empty()
            || !self.added_indexes.is_empty()
            || !self.removed_indexes.is_empty()
            || self.doc_parts.values().any(MutDocPart::is_dirty)
    }

    fn state(&self) -> ChangeState {
        if self.base.is_none() {
            ChangeState::Added
        } else {
            ChangeState::Modified
        }
    }
}

/// One logical index delta
#[derive(Debug)]
pub enum IndexDelta<'a> {
    /// Index added by the transaction
    Added(&'a Arc<MetaIndex>),
    /// Index removed by the transaction
    Removed(&'a RemovedEntity),
}

// ============================================================================
// Database level
// ============================================================================

/// Transaction-local view of one database
#[derive(Debug)]
pub struct MutDatabase {
    base: Option<Arc<MetaDatabase>>,
    name: String,
    identifier: String,
    collections: FxHashMap<String, MutCollection>,
    order: Vec<String>,
    local_col_idents: FxHashSet<String>,
    removed_collections: Vec<RemovedEntity>,
}

impl MutDatabase {
    fn new_added(name: String, identifier: String) -> Self {
        MutDatabase {
            base: None,
            name,
            identifier,
            collections: FxHashMap::default(),
            order: Vec::new(),
            local_col_idents: FxHashSet::default(),
            removed_collections: Vec::new(),
        }
    }

    fn wrap(base: Arc<MetaDatabase>) -> Self {
        let name = base.name().to_string();
        let identifier = base.identifier().to_string();
        MutDatabase {
            base: Some(base),
            name,
            identifier,
            collections: FxHashMap::default(),
            order: Vec::new(),
            local_col_idents: FxHashSet::default(),
            removed_collections: Vec::new(),
        }
    }

    /// Logical database name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Storage identifier
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Committed entity this view wraps, if any
    pub fn base(&self) -> Option<&Arc<MetaDatabase>> {
        self.base.as_ref()
    }

    /// Whether a collection exists under this name in the merged view
    pub fn has_collection(&self, name: &str) -> bool {
        if self.collections.contains_key(name) {
            return true;
        }
        if self.removed_collections.iter().any(|r| r.name == name) {
            return false;
        }
        self.base
            .as_ref()
            .is_some_and(|b| b.collection_by_name(name).is_some())
    }

    /// Whether a collection identifier is used anywhere in the merged view
    pub fn identifier_taken(&self, identifier: &str) -> bool {
        self.local_col_idents.contains(identifier)
            || self
                .base
                .as_ref()
                .is_some_and(|b| b.collection_by_identifier(identifier).is_some())
    }

    /// Collection view by name, wrapping the committed collection lazily
    pub fn collection_mut(&mut self, name: &str) -> Option<&mut MutCollection> {
        if !self.collections.contains_key(name) {
            if self.removed_collections.iter().any(|r| r.name == name) {
                return None;
            }
            let base_col = self
                .base
                .as_ref()
                .and_then(|b| b.collection_by_name(name))
                .cloned()?;
            self.collections
                .insert(name.to_string(), MutCollection::wrap(base_col));
            self.order.push(name.to_string());
        }
        self.collections.get_mut(name)
    }

    /// Collection view by name, when it was already touched or added
    pub fn collection(&self, name: &str) -> Option<&MutCollection> {
        self.collections.get(name)
    }

    /// Declare a new collection; fails when the name or identifier exists
    pub fn add_collection(
        &mut self,
        name: &str,
        identifier: String,
    ) -> Result<&mut MutCollection> {
        if self.has_collection(name) || self.identifier_taken(&identifier) {
            return Err(SchemaError::DuplicateCollection {
                database: self.name.clone(),
                name: name.to_string(),
                identifier,
            });
        }
        debug!(database = %self.name, collection = %name, "declared collection");
        self.local_col_idents.insert(identifier.clone());
        self.order.push(name.to_string());
        Ok(self
            .collections
            .entry(name.to_string())
            .or_insert_with(|| MutCollection::new_added(name.to_string(), identifier)))
    }

    /// Remove a collection by name, recording a REMOVED delta
    ///
    /// Removing a collection this transaction itself added undoes the
    /// addition; the recorded delta still merges idempotently when a
    /// concurrent transaction removed the committed collection first.
    pub fn remove_collection(&mut self, name: &str) {
        let identifier = if let Some(local) = self.collections.remove(name) {
            self.order.retain(|n| n != name);
            self.local_col_idents.remove(local.identifier());
            local.identifier().to_string()
        } else if let Some(committed) = self.base.as_ref().and_then(|b| b.collection_by_name(name))
        {
            committed.identifier().to_string()
        } else {
            name.to_string()
        };
        self.removed_collections.push(RemovedEntity {
            name: name.to_string(),
            identifier,
        });
    }

    /// Collection deltas for the merge engine: removals first, then touch order
    pub fn changes(&self) -> Vec<CollectionDelta<'_>> {
        let mut deltas = Vec::new();
        for removed in &self.removed_collections {
            deltas.push(CollectionDelta {
                state: ChangeState::Removed,
                name: &removed.name,
                identifier: &removed.identifier,
                collection: None,
            });
        }
        for name in &self.order {
            if let Some(collection) = self.collections.get(name) {
                if collection.is_dirty() {
                    deltas.push(CollectionDelta {
                        state: collection.state(),
                        name: collection.name(),
                        identifier: collection.identifier(),
                        collection: Some(collection),
                    });
                }
            }
        }
        deltas
    }

    fn begin_batch(&mut self) {
        for collection in self.collections.values_mut() {
            collection.begin_batch();
        }
    }

    /// Whether this view carries any transaction-level change
    pub fn is_dirty(&self) -> bool {
        self.base.is_none()
            || !self.removed_collections.is_empty()
            || self.collections.values().any(MutCollection::is_dirty)
    }

    fn state(&self) -> ChangeState {
        if self.base.is_none() {
            ChangeState::Added
        } else {
            ChangeState::Modified
        }
    }
}

/// One collection delta handed to the merge engine
#[derive(Debug)]
pub struct CollectionDelta<'a> {
    /// How the collection differs from the committed snapshot
    pub state: ChangeState,
    /// Logical name
    pub name: &'a str,
    /// Storage identifier
    pub identifier: &'a str,
    /// The transaction-local view; `None` for removals
    pub collection: Option<&'a MutCollection>,
}

// ============================================================================
// Snapshot level
// ============================================================================

/// Transaction-local overlay over one committed snapshot
///
/// Created by `SchemaRepository::create_overlay`, mutated by the shredder,
/// and handed back to `commit`. Never published itself.
#[derive(Debug)]
pub struct MutSnapshot {
    base: Arc<MetaSnapshot>,
    base_version: u64,
    databases: FxHashMap<String, MutDatabase>,
    order: Vec<String>,
    local_db_idents: FxHashSet<String>,
    removed_databases: Vec<RemovedEntity>,
}

impl MutSnapshot {
    /// Wrap a committed snapshot read at `base_version`
    pub fn new(base: Arc<MetaSnapshot>, base_version: u64) -> Self {
        MutSnapshot {
            base,
            base_version,
            databases: FxHashMap::default(),
            order: Vec::new(),
            local_db_idents: FxHashSet::default(),
            removed_databases: Vec::new(),
        }
    }

    /// The committed snapshot this overlay reads through to
    pub fn base(&self) -> &Arc<MetaSnapshot> {
        &self.base
    }

    /// Version token of the snapshot this overlay was created from
    pub fn base_version(&self) -> u64 {
        self.base_version
    }

    /// Whether a database exists under this name in the merged view
    pub fn has_database(&self, name: &str) -> bool {
        if self.databases.contains_key(name) {
            return true;
        }
        if self.removed_databases.iter().any(|r| r.name == name) {
            return false;
        }
        self.base.database_by_name(name).is_some()
    }

    /// Whether a database identifier is used anywhere in the merged view
    pub fn identifier_taken(&self, identifier: &str) -> bool {
        self.local_db_idents.contains(identifier)
            || self.base.database_by_identifier(identifier).is_some()
    }

    /// Database view by name, wrapping the committed database lazily
    pub fn database_mut(&mut self, name: &str) -> Option<&mut MutDatabase> {
        if !self.databases.contains_key(name) {
            if self.removed_databases.iter().any(|r| r.name == name) {
                return None;
            }
            let base_db = self.base.database_by_name(name).cloned()?;
            self.databases
                .insert(name.to_string(), MutDatabase::wrap(base_db));
            self.order.push(name.to_string());
        }
        self.databases.get_mut(name)
    }

    /// Database view by name, when it was already touched or added
    pub fn database(&self, name: &str) -> Option<&MutDatabase> {
        self.databases.get(name)
    }

    /// Declare a new database; fails when the name or identifier exists
    pub fn add_database(&mut self, name: &str, identifier: String) -> Result<&mut MutDatabase> {
        if self.has_database(name) || self.identifier_taken(&identifier) {
            return Err(SchemaError::DuplicateDatabase {
                name: name.to_string(),
                identifier,
            });
        }
        debug!(database = %name, "declared database");
        self.local_db_idents.insert(identifier.clone());
        self.order.push(name.to_string());
        Ok(self
            .databases
            .entry(name.to_string())
            .or_insert_with(|| MutDatabase::new_added(name.to_string(), identifier)))
    }

    /// Remove a database by name, recording a REMOVED delta
    pub fn remove_database(&mut self, name: &str) {
        let identifier = if let Some(local) = self.databases.remove(name) {
            self.order.retain(|n| n != name);
            self.local_db_idents.remove(local.identifier());
            local.identifier().to_string()
        } else if let Some(committed) = self.base.database_by_name(name) {
            committed.identifier().to_string()
        } else {
            name.to_string()
        };
        self.removed_databases.push(RemovedEntity {
            name: name.to_string(),
            identifier,
        });
    }

    /// Database deltas for the merge engine: removals first, then touch order
    pub fn changes(&self) -> Vec<DatabaseDelta<'_>> {
        let mut deltas = Vec::new();
        for removed in &self.removed_databases {
            deltas.push(DatabaseDelta {
                state: ChangeState::Removed,
                name: &removed.name,
                identifier: &removed.identifier,
                database: None,
            });
        }
        for name in &self.order {
            if let Some(database) = self.databases.get(name) {
                if database.is_dirty() {
                    deltas.push(DatabaseDelta {
                        state: database.state(),
                        name: database.name(),
                        identifier: database.identifier(),
                        database: Some(database),
                    });
                }
            }
        }
        deltas
    }

    /// Mark a batch boundary: clear current-batch markers, keep the journal
    pub fn begin_batch(&mut self) {
        for database in self.databases.values_mut() {
            database.begin_batch();
        }
    }

    /// Whether this overlay carries any change to reconcile
    pub fn is_dirty(&self) -> bool {
        !self.removed_databases.is_empty() || self.databases.values().any(MutDatabase::is_dirty)
    }
}

/// One database delta handed to the merge engine
#[derive(Debug)]
pub struct DatabaseDelta<'a> {
    /// How the database differs from the committed snapshot
    pub state: ChangeState,
    /// Logical name
    pub name: &'a str,
    /// Storage identifier
    pub identifier: &'a str,
    /// The transaction-local view; `None` for removals
    pub database: Option<&'a MutDatabase>,
}
