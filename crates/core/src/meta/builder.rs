//! Builders for the immutable schema tree
//!
//! The merge engine works on builders: it seeds one from a committed
//! entity (cheap, children stay `Arc`-shared), applies a transaction's
//! deltas, and freezes the result with `build()`. Insertion enforces the
//! same uniqueness invariants the immutable tree documents.
//!
//! `insert_*` fails on a duplicate key; `put_*` replaces (used when a
//! merged child is spliced back into its parent).

use crate::error::{Result, SchemaError};
use crate::meta::model::{
    MetaCollection, MetaDatabase, MetaDocPart, MetaDocPartIndex, MetaField, MetaIndex, MetaScalar,
    MetaSnapshot,
};
use crate::table_ref::TableRef;
use crate::value::DocType;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Builder for one doc part
#[derive(Debug)]
pub struct DocPartBuilder {
    table_ref: TableRef,
    identifier: String,
    fields_by_name: FxHashMap<String, Vec<Arc<MetaField>>>,
    fields_by_identifier: FxHashMap<String, Arc<MetaField>>,
    scalars_by_type: FxHashMap<DocType, Arc<MetaScalar>>,
    indexes: FxHashMap<String, Arc<MetaDocPartIndex>>,
}

impl DocPartBuilder {
    /// Start an empty doc part at a table position
    pub fn new(table_ref: TableRef, identifier: impl Into<String>) -> Self {
        DocPartBuilder {
            table_ref,
            identifier: identifier.into(),
            fields_by_name: FxHashMap::default(),
            fields_by_identifier: FxHashMap::default(),
            scalars_by_type: FxHashMap::default(),
            indexes: FxHashMap::default(),
        }
    }

    /// Seed from a committed doc part (children stay shared)
    pub fn from_committed(part: &Arc<MetaDocPart>) -> Self {
        let mut b = DocPartBuilder::new(part.table_ref(), part.identifier());
        for field in part.fields() {
            b.fields_by_name
                .entry(field.name.clone())
                .or_default()
                .push(Arc::clone(field));
            b.fields_by_identifier
                .insert(field.identifier.clone(), Arc::clone(field));
        }
        for scalar in part.scalars() {
            b.scalars_by_type.insert(scalar.scalar_type, Arc::clone(scalar));
        }
        for index in part.indexes() {
            b.indexes.insert(index.identifier.clone(), Arc::clone(index));
        }
        b
    }

    /// Table position being built
    pub fn table_ref(&self) -> TableRef {
        self.table_ref
    }

    /// Storage identifier being built
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Field for (name, type), if present
    pub fn field_by_name_and_type(&self, name: &str, field_type: DocType) -> Option<&Arc<MetaField>> {
        self.fields_by_name
            .get(name)?
            .iter()
            .find(|f| f.field_type == field_type)
    }

    /// Field by identifier, if present
    pub fn field_by_identifier(&self, identifier: &str) -> Option<&Arc<MetaField>> {
        self.fields_by_identifier.get(identifier)
    }

    /// Scalar column for a runtime type, if present
    pub fn scalar_by_type(&self, scalar_type: DocType) -> Option<&Arc<MetaScalar>> {
        self.scalars_by_type.get(&scalar_type)
    }

    /// Scalar column by identifier, if present
    pub fn scalar_by_identifier(&self, identifier: &str) -> Option<&Arc<MetaScalar>> {
        self.scalars_by_type
            .values()
            .find(|s| s.identifier == identifier)
    }

    /// Per-table index by identifier, if present
    pub fn index_by_identifier(&self, identifier: &str) -> Option<&Arc<MetaDocPartIndex>> {
        self.indexes.get(identifier)
    }

    /// Insert a new field; fails on a duplicate (name, type) or identifier
    pub fn insert_field(&mut self, field: Arc<MetaField>) -> Result<()> {
        if self
            .field_by_name_and_type(&field.name, field.field_type)
            .is_some()
            || self.fields_by_identifier.contains_key(&field.identifier)
        {
            return Err(SchemaError::DuplicateField {
                doc_part: self.identifier.clone(),
                name: field.name.clone(),
                field_type: field.field_type,
            });
        }
        self.fields_by_name
            .entry(field.name.clone())
            .or_default()
            .push(Arc::clone(&field));
        self.fields_by_identifier.insert(field.identifier.clone(), field);
        Ok(())
    }

    /// Insert a new scalar column; fails on a duplicate type or identifier
    pub fn insert_scalar(&mut self, scalar: Arc<MetaScalar>) -> Result<()> {
        if self.scalars_by_type.contains_key(&scalar.scalar_type)
            || self.scalar_by_identifier(&scalar.identifier).is_some()
        {
            return Err(SchemaError::DuplicateScalar {
                doc_part: self.identifier.clone(),
                scalar_type: scalar.scalar_type,
            });
        }
        self.scalars_by_type.insert(scalar.scalar_type, scalar);
        Ok(())
    }

    /// Insert a new per-table index; fails on a duplicate identifier
    pub fn insert_index(&mut self, index: Arc<MetaDocPartIndex>) -> Result<()> {
        if self.indexes.contains_key(&index.identifier) {
            return Err(SchemaError::DuplicateIndex {
                name: index.identifier.clone(),
            });
        }
        self.indexes.insert(index.identifier.clone(), index);
        Ok(())
    }

    /// Remove a per-table index by identifier
    pub fn remove_index(&mut self, identifier: &str) -> Option<Arc<MetaDocPartIndex>> {
        self.indexes.remove(identifier)
    }

    /// Freeze into the immutable form
    pub fn build(self) -> MetaDocPart {
        MetaDocPart::new(
            self.table_ref,
            self.identifier,
            self.fields_by_name,
            self.fields_by_identifier,
            self.scalars_by_type,
            self.indexes,
        )
    }
}

/// Builder for one collection
#[derive(Debug)]
pub struct CollectionBuilder {
    name: String,
    identifier: String,
    doc_parts_by_ref: FxHashMap<TableRef, Arc<MetaDocPart>>,
    doc_parts_by_identifier: FxHashMap<String, Arc<MetaDocPart>>,
    indexes: FxHashMap<String, Arc<MetaIndex>>,
}

impl CollectionBuilder {
    /// Start an empty collection
    pub fn new(name: impl Into<String>, identifier: impl Into<String>) -> Self {
        CollectionBuilder {
            name: name.into(),
            identifier: identifier.into(),
            doc_parts_by_ref: FxHashMap::default(),
            doc_parts_by_identifier: FxHashMap::default(),
            indexes: FxHashMap::default(),
        }
    }

    /// Seed from a committed collection (children stay shared)
    pub fn from_committed(collection: &Arc<MetaCollection>) -> Self {
        let mut b = CollectionBuilder::new(collection.name(), collection.identifier());
        for part in collection.doc_parts() {
            b.doc_parts_by_ref.insert(part.table_ref(), Arc::clone(part));
            b.doc_parts_by_identifier
                .insert(part.identifier().to_string(), Arc::clone(part));
        }
        for index in collection.indexes() {
            b.indexes.insert(index.name.clone(), Arc::clone(index));
        }
        b
    }

    /// Logical name being built
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Storage identifier being built
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Doc part at a table position, if present
    pub fn doc_part_by_ref(&self, table_ref: TableRef) -> Option<&Arc<MetaDocPart>> {
        self.doc_parts_by_ref.get(&table_ref)
    }

    /// Doc part by identifier, if present
    pub fn doc_part_by_identifier(&self, identifier: &str) -> Option<&Arc<MetaDocPart>> {
        self.doc_parts_by_identifier.get(identifier)
    }

    /// Logical index by name, if present
    pub fn index_by_name(&self, name: &str) -> Option<&Arc<MetaIndex>> {
        self.indexes.get(name)
    }

    /// Insert a new doc part; fails on a duplicate table position or identifier
    pub fn insert_doc_part(&mut self, part: Arc<MetaDocPart>) -> Result<()> {
        if self.doc_parts_by_ref.contains_key(&part.table_ref())
            || self.doc_parts_by_identifier.contains_key(part.identifier())
        {
            return Err(SchemaError::DuplicateDocPart {
                collection: self.name.clone(),
                path: part.table_ref().to_string(),
                identifier: part.identifier().to_string(),
            });
        }
        self.put_doc_part(part);
        Ok(())
    }

    /// Insert or replace the doc part at its table position
    pub fn put_doc_part(&mut self, part: Arc<MetaDocPart>) {
        if let Some(old) = self.doc_parts_by_ref.insert(part.table_ref(), Arc::clone(&part)) {
            self.doc_parts_by_identifier.remove(old.identifier());
        }
        self.doc_parts_by_identifier
            .insert(part.identifier().to_string(), part);
    }

    /// Insert a new logical index; fails on a duplicate name
    pub fn insert_index(&mut self, index: Arc<MetaIndex>) -> Result<()> {
        if self.indexes.contains_key(&index.name) {
            return Err(SchemaError::DuplicateIndex {
                name: index.name.clone(),
            });
        }
        self.indexes.insert(index.name.clone(), index);
        Ok(())
    }

    /// Remove a logical index by name
    pub fn remove_index(&mut self, name: &str) -> Option<Arc<MetaIndex>> {
        self.indexes.remove(name)
    }

    /// Freeze into the immutable form
    pub fn build(self) -> MetaCollection {
        MetaCollection::new(
            self.name,
            self.identifier,
            self.doc_parts_by_ref,
            self.doc_parts_by_identifier,
            self.indexes,
        )
    }
}

/// Builder for one database
#[derive(Debug)]
pub struct DatabaseBuilder {
    name: String,
    identifier: String,
    collections_by_name: FxHashMap<String, Arc<MetaCollection>>,
    collections_by_identifier: FxHashMap<String, Arc<MetaCollection>>,
}

impl DatabaseBuilder {
    /// Start an empty database
    pub fn new(name: impl Into<String>, identifier: impl Into<String>) -> Self {
        DatabaseBuilder {
            name: name.into(),
            identifier: identifier.into(),
            collections_by_name: FxHashMap::default(),
            collections_by_identifier: FxHashMap::default(),
        }
    }

    /// Seed from a committed database (children stay shared)
    pub fn from_committed(database: &Arc<MetaDatabase>) -> Self {
        let mut b = DatabaseBuilder::new(database.name(), database.identifier());
        for collection in database.collections() {
            b.collections_by_name
                .insert(collection.name().to_string(), Arc::clone(collection));
            b.collections_by_identifier
                .insert(collection.identifier().to_string(), Arc::clone(collection));
        }
        b
    }

    /// Logical name being built
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Storage identifier being built
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Collection by logical name, if present
    pub fn collection_by_name(&self, name: &str) -> Option<&Arc<MetaCollection>> {
        self.collections_by_name.get(name)
    }

    /// Collection by storage identifier, if present
    pub fn collection_by_identifier(&self, identifier: &str) -> Option<&Arc<MetaCollection>> {
        self.collections_by_identifier.get(identifier)
    }

    /// Insert a new collection; fails on a duplicate name or identifier
    pub fn insert_collection(&mut self, collection: Arc<MetaCollection>) -> Result<()> {
        if self.collections_by_name.contains_key(collection.name())
            || self
                .collections_by_identifier
                .contains_key(collection.identifier())
        {
            return Err(SchemaError::DuplicateCollection {
                database: self.name.clone(),
                name: collection.name().to_string(),
                identifier: collection.identifier().to_string(),
            });
        }
        self.put_collection(collection);
        Ok(())
    }

    /// Insert or replace the collection under its name
    pub fn put_collection(&mut self, collection: Arc<MetaCollection>) {
        if let Some(old) = self
            .collections_by_name
            .insert(collection.name().to_string(), Arc::clone(&collection))
        {
            self.collections_by_identifier.remove(old.identifier());
        }
        self.collections_by_identifier
            .insert(collection.identifier().to_string(), collection);
    }

    /// Remove a collection by logical name
    pub fn remove_collection(&mut self, name: &str) -> Option<Arc<MetaCollection>> {
        let removed = self.collections_by_name.remove(name)?;
        self.collections_by_identifier.remove(removed.identifier());
        Some(removed)
    }

    /// Freeze into the immutable form
    pub fn build(self) -> MetaDatabase {
        MetaDatabase::new(
            self.name,
            self.identifier,
            self.collections_by_name,
            self.collections_by_identifier,
        )
    }
}

/// Builder for the snapshot root
#[derive(Debug, Default)]
pub struct SnapshotBuilder {
    databases_by_name: FxHashMap<String, Arc<MetaDatabase>>,
    databases_by_identifier: FxHashMap<String, Arc<MetaDatabase>>,
}

impl SnapshotBuilder {
    /// Start an empty snapshot
    pub fn new() -> Self {
        SnapshotBuilder::default()
    }

    /// Seed from a committed snapshot (children stay shared)
    pub fn from_committed(snapshot: &MetaSnapshot) -> Self {
        let mut b = SnapshotBuilder::new();
        for database in snapshot.databases() {
            b.databases_by_name
                .insert(database.name().to_string(), Arc::clone(database));
            b.databases_by_identifier
                .insert(database.identifier().to_string(), Arc::clone(database));
        }
        b
    }

    /// Database by logical name, if present
    pub fn database_by_name(&self, name: &str) -> Option<&Arc<MetaDatabase>> {
        self.databases_by_name.get(name)
    }

    /// Database by storage identifier, if present
    pub fn database_by_identifier(&self, identifier: &str) -> Option<&Arc<MetaDatabase>> {
        self.databases_by_identifier.get(identifier)
    }

    /// Insert a new database; fails on a duplicate name or identifier
    pub fn insert_database(&mut self, database: Arc<MetaDatabase>) -> Result<()> {
        if self.databases_by_name.contains_key(database.name())
            || self
                .databases_by_identifier
                .contains_key(database.identifier())
        {
            return Err(SchemaError::DuplicateDatabase {
                name: database.name().to_string(),
                identifier: database.identifier().to_string(),
            });
        }
        self.put_database(database);
        Ok(())
    }

    /// Insert or replace the database under its name
    pub fn put_database(&mut self, database: Arc<MetaDatabase>) {
        if let Some(old) = self
            .databases_by_name
            .insert(database.name().to_string(), Arc::clone(&database))
        {
            self.databases_by_identifier.remove(old.identifier());
        }
        self.databases_by_identifier
            .insert(database.identifier().to_string(), database);
    }

    /// Remove a database by logical name
    pub fn remove_database(&mut self, name: &str) -> Option<Arc<MetaDatabase>> {
        let removed = self.databases_by_name.remove(name)?;
        self.databases_by_identifier.remove(removed.identifier());
        Some(removed)
    }

    /// Freeze into the immutable form
    pub fn build(self) -> MetaSnapshot {
        MetaSnapshot::new(self.databases_by_name, self.databases_by_identifier)
    }
}
