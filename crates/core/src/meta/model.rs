//! Immutable schema entities
//!
//! Every container holds `Arc`ed children indexed by its uniqueness
//! keys: doc parts by table position and by identifier,
//! collections and databases by name and by identifier, fields by
//! (name, type) and by identifier, scalars by type.

use crate::table_ref::TableRef;
use crate::value::DocType;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Sort direction of one index column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexOrdering {
    /// Ascending
    Asc,
    /// Descending
    Desc,
}

/// A typed column backing one document attribute at one table position
///
/// The (name, type) pair is unique per doc part: an attribute that takes on
/// two runtime types across documents gets two fields, one per type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaField {
    /// Document attribute name
    pub name: String,
    /// Storage column identifier
    pub identifier: String,
    /// Runtime type stored in this column
    pub field_type: DocType,
}

/// A typed column backing untyped array elements at one table position
///
/// Unique per (table position, type); there is no attribute name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaScalar {
    /// Storage column identifier
    pub identifier: String,
    /// Runtime type stored in this column
    pub scalar_type: DocType,
}

/// One column of a per-table index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaDocPartIndexColumn {
    /// Storage column identifier
    pub identifier: String,
    /// Sort direction
    pub ordering: IndexOrdering,
}

/// A per-table (doc part level) index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaDocPartIndex {
    /// Storage identifier, unique within the doc part
    pub identifier: String,
    /// Whether the index enforces uniqueness
    pub unique: bool,
    /// Indexed columns, in order
    pub columns: Vec<MetaDocPartIndexColumn>,
}

/// One attribute reference of a cross-table logical index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaIndexField {
    /// Table position the attribute lives at
    pub table_ref: TableRef,
    /// Document attribute name
    pub name: String,
    /// Sort direction
    pub ordering: IndexOrdering,
}

/// A collection-level logical index over document attributes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaIndex {
    /// User-facing index name, unique within the collection
    pub name: String,
    /// Whether the index enforces uniqueness
    pub unique: bool,
    /// Indexed attributes, in order
    pub fields: Vec<MetaIndexField>,
}

/// One relational table: a position in the document nesting tree
#[derive(Debug)]
pub struct MetaDocPart {
    table_ref: TableRef,
    identifier: String,
    // Fields by attribute name; the inner Vec holds one entry per runtime
    // type the attribute has been seen with (rarely more than one or two).
    fields_by_name: FxHashMap<String, Vec<Arc<MetaField>>>,
    fields_by_identifier: FxHashMap<String, Arc<MetaField>>,
    scalars_by_type: FxHashMap<DocType, Arc<MetaScalar>>,
    indexes: FxHashMap<String, Arc<MetaDocPartIndex>>,
}

impl MetaDocPart {
    pub(super) fn new(
        table_ref: TableRef,
        identifier: String,
        fields_by_name: FxHashMap<String, Vec<Arc<MetaField>>>,
        fields_by_identifier: FxHashMap<String, Arc<MetaField>>,
        scalars_by_type: FxHashMap<DocType, Arc<MetaScalar>>,
        indexes: FxHashMap<String, Arc<MetaDocPartIndex>>,
    ) -> Self {
        MetaDocPart {
            table_ref,
            identifier,
            fields_by_name,
            fields_by_identifier,
            scalars_by_type,
            indexes,
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

    /// Field for (attribute name, runtime type), if declared
    pub fn field_by_name_and_type(&self, name: &str, field_type: DocType) -> Option<&Arc<MetaField>> {
        self.fields_by_name
            .get(name)?
            .iter()
            .find(|f| f.field_type == field_type)
    }

    /// Field by storage identifier, if declared
    pub fn field_by_identifier(&self, identifier: &str) -> Option<&Arc<MetaField>> {
        self.fields_by_identifier.get(identifier)
    }

    /// All fields, in unspecified order
    pub fn fields(&self) -> impl Iterator<Item = &Arc<MetaField>> {
        self.fields_by_identifier.values()
    }

    /// Scalar column for a runtime type, if declared
    pub fn scalar_by_type(&self, scalar_type: DocType) -> Option<&Arc<MetaScalar>> {
        self.scalars_by_type.get(&scalar_type)
    }

    /// Scalar column by storage identifier, if declared
    pub fn scalar_by_identifier(&self, identifier: &str) -> Option<&Arc<MetaScalar>> {
        self.scalars_by_type
            .values()
            .find(|s| s.identifier == identifier)
    }

    /// All scalar columns, in unspecified order
    pub fn scalars(&self) -> impl Iterator<Item = &Arc<MetaScalar>> {
        self.scalars_by_type.values()
    }

    /// Per-table index by storage identifier
    pub fn index_by_identifier(&self, identifier: &str) -> Option<&Arc<MetaDocPartIndex>> {
        self.indexes.get(identifier)
    }

    /// All per-table indexes, in unspecified order
    pub fn indexes(&self) -> impl Iterator<Item = &Arc<MetaDocPartIndex>> {
        self.indexes.values()
    }

    /// Whether a column or index identifier is already used in this doc part
    pub fn identifier_taken(&self, identifier: &str) -> bool {
        self.fields_by_identifier.contains_key(identifier)
            || self.scalar_by_identifier(identifier).is_some()
            || self.indexes.contains_key(identifier)
    }
}

/// A logical collection: doc parts plus cross-table indexes
#[derive(Debug)]
pub struct MetaCollection {
    name: String,
    identifier: String,
    doc_parts_by_ref: FxHashMap<TableRef, Arc<MetaDocPart>>,
    doc_parts_by_identifier: FxHashMap<String, Arc<MetaDocPart>>,
    indexes: FxHashMap<String, Arc<MetaIndex>>,
}

impl MetaCollection {
    pub(super) fn new(
        name: String,
        identifier: String,
        doc_parts_by_ref: FxHashMap<TableRef, Arc<MetaDocPart>>,
        doc_parts_by_identifier: FxHashMap<String, Arc<MetaDocPart>>,
        indexes: FxHashMap<String, Arc<MetaIndex>>,
    ) -> Self {
        MetaCollection {
            name,
            identifier,
            doc_parts_by_ref,
            doc_parts_by_identifier,
            indexes,
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

    /// Doc part at a table position
    pub fn doc_part_by_ref(&self, table_ref: TableRef) -> Option<&Arc<MetaDocPart>> {
        self.doc_parts_by_ref.get(&table_ref)
    }

    /// Doc part by storage identifier
    pub fn doc_part_by_identifier(&self, identifier: &str) -> Option<&Arc<MetaDocPart>> {
        self.doc_parts_by_identifier.get(identifier)
    }

    /// All doc parts, in unspecified order
    pub fn doc_parts(&self) -> impl Iterator<Item = &Arc<MetaDocPart>> {
        self.doc_parts_by_ref.values()
    }

    /// Logical index by name
    pub fn index_by_name(&self, name: &str) -> Option<&Arc<MetaIndex>> {
        self.indexes.get(name)
    }

    /// All logical indexes, in unspecified order
    pub fn indexes(&self) -> impl Iterator<Item = &Arc<MetaIndex>> {
        self.indexes.values()
    }

    /// Whether a table identifier is already used in this collection
    pub fn identifier_taken(&self, identifier: &str) -> bool {
        self.doc_parts_by_identifier.contains_key(identifier)
    }
}

/// A logical database: a set of collections
#[derive(Debug)]
pub struct MetaDatabase {
    name: String,
    identifier: String,
    collections_by_name: FxHashMap<String, Arc<MetaCollection>>,
    collections_by_identifier: FxHashMap<String, Arc<MetaCollection>>,
}

impl MetaDatabase {
    pub(super) fn new(
        name: String,
        identifier: String,
        collections_by_name: FxHashMap<String, Arc<MetaCollection>>,
        collections_by_identifier: FxHashMap<String, Arc<MetaCollection>>,
    ) -> Self {
        MetaDatabase {
            name,
            identifier,
            collections_by_name,
            collections_by_identifier,
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

    /// Collection by logical name
    pub fn collection_by_name(&self, name: &str) -> Option<&Arc<MetaCollection>> {
        self.collections_by_name.get(name)
    }

    /// Collection by storage identifier
    pub fn collection_by_identifier(&self, identifier: &str) -> Option<&Arc<MetaCollection>> {
        self.collections_by_identifier.get(identifier)
    }

    /// All collections, in unspecified order
    pub fn collections(&self) -> impl Iterator<Item = &Arc<MetaCollection>> {
        self.collections_by_name.values()
    }
}

/// The committed root: an immutable set of databases
///
/// Published by the repository under a version token; superseded wholesale
/// on every successful commit, never mutated.
#[derive(Debug, Default)]
pub struct MetaSnapshot {
    databases_by_name: FxHashMap<String, Arc<MetaDatabase>>,
    databases_by_identifier: FxHashMap<String, Arc<MetaDatabase>>,
}

impl MetaSnapshot {
    pub(super) fn new(
        databases_by_name: FxHashMap<String, Arc<MetaDatabase>>,
        databases_by_identifier: FxHashMap<String, Arc<MetaDatabase>>,
    ) -> Self {
        MetaSnapshot {
            databases_by_name,
            databases_by_identifier,
        }
    }

    /// Empty snapshot (a freshly initialized repository)
    pub fn empty() -> Self {
        MetaSnapshot::default()
    }

    /// Database by logical name
    pub fn database_by_name(&self, name: &str) -> Option<&Arc<MetaDatabase>> {
        self.databases_by_name.get(name)
    }

    /// Database by storage identifier
    pub fn database_by_identifier(&self, identifier: &str) -> Option<&Arc<MetaDatabase>> {
        self.databases_by_identifier.get(identifier)
    }

    /// All databases, in unspecified order
    pub fn databases(&self) -> impl Iterator<Item = &Arc<MetaDatabase>> {
        self.databases_by_name.values()
    }

    /// Number of databases
    pub fn len(&self) -> usize {
        self.databases_by_name.len()
    }

    /// True when the snapshot holds no databases
    pub fn is_empty(&self) -> bool {
        self.databases_by_name.is_empty()
    }
}
