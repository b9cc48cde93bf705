//! Document shredder (document → relational rows)
//!
//! Walks one document at a time, declares newly discovered tables, fields
//! and scalar columns against the transaction's schema overlay, and
//! accumulates rows per table position. Rows are pulled once, as a
//! `CollectionData` ordered by ascending table depth, after any number of
//! `translate` calls, so batched inserts share table/column discovery.
//!
//! Shredding rules:
//! - the root document issues a fresh `did` (equal to its root `rid`)
//! - a nested object attribute records a `Child` field (value `false`) on
//!   the parent row and recurses into the object-step child table with
//!   `pid` = parent rid
//! - an array attribute records a `Child` field (value `true`); each
//!   element becomes a row of the array-step child table with `seq` = its
//!   position; object elements shred their attributes into that same row,
//!   scalar elements select a scalar column by runtime type, and nested
//!   arrays record a `Child` scalar marker row and recurse further
//! - empty nested objects/arrays declare their child table but emit no
//!   child rows
//!
//! The shredder validates structure, not document semantics.

use crate::rid::ScopedRidGenerator;
use shale_concurrency::MutCollection;
use shale_core::rows::{CollectionData, DocPartData, DocPartRow};
use shale_core::value::{DocObject, DocType, DocValue};
use shale_core::{IdentifierFactory, Result, SchemaError, TableRef, TableRefKey, TableRefRegistry};
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Shreds documents of one collection against one transaction's overlay
pub struct Translator<'a> {
    registry: Arc<TableRefRegistry>,
    factory: &'a IdentifierFactory,
    rids: ScopedRidGenerator,
    collection: &'a mut MutCollection,
    tables: FxHashMap<TableRef, DocPartData>,
}

impl<'a> Translator<'a> {
    /// Create a translator for one collection
    ///
    /// `rids` must be scoped to the same (database, collection) the overlay
    /// collection belongs to.
    pub fn new(
        factory: &'a IdentifierFactory,
        rids: ScopedRidGenerator,
        collection: &'a mut MutCollection,
    ) -> Self {
        let registry = Arc::clone(rids.registry());
        Translator {
            registry,
            factory,
            rids,
            collection,
            tables: FxHashMap::default(),
        }
    }

    /// Shred one root document into the accumulator
    ///
    /// # Errors
    ///
    /// Structural errors on overlay invariant violations and
    /// `RidExhausted` when an id scope is used up.
    pub fn translate(&mut self, doc: &DocObject) -> Result<()> {
        let root = self.registry.root();
        let did = self.rids.next_rid(root)?;
        self.shred_object(root, doc, did, did, None, None)
    }

    /// Pull the accumulated row batches, ordered by ascending table depth
    pub fn into_collection_data(self) -> CollectionData {
        CollectionData::new(self.tables.into_values().collect())
    }

    /// Ensure the doc part at `table_ref` exists in the overlay and the
    /// accumulator, declaring it on first sight
    fn declare_doc_part(&mut self, table_ref: TableRef) -> Result<()> {
        if !self.collection.has_doc_part(table_ref) {
            let identifier = self.factory.doc_part_identifier(
                &self.registry,
                self.collection.identifier(),
                table_ref,
                |candidate| self.collection.identifier_taken(candidate),
            )?;
            self.collection.add_doc_part(table_ref, identifier)?;
        } else {
            // wrap the committed part so later lookups and batch markers
            // have a transaction-local view to work with
            self.collection
                .doc_part_mut(table_ref)
                .ok_or_else(|| SchemaError::Invariant {
                    detail: format!("doc part {table_ref} vanished from the merged view"),
                })?;
        }
        let depth = self.registry.depth(table_ref);
        self.tables
            .entry(table_ref)
            .or_insert_with(|| DocPartData::new(table_ref, depth));
        Ok(())
    }

    /// Column identifier for (attribute name, runtime type), declaring the
    /// field on first sight
    fn field_column(&mut self, table_ref: TableRef, name: &str, field_type: DocType) -> Result<String> {
        if let Some(existing) = self
            .collection
            .doc_part(table_ref)
            .and_then(|p| p.field(name, field_type))
        {
            return Ok(existing.identifier.clone());
        }
        let identifier = {
            let part = self.doc_part(table_ref)?;
            self.factory
                .field_identifier(name, field_type, |candidate| {
                    part.identifier_taken(candidate)
                })?
        };
        let part = self.doc_part_mut(table_ref)?;
        let field = part.add_field(name, identifier, field_type)?;
        Ok(field.identifier.clone())
    }

    /// Scalar column identifier for a runtime type, declaring the scalar on
    /// first sight
    fn scalar_column(&mut self, table_ref: TableRef, scalar_type: DocType) -> Result<String> {
        if let Some(existing) = self
            .collection
            .doc_part(table_ref)
            .and_then(|p| p.scalar(scalar_type))
        {
            return Ok(existing.identifier.clone());
        }
        let identifier = {
            let part = self.doc_part(table_ref)?;
            self.factory
                .scalar_identifier(scalar_type, |candidate| part.identifier_taken(candidate))
        };
        let part = self.doc_part_mut(table_ref)?;
        let scalar = part.add_scalar(identifier, scalar_type)?;
        Ok(scalar.identifier.clone())
    }

    fn doc_part(&self, table_ref: TableRef) -> Result<&shale_concurrency::MutDocPart> {
        self.collection
            .doc_part(table_ref)
            .ok_or_else(|| SchemaError::Invariant {
                detail: format!("doc part {table_ref} used before declaration"),
            })
    }

    fn doc_part_mut(&mut self, table_ref: TableRef) -> Result<&mut shale_concurrency::MutDocPart> {
        self.collection
            .doc_part_mut(table_ref)
            .ok_or_else(|| SchemaError::Invariant {
                detail: format!("doc part {table_ref} used before declaration"),
            })
    }

    fn push_row(&mut self, table_ref: TableRef, row: DocPartRow) -> Result<()> {
        self.tables
            .get_mut(&table_ref)
            .ok_or_else(|| SchemaError::Invariant {
                detail: format!("row emitted for undeclared doc part {table_ref}"),
            })?
            .push(row)
    }

    fn shred_object(
        &mut self,
        table_ref: TableRef,
        obj: &DocObject,
        did: i64,
        rid: i64,
        pid: Option<i64>,
        seq: Option<u32>,
    ) -> Result<()> {
        self.declare_doc_part(table_ref)?;
        let mut row = DocPartRow::new(did, rid, pid, seq);

        for (name, value) in obj {
            match value {
                DocValue::Object(child_obj) => {
                    let child = self
                        .registry
                        .child(table_ref, TableRefKey::attr(name), false);
                    let identifier = self.field_column(table_ref, name, DocType::Child)?;
                    row.push_field(identifier, DocValue::Bool(false));
                    self.declare_doc_part(child)?;
                    if !child_obj.is_empty() {
                        let child_rid = self.rids.next_rid(child)?;
                        self.shred_object(child, child_obj, did, child_rid, Some(rid), None)?;
                    }
                }
                DocValue::Array(items) => {
                    let child = self
                        .registry
                        .child(table_ref, TableRefKey::attr(name), true);
                    let identifier = self.field_column(table_ref, name, DocType::Child)?;
                    row.push_field(identifier, DocValue::Bool(true));
                    self.declare_doc_part(child)?;
                    self.shred_array(child, items, did, rid)?;
                }
                scalar => {
                    let scalar_type =
                        scalar
                            .scalar_type()
                            .ok_or_else(|| SchemaError::Invariant {
                                detail: "container value in scalar position".to_string(),
                            })?;
                    let identifier = self.field_column(table_ref, name, scalar_type)?;
                    row.push_field(identifier, scalar.clone());
                }
            }
        }

        self.push_row(table_ref, row)
    }

    fn shred_array(
        &mut self,
        table_ref: TableRef,
        items: &[DocValue],
        did: i64,
        pid: i64,
    ) -> Result<()> {
        for (position, item) in items.iter().enumerate() {
            let seq = Some(position as u32);
            match item {
                DocValue::Object(obj) => {
                    // object element: its attributes shred into this row
                    let rid = self.rids.next_rid(table_ref)?;
                    self.shred_object(table_ref, obj, did, rid, Some(pid), seq)?;
                }
                DocValue::Array(inner) => {
                    // nested array: a Child scalar marker row, elements in
                    // an array-element child table under the marker's rid
                    let child = self
                        .registry
                        .child(table_ref, TableRefKey::ArrayElement, true);
                    let identifier = self.scalar_column(table_ref, DocType::Child)?;
                    let rid = self.rids.next_rid(table_ref)?;
                    let mut row = DocPartRow::new(did, rid, Some(pid), seq);
                    row.set_scalar(identifier, DocValue::Bool(true));
                    self.push_row(table_ref, row)?;
                    self.declare_doc_part(child)?;
                    self.shred_array(child, inner, did, rid)?;
                }
                scalar => {
                    let scalar_type =
                        scalar
                            .scalar_type()
                            .ok_or_else(|| SchemaError::Invariant {
                                detail: "container value in scalar position".to_string(),
                            })?;
                    let identifier = self.scalar_column(table_ref, scalar_type)?;
                    let rid = self.rids.next_rid(table_ref)?;
                    let mut row = DocPartRow::new(did, rid, Some(pid), seq);
                    row.set_scalar(identifier, scalar.clone());
                    self.push_row(table_ref, row)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rid::RidGenerator;
    use shale_concurrency::MutSnapshot;
    use shale_core::doc_from_json;
    use shale_core::meta::MetaSnapshot;
    use serde_json::json;

    struct Fixture {
        overlay: MutSnapshot,
        rids: RidGenerator,
        factory: IdentifierFactory,
    }

    fn fixture() -> Fixture {
        let registry = Arc::new(TableRefRegistry::new());
        let rids = RidGenerator::new(registry);
        let mut overlay = MutSnapshot::new(Arc::new(MetaSnapshot::empty()), 0);
        overlay
            .add_database("db", "db".to_string())
            .unwrap()
            .add_collection("clients", "clients".to_string())
            .unwrap();
        Fixture {
            overlay,
            rids,
            factory: IdentifierFactory::default(),
        }
    }

    fn translate_all(fixture: &mut Fixture, docs: &[serde_json::Value]) -> CollectionData {
        let collection = fixture
            .overlay
            .database_mut("db")
            .unwrap()
            .collection_mut("clients")
            .unwrap();
        let mut translator = Translator::new(
            &fixture.factory,
            fixture.rids.scoped("db", "clients"),
            collection,
        );
        for doc in docs {
            let doc = doc_from_json(doc.clone()).unwrap();
            translator.translate(&doc).unwrap();
        }
        translator.into_collection_data()
    }

    #[test]
    fn test_flat_document_single_root_row() {
        let mut fx = fixture();
        let data = translate_all(&mut fx, &[json!({"x": 1, "name": "ada"})]);
        assert_eq!(data.len(), 1);
        let root = data.ordered_doc_part_data().next().unwrap();
        assert_eq!(root.len(), 1);
        let row = &root.rows()[0];
        assert_eq!(row.did, row.rid);
        assert_eq!(row.pid, None);
        assert_eq!(row.seq, None);
        assert_eq!(row.fields().len(), 2);
    }

    #[test]
    fn test_second_translation_reuses_columns() {
        let mut fx = fixture();
        let doc = json!({"x": 1, "y": {"z": "s"}, "arr": [1, "s"]});
        translate_all(&mut fx, &[doc.clone(), doc]);

        let part = fx
            .overlay
            .database("db")
            .unwrap()
            .collection("clients")
            .unwrap()
            .doc_part(TableRef::ROOT)
            .unwrap();
        // x:int + y:child + arr:child, declared exactly once each
        assert_eq!(part.added_fields().len(), 3);
    }

    #[test]
    fn test_type_divergence_makes_two_columns() {
        let mut fx = fixture();
        translate_all(&mut fx, &[json!({"x": 1}), json!({"x": "one"})]);
        let part = fx
            .overlay
            .database("db")
            .unwrap()
            .collection("clients")
            .unwrap()
            .doc_part(TableRef::ROOT)
            .unwrap();
        assert!(part.field("x", DocType::Int).is_some());
        assert!(part.field("x", DocType::String).is_some());
        assert_eq!(part.added_fields().len(), 2);
    }

    #[test]
    fn test_null_is_a_column_type_not_absence() {
        let mut fx = fixture();
        translate_all(&mut fx, &[json!({"x": null})]);
        let part = fx
            .overlay
            .database("db")
            .unwrap()
            .collection("clients")
            .unwrap()
            .doc_part(TableRef::ROOT)
            .unwrap();
        assert!(part.field("x", DocType::Null).is_some());
    }

    #[test]
    fn test_empty_nested_object_declares_table_emits_no_rows() {
        let mut fx = fixture();
        let data = translate_all(&mut fx, &[json!({"y": {}})]);
        // the child table is declared
        let collection = fx
            .overlay
            .database("db")
            .unwrap()
            .collection("clients")
            .unwrap();
        assert_eq!(collection.added_doc_parts().len(), 2);
        // but only the root row exists
        assert_eq!(data.row_count(), 1);
    }

    #[test]
    fn test_empty_root_document_still_emits_root_row() {
        let mut fx = fixture();
        let data = translate_all(&mut fx, &[json!({})]);
        assert_eq!(data.row_count(), 1);
    }

    #[test]
    fn test_empty_object_array_element_emits_row() {
        let mut fx = fixture();
        let data = translate_all(&mut fx, &[json!({"arr": [{}]})]);
        // root row + one element row holding its seq position
        assert_eq!(data.row_count(), 2);
        let arr_part = data.ordered_doc_part_data().last().unwrap();
        assert_eq!(arr_part.rows()[0].seq, Some(0));
    }

    #[test]
    fn test_deep_nesting_depth_ordering() {
        let mut fx = fixture();
        let data = translate_all(
            &mut fx,
            &[json!({"a": {"b": {"c": [1, [2, 3]]}}, "flat": true})],
        );
        let depths: Vec<u16> = data.ordered_doc_part_data().map(|p| p.depth()).collect();
        let mut sorted = depths.clone();
        sorted.sort_unstable();
        assert_eq!(depths, sorted);
        // root, a, a.b, a.b.c[], a.b.c[].$[]
        assert_eq!(data.len(), 5);
    }

    #[test]
    fn test_object_element_fields_live_in_array_table() {
        let mut fx = fixture();
        let data = translate_all(&mut fx, &[json!({"arr": [{"k": 7}]})]);
        let arr_part = data.ordered_doc_part_data().last().unwrap();
        let row = &arr_part.rows()[0];
        assert_eq!(row.seq, Some(0));
        assert_eq!(row.fields().len(), 1);
        assert_eq!(row.fields()[0].value, DocValue::Int(7));
        assert!(row.scalar().is_none());
    }

    #[test]
    fn test_mixed_array_per_element_type_decides() {
        let mut fx = fixture();
        let data = translate_all(&mut fx, &[json!({"arr": [1, "s", {"k": 1}, [2]]})]);

        let parts: Vec<&DocPartData> = data.ordered_doc_part_data().collect();
        // root, arr[], arr[].$[]
        assert_eq!(parts.len(), 3);
        let arr = parts[1];
        assert_eq!(arr.len(), 4);

        // element 0: int scalar
        assert_eq!(arr.rows()[0].scalar().unwrap().value, DocValue::Int(1));
        // element 1: string scalar
        assert_eq!(
            arr.rows()[1].scalar().unwrap().value,
            DocValue::String("s".to_string())
        );
        // element 2: object row with a field, no scalar
        assert_eq!(arr.rows()[2].fields().len(), 1);
        assert!(arr.rows()[2].scalar().is_none());
        // element 3: child marker scalar (true = array)
        assert_eq!(arr.rows()[3].scalar().unwrap().value, DocValue::Bool(true));

        // the nested array's element landed under the marker row
        let inner = parts[2];
        assert_eq!(inner.len(), 1);
        assert_eq!(inner.rows()[0].pid, Some(arr.rows()[3].rid));
        assert_eq!(inner.rows()[0].seq, Some(0));
        assert_eq!(inner.rows()[0].scalar().unwrap().value, DocValue::Int(2));
    }

    #[test]
    fn test_numeric_width_is_not_coerced() {
        let mut fx = fixture();
        translate_all(
            &mut fx,
            &[json!({"n": 1}), json!({"n": 5000000000i64}), json!({"n": 1.5})],
        );
        let part = fx
            .overlay
            .database("db")
            .unwrap()
            .collection("clients")
            .unwrap()
            .doc_part(TableRef::ROOT)
            .unwrap();
        assert!(part.field("n", DocType::Int).is_some());
        assert!(part.field("n", DocType::Long).is_some());
        assert!(part.field("n", DocType::Double).is_some());
    }
}
