//! Shredded row carriers
//!
//! Rows produced by the shredder, grouped per table position and handed to
//! the insert pipeline as one `CollectionData`. Every row carries the
//! synthetic linkage columns that reconstruct document structure from flat
//! tables:
//!
//! - `did` — document id, identifies the root document
//! - `rid` — row id, unique within its table
//! - `pid` — parent row id (`None` at the root table)
//! - `seq` — ordinal position when the row represents an array element
//!
//! Linkage consistency is validated on append; a violation is a structural
//! error, never user data.

use crate::error::{Result, SchemaError};
use crate::table_ref::TableRef;
use crate::value::DocValue;

/// One column value of a shredded row
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnValue {
    /// Storage column identifier
    pub identifier: String,
    /// The value to store
    pub value: DocValue,
}

/// One shredded row
#[derive(Debug, Clone, PartialEq)]
pub struct DocPartRow {
    /// Document id
    pub did: i64,
    /// Row id, unique within the table
    pub rid: i64,
    /// Parent row id; `None` only at the root table
    pub pid: Option<i64>,
    /// Array element position; `None` outside array tables
    pub seq: Option<u32>,
    fields: Vec<ColumnValue>,
    scalar: Option<ColumnValue>,
}

impl DocPartRow {
    /// Create a row with empty column values
    pub fn new(did: i64, rid: i64, pid: Option<i64>, seq: Option<u32>) -> Self {
        DocPartRow {
            did,
            rid,
            pid,
            seq,
            fields: Vec::new(),
            scalar: None,
        }
    }

    /// Record one attribute column value
    pub fn push_field(&mut self, identifier: String, value: DocValue) {
        self.fields.push(ColumnValue { identifier, value });
    }

    /// Record the scalar column value of an array element row
    pub fn set_scalar(&mut self, identifier: String, value: DocValue) {
        self.scalar = Some(ColumnValue { identifier, value });
    }

    /// Attribute column values, in shredding order
    pub fn fields(&self) -> &[ColumnValue] {
        &self.fields
    }

    /// Scalar column value, when this row is a scalar array element
    pub fn scalar(&self) -> Option<&ColumnValue> {
        self.scalar.as_ref()
    }

    fn validate(&self) -> Result<()> {
        match self.pid {
            None => {
                if self.did != self.rid {
                    return Err(SchemaError::InconsistentRow {
                        detail: format!(
                            "root row with did {} != rid {}",
                            self.did, self.rid
                        ),
                    });
                }
                if self.seq.is_some() {
                    return Err(SchemaError::InconsistentRow {
                        detail: format!("root row {} with seq", self.rid),
                    });
                }
            }
            Some(_) => {}
        }
        Ok(())
    }
}

/// Rows accumulated for one table position
#[derive(Debug, Clone)]
pub struct DocPartData {
    table_ref: TableRef,
    depth: u16,
    rows: Vec<DocPartRow>,
}

impl DocPartData {
    /// Create an empty batch for a table position
    pub fn new(table_ref: TableRef, depth: u16) -> Self {
        DocPartData {
            table_ref,
            depth,
            rows: Vec::new(),
        }
    }

    /// Table position of this batch
    pub fn table_ref(&self) -> TableRef {
        self.table_ref
    }

    /// Nesting depth of the table position
    pub fn depth(&self) -> u16 {
        self.depth
    }

    /// Append a row after validating its linkage
    pub fn push(&mut self, row: DocPartRow) -> Result<()> {
        row.validate()?;
        self.rows.push(row);
        Ok(())
    }

    /// Rows in emission order
    pub fn rows(&self) -> &[DocPartRow] {
        &self.rows
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when no rows were emitted
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// All row batches of one translator, ordered for insertion
///
/// Iteration yields non-decreasing table depth, so parent tables are always
/// materialized before their children.
#[derive(Debug, Clone)]
pub struct CollectionData {
    parts: Vec<DocPartData>,
}

impl CollectionData {
    /// Build from unordered batches; sorts by (depth, table position)
    pub fn new(mut parts: Vec<DocPartData>) -> Self {
        parts.sort_by_key(|p| (p.depth(), p.table_ref()));
        CollectionData { parts }
    }

    /// Batches in ascending table depth
    pub fn ordered_doc_part_data(&self) -> impl Iterator<Item = &DocPartData> {
        self.parts.iter()
    }

    /// Number of table batches
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// True when nothing was translated
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Total row count across all batches
    pub fn row_count(&self) -> usize {
        self.parts.iter().map(DocPartData::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table_ref::{TableRefKey, TableRefRegistry};

    #[test]
    fn test_root_row_requires_did_eq_rid() {
        let mut data = DocPartData::new(TableRef::ROOT, 0);
        let err = data.push(DocPartRow::new(1, 2, None, None)).unwrap_err();
        assert!(matches!(err, SchemaError::InconsistentRow { .. }));
        data.push(DocPartRow::new(1, 1, None, None)).unwrap();
    }

    #[test]
    fn test_root_row_rejects_seq() {
        let mut data = DocPartData::new(TableRef::ROOT, 0);
        let err = data
            .push(DocPartRow::new(1, 1, None, Some(0)))
            .unwrap_err();
        assert!(matches!(err, SchemaError::InconsistentRow { .. }));
    }

    #[test]
    fn test_child_row_accepts_seq_and_divergent_did() {
        let reg = TableRefRegistry::new();
        let child = reg.child(reg.root(), TableRefKey::attr("a"), true);
        let mut data = DocPartData::new(child, reg.depth(child));
        data.push(DocPartRow::new(1, 7, Some(1), Some(0))).unwrap();
        assert_eq!(data.len(), 1);
    }

    #[test]
    fn test_collection_data_orders_by_depth() {
        let reg = TableRefRegistry::new();
        let a = reg.child(reg.root(), TableRefKey::attr("a"), false);
        let b = reg.child(a, TableRefKey::attr("b"), true);

        let deep = DocPartData::new(b, reg.depth(b));
        let mid = DocPartData::new(a, reg.depth(a));
        let root = DocPartData::new(reg.root(), 0);

        let data = CollectionData::new(vec![deep, root, mid]);
        let depths: Vec<u16> = data.ordered_doc_part_data().map(|p| p.depth()).collect();
        assert_eq!(depths, vec![0, 1, 2]);
    }

    #[test]
    fn test_row_values_kept_in_order() {
        let mut row = DocPartRow::new(1, 1, None, None);
        row.push_field("x_i".to_string(), DocValue::Int(1));
        row.push_field("y_x".to_string(), DocValue::Bool(false));
        assert_eq!(row.fields()[0].identifier, "x_i");
        assert_eq!(row.fields()[1].identifier, "y_x");
        assert!(row.scalar().is_none());
    }
}
