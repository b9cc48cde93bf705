//! Document value model
//!
//! This module defines:
//! - DocValue: the closed runtime value enum the shredder switches over
//! - DocType: the per-column type discriminator derived from a value
//! - DocObject: ordered attribute map, so shredding is deterministic
//! - BinarySubtype: sub-kind tag carried by binary blobs
//!
//! ## Type Rules
//!
//! - The set of runtime types is closed; every `match` over `DocValue` or
//!   `DocType` is exhaustive so that adding a type is a compile-visible
//!   change in the shredder and the overlay.
//! - Numeric width is part of the type: `Int(1) != Long(1)`. Nothing is
//!   coerced, because the store is statically typed per column.
//! - `Null` is a value with its own column type, not the absence of a field.
//! - `Double` equality follows IEEE-754: `NaN != NaN`, `-0.0 == 0.0`.
//! - Different types are NEVER equal, even when they print the same.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Ordered attribute map of a document object
///
/// A `BTreeMap` keeps attribute iteration deterministic, which makes
/// shredding output (row field order, discovery order) reproducible.
pub type DocObject = BTreeMap<String, DocValue>;

/// Sub-kind tag carried by a binary blob
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinarySubtype {
    /// Plain byte payload
    Generic,
    /// UUID payload
    Uuid,
    /// MD5 digest payload
    Md5,
    /// Application-defined tag
    UserDefined(u8),
}

/// Canonical runtime value for shredded documents
///
/// The scalar variants map one-to-one onto typed storage columns; `Array`
/// and `Object` never become column values themselves, they recurse into
/// child table positions during shredding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DocValue {
    /// Null value (a distinct column type, not field absence)
    Null,
    /// Boolean value
    Bool(bool),
    /// 32-bit signed integer
    Int(i32),
    /// 64-bit signed integer
    Long(i64),
    /// 64-bit floating point (IEEE-754)
    Double(f64),
    /// UTF-8 string
    String(String),
    /// Calendar date without time of day
    Date(NaiveDate),
    /// Time of day without date
    Time(NaiveTime),
    /// Date-time instant in UTC
    Instant(DateTime<Utc>),
    /// Binary blob with a sub-kind tag
    Binary {
        /// Sub-kind of the payload
        subtype: BinarySubtype,
        /// Raw bytes
        data: Vec<u8>,
    },
    /// 12-byte object identifier
    ObjectId([u8; 12]),
    /// (seconds, ordinal) replication timestamp pair
    Timestamp {
        /// Seconds since the epoch
        secs: u32,
        /// Ordinal within the second
        ordinal: u32,
    },
    /// Array of values (recurses into an array-step child table)
    Array(Vec<DocValue>),
    /// Object with string keys (recurses into an object-step child table)
    Object(DocObject),
}

// Custom PartialEq for IEEE-754 double semantics; different types are
// never equal.
impl PartialEq for DocValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (DocValue::Null, DocValue::Null) => true,
            (DocValue::Bool(a), DocValue::Bool(b)) => a == b,
            (DocValue::Int(a), DocValue::Int(b)) => a == b,
            (DocValue::Long(a), DocValue::Long(b)) => a == b,
            // IEEE-754: NaN != NaN, -0.0 == 0.0
            (DocValue::Double(a), DocValue::Double(b)) => a == b,
            (DocValue::String(a), DocValue::String(b)) => a == b,
            (DocValue::Date(a), DocValue::Date(b)) => a == b,
            (DocValue::Time(a), DocValue::Time(b)) => a == b,
            (DocValue::Instant(a), DocValue::Instant(b)) => a == b,
            (
                DocValue::Binary {
                    subtype: sa,
                    data: da,
                },
                DocValue::Binary {
                    subtype: sb,
                    data: db,
                },
            ) => sa == sb && da == db,
            (DocValue::ObjectId(a), DocValue::ObjectId(b)) => a == b,
            (
                DocValue::Timestamp {
                    secs: sa,
                    ordinal: oa,
                },
                DocValue::Timestamp {
                    secs: sb,
                    ordinal: ob,
                },
            ) => sa == sb && oa == ob,
            (DocValue::Array(a), DocValue::Array(b)) => a == b,
            (DocValue::Object(a), DocValue::Object(b)) => a == b,
            _ => false,
        }
    }
}

/// Column type discriminator
///
/// One variant per column-storable runtime type, plus `Child`: the marker
/// column type recorded on a parent row when an attribute's value is a
/// nested object or array. A document attribute that takes on two different
/// runtime types across documents gets two columns, one per type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DocType {
    /// Null column
    Null,
    /// Boolean column
    Bool,
    /// 32-bit integer column
    Int,
    /// 64-bit integer column
    Long,
    /// Double precision column
    Double,
    /// Text column
    String,
    /// Date column
    Date,
    /// Time-of-day column
    Time,
    /// Instant column
    Instant,
    /// Binary column
    Binary,
    /// Object identifier column
    ObjectId,
    /// Replication timestamp column
    Timestamp,
    /// Nested object/array marker column (value: false = object, true = array)
    Child,
}

impl DocType {
    /// Single-character identifier suffix encoded into column identifiers
    ///
    /// Two fields sharing a name but differing in type must get different
    /// storage identifiers; the suffix is what keeps them apart.
    pub fn identifier_suffix(&self) -> &'static str {
        match self {
            DocType::Null => "n",
            DocType::Bool => "b",
            DocType::Int => "i",
            DocType::Long => "l",
            DocType::Double => "d",
            DocType::String => "s",
            DocType::Date => "t",
            DocType::Time => "m",
            DocType::Instant => "c",
            DocType::Binary => "r",
            DocType::ObjectId => "o",
            DocType::Timestamp => "y",
            DocType::Child => "x",
        }
    }
}

impl fmt::Display for DocType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl DocValue {
    /// Column type of this value, or `None` for containers
    ///
    /// `Array` and `Object` have no scalar column type; the shredder
    /// declares a `Child` marker column for them and recurses instead.
    pub fn scalar_type(&self) -> Option<DocType> {
        match self {
            DocValue::Null => Some(DocType::Null),
            DocValue::Bool(_) => Some(DocType::Bool),
            DocValue::Int(_) => Some(DocType::Int),
            DocValue::Long(_) => Some(DocType::Long),
            DocValue::Double(_) => Some(DocType::Double),
            DocValue::String(_) => Some(DocType::String),
            DocValue::Date(_) => Some(DocType::Date),
            DocValue::Time(_) => Some(DocType::Time),
            DocValue::Instant(_) => Some(DocType::Instant),
            DocValue::Binary { .. } => Some(DocType::Binary),
            DocValue::ObjectId(_) => Some(DocType::ObjectId),
            DocValue::Timestamp { .. } => Some(DocType::Timestamp),
            DocValue::Array(_) => None,
            DocValue::Object(_) => None,
        }
    }

    /// Check if this is a null value
    pub fn is_null(&self) -> bool {
        matches!(self, DocValue::Null)
    }

    /// Check if this is an array value
    pub fn is_array(&self) -> bool {
        matches!(self, DocValue::Array(_))
    }

    /// Check if this is an object value
    pub fn is_object(&self) -> bool {
        matches!(self, DocValue::Object(_))
    }

    /// Get as &DocObject if this is an Object value
    pub fn as_object(&self) -> Option<&DocObject> {
        match self {
            DocValue::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Get as &[DocValue] if this is an Array value
    pub fn as_array(&self) -> Option<&[DocValue]> {
        match self {
            DocValue::Array(a) => Some(a),
            _ => None,
        }
    }
}

// ============================================================================
// From implementations for ergonomic API usage
// ============================================================================

impl From<&str> for DocValue {
    fn from(s: &str) -> Self {
        DocValue::String(s.to_string())
    }
}

impl From<String> for DocValue {
    fn from(s: String) -> Self {
        DocValue::String(s)
    }
}

impl From<bool> for DocValue {
    fn from(b: bool) -> Self {
        DocValue::Bool(b)
    }
}

impl From<i32> for DocValue {
    fn from(i: i32) -> Self {
        DocValue::Int(i)
    }
}

impl From<i64> for DocValue {
    fn from(i: i64) -> Self {
        DocValue::Long(i)
    }
}

impl From<f64> for DocValue {
    fn from(f: f64) -> Self {
        DocValue::Double(f)
    }
}

impl From<Vec<DocValue>> for DocValue {
    fn from(a: Vec<DocValue>) -> Self {
        DocValue::Array(a)
    }
}

impl From<DocObject> for DocValue {
    fn from(o: DocObject) -> Self {
        DocValue::Object(o)
    }
}

// ============================================================================
// serde_json interop for ergonomic document construction
// ============================================================================

impl From<serde_json::Value> for DocValue {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => DocValue::Null,
            serde_json::Value::Bool(b) => DocValue::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    // Narrow integers keep the narrow column type
                    if let Ok(i32v) = i32::try_from(i) {
                        DocValue::Int(i32v)
                    } else {
                        DocValue::Long(i)
                    }
                } else {
                    DocValue::Double(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => DocValue::String(s),
            serde_json::Value::Array(arr) => {
                DocValue::Array(arr.into_iter().map(DocValue::from).collect())
            }
            serde_json::Value::Object(obj) => DocValue::Object(
                obj.into_iter().map(|(k, v)| (k, DocValue::from(v))).collect(),
            ),
        }
    }
}

/// Convert a JSON object literal into a `DocObject`
///
/// Returns `None` when the JSON value is not an object.
pub fn doc_from_json(v: serde_json::Value) -> Option<DocObject> {
    match DocValue::from(v) {
        DocValue::Object(o) => Some(o),
        _ => None,
    }
}
