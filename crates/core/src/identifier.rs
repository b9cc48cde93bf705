//! Identifier factory
//!
//! Derives storage-safe identifiers (schema/table/column names) from
//! document-level names. Pure: the same input in the same scope always
//! produces the same output, and two different inputs never collide within
//! a scope. Callers resolve existing names through their scope first and
//! only mint identifiers for names seen for the first time.
//!
//! Encoding rules:
//! - lowercase ASCII fold; every character outside `[a-z0-9_]` maps to `_`;
//!   a leading digit gets a `_` prefix; reserved words get a `_` prefix
//! - candidates over the length cap are truncated and suffixed with a hex
//!   FNV-1a hash of the full candidate, keeping them collision-resistant
//! - table identifiers encode the table position path; field identifiers
//!   encode the value type suffix, because two fields sharing a name but
//!   differing in type must get different columns
//! - a candidate already taken in the scope by a different source name gets
//!   a `_1`, `_2`, ... counter appended

use crate::error::{Result, SchemaError};
use crate::table_ref::{TableRef, TableRefKey, TableRefRegistry};
use crate::value::DocType;
use once_cell::sync::Lazy;
use rustc_hash::FxHashSet;

/// Words that cannot be used bare as storage identifiers
static RESERVED_WORDS: Lazy<FxHashSet<&'static str>> = Lazy::new(|| {
    [
        "all", "and", "any", "as", "asc", "by", "case", "check", "column", "constraint",
        "create", "cross", "default", "delete", "desc", "distinct", "drop", "else", "end",
        "except", "false", "for", "foreign", "from", "grant", "group", "having", "in",
        "index", "inner", "insert", "intersect", "into", "is", "join", "key", "left",
        "like", "limit", "not", "null", "offset", "on", "or", "order", "outer", "primary",
        "references", "right", "select", "set", "table", "then", "true", "union", "unique",
        "update", "user", "using", "values", "when", "where", "with",
    ]
    .into_iter()
    .collect()
});

/// Rules the factory enforces on every identifier it emits
#[derive(Debug, Clone, Copy)]
pub struct IdentifierConstraints {
    /// Maximum identifier length in bytes
    pub max_len: usize,
}

impl Default for IdentifierConstraints {
    fn default() -> Self {
        // The common relational identifier cap
        IdentifierConstraints { max_len: 63 }
    }
}

/// Derives storage identifiers from document-level names
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentifierFactory {
    constraints: IdentifierConstraints,
}

fn fnv1a(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for b in bytes {
        hash ^= u32::from(*b);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

impl IdentifierFactory {
    /// Create a factory with explicit constraints
    pub fn new(constraints: IdentifierConstraints) -> Self {
        IdentifierFactory { constraints }
    }

    /// Fold a document-level name into the storage character set
    ///
    /// Fails only on an empty name.
    fn sanitize(&self, name: &str) -> Result<String> {
        if name.is_empty() {
            return Err(SchemaError::InvalidName {
                name: name.to_string(),
                reason: "empty name".to_string(),
            });
        }
        let mut out = String::with_capacity(name.len());
        for ch in name.chars() {
            match ch {
                'a'..='z' | '0'..='9' | '_' => out.push(ch),
                'A'..='Z' => out.push(ch.to_ascii_lowercase()),
                _ => out.push('_'),
            }
        }
        if out.as_bytes()[0].is_ascii_digit() {
            out.insert(0, '_');
        }
        if RESERVED_WORDS.contains(out.as_str()) {
            out.insert(0, '_');
        }
        Ok(out)
    }

    /// Enforce the length cap, keeping over-long candidates collision-resistant
    fn fit(&self, candidate: String) -> String {
        if candidate.len() <= self.constraints.max_len {
            return candidate;
        }
        let hash = fnv1a(candidate.as_bytes());
        let keep = self.constraints.max_len.saturating_sub(9);
        let mut out: String = candidate.chars().take(keep).collect();
        out.push('_');
        out.push_str(&format!("{hash:08x}"));
        out
    }

    /// Resolve scope collisions with a counter suffix
    ///
    /// `taken` must answer for the whole merged scope (committed entities
    /// plus the transaction's own additions).
    fn unique(&self, candidate: String, taken: impl Fn(&str) -> bool) -> String {
        let candidate = self.fit(candidate);
        if !taken(&candidate) {
            return candidate;
        }
        let mut counter = 1u32;
        loop {
            let attempt = self.fit(format!("{candidate}_{counter}"));
            if !taken(&attempt) {
                return attempt;
            }
            counter += 1;
        }
    }

    /// Identifier for a database
    pub fn database_identifier(
        &self,
        name: &str,
        taken: impl Fn(&str) -> bool,
    ) -> Result<String> {
        Ok(self.unique(self.sanitize(name)?, taken))
    }

    /// Identifier for a collection within a database
    pub fn collection_identifier(
        &self,
        name: &str,
        taken: impl Fn(&str) -> bool,
    ) -> Result<String> {
        Ok(self.unique(self.sanitize(name)?, taken))
    }

    /// Identifier for a doc part (table) within a collection
    ///
    /// Encodes the table position: the root part takes the collection
    /// identifier itself; child parts append one segment per step, array
    /// steps suffixed with `_e` and array-element steps rendered as `e`.
    pub fn doc_part_identifier(
        &self,
        registry: &TableRefRegistry,
        collection_identifier: &str,
        table_ref: TableRef,
        taken: impl Fn(&str) -> bool,
    ) -> Result<String> {
        let mut candidate = collection_identifier.to_string();
        for (key, in_array) in registry.segments(table_ref) {
            candidate.push('_');
            match key {
                TableRefKey::Attribute(name) => {
                    candidate.push_str(&self.sanitize(&name)?);
                    if in_array {
                        candidate.push_str("_e");
                    }
                }
                TableRefKey::ArrayElement => candidate.push('e'),
            }
        }
        Ok(self.unique(candidate, taken))
    }

    /// Identifier for a field column: sanitized name plus the type suffix
    pub fn field_identifier(
        &self,
        name: &str,
        field_type: DocType,
        taken: impl Fn(&str) -> bool,
    ) -> Result<String> {
        let candidate = format!(
            "{}_{}",
            self.sanitize(name)?,
            field_type.identifier_suffix()
        );
        Ok(self.unique(candidate, taken))
    }

    /// Identifier for a scalar column: `v_` plus the type suffix
    pub fn scalar_identifier(
        &self,
        scalar_type: DocType,
        taken: impl Fn(&str) -> bool,
    ) -> String {
        self.unique(format!("v_{}", scalar_type.identifier_suffix()), taken)
    }

    /// Identifier for an index over a doc part
    pub fn index_identifier(
        &self,
        doc_part_identifier: &str,
        column_identifiers: &[&str],
        taken: impl Fn(&str) -> bool,
    ) -> String {
        let mut candidate = format!("idx_{doc_part_identifier}");
        for col in column_identifiers {
            candidate.push('_');
            candidate.push_str(col);
        }
        self.unique(candidate, taken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn factory() -> IdentifierFactory {
        IdentifierFactory::default()
    }

    fn free(_: &str) -> bool {
        false
    }

    #[test]
    fn test_sanitize_case_fold_and_charset() {
        let id = factory().collection_identifier("MyCollection-2024!", free).unwrap();
        assert_eq!(id, "mycollection_2024_");
    }

    #[test]
    fn test_sanitize_leading_digit() {
        let id = factory().collection_identifier("1abc", free).unwrap();
        assert_eq!(id, "_1abc");
    }

    #[test]
    fn test_sanitize_empty_name_fails() {
        let err = factory().collection_identifier("", free).unwrap_err();
        assert!(matches!(err, SchemaError::InvalidName { .. }));
    }

    #[test]
    fn test_reserved_word_is_prefixed() {
        let id = factory().collection_identifier("select", free).unwrap();
        assert_eq!(id, "_select");
        let id = factory().collection_identifier("user", free).unwrap();
        assert_eq!(id, "_user");
    }

    #[test]
    fn test_long_name_is_truncated_with_hash() {
        let long = "x".repeat(200);
        let id = factory().collection_identifier(&long, free).unwrap();
        assert!(id.len() <= 63);
        // deterministic
        assert_eq!(id, factory().collection_identifier(&long, free).unwrap());
        // distinct from a different long name
        let other = format!("{}y", "x".repeat(199));
        assert_ne!(id, factory().collection_identifier(&other, free).unwrap());
    }

    #[test]
    fn test_collision_counter() {
        let id = factory()
            .collection_identifier("col", |candidate| candidate == "col")
            .unwrap();
        assert_eq!(id, "col_1");
        let id = factory()
            .collection_identifier("col", |candidate| candidate == "col" || candidate == "col_1")
            .unwrap();
        assert_eq!(id, "col_2");
    }

    #[test]
    fn test_field_identifier_encodes_type() {
        let f = factory();
        let int_id = f.field_identifier("age", DocType::Int, free).unwrap();
        let str_id = f.field_identifier("age", DocType::String, free).unwrap();
        assert_eq!(int_id, "age_i");
        assert_eq!(str_id, "age_s");
        assert_ne!(int_id, str_id);
    }

    #[test]
    fn test_scalar_identifier_encodes_type() {
        let f = factory();
        assert_eq!(f.scalar_identifier(DocType::Long, free), "v_l");
        assert_eq!(f.scalar_identifier(DocType::Child, free), "v_x");
    }

    #[test]
    fn test_scalar_identifier_avoids_field_collision() {
        // an attribute literally named "v" of string type already owns v_s
        let f = factory();
        let id = f.scalar_identifier(DocType::String, |c| c == "v_s");
        assert_eq!(id, "v_s_1");
    }

    #[test]
    fn test_doc_part_identifier_encodes_path() {
        let reg = TableRefRegistry::new();
        let f = factory();
        let root_id = f
            .doc_part_identifier(&reg, "clients", reg.root(), free)
            .unwrap();
        assert_eq!(root_id, "clients");

        let y = reg.child(reg.root(), TableRefKey::attr("y"), false);
        let arr = reg.child(y, TableRefKey::attr("arr"), true);
        let inner = reg.child(arr, TableRefKey::ArrayElement, true);
        assert_eq!(
            f.doc_part_identifier(&reg, "clients", y, free).unwrap(),
            "clients_y"
        );
        assert_eq!(
            f.doc_part_identifier(&reg, "clients", arr, free).unwrap(),
            "clients_y_arr_e"
        );
        assert_eq!(
            f.doc_part_identifier(&reg, "clients", inner, free).unwrap(),
            "clients_y_arr_e_e"
        );
    }

    #[test]
    fn test_index_identifier() {
        let f = factory();
        assert_eq!(
            f.index_identifier("clients", &["age_i", "name_s"], free),
            "idx_clients_age_i_name_s"
        );
    }

    proptest! {
        #[test]
        fn prop_identifiers_are_storage_safe(name in ".{1,100}") {
            let f = factory();
            if let Ok(id) = f.collection_identifier(&name, free) {
                prop_assert!(!id.is_empty());
                prop_assert!(id.len() <= 63);
                prop_assert!(id.chars().all(|c| matches!(c, 'a'..='z' | '0'..='9' | '_')));
                prop_assert!(!id.as_bytes()[0].is_ascii_digit());
                // deterministic in the same (empty) scope
                prop_assert_eq!(id, f.collection_identifier(&name, free).unwrap());
            }
        }
    }
}
