//! Table position tree (TableRef)
//!
//! A `TableRef` locates one relational table within a document's nesting
//! tree: the root, or a parent position plus a step (attribute name or
//! array element) and a flag marking whether the step descends into an
//! array.
//!
//! References are interned into an append-only arena addressed by index,
//! with the parent index and depth stored per node. Structural equality and
//! hashing collapse to index comparison; there are no reference cycles to
//! manage and depth lookups are O(1).
//!
//! The registry is shared (`Arc<TableRefRegistry>`) between the shredder,
//! the rid generator and the repository of one process; a `TableRef` is
//! only meaningful relative to the registry that interned it.

use crate::error::{Result, SchemaError};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Index of an interned table position
///
/// `Copy`, and cheap to compare/hash: equality is arena-index equality.
/// The derived `Ord` follows intern order, which is parent-before-child but
/// not depth-sorted across siblings' subtrees; depth ordering of row
/// batches uses the stored depth, not this `Ord`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct TableRef(u32);

impl TableRef {
    /// The root table position
    pub const ROOT: TableRef = TableRef(0);

    /// Raw arena index (stable within one registry)
    pub fn index(&self) -> u32 {
        self.0
    }
}

/// One step from a parent table position to a child
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TableRefKey {
    /// Descend through an object attribute
    Attribute(String),
    /// Descend into the elements of an array nested directly in an array
    ArrayElement,
}

impl TableRefKey {
    /// Convenience constructor for attribute steps
    pub fn attr(name: &str) -> Self {
        TableRefKey::Attribute(name.to_string())
    }
}

#[derive(Debug, Clone)]
struct TableRefNode {
    parent: Option<TableRef>,
    key: Option<TableRefKey>,
    in_array: bool,
    depth: u16,
}

#[derive(Debug, Default)]
struct RegistryInner {
    nodes: Vec<TableRefNode>,
    children: FxHashMap<(TableRef, TableRefKey, bool), TableRef>,
}

/// Append-only interner for table positions
///
/// `child` is idempotent: the same (parent, key, in_array) triple always
/// returns the same `TableRef`.
#[derive(Debug)]
pub struct TableRefRegistry {
    inner: RwLock<RegistryInner>,
}

impl Default for TableRefRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TableRefRegistry {
    /// Create a registry containing only the root position
    pub fn new() -> Self {
        let root = TableRefNode {
            parent: None,
            key: None,
            in_array: false,
            depth: 0,
        };
        TableRefRegistry {
            inner: RwLock::new(RegistryInner {
                nodes: vec![root],
                children: FxHashMap::default(),
            }),
        }
    }

    /// The root table position
    pub fn root(&self) -> TableRef {
        TableRef::ROOT
    }

    /// Intern the child position reached from `parent` through `key`
    ///
    /// `in_array` marks an array step (the child table's rows carry `seq`).
    pub fn child(&self, parent: TableRef, key: TableRefKey, in_array: bool) -> TableRef {
        {
            let inner = self.inner.read();
            if let Some(existing) = inner.children.get(&(parent, key.clone(), in_array)) {
                return *existing;
            }
        }
        let mut inner = self.inner.write();
        // Re-check under the write lock: another thread may have interned it
        if let Some(existing) = inner.children.get(&(parent, key.clone(), in_array)) {
            return *existing;
        }
        let depth = inner.nodes[parent.0 as usize].depth + 1;
        let id = TableRef(inner.nodes.len() as u32);
        inner.nodes.push(TableRefNode {
            parent: Some(parent),
            key: Some(key.clone()),
            in_array,
            depth,
        });
        inner.children.insert((parent, key, in_array), id);
        id
    }

    /// Number of steps from the root (root has depth 0)
    pub fn depth(&self, r: TableRef) -> u16 {
        self.inner.read().nodes[r.0 as usize].depth
    }

    /// Parent position, or `None` at the root
    pub fn parent(&self, r: TableRef) -> Option<TableRef> {
        self.inner.read().nodes[r.0 as usize].parent
    }

    /// Whether `r` was reached through an array step
    pub fn is_in_array(&self, r: TableRef) -> bool {
        self.inner.read().nodes[r.0 as usize].in_array
    }

    /// Steps from the root down to `r`, in order
    pub fn segments(&self, r: TableRef) -> Vec<(TableRefKey, bool)> {
        let inner = self.inner.read();
        let mut segs = Vec::new();
        let mut cur = r;
        while let Some(parent) = inner.nodes[cur.0 as usize].parent {
            let node = &inner.nodes[cur.0 as usize];
            // key is always present on non-root nodes
            if let Some(key) = node.key.clone() {
                segs.push((key, node.in_array));
            }
            cur = parent;
        }
        segs.reverse();
        segs
    }

    /// Human-inspectable path for error messages and logging
    ///
    /// The root renders as `/`; array steps get a `[]` suffix and array
    /// element steps render as `$`, e.g. `a.arr[].$[]`.
    pub fn path(&self, r: TableRef) -> String {
        let segs = self.segments(r);
        if segs.is_empty() {
            return "/".to_string();
        }
        let mut out = String::new();
        for (i, (key, in_array)) in segs.iter().enumerate() {
            if i > 0 {
                out.push('.');
            }
            match key {
                TableRefKey::Attribute(name) => out.push_str(name),
                TableRefKey::ArrayElement => out.push('$'),
            }
            if *in_array {
                out.push_str("[]");
            }
        }
        out
    }

    /// Look up an already-interned child without creating it
    pub fn find_child(
        &self,
        parent: TableRef,
        key: &TableRefKey,
        in_array: bool,
    ) -> Option<TableRef> {
        self.inner
            .read()
            .children
            .get(&(parent, key.clone(), in_array))
            .copied()
    }

    /// Intern a full path of steps, returning the final position
    ///
    /// Used by snapshot loaders that rebuild positions from persisted
    /// catalog paths. Fails on an empty attribute name.
    pub fn intern_path(&self, segments: &[(TableRefKey, bool)]) -> Result<TableRef> {
        let mut cur = self.root();
        for (key, in_array) in segments {
            if let TableRefKey::Attribute(name) = key {
                if name.is_empty() {
                    return Err(SchemaError::InvalidName {
                        name: String::new(),
                        reason: "empty table path segment".to_string(),
                    });
                }
            }
            cur = self.child(cur, key.clone(), *in_array);
        }
        Ok(cur)
    }

    /// Number of interned positions (root included)
    pub fn len(&self) -> usize {
        self.inner.read().nodes.len()
    }

    /// True when only the root has been interned
    pub fn is_empty(&self) -> bool {
        self.len() == 1
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    static_assertions::assert_impl_all!(TableRefRegistry: Send, Sync);

    #[test]
    fn test_root_depth_zero() {
        let reg = TableRefRegistry::new();
        assert_eq!(reg.depth(reg.root()), 0);
        assert_eq!(reg.parent(reg.root()), None);
        assert_eq!(reg.path(reg.root()), "/");
    }

    #[test]
    fn test_child_is_idempotent() {
        let reg = TableRefRegistry::new();
        let a = reg.child(reg.root(), TableRefKey::attr("a"), false);
        let b = reg.child(reg.root(), TableRefKey::attr("a"), false);
        assert_eq!(a, b);
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn test_array_flag_distinguishes_positions() {
        let reg = TableRefRegistry::new();
        let obj = reg.child(reg.root(), TableRefKey::attr("a"), false);
        let arr = reg.child(reg.root(), TableRefKey::attr("a"), true);
        assert_ne!(obj, arr);
    }

    #[test]
    fn test_depth_increases_per_step() {
        let reg = TableRefRegistry::new();
        let a = reg.child(reg.root(), TableRefKey::attr("a"), false);
        let b = reg.child(a, TableRefKey::attr("b"), true);
        let c = reg.child(b, TableRefKey::ArrayElement, true);
        assert_eq!(reg.depth(a), 1);
        assert_eq!(reg.depth(b), 2);
        assert_eq!(reg.depth(c), 3);
        assert_eq!(reg.parent(c), Some(b));
    }

    #[test]
    fn test_path_rendering() {
        let reg = TableRefRegistry::new();
        let y = reg.child(reg.root(), TableRefKey::attr("y"), false);
        let arr = reg.child(y, TableRefKey::attr("arr"), true);
        let inner = reg.child(arr, TableRefKey::ArrayElement, true);
        assert_eq!(reg.path(y), "y");
        assert_eq!(reg.path(arr), "y.arr[]");
        assert_eq!(reg.path(inner), "y.arr[].$[]");
    }

    #[test]
    fn test_segments_round_trip_through_intern_path() {
        let reg = TableRefRegistry::new();
        let y = reg.child(reg.root(), TableRefKey::attr("y"), false);
        let arr = reg.child(y, TableRefKey::attr("arr"), true);

        let other = TableRefRegistry::new();
        let rebuilt = other.intern_path(&reg.segments(arr)).unwrap();
        assert_eq!(other.path(rebuilt), reg.path(arr));
        assert_eq!(other.depth(rebuilt), reg.depth(arr));
    }

    #[test]
    fn test_intern_path_rejects_empty_segment() {
        let reg = TableRefRegistry::new();
        let err = reg
            .intern_path(&[(TableRefKey::attr(""), false)])
            .unwrap_err();
        assert!(matches!(err, SchemaError::InvalidName { .. }));
    }

    #[test]
    fn test_find_child_does_not_intern() {
        let reg = TableRefRegistry::new();
        assert_eq!(
            reg.find_child(reg.root(), &TableRefKey::attr("a"), false),
            None
        );
        assert_eq!(reg.len(), 1);
        let a = reg.child(reg.root(), TableRefKey::attr("a"), false);
        assert_eq!(
            reg.find_child(reg.root(), &TableRefKey::attr("a"), false),
            Some(a)
        );
    }

    #[test]
    fn test_concurrent_interning_agrees() {
        let reg = Arc::new(TableRefRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let reg = Arc::clone(&reg);
                std::thread::spawn(move || {
                    let a = reg.child(reg.root(), TableRefKey::attr("shared"), true);
                    reg.child(a, TableRefKey::ArrayElement, true)
                })
            })
            .collect();
        let results: Vec<TableRef> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(results.windows(2).all(|w| w[0] == w[1]));
        // root + two interned positions, regardless of thread count
        assert_eq!(reg.len(), 3);
    }
}
