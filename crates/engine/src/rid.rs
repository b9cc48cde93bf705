//! Row identifier generator
//!
//! Issues monotonically increasing row ids scoped by (database, collection,
//! table position). Counters are sharded two levels deep in `DashMap`s so
//! unrelated scopes never contend on a shared lock; the counters themselves
//! are atomics, safe to advance from parallel shredding workers.
//!
//! `set_next_rid` only ever moves a counter forward, so seeding from
//! persisted high-water marks at restart can never reissue an id.
//! Exhaustion of a counter is fatal for that scope and surfaced as
//! `SchemaError::RidExhausted`, distinct from any merge conflict.

use dashmap::DashMap;
use shale_core::{Result, RidHighWaterMark, SchemaError, TableRef, TableRefRegistry};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CollectionScope {
    database: String,
    collection: String,
}

#[derive(Debug, Default)]
struct TableCounters {
    counters: DashMap<TableRef, Arc<AtomicI64>>,
}

impl TableCounters {
    fn counter(&self, table_ref: TableRef) -> Arc<AtomicI64> {
        Arc::clone(
            &self
                .counters
                .entry(table_ref)
                .or_insert_with(|| Arc::new(AtomicI64::new(0))),
        )
    }
}

/// Process-wide row id counters for all scopes
#[derive(Debug)]
pub struct RidGenerator {
    registry: Arc<TableRefRegistry>,
    scopes: DashMap<CollectionScope, Arc<TableCounters>>,
}

impl RidGenerator {
    /// Create a generator over a shared table position registry
    pub fn new(registry: Arc<TableRefRegistry>) -> Self {
        RidGenerator {
            registry,
            scopes: DashMap::new(),
        }
    }

    /// The table position registry the generator resolves paths through
    pub fn registry(&self) -> &Arc<TableRefRegistry> {
        &self.registry
    }

    /// A generator bound to one (database, collection) scope
    ///
    /// Saves re-qualifying every call with the full path; the scoped
    /// generator shares the same counters.
    pub fn scoped(&self, database: &str, collection: &str) -> ScopedRidGenerator {
        let scope = CollectionScope {
            database: database.to_string(),
            collection: collection.to_string(),
        };
        let tables = Arc::clone(&self.scopes.entry(scope).or_default());
        ScopedRidGenerator {
            registry: Arc::clone(&self.registry),
            database: database.to_string(),
            collection: collection.to_string(),
            tables,
        }
    }

    /// Issue the next row id in a scope
    ///
    /// # Errors
    ///
    /// `SchemaError::RidExhausted` when the scope's id space is used up.
    pub fn next_rid(&self, database: &str, collection: &str, table_ref: TableRef) -> Result<i64> {
        self.scoped(database, collection).next_rid(table_ref)
    }

    /// Seed a scope's counter from a persisted high-water mark
    ///
    /// Never moves the counter backward.
    pub fn set_next_rid(
        &self,
        database: &str,
        collection: &str,
        table_ref: TableRef,
        value: i64,
    ) {
        self.scoped(database, collection)
            .set_next_rid(table_ref, value);
    }

    /// Seed every counter from persisted marks (snapshot restore)
    pub fn restore(&self, marks: &[RidHighWaterMark]) {
        for mark in marks {
            self.set_next_rid(&mark.database, &mark.collection, mark.table_ref, mark.next);
        }
    }

    /// Current high-water marks of every scope, for persistence
    pub fn high_water_marks(&self) -> Vec<RidHighWaterMark> {
        let mut marks = Vec::new();
        for scope in self.scopes.iter() {
            for counter in scope.value().counters.iter() {
                marks.push(RidHighWaterMark {
                    database: scope.key().database.clone(),
                    collection: scope.key().collection.clone(),
                    table_ref: *counter.key(),
                    next: counter.value().load(Ordering::SeqCst),
                });
            }
        }
        marks
    }
}

/// Row id generator bound to one (database, collection)
#[derive(Debug)]
pub struct ScopedRidGenerator {
    registry: Arc<TableRefRegistry>,
    database: String,
    collection: String,
    tables: Arc<TableCounters>,
}

impl ScopedRidGenerator {
    /// The table position registry behind this scope
    pub fn registry(&self) -> &Arc<TableRefRegistry> {
        &self.registry
    }

    /// Issue the next row id for a table position
    ///
    /// # Errors
    ///
    /// `SchemaError::RidExhausted` when the position's id space is used up.
    pub fn next_rid(&self, table_ref: TableRef) -> Result<i64> {
        let counter = self.tables.counter(table_ref);
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |next| {
                next.checked_add(1)
            })
            .map_err(|_| SchemaError::RidExhausted {
                database: self.database.clone(),
                collection: self.collection.clone(),
                path: self.registry.path(table_ref),
            })
    }

    /// Seed the counter for a table position; never moves it backward
    pub fn set_next_rid(&self, table_ref: TableRef, value: i64) {
        self.tables
            .counter(table_ref)
            .fetch_max(value, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shale_core::TableRefKey;
    use std::collections::HashSet;
    use std::thread;

    static_assertions::assert_impl_all!(RidGenerator: Send, Sync);
    static_assertions::assert_impl_all!(ScopedRidGenerator: Send, Sync);

    fn generator() -> RidGenerator {
        RidGenerator::new(Arc::new(TableRefRegistry::new()))
    }

    #[test]
    fn test_ids_start_at_zero_and_increase() {
        let gen = generator();
        let root = gen.registry().root();
        assert_eq!(gen.next_rid("db", "col", root).unwrap(), 0);
        assert_eq!(gen.next_rid("db", "col", root).unwrap(), 1);
        assert_eq!(gen.next_rid("db", "col", root).unwrap(), 2);
    }

    #[test]
    fn test_scopes_are_independent() {
        let gen = generator();
        let root = gen.registry().root();
        let child = gen
            .registry()
            .child(root, TableRefKey::attr("a"), false);
        assert_eq!(gen.next_rid("db", "col", root).unwrap(), 0);
        assert_eq!(gen.next_rid("db", "col", child).unwrap(), 0);
        assert_eq!(gen.next_rid("db", "other", root).unwrap(), 0);
        assert_eq!(gen.next_rid("db2", "col", root).unwrap(), 0);
        assert_eq!(gen.next_rid("db", "col", root).unwrap(), 1);
    }

    #[test]
    fn test_set_next_rid_never_moves_backward() {
        let gen = generator();
        let root = gen.registry().root();
        gen.set_next_rid("db", "col", root, 100);
        assert_eq!(gen.next_rid("db", "col", root).unwrap(), 100);
        // a stale, lower mark must not reissue ids
        gen.set_next_rid("db", "col", root, 5);
        assert_eq!(gen.next_rid("db", "col", root).unwrap(), 101);
    }

    #[test]
    fn test_exhaustion_is_fatal_for_the_scope() {
        let gen = generator();
        let root = gen.registry().root();
        gen.set_next_rid("db", "col", root, i64::MAX);
        let err = gen.next_rid("db", "col", root).unwrap_err();
        assert!(matches!(err, SchemaError::RidExhausted { .. }));
        // other scopes are unaffected
        assert_eq!(gen.next_rid("db", "other", root).unwrap(), 0);
    }

    #[test]
    fn test_restore_round_trip() {
        let gen = generator();
        let root = gen.registry().root();
        gen.next_rid("db", "col", root).unwrap();
        gen.next_rid("db", "col", root).unwrap();

        let marks = gen.high_water_marks();
        let restored = RidGenerator::new(Arc::clone(gen.registry()));
        restored.restore(&marks);
        assert_eq!(restored.next_rid("db", "col", root).unwrap(), 2);
    }

    #[test]
    fn test_concurrent_issue_yields_distinct_ids() {
        // N threads, M ids each: all N*M values distinct
        const THREADS: usize = 8;
        const PER_THREAD: usize = 500;

        let gen = Arc::new(generator());
        let root = gen.registry().root();
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let gen = Arc::clone(&gen);
                thread::spawn(move || {
                    let scoped = gen.scoped("db", "col");
                    (0..PER_THREAD)
                        .map(|_| scoped.next_rid(root).unwrap())
                        .collect::<Vec<i64>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id), "rid {id} issued twice");
            }
        }
        assert_eq!(seen.len(), THREADS * PER_THREAD);
    }
}
