//! Shale - document-to-relational schema engine
//!
//! Shale maps schemaless, arbitrarily nested documents onto a normalized
//! relational layout and keeps the derived schema consistent when multiple
//! transactions discover new shape concurrently.
//!
//! # Quick Start
//!
//! ```
//! use shale::{
//!     doc_from_json, IdentifierFactory, RidGenerator, SchemaRepository,
//!     TableRefRegistry, Translator,
//! };
//! use std::sync::Arc;
//!
//! let registry = Arc::new(TableRefRegistry::new());
//! let rids = RidGenerator::new(Arc::clone(&registry));
//! let factory = IdentifierFactory::default();
//! let repo = SchemaRepository::new();
//!
//! // one write transaction
//! let mut overlay = repo.create_overlay();
//! overlay
//!     .add_database("db", "db".to_string())?
//!     .add_collection("clients", "clients".to_string())?;
//! let collection = overlay.database_mut("db").unwrap()
//!     .collection_mut("clients").unwrap();
//! let mut translator = Translator::new(&factory, rids.scoped("db", "clients"), collection);
//! let doc = doc_from_json(serde_json::json!({"x": 1, "tags": ["a", "b"]})).unwrap();
//! translator.translate(&doc)?;
//! let rows = translator.into_collection_data();
//! assert_eq!(rows.row_count(), 3);
//!
//! // publish the discovered schema
//! repo.commit(overlay)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Architecture
//!
//! The shredder ([`Translator`]) walks documents and discovers tables,
//! fields and scalar columns through a transaction-local overlay; the
//! [`SchemaRepository`] publishes immutable snapshots and reconciles
//! concurrent overlays at commit through the merge engine. Row identity
//! (`did`/`rid`/`pid`/`seq`) is issued by the [`RidGenerator`].

pub use shale_concurrency::*;
pub use shale_core::*;
pub use shale_engine::*;
