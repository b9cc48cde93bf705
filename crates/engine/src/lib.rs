//! Shredding engine for the shale schema engine
//!
//! This crate implements the write path of document-to-relational mapping:
//! - RidGenerator: per-(database, collection, table) row id counters
//! - Translator: the document shredder, discovering schema through a
//!   transaction's overlay while accumulating typed rows
//! - apply_batch: depth-ordered derivation of backend DDL/DML operations
//!
//! A typical write transaction: create an overlay, scope a rid generator,
//! run the translator over a batch of documents, hand the rows to
//! `apply_batch`, mark the batch boundary, repeat, then commit the overlay.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod rid;
pub mod translator;

pub use backend::apply_batch;
pub use rid::{RidGenerator, ScopedRidGenerator};
pub use translator::Translator;
