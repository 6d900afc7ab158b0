//! Storage layer for ldstore
//!
//! This crate defines the fragment-level backend contract and the document
//! layers built on it:
//! - `Persistence` / `Transaction`: what a backend must provide
//! - `MemoryPersistence`: BTreeMap-based reference backend with RwLock
//! - `FlattenedPersistence`: buffered pages of flattened documents
//! - `JsonPersistence`: lazy streams of JSON documents with cursor pagination

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod flattened;
pub mod json;
pub mod memory;
pub mod traits;

pub use flattened::FlattenedPersistence;
pub use json::{JsonDocumentStream, JsonPersistence};
pub use memory::{MemoryPersistence, MemoryTransaction};
pub use traits::{FragmentStream, Persistence, Transaction, TransactionStatistics};
