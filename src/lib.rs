//! ldstore - persistence layer for a versioned, linked-document store
//!
//! Documents are identified by namespace, entity, id and version timestamp.
//! They are stored as size-bounded fragments, so the storage substrate never
//! needs to hold an arbitrarily large value, and read back as streams.
//!
//! # Quick Start
//!
//! ```
//! use ldstore::{DocumentKey, JsonDocument, JsonPersistence, MemoryPersistence, Range, Timestamp, Transaction};
//! use serde_json::json;
//!
//! let persistence = JsonPersistence::new(MemoryPersistence::new(), 8192);
//! let tx = persistence.create_transaction(false)?;
//!
//! let key = DocumentKey::new("data", "Person", "1", Timestamp::from_secs(1));
//! persistence.create_or_overwrite(&tx, &JsonDocument::new(key, json!({"name": "Ola"})))?;
//!
//! let page: Vec<JsonDocument> = persistence
//!     .read_documents(&tx, Timestamp::MAX, "data", "Person", &Range::first(10))?
//!     .collect::<ldstore::Result<_>>()?;
//! assert_eq!(page.len(), 1);
//!
//! tx.commit()?;
//! # Ok::<(), ldstore::PersistenceError>(())
//! ```
//!
//! # Architecture
//!
//! - [`ldstore_core`]: keys, fragments, paths, ranges, configuration, errors
//! - [`ldstore_codec`]: JSON tree to fragments and back
//! - [`ldstore_streaming`]: credit-based assembly and cursor pagination
//! - [`ldstore_storage`]: backend contract, in-memory backend, document layers

#![warn(missing_docs)]
#![warn(clippy::all)]

pub use ldstore_codec::{
    decode_document, flatten, unflatten, Document, JsonDocument, LeafNode, LeafValue,
    NumericValue,
};
pub use ldstore_core::{
    compare_paths, CodecError, DeletePolicy, DocumentKey, Fragment, FragmentType, PathError,
    PathKey, PersistenceConfig, PersistenceError, Range, RangeConstructionError, Result,
    StreamItem, Timestamp,
};
pub use ldstore_storage::{
    FlattenedPersistence, FragmentStream, JsonDocumentStream, JsonPersistence,
    MemoryPersistence, MemoryTransaction, Persistence, Transaction, TransactionStatistics,
};
pub use ldstore_streaming::{
    assemble, assemble_documents, AssembledDocuments, DocumentAssembler, IteratorPublisher,
    PaginateExt, Publisher, Subscriber, Subscription,
};
