//! Core types for ldstore
//!
//! This crate defines the foundational types used throughout the system:
//! - Timestamp: Microsecond version timestamp
//! - DocumentKey: (namespace, entity, id, version) identity of a document version
//! - FragmentType / DeletePolicy: closed enumerations of the stored format
//! - Fragment / StreamItem: size-bounded leaf chunks and stream items
//! - Path: path grammar, PathComparator ordering, index-unaware paths
//! - Range: cursor pagination window
//! - PersistenceConfig: `ldstore.toml` configuration
//! - Error: Error type hierarchy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod fragment;
pub mod key;
pub mod path;
pub mod range;
pub mod timestamp;
pub mod types;

pub use config::{PersistenceConfig, DEFAULT_FRAGMENT_CAPACITY, DEFAULT_READ_LIMIT};
pub use error::{CodecError, PathError, PersistenceError, RangeConstructionError, Result};
pub use fragment::{Fragment, StreamItem, TRUNCATED_VALUE_LENGTH};
pub use key::DocumentKey;
pub use path::{compare_paths, PathKey, PathSegment};
pub use range::Range;
pub use timestamp::Timestamp;
pub use types::{DeletePolicy, FragmentType};

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    // Values are immutable and shared freely across threads
    assert_impl_all!(DocumentKey: Send, Sync, Clone);
    assert_impl_all!(Fragment: Send, Sync, Clone);
    assert_impl_all!(StreamItem: Send, Sync);
    assert_impl_all!(Range<String>: Send, Sync);
    assert_impl_all!(PersistenceError: Send, Sync);

    #[test]
    fn test_reexports() {
        let key = DocumentKey::new("ns", "E", "1", Timestamp::EPOCH);
        let fragment = Fragment::delete_marker(key);
        assert!(fragment.is_delete_marker());
        assert_eq!(fragment.fragment_type(), FragmentType::Deleted);
    }
}
