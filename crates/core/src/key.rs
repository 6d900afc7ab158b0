//! Document key: identity of one version of one document
//!
//! A `DocumentKey` is the group key of the streaming assembler and the hash
//! key used to deduplicate document versions.

use crate::timestamp::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies exactly one version of one document
///
/// # Ordering
///
/// Keys are ordered by: namespace → entity → id → version
///
/// Strings compare lexicographically, the version chronologically. This is
/// the order in which a range read delivers documents, which keeps all
/// fragments of one key contiguous.
///
/// # Examples
///
/// ```
/// use ldstore_core::{DocumentKey, Timestamp};
///
/// let v1 = DocumentKey::new("ns", "Person", "1", Timestamp::from_secs(1));
/// let v2 = v1.with_version(Timestamp::from_secs(2));
/// assert!(v1 < v2);
/// assert!(v1.same_document(&v2));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocumentKey {
    namespace: String,
    entity: String,
    id: String,
    version: Timestamp,
}

impl DocumentKey {
    /// Create a new document key
    pub fn new(
        namespace: impl Into<String>,
        entity: impl Into<String>,
        id: impl Into<String>,
        version: Timestamp,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            entity: entity.into(),
            id: id.into(),
            version,
        }
    }

    /// Namespace (top-level isolation)
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Managed entity name
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Document id within the entity
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Version timestamp
    pub fn version(&self) -> Timestamp {
        self.version
    }

    /// Same namespace, entity and id with a different version
    pub fn with_version(&self, version: Timestamp) -> Self {
        Self {
            namespace: self.namespace.clone(),
            entity: self.entity.clone(),
            id: self.id.clone(),
            version,
        }
    }

    /// True if both keys name the same document (any version)
    pub fn same_document(&self, other: &DocumentKey) -> bool {
        self.namespace == other.namespace && self.entity == other.entity && self.id == other.id
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}@{}",
            self.namespace, self.entity, self.id, self.version
        )
    }
}
