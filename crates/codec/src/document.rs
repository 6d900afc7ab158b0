//! Flattened documents
//!
//! A `Document` is one version of one JSON document represented as an
//! ordered map from concrete path to leaf node, plus a deletion flag. The
//! map iterates in path order (`$.a[9]` before `$.a[10]`).
//!
//! `decode_document` rebuilds a document from the contiguous fragment group
//! of one key; `Document::fragments` goes the other way.

use crate::leaf::LeafNode;
use ldstore_core::{CodecError, DocumentKey, Fragment, PathKey};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::trace;

/// One version of one document, flattened
///
/// ## Invariants
///
/// - A deleted document has no leaves
/// - Every leaf carries this document's key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    key: DocumentKey,
    leaves: BTreeMap<PathKey, LeafNode>,
    deleted: bool,
}

impl Document {
    /// Create a live document from its leaves
    ///
    /// A later leaf for the same path replaces an earlier one.
    pub fn new(key: DocumentKey, leaves: impl IntoIterator<Item = LeafNode>) -> Self {
        let leaves = leaves
            .into_iter()
            .map(|leaf| (PathKey::new(leaf.path()), leaf))
            .collect();
        Self {
            key,
            leaves,
            deleted: false,
        }
    }

    /// Create a tombstone
    pub fn deleted(key: DocumentKey) -> Self {
        Self {
            key,
            leaves: BTreeMap::new(),
            deleted: true,
        }
    }

    /// Document version
    pub fn key(&self) -> &DocumentKey {
        &self.key
    }

    /// True for a tombstone
    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// Leaves in path order
    pub fn leaves(&self) -> impl Iterator<Item = &LeafNode> + '_ {
        self.leaves.values()
    }

    /// Number of leaves
    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    /// True if the document has no leaves
    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Leaf at a concrete path
    pub fn leaf(&self, path: &str) -> Option<&LeafNode> {
        self.leaves.get(&PathKey::from(path))
    }

    /// True if the leaf at `path` has the text form `value`
    pub fn contains(&self, path: &str, value: &str) -> bool {
        self.leaf(path)
            .and_then(|leaf| leaf.value().as_text())
            .map_or(false, |text| text == value)
    }

    /// Fragments of the whole document in path order
    ///
    /// A tombstone yields a single delete marker at `$`.
    pub fn fragments(&self) -> impl Iterator<Item = Fragment> + '_ {
        let marker = if self.deleted {
            Some(Fragment::delete_marker(self.key.clone()))
        } else {
            None
        };
        marker
            .into_iter()
            .chain(self.leaves.values().flat_map(LeafNode::fragments))
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.deleted {
            return write!(f, "Document{{{} deleted}}", self.key);
        }
        write!(f, "Document{{{} [", self.key)?;
        for (i, leaf) in self.leaves.values().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", leaf)?;
        }
        f.write_str("]}")
    }
}

/// Rebuild one document from the fragments of one key
///
/// Fragments may arrive in any order; they are bucketed by path and each
/// bucket is sorted by offset. A delete marker anywhere in the group turns
/// the whole version into a tombstone and the other leaves are discarded.
pub fn decode_document(
    key: DocumentKey,
    fragments: impl IntoIterator<Item = Fragment>,
    capacity: u32,
) -> Result<Document, CodecError> {
    let mut buckets: BTreeMap<PathKey, Vec<Fragment>> = BTreeMap::new();
    for fragment in fragments {
        if fragment.is_delete_marker() {
            trace!(target: "ldstore::codec", key = %key, "delete marker in fragment group");
            return Ok(Document::deleted(key));
        }
        buckets
            .entry(PathKey::new(fragment.path()))
            .or_default()
            .push(fragment);
    }

    let mut leaves = BTreeMap::new();
    for (path, mut bucket) in buckets {
        bucket.sort_by_key(Fragment::offset);
        let leaf = LeafNode::decode(&key, path.as_str(), &bucket, capacity)?;
        leaves.insert(path, leaf);
    }

    Ok(Document {
        key,
        leaves,
        deleted: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::LeafValue;
    use ldstore_core::{FragmentType, Timestamp};

    fn key() -> DocumentKey {
        DocumentKey::new("ns", "Person", "1", Timestamp::from_secs(1))
    }

    fn sample() -> Document {
        Document::new(
            key(),
            vec![
                LeafNode::string(key(), "$.name", "Ola Nordmann", 4),
                LeafNode::numeric(key(), "$.tags[10]", "10", 4).unwrap(),
                LeafNode::numeric(key(), "$.tags[9]", "9", 4).unwrap(),
                LeafNode::boolean(key(), "$.active", true, 4),
            ],
        )
    }

    #[test]
    fn test_leaves_in_path_order() {
        let doc = sample();
        let paths: Vec<&str> = doc.leaves().map(|l| l.path()).collect();
        assert_eq!(paths, vec!["$.active", "$.name", "$.tags[9]", "$.tags[10]"]);
    }

    #[test]
    fn test_leaf_and_contains() {
        let doc = sample();
        assert_eq!(
            doc.leaf("$.name").map(|l| l.value().clone()),
            Some(LeafValue::String("Ola Nordmann".to_string()))
        );
        assert!(doc.contains("$.name", "Ola Nordmann"));
        assert!(doc.contains("$.active", "true"));
        assert!(!doc.contains("$.name", "Kari"));
        assert!(!doc.contains("$.missing", "x"));
    }

    #[test]
    fn test_fragments_decode_back() {
        let doc = sample();
        let fragments: Vec<Fragment> = doc.fragments().collect();
        assert!(fragments.len() > doc.len());
        let decoded = decode_document(key(), fragments, 4).unwrap();
        assert_eq!(decoded, doc);
    }

    #[test]
    fn test_decode_tolerates_shuffled_input() {
        let doc = sample();
        let mut fragments: Vec<Fragment> = doc.fragments().collect();
        fragments.reverse();
        assert_eq!(decode_document(key(), fragments, 4).unwrap(), doc);
    }

    #[test]
    fn test_tombstone_precedence() {
        let mut fragments: Vec<Fragment> = sample().fragments().collect();
        fragments.insert(2, Fragment::delete_marker(key()));
        let doc = decode_document(key(), fragments, 4).unwrap();
        assert!(doc.is_deleted());
        assert!(doc.is_empty());
    }

    #[test]
    fn test_deleted_marker_at_any_path() {
        let fragments = vec![
            Fragment::new(key(), "$.a", FragmentType::Null, 0, vec![]),
            Fragment::new(key(), "$.b", FragmentType::Deleted, 0, vec![]),
        ];
        assert!(decode_document(key(), fragments, 4).unwrap().is_deleted());
    }

    #[test]
    fn test_deleted_document_fragments() {
        let doc = Document::deleted(key());
        let fragments: Vec<Fragment> = doc.fragments().collect();
        assert_eq!(fragments, vec![Fragment::delete_marker(key())]);
    }

    #[test]
    fn test_decode_error_fails_whole_document() {
        let fragments = vec![
            Fragment::new(key(), "$.ok", FragmentType::Null, 0, vec![]),
            Fragment::new(key(), "$.bad", FragmentType::String, 0, vec![0xFF]),
        ];
        assert!(decode_document(key(), fragments, 4).is_err());
    }

    #[test]
    fn test_empty_group_is_empty_document() {
        let doc = decode_document(key(), Vec::new(), 4).unwrap();
        assert!(!doc.is_deleted());
        assert!(doc.is_empty());
    }

    #[test]
    fn test_display() {
        let doc = Document::new(key(), vec![LeafNode::boolean(key(), "$.a", false, 4)]);
        assert!(doc.to_string().contains("$.a=false"));
        assert!(Document::deleted(key()).to_string().contains("deleted"));
    }
}
