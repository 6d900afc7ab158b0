//! Fragments: size-bounded binary chunks of leaf values
//!
//! A fragment is the unit the storage backend persists. One leaf of a
//! flattened document becomes one or more fragments at increasing byte
//! offsets. A read is an ordered stream of [`StreamItem`]s: data fragments,
//! optionally terminated by a streaming-control sentinel telling whether the
//! producer stopped early because of a limit.

use crate::key::DocumentKey;
use crate::path::{compare_paths, ROOT};
use crate::types::FragmentType;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Maximum length of the value prefix used as a find-by-value index key
pub const TRUNCATED_VALUE_LENGTH: usize = 100;

/// Stored control code of a limited stream end
pub const LIMITED_CODE: u16 = 41;

/// Stored control code of an exhausted stream end
pub const NOT_LIMITED_CODE: u16 = 42;

/// One binary chunk of one leaf value
///
/// # Ordering
///
/// key → path (by [`compare_paths`]) → type → offset → value bytes
///
/// This is the order of a single-key read, and within a range read it keeps
/// every fragment of one key contiguous.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fragment {
    key: DocumentKey,
    path: String,
    fragment_type: FragmentType,
    offset: u64,
    value: Vec<u8>,
}

impl Fragment {
    /// Create a fragment
    pub fn new(
        key: DocumentKey,
        path: impl Into<String>,
        fragment_type: FragmentType,
        offset: u64,
        value: Vec<u8>,
    ) -> Self {
        Self {
            key,
            path: path.into(),
            fragment_type,
            offset,
            value,
        }
    }

    /// Delete marker at the document root
    ///
    /// A marker anywhere in a key's fragment group makes the whole version a
    /// tombstone.
    pub fn delete_marker(key: DocumentKey) -> Self {
        Self::new(key, ROOT, FragmentType::Deleted, 0, Vec::new())
    }

    /// Document version this fragment belongs to
    pub fn document_key(&self) -> &DocumentKey {
        &self.key
    }

    /// Concrete path of the leaf
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Leaf type
    pub fn fragment_type(&self) -> FragmentType {
        self.fragment_type
    }

    /// Byte offset of this chunk within the leaf value
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Payload bytes
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// Take the payload
    pub fn into_value(self) -> Vec<u8> {
        self.value
    }

    /// True for a tombstone marker
    pub fn is_delete_marker(&self) -> bool {
        self.fragment_type == FragmentType::Deleted
    }

    /// True if both fragments belong to the same leaf of the same version
    pub fn same_path_as(&self, other: &Fragment) -> bool {
        self.path == other.path && self.key == other.key
    }

    /// Value prefix of at most [`TRUNCATED_VALUE_LENGTH`] bytes
    pub fn truncated_value(&self) -> &[u8] {
        let len = self.value.len().min(TRUNCATED_VALUE_LENGTH);
        &self.value[..len]
    }
}

impl Ord for Fragment {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key
            .cmp(&other.key)
            .then_with(|| compare_paths(&self.path, &other.path))
            .then_with(|| self.fragment_type.cmp(&other.fragment_type))
            .then_with(|| self.offset.cmp(&other.offset))
            .then_with(|| self.value.cmp(&other.value))
    }
}

impl PartialOrd for Fragment {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Fragment{{{} {} {} offset={} bytes={}}}",
            self.key,
            self.path,
            self.fragment_type,
            self.offset,
            self.value.len()
        )
    }
}

/// One item of a fragment stream
///
/// A `Control` item, when present, is the last item of its stream.
/// `Control` sorts after every `Data` item, so a consumer can stop at the
/// first item that is not data.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StreamItem {
    /// A data fragment
    Data(Fragment),
    /// End of stream; `limited` is true when the producer stopped early
    Control {
        /// Producer hit an externally imposed limit
        limited: bool,
    },
}

impl StreamItem {
    /// Streaming-control sentinel
    pub fn done(limited: bool) -> Self {
        StreamItem::Control { limited }
    }

    /// True for the streaming-control sentinel
    pub fn is_control(&self) -> bool {
        matches!(self, StreamItem::Control { .. })
    }

    /// True for a control sentinel with `limited` set
    pub fn is_limited(&self) -> bool {
        matches!(self, StreamItem::Control { limited: true })
    }

    /// Stored control code (`None` for data)
    pub fn control_code(&self) -> Option<u16> {
        match self {
            StreamItem::Data(_) => None,
            StreamItem::Control { limited: true } => Some(LIMITED_CODE),
            StreamItem::Control { limited: false } => Some(NOT_LIMITED_CODE),
        }
    }

    /// Borrow the data fragment
    pub fn as_fragment(&self) -> Option<&Fragment> {
        match self {
            StreamItem::Data(fragment) => Some(fragment),
            StreamItem::Control { .. } => None,
        }
    }

    /// Take the data fragment
    pub fn into_fragment(self) -> Option<Fragment> {
        match self {
            StreamItem::Data(fragment) => Some(fragment),
            StreamItem::Control { .. } => None,
        }
    }
}

impl From<Fragment> for StreamItem {
    fn from(fragment: Fragment) -> Self {
        StreamItem::Data(fragment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timestamp::Timestamp;

    fn key(id: &str) -> DocumentKey {
        DocumentKey::new("ns", "Person", id, Timestamp::from_secs(1))
    }

    fn frag(id: &str, path: &str, offset: u64) -> Fragment {
        Fragment::new(key(id), path, FragmentType::String, offset, b"x".to_vec())
    }

    // ========================================
    // Ordering
    // ========================================

    #[test]
    fn test_ordering_key_first() {
        assert!(frag("1", "$.z", 9) < frag("2", "$.a", 0));
    }

    #[test]
    fn test_ordering_path_uses_path_comparator() {
        assert!(frag("1", "$.a[9]", 0) < frag("1", "$.a[10]", 0));
    }

    #[test]
    fn test_ordering_type_then_offset_then_value() {
        let a = Fragment::new(key("1"), "$.a", FragmentType::Null, 5, vec![]);
        let b = Fragment::new(key("1"), "$.a", FragmentType::String, 0, vec![]);
        assert!(a < b);
        assert!(frag("1", "$.a", 0) < frag("1", "$.a", 3));
        let low = Fragment::new(key("1"), "$.a", FragmentType::String, 0, vec![1]);
        let high = Fragment::new(key("1"), "$.a", FragmentType::String, 0, vec![2]);
        assert!(low < high);
    }

    #[test]
    fn test_control_sorts_after_data() {
        let data = StreamItem::from(frag("zzz", "$.z", 99));
        assert!(data < StreamItem::done(false));
        assert!(data < StreamItem::done(true));
    }

    // ========================================
    // Helpers
    // ========================================

    #[test]
    fn test_delete_marker() {
        let marker = Fragment::delete_marker(key("1"));
        assert!(marker.is_delete_marker());
        assert_eq!(marker.path(), "$");
        assert!(marker.value().is_empty());
        assert!(!frag("1", "$.a", 0).is_delete_marker());
    }

    #[test]
    fn test_same_path_as() {
        assert!(frag("1", "$.a", 0).same_path_as(&frag("1", "$.a", 4)));
        assert!(!frag("1", "$.a", 0).same_path_as(&frag("1", "$.b", 0)));
        assert!(!frag("1", "$.a", 0).same_path_as(&frag("2", "$.a", 0)));
    }

    #[test]
    fn test_truncated_value() {
        let long = Fragment::new(key("1"), "$.a", FragmentType::String, 0, vec![7; 250]);
        assert_eq!(long.truncated_value().len(), TRUNCATED_VALUE_LENGTH);
        let short = frag("1", "$.a", 0);
        assert_eq!(short.truncated_value(), b"x");
    }

    #[test]
    fn test_stream_item_control() {
        assert!(StreamItem::done(true).is_control());
        assert!(StreamItem::done(true).is_limited());
        assert!(!StreamItem::done(false).is_limited());
        assert_eq!(StreamItem::done(true).control_code(), Some(LIMITED_CODE));
        assert_eq!(StreamItem::done(false).control_code(), Some(NOT_LIMITED_CODE));
        let data = StreamItem::from(frag("1", "$.a", 0));
        assert!(!data.is_control());
        assert_eq!(data.control_code(), None);
        assert!(data.into_fragment().is_some());
    }
}
