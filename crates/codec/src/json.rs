//! JSON tree ⇄ flattened document
//!
//! `flatten` walks a `serde_json::Value` depth first from `$`, producing one
//! leaf per scalar and per empty container. `unflatten` walks the leaves in
//! path order and rebuilds the tree, creating intermediate objects and
//! arrays as their first member or element is seen.

use crate::document::Document;
use crate::leaf::LeafNode;
use crate::value::{LeafValue, NumericValue};
use ldstore_core::path::{parse_concrete_path, validate_field_name, ROOT};
use ldstore_core::{CodecError, DocumentKey, FragmentType, PathError, PathSegment, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

// =============================================================================
// Flatten
// =============================================================================

/// Flatten a JSON tree into a document
///
/// Object members append `.name` to the path, array elements `[index]`.
/// Member names that cannot be written in a path (empty, or containing
/// `.`, `[` or `]`) are rejected.
///
/// ```
/// use ldstore_codec::flatten;
/// use ldstore_core::{DocumentKey, Timestamp};
/// use serde_json::json;
///
/// let key = DocumentKey::new("ns", "Person", "1", Timestamp::EPOCH);
/// let doc = flatten(&json!({"name": "Ola", "tags": ["a", "b"]}), key, 8192).unwrap();
/// let paths: Vec<&str> = doc.leaves().map(|l| l.path()).collect();
/// assert_eq!(paths, vec!["$.name", "$.tags[0]", "$.tags[1]"]);
/// ```
pub fn flatten(value: &Value, key: DocumentKey, capacity: u32) -> Result<Document> {
    let mut leaves = Vec::new();
    let mut stack: Vec<(String, &Value)> = vec![(ROOT.to_string(), value)];

    while let Some((path, node)) = stack.pop() {
        match node {
            Value::Null => leaves.push(LeafNode::null(key.clone(), path, capacity)),
            Value::Bool(b) => leaves.push(LeafNode::boolean(key.clone(), path, *b, capacity)),
            Value::Number(n) => {
                leaves.push(LeafNode::numeric(key.clone(), path, n.to_string(), capacity)?)
            }
            Value::String(s) => {
                leaves.push(LeafNode::string(key.clone(), path, s.as_str(), capacity))
            }
            Value::Array(items) if items.is_empty() => {
                leaves.push(LeafNode::empty_array(key.clone(), path, capacity))
            }
            Value::Object(members) if members.is_empty() => {
                leaves.push(LeafNode::empty_object(key.clone(), path, capacity))
            }
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate().rev() {
                    stack.push((format!("{}[{}]", path, i), item));
                }
            }
            Value::Object(members) => {
                for (name, member) in members.iter().rev() {
                    validate_field_name(name)?;
                    stack.push((format!("{}.{}", path, name), member));
                }
            }
        }
    }

    Ok(Document::new(key, leaves))
}

// =============================================================================
// Unflatten
// =============================================================================

fn leaf_to_json(leaf: &LeafNode) -> Result<Value> {
    let value = match (leaf.fragment_type(), leaf.value()) {
        (FragmentType::EmptyObject, _) => Value::Object(Map::new()),
        (FragmentType::EmptyArray, _) => Value::Array(Vec::new()),
        (_, LeafValue::Absent) => Value::Null,
        (_, LeafValue::Boolean(b)) => Value::Bool(*b),
        (_, LeafValue::String(s)) => Value::String(s.clone()),
        (_, LeafValue::Numeric(text)) => NumericValue::parse(text)
            .and_then(NumericValue::to_json)
            .map(Value::Number)
            .ok_or_else(|| CodecError::InvalidNumeric {
                path: leaf.path().to_string(),
                text: text.clone(),
            })?,
    };
    Ok(value)
}

fn conflict(path: &str) -> PathError {
    PathError::Conflict {
        path: path.to_string(),
    }
}

/// Tree under construction
///
/// `Pending` is a position no leaf has reached yet, which keeps it apart
/// from a stored JSON null.
#[derive(Debug)]
enum Node {
    Pending,
    Scalar(Value),
    Object(BTreeMap<String, Node>),
    Array(Vec<Node>),
}

impl Node {
    fn from_leaf(value: Value) -> Self {
        match value {
            Value::Object(members) if members.is_empty() => Node::Object(BTreeMap::new()),
            Value::Array(items) if items.is_empty() => Node::Array(Vec::new()),
            other => Node::Scalar(other),
        }
    }

    /// Step into `segment`, creating the container if this position is pending
    fn descend(&mut self, segment: &PathSegment, path: &str) -> Result<&mut Node> {
        match segment {
            PathSegment::Field(name) => {
                if matches!(self, Node::Pending) {
                    *self = Node::Object(BTreeMap::new());
                }
                match self {
                    Node::Object(members) => Ok(members.entry(name.clone()).or_insert(Node::Pending)),
                    _ => Err(conflict(path).into()),
                }
            }
            PathSegment::Index(i) => {
                if matches!(self, Node::Pending) {
                    *self = Node::Array(Vec::new());
                }
                match self {
                    Node::Array(items) => {
                        if items.len() <= *i {
                            items.resize_with(*i + 1, || Node::Pending);
                        }
                        Ok(&mut items[*i])
                    }
                    _ => Err(conflict(path).into()),
                }
            }
            PathSegment::AnyIndex => Err(PathError::WildcardIndex {
                path: path.to_string(),
            }
            .into()),
        }
    }

    /// Store a leaf value at this position
    fn place(&mut self, value: Value, path: &str) -> Result<()> {
        let absorbed = match (&*self, &value) {
            (Node::Pending, _) => false,
            // a container already built by deeper leaves absorbs an empty one
            (Node::Object(_), Value::Object(m)) if m.is_empty() => true,
            (Node::Array(_), Value::Array(a)) if a.is_empty() => true,
            _ => return Err(conflict(path).into()),
        };
        if !absorbed {
            *self = Node::from_leaf(value);
        }
        Ok(())
    }

    /// Array holes no leaf filled become null
    fn into_value(self) -> Value {
        match self {
            Node::Pending => Value::Null,
            Node::Scalar(value) => value,
            Node::Object(members) => Value::Object(
                members
                    .into_iter()
                    .map(|(name, node)| (name, node.into_value()))
                    .collect(),
            ),
            Node::Array(items) => Value::Array(items.into_iter().map(Node::into_value).collect()),
        }
    }
}

/// Rebuild the JSON tree of a document
///
/// Returns `None` for a tombstone. A live document without leaves is an
/// empty object. Two leaves that disagree about the shape of a shared
/// container fail with `PathError::Conflict`, including a null leaf with
/// leaves below it.
pub fn unflatten(document: &Document) -> Result<Option<Value>> {
    if document.is_deleted() {
        return Ok(None);
    }
    if document.is_empty() {
        return Ok(Some(Value::Object(Map::new())));
    }

    let mut root = Node::Pending;
    for leaf in document.leaves() {
        let segments = parse_concrete_path(leaf.path())?;
        let mut node = &mut root;
        for segment in &segments {
            node = node.descend(segment, leaf.path())?;
        }
        node.place(leaf_to_json(leaf)?, leaf.path())?;
    }
    Ok(Some(root.into_value()))
}

// =============================================================================
// JsonDocument
// =============================================================================

/// One version of one document as a JSON tree
///
/// `content` is `None` for a tombstone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonDocument {
    key: DocumentKey,
    content: Option<Value>,
}

impl JsonDocument {
    /// Live document
    pub fn new(key: DocumentKey, content: Value) -> Self {
        Self {
            key,
            content: Some(content),
        }
    }

    /// Tombstone
    pub fn deleted(key: DocumentKey) -> Self {
        Self { key, content: None }
    }

    /// Document version
    pub fn key(&self) -> &DocumentKey {
        &self.key
    }

    /// JSON tree, `None` for a tombstone
    pub fn content(&self) -> Option<&Value> {
        self.content.as_ref()
    }

    /// Take the JSON tree
    pub fn into_content(self) -> Option<Value> {
        self.content
    }

    /// True for a tombstone
    pub fn is_deleted(&self) -> bool {
        self.content.is_none()
    }

    /// Flatten into a document
    pub fn to_document(&self, capacity: u32) -> Result<Document> {
        match &self.content {
            Some(content) => flatten(content, self.key.clone(), capacity),
            None => Ok(Document::deleted(self.key.clone())),
        }
    }

    /// Rebuild from a flattened document
    pub fn from_document(document: &Document) -> Result<Self> {
        Ok(Self {
            key: document.key().clone(),
            content: unflatten(document)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ldstore_core::{PersistenceError, Timestamp};
    use serde_json::json;

    fn key() -> DocumentKey {
        DocumentKey::new("ns", "Person", "1", Timestamp::from_secs(1))
    }

    fn round_trip(value: Value, capacity: u32) -> Value {
        let doc = flatten(&value, key(), capacity).unwrap();
        unflatten(&doc).unwrap().unwrap()
    }

    // ========================================
    // Flatten
    // ========================================

    #[test]
    fn test_flatten_paths_and_types() {
        let doc = flatten(
            &json!({
                "name": "Ola",
                "age": 42,
                "active": true,
                "spouse": null,
                "address": {},
                "tags": [],
                "phones": [{"type": "home"}, {"type": "work"}]
            }),
            key(),
            8,
        )
        .unwrap();

        let types: Vec<(&str, FragmentType)> = doc
            .leaves()
            .map(|l| (l.path(), l.fragment_type()))
            .collect();
        assert_eq!(
            types,
            vec![
                ("$.active", FragmentType::Boolean),
                ("$.address", FragmentType::EmptyObject),
                ("$.age", FragmentType::Numeric),
                ("$.name", FragmentType::String),
                ("$.spouse", FragmentType::Null),
                ("$.tags", FragmentType::EmptyArray),
                ("$.phones[0].type", FragmentType::String),
                ("$.phones[1].type", FragmentType::String),
            ]
        );
    }

    #[test]
    fn test_flatten_array_indices_sort_numerically() {
        let items: Vec<Value> = (0..12).map(|i| json!(i)).collect();
        let doc = flatten(&json!({ "a": items }), key(), 8).unwrap();
        let paths: Vec<&str> = doc.leaves().map(|l| l.path()).collect();
        assert_eq!(paths[9], "$.a[9]");
        assert_eq!(paths[10], "$.a[10]");
    }

    #[test]
    fn test_flatten_root_scalar_and_array() {
        let doc = flatten(&json!("x"), key(), 8).unwrap();
        assert!(doc.leaf("$").is_some());
        let doc = flatten(&json!([1, [2]]), key(), 8).unwrap();
        assert!(doc.leaf("$[0]").is_some());
        assert!(doc.leaf("$[1][0]").is_some());
    }

    #[test]
    fn test_flatten_rejects_unaddressable_field_names() {
        for bad in [json!({"a.b": 1}), json!({"": 1}), json!({"x": {"[0]": 1}})] {
            let err = flatten(&bad, key(), 8).unwrap_err();
            assert!(matches!(
                err,
                PersistenceError::Path(PathError::InvalidFieldName { .. })
            ));
        }
    }

    #[test]
    fn test_flatten_empty_string() {
        let doc = flatten(&json!({"s": ""}), key(), 3).unwrap();
        let fragments: Vec<_> = doc.fragments().collect();
        assert_eq!(fragments.len(), 1);
        assert!(fragments[0].value().is_empty());
    }

    // ========================================
    // Unflatten
    // ========================================

    #[test]
    fn test_round_trip_nested() {
        let value = json!({
            "name": "Kari Nordmann",
            "numbers": [1, -2, 3.5, 18446744073709551615u64],
            "nested": {"deep": {"deeper": [[], {}, null, false]}},
            "unicode": "日本語 og æøå"
        });
        for capacity in [1, 2, 3, 7, 8192] {
            assert_eq!(round_trip(value.clone(), capacity), value);
        }
    }

    #[test]
    fn test_round_trip_root_shapes() {
        for value in [json!({}), json!([]), json!(null), json!(7), json!([[1], [2, 3]])] {
            assert_eq!(round_trip(value.clone(), 4), value);
        }
    }

    #[test]
    fn test_unflatten_deleted_is_none() {
        assert_eq!(unflatten(&Document::deleted(key())).unwrap(), None);
    }

    #[test]
    fn test_unflatten_no_leaves_is_empty_object() {
        let doc = Document::new(key(), Vec::new());
        assert_eq!(unflatten(&doc).unwrap(), Some(json!({})));
    }

    #[test]
    fn test_unflatten_sparse_array_pads_with_null() {
        let doc = Document::new(key(), vec![LeafNode::boolean(key(), "$.a[2]", true, 8)]);
        assert_eq!(unflatten(&doc).unwrap(), Some(json!({"a": [null, null, true]})));
    }

    #[test]
    fn test_unflatten_conflicting_shapes() {
        let doc = Document::new(
            key(),
            vec![
                LeafNode::string(key(), "$.a", "scalar", 8),
                LeafNode::string(key(), "$.a.b", "member", 8),
            ],
        );
        assert!(matches!(
            unflatten(&doc),
            Err(PersistenceError::Path(PathError::Conflict { .. }))
        ));

        let doc = Document::new(
            key(),
            vec![
                LeafNode::null(key(), "$.a[0]", 8),
                LeafNode::null(key(), "$.a.b", 8),
            ],
        );
        assert!(unflatten(&doc).is_err());
    }

    #[test]
    fn test_unflatten_null_leaf_with_children_conflicts() {
        for child in ["$.a.b", "$.a[0]"] {
            let doc = Document::new(
                key(),
                vec![
                    LeafNode::null(key(), "$.a", 8),
                    LeafNode::string(key(), child, "below a null", 8),
                ],
            );
            assert!(matches!(
                unflatten(&doc),
                Err(PersistenceError::Path(PathError::Conflict { .. }))
            ));
        }
    }

    #[test]
    fn test_round_trip_explicit_nulls() {
        let value = json!({"a": null, "b": [null, 1, {"c": null}]});
        assert_eq!(round_trip(value.clone(), 8), value);
    }

    #[test]
    fn test_unflatten_rejects_wildcard_path() {
        let doc = Document::new(key(), vec![LeafNode::null(key(), "$.a[]", 8)]);
        assert!(matches!(
            unflatten(&doc),
            Err(PersistenceError::Path(PathError::WildcardIndex { .. }))
        ));
    }

    #[test]
    fn test_numeric_text_is_preserved_in_leaf() {
        let doc = flatten(&json!({"n": 1.5e300}), key(), 8).unwrap();
        let leaf = doc.leaf("$.n").unwrap();
        let text = leaf.value().as_text().unwrap().into_owned();
        assert_eq!(text.parse::<f64>().unwrap(), 1.5e300);
    }

    // ========================================
    // JsonDocument
    // ========================================

    #[test]
    fn test_json_document_round_trip() {
        let original = JsonDocument::new(key(), json!({"a": [1, 2]}));
        let doc = original.to_document(2).unwrap();
        assert_eq!(JsonDocument::from_document(&doc).unwrap(), original);
    }

    #[test]
    fn test_json_document_tombstone() {
        let tombstone = JsonDocument::deleted(key());
        assert!(tombstone.is_deleted());
        let doc = tombstone.to_document(8).unwrap();
        assert!(doc.is_deleted());
        assert!(JsonDocument::from_document(&doc).unwrap().is_deleted());
    }
}
