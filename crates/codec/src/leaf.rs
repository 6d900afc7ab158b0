//! Leaf nodes: one typed value at one path of one document version
//!
//! A `LeafNode` encodes to one or more fragments and is decoded back from
//! the offset-ordered fragments of its path.

use crate::value::{LeafValue, NumericValue, Utf8Chunks, Utf8StreamDecoder, TRUE_BYTE};
use ldstore_core::{CodecError, DocumentKey, Fragment, FragmentType};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One typed value at one concrete path
///
/// The type and the value always agree: payload-free types carry
/// `LeafValue::Absent`, booleans `Boolean`, and so on. `capacity` bounds
/// the payload of every fragment produced from a string leaf.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeafNode {
    key: DocumentKey,
    path: String,
    fragment_type: FragmentType,
    value: LeafValue,
    capacity: u32,
}

impl LeafNode {
    fn build(
        key: DocumentKey,
        path: impl Into<String>,
        fragment_type: FragmentType,
        value: LeafValue,
        capacity: u32,
    ) -> Self {
        Self {
            key,
            path: path.into(),
            fragment_type,
            value,
            capacity,
        }
    }

    /// JSON `null`
    pub fn null(key: DocumentKey, path: impl Into<String>, capacity: u32) -> Self {
        Self::build(key, path, FragmentType::Null, LeafValue::Absent, capacity)
    }

    /// `{}`
    pub fn empty_object(key: DocumentKey, path: impl Into<String>, capacity: u32) -> Self {
        Self::build(key, path, FragmentType::EmptyObject, LeafValue::Absent, capacity)
    }

    /// `[]`
    pub fn empty_array(key: DocumentKey, path: impl Into<String>, capacity: u32) -> Self {
        Self::build(key, path, FragmentType::EmptyArray, LeafValue::Absent, capacity)
    }

    /// Delete marker
    pub fn deleted(key: DocumentKey, path: impl Into<String>, capacity: u32) -> Self {
        Self::build(key, path, FragmentType::Deleted, LeafValue::Absent, capacity)
    }

    /// Boolean leaf
    pub fn boolean(key: DocumentKey, path: impl Into<String>, value: bool, capacity: u32) -> Self {
        Self::build(
            key,
            path,
            FragmentType::Boolean,
            LeafValue::Boolean(value),
            capacity,
        )
    }

    /// Numeric leaf from its decimal text
    ///
    /// Fails when the text is not a finite number.
    pub fn numeric(
        key: DocumentKey,
        path: impl Into<String>,
        text: impl Into<String>,
        capacity: u32,
    ) -> Result<Self, CodecError> {
        let path = path.into();
        let text = text.into();
        if NumericValue::parse(&text).is_none() {
            return Err(CodecError::InvalidNumeric { path, text });
        }
        Ok(Self::build(
            key,
            path,
            FragmentType::Numeric,
            LeafValue::Numeric(text),
            capacity,
        ))
    }

    /// String leaf
    pub fn string(
        key: DocumentKey,
        path: impl Into<String>,
        value: impl Into<String>,
        capacity: u32,
    ) -> Self {
        Self::build(
            key,
            path,
            FragmentType::String,
            LeafValue::String(value.into()),
            capacity,
        )
    }

    /// Document version of the leaf
    pub fn key(&self) -> &DocumentKey {
        &self.key
    }

    /// Concrete path
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Leaf type
    pub fn fragment_type(&self) -> FragmentType {
        self.fragment_type
    }

    /// Logical value
    pub fn value(&self) -> &LeafValue {
        &self.value
    }

    /// Maximum fragment payload
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Fragments of this leaf in offset order
    ///
    /// Strings are chunked lazily; every other type yields one fragment at
    /// offset 0.
    pub fn fragments(&self) -> LeafFragments<'_> {
        let state = match &self.value {
            LeafValue::String(text) => {
                FragmentState::Chunks(Utf8Chunks::new(text, self.capacity as usize))
            }
            other => FragmentState::Single(Some(other.to_bytes())),
        };
        LeafFragments { leaf: self, state }
    }

    /// Rebuild a leaf from the fragments of one path, sorted by offset
    ///
    /// The declared type is taken from the first fragment. String chunks
    /// must be contiguous; every other type reads only the first payload.
    pub fn decode(
        key: &DocumentKey,
        path: &str,
        fragments: &[Fragment],
        capacity: u32,
    ) -> Result<Self, CodecError> {
        let first = fragments.first().ok_or_else(|| CodecError::NoFragments {
            path: path.to_string(),
        })?;
        let key = key.clone();

        match first.fragment_type() {
            FragmentType::String => {
                let mut decoder = Utf8StreamDecoder::new();
                let mut expected = 0u64;
                for fragment in fragments {
                    if fragment.offset() != expected {
                        return Err(CodecError::OffsetGap {
                            path: path.to_string(),
                            expected,
                            actual: fragment.offset(),
                        });
                    }
                    decoder.feed(fragment.value(), path)?;
                    expected += fragment.value().len() as u64;
                }
                let text = decoder.finish(path)?;
                Ok(Self::string(key, path, text, capacity))
            }
            FragmentType::Numeric => {
                let text = std::str::from_utf8(first.value()).map_err(|_| {
                    CodecError::InvalidUtf8 {
                        path: path.to_string(),
                    }
                })?;
                if text.is_empty() {
                    return Err(CodecError::EmptyPayload {
                        path: path.to_string(),
                    });
                }
                Self::numeric(key, path, text, capacity)
            }
            FragmentType::Boolean => {
                let byte = first.value().first().ok_or_else(|| CodecError::EmptyPayload {
                    path: path.to_string(),
                })?;
                Ok(Self::boolean(key, path, *byte == TRUE_BYTE, capacity))
            }
            FragmentType::Null => Ok(Self::null(key, path, capacity)),
            FragmentType::EmptyObject => Ok(Self::empty_object(key, path, capacity)),
            FragmentType::EmptyArray => Ok(Self::empty_array(key, path, capacity)),
            FragmentType::Deleted => Ok(Self::deleted(key, path, capacity)),
        }
    }
}

impl fmt::Display for LeafNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value.as_text() {
            Some(text) => write!(f, "{}={}", self.path, text),
            None => write!(f, "{}<{}>", self.path, self.fragment_type),
        }
    }
}

enum FragmentState<'a> {
    Single(Option<Vec<u8>>),
    Chunks(Utf8Chunks<'a>),
}

/// Iterator over the fragments of one leaf
pub struct LeafFragments<'a> {
    leaf: &'a LeafNode,
    state: FragmentState<'a>,
}

impl<'a> Iterator for LeafFragments<'a> {
    type Item = Fragment;

    fn next(&mut self) -> Option<Fragment> {
        let (offset, bytes) = match &mut self.state {
            FragmentState::Single(payload) => (0, payload.take()?),
            FragmentState::Chunks(chunks) => {
                let (offset, bytes) = chunks.next()?;
                (offset, bytes.to_vec())
            }
        };
        Some(Fragment::new(
            self.leaf.key.clone(),
            self.leaf.path.clone(),
            self.leaf.fragment_type,
            offset,
            bytes,
        ))
    }
}
