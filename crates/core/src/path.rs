//! Document path grammar and path ordering
//!
//! A path addresses one node of a JSON document:
//!
//! | Syntax | Meaning | Example |
//! |--------|---------|---------|
//! | `$` | Document root | `$` |
//! | `.name` | Object member | `$.user` |
//! | `[N]` | Array element at index N | `$.items[0]` |
//! | `[]` | Any array element (schema level only) | `$.items[].name` |
//!
//! Flattened leaves always carry concrete paths: every array access is an
//! integer index, never `[]`.
//!
//! # Ordering
//!
//! [`compare_paths`] orders paths segment by segment, comparing numeric
//! segments as integers, so that `$.a[9]` sorts before `$.a[10]`.
//! [`PathKey`] wraps a path string with that ordering for use as a map key.

use crate::error::PathError;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Root of every path
pub const ROOT: &str = "$";

// =============================================================================
// PathSegment
// =============================================================================

/// One step of a parsed path
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PathSegment {
    /// Object member: `.name`
    Field(String),
    /// Array element: `[N]`
    Index(usize),
    /// Any array element: `[]`
    AnyIndex,
}

impl PathSegment {
    /// True for `Index` and `AnyIndex`
    pub fn is_index(&self) -> bool {
        matches!(self, PathSegment::Index(_) | PathSegment::AnyIndex)
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Field(name) => write!(f, ".{}", name),
            PathSegment::Index(i) => write!(f, "[{}]", i),
            PathSegment::AnyIndex => f.write_str("[]"),
        }
    }
}

// =============================================================================
// Parsing
// =============================================================================

fn is_delimiter(b: u8) -> bool {
    matches!(b, b'.' | b'[' | b']')
}

/// Parse a path into its segments (the root `$` is implicit)
///
/// # Examples
///
/// ```
/// use ldstore_core::path::{parse_path, PathSegment};
///
/// let segments = parse_path("$.items[2].name").unwrap();
/// assert_eq!(
///     segments,
///     vec![
///         PathSegment::Field("items".to_string()),
///         PathSegment::Index(2),
///         PathSegment::Field("name".to_string()),
///     ]
/// );
/// assert!(parse_path("$").unwrap().is_empty());
/// ```
pub fn parse_path(path: &str) -> Result<Vec<PathSegment>, PathError> {
    if path.is_empty() {
        return Err(PathError::Empty);
    }
    if !path.starts_with('$') {
        return Err(PathError::MissingRoot(path.to_string()));
    }

    let bytes = path.as_bytes();
    let mut segments = Vec::new();
    let mut i = 1;

    while i < bytes.len() {
        match bytes[i] {
            b'.' => {
                let start = i + 1;
                let mut end = start;
                while end < bytes.len() && !is_delimiter(bytes[end]) {
                    end += 1;
                }
                if end == start {
                    return Err(PathError::EmptyField { position: i });
                }
                // delimiters are ASCII, so both ends sit on char boundaries
                segments.push(PathSegment::Field(path[start..end].to_string()));
                i = end;
            }
            b'[' => {
                let open = i;
                let start = i + 1;
                let mut end = start;
                while end < bytes.len() && bytes[end] != b']' {
                    if bytes[end] == b'[' || bytes[end] == b'.' {
                        return Err(PathError::UnclosedBracket { position: open });
                    }
                    end += 1;
                }
                if end >= bytes.len() {
                    return Err(PathError::UnclosedBracket { position: open });
                }
                let text = &path[start..end];
                if text.is_empty() {
                    segments.push(PathSegment::AnyIndex);
                } else if text.bytes().all(|b| b.is_ascii_digit()) {
                    let index = text.parse::<usize>().map_err(|_| PathError::InvalidIndex {
                        position: start,
                        text: text.to_string(),
                    })?;
                    segments.push(PathSegment::Index(index));
                } else {
                    return Err(PathError::InvalidIndex {
                        position: start,
                        text: text.to_string(),
                    });
                }
                i = end + 1;
            }
            b']' => return Err(PathError::StrayBracket { position: i }),
            _ => {
                let found = path[i..].chars().next().unwrap_or('?');
                return Err(PathError::UnexpectedChar { found, position: i });
            }
        }
    }

    Ok(segments)
}

/// Parse a path that must be concrete (no `[]`)
pub fn parse_concrete_path(path: &str) -> Result<Vec<PathSegment>, PathError> {
    let segments = parse_path(path)?;
    if segments.contains(&PathSegment::AnyIndex) {
        return Err(PathError::WildcardIndex {
            path: path.to_string(),
        });
    }
    Ok(segments)
}

/// Render segments back into a path string
pub fn format_path(segments: &[PathSegment]) -> String {
    let mut path = String::from(ROOT);
    for segment in segments {
        path.push_str(&segment.to_string());
    }
    path
}

/// Check that an object member name can appear in a path
pub fn validate_field_name(name: &str) -> Result<(), PathError> {
    if name.is_empty() || name.bytes().any(is_delimiter) {
        return Err(PathError::InvalidFieldName {
            name: name.to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Ordering
// =============================================================================

/// Split a path on `.`, `[` and `]` (a `].` pair counts as one delimiter)
///
/// Trailing empty segments are dropped, so `$.a[0]` splits into
/// `["$", "a", "0"]`.
fn comparison_segments(path: &str) -> Vec<&str> {
    let bytes = path.as_bytes();
    let mut segments = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'.' | b'[' => {
                segments.push(&path[start..i]);
                i += 1;
                start = i;
            }
            b']' => {
                segments.push(&path[start..i]);
                i += 1;
                if i < bytes.len() && bytes[i] == b'.' {
                    i += 1;
                }
                start = i;
            }
            _ => i += 1,
        }
    }
    segments.push(&path[start..]);
    while segments.last().map_or(false, |s| s.is_empty()) {
        segments.pop();
    }
    segments
}

fn is_numeric_segment(segment: &str) -> bool {
    !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit())
}

/// Compare two all-digit strings by integer value, without overflow
fn compare_numeric(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Total order over path strings
///
/// Paths with fewer segments sort first. Otherwise segments are compared in
/// turn: two all-digit segments by integer value, anything else as strings.
/// Paths whose segments all compare equal fall back to plain string order,
/// which keeps the order consistent with string equality.
///
/// ```
/// use ldstore_core::path::compare_paths;
/// use std::cmp::Ordering;
///
/// assert_eq!(compare_paths("$.a[9].c", "$.a[10].a"), Ordering::Less);
/// assert_eq!(compare_paths("$.b", "$.a.b"), Ordering::Less);
/// ```
pub fn compare_paths(a: &str, b: &str) -> Ordering {
    let sa = comparison_segments(a);
    let sb = comparison_segments(b);
    if sa.len() != sb.len() {
        return sa.len().cmp(&sb.len());
    }
    for (x, y) in sa.iter().zip(sb.iter()) {
        let ordering = if is_numeric_segment(x) && is_numeric_segment(y) {
            compare_numeric(x, y).then_with(|| x.cmp(y))
        } else {
            x.cmp(y)
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    a.cmp(b)
}

/// A path string ordered by [`compare_paths`]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PathKey(String);

impl PathKey {
    /// Wrap a path string
    pub fn new(path: impl Into<String>) -> Self {
        PathKey(path.into())
    }

    /// The root path `$`
    pub fn root() -> Self {
        PathKey(ROOT.to_string())
    }

    /// Path string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Unwrap into the path string
    pub fn into_string(self) -> String {
        self.0
    }
}

impl Ord for PathKey {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_paths(&self.0, &other.0)
    }
}

impl PartialOrd for PathKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for PathKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PathKey {
    fn from(path: &str) -> Self {
        PathKey::new(path)
    }
}

impl From<String> for PathKey {
    fn from(path: String) -> Self {
        PathKey(path)
    }
}

// =============================================================================
// Index-unaware paths
// =============================================================================

/// Replace every `[N]` and `[]` with `[]`, collecting the indices
///
/// Schema-level paths use `[]` for "any element". Stripping the indices of a
/// concrete path gives the schema path it belongs to; `None` marks a `[]`
/// that was already index-free.
///
/// ```
/// use ldstore_core::path::index_unaware_path;
///
/// let (path, indices) = index_unaware_path("$.a.b[3103].c.d[2].e").unwrap();
/// assert_eq!(path, "$.a.b[].c.d[].e");
/// assert_eq!(indices, vec![Some(3103), Some(2)]);
/// ```
pub fn index_unaware_path(path: &str) -> Result<(String, Vec<Option<usize>>), PathError> {
    let bytes = path.as_bytes();
    let mut out = String::with_capacity(path.len());
    let mut indices = Vec::new();
    let mut copied = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'[' {
            i += 1;
            continue;
        }
        let mut end = i + 1;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
        if end < bytes.len() && bytes[end] == b']' {
            let text = &path[i + 1..end];
            let index = if text.is_empty() {
                None
            } else {
                Some(text.parse::<usize>().map_err(|_| PathError::InvalidIndex {
                    position: i + 1,
                    text: text.to_string(),
                })?)
            };
            out.push_str(&path[copied..i]);
            out.push_str("[]");
            indices.push(index);
            copied = end + 1;
            i = end + 1;
        } else {
            i += 1;
        }
    }
    out.push_str(&path[copied..]);
    Ok((out, indices))
}

/// Inverse of [`index_unaware_path`]
///
/// Each `[]` takes the next index in turn. A `None` index, or running out of
/// indices, leaves the `[]` in place.
pub fn path_from_index_unaware(path: &str, indices: &[Option<usize>]) -> String {
    let mut out = String::with_capacity(path.len() + indices.len() * 2);
    let mut rest = path;
    let mut next = indices.iter();
    while let Some(pos) = rest.find("[]") {
        out.push_str(&rest[..pos]);
        match next.next() {
            Some(Some(index)) => {
                out.push('[');
                out.push_str(&index.to_string());
                out.push(']');
            }
            _ => out.push_str("[]"),
        }
        rest = &rest[pos + 2..];
    }
    out.push_str(rest);
    out
}
