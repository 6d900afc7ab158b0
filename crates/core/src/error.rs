//! Error types for the persistence layer
//!
//! This module defines all error types used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! Codec and path errors are local to one leaf, but they are never skipped:
//! a malformed leaf fails the whole document operation.

use thiserror::Error;

/// Result type alias for persistence operations
pub type Result<T> = std::result::Result<T, PersistenceError>;

/// Malformed or incompatible stored fragment data
///
/// Always fatal to the decode in progress and never retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Fragment bytes of a string leaf are not valid UTF-8
    #[error("invalid UTF-8 in string value at path '{path}'")]
    InvalidUtf8 {
        /// Path of the offending leaf
        path: String,
    },

    /// Fragment bytes of a string leaf end in the middle of a code point
    #[error("truncated UTF-8 sequence at end of string value at path '{path}'")]
    TruncatedUtf8 {
        /// Path of the offending leaf
        path: String,
    },

    /// Type code outside the closed `FragmentType` set
    #[error("fragment type code not supported: {0}")]
    UnknownFragmentType(u8),

    /// A typed leaf that needs a payload had none
    #[error("empty payload for typed leaf at path '{path}'")]
    EmptyPayload {
        /// Path of the offending leaf
        path: String,
    },

    /// Numeric leaf text that is not a number
    #[error("invalid numeric value '{text}' at path '{path}'")]
    InvalidNumeric {
        /// Path of the offending leaf
        path: String,
        /// Stored decimal text
        text: String,
    },

    /// Chunks of a string leaf do not line up
    #[error("fragment offset gap at path '{path}': expected offset {expected}, got {actual}")]
    OffsetGap {
        /// Path of the offending leaf
        path: String,
        /// Offset implied by the bytes seen so far
        expected: u64,
        /// Offset carried by the fragment
        actual: u64,
    },

    /// A path bucket with no fragments
    #[error("no fragments for path '{path}'")]
    NoFragments {
        /// Path of the empty bucket
        path: String,
    },
}

/// A path string that violates the path grammar
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PathError {
    /// Empty path string
    #[error("empty path")]
    Empty,

    /// Path does not start at the document root `$`
    #[error("path must start with '$': {0}")]
    MissingRoot(String),

    /// `.` not followed by a field name
    #[error("empty field name at position {position}")]
    EmptyField {
        /// Byte position in the path
        position: usize,
    },

    /// `[` without a matching `]`
    #[error("unclosed bracket starting at position {position}")]
    UnclosedBracket {
        /// Byte position in the path
        position: usize,
    },

    /// `]` without a matching `[`
    #[error("stray bracket at position {position}")]
    StrayBracket {
        /// Byte position in the path
        position: usize,
    },

    /// Bracket content that is neither empty nor a decimal integer
    #[error("invalid array index at position {position}: {text}")]
    InvalidIndex {
        /// Byte position in the path
        position: usize,
        /// Bracket content
        text: String,
    },

    /// Segment that does not start with `.` or `[`
    #[error("unexpected character '{found}' at position {position}")]
    UnexpectedChar {
        /// Offending character
        found: char,
        /// Byte position in the path
        position: usize,
    },

    /// Schema-level `[]` in a path that must be concrete
    #[error("concrete path contains '[]': {path}")]
    WildcardIndex {
        /// Offending path
        path: String,
    },

    /// Object member name that cannot be expressed in the path grammar
    #[error("field name cannot be used in a path: '{name}'")]
    InvalidFieldName {
        /// Offending member name
        name: String,
    },

    /// Two leaves disagree about the shape of a shared container
    #[error("conflicting container shape at path '{path}'")]
    Conflict {
        /// Path of the conflicting leaf
        path: String,
    },
}

/// Both `first` and `last` were requested for one range
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("range cannot use both first and last limits")]
pub struct RangeConstructionError;

/// Error types for the persistence layer
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Stored fragment data could not be decoded
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Path grammar violation
    #[error("Path error: {0}")]
    Path(#[from] PathError),

    /// Invalid range construction
    #[error("Range error: {0}")]
    Range(#[from] RangeConstructionError),

    /// Failure reported by the storage backend
    #[error("Storage error: {0}")]
    Storage(String),

    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error (configuration files)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PersistenceError {
    /// Create a storage error from any displayable backend failure
    pub fn storage(message: impl Into<String>) -> Self {
        PersistenceError::Storage(message.into())
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        PersistenceError::Config(message.into())
    }

    /// True when the error originates in stored data rather than the backend
    pub fn is_data_error(&self) -> bool {
        matches!(self, PersistenceError::Codec(_) | PersistenceError::Path(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_error_display_codec() {
        let err: PersistenceError = CodecError::InvalidUtf8 {
            path: "$.name".to_string(),
        }
        .into();
        let msg = err.to_string();
        assert!(msg.contains("Codec error"));
        assert!(msg.contains("$.name"));
    }

    #[test]
    fn test_error_display_unknown_type() {
        let err = CodecError::UnknownFragmentType(9);
        assert_eq!(err.to_string(), "fragment type code not supported: 9");
    }

    #[test]
    fn test_error_display_path() {
        let err: PersistenceError = PathError::UnclosedBracket { position: 3 }.into();
        let msg = err.to_string();
        assert!(msg.contains("Path error"));
        assert!(msg.contains("position 3"));
    }

    #[test]
    fn test_error_display_range() {
        let err: PersistenceError = RangeConstructionError.into();
        assert!(err.to_string().contains("both first and last"));
    }

    #[test]
    fn test_error_display_storage() {
        let err = PersistenceError::storage("write failed");
        let msg = err.to_string();
        assert!(msg.contains("Storage error"));
        assert!(msg.contains("write failed"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "missing");
        let err: PersistenceError = io_err.into();
        assert!(matches!(err, PersistenceError::Io(_)));
    }

    #[test]
    fn test_is_data_error() {
        assert!(PersistenceError::from(CodecError::UnknownFragmentType(7)).is_data_error());
        assert!(PersistenceError::from(PathError::Empty).is_data_error());
        assert!(!PersistenceError::storage("x").is_data_error());
        assert!(!PersistenceError::config("x").is_data_error());
    }

    #[test]
    fn test_offset_gap_display() {
        let err = CodecError::OffsetGap {
            path: "$.a".to_string(),
            expected: 3,
            actual: 5,
        };
        let msg = err.to_string();
        assert!(msg.contains("expected offset 3"));
        assert!(msg.contains("got 5"));
    }
}
