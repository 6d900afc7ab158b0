//! Closed enumerations shared by the codec and the storage contract
//!
//! - FragmentType: how a leaf's logical value is encoded
//! - DeletePolicy: link handling token passed through to the backend

use crate::error::CodecError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Type of a flattened leaf and of every fragment produced from it
///
/// ## Type Codes
///
/// These values are part of the stored format and MUST NOT change:
/// - Null = 0
/// - Deleted = 1
/// - EmptyObject = 2
/// - EmptyArray = 3
/// - String = 4
/// - Numeric = 5
/// - Boolean = 6
///
/// Ordering follows the type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum FragmentType {
    /// JSON null, no payload
    Null = 0,
    /// Tombstone marker, no payload
    Deleted = 1,
    /// Object without members, no payload
    EmptyObject = 2,
    /// Array without elements, no payload
    EmptyArray = 3,
    /// UTF-8 text, chunked across fragments
    String = 4,
    /// Decimal text of a number
    Numeric = 5,
    /// One byte: 1 = true, 0 = false
    Boolean = 6,
}

impl FragmentType {
    /// Stable type code
    pub fn code(&self) -> u8 {
        *self as u8
    }

    /// Decode a stable type code
    pub fn from_code(code: u8) -> Result<Self, CodecError> {
        match code {
            0 => Ok(FragmentType::Null),
            1 => Ok(FragmentType::Deleted),
            2 => Ok(FragmentType::EmptyObject),
            3 => Ok(FragmentType::EmptyArray),
            4 => Ok(FragmentType::String),
            5 => Ok(FragmentType::Numeric),
            6 => Ok(FragmentType::Boolean),
            other => Err(CodecError::UnknownFragmentType(other)),
        }
    }

    /// True for types whose fragments carry no payload
    pub fn is_payload_free(&self) -> bool {
        matches!(
            self,
            FragmentType::Null
                | FragmentType::Deleted
                | FragmentType::EmptyObject
                | FragmentType::EmptyArray
        )
    }
}

impl fmt::Display for FragmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FragmentType::Null => "NULL",
            FragmentType::Deleted => "DELETED",
            FragmentType::EmptyObject => "EMPTY_OBJECT",
            FragmentType::EmptyArray => "EMPTY_ARRAY",
            FragmentType::String => "STRING",
            FragmentType::Numeric => "NUMERIC",
            FragmentType::Boolean => "BOOLEAN",
        };
        f.write_str(name)
    }
}

/// How a delete treats links pointing at the deleted document
///
/// Enforcement belongs to the storage backend; this layer only passes the
/// token through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DeletePolicy {
    /// Only delete if no incoming links exist
    #[default]
    FailIfIncomingLinks,
    /// Remove the links from the linking documents
    DeleteIncomingLinks,
    /// Delete every document that depends on the target, recursively
    CascadeDeleteAll,
}

impl DeletePolicy {
    /// Stable name, used as a statistics key
    pub fn as_str(&self) -> &'static str {
        match self {
            DeletePolicy::FailIfIncomingLinks => "fail_if_incoming_links",
            DeletePolicy::DeleteIncomingLinks => "delete_incoming_links",
            DeletePolicy::CascadeDeleteAll => "cascade_delete_all",
        }
    }
}
