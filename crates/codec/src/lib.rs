//! Flatten/chunk codec for ldstore
//!
//! This crate converts between three representations of a document:
//! - JSON tree (`serde_json::Value`, wrapped in `JsonDocument`)
//! - Flattened `Document`: path-ordered map of typed `LeafNode`s
//! - Fragments: size-bounded, offset-addressed chunks of each leaf
//!
//! String leaves are chunked on code point boundaries and decoded with a
//! streaming UTF-8 decoder, so no fragment ever holds half a character.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod document;
pub mod json;
pub mod leaf;
pub mod value;

pub use document::{decode_document, Document};
pub use json::{flatten, unflatten, JsonDocument};
pub use leaf::{LeafFragments, LeafNode};
pub use value::{LeafValue, NumericValue, Utf8Chunks, Utf8StreamDecoder};

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    assert_impl_all!(Document: Send, Sync, Clone);
    assert_impl_all!(LeafNode: Send, Sync, Clone);
    assert_impl_all!(JsonDocument: Send, Sync, Clone);
}
