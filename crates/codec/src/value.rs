//! Logical leaf values and their byte-level encodings
//!
//! - `LeafValue`: the decoded value at one path
//! - `NumericValue`: narrowest exact reading of a numeric leaf's text
//! - `Utf8Chunks`: splits a string into capacity-bounded byte chunks on
//!   code point boundaries
//! - `Utf8StreamDecoder`: reassembles chunks, carrying incomplete code
//!   points across chunk boundaries

use ldstore_core::CodecError;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// Payload of a boolean `true`
pub const TRUE_BYTE: u8 = 1;

/// Payload of a boolean `false`
pub const FALSE_BYTE: u8 = 0;

// =============================================================================
// LeafValue
// =============================================================================

/// Logical value of one flattened leaf
///
/// `Absent` is the value of payload-free types (null, empty containers,
/// delete markers). Numbers keep their decimal text, which is the
/// canonical stored form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LeafValue {
    /// No payload
    Absent,
    /// `true` or `false`
    Boolean(bool),
    /// Decimal text of a number
    Numeric(String),
    /// Text
    String(String),
}

impl LeafValue {
    /// Text form of the value (`None` for `Absent`)
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            LeafValue::Absent => None,
            LeafValue::Boolean(b) => Some(Cow::Borrowed(if *b { "true" } else { "false" })),
            LeafValue::Numeric(text) | LeafValue::String(text) => Some(Cow::Borrowed(text)),
        }
    }

    /// Stored payload bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            LeafValue::Absent => Vec::new(),
            LeafValue::Boolean(b) => vec![if *b { TRUE_BYTE } else { FALSE_BYTE }],
            LeafValue::Numeric(text) | LeafValue::String(text) => text.as_bytes().to_vec(),
        }
    }
}

// =============================================================================
// NumericValue
// =============================================================================

/// Narrowest exact reading of a numeric leaf
///
/// Parsing tries, in order, a signed 64-bit integer, an unsigned 64-bit
/// integer and a finite double. The first reading that succeeds is used.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NumericValue {
    /// Fits in i64
    Integer(i64),
    /// Positive integer beyond i64
    Unsigned(u64),
    /// Anything else that is a finite number
    Float(f64),
}

impl NumericValue {
    /// Parse decimal text, `None` if it is not a finite number
    pub fn parse(text: &str) -> Option<Self> {
        if let Ok(i) = text.parse::<i64>() {
            return Some(NumericValue::Integer(i));
        }
        if let Ok(u) = text.parse::<u64>() {
            return Some(NumericValue::Unsigned(u));
        }
        // Rust accepts "inf" and "NaN", JSON does not
        if !text
            .bytes()
            .all(|b| b.is_ascii_digit() || matches!(b, b'-' | b'+' | b'.' | b'e' | b'E'))
        {
            return None;
        }
        match text.parse::<f64>() {
            Ok(f) if f.is_finite() => Some(NumericValue::Float(f)),
            _ => None,
        }
    }

    /// JSON number of this reading
    pub fn to_json(self) -> Option<serde_json::Number> {
        match self {
            NumericValue::Integer(i) => Some(i.into()),
            NumericValue::Unsigned(u) => Some(u.into()),
            NumericValue::Float(f) => serde_json::Number::from_f64(f),
        }
    }
}

// =============================================================================
// Encoding
// =============================================================================

/// Byte chunks of a string, each at most `capacity` bytes
///
/// A chunk is cut only when the rest of the string does not fit, and never
/// inside a code point. The last chunk holds whatever remains; it is empty
/// only for the empty string, which still yields exactly one chunk. A
/// single code point wider than the capacity forms a chunk of its own.
///
/// Yields `(offset, bytes)` pairs.
#[derive(Debug, Clone)]
pub struct Utf8Chunks<'a> {
    text: &'a str,
    pos: usize,
    capacity: usize,
    done: bool,
}

impl<'a> Utf8Chunks<'a> {
    /// Chunk `text` into pieces of at most `capacity` bytes (minimum 1)
    pub fn new(text: &'a str, capacity: usize) -> Self {
        Self {
            text,
            pos: 0,
            capacity: capacity.max(1),
            done: false,
        }
    }
}

impl<'a> Iterator for Utf8Chunks<'a> {
    type Item = (u64, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let start = self.pos;
        let remaining = self.text.len() - start;
        if remaining <= self.capacity {
            self.done = true;
            self.pos = self.text.len();
            return Some((start as u64, &self.text.as_bytes()[start..]));
        }

        let mut end = start + self.capacity;
        while end > start && !self.text.is_char_boundary(end) {
            end -= 1;
        }
        if end == start {
            // code point wider than the capacity
            end = start + 1;
            while !self.text.is_char_boundary(end) {
                end += 1;
            }
        }
        self.pos = end;
        Some((start as u64, &self.text.as_bytes()[start..end]))
    }
}

// =============================================================================
// Decoding
// =============================================================================

/// Stateful UTF-8 decoder fed one chunk at a time
///
/// Bytes of a code point cut by a chunk boundary are held back until the
/// next chunk completes them.
#[derive(Debug, Default)]
pub struct Utf8StreamDecoder {
    pending: Vec<u8>,
    out: String,
}

impl Utf8StreamDecoder {
    /// Create an empty decoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one chunk
    ///
    /// `path` names the leaf in errors.
    pub fn feed(&mut self, bytes: &[u8], path: &str) -> Result<(), CodecError> {
        if self.pending.is_empty() {
            return self.decode_from(bytes, path);
        }
        let mut joined = std::mem::take(&mut self.pending);
        joined.extend_from_slice(bytes);
        self.decode_from(&joined, path)
    }

    fn decode_from(&mut self, bytes: &[u8], path: &str) -> Result<(), CodecError> {
        match std::str::from_utf8(bytes) {
            Ok(text) => {
                self.out.push_str(text);
                Ok(())
            }
            Err(e) => {
                let valid = e.valid_up_to();
                // valid_up_to marks a verified prefix
                if let Ok(text) = std::str::from_utf8(&bytes[..valid]) {
                    self.out.push_str(text);
                }
                match e.error_len() {
                    Some(_) => Err(CodecError::InvalidUtf8 {
                        path: path.to_string(),
                    }),
                    None => {
                        self.pending = bytes[valid..].to_vec();
                        Ok(())
                    }
                }
            }
        }
    }

    /// Finish decoding; fails if a code point is still incomplete
    pub fn finish(self, path: &str) -> Result<String, CodecError> {
        if !self.pending.is_empty() {
            return Err(CodecError::TruncatedUtf8 {
                path: path.to_string(),
            });
        }
        Ok(self.out)
    }
}
