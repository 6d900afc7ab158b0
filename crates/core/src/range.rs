//! Cursor ranges for paginated reads
//!
//! A `Range<T>` describes a window over an ordered key space with optional
//! exclusive bounds (`after`, `before`) and an optional count taken from the
//! low end (`first`) or the high end (`last`) of the window.
//!
//! ```
//! use ldstore_core::Range;
//!
//! let page = Range::first_after(6, "id03");
//! assert!(!page.is_backward());
//! assert_eq!(page.limit(), Some(6));
//!
//! let page = Range::last_before(6, "id10");
//! assert!(page.is_backward());
//! ```

use crate::error::RangeConstructionError;
use serde::Serialize;
use std::fmt;

/// Pagination window over keys of type `T`
///
/// ## Invariants
///
/// - `first` and `last` are never both set
/// - removing the limit never changes the read direction
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Range<T> {
    after: Option<T>,
    before: Option<T>,
    first: Option<u32>,
    last: Option<u32>,
    /// Set when a backward range lost its `last` limit
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    descending: bool,
}

impl<T> Range<T> {
    /// Create a range from all four parts
    ///
    /// Fails when both `first` and `last` are given.
    pub fn new(
        after: Option<T>,
        before: Option<T>,
        first: Option<u32>,
        last: Option<u32>,
    ) -> Result<Self, RangeConstructionError> {
        if first.is_some() && last.is_some() {
            return Err(RangeConstructionError);
        }
        Ok(Self {
            after,
            before,
            first,
            last,
            descending: false,
        })
    }

    // =========================================================================
    // Factories
    // =========================================================================

    /// No bounds, no limit
    pub fn unbounded() -> Self {
        Self {
            after: None,
            before: None,
            first: None,
            last: None,
            descending: false,
        }
    }

    /// The lowest `n` keys
    pub fn first(n: u32) -> Self {
        Self {
            first: Some(n),
            ..Self::unbounded()
        }
    }

    /// The highest `n` keys
    pub fn last(n: u32) -> Self {
        Self {
            last: Some(n),
            ..Self::unbounded()
        }
    }

    /// The lowest `n` keys strictly above `after`
    pub fn first_after(n: u32, after: T) -> Self {
        Self {
            after: Some(after),
            first: Some(n),
            ..Self::unbounded()
        }
    }

    /// The highest `n` keys strictly below `before`
    pub fn last_before(n: u32, before: T) -> Self {
        Self {
            before: Some(before),
            last: Some(n),
            ..Self::unbounded()
        }
    }

    /// The lowest `n` keys strictly between the bounds
    pub fn first_between(n: u32, after: T, before: T) -> Self {
        Self {
            after: Some(after),
            before: Some(before),
            first: Some(n),
            ..Self::unbounded()
        }
    }

    /// The highest `n` keys strictly between the bounds
    pub fn last_between(n: u32, after: T, before: T) -> Self {
        Self {
            after: Some(after),
            before: Some(before),
            last: Some(n),
            ..Self::unbounded()
        }
    }

    /// Every key strictly between the bounds
    pub fn between(after: T, before: T) -> Self {
        Self {
            after: Some(after),
            before: Some(before),
            ..Self::unbounded()
        }
    }

    /// Same bounds and direction with the limit removed
    ///
    /// `last(n).unlimited()` still reads from the high end.
    pub fn unlimited(self) -> Self {
        Self {
            descending: self.is_backward(),
            first: None,
            last: None,
            ..self
        }
    }

    /// Convert the bounds to another key type, keeping the limit
    pub fn map<U, F>(self, mut f: F) -> Range<U>
    where
        F: FnMut(T) -> U,
    {
        Range {
            after: self.after.map(&mut f),
            before: self.before.map(&mut f),
            first: self.first,
            last: self.last,
            descending: self.descending,
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Exclusive lower bound
    pub fn after(&self) -> Option<&T> {
        self.after.as_ref()
    }

    /// Exclusive upper bound
    pub fn before(&self) -> Option<&T> {
        self.before.as_ref()
    }

    /// Count taken from the low end
    pub fn first_limit(&self) -> Option<u32> {
        self.first
    }

    /// Count taken from the high end
    pub fn last_limit(&self) -> Option<u32> {
        self.last
    }

    /// True if an `after` bound is set
    pub fn has_after(&self) -> bool {
        self.after.is_some()
    }

    /// True if a `before` bound is set
    pub fn has_before(&self) -> bool {
        self.before.is_some()
    }

    /// True if a `first` limit is set
    pub fn has_first(&self) -> bool {
        self.first.is_some()
    }

    /// True if a `last` limit is set
    pub fn has_last(&self) -> bool {
        self.last.is_some()
    }

    /// True if the source must be read in descending key order
    pub fn is_backward(&self) -> bool {
        self.descending || self.has_last() || (self.has_before() && !self.has_after())
    }

    /// True if either `first` or `last` is set
    pub fn is_limited(&self) -> bool {
        self.has_first() || self.has_last()
    }

    /// `first` or `last`, whichever is set
    pub fn limit(&self) -> Option<u32> {
        self.first.or(self.last)
    }
}

impl<T> Default for Range<T> {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl<T: fmt::Display> fmt::Display for Range<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Range[range=[")?;
        match &self.after {
            Some(after) => write!(f, "{}", after)?,
            None => f.write_str("...")?,
        }
        f.write_str(":")?;
        match &self.before {
            Some(before) => write!(f, "{}", before)?,
            None => f.write_str("...")?,
        }
        f.write_str("]")?;
        if let Some(first) = self.first {
            write!(f, ", first={}", first)?;
        }
        if let Some(last) = self.last {
            write!(f, ", last={}", last)?;
        }
        f.write_str("]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_first_and_last() {
        assert_eq!(
            Range::<&str>::new(None, None, Some(1), Some(1)),
            Err(RangeConstructionError)
        );
        assert!(Range::new(Some("a"), Some("b"), Some(1), None).is_ok());
    }

    #[test]
    fn test_direction() {
        assert!(!Range::<&str>::unbounded().is_backward());
        assert!(!Range::<&str>::first(3).is_backward());
        assert!(Range::<&str>::last(3).is_backward());
        assert!(!Range::first_after(3, "a").is_backward());
        assert!(Range::last_before(3, "a").is_backward());
        assert!(!Range::between("a", "b").is_backward());
        assert!(!Range::first_between(1, "a", "b").is_backward());
        assert!(Range::last_between(1, "a", "b").is_backward());
    }

    #[test]
    fn test_before_only_reads_backward() {
        let range = Range::new(None, Some("z"), None, None).unwrap();
        assert!(range.is_backward());
        assert!(!range.is_limited());
    }

    #[test]
    fn test_limit() {
        assert_eq!(Range::<&str>::first(4).limit(), Some(4));
        assert_eq!(Range::<&str>::last(5).limit(), Some(5));
        assert_eq!(Range::<&str>::unbounded().limit(), None);
        assert!(Range::<&str>::first(4).is_limited());
    }

    #[test]
    fn test_unlimited_keeps_bounds() {
        let range = Range::first_between(3, "a", "z").unlimited();
        assert_eq!(range.after(), Some(&"a"));
        assert_eq!(range.before(), Some(&"z"));
        assert!(!range.is_limited());
    }

    #[test]
    fn test_unlimited_keeps_direction() {
        let range = Range::<&str>::last(2).unlimited();
        assert!(range.is_backward());
        assert!(!range.is_limited());

        let range = Range::last_between(2, "a", "z").unlimited();
        assert!(range.is_backward());
        assert_eq!(range.after(), Some(&"a"));

        assert!(!Range::first_between(2, "a", "z").unlimited().is_backward());
        assert!(!Range::<&str>::first(2).unlimited().is_backward());
        assert!(Range::last_before(2, "m").unlimited().is_backward());
        assert_ne!(Range::<&str>::last(2).unlimited(), Range::unbounded());
    }

    #[test]
    fn test_serialized_form() {
        let value = serde_json::to_value(Range::first_after(3, "id03")).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"after": "id03", "before": null, "first": 3, "last": null})
        );
        let value = serde_json::to_value(Range::<&str>::last(3).unlimited()).unwrap();
        assert_eq!(value["descending"], serde_json::json!(true));
    }

    #[test]
    fn test_map_keeps_limits() {
        let range = Range::last_before(2, "id07").map(|s| s.to_string());
        assert_eq!(range.before().map(String::as_str), Some("id07"));
        assert_eq!(range.last_limit(), Some(2));
        assert!(range.after().is_none());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            Range::first_after(6, "id03").to_string(),
            "Range[range=[id03:...], first=6]"
        );
        assert_eq!(Range::<u32>::unbounded().to_string(), "Range[range=[...:...]]");
        assert_eq!(Range::last_between(2, 1, 9).to_string(), "Range[range=[1:9], last=2]");
    }
}
