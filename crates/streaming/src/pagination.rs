//! Cursor pagination over ordered streams
//!
//! A `Range<K>` selects a page from a stream of items that each map to a
//! key. Forward ranges expect ascending keys, backward ranges descending
//! keys; the adapter never reorders, it only skips and stops.
//!
//! Forward (`first`, `after`, `before`):
//! - skip while `key <= after`
//! - stop once `key >= before`
//! - stop after `first` items
//!
//! Backward (`last`, or `before` without `after`):
//! - skip while `key >= before`
//! - stop once `key <= after`
//! - stop after `last` items

use ldstore_core::Range;

/// What to do with one item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Before the window, drop it and keep pulling
    Skip,
    /// Inside the window
    Take,
    /// Past the window, end the page
    Stop,
}

/// Window state machine for one page
#[derive(Debug, Clone)]
pub struct Paginator<K> {
    range: Range<K>,
    backward: bool,
    skipping: bool,
    taken: u32,
    stopped: bool,
}

impl<K: Ord> Paginator<K> {
    /// Paginator for `range`
    pub fn new(range: Range<K>) -> Self {
        Self {
            backward: range.is_backward(),
            range,
            skipping: true,
            taken: 0,
            stopped: false,
        }
    }

    /// True for a descending walk
    pub fn is_backward(&self) -> bool {
        self.backward
    }

    fn item_limit(&self) -> Option<u32> {
        if self.backward {
            self.range.last_limit()
        } else {
            self.range.first_limit()
        }
    }

    /// True once no further item can be taken
    ///
    /// Checked before pulling, so a full page never reads one item too many.
    pub fn is_exhausted(&self) -> bool {
        self.stopped || self.item_limit().map_or(false, |limit| self.taken >= limit)
    }

    /// Classify the next item by its key
    pub fn admit(&mut self, key: &K) -> Admission {
        if self.is_exhausted() {
            self.stopped = true;
            return Admission::Stop;
        }

        let (skip_bound, stop_bound) = if self.backward {
            (self.range.before(), self.range.after())
        } else {
            (self.range.after(), self.range.before())
        };

        if self.skipping {
            let skip = skip_bound.map_or(false, |bound| {
                if self.backward {
                    key >= bound
                } else {
                    key <= bound
                }
            });
            if skip {
                return Admission::Skip;
            }
            self.skipping = false;
        }

        let past = stop_bound.map_or(false, |bound| {
            if self.backward {
                key <= bound
            } else {
                key >= bound
            }
        });
        if past {
            self.stopped = true;
            return Admission::Stop;
        }

        self.taken += 1;
        Admission::Take
    }
}

// =============================================================================
// Adapters
// =============================================================================

/// Page of a plain iterator
pub struct Paginated<I, K, F> {
    items: I,
    key_fn: F,
    paginator: Paginator<K>,
}

impl<I, K, F> Iterator for Paginated<I, K, F>
where
    I: Iterator,
    K: Ord,
    F: FnMut(&I::Item) -> K,
{
    type Item = I::Item;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.paginator.is_exhausted() {
                return None;
            }
            let item = self.items.next()?;
            match self.paginator.admit(&(self.key_fn)(&item)) {
                Admission::Skip => continue,
                Admission::Take => return Some(item),
                Admission::Stop => return None,
            }
        }
    }
}

/// Page of a fallible iterator
///
/// An `Err` is passed through and ends the page.
pub struct TryPaginated<I, K, F> {
    items: I,
    key_fn: F,
    paginator: Paginator<K>,
    failed: bool,
}

impl<I, T, E, K, F> Iterator for TryPaginated<I, K, F>
where
    I: Iterator<Item = Result<T, E>>,
    K: Ord,
    F: FnMut(&T) -> K,
{
    type Item = Result<T, E>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.failed || self.paginator.is_exhausted() {
                return None;
            }
            let item = match self.items.next()? {
                Ok(item) => item,
                Err(error) => {
                    self.failed = true;
                    return Some(Err(error));
                }
            };
            match self.paginator.admit(&(self.key_fn)(&item)) {
                Admission::Skip => continue,
                Admission::Take => return Some(Ok(item)),
                Admission::Stop => return None,
            }
        }
    }
}

/// Pagination adapters for every iterator
pub trait PaginateExt: Iterator + Sized {
    /// Apply `range` to a stream keyed by `key_fn`
    fn paginate<K, F>(self, range: Range<K>, key_fn: F) -> Paginated<Self, K, F>
    where
        K: Ord,
        F: FnMut(&Self::Item) -> K,
    {
        Paginated {
            items: self,
            key_fn,
            paginator: Paginator::new(range),
        }
    }

    /// Apply `range` to the `Ok` items of a fallible stream
    fn try_paginate<T, E, K, F>(self, range: Range<K>, key_fn: F) -> TryPaginated<Self, K, F>
    where
        Self: Iterator<Item = Result<T, E>>,
        K: Ord,
        F: FnMut(&T) -> K,
    {
        TryPaginated {
            items: self,
            key_fn,
            paginator: Paginator::new(range),
            failed: false,
        }
    }
}

impl<I: Iterator> PaginateExt for I {}
