//! Credit accounting for push streams
//!
//! A producer may push one item per unit of credit granted by its consumer.
//! The budget is a signed integer: a failed attempt to consume leaves it one
//! below zero, and the next grant repays that unit before adding surplus.
//!
//! Grants can arrive synchronously from inside the callback that is being
//! driven by the drain loop. The `draining` flag makes sure only one drain
//! loop runs at a time; an overlapping grant only raises the budget, and
//! the active loop keeps consuming it.
//!
//! Single-threaded by construction (`Cell`), one instance per stream.

use std::cell::Cell;

/// Signed credit budget with a re-entry guard
#[derive(Debug, Default)]
pub struct Credit {
    budget: Cell<i64>,
    draining: Cell<bool>,
}

impl Credit {
    /// Zero budget, not draining
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `n` units, repaying a deficit first
    pub fn grant(&self, n: u64) {
        let n = i64::try_from(n).unwrap_or(i64::MAX);
        let previous = self.budget.get();
        let mut next = previous.saturating_add(n);
        if previous < 0 {
            // return the unit taken by the failed consume
            next = next.saturating_add(1);
        }
        self.budget.set(next);
    }

    /// Take one unit
    ///
    /// Returns false when there was no credit; the budget then stays one
    /// below zero until the next grant.
    pub fn try_consume(&self) -> bool {
        let previous = self.budget.get();
        self.budget.set(previous.saturating_sub(1));
        previous > 0
    }

    /// Current budget (negative while a unit is owed)
    pub fn budget(&self) -> i64 {
        self.budget.get()
    }

    /// True while a drain loop holds the guard
    pub fn is_draining(&self) -> bool {
        self.draining.get()
    }

    /// Enter the drain loop, `None` if another invocation is already in it
    pub fn enter(&self) -> Option<DrainGuard<'_>> {
        if self.draining.replace(true) {
            return None;
        }
        Some(DrainGuard { credit: self })
    }
}

/// Marks the drain loop as active until dropped
#[derive(Debug)]
pub struct DrainGuard<'a> {
    credit: &'a Credit,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.credit.draining.set(false);
    }
}
