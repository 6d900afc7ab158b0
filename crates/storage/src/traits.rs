//! Storage backend contract
//!
//! A backend persists fragments and serves them back as ordered streams.
//! The layers above (`FlattenedPersistence`, `JsonPersistence`) only rely on
//! the ordering documented on each read method:
//! - `read`: one version, by path then offset
//! - `read_range` and `find`: by id (descending for backward ranges), each
//!   document's fragments contiguous
//! - `read_versions`: by version (descending for backward ranges)
//!
//! Streams may end with a `StreamItem::Control` sentinel whose `limited`
//! flag tells whether the backend cut the result at the range limit.

use ldstore_core::{DeletePolicy, Fragment, Range, Result, StreamItem, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Ordered fragment stream returned by backend reads
pub type FragmentStream<'a> = Box<dyn Iterator<Item = Result<StreamItem>> + 'a>;

/// Named counters collected by one transaction
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionStatistics {
    counters: BTreeMap<String, u64>,
}

impl TransactionStatistics {
    /// Empty statistics
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `increment` to the counter `name`
    pub fn add(&mut self, name: &str, increment: u64) -> &mut Self {
        let counter = self.counters.entry(name.to_string()).or_insert(0);
        *counter = counter.saturating_add(increment);
        self
    }

    /// Counter value, 0 if never touched
    pub fn get(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }

    /// All counters in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> + '_ {
        self.counters.iter().map(|(name, value)| (name.as_str(), *value))
    }

    /// True if no counter was touched
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }
}

impl fmt::Display for TransactionStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TransactionStatistics{")?;
        for (i, (name, value)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}={}", name, value)?;
        }
        f.write_str("}")
    }
}

/// Unit of work against a backend
pub trait Transaction {
    /// True if the transaction rejects writes
    fn is_read_only(&self) -> bool;

    /// Counters collected so far
    fn statistics(&self) -> TransactionStatistics;

    /// Make the transaction's changes permanent
    fn commit(self) -> Result<TransactionStatistics>
    where
        Self: Sized;

    /// Discard the transaction's changes
    fn cancel(self) -> Result<TransactionStatistics>
    where
        Self: Sized;
}

/// Fragment-level storage backend
///
/// Snapshot reads see, per id, the latest version at or before `snapshot`.
/// The backend never interprets fragment payloads except for `find`, which
/// compares the truncated value of offset-0 fragments and may return false
/// positives.
pub trait Persistence {
    /// Transaction type of this backend
    type Tx: Transaction;

    /// Open a transaction
    fn create_transaction(&self, read_only: bool) -> Result<Self::Tx>;

    /// Store fragments, replacing every document version they belong to
    fn write<I>(&self, tx: &Self::Tx, fragments: I) -> Result<()>
    where
        I: IntoIterator<Item = Fragment>;

    /// Fragments of the version of `id` visible at `snapshot`
    fn read(
        &self,
        tx: &Self::Tx,
        snapshot: Timestamp,
        namespace: &str,
        entity: &str,
        id: &str,
    ) -> Result<FragmentStream<'_>>;

    /// Visible versions of the ids selected by `range`
    fn read_range(
        &self,
        tx: &Self::Tx,
        snapshot: Timestamp,
        namespace: &str,
        entity: &str,
        range: &Range<String>,
    ) -> Result<FragmentStream<'_>>;

    /// Versions of one id selected by `range`, tombstones included
    fn read_versions(
        &self,
        tx: &Self::Tx,
        namespace: &str,
        entity: &str,
        id: &str,
        range: &Range<Timestamp>,
    ) -> Result<FragmentStream<'_>>;

    /// Visible documents with a leaf at `path` whose first chunk matches `value`
    ///
    /// `path` may contain `[]` to match any array element. An empty `value`
    /// also matches payload-less leaves such as null.
    #[allow(clippy::too_many_arguments)]
    fn find(
        &self,
        tx: &Self::Tx,
        snapshot: Timestamp,
        namespace: &str,
        entity: &str,
        path: &str,
        value: &[u8],
        range: &Range<String>,
    ) -> Result<FragmentStream<'_>>;

    /// Remove one version
    fn delete(
        &self,
        tx: &Self::Tx,
        namespace: &str,
        entity: &str,
        id: &str,
        version: Timestamp,
        policy: DeletePolicy,
    ) -> Result<()>;

    /// Remove every version of `id`
    fn delete_all_versions(
        &self,
        tx: &Self::Tx,
        namespace: &str,
        entity: &str,
        id: &str,
        policy: DeletePolicy,
    ) -> Result<()>;

    /// Store a tombstone as version `version`
    fn mark_deleted(
        &self,
        tx: &Self::Tx,
        namespace: &str,
        entity: &str,
        id: &str,
        version: Timestamp,
        policy: DeletePolicy,
    ) -> Result<()>;
}
