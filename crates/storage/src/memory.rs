//! MemoryPersistence: in-memory reference backend
//!
//! Stores every document version as its sorted fragment list:
//! - `BTreeMap<DocumentKey, Vec<Fragment>>` ordered by namespace, entity,
//!   id, then version
//! - `parking_lot::RwLock` for thread-safe access
//! - per-transaction undo log so `cancel` restores what the transaction
//!   replaced or removed
//!
//! # Design Notes
//!
//! - **Writes apply immediately**: other transactions see them before commit
//! - **Reads select keys under the read lock**: the returned stream copies
//!   one version's fragments at a time and never holds the lock while the
//!   consumer runs
//! - **Delete policies are not enforced**: links are not tracked, the policy
//!   is only counted in the transaction statistics

use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};

use ldstore_core::path::index_unaware_path;
use ldstore_core::{
    DeletePolicy, DocumentKey, Fragment, PersistenceError, Range, Result, StreamItem, Timestamp,
    TRUNCATED_VALUE_LENGTH,
};

use crate::traits::{FragmentStream, Persistence, Transaction, TransactionStatistics};

type VersionMap = BTreeMap<DocumentKey, Vec<Fragment>>;

/// Counter names recorded by `MemoryPersistence`
pub mod counters {
    /// Fragments stored
    pub const FRAGMENTS_WRITTEN: &str = "fragments.written";
    /// Document versions stored
    pub const DOCUMENTS_WRITTEN: &str = "documents.written";
    /// Fragments returned by reads
    pub const FRAGMENTS_READ: &str = "fragments.read";
    /// Document versions removed
    pub const DOCUMENTS_DELETED: &str = "documents.deleted";
    /// Tombstones stored
    pub const DOCUMENTS_MARKED_DELETED: &str = "documents.marked_deleted";
    /// Prefix of the per-policy delete counters
    pub const DELETE_POLICY_PREFIX: &str = "delete_policy.";
}

/// In-memory fragment store
///
/// Cloning is cheap and yields a handle on the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryPersistence {
    documents: Arc<RwLock<VersionMap>>,
    next_transaction: Arc<AtomicU64>,
}

#[derive(Debug)]
struct UndoEntry {
    key: DocumentKey,
    previous: Option<Vec<Fragment>>,
}

/// Transaction of a `MemoryPersistence`
#[derive(Debug)]
pub struct MemoryTransaction {
    id: u64,
    read_only: bool,
    store: Arc<RwLock<VersionMap>>,
    statistics: Mutex<TransactionStatistics>,
    undo: Mutex<Vec<UndoEntry>>,
}

impl MemoryTransaction {
    /// Transaction id, unique per backend
    pub fn id(&self) -> u64 {
        self.id
    }

    fn count(&self, name: &str, increment: u64) {
        self.statistics.lock().add(name, increment);
    }

    fn record_policy(&self, policy: DeletePolicy) {
        let name = format!("{}{}", counters::DELETE_POLICY_PREFIX, policy.as_str());
        self.count(&name, 1);
    }
}

impl Transaction for MemoryTransaction {
    fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn statistics(&self) -> TransactionStatistics {
        self.statistics.lock().clone()
    }

    fn commit(self) -> Result<TransactionStatistics> {
        let statistics = self.statistics.into_inner();
        debug!(target: "ldstore::storage", tx = self.id, %statistics, "transaction committed");
        Ok(statistics)
    }

    fn cancel(self) -> Result<TransactionStatistics> {
        let undo = self.undo.into_inner();
        let reverted = undo.len();
        {
            let mut documents = self.store.write();
            for entry in undo.into_iter().rev() {
                match entry.previous {
                    Some(fragments) => {
                        documents.insert(entry.key, fragments);
                    }
                    None => {
                        documents.remove(&entry.key);
                    }
                }
            }
        }
        let statistics = self.statistics.into_inner();
        debug!(target: "ldstore::storage", tx = self.id, reverted, "transaction cancelled");
        Ok(statistics)
    }
}

impl MemoryPersistence {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored document versions, tombstones included
    pub fn version_count(&self) -> usize {
        self.documents.read().len()
    }

    /// Number of stored fragments
    pub fn fragment_count(&self) -> usize {
        self.documents.read().values().map(Vec::len).sum()
    }

    fn check_owner(&self, tx: &MemoryTransaction) -> Result<()> {
        if Arc::ptr_eq(&self.documents, &tx.store) {
            Ok(())
        } else {
            Err(PersistenceError::storage(format!(
                "transaction {} belongs to another persistence",
                tx.id
            )))
        }
    }

    fn check_writable(&self, tx: &MemoryTransaction) -> Result<()> {
        self.check_owner(tx)?;
        if tx.read_only {
            return Err(PersistenceError::storage(format!(
                "transaction {} is read-only",
                tx.id
            )));
        }
        Ok(())
    }

    /// Replace (or remove, with `None`) one version and log the undo entry
    fn replace_version(
        &self,
        tx: &MemoryTransaction,
        documents: &mut VersionMap,
        key: DocumentKey,
        fragments: Option<Vec<Fragment>>,
    ) {
        let previous = match fragments {
            Some(fragments) => documents.insert(key.clone(), fragments),
            None => documents.remove(&key),
        };
        tx.undo.lock().push(UndoEntry { key, previous });
    }

    /// Stream the fragments of `keys`, then the control item
    ///
    /// Only the keys are collected up front. Each version's fragments are
    /// copied under a short read lock when the consumer reaches it, so a
    /// version removed in the meantime yields nothing.
    fn stream(
        &self,
        tx: &MemoryTransaction,
        documents: &VersionMap,
        keys: &[&DocumentKey],
        limited: bool,
    ) -> FragmentStream<'static> {
        let fragment_count: usize = keys
            .iter()
            .filter_map(|key| documents.get(*key))
            .map(Vec::len)
            .sum();
        tx.count(counters::FRAGMENTS_READ, fragment_count as u64);
        trace!(
            target: "ldstore::storage",
            documents = keys.len(),
            fragments = fragment_count,
            limited,
            "fragments read"
        );

        let store = Arc::clone(&self.documents);
        let keys: Vec<DocumentKey> = keys.iter().map(|key| (*key).clone()).collect();
        let data = keys.into_iter().flat_map(move |key| {
            let fragments = store.read().get(&key).cloned().unwrap_or_default();
            fragments
                .into_iter()
                .map(|fragment| Ok(StreamItem::Data(fragment)))
        });
        Box::new(data.chain(std::iter::once(Ok(StreamItem::done(limited)))))
    }
}

fn version_bounds(namespace: &str, entity: &str, id: &str) -> (DocumentKey, DocumentKey) {
    let lower = DocumentKey::new(namespace, entity, id, Timestamp::EPOCH);
    let upper = lower.with_version(Timestamp::MAX);
    (lower, upper)
}

/// Latest version at or before `snapshot` of every id in the entity, in id order
fn visible_versions<'m>(
    documents: &'m VersionMap,
    namespace: &str,
    entity: &str,
    snapshot: Timestamp,
) -> Vec<&'m DocumentKey> {
    let start = DocumentKey::new(namespace, entity, "", Timestamp::EPOCH);
    let mut visible: Vec<&DocumentKey> = Vec::new();
    let in_entity = documents
        .range(start..)
        .map(|(key, _)| key)
        .take_while(|key| key.namespace() == namespace && key.entity() == entity);
    for key in in_entity {
        if key.version() > snapshot {
            continue;
        }
        if let Some(last) = visible.last_mut() {
            if last.id() == key.id() {
                *last = key;
                continue;
            }
        }
        visible.push(key);
    }
    visible
}

/// Exclusive after/before bounds of `range`
fn in_range<T, Q>(range: &Range<T>, value: &Q) -> bool
where
    T: Borrow<Q>,
    Q: Ord + ?Sized,
{
    range.after().map_or(true, |after| value > after.borrow())
        && range.before().map_or(true, |before| value < before.borrow())
}

/// Order for the range direction and cut at its limit
fn page<'m, T>(mut keys: Vec<&'m DocumentKey>, range: &Range<T>) -> (Vec<&'m DocumentKey>, bool) {
    if range.is_backward() {
        keys.reverse();
    }
    let mut limited = false;
    if let Some(limit) = range.limit() {
        let limit = limit as usize;
        if keys.len() > limit {
            keys.truncate(limit);
            limited = true;
        }
    }
    (keys, limited)
}

fn truncated(value: &[u8]) -> &[u8] {
    &value[..value.len().min(TRUNCATED_VALUE_LENGTH)]
}

impl Persistence for MemoryPersistence {
    type Tx = MemoryTransaction;

    fn create_transaction(&self, read_only: bool) -> Result<MemoryTransaction> {
        let id = self.next_transaction.fetch_add(1, Ordering::SeqCst) + 1;
        trace!(target: "ldstore::storage", tx = id, read_only, "transaction created");
        Ok(MemoryTransaction {
            id,
            read_only,
            store: Arc::clone(&self.documents),
            statistics: Mutex::new(TransactionStatistics::new()),
            undo: Mutex::new(Vec::new()),
        })
    }

    fn write<I>(&self, tx: &MemoryTransaction, fragments: I) -> Result<()>
    where
        I: IntoIterator<Item = Fragment>,
    {
        self.check_writable(tx)?;

        let mut grouped: BTreeMap<DocumentKey, Vec<Fragment>> = BTreeMap::new();
        for fragment in fragments {
            grouped
                .entry(fragment.document_key().clone())
                .or_default()
                .push(fragment);
        }

        let mut documents = self.documents.write();
        for (key, mut fragments) in grouped {
            fragments.sort();
            debug!(
                target: "ldstore::storage",
                tx = tx.id,
                key = %key,
                fragments = fragments.len(),
                "document version written"
            );
            tx.count(counters::FRAGMENTS_WRITTEN, fragments.len() as u64);
            tx.count(counters::DOCUMENTS_WRITTEN, 1);
            self.replace_version(tx, &mut documents, key, Some(fragments));
        }
        Ok(())
    }

    fn read(
        &self,
        tx: &MemoryTransaction,
        snapshot: Timestamp,
        namespace: &str,
        entity: &str,
        id: &str,
    ) -> Result<FragmentStream<'_>> {
        self.check_owner(tx)?;
        let (lower, upper) = version_bounds(namespace, entity, id);
        let documents = self.documents.read();
        let visible = documents
            .range(lower..=upper)
            .rev()
            .map(|(key, _)| key)
            .find(|key| key.version() <= snapshot);
        let keys: Vec<&DocumentKey> = visible.into_iter().collect();
        Ok(self.stream(tx, &documents, &keys, false))
    }

    fn read_range(
        &self,
        tx: &MemoryTransaction,
        snapshot: Timestamp,
        namespace: &str,
        entity: &str,
        range: &Range<String>,
    ) -> Result<FragmentStream<'_>> {
        self.check_owner(tx)?;
        let documents = self.documents.read();
        let selected: Vec<&DocumentKey> = visible_versions(&documents, namespace, entity, snapshot)
            .into_iter()
            .filter(|key| in_range(range, key.id()))
            .collect();
        let (keys, limited) = page(selected, range);
        Ok(self.stream(tx, &documents, &keys, limited))
    }

    fn read_versions(
        &self,
        tx: &MemoryTransaction,
        namespace: &str,
        entity: &str,
        id: &str,
        range: &Range<Timestamp>,
    ) -> Result<FragmentStream<'_>> {
        self.check_owner(tx)?;
        let (lower, upper) = version_bounds(namespace, entity, id);
        let documents = self.documents.read();
        let selected: Vec<&DocumentKey> = documents
            .range(lower..=upper)
            .map(|(key, _)| key)
            .filter(|key| in_range(range, &key.version()))
            .collect();
        let (keys, limited) = page(selected, range);
        Ok(self.stream(tx, &documents, &keys, limited))
    }

    fn find(
        &self,
        tx: &MemoryTransaction,
        snapshot: Timestamp,
        namespace: &str,
        entity: &str,
        path: &str,
        value: &[u8],
        range: &Range<String>,
    ) -> Result<FragmentStream<'_>> {
        self.check_owner(tx)?;
        let (pattern, _) = index_unaware_path(path)?;
        let wanted = truncated(value);

        let documents = self.documents.read();
        let mut selected = Vec::new();
        for key in visible_versions(&documents, namespace, entity, snapshot) {
            if !in_range(range, key.id()) {
                continue;
            }
            let Some(fragments) = documents.get(key) else {
                continue;
            };
            let mut matched = false;
            for fragment in fragments {
                if fragment.is_delete_marker() {
                    matched = false;
                    break;
                }
                if matched || fragment.offset() != 0 || fragment.truncated_value() != wanted {
                    continue;
                }
                let (leaf_pattern, _) = index_unaware_path(fragment.path())?;
                matched = leaf_pattern == pattern;
            }
            if matched {
                selected.push(key);
            }
        }
        let (keys, limited) = page(selected, range);
        Ok(self.stream(tx, &documents, &keys, limited))
    }

    fn delete(
        &self,
        tx: &MemoryTransaction,
        namespace: &str,
        entity: &str,
        id: &str,
        version: Timestamp,
        policy: DeletePolicy,
    ) -> Result<()> {
        self.check_writable(tx)?;
        let key = DocumentKey::new(namespace, entity, id, version);
        let mut documents = self.documents.write();
        tx.record_policy(policy);
        if documents.contains_key(&key) {
            debug!(target: "ldstore::storage", tx = tx.id, key = %key, policy = policy.as_str(), "document version deleted");
            tx.count(counters::DOCUMENTS_DELETED, 1);
            self.replace_version(tx, &mut documents, key, None);
        }
        Ok(())
    }

    fn delete_all_versions(
        &self,
        tx: &MemoryTransaction,
        namespace: &str,
        entity: &str,
        id: &str,
        policy: DeletePolicy,
    ) -> Result<()> {
        self.check_writable(tx)?;
        let (lower, upper) = version_bounds(namespace, entity, id);
        let mut documents = self.documents.write();
        let keys: Vec<DocumentKey> = documents
            .range(lower..=upper)
            .map(|(key, _)| key.clone())
            .collect();
        tx.record_policy(policy);
        debug!(
            target: "ldstore::storage",
            tx = tx.id,
            namespace,
            entity,
            id,
            versions = keys.len(),
            policy = policy.as_str(),
            "all document versions deleted"
        );
        tx.count(counters::DOCUMENTS_DELETED, keys.len() as u64);
        for key in keys {
            self.replace_version(tx, &mut documents, key, None);
        }
        Ok(())
    }

    fn mark_deleted(
        &self,
        tx: &MemoryTransaction,
        namespace: &str,
        entity: &str,
        id: &str,
        version: Timestamp,
        policy: DeletePolicy,
    ) -> Result<()> {
        self.check_writable(tx)?;
        let key = DocumentKey::new(namespace, entity, id, version);
        let marker = vec![Fragment::delete_marker(key.clone())];
        let mut documents = self.documents.write();
        tx.record_policy(policy);
        tx.count(counters::DOCUMENTS_MARKED_DELETED, 1);
        debug!(target: "ldstore::storage", tx = tx.id, key = %key, "document version marked deleted");
        self.replace_version(tx, &mut documents, key, Some(marker));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ldstore_core::FragmentType;

    fn key(id: &str, secs: u64) -> DocumentKey {
        DocumentKey::new("ns", "Person", id, Timestamp::from_secs(secs))
    }

    fn name_fragment(id: &str, secs: u64, name: &str) -> Fragment {
        Fragment::new(
            key(id, secs),
            "$.name",
            FragmentType::String,
            0,
            name.as_bytes().to_vec(),
        )
    }

    fn collect(stream: FragmentStream<'_>) -> (Vec<Fragment>, Option<bool>) {
        let mut fragments = Vec::new();
        let mut limited = None;
        for item in stream {
            match item.unwrap() {
                StreamItem::Data(fragment) => fragments.push(fragment),
                StreamItem::Control { limited: flag } => limited = Some(flag),
            }
        }
        (fragments, limited)
    }

    fn ids(fragments: &[Fragment]) -> Vec<String> {
        fragments
            .iter()
            .map(|f| f.document_key().id().to_string())
            .collect()
    }

    fn seeded() -> MemoryPersistence {
        let store = MemoryPersistence::new();
        let tx = store.create_transaction(false).unwrap();
        store
            .write(
                &tx,
                vec![
                    name_fragment("a", 10, "Ola"),
                    name_fragment("a", 20, "Ola Nordmann"),
                    name_fragment("b", 10, "Kari"),
                    name_fragment("c", 30, "Per"),
                ],
            )
            .unwrap();
        tx.commit().unwrap();
        store
    }

    // =========================================================================
    // Reads
    // =========================================================================

    #[test]
    fn test_read_latest_visible_version() {
        let store = seeded();
        let tx = store.create_transaction(true).unwrap();

        let (fragments, limited) =
            collect(store.read(&tx, Timestamp::from_secs(15), "ns", "Person", "a").unwrap());
        assert_eq!(fragments, vec![name_fragment("a", 10, "Ola")]);
        assert_eq!(limited, Some(false));

        let (fragments, _) =
            collect(store.read(&tx, Timestamp::from_secs(25), "ns", "Person", "a").unwrap());
        assert_eq!(fragments, vec![name_fragment("a", 20, "Ola Nordmann")]);

        let (fragments, _) =
            collect(store.read(&tx, Timestamp::from_secs(5), "ns", "Person", "a").unwrap());
        assert!(fragments.is_empty());
    }

    #[test]
    fn test_read_range_snapshot_and_direction() {
        let store = seeded();
        let tx = store.create_transaction(true).unwrap();

        let (fragments, _) = collect(
            store
                .read_range(&tx, Timestamp::from_secs(20), "ns", "Person", &Range::unbounded())
                .unwrap(),
        );
        assert_eq!(ids(&fragments), vec!["a", "b"]);

        let (fragments, _) = collect(
            store
                .read_range(&tx, Timestamp::MAX, "ns", "Person", &Range::last(5))
                .unwrap(),
        );
        assert_eq!(ids(&fragments), vec!["c", "b", "a"]);
    }

    #[test]
    fn test_read_range_limit_sets_control_flag() {
        let store = seeded();
        let tx = store.create_transaction(true).unwrap();
        let (fragments, limited) = collect(
            store
                .read_range(&tx, Timestamp::MAX, "ns", "Person", &Range::first(2))
                .unwrap(),
        );
        assert_eq!(ids(&fragments), vec!["a", "b"]);
        assert_eq!(limited, Some(true));
    }

    #[test]
    fn test_read_range_copies_fragments_on_demand() {
        let store = seeded();
        let tx = store.create_transaction(false).unwrap();
        let stream = store
            .read_range(&tx, Timestamp::MAX, "ns", "Person", &Range::unbounded())
            .unwrap();

        // the stream holds no lock and no fragments until it is pulled
        store
            .delete_all_versions(&tx, "ns", "Person", "b", DeletePolicy::default())
            .unwrap();
        let (fragments, limited) = collect(stream);
        assert_eq!(ids(&fragments), vec!["a", "c"]);
        assert_eq!(limited, Some(false));
    }

    #[test]
    fn test_read_range_other_entity_is_empty() {
        let store = seeded();
        let tx = store.create_transaction(true).unwrap();
        let (fragments, _) = collect(
            store
                .read_range(&tx, Timestamp::MAX, "ns", "Address", &Range::unbounded())
                .unwrap(),
        );
        assert!(fragments.is_empty());
    }

    #[test]
    fn test_read_versions() {
        let store = seeded();
        let tx = store.create_transaction(true).unwrap();
        let (fragments, _) = collect(
            store
                .read_versions(&tx, "ns", "Person", "a", &Range::unbounded())
                .unwrap(),
        );
        let versions: Vec<u64> = fragments
            .iter()
            .map(|f| f.document_key().version().as_secs())
            .collect();
        assert_eq!(versions, vec![10, 20]);

        let (fragments, _) = collect(
            store
                .read_versions(&tx, "ns", "Person", "a", &Range::last(1))
                .unwrap(),
        );
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].document_key().version(), Timestamp::from_secs(20));
    }

    #[test]
    fn test_find_by_value() {
        let store = seeded();
        let tx = store.create_transaction(true).unwrap();
        let (fragments, _) = collect(
            store
                .find(&tx, Timestamp::MAX, "ns", "Person", "$.name", b"Kari", &Range::unbounded())
                .unwrap(),
        );
        assert_eq!(ids(&fragments), vec!["b"]);
    }

    // =========================================================================
    // Writes and transactions
    // =========================================================================

    #[test]
    fn test_write_overwrites_version() {
        let store = seeded();
        let tx = store.create_transaction(false).unwrap();
        store.write(&tx, vec![name_fragment("b", 10, "Kari Nordmann")]).unwrap();
        let (fragments, _) =
            collect(store.read(&tx, Timestamp::MAX, "ns", "Person", "b").unwrap());
        assert_eq!(fragments, vec![name_fragment("b", 10, "Kari Nordmann")]);
        assert_eq!(store.version_count(), 4);
    }

    #[test]
    fn test_read_only_rejects_writes() {
        let store = seeded();
        let tx = store.create_transaction(true).unwrap();
        assert!(tx.is_read_only());
        let err = store.write(&tx, vec![name_fragment("d", 1, "x")]).unwrap_err();
        assert!(err.to_string().contains("read-only"));
    }

    #[test]
    fn test_foreign_transaction_rejected() {
        let store = seeded();
        let other = MemoryPersistence::new();
        let tx = other.create_transaction(true).unwrap();
        assert!(store
            .read(&tx, Timestamp::MAX, "ns", "Person", "a")
            .is_err());
    }

    #[test]
    fn test_cancel_restores_previous_state() {
        let store = seeded();
        let before = store.fragment_count();
        let tx = store.create_transaction(false).unwrap();
        store.write(&tx, vec![name_fragment("a", 10, "Changed")]).unwrap();
        store
            .delete_all_versions(&tx, "ns", "Person", "b", DeletePolicy::default())
            .unwrap();
        store
            .mark_deleted(&tx, "ns", "Person", "c", Timestamp::from_secs(40), DeletePolicy::default())
            .unwrap();
        tx.cancel().unwrap();

        assert_eq!(store.fragment_count(), before);
        let tx = store.create_transaction(true).unwrap();
        let (fragments, _) =
            collect(store.read(&tx, Timestamp::from_secs(10), "ns", "Person", "a").unwrap());
        assert_eq!(fragments, vec![name_fragment("a", 10, "Ola")]);
        let (fragments, _) =
            collect(store.read(&tx, Timestamp::MAX, "ns", "Person", "c").unwrap());
        assert_eq!(fragments, vec![name_fragment("c", 30, "Per")]);
    }

    #[test]
    fn test_statistics_record_policy() {
        let store = seeded();
        let tx = store.create_transaction(false).unwrap();
        store
            .delete(&tx, "ns", "Person", "a", Timestamp::from_secs(10), DeletePolicy::CascadeDeleteAll)
            .unwrap();
        let stats = tx.commit().unwrap();
        assert_eq!(stats.get(counters::DOCUMENTS_DELETED), 1);
        assert_eq!(stats.get("delete_policy.cascade_delete_all"), 1);
    }

    #[test]
    fn test_mark_deleted_stores_tombstone() {
        let store = seeded();
        let tx = store.create_transaction(false).unwrap();
        store
            .mark_deleted(&tx, "ns", "Person", "b", Timestamp::from_secs(50), DeletePolicy::default())
            .unwrap();
        let (fragments, _) =
            collect(store.read(&tx, Timestamp::MAX, "ns", "Person", "b").unwrap());
        assert_eq!(fragments.len(), 1);
        assert!(fragments[0].is_delete_marker());
    }
}
