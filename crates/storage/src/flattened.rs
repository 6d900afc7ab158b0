//! Buffered reads of flattened documents
//!
//! `FlattenedPersistence` pushes backend streams through a
//! `DocumentAssembler` and returns whole pages. The page size is the range
//! limit, or the configured default read limit when the range has none.

use ldstore_codec::Document;
use ldstore_core::{PersistenceConfig, Range, Result, Timestamp};
use ldstore_streaming::{assemble, AssembledDocuments, IteratorPublisher};
use tracing::debug;

use crate::traits::{FragmentStream, Persistence};

/// Flattened-document layer over a fragment backend
#[derive(Debug, Clone)]
pub struct FlattenedPersistence<P> {
    persistence: P,
    config: PersistenceConfig,
}

impl<P: Persistence> FlattenedPersistence<P> {
    /// Wrap `persistence` with the default configuration
    pub fn new(persistence: P) -> Self {
        Self::with_config(persistence, PersistenceConfig::default())
    }

    /// Wrap `persistence`
    pub fn with_config(persistence: P, config: PersistenceConfig) -> Self {
        Self {
            persistence,
            config,
        }
    }

    /// Underlying backend
    pub fn persistence(&self) -> &P {
        &self.persistence
    }

    /// Active configuration
    pub fn config(&self) -> &PersistenceConfig {
        &self.config
    }

    /// Open a backend transaction
    pub fn create_transaction(&self, read_only: bool) -> Result<P::Tx> {
        self.persistence.create_transaction(read_only)
    }

    /// Store all fragments of `document`, replacing that version
    pub fn create_or_overwrite(&self, tx: &P::Tx, document: &Document) -> Result<()> {
        debug!(
            target: "ldstore::flattened",
            key = %document.key(),
            leaves = document.len(),
            deleted = document.is_deleted(),
            "writing flattened document"
        );
        self.persistence.write(tx, document.fragments())
    }

    /// The version of `id` visible at `snapshot`, tombstone included
    pub fn read(
        &self,
        tx: &P::Tx,
        snapshot: Timestamp,
        namespace: &str,
        entity: &str,
        id: &str,
    ) -> Result<AssembledDocuments> {
        let stream = self.persistence.read(tx, snapshot, namespace, entity, id)?;
        self.buffer(stream, 1)
    }

    /// One page of versions of `id`
    pub fn read_versions(
        &self,
        tx: &P::Tx,
        namespace: &str,
        entity: &str,
        id: &str,
        range: &Range<Timestamp>,
    ) -> Result<AssembledDocuments> {
        let stream = self
            .persistence
            .read_versions(tx, namespace, entity, id, range)?;
        self.buffer(stream, self.page_size(range.limit()))
    }

    /// One page of visible documents of an entity
    pub fn read_all(
        &self,
        tx: &P::Tx,
        snapshot: Timestamp,
        namespace: &str,
        entity: &str,
        range: &Range<String>,
    ) -> Result<AssembledDocuments> {
        let stream = self
            .persistence
            .read_range(tx, snapshot, namespace, entity, range)?;
        self.buffer(stream, self.page_size(range.limit()))
    }

    fn page_size(&self, limit: Option<u32>) -> usize {
        limit.unwrap_or(self.config.default_read_limit) as usize
    }

    fn buffer(&self, stream: FragmentStream<'_>, limit: usize) -> Result<AssembledDocuments> {
        let assembled = assemble(
            IteratorPublisher::new(stream),
            self.config.fragment_capacity,
            limit,
        )?;
        debug!(
            target: "ldstore::flattened",
            documents = assembled.documents.len(),
            limited = assembled.limited,
            "buffered read complete"
        );
        Ok(assembled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryPersistence;
    use crate::traits::Transaction;
    use ldstore_codec::flatten;
    use ldstore_core::DocumentKey;
    use serde_json::json;

    fn layer() -> FlattenedPersistence<MemoryPersistence> {
        FlattenedPersistence::with_config(MemoryPersistence::new(), PersistenceConfig::for_testing())
    }

    fn person(id: &str, secs: u64, name: &str) -> Document {
        let key = DocumentKey::new("ns", "Person", id, Timestamp::from_secs(secs));
        flatten(&json!({"name": name, "tags": ["a", "b"]}), key, 8).unwrap()
    }

    #[test]
    fn test_write_and_read_back() {
        let layer = layer();
        let tx = layer.create_transaction(false).unwrap();
        let doc = person("1", 10, "Ola Nordmann, a name longer than the capacity");
        layer.create_or_overwrite(&tx, &doc).unwrap();

        let result = layer.read(&tx, Timestamp::MAX, "ns", "Person", "1").unwrap();
        assert_eq!(result.documents, vec![doc]);
        assert!(!result.limited);
        tx.commit().unwrap();
    }

    #[test]
    fn test_read_missing_is_empty() {
        let layer = layer();
        let tx = layer.create_transaction(true).unwrap();
        let result = layer.read(&tx, Timestamp::MAX, "ns", "Person", "nope").unwrap();
        assert!(result.first().is_none());
    }

    #[test]
    fn test_read_all_uses_default_limit() {
        let layer = layer();
        let tx = layer.create_transaction(false).unwrap();
        for i in 0..12 {
            layer
                .create_or_overwrite(&tx, &person(&format!("id{:02}", i), 1, "x"))
                .unwrap();
        }
        let result = layer
            .read_all(&tx, Timestamp::MAX, "ns", "Person", &Range::unbounded())
            .unwrap();
        assert_eq!(result.documents.len(), 10);
        assert!(result.limited);

        let result = layer
            .read_all(&tx, Timestamp::MAX, "ns", "Person", &Range::first(3))
            .unwrap();
        let ids: Vec<&str> = result.documents.iter().map(|d| d.key().id()).collect();
        assert_eq!(ids, vec!["id00", "id01", "id02"]);
        assert!(result.limited);
    }

    #[test]
    fn test_read_versions_backward() {
        let layer = layer();
        let tx = layer.create_transaction(false).unwrap();
        for secs in [10, 20, 30] {
            layer.create_or_overwrite(&tx, &person("1", secs, "v")).unwrap();
        }
        let result = layer
            .read_versions(&tx, "ns", "Person", "1", &Range::last(2))
            .unwrap();
        let versions: Vec<u64> = result
            .documents
            .iter()
            .map(|d| d.key().version().as_secs())
            .collect();
        assert_eq!(versions, vec![30, 20]);
        assert!(result.limited);
    }
}
