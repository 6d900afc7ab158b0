//! JSON document persistence
//!
//! `JsonPersistence` stores `JsonDocument`s through a fragment backend and
//! reads them back as lazy streams. Multi-document reads ask the backend
//! for the range bounds only, then apply the page limit to the assembled
//! documents, so tombstones never use up a slot of an id page.
//!
//! - id reads (`read_documents`, `find_documents`) drop tombstones
//! - version reads (`read_document_versions`) keep them as deleted documents

use ldstore_codec::{Document, JsonDocument, LeafValue, Utf8Chunks};
use ldstore_core::path::index_unaware_path;
use ldstore_core::{DeletePolicy, FragmentType, PersistenceConfig, Range, Result, Timestamp};
use ldstore_streaming::{assemble_documents, PaginateExt};
use tracing::{debug, trace};

use crate::traits::{FragmentStream, Persistence};

/// Lazy stream of JSON documents
pub type JsonDocumentStream<'a> = Box<dyn Iterator<Item = Result<JsonDocument>> + 'a>;

/// JSON layer over a fragment backend
#[derive(Debug, Clone)]
pub struct JsonPersistence<P> {
    persistence: P,
    capacity: u32,
}

impl<P: Persistence> JsonPersistence<P> {
    /// Wrap `persistence`, chunking values into `capacity`-byte fragments
    pub fn new(persistence: P, capacity: u32) -> Self {
        Self {
            persistence,
            capacity: capacity.max(1),
        }
    }

    /// Wrap `persistence` using the configured fragment capacity
    pub fn from_config(persistence: P, config: &PersistenceConfig) -> Self {
        Self::new(persistence, config.fragment_capacity)
    }

    /// Underlying backend
    pub fn persistence(&self) -> &P {
        &self.persistence
    }

    /// Fragment capacity
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Open a backend transaction
    pub fn create_transaction(&self, read_only: bool) -> Result<P::Tx> {
        self.persistence.create_transaction(read_only)
    }

    /// Flatten and store `document`, replacing that version
    ///
    /// A deleted `JsonDocument` is stored as a tombstone.
    pub fn create_or_overwrite(&self, tx: &P::Tx, document: &JsonDocument) -> Result<()> {
        let flattened = document.to_document(self.capacity)?;
        debug!(
            target: "ldstore::json",
            key = %document.key(),
            leaves = flattened.len(),
            "writing json document"
        );
        self.persistence.write(tx, flattened.fragments())
    }

    /// The version of `id` visible at `snapshot`
    ///
    /// `None` when there is no such version or it is a tombstone.
    pub fn read_document(
        &self,
        tx: &P::Tx,
        snapshot: Timestamp,
        namespace: &str,
        entity: &str,
        id: &str,
    ) -> Result<Option<JsonDocument>> {
        let stream = self.persistence.read(tx, snapshot, namespace, entity, id)?;
        let document = live(assemble_documents(stream, self.capacity))
            .next()
            .transpose()?;
        trace!(
            target: "ldstore::json",
            namespace,
            entity,
            id,
            found = document.is_some(),
            "read document"
        );
        document.as_ref().map(JsonDocument::from_document).transpose()
    }

    /// Page of visible documents of an entity, by id
    pub fn read_documents(
        &self,
        tx: &P::Tx,
        snapshot: Timestamp,
        namespace: &str,
        entity: &str,
        range: &Range<String>,
    ) -> Result<JsonDocumentStream<'_>> {
        debug!(target: "ldstore::json", namespace, entity, %range, "read documents");
        let stream = self.persistence.read_range(
            tx,
            snapshot,
            namespace,
            entity,
            &range.clone().unlimited(),
        )?;
        Ok(self.page_by_id(live(assemble_documents(stream, self.capacity)), range))
    }

    /// Page of versions of `id`, tombstones included
    pub fn read_document_versions(
        &self,
        tx: &P::Tx,
        namespace: &str,
        entity: &str,
        id: &str,
        range: &Range<Timestamp>,
    ) -> Result<JsonDocumentStream<'_>> {
        debug!(target: "ldstore::json", namespace, entity, id, %range, "read document versions");
        let stream = self.persistence.read_versions(
            tx,
            namespace,
            entity,
            id,
            &range.clone().unlimited(),
        )?;
        let page = assemble_documents(stream, self.capacity)
            .try_paginate(range.clone(), |document: &Document| document.key().version())
            .map(|document| JsonDocument::from_document(&document?));
        Ok(Box::new(page))
    }

    /// Page of visible documents with a leaf at `path` equal to `value`
    ///
    /// `Some(text)` matches a string leaf, `None` a null leaf. `path` may
    /// use `[]` to match any array element.
    #[allow(clippy::too_many_arguments)]
    pub fn find_documents(
        &self,
        tx: &P::Tx,
        snapshot: Timestamp,
        namespace: &str,
        entity: &str,
        path: &str,
        value: Option<&str>,
        range: &Range<String>,
    ) -> Result<JsonDocumentStream<'_>> {
        debug!(target: "ldstore::json", namespace, entity, path, %range, "find documents");
        let (pattern, _) = index_unaware_path(path)?;
        let first_chunk = value
            .and_then(|text| Utf8Chunks::new(text, self.capacity as usize).next())
            .map_or(&[][..], |(_, bytes)| bytes);
        let stream: FragmentStream<'_> = self.persistence.find(
            tx,
            snapshot,
            namespace,
            entity,
            path,
            first_chunk,
            &range.clone().unlimited(),
        )?;

        let wanted = value.map(str::to_string);
        // the backend only compares the first chunk, so re-check the whole value
        let matching = live(assemble_documents(stream, self.capacity)).filter(move |document| {
            document
                .as_ref()
                .map_or(true, |document| has_leaf(document, &pattern, wanted.as_deref()))
        });
        Ok(self.page_by_id(matching, range))
    }

    /// True if a visible document sorts after `id`
    pub fn has_next(
        &self,
        tx: &P::Tx,
        snapshot: Timestamp,
        namespace: &str,
        entity: &str,
        id: &str,
    ) -> Result<bool> {
        let range = Range::first_after(1, id.to_string());
        let mut documents = self.read_documents(tx, snapshot, namespace, entity, &range)?;
        Ok(documents.next().transpose()?.is_some())
    }

    /// True if a visible document sorts before `id`
    pub fn has_previous(
        &self,
        tx: &P::Tx,
        snapshot: Timestamp,
        namespace: &str,
        entity: &str,
        id: &str,
    ) -> Result<bool> {
        let range = Range::last_before(1, id.to_string());
        let mut documents = self.read_documents(tx, snapshot, namespace, entity, &range)?;
        Ok(documents.next().transpose()?.is_some())
    }

    /// Remove one version
    pub fn delete_document(
        &self,
        tx: &P::Tx,
        namespace: &str,
        entity: &str,
        id: &str,
        version: Timestamp,
        policy: DeletePolicy,
    ) -> Result<()> {
        self.persistence
            .delete(tx, namespace, entity, id, version, policy)
    }

    /// Remove every version of `id`
    pub fn delete_all_document_versions(
        &self,
        tx: &P::Tx,
        namespace: &str,
        entity: &str,
        id: &str,
        policy: DeletePolicy,
    ) -> Result<()> {
        self.persistence
            .delete_all_versions(tx, namespace, entity, id, policy)
    }

    /// Store a tombstone as version `version`
    pub fn mark_document_deleted(
        &self,
        tx: &P::Tx,
        namespace: &str,
        entity: &str,
        id: &str,
        version: Timestamp,
        policy: DeletePolicy,
    ) -> Result<()> {
        self.persistence
            .mark_deleted(tx, namespace, entity, id, version, policy)
    }

    fn page_by_id<'a, I>(&self, documents: I, range: &Range<String>) -> JsonDocumentStream<'a>
    where
        I: Iterator<Item = Result<Document>> + 'a,
    {
        let page = documents
            .try_paginate(range.clone(), |document: &Document| {
                document.key().id().to_string()
            })
            .map(|document| JsonDocument::from_document(&document?));
        Box::new(page)
    }
}

/// Drop tombstones, keep errors
fn live<I>(documents: I) -> impl Iterator<Item = Result<Document>>
where
    I: Iterator<Item = Result<Document>>,
{
    documents.filter(|document| document.as_ref().map_or(true, |d| !d.is_deleted()))
}

fn has_leaf(document: &Document, pattern: &str, value: Option<&str>) -> bool {
    document.leaves().any(|leaf| {
        let value_matches = match value {
            Some(value) => matches!(leaf.value(), LeafValue::String(text) if text == value),
            None => leaf.fragment_type() == FragmentType::Null,
        };
        value_matches
            && index_unaware_path(leaf.path()).map_or(false, |(leaf_pattern, _)| leaf_pattern == pattern)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryPersistence;
    use ldstore_core::DocumentKey;
    use serde_json::json;

    fn layer() -> JsonPersistence<MemoryPersistence> {
        JsonPersistence::new(MemoryPersistence::new(), 4)
    }

    fn doc(id: &str, secs: u64, content: serde_json::Value) -> JsonDocument {
        JsonDocument::new(
            DocumentKey::new("ns", "Person", id, Timestamp::from_secs(secs)),
            content,
        )
    }

    #[test]
    fn test_round_trip_through_backend() {
        let layer = layer();
        let tx = layer.create_transaction(false).unwrap();
        let original = doc("1", 1, json!({"name": "Ola Nordmann", "emails": ["ola@example.com"]}));
        layer.create_or_overwrite(&tx, &original).unwrap();
        let read = layer
            .read_document(&tx, Timestamp::MAX, "ns", "Person", "1")
            .unwrap();
        assert_eq!(read, Some(original));
    }

    #[test]
    fn test_tombstone_reads_as_none() {
        let layer = layer();
        let tx = layer.create_transaction(false).unwrap();
        layer.create_or_overwrite(&tx, &doc("1", 1, json!({"a": 1}))).unwrap();
        layer
            .mark_document_deleted(&tx, "ns", "Person", "1", Timestamp::from_secs(2), DeletePolicy::default())
            .unwrap();
        assert!(layer
            .read_document(&tx, Timestamp::MAX, "ns", "Person", "1")
            .unwrap()
            .is_none());
        let older = layer
            .read_document(&tx, Timestamp::from_secs(1), "ns", "Person", "1")
            .unwrap();
        assert!(older.is_some());
    }

    #[test]
    fn test_find_null_leaf() {
        let layer = layer();
        let tx = layer.create_transaction(false).unwrap();
        layer.create_or_overwrite(&tx, &doc("1", 1, json!({"nick": null}))).unwrap();
        layer.create_or_overwrite(&tx, &doc("2", 1, json!({"nick": ""}))).unwrap();
        layer.create_or_overwrite(&tx, &doc("3", 1, json!({"nick": "Ola"}))).unwrap();
        layer.create_or_overwrite(&tx, &doc("4", 1, json!({"nick": {}}))).unwrap();

        let find = |value: Option<&str>| -> Vec<String> {
            layer
                .find_documents(&tx, Timestamp::MAX, "ns", "Person", "$.nick", value, &Range::unbounded())
                .unwrap()
                .map(|d| d.unwrap().key().id().to_string())
                .collect()
        };
        assert_eq!(find(None), vec!["1"]);
        assert_eq!(find(Some("")), vec!["2"]);
        assert_eq!(find(Some("Ola")), vec!["3"]);
    }

    #[test]
    fn test_has_leaf_matches_any_index() {
        let key = DocumentKey::new("ns", "Person", "1", Timestamp::from_secs(1));
        let flattened = ldstore_codec::flatten(
            &json!({"names": [{"first": "Ola"}, {"first": "Kari"}]}),
            key,
            4,
        )
        .unwrap();
        assert!(has_leaf(&flattened, "$.names[].first", Some("Kari")));
        assert!(!has_leaf(&flattened, "$.names[].first", Some("Per")));
        assert!(!has_leaf(&flattened, "$.names[].last", Some("Kari")));
        assert!(!has_leaf(&flattened, "$.names[].first", None));
    }
}
