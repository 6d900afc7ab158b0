//! Pull-side grouping
//!
//! `GroupByOrdered` is the lazy iterator counterpart of the push assembler:
//! consecutive items with equal keys form one group, and only the group in
//! progress plus one look-ahead item are held in memory.

use ldstore_codec::{decode_document, Document};
use ldstore_core::{DocumentKey, Fragment, Result, StreamItem};

/// Groups consecutive items that map to the same key
pub struct GroupByOrdered<I: Iterator, K, F> {
    items: I,
    key_fn: F,
    lookahead: Option<(K, I::Item)>,
}

impl<I, K, F> GroupByOrdered<I, K, F>
where
    I: Iterator,
    K: PartialEq,
    F: FnMut(&I::Item) -> K,
{
    /// Group `items` by `key_fn`
    pub fn new(items: I, key_fn: F) -> Self {
        Self {
            items,
            key_fn,
            lookahead: None,
        }
    }
}

impl<I, K, F> Iterator for GroupByOrdered<I, K, F>
where
    I: Iterator,
    K: PartialEq,
    F: FnMut(&I::Item) -> K,
{
    type Item = (K, Vec<I::Item>);

    fn next(&mut self) -> Option<Self::Item> {
        let (key, first) = match self.lookahead.take() {
            Some(entry) => entry,
            None => {
                let item = self.items.next()?;
                ((self.key_fn)(&item), item)
            }
        };

        let mut group = vec![first];
        for item in self.items.by_ref() {
            let next_key = (self.key_fn)(&item);
            if next_key == key {
                group.push(item);
            } else {
                self.lookahead = Some((next_key, item));
                break;
            }
        }
        Some((key, group))
    }
}

/// `group_by_ordered` for every iterator
pub trait GroupByOrderedExt: Iterator + Sized {
    /// Group consecutive items by `key_fn`
    fn group_by_ordered<K, F>(self, key_fn: F) -> GroupByOrdered<Self, K, F>
    where
        K: PartialEq,
        F: FnMut(&Self::Item) -> K,
    {
        GroupByOrdered::new(self, key_fn)
    }
}

impl<I: Iterator> GroupByOrderedExt for I {}

// =============================================================================
// Document stream
// =============================================================================

type FragmentGroups<'a> = Box<dyn Iterator<Item = (Option<DocumentKey>, Vec<Result<Fragment>>)> + 'a>;

/// Lazy stream of documents assembled from a fragment stream
///
/// Yields at most one `Err`, after which the stream is fused.
pub struct AssembledStream<'a> {
    groups: FragmentGroups<'a>,
    capacity: u32,
    failed: bool,
}

impl<'a> Iterator for AssembledStream<'a> {
    type Item = Result<Document>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let (key, group) = self.groups.next()?;
        let Some(key) = key else {
            // errors carry no key, so they always form a group of their own
            self.failed = true;
            return group.into_iter().find_map(|r| r.err()).map(Err);
        };
        let fragments = group.into_iter().filter_map(|r| r.ok());
        let document = decode_document(key, fragments, self.capacity).map_err(Into::into);
        if document.is_err() {
            self.failed = true;
        }
        Some(document)
    }
}

/// Assemble documents lazily from an ordered fragment stream
///
/// Stops at the streaming-control sentinel. Fragments of one key must be
/// contiguous.
pub fn assemble_documents<'a, I>(items: I, capacity: u32) -> AssembledStream<'a>
where
    I: Iterator<Item = Result<StreamItem>> + 'a,
{
    let fragments = items.map_while(|item| match item {
        Ok(StreamItem::Data(fragment)) => Some(Ok(fragment)),
        Ok(StreamItem::Control { .. }) => None,
        Err(error) => Some(Err(error)),
    })
    .fuse();
    let groups = fragments.group_by_ordered(|item: &Result<Fragment>| {
        item.as_ref().ok().map(|fragment| fragment.document_key().clone())
    });
    AssembledStream {
        groups: Box::new(groups),
        capacity,
        failed: false,
    }
}
