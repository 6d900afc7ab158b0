//! Push-side document assembler
//!
//! `DocumentAssembler` subscribes to an ordered `StreamItem` stream and
//! regroups it into whole documents. All fragments of one `DocumentKey`
//! must be contiguous in the stream; a key that reappears later would be
//! assembled as a second, separate document.
//!
//! Memory is bounded by one key's worth of fragments plus the documents
//! already finalized, which the caller caps with `limit`.

use crate::flow::{Publisher, Subscriber, Subscription};
use ldstore_codec::{decode_document, Document};
use ldstore_core::{DocumentKey, Fragment, PersistenceError, Result, StreamItem};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::{debug, trace, warn};

/// Credit requested on subscribe
///
/// One unit for the first group, one spare so the first fragment of the
/// next group can arrive and close the current one.
pub const INITIAL_REQUEST: u64 = 2;

/// Result of a buffered read
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AssembledDocuments {
    /// Documents in stream order
    pub documents: Vec<Document>,
    /// True when the producer or the assembler stopped early because of a limit
    pub limited: bool,
}

impl AssembledDocuments {
    /// First document, if any
    pub fn first(&self) -> Option<&Document> {
        self.documents.first()
    }

    /// Consume into the first document
    pub fn into_first(self) -> Option<Document> {
        self.documents.into_iter().next()
    }
}

/// Shared slot the assembler writes its terminal result into
pub type AssemblySlot = Rc<RefCell<Option<Result<AssembledDocuments>>>>;

struct PendingGroup {
    key: DocumentKey,
    fragments: Vec<Fragment>,
}

/// Credit-based subscriber that groups fragments into documents
pub struct DocumentAssembler<'a> {
    capacity: u32,
    limit: usize,
    subscription: Option<Rc<dyn Subscription + 'a>>,
    pending: Option<PendingGroup>,
    documents: Vec<Document>,
    limited: bool,
    done: bool,
    slot: AssemblySlot,
}

impl<'a> DocumentAssembler<'a> {
    /// Assembler that stops after `limit` documents
    ///
    /// `capacity` is the fragment capacity recorded on decoded leaves.
    pub fn new(capacity: u32, limit: usize, slot: AssemblySlot) -> Self {
        Self {
            capacity,
            limit,
            subscription: None,
            pending: None,
            documents: Vec::new(),
            limited: false,
            done: false,
            slot,
        }
    }

    fn finalize_pending(&mut self) -> Result<()> {
        let Some(group) = self.pending.take() else {
            return Ok(());
        };
        let fragment_count = group.fragments.len();
        let document = decode_document(group.key, group.fragments, self.capacity)?;
        trace!(
            target: "ldstore::assembler",
            key = %document.key(),
            fragments = fragment_count,
            deleted = document.is_deleted(),
            "document assembled"
        );
        self.documents.push(document);
        Ok(())
    }

    fn cancel_upstream(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.cancel();
        }
    }

    fn deliver(&mut self, result: Result<AssembledDocuments>) {
        self.done = true;
        self.subscription = None;
        *self.slot.borrow_mut() = Some(result);
    }

    fn deliver_documents(&mut self) {
        let assembled = AssembledDocuments {
            documents: std::mem::take(&mut self.documents),
            limited: self.limited,
        };
        self.deliver(Ok(assembled));
    }

    fn fail(&mut self, error: PersistenceError) {
        self.pending = None;
        self.documents.clear();
        self.cancel_upstream();
        self.deliver(Err(error));
    }

    fn finish(&mut self) {
        if self.pending.is_some() {
            if self.documents.len() < self.limit {
                if let Err(error) = self.finalize_pending() {
                    self.documents.clear();
                    self.deliver(Err(error));
                    return;
                }
            } else {
                self.pending = None;
                self.limited = true;
            }
        }
        self.deliver_documents();
    }

    fn accept(&mut self, fragment: Fragment) -> Result<()> {
        let same_group = self
            .pending
            .as_ref()
            .map_or(false, |group| group.key == *fragment.document_key());
        if same_group {
            if let Some(group) = self.pending.as_mut() {
                group.fragments.push(fragment);
            }
            return Ok(());
        }
        self.finalize_pending()?;
        self.pending = Some(PendingGroup {
            key: fragment.document_key().clone(),
            fragments: vec![fragment],
        });
        Ok(())
    }
}

impl<'a> Subscriber<'a, StreamItem> for DocumentAssembler<'a> {
    fn on_subscribe(&mut self, subscription: Rc<dyn Subscription + 'a>) {
        self.subscription = Some(subscription.clone());
        subscription.request(INITIAL_REQUEST);
    }

    fn on_next(&mut self, item: StreamItem) {
        if self.done {
            return;
        }
        let fragment = match item {
            StreamItem::Control { limited } => {
                // terminal: anything after the sentinel is ignored
                self.limited = limited;
                self.cancel_upstream();
                self.finish();
                return;
            }
            StreamItem::Data(fragment) => fragment,
        };

        if self.documents.len() >= self.limit {
            debug!(
                target: "ldstore::assembler",
                limit = self.limit,
                "document limit reached, cancelling upstream"
            );
            self.pending = None;
            self.limited = true;
            self.cancel_upstream();
            self.deliver_documents();
            return;
        }

        if let Err(error) = self.accept(fragment) {
            self.fail(error);
            return;
        }

        if let Some(subscription) = self.subscription.clone() {
            subscription.request(1);
        }
    }

    fn on_error(&mut self, error: PersistenceError) {
        if self.done {
            return;
        }
        warn!(
            target: "ldstore::assembler",
            error = %error,
            buffered = self.pending.as_ref().map_or(0, |group| group.fragments.len()),
            "upstream failed, discarding buffered fragments"
        );
        self.pending = None;
        self.documents.clear();
        self.deliver(Err(error));
    }

    fn on_complete(&mut self) {
        if self.done {
            return;
        }
        self.finish();
    }
}

/// Run `publisher` through a `DocumentAssembler` and collect the result
///
/// Returns at most `limit` documents. The call is synchronous: the
/// publisher drives the assembler until a terminal signal or a cancel.
pub fn assemble<'a, P>(publisher: P, capacity: u32, limit: usize) -> Result<AssembledDocuments>
where
    P: Publisher<'a, StreamItem>,
{
    let slot: AssemblySlot = Rc::new(RefCell::new(None));
    publisher.subscribe(Box::new(DocumentAssembler::new(
        capacity,
        limit,
        slot.clone(),
    )));
    let result = slot.borrow_mut().take();
    result.unwrap_or_else(|| {
        Err(PersistenceError::storage(
            "fragment stream ended without completing",
        ))
    })
}
