//! Push streams with credit-based backpressure
//!
//! The protocol contract:
//! - a publisher pushes nothing until its subscriber requests credit
//! - each `on_next` consumes one unit of credit
//! - exactly one terminal signal (`on_complete` or `on_error`) ends a stream,
//!   and nothing is pushed after it
//! - `cancel` is cooperative: the publisher stops pushing and sends no
//!   terminal signal
//!
//! Everything runs synchronously on the caller's thread. A subscriber may
//! call `request` or `cancel` from inside its own callbacks.

use crate::credit::Credit;
use ldstore_core::{PersistenceError, Result};
use std::cell::{Cell, RefCell};
use std::iter::Peekable;
use std::rc::Rc;
use tracing::trace;

/// Consumer handle on a running stream
pub trait Subscription {
    /// Grant `n` more units of credit
    fn request(&self, n: u64);

    /// Ask the publisher to stop
    fn cancel(&self);
}

/// Receives the items of one stream
pub trait Subscriber<'a, T> {
    /// Called once, before any item
    fn on_subscribe(&mut self, subscription: Rc<dyn Subscription + 'a>);

    /// One item, pushed against one unit of credit
    fn on_next(&mut self, item: T);

    /// Terminal failure
    fn on_error(&mut self, error: PersistenceError);

    /// Terminal success
    fn on_complete(&mut self);
}

/// Source of a push stream
pub trait Publisher<'a, T> {
    /// Start the stream; the publisher is consumed
    fn subscribe(self, subscriber: Box<dyn Subscriber<'a, T> + 'a>);
}

// =============================================================================
// IteratorPublisher
// =============================================================================

/// Publisher over a fallible iterator
///
/// Items are pulled lazily, one per unit of credit. An `Err` item ends the
/// stream with `on_error`; exhaustion ends it with `on_complete`.
pub struct IteratorPublisher<'a, I> {
    items: I,
    on_cancel: Option<Box<dyn FnOnce() + 'a>>,
}

impl<'a, I> IteratorPublisher<'a, I> {
    /// Publish the items of `items`
    pub fn new(items: I) -> Self {
        Self {
            items,
            on_cancel: None,
        }
    }

    /// Run `hook` when the subscriber cancels
    pub fn on_cancel(mut self, hook: impl FnOnce() + 'a) -> Self {
        self.on_cancel = Some(Box::new(hook));
        self
    }
}

impl<'a, I, T> Publisher<'a, T> for IteratorPublisher<'a, I>
where
    I: Iterator<Item = Result<T>> + 'a,
    T: 'a,
{
    fn subscribe(self, mut subscriber: Box<dyn Subscriber<'a, T> + 'a>) {
        let subscription = Rc::new(IteratorSubscription {
            items: RefCell::new(self.items.peekable()),
            subscriber: RefCell::new(None),
            credit: Credit::new(),
            finished: Cell::new(false),
            on_cancel: RefCell::new(self.on_cancel),
        });

        {
            // requests made from on_subscribe only add credit
            let _guard = subscription.credit.enter();
            let handle: Rc<dyn Subscription + 'a> = subscription.clone();
            subscriber.on_subscribe(handle);
        }

        if subscription.finished.get() {
            return;
        }
        *subscription.subscriber.borrow_mut() = Some(subscriber);
        subscription.drain();
    }
}

struct IteratorSubscription<'a, I: Iterator, T> {
    items: RefCell<Peekable<I>>,
    subscriber: RefCell<Option<Box<dyn Subscriber<'a, T> + 'a>>>,
    credit: Credit,
    finished: Cell<bool>,
    on_cancel: RefCell<Option<Box<dyn FnOnce() + 'a>>>,
}

impl<'a, I, T> IteratorSubscription<'a, I, T>
where
    I: Iterator<Item = Result<T>>,
{
    fn drain(&self) {
        let Some(_guard) = self.credit.enter() else {
            return;
        };
        // the subscriber is out of its slot while its callbacks run
        let Some(mut subscriber) = self.subscriber.borrow_mut().take() else {
            return;
        };

        loop {
            if self.finished.get() {
                break;
            }
            let exhausted = self.items.borrow_mut().peek().is_none();
            if exhausted {
                self.finished.set(true);
                subscriber.on_complete();
                break;
            }
            if !self.credit.try_consume() {
                break;
            }
            let next = self.items.borrow_mut().next();
            match next {
                Some(Ok(item)) => subscriber.on_next(item),
                Some(Err(error)) => {
                    self.finished.set(true);
                    subscriber.on_error(error);
                    break;
                }
                None => {}
            }
        }

        if !self.finished.get() {
            *self.subscriber.borrow_mut() = Some(subscriber);
        }
    }
}

impl<'a, I, T> Subscription for IteratorSubscription<'a, I, T>
where
    I: Iterator<Item = Result<T>>,
{
    fn request(&self, n: u64) {
        if self.finished.get() || n == 0 {
            return;
        }
        self.credit.grant(n);
        self.drain();
    }

    fn cancel(&self) {
        if self.finished.replace(true) {
            return;
        }
        trace!(target: "ldstore::streaming", "subscription cancelled");
        // breaks the subscriber <-> subscription cycle when cancelled from outside a callback
        let subscriber = self.subscriber.try_borrow_mut().ok().and_then(|mut s| s.take());
        drop(subscriber);
        let hook = self.on_cancel.borrow_mut().take();
        if let Some(hook) = hook {
            hook();
        }
    }
}
