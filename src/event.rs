// SPDX-License-Identifier: MIT

//! Publish/subscribe plumbing shared by testers and controllers
//!
//! Every publishing component owns an [`Emitter`]. Listeners subscribe per
//! topic and may be grouped under an [`OwnerId`] so a component can drop all
//! of its subscriptions on another emitter at once.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

/// A typed event that can be dispatched by topic
pub trait Event: Clone {
    type Topic: Copy + PartialEq + fmt::Debug;

    fn topic(&self) -> Self::Topic;
}

/// Handle returned by [`Emitter::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Identity used to group subscriptions made by one component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OwnerId(u64);

static NEXT_OWNER: AtomicU64 = AtomicU64::new(1);

impl OwnerId {
    pub fn next() -> Self {
        Self(NEXT_OWNER.fetch_add(1, Ordering::Relaxed))
    }
}

type Handler<E> = Rc<dyn Fn(&E)>;

struct Listener<E: Event> {
    id: ListenerId,
    owner: Option<OwnerId>,
    topic: E::Topic,
    handler: Handler<E>,
}

/// Synchronous single-threaded event emitter
pub struct Emitter<E: Event> {
    listeners: RefCell<Vec<Listener<E>>>,
    next_id: Cell<u64>,
}

impl<E: Event> Emitter<E> {
    pub fn new() -> Self {
        Self {
            listeners: RefCell::new(Vec::new()),
            next_id: Cell::new(1),
        }
    }

    pub fn subscribe(&self, topic: E::Topic, handler: impl Fn(&E) + 'static) -> ListenerId {
        self.insert(None, topic, Rc::new(handler))
    }

    pub fn subscribe_owned(
        &self,
        owner: OwnerId,
        topic: E::Topic,
        handler: impl Fn(&E) + 'static,
    ) -> ListenerId {
        self.insert(Some(owner), topic, Rc::new(handler))
    }

    fn insert(&self, owner: Option<OwnerId>, topic: E::Topic, handler: Handler<E>) -> ListenerId {
        let id = ListenerId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.listeners.borrow_mut().push(Listener {
            id,
            owner,
            topic,
            handler,
        });
        id
    }

    /// Returns true if the listener was still subscribed
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|l| l.id != id);
        listeners.len() != before
    }

    /// Drops every subscription made under `owner`, returning how many were removed
    pub fn unsubscribe_owner(&self, owner: OwnerId) -> usize {
        let mut listeners = self.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|l| l.owner != Some(owner));
        before - listeners.len()
    }

    pub fn clear(&self) {
        self.listeners.borrow_mut().clear();
    }

    pub fn listener_count(&self, topic: E::Topic) -> usize {
        self.listeners
            .borrow()
            .iter()
            .filter(|l| l.topic == topic)
            .count()
    }

    fn is_subscribed(&self, id: ListenerId) -> bool {
        self.listeners.borrow().iter().any(|l| l.id == id)
    }

    /// Dispatch `event` to every listener of its topic.
    ///
    /// Handlers run without any borrow held, so they may subscribe or
    /// unsubscribe freely. A listener removed by an earlier handler in the
    /// same dispatch is skipped.
    pub fn publish(&self, event: &E) -> usize {
        let topic = event.topic();
        let targets: Vec<(ListenerId, Handler<E>)> = self
            .listeners
            .borrow()
            .iter()
            .filter(|l| l.topic == topic)
            .map(|l| (l.id, l.handler.clone()))
            .collect();

        let mut delivered = 0;
        for (id, handler) in targets {
            if !self.is_subscribed(id) {
                continue;
            }
            handler(event);
            delivered += 1;
        }
        delivered
    }
}

impl<E: Event> Default for Emitter<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Event> fmt::Debug for Emitter<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter")
            .field("listeners", &self.listeners.borrow().len())
            .finish()
    }
}
