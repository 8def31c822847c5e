// SPDX-License-Identifier: MIT

//! Tester - keeps a parsed condition bound to live test instances
//!
//! One test instance is created per distinct leaf; `a:{x} and a:{x}` shares a
//! single instance. The tester re-evaluates only when a leaf notifies, and
//! publishes `Change` only when the overall result actually flips.

use super::ast::{Expression, Leaf};
use super::test::{ChangeNotifier, Subscription, Test, TestFactory};
use crate::error::{ConditionerError, Result};
use crate::event::{Emitter, Event, ListenerId};
use crate::subject::SubjectRef;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TesterTopic {
    Change,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TesterEvent {
    /// The condition now evaluates to the carried value
    Change(bool),
}

impl Event for TesterEvent {
    type Topic = TesterTopic;

    fn topic(&self) -> TesterTopic {
        TesterTopic::Change
    }
}

struct Slot {
    leaf: Leaf,
    test: Box<dyn Test>,
    subscription: Option<Subscription>,
}

struct TesterInner {
    expression: Rc<Expression>,
    index: HashMap<Leaf, usize>,
    slots: RefCell<Vec<Slot>>,
    value: Cell<bool>,
    ready: Cell<bool>,
    disposed: Cell<bool>,
    events: Emitter<TesterEvent>,
}

/// Evaluates a condition against the tests it owns
#[derive(Clone)]
pub struct Tester {
    inner: Rc<TesterInner>,
}

impl Tester {
    /// Build a tester for `subject`, creating and setting up one test per distinct leaf
    pub fn new(expression: Rc<Expression>, subject: &SubjectRef, factory: &TestFactory) -> Result<Self> {
        let mut index = HashMap::new();
        let mut slots: Vec<Slot> = Vec::new();
        for leaf in expression.leaves() {
            if index.contains_key(leaf) {
                continue;
            }
            let test = match factory.create(&leaf.test, subject, leaf.config.as_deref()) {
                Ok(test) => test,
                Err(err) => {
                    for mut slot in slots {
                        slot.test.destroy();
                    }
                    return Err(err);
                }
            };
            index.insert(leaf.clone(), slots.len());
            slots.push(Slot {
                leaf: leaf.clone(),
                test,
                subscription: None,
            });
        }

        let inner = Rc::new(TesterInner {
            expression,
            index,
            slots: RefCell::new(slots),
            value: Cell::new(false),
            ready: Cell::new(false),
            disposed: Cell::new(false),
            events: Emitter::new(),
        });

        {
            let mut slots = inner.slots.borrow_mut();
            for slot in slots.iter_mut() {
                let weak: Weak<TesterInner> = Rc::downgrade(&inner);
                let (notifier, subscription) = ChangeNotifier::channel(slot.leaf.to_string(), move || {
                    if let Some(inner) = weak.upgrade() {
                        inner.on_leaf_change();
                    }
                });
                slot.subscription = Some(subscription);
                slot.test.setup(notifier);
            }
        }

        inner.value.set(inner.evaluate());
        inner.ready.set(true);
        log::debug!(
            "Tester for '{}' created with {} test(s), initial value {}",
            inner.expression,
            inner.index.len(),
            inner.value.get()
        );

        Ok(Self { inner })
    }

    /// Parse `condition` and build a tester for it
    pub fn from_condition(condition: &str, subject: &SubjectRef, factory: &TestFactory) -> Result<Self> {
        let expression = super::parser::parse(condition)?;
        Self::new(Rc::new(expression), subject, factory)
    }

    pub fn value(&self) -> Result<bool> {
        if self.inner.disposed.get() {
            return Err(ConditionerError::Disposed("Tester"));
        }
        Ok(self.inner.value.get())
    }

    pub fn expression(&self) -> &Expression {
        &self.inner.expression
    }

    /// Number of live test instances owned by this tester
    pub fn test_count(&self) -> usize {
        self.inner.slots.borrow().len()
    }

    pub fn on_change(&self, handler: impl Fn(bool) + 'static) -> ListenerId {
        self.inner
            .events
            .subscribe(TesterTopic::Change, move |TesterEvent::Change(value)| handler(*value))
    }

    pub fn events(&self) -> &Emitter<TesterEvent> {
        &self.inner.events
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    /// Tear down every owned test exactly once
    pub fn destroy(&self) {
        if self.inner.disposed.replace(true) {
            log::warn!("Tester for '{}' destroyed twice", self.inner.expression);
            return;
        }

        let slots: Vec<Slot> = self.inner.slots.borrow_mut().drain(..).collect();
        for mut slot in slots {
            if let Some(subscription) = slot.subscription.take() {
                subscription.cancel();
            }
            slot.test.destroy();
        }
        self.inner.events.clear();
        log::debug!("Tester for '{}' destroyed", self.inner.expression);
    }
}

impl TesterInner {
    fn evaluate(&self) -> bool {
        let slots = self.slots.borrow();
        self.expression.evaluate(&|leaf: &Leaf| {
            self.index
                .get(leaf)
                .and_then(|i| slots.get(*i))
                .map(|slot| slot.test.value())
                .unwrap_or(false)
        })
    }

    fn on_leaf_change(&self) {
        if !self.ready.get() || self.disposed.get() {
            return;
        }
        if self.slots.try_borrow().is_err() {
            log::warn!(
                "Test in '{}' notified while the tester was busy; change dropped",
                self.expression
            );
            return;
        }

        let value = self.evaluate();
        if value == self.value.get() {
            return;
        }
        self.value.set(value);
        log::debug!("Condition '{}' changed to {}", self.expression, value);
        self.events.publish(&TesterEvent::Change(value));
    }
}
