// SPDX-License-Identifier: MIT

//! Synced controller group - a barrier over node and module controllers
//!
//! The group publishes `Load` once all members are active at the same time
//! and `Unload` as soon as the first of them drops. Both are edge-triggered.
//! `Load` is delivered on a later turn of the local task queue; `Unload` is
//! delivered immediately.

use crate::error::{ConditionerError, Result};
use crate::event::{Emitter, Event, OwnerId};
use crate::module::{ControllerEvent, ControllerTopic, ModuleController};
use crate::node::NodeController;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

/// A controller the group can observe
#[derive(Debug, Clone)]
pub enum SyncMember {
    Node(NodeController),
    Module(ModuleController),
}

impl SyncMember {
    pub fn is_active(&self) -> bool {
        match self {
            SyncMember::Node(node) => node.are_modules_active(),
            SyncMember::Module(module) => module.is_active(),
        }
    }

    pub fn events(&self) -> &Emitter<ControllerEvent> {
        match self {
            SyncMember::Node(node) => node.events(),
            SyncMember::Module(module) => module.events(),
        }
    }
}

impl From<NodeController> for SyncMember {
    fn from(node: NodeController) -> Self {
        SyncMember::Node(node)
    }
}

impl From<ModuleController> for SyncMember {
    fn from(module: ModuleController) -> Self {
        SyncMember::Module(module)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupTopic {
    Load,
    Unload,
}

/// Both variants carry the full member list
#[derive(Debug, Clone)]
pub enum GroupEvent {
    Load(Vec<SyncMember>),
    Unload(Vec<SyncMember>),
}

impl Event for GroupEvent {
    type Topic = GroupTopic;

    fn topic(&self) -> GroupTopic {
        match self {
            GroupEvent::Load(_) => GroupTopic::Load,
            GroupEvent::Unload(_) => GroupTopic::Unload,
        }
    }
}

struct GroupInner {
    owner: OwnerId,
    members: RefCell<Vec<SyncMember>>,
    in_sync: Cell<bool>,
    load_delivered: Cell<bool>,
    // bumped to invalidate a deferred load that has not run yet
    generation: Cell<u64>,
    destroyed: Cell<bool>,
    events: Emitter<GroupEvent>,
}

#[derive(Clone)]
pub struct SyncedControllerGroup {
    inner: Rc<GroupInner>,
}

impl SyncedControllerGroup {
    /// Observe `members` and evaluate their current state right away.
    ///
    /// Must run inside a `LocalSet`.
    pub fn new(members: Vec<SyncMember>) -> Result<Self> {
        if members.is_empty() {
            return Err(ConditionerError::config(
                "a synced group needs at least one controller",
            ));
        }

        let group = Self {
            inner: Rc::new(GroupInner {
                owner: OwnerId::next(),
                members: RefCell::new(members.clone()),
                in_sync: Cell::new(false),
                load_delivered: Cell::new(false),
                generation: Cell::new(0),
                destroyed: Cell::new(false),
                events: Emitter::new(),
            }),
        };

        for member in &members {
            let weak = Rc::downgrade(&group.inner);
            member
                .events()
                .subscribe_owned(group.inner.owner, ControllerTopic::Load, move |_| {
                    if let Some(group) = Self::upgrade(&weak) {
                        group.test();
                    }
                });
            let weak = Rc::downgrade(&group.inner);
            member
                .events()
                .subscribe_owned(group.inner.owner, ControllerTopic::Unload, move |_| {
                    if let Some(group) = Self::upgrade(&weak) {
                        group.unload();
                    }
                });
        }

        group.test();
        Ok(group)
    }

    fn upgrade(weak: &Weak<GroupInner>) -> Option<SyncedControllerGroup> {
        weak.upgrade()
            .filter(|inner| !inner.destroyed.get())
            .map(|inner| SyncedControllerGroup { inner })
    }

    fn test(&self) {
        let all_active = self.inner.members.borrow().iter().all(SyncMember::is_active);
        if all_active {
            self.load();
        }
    }

    fn load(&self) {
        if self.inner.in_sync.replace(true) {
            return;
        }
        let generation = self.inner.generation.get() + 1;
        self.inner.generation.set(generation);

        let weak = Rc::downgrade(&self.inner);
        tokio::task::spawn_local(async move {
            let Some(group) = Self::upgrade(&weak) else {
                return;
            };
            let inner = &group.inner;
            if inner.generation.get() != generation || !inner.in_sync.get() {
                return;
            }
            inner.load_delivered.set(true);
            let members = group.members();
            log::debug!("Synced group of {} member(s) loaded", members.len());
            inner.events.publish(&GroupEvent::Load(members));
        });
    }

    fn unload(&self) {
        if !self.inner.in_sync.replace(false) {
            return;
        }
        if self.inner.load_delivered.replace(false) {
            let members = self.members();
            log::debug!("Synced group of {} member(s) unloaded", members.len());
            self.inner.events.publish(&GroupEvent::Unload(members));
        } else {
            // load was never seen downstream
            self.inner.generation.set(self.inner.generation.get() + 1);
            log::debug!("Synced group lost sync before its load was delivered");
        }
    }

    /// True from the moment all members are active until the first one drops
    pub fn is_in_sync(&self) -> bool {
        self.inner.in_sync.get()
    }

    pub fn members(&self) -> Vec<SyncMember> {
        self.inner.members.borrow().clone()
    }

    pub fn events(&self) -> &Emitter<GroupEvent> {
        &self.inner.events
    }

    /// Stop observing. Members are left untouched.
    pub fn destroy(&self) {
        if self.inner.destroyed.replace(true) {
            return;
        }
        let members = std::mem::take(&mut *self.inner.members.borrow_mut());
        for member in &members {
            member.events().unsubscribe_owner(self.inner.owner);
        }
        self.inner.in_sync.set(false);
        self.inner.generation.set(self.inner.generation.get() + 1);
        self.inner.events.clear();
    }
}
