// SPDX-License-Identifier: MIT

//! Node controller - every module controller bound to one subject
//!
//! The node listens to each controller for either `Load` or `Unload`, never
//! both: after a load it only waits for the matching unload and the other way
//! round. Consecutive loads of one controller therefore cannot be counted
//! twice.

use crate::error::{ConditionerError, Result};
use crate::event::{Emitter, OwnerId};
use crate::module::{ControllerEvent, ControllerTopic, ExecuteResult, ModuleController};
use crate::subject::{SubjectId, SubjectRef, INITIALIZED_ATTR, PROCESSED_ATTR};
use serde::Serialize;
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

/// One controller's answer to a fanned-out `execute`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeExecuteResult {
    pub path: String,
    #[serde(flatten)]
    pub result: ExecuteResult,
}

struct NodeInner {
    owner: OwnerId,
    subject: RefCell<Option<SubjectRef>>,
    subject_id: SubjectId,
    priority: i32,
    controllers: RefCell<Vec<ModuleController>>,
    events: Emitter<ControllerEvent>,
    destroyed: Cell<bool>,
}

#[derive(Clone)]
pub struct NodeController {
    inner: Rc<NodeInner>,
}

impl NodeController {
    /// Take ownership of `controllers` for `subject` and mark the subject processed
    pub fn new(subject: SubjectRef, priority: i32, controllers: Vec<ModuleController>) -> Result<Self> {
        let subject_id = subject.id();
        if controllers.is_empty() {
            return Err(ConditionerError::config(format!(
                "subject '{}' declares no modules",
                subject_id
            )));
        }

        subject.set_attribute(PROCESSED_ATTR, "true");
        let node = Self {
            inner: Rc::new(NodeInner {
                owner: OwnerId::next(),
                subject: RefCell::new(Some(subject)),
                subject_id,
                priority,
                controllers: RefCell::new(controllers.clone()),
                events: Emitter::new(),
                destroyed: Cell::new(false),
            }),
        };

        for controller in &controllers {
            if controller.is_active() {
                node.watch_unload(controller);
            } else {
                node.watch_load(controller);
            }
        }
        node.refresh_initialized();

        log::info!(
            "Node '{}' created with {} module(s) at priority {}",
            node.inner.subject_id,
            controllers.len(),
            priority
        );
        Ok(node)
    }

    fn watch_load(&self, controller: &ModuleController) {
        let weak = Rc::downgrade(&self.inner);
        controller
            .events()
            .subscribe_owned(self.inner.owner, ControllerTopic::Load, move |event| {
                if let Some(node) = Self::upgrade(&weak) {
                    node.on_load(event.controller());
                }
            });

        let weak = Rc::downgrade(&self.inner);
        controller.events().subscribe_owned(
            self.inner.owner,
            ControllerTopic::LoadFailed,
            move |event| {
                if let Some(node) = Self::upgrade(&weak) {
                    node.inner.events.publish(event);
                }
            },
        );
    }

    fn watch_unload(&self, controller: &ModuleController) {
        let weak = Rc::downgrade(&self.inner);
        controller
            .events()
            .subscribe_owned(self.inner.owner, ControllerTopic::Unload, move |event| {
                if let Some(node) = Self::upgrade(&weak) {
                    node.on_unload(event.controller());
                }
            });
    }

    fn upgrade(weak: &Weak<NodeInner>) -> Option<NodeController> {
        weak.upgrade()
            .filter(|inner| !inner.destroyed.get())
            .map(|inner| NodeController { inner })
    }

    fn on_load(&self, controller: &ModuleController) {
        controller.events().unsubscribe_owner(self.inner.owner);
        self.watch_unload(controller);
        self.refresh_initialized();
        self.inner
            .events
            .publish(&ControllerEvent::Load(controller.clone()));
    }

    fn on_unload(&self, controller: &ModuleController) {
        controller.events().unsubscribe_owner(self.inner.owner);
        self.watch_load(controller);
        self.refresh_initialized();
        self.inner
            .events
            .publish(&ControllerEvent::Unload(controller.clone()));
    }

    fn refresh_initialized(&self) {
        let subject = self.inner.subject.borrow();
        let Some(subject) = subject.as_ref() else {
            return;
        };
        let active: Vec<String> = self
            .active_module_controllers()
            .iter()
            .map(|c| c.path().to_string())
            .collect();
        if active.is_empty() {
            subject.remove_attribute(INITIALIZED_ATTR);
        } else {
            subject.set_attribute(INITIALIZED_ATTR, &active.join(","));
        }
    }

    pub fn subject(&self) -> Option<SubjectRef> {
        self.inner.subject.borrow().clone()
    }

    pub fn subject_id(&self) -> &SubjectId {
        &self.inner.subject_id
    }

    pub fn priority(&self) -> i32 {
        self.inner.priority
    }

    pub fn events(&self) -> &Emitter<ControllerEvent> {
        &self.inner.events
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.get()
    }

    pub fn ptr_eq(&self, other: &NodeController) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// True when every owned controller has its module loaded
    pub fn are_modules_active(&self) -> bool {
        let controllers = self.inner.controllers.borrow();
        !controllers.is_empty() && controllers.iter().all(ModuleController::is_active)
    }

    pub fn active_module_controllers(&self) -> Vec<ModuleController> {
        self.inner
            .controllers
            .borrow()
            .iter()
            .filter(|c| c.is_active())
            .cloned()
            .collect()
    }

    /// All owned controllers in declaration order
    pub fn controllers(&self) -> Vec<ModuleController> {
        self.inner.controllers.borrow().clone()
    }

    /// First controller declared under `path` (or its alias)
    pub fn module_controller(&self, path: &str) -> Option<ModuleController> {
        self.inner
            .controllers
            .borrow()
            .iter()
            .find(|c| c.matches_path(path))
            .cloned()
    }

    pub fn module_controllers(&self, path: &str) -> Vec<ModuleController> {
        self.inner
            .controllers
            .borrow()
            .iter()
            .filter(|c| c.matches_path(path))
            .cloned()
            .collect()
    }

    /// Run `method` on every owned controller
    pub fn execute(&self, method: &str, params: &[Value]) -> Vec<NodeExecuteResult> {
        self.execute_matching(|_| true, method, params)
    }

    /// Run `method` on the controllers declared under `path`; empty when none match
    pub fn execute_on(&self, path: &str, method: &str, params: &[Value]) -> Vec<NodeExecuteResult> {
        self.execute_matching(|c| c.matches_path(path), method, params)
    }

    fn execute_matching(
        &self,
        filter: impl Fn(&ModuleController) -> bool,
        method: &str,
        params: &[Value],
    ) -> Vec<NodeExecuteResult> {
        // modules may call back into the node while executing
        let controllers = self.controllers();
        controllers
            .iter()
            .filter(|&c| filter(c))
            .map(|c| NodeExecuteResult {
                path: c.path().to_string(),
                result: c.execute(method, params),
            })
            .collect()
    }

    /// Destroy every owned controller and release the subject.
    ///
    /// Listeners of this node receive `Unload` for each module that was loaded.
    pub fn destroy(&self) {
        if self.inner.destroyed.get() {
            log::warn!("Node '{}' destroyed twice", self.inner.subject_id);
            return;
        }

        let controllers = std::mem::take(&mut *self.inner.controllers.borrow_mut());
        for controller in &controllers {
            controller.events().unsubscribe_owner(self.inner.owner);
        }
        for controller in &controllers {
            let was_active = controller.is_active();
            controller.destroy();
            if was_active {
                self.inner
                    .events
                    .publish(&ControllerEvent::Unload(controller.clone()));
            }
        }

        self.inner.destroyed.set(true);
        if let Some(subject) = self.inner.subject.borrow_mut().take() {
            subject.remove_attribute(INITIALIZED_ATTR);
            subject.remove_attribute(PROCESSED_ATTR);
        }
        self.inner.events.clear();
        log::info!("Node '{}' destroyed", self.inner.subject_id);
    }
}

impl fmt::Debug for NodeController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeController")
            .field("subject", &self.inner.subject_id)
            .field("priority", &self.inner.priority)
            .field("modules", &self.inner.controllers.borrow().len())
            .finish()
    }
}
