// SPDX-License-Identifier: MIT

//! Module controller - load/unload lifecycle of one module on one subject
//!
//! ```text
//! Unloaded --activate--> Loading --resolved--> Loaded
//! Loaded --deactivate--> Unloading --teardown--> Unloaded
//! ```
//!
//! The controller records the latest activation request and applies it when
//! a transition completes, so a deactivate that arrives while loading is
//! honoured once resolution finishes instead of being dropped.

use super::agent::ModuleAgent;
use super::resolver::{Module, ModuleConstructor, ModuleError, ModuleResolver};
use super::types::{ActivationKind, ExecuteResult, ExecuteStatus, ModuleState};
use crate::condition::{Expression, TestFactory};
use crate::error::{LoadError, Result};
use crate::event::{Emitter, Event};
use crate::subject::SubjectRef;
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerTopic {
    Load,
    Unload,
    LoadFailed,
}

/// Lifecycle events published by module controllers and re-published by node controllers
#[derive(Clone)]
pub enum ControllerEvent {
    Load(ModuleController),
    Unload(ModuleController),
    LoadFailed(ModuleController, LoadError),
}

impl ControllerEvent {
    pub fn controller(&self) -> &ModuleController {
        match self {
            ControllerEvent::Load(c) | ControllerEvent::Unload(c) | ControllerEvent::LoadFailed(c, _) => c,
        }
    }
}

impl Event for ControllerEvent {
    type Topic = ControllerTopic;

    fn topic(&self) -> ControllerTopic {
        match self {
            ControllerEvent::Load(_) => ControllerTopic::Load,
            ControllerEvent::Unload(_) => ControllerTopic::Unload,
            ControllerEvent::LoadFailed(..) => ControllerTopic::LoadFailed,
        }
    }
}

/// Everything needed to build a module controller
pub struct ModuleSetup {
    pub path: String,
    pub alias: Option<String>,
    pub subject: SubjectRef,
    /// Registry defaults already merged with node options
    pub options: Value,
    pub condition: Option<Rc<Expression>>,
    pub tests: TestFactory,
    pub resolver: Rc<dyn ModuleResolver>,
}

struct ControllerInner {
    path: String,
    alias: Option<String>,
    subject: SubjectRef,
    options: Value,
    resolver: Rc<dyn ModuleResolver>,
    state: Cell<ModuleState>,
    wanted: Cell<bool>,
    failed: Cell<bool>,
    destroyed: Cell<bool>,
    instantiations: Cell<usize>,
    agent: RefCell<Option<ModuleAgent>>,
    module: RefCell<Option<Box<dyn Module>>>,
    events: Emitter<ControllerEvent>,
}

/// Handle to a module controller; clones share the same controller
#[derive(Clone)]
pub struct ModuleController {
    inner: Rc<ControllerInner>,
}

impl ModuleController {
    /// Build the controller and its agent. A static module, or a conditional
    /// one whose condition already holds, starts loading right away.
    pub fn new(setup: ModuleSetup) -> Result<Self> {
        let ModuleSetup {
            path,
            alias,
            subject,
            options,
            condition,
            tests,
            resolver,
        } = setup;

        let inner = Rc::new(ControllerInner {
            path,
            alias,
            subject: subject.clone(),
            options,
            resolver,
            state: Cell::new(ModuleState::Unloaded),
            wanted: Cell::new(false),
            failed: Cell::new(false),
            destroyed: Cell::new(false),
            instantiations: Cell::new(0),
            agent: RefCell::new(None),
            module: RefCell::new(None),
            events: Emitter::new(),
        });

        let weak: Weak<ControllerInner> = Rc::downgrade(&inner);
        let agent = ModuleAgent::build(condition, &subject, &tests, move |active| {
            if let Some(inner) = weak.upgrade() {
                let controller = ModuleController { inner };
                if active {
                    controller.activate();
                } else {
                    controller.deactivate();
                }
            }
        })?;
        let allowed = agent.allows_activation();
        *inner.agent.borrow_mut() = Some(agent);

        let controller = Self { inner };
        log::debug!(
            "Module controller for '{}' on '{}' created ({:?})",
            controller.path(),
            subject.id(),
            controller.activation_kind()
        );
        if allowed {
            controller.activate();
        }
        Ok(controller)
    }

    pub fn path(&self) -> &str {
        &self.inner.path
    }

    pub fn alias(&self) -> Option<&str> {
        self.inner.alias.as_deref()
    }

    /// True for the declared path or its registry alias
    pub fn matches_path(&self, path: &str) -> bool {
        self.inner.path == path || self.inner.alias.as_deref() == Some(path)
    }

    pub fn subject(&self) -> &SubjectRef {
        &self.inner.subject
    }

    pub fn options(&self) -> &Value {
        &self.inner.options
    }

    pub fn state(&self) -> ModuleState {
        self.inner.state.get()
    }

    pub fn is_active(&self) -> bool {
        self.inner.state.get() == ModuleState::Loaded
    }

    pub fn has_failed(&self) -> bool {
        self.inner.failed.get()
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.get()
    }

    /// How many times a module instance has been constructed
    pub fn instantiations(&self) -> usize {
        self.inner.instantiations.get()
    }

    pub fn activation_kind(&self) -> ActivationKind {
        self.inner
            .agent
            .borrow()
            .as_ref()
            .map(ModuleAgent::kind)
            .unwrap_or(ActivationKind::Static)
    }

    pub fn events(&self) -> &Emitter<ControllerEvent> {
        &self.inner.events
    }

    /// Same underlying controller
    pub fn ptr_eq(&self, other: &ModuleController) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Request the module to be loaded. A no-op while already loading or loaded.
    pub fn activate(&self) {
        if self.inner.destroyed.get() {
            return;
        }
        if self.inner.failed.get() {
            log::debug!("Module '{}' failed to load earlier; not retrying", self.path());
            return;
        }
        self.inner.wanted.set(true);
        match self.inner.state.get() {
            ModuleState::Unloaded => self.begin_load(),
            // picked up again once the current transition completes
            ModuleState::Loading | ModuleState::Loaded | ModuleState::Unloading => {}
        }
    }

    /// Request the module to be unloaded. Queued while loading.
    pub fn deactivate(&self) {
        self.inner.wanted.set(false);
        match self.inner.state.get() {
            ModuleState::Loaded => self.unload(),
            ModuleState::Loading => {
                log::debug!("Module '{}' deactivated while loading; deferred", self.path());
            }
            ModuleState::Unloaded | ModuleState::Unloading => {}
        }
    }

    fn begin_load(&self) {
        self.inner.state.set(ModuleState::Loading);
        log::debug!("Loading module '{}' on '{}'", self.path(), self.inner.subject.id());

        let weak = Rc::downgrade(&self.inner);
        let resolver = self.inner.resolver.clone();
        let path = self.inner.path.clone();
        tokio::task::spawn_local(async move {
            let resolved = resolver.resolve(&path).await;
            if let Some(inner) = weak.upgrade() {
                ModuleController { inner }.finish_load(resolved);
            }
        });
    }

    fn finish_load(&self, resolved: std::result::Result<Rc<dyn ModuleConstructor>, LoadError>) {
        if self.inner.destroyed.get() {
            self.inner.state.set(ModuleState::Unloaded);
            return;
        }

        let constructor = match resolved {
            Ok(constructor) => constructor,
            Err(err) => return self.fail(err),
        };

        if !self.inner.wanted.get() {
            log::debug!(
                "Module '{}' no longer wanted once resolved; not instantiating",
                self.path()
            );
            self.inner.state.set(ModuleState::Unloaded);
            return;
        }

        match constructor.construct(&self.inner.subject, &self.inner.options) {
            Ok(module) => {
                *self.inner.module.borrow_mut() = Some(module);
                self.inner
                    .instantiations
                    .set(self.inner.instantiations.get() + 1);
                self.inner.state.set(ModuleState::Loaded);
                log::debug!("Module '{}' loaded on '{}'", self.path(), self.inner.subject.id());
                self.inner.events.publish(&ControllerEvent::Load(self.clone()));
            }
            Err(err) => self.fail(err),
        }
    }

    fn fail(&self, err: LoadError) {
        self.inner.state.set(ModuleState::Unloaded);
        self.inner.failed.set(true);
        log::error!("{}", err);
        self.inner
            .events
            .publish(&ControllerEvent::LoadFailed(self.clone(), err));
    }

    fn unload(&self) {
        self.inner.state.set(ModuleState::Unloading);
        // empty while `execute` holds the instance; it tears it down on return
        let module = self.inner.module.borrow_mut().take();
        if let Some(mut module) = module {
            module.unload();
        }
        self.inner.state.set(ModuleState::Unloaded);
        log::debug!("Module '{}' unloaded from '{}'", self.path(), self.inner.subject.id());
        self.inner
            .events
            .publish(&ControllerEvent::Unload(self.clone()));

        // an activate that arrived during teardown
        if self.inner.wanted.get()
            && self.inner.state.get() == ModuleState::Unloaded
            && !self.inner.destroyed.get()
        {
            self.begin_load();
        }
    }

    /// Call `method` on the live module. Never fails for an inactive module;
    /// check the returned status instead.
    ///
    /// The instance is taken out of its slot for the duration of the call, so
    /// the method may deactivate or destroy its own controller. When that
    /// happens the instance is torn down as soon as the method returns.
    pub fn execute(&self, method: &str, params: &[Value]) -> ExecuteResult {
        if !self.is_active() {
            return ExecuteResult::not_active();
        }
        let taken = self.inner.module.borrow_mut().take();
        let Some(mut module) = taken else {
            // loaded with an empty slot: a call is already running
            return ExecuteResult::error(ExecuteStatus::Failed, "module is busy");
        };
        let instance = self.inner.instantiations.get();

        let outcome = module.execute(method, params);

        let still_live = self.inner.state.get() == ModuleState::Loaded
            && self.inner.instantiations.get() == instance;
        if still_live {
            *self.inner.module.borrow_mut() = Some(module);
        } else {
            log::debug!(
                "Module '{}' released on '{}' after '{}' returned",
                self.path(),
                self.inner.subject.id(),
                method
            );
            module.unload();
        }

        match outcome {
            Ok(value) => ExecuteResult::ok(value),
            Err(err @ ModuleError::MethodNotFound(_)) => {
                ExecuteResult::error(ExecuteStatus::MethodNotFound, err.to_string())
            }
            Err(err @ ModuleError::Failed(_)) => {
                ExecuteResult::error(ExecuteStatus::Failed, err.to_string())
            }
        }
    }

    /// Destroy the agent and unload the module if it is loaded.
    /// A resolution still in flight is discarded when it completes.
    pub fn destroy(&self) {
        if self.inner.destroyed.replace(true) {
            log::warn!("Module controller for '{}' destroyed twice", self.path());
            return;
        }
        self.inner.wanted.set(false);

        let agent = self.inner.agent.borrow_mut().take();
        if let Some(agent) = agent {
            agent.destroy();
        }

        if self.inner.state.get() == ModuleState::Loaded {
            self.unload();
        }
        self.inner.events.clear();
    }
}

impl fmt::Debug for ModuleController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleController")
            .field("path", &self.inner.path)
            .field("subject", &self.inner.subject.id())
            .field("state", &self.inner.state.get())
            .finish()
    }
}
