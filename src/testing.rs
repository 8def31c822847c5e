// SPDX-License-Identifier: MIT

//! Shared fakes for unit tests

use crate::condition::{ChangeNotifier, Test};
use crate::error::{LoadError, Result};
use crate::module::{Module, ModuleConstructor, ModuleError, ModuleResolver, StaticResolver};
use crate::subject::SubjectRef;
use async_trait::async_trait;
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::future::Future;
use std::rc::Rc;
use tokio::sync::Notify;
use tokio::task::LocalSet;

/// Run `future` inside a `LocalSet` so `spawn_local` is available
pub async fn run_local<F: Future>(future: F) -> F::Output {
    LocalSet::new().run_until(future).await
}

/// Let spawned local tasks run to completion
pub async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

#[derive(Default)]
struct SwitchState {
    value: Cell<bool>,
    notifiers: RefCell<Vec<ChangeNotifier>>,
    created: Cell<usize>,
    destroyed: Cell<usize>,
}

/// A test whose value is flipped by hand. Every instance built from the same
/// switch reads the same value.
#[derive(Clone)]
pub struct Switch {
    state: Rc<SwitchState>,
}

impl Switch {
    pub fn new(value: bool) -> Self {
        let state = SwitchState::default();
        state.value.set(value);
        Self {
            state: Rc::new(state),
        }
    }

    pub fn set(&self, value: bool) {
        self.state.value.set(value);
        let notifiers: Vec<ChangeNotifier> = self
            .state
            .notifiers
            .borrow()
            .iter()
            .filter(|n| n.is_active())
            .cloned()
            .collect();
        for notifier in notifiers {
            notifier.notify();
        }
    }

    pub fn instance(&self) -> SwitchTest {
        self.state.created.set(self.state.created.get() + 1);
        SwitchTest {
            state: self.state.clone(),
        }
    }

    pub fn constructor(
        &self,
    ) -> impl Fn(&SubjectRef, Option<&str>) -> Result<Box<dyn Test>> + 'static {
        let switch = self.clone();
        move |_: &SubjectRef, _: Option<&str>| -> Result<Box<dyn Test>> {
            Ok(Box::new(switch.instance()))
        }
    }

    pub fn created(&self) -> usize {
        self.state.created.get()
    }

    pub fn destroyed(&self) -> usize {
        self.state.destroyed.get()
    }

    /// Instances still set up and listening
    pub fn live(&self) -> usize {
        self.state
            .notifiers
            .borrow()
            .iter()
            .filter(|n| n.is_active())
            .count()
    }
}

pub struct SwitchTest {
    state: Rc<SwitchState>,
}

impl Test for SwitchTest {
    fn setup(&mut self, notifier: ChangeNotifier) {
        self.state.notifiers.borrow_mut().push(notifier);
    }

    fn value(&self) -> bool {
        self.state.value.get()
    }

    fn destroy(&mut self) {
        self.state.destroyed.set(self.state.destroyed.get() + 1);
        self.state.notifiers.borrow_mut().retain(|n| n.is_active());
    }
}

#[derive(Default)]
struct ProbeState {
    constructed: Cell<usize>,
    unloaded: Cell<usize>,
    executed: Cell<usize>,
    fail: Cell<bool>,
    last_options: RefCell<Option<Value>>,
}

/// Module code that records what happens to its instances
#[derive(Clone, Default)]
pub struct Probe {
    state: Rc<ProbeState>,
}

impl Probe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn constructor(&self) -> ProbeConstructor {
        ProbeConstructor {
            state: self.state.clone(),
        }
    }

    pub fn fail_construction(&self, fail: bool) {
        self.state.fail.set(fail);
    }

    pub fn constructed(&self) -> usize {
        self.state.constructed.get()
    }

    pub fn unloaded(&self) -> usize {
        self.state.unloaded.get()
    }

    pub fn executed(&self) -> usize {
        self.state.executed.get()
    }

    pub fn last_options(&self) -> Option<Value> {
        self.state.last_options.borrow().clone()
    }
}

pub struct ProbeConstructor {
    state: Rc<ProbeState>,
}

impl ModuleConstructor for ProbeConstructor {
    fn construct(
        &self,
        subject: &SubjectRef,
        options: &Value,
    ) -> std::result::Result<Box<dyn Module>, LoadError> {
        if self.state.fail.get() {
            return Err(LoadError::new(
                format!("probe@{}", subject.id()),
                "constructor refused",
            ));
        }
        self.state.constructed.set(self.state.constructed.get() + 1);
        *self.state.last_options.borrow_mut() = Some(options.clone());
        Ok(Box::new(ProbeModule {
            state: self.state.clone(),
        }))
    }
}

struct ProbeModule {
    state: Rc<ProbeState>,
}

impl Module for ProbeModule {
    fn unload(&mut self) {
        self.state.unloaded.set(self.state.unloaded.get() + 1);
    }

    fn execute(&mut self, method: &str, params: &[Value]) -> std::result::Result<Value, ModuleError> {
        self.state.executed.set(self.state.executed.get() + 1);
        match method {
            "ping" => {
                let mut reply = vec![Value::from("pong")];
                reply.extend(params.iter().cloned());
                Ok(Value::Array(reply))
            }
            "explode" => Err(ModuleError::Failed("boom".to_string())),
            other => Err(ModuleError::MethodNotFound(other.to_string())),
        }
    }
}

/// Resolver that can hold resolutions until released
#[derive(Clone)]
pub struct GatedResolver {
    inner: StaticResolver,
    open: Rc<Cell<bool>>,
    gate: Rc<Notify>,
    resolutions: Rc<Cell<usize>>,
}

impl GatedResolver {
    pub fn open() -> Self {
        Self {
            inner: StaticResolver::new(),
            open: Rc::new(Cell::new(true)),
            gate: Rc::new(Notify::new()),
            resolutions: Rc::new(Cell::new(0)),
        }
    }

    pub fn register(&self, path: &str, constructor: impl ModuleConstructor + 'static) {
        self.inner.register(path, constructor);
    }

    /// Hold every resolution started from now on
    pub fn close(&self) {
        self.open.set(false);
    }

    pub fn release(&self) {
        self.open.set(true);
        self.gate.notify_waiters();
    }

    pub fn resolutions(&self) -> usize {
        self.resolutions.get()
    }
}

#[async_trait(?Send)]
impl ModuleResolver for GatedResolver {
    async fn resolve(
        &self,
        path: &str,
    ) -> std::result::Result<Rc<dyn ModuleConstructor>, LoadError> {
        self.resolutions.set(self.resolutions.get() + 1);
        while !self.open.get() {
            self.gate.notified().await;
        }
        self.inner.resolve(path).await
    }
}
