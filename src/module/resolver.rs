// SPDX-License-Identifier: MIT

//! Module instance contract and module code resolution
//!
//! The host decides how executable module code is obtained. The core only
//! asks a [`ModuleResolver`] for a constructor and never caches the answer,
//! so a rebuilt node resolves its modules again.

use crate::error::LoadError;
use crate::subject::SubjectRef;
use async_trait::async_trait;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use thiserror::Error;

/// Errors a live module may return from `execute`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModuleError {
    #[error("Method '{0}' not found")]
    MethodNotFound(String),

    #[error("{0}")]
    Failed(String),
}

/// A behaviour attached to a subject while its module is loaded
pub trait Module {
    /// Teardown hook, called once when the module unloads
    fn unload(&mut self) {}

    /// Invoke a named method
    fn execute(&mut self, method: &str, _params: &[Value]) -> Result<Value, ModuleError> {
        Err(ModuleError::MethodNotFound(method.to_string()))
    }
}

/// Executable module code: builds instances for a subject
pub trait ModuleConstructor {
    fn construct(&self, subject: &SubjectRef, options: &Value) -> Result<Box<dyn Module>, LoadError>;
}

impl<F> ModuleConstructor for F
where
    F: Fn(&SubjectRef, &Value) -> Result<Box<dyn Module>, LoadError>,
{
    fn construct(&self, subject: &SubjectRef, options: &Value) -> Result<Box<dyn Module>, LoadError> {
        self(subject, options)
    }
}

/// Resolves a module path to its constructor
#[async_trait(?Send)]
pub trait ModuleResolver {
    async fn resolve(&self, path: &str) -> Result<Rc<dyn ModuleConstructor>, LoadError>;
}

/// In-memory resolver backed by a path -> constructor map
#[derive(Clone, Default)]
pub struct StaticResolver {
    constructors: Rc<RefCell<HashMap<String, Rc<dyn ModuleConstructor>>>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, path: &str, constructor: impl ModuleConstructor + 'static) {
        self.constructors
            .borrow_mut()
            .insert(path.to_string(), Rc::new(constructor));
    }

    pub fn contains(&self, path: &str) -> bool {
        self.constructors.borrow().contains_key(path)
    }
}

#[async_trait(?Send)]
impl ModuleResolver for StaticResolver {
    async fn resolve(&self, path: &str) -> Result<Rc<dyn ModuleConstructor>, LoadError> {
        self.constructors
            .borrow()
            .get(path)
            .cloned()
            .ok_or_else(|| LoadError::new(path, "no module registered under this path"))
    }
}
