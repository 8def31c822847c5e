// SPDX-License-Identifier: MIT

//! Module loader - builds node controllers for subjects and owns them
//!
//! Nodes are kept in activation order: higher priority first, ties in
//! discovery order. Building a node is all-or-nothing; a subject whose
//! configuration, conditions or tests are broken is reported and skipped
//! without affecting the rest of the batch.

use crate::condition::{self, Expression, TestFactory};
use crate::config::{AttributeConfigReader, ConfigReader};
use crate::error::{ConditionerError, Result};
use crate::module::{
    merge_options, ModuleController, ModuleRegistry, ModuleResolver, ModuleSetup, ModuleSpec,
    NodeConfig,
};
use crate::node::{NodeController, NodeExecuteResult};
use crate::subject::{SubjectId, SubjectRef, SubjectSource};
use crate::sync::{SyncMember, SyncedControllerGroup};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

/// Outcome of a [`ModuleLoader::parse`] batch
#[derive(Debug, Default)]
pub struct ParseReport {
    /// New nodes in activation order
    pub created: Vec<NodeController>,
    pub failed: Vec<(SubjectId, ConditionerError)>,
    /// Subjects already processed or already owned by this loader
    pub skipped: usize,
}

impl ParseReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct ModuleLoader {
    registry: ModuleRegistry,
    tests: TestFactory,
    resolver: Rc<dyn ModuleResolver>,
    config_reader: Box<dyn ConfigReader>,
    nodes: RefCell<Vec<NodeController>>,
    expressions: RefCell<HashMap<String, Rc<Expression>>>,
}

impl ModuleLoader {
    pub fn new(registry: ModuleRegistry, tests: TestFactory, resolver: Rc<dyn ModuleResolver>) -> Self {
        Self {
            registry,
            tests,
            resolver,
            config_reader: Box::new(AttributeConfigReader::new()),
            nodes: RefCell::new(Vec::new()),
            expressions: RefCell::new(HashMap::new()),
        }
    }

    pub fn with_config_reader(mut self, reader: impl ConfigReader + 'static) -> Self {
        self.config_reader = Box::new(reader);
        self
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    pub fn tests(&self) -> &TestFactory {
        &self.tests
    }

    /// Discover subjects through `source` and parse them
    pub fn parse_source(&self, source: &dyn SubjectSource, selector: Option<&str>) -> ParseReport {
        self.parse(&source.discover(selector))
    }

    /// Build a node controller for every new subject in `subjects`.
    ///
    /// Must run inside a `LocalSet`; modules start resolving right away.
    pub fn parse(&self, subjects: &[SubjectRef]) -> ParseReport {
        let mut report = ParseReport::default();
        let mut seen = HashSet::new();
        let mut pending: Vec<(SubjectRef, NodeConfig)> = Vec::new();

        for subject in subjects {
            let id = subject.id();
            if subject.is_processed() || self.contains(&id) || !seen.insert(id.clone()) {
                report.skipped += 1;
                continue;
            }
            match self.config_reader.read(subject.as_ref()) {
                Ok(config) => pending.push((subject.clone(), config)),
                Err(err) => {
                    log::warn!("Skipping subject '{}': {}", id, err);
                    report.failed.push((id, err));
                }
            }
        }

        // stable: equal priorities keep discovery order
        pending.sort_by(|a, b| b.1.priority.cmp(&a.1.priority));

        for (subject, config) in pending {
            match self.build_node(&subject, config) {
                Ok(node) => {
                    self.insert(node.clone());
                    report.created.push(node);
                }
                Err(err) => {
                    log::warn!("Skipping subject '{}': {}", subject.id(), err);
                    report.failed.push((subject.id(), err));
                }
            }
        }

        log::info!(
            "Parsed {} subject(s): {} created, {} failed, {} skipped",
            subjects.len(),
            report.created.len(),
            report.failed.len(),
            report.skipped
        );
        report
    }

    fn build_node(&self, subject: &SubjectRef, config: NodeConfig) -> Result<NodeController> {
        // every fallible lookup happens before any controller exists
        let setups = config
            .modules
            .iter()
            .map(|spec| self.plan_module(subject, spec))
            .collect::<Result<Vec<_>>>()?;

        let mut controllers = Vec::with_capacity(setups.len());
        for setup in setups {
            match ModuleController::new(setup) {
                Ok(controller) => controllers.push(controller),
                Err(err) => {
                    for built in &controllers {
                        built.destroy();
                    }
                    return Err(err);
                }
            }
        }

        NodeController::new(subject.clone(), config.priority, controllers)
    }

    fn plan_module(&self, subject: &SubjectRef, spec: &ModuleSpec) -> Result<ModuleSetup> {
        let descriptor = self.registry.get(&spec.path);

        let (path, alias, defaults, default_conditions) = match descriptor {
            Some(d) => (d.path, d.alias, d.options, d.conditions),
            None => (spec.path.clone(), None, Value::Null, None),
        };

        let conditions = spec
            .conditions
            .clone()
            .filter(|c| !c.trim().is_empty())
            .or(default_conditions.filter(|c| !c.trim().is_empty()));
        let condition = match conditions {
            Some(c) => Some(self.expression(&c)?),
            None => None,
        };

        Ok(ModuleSetup {
            path,
            alias,
            subject: subject.clone(),
            options: merge_options(&defaults, &spec.options),
            condition,
            tests: self.tests.clone(),
            resolver: self.resolver.clone(),
        })
    }

    /// Parse `source` once and share the tree between testers
    fn expression(&self, source: &str) -> Result<Rc<Expression>> {
        if let Some(expression) = self.expressions.borrow().get(source) {
            return Ok(expression.clone());
        }
        let expression = Rc::new(condition::parse(source)?);
        self.expressions
            .borrow_mut()
            .insert(source.to_string(), expression.clone());
        Ok(expression)
    }

    fn insert(&self, node: NodeController) {
        let mut nodes = self.nodes.borrow_mut();
        let at = nodes
            .iter()
            .position(|n| n.priority() < node.priority())
            .unwrap_or(nodes.len());
        nodes.insert(at, node);
    }

    fn contains(&self, id: &SubjectId) -> bool {
        self.nodes.borrow().iter().any(|n| n.subject_id() == id)
    }

    /// Build a synced group over `members`
    pub fn sync(&self, members: Vec<SyncMember>) -> Result<SyncedControllerGroup> {
        SyncedControllerGroup::new(members)
    }

    /// Destroy the node owning `id`. Returns false when there is none.
    pub fn destroy(&self, id: &SubjectId) -> bool {
        let node = {
            let mut nodes = self.nodes.borrow_mut();
            match nodes.iter().position(|n| n.subject_id() == id) {
                Some(at) => nodes.remove(at),
                None => return false,
            }
        };
        node.destroy();
        true
    }

    pub fn destroy_all(&self) {
        let nodes = std::mem::take(&mut *self.nodes.borrow_mut());
        for node in nodes {
            node.destroy();
        }
    }

    pub fn node_controller(&self, id: &SubjectId) -> Option<NodeController> {
        self.nodes
            .borrow()
            .iter()
            .find(|n| n.subject_id() == id)
            .cloned()
    }

    pub fn module_controller(&self, id: &SubjectId, path: &str) -> Option<ModuleController> {
        self.node_controller(id)
            .and_then(|node| node.module_controller(path))
    }

    /// All live nodes in activation order
    pub fn node_controllers(&self) -> Vec<NodeController> {
        self.nodes.borrow().clone()
    }

    /// Run `method` on the modules declared under `path` on subject `id`
    pub fn execute(
        &self,
        id: &SubjectId,
        path: &str,
        method: &str,
        params: &[Value],
    ) -> Vec<NodeExecuteResult> {
        self.node_controller(id)
            .map(|node| node.execute_on(path, method, params))
            .unwrap_or_default()
    }

    pub fn is_module_active(&self, id: &SubjectId, path: &str) -> bool {
        self.node_controller(id)
            .map(|node| node.module_controllers(path).iter().any(|c| c.is_active()))
            .unwrap_or(false)
    }
}
