// SPDX-License-Identifier: MIT

//! Module agents decide when a module controller loads and unloads
//!
//! - `Static` allows activation from the start and never revokes it
//! - `Condition` follows a tester bound to the controller's subject

use super::types::ActivationKind;
use crate::condition::{Expression, TestFactory, Tester};
use crate::error::Result;
use crate::subject::SubjectRef;
use std::rc::Rc;

pub struct ConditionAgent {
    tester: Tester,
}

impl ConditionAgent {
    /// Binds a tester to `subject`; `on_change` receives every flip of the condition
    pub fn new(
        expression: Rc<Expression>,
        subject: &SubjectRef,
        tests: &TestFactory,
        on_change: impl Fn(bool) + 'static,
    ) -> Result<Self> {
        let tester = Tester::new(expression, subject, tests)?;
        tester.on_change(on_change);
        Ok(Self { tester })
    }

    pub fn tester(&self) -> &Tester {
        &self.tester
    }
}

pub enum ModuleAgent {
    Static,
    Condition(ConditionAgent),
}

impl ModuleAgent {
    /// Picks the agent variant for an optional condition
    pub fn build(
        expression: Option<Rc<Expression>>,
        subject: &SubjectRef,
        tests: &TestFactory,
        on_change: impl Fn(bool) + 'static,
    ) -> Result<Self> {
        match expression {
            None => Ok(ModuleAgent::Static),
            Some(expression) => Ok(ModuleAgent::Condition(ConditionAgent::new(
                expression, subject, tests, on_change,
            )?)),
        }
    }

    pub fn kind(&self) -> ActivationKind {
        match self {
            ModuleAgent::Static => ActivationKind::Static,
            ModuleAgent::Condition(_) => ActivationKind::Conditional,
        }
    }

    /// Whether the module should currently be loaded
    pub fn allows_activation(&self) -> bool {
        match self {
            ModuleAgent::Static => true,
            ModuleAgent::Condition(agent) => agent.tester.value().unwrap_or(false),
        }
    }

    pub fn destroy(&self) {
        if let ModuleAgent::Condition(agent) = self {
            agent.tester.destroy();
        }
    }
}
