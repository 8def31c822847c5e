// SPDX-License-Identifier: MIT

//! Reading a subject's module declarations
//!
//! The default reader understands two attribute layouts:
//!
//! ```text
//! data-module="ui/map" data-conditions="media:{(min-width:40em)}" data-options='{"zoom":3}'
//! data-modules='[{"path":"ui/map","conditions":"online"},{"path":"ui/clock"}]'
//! ```
//!
//! plus an optional `data-priority` integer.

use crate::error::{ConditionerError, Result};
use crate::module::{ModuleSpec, NodeConfig};
use crate::subject::Subject;
use serde_json::Value;

pub const MODULE_ATTR: &str = "data-module";
pub const MODULES_ATTR: &str = "data-modules";
pub const CONDITIONS_ATTR: &str = "data-conditions";
pub const OPTIONS_ATTR: &str = "data-options";
pub const PRIORITY_ATTR: &str = "data-priority";

/// Turns a subject's declarations into a [`NodeConfig`]
pub trait ConfigReader {
    fn read(&self, subject: &dyn Subject) -> Result<NodeConfig>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AttributeConfigReader;

impl AttributeConfigReader {
    pub fn new() -> Self {
        Self
    }

    fn priority(subject: &dyn Subject) -> Result<i32> {
        match subject.attribute(PRIORITY_ATTR) {
            None => Ok(0),
            Some(raw) => raw.trim().parse().map_err(|_| {
                ConditionerError::config(format!(
                    "subject '{}': {} must be an integer, got '{}'",
                    subject.id(),
                    PRIORITY_ATTR,
                    raw
                ))
            }),
        }
    }

    fn single(subject: &dyn Subject, path: String) -> Result<ModuleSpec> {
        let mut spec = ModuleSpec::new(path);
        if let Some(conditions) = subject.attribute(CONDITIONS_ATTR) {
            if !conditions.trim().is_empty() {
                spec = spec.with_conditions(conditions);
            }
        }
        if let Some(raw) = subject.attribute(OPTIONS_ATTR) {
            let options: Value = serde_json::from_str(&raw).map_err(|e| {
                ConditionerError::config(format!(
                    "subject '{}': invalid {}: {}",
                    subject.id(),
                    OPTIONS_ATTR,
                    e
                ))
            })?;
            spec = spec.with_options(options);
        }
        Ok(spec)
    }

    fn list(subject: &dyn Subject, raw: &str) -> Result<Vec<ModuleSpec>> {
        serde_json::from_str(raw).map_err(|e| {
            ConditionerError::config(format!(
                "subject '{}': invalid {}: {}",
                subject.id(),
                MODULES_ATTR,
                e
            ))
        })
    }
}

impl ConfigReader for AttributeConfigReader {
    fn read(&self, subject: &dyn Subject) -> Result<NodeConfig> {
        let priority = Self::priority(subject)?;

        let modules = match (subject.attribute(MODULES_ATTR), subject.attribute(MODULE_ATTR)) {
            (Some(raw), single) => {
                if single.is_some() {
                    log::warn!(
                        "Subject '{}' declares both {} and {}; using {}",
                        subject.id(),
                        MODULES_ATTR,
                        MODULE_ATTR,
                        MODULES_ATTR
                    );
                }
                Self::list(subject, &raw)?
            }
            (None, Some(path)) if !path.trim().is_empty() => {
                vec![Self::single(subject, path.trim().to_string())?]
            }
            _ => Vec::new(),
        };

        if modules.is_empty() {
            return Err(ConditionerError::config(format!(
                "subject '{}' declares no modules",
                subject.id()
            )));
        }
        Ok(NodeConfig { priority, modules })
    }
}
