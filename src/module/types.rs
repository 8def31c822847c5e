// SPDX-License-Identifier: MIT

//! Data types shared by the module registry, controllers and config readers

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// How a module decides when to load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationKind {
    /// No condition; loads as soon as the node is built
    Static,
    /// Tracks a condition expression
    Conditional,
}

impl ActivationKind {
    pub fn for_condition(condition: Option<&str>) -> Self {
        match condition {
            Some(c) if !c.trim().is_empty() => ActivationKind::Conditional,
            _ => ActivationKind::Static,
        }
    }
}

/// Registry entry for a module path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    pub path: String,
    /// Alternative name node configs may use for this module
    #[serde(default)]
    pub alias: Option<String>,
    /// Default options, overridden by per-node options
    #[serde(default)]
    pub options: Value,
    /// Default condition, overridden by a per-node condition
    #[serde(default)]
    pub conditions: Option<String>,
}

impl ModuleDescriptor {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            alias: None,
            options: Value::Null,
            conditions: None,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn with_options(mut self, options: Value) -> Self {
        self.options = options;
        self
    }

    pub fn with_conditions(mut self, conditions: impl Into<String>) -> Self {
        self.conditions = Some(conditions.into());
        self
    }

    pub fn activation_kind(&self) -> ActivationKind {
        ActivationKind::for_condition(self.conditions.as_deref())
    }
}

/// A module declared on a subject
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleSpec {
    /// Module path or registry alias
    pub path: String,
    #[serde(default)]
    pub conditions: Option<String>,
    #[serde(default)]
    pub options: Value,
}

impl ModuleSpec {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            conditions: None,
            options: Value::Null,
        }
    }

    pub fn with_conditions(mut self, conditions: impl Into<String>) -> Self {
        self.conditions = Some(conditions.into());
        self
    }

    pub fn with_options(mut self, options: Value) -> Self {
        self.options = options;
        self
    }
}

/// Everything a subject declares about itself
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NodeConfig {
    /// Higher priorities activate first
    pub priority: i32,
    pub modules: Vec<ModuleSpec>,
}

/// Lifecycle state of a module controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleState {
    Unloaded,
    Loading,
    Loaded,
    Unloading,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecuteStatus {
    Ok,
    /// The module is not loaded; not an error
    NotActive,
    MethodNotFound,
    Failed,
}

/// Envelope returned by `execute`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteResult {
    pub status: ExecuteStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecuteResult {
    pub fn ok(result: Value) -> Self {
        Self {
            status: ExecuteStatus::Ok,
            result: Some(result),
            error: None,
        }
    }

    pub fn not_active() -> Self {
        Self {
            status: ExecuteStatus::NotActive,
            result: None,
            error: None,
        }
    }

    pub fn error(status: ExecuteStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            result: None,
            error: Some(message.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ExecuteStatus::Ok
    }
}

/// Merge per-node options over registry defaults.
///
/// Objects merge key by key, recursively; any other override replaces the
/// default outright. A null override keeps the default.
pub fn merge_options(defaults: &Value, overrides: &Value) -> Value {
    match (defaults, overrides) {
        (_, Value::Null) => defaults.clone(),
        (Value::Object(base), Value::Object(over)) => {
            let mut merged: Map<String, Value> = base.clone();
            for (key, value) in over {
                let next = match merged.get(key) {
                    Some(existing) => merge_options(existing, value),
                    None => value.clone(),
                };
                merged.insert(key.clone(), next);
            }
            Value::Object(merged)
        }
        _ => overrides.clone(),
    }
}
