// SPDX-License-Identifier: MIT

//! Module registry - per-path defaults and activation policy
//!
//! Registry files are YAML:
//!
//! ```yaml
//! modules:
//!   ui/map:
//!     alias: map
//!     conditions: "media:{(min-width:40em)}"
//!     options:
//!       zoom: 10
//! ```

use super::types::ModuleDescriptor;
use crate::condition;
use crate::error::{ConditionerError, Result};
use serde::Deserialize;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::rc::Rc;

#[derive(Debug, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    modules: BTreeMap<String, RegistryEntry>,
}

#[derive(Debug, Deserialize)]
struct RegistryEntry {
    #[serde(default)]
    alias: Option<String>,
    #[serde(default)]
    options: Value,
    #[serde(default)]
    conditions: Option<String>,
}

#[derive(Default)]
struct Entries {
    by_path: HashMap<String, ModuleDescriptor>,
    aliases: HashMap<String, String>,
}

/// Shared registry of module descriptors
#[derive(Clone, Default)]
pub struct ModuleRegistry {
    entries: Rc<RefCell<Entries>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a descriptor, replacing any previous entry for the same path
    pub fn register(&self, descriptor: ModuleDescriptor) {
        let mut entries = self.entries.borrow_mut();
        let previous_alias = entries
            .by_path
            .get(&descriptor.path)
            .and_then(|previous| previous.alias.clone());
        if let Some(alias) = previous_alias {
            entries.aliases.remove(&alias);
        }
        if let Some(alias) = &descriptor.alias {
            entries
                .aliases
                .insert(alias.clone(), descriptor.path.clone());
        }
        entries
            .by_path
            .insert(descriptor.path.clone(), descriptor);
    }

    /// Look a descriptor up by path or alias
    pub fn get(&self, path_or_alias: &str) -> Option<ModuleDescriptor> {
        let entries = self.entries.borrow();
        entries.by_path.get(path_or_alias).cloned().or_else(|| {
            entries
                .aliases
                .get(path_or_alias)
                .and_then(|path| entries.by_path.get(path))
                .cloned()
        })
    }

    /// Canonical path for a path or alias; unknown names map to themselves
    pub fn resolve_path(&self, path_or_alias: &str) -> String {
        self.get(path_or_alias)
            .map(|d| d.path)
            .unwrap_or_else(|| path_or_alias.to_string())
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All descriptors, sorted by path
    pub fn descriptors(&self) -> Vec<ModuleDescriptor> {
        let mut all: Vec<ModuleDescriptor> =
            self.entries.borrow().by_path.values().cloned().collect();
        all.sort_by(|a, b| a.path.cmp(&b.path));
        all
    }

    /// Load a registry from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse a registry from a YAML string, validating every condition
    pub fn from_yaml(content: &str) -> Result<Self> {
        let file: RegistryFile = serde_yaml::from_str(content)?;
        let registry = Self::new();
        for (path, entry) in file.modules {
            if let Some(conditions) = &entry.conditions {
                condition::parse(conditions).map_err(|e| {
                    ConditionerError::config(format!("module '{}': {}", path, e))
                })?;
            }
            registry.register(ModuleDescriptor {
                path,
                alias: entry.alias,
                options: entry.options,
                conditions: entry.conditions,
            });
        }
        Ok(registry)
    }
}
