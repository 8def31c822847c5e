// SPDX-License-Identifier: MIT

//! Modules: registry descriptors, code resolution and per-subject lifecycle

mod agent;
mod controller;
mod registry;
mod resolver;
mod types;

pub use agent::{ConditionAgent, ModuleAgent};
pub use controller::{ControllerEvent, ControllerTopic, ModuleController, ModuleSetup};
pub use registry::ModuleRegistry;
pub use resolver::{Module, ModuleConstructor, ModuleError, ModuleResolver, StaticResolver};
pub use types::{
    merge_options, ActivationKind, ExecuteResult, ExecuteStatus, ModuleDescriptor, ModuleSpec,
    ModuleState, NodeConfig,
};
