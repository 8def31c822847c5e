// SPDX-License-Identifier: MIT

//! Conditional module activation for attribute-bearing subjects
//!
//! A condition such as `media:{(min-width:40em)} and not pointer:{coarse}` is
//! parsed once, bound to live tests per subject, and kept in step with the
//! load/unload lifecycle of the module it guards.

pub mod condition;
pub mod config;
pub mod error;
pub mod event;
pub mod loader;
pub mod module;
pub mod node;
pub mod subject;
pub mod sync;

#[cfg(test)]
mod testing;

pub use error::{ConditionerError, LoadError, Result, SyntaxError};
pub use loader::{ModuleLoader, ParseReport};
