// SPDX-License-Identifier: MIT

//! Condition evaluation
//!
//! Conditions are boolean expressions over named tests:
//! - `media:{(min-width:40em)}`
//! - `connection:{any} and not pointer:{coarse}`
//! - `(a or b) and not c`

mod ast;
pub mod formatter;
mod parser;
mod tester;

pub use ast::{Expression, Leaf};
pub use parser::{parse, MAX_DEPTH};
pub use test::{ChangeNotifier, Subscription, Test, TestConstructor, TestFactory};
pub use tester::{Tester, TesterEvent, TesterTopic};
