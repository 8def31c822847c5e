// SPDX-License-Identifier: MIT

//! Subjects are the addressable, attribute-bearing targets modules attach to
//!
//! Discovery and attribute storage belong to the host. The core only needs a
//! stable identity and read/write access to a handful of attributes.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// Set to `"true"` once a node controller has been built for the subject
pub const PROCESSED_ATTR: &str = "data-processed";

/// Comma-joined list of the module paths currently loaded on the subject
pub const INITIALIZED_ATTR: &str = "data-initialized";

/// Stable identity of a subject, used to key node controllers
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubjectId(String);

impl SubjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An external target modules are attached to
pub trait Subject {
    fn id(&self) -> SubjectId;

    fn attribute(&self, name: &str) -> Option<String>;

    fn set_attribute(&self, name: &str, value: &str);

    fn remove_attribute(&self, name: &str);

    fn is_processed(&self) -> bool {
        self.attribute(PROCESSED_ATTR).as_deref() == Some("true")
    }
}

pub type SubjectRef = Rc<dyn Subject>;

/// Host-side discovery of candidate subjects
pub trait SubjectSource {
    /// Returns candidates in discovery order
    fn discover(&self, selector: Option<&str>) -> Vec<SubjectRef>;
}

/// In-memory subject for hosts without a live tree
#[derive(Debug)]
pub struct Element {
    id: SubjectId,
    attributes: RefCell<BTreeMap<String, String>>,
}

impl Element {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: SubjectId::new(id),
            attributes: RefCell::new(BTreeMap::new()),
        }
    }

    pub fn with_attribute(self, name: &str, value: &str) -> Self {
        self.attributes
            .borrow_mut()
            .insert(name.to_string(), value.to_string());
        self
    }

    pub fn into_ref(self) -> SubjectRef {
        Rc::new(self)
    }
}

impl Subject for Element {
    fn id(&self) -> SubjectId {
        self.id.clone()
    }

    fn attribute(&self, name: &str) -> Option<String> {
        self.attributes.borrow().get(name).cloned()
    }

    fn set_attribute(&self, name: &str, value: &str) {
        self.attributes
            .borrow_mut()
            .insert(name.to_string(), value.to_string());
    }

    fn remove_attribute(&self, name: &str) {
        self.attributes.borrow_mut().remove(name);
    }
}

/// A fixed, ordered set of subjects.
///
/// The selector is interpreted as an attribute name: only subjects carrying
/// that attribute are returned.
#[derive(Default, Clone)]
pub struct SubjectList {
    subjects: Vec<SubjectRef>,
}

impl SubjectList {
    pub fn new(subjects: Vec<SubjectRef>) -> Self {
        Self { subjects }
    }

    pub fn push(&mut self, subject: SubjectRef) {
        self.subjects.push(subject);
    }
}

impl SubjectSource for SubjectList {
    fn discover(&self, selector: Option<&str>) -> Vec<SubjectRef> {
        self.subjects
            .iter()
            .filter(|s| selector.map_or(true, |attr| s.attribute(attr).is_some()))
            .cloned()
            .collect()
    }
}
