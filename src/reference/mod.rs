//! Deferred values.
//!
//! A reference stands for a value that may not be known yet, typically the
//! primary key of a row that is looked up or inserted later. References
//! live in a [`RefArena`] and are addressed by [`RefId`] handles.

pub mod arena;
pub mod condition;

use std::rc::Rc;

pub use arena::{RefArena, RefId};
pub use condition::{Condition, ConditionKey, OneOrMany};

use crate::types::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefEvent {
    /// value was set, `true` when it is now non-null
    Resolved(bool),
    Reset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subscription {
    Keep,
    Detach,
}

pub trait RefObserver {
    fn notify(&self, id: RefId, event: RefEvent) -> Subscription;
}

#[derive(Debug, Clone, PartialEq)]
pub enum RefKind {
    /// value given by the caller
    Static,
    /// value looked up by condition
    Resolvable(Condition),
    /// children values joined by a separator
    Composite {
        children: Vec<RefId>,
        separator: String,
    },
}

pub struct Reference {
    table: String,
    value: Option<Value>,
    kind: RefKind,
    observers: Option<Vec<Rc<dyn RefObserver>>>,
    // composites containing this reference
    composites: Vec<RefId>,
}

impl Reference {
    pub(crate) fn new(table: &str, kind: RefKind) -> Self {
        Self {
            table: table.to_owned(),
            value: None,
            kind,
            observers: None,
            composites: vec![],
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    pub fn is_resolved(&self) -> bool {
        self.value.is_some()
    }

    pub fn kind(&self) -> &RefKind {
        &self.kind
    }

    pub fn condition(&self) -> Option<&Condition> {
        match &self.kind {
            RefKind::Resolvable(condition) => Some(condition),
            _ => None,
        }
    }

    pub fn condition_field(&self) -> Option<OneOrMany<&str>> {
        self.condition().map(|c| c.field())
    }

    pub fn condition_value(&self) -> Option<OneOrMany<&Value>> {
        self.condition().map(|c| c.value())
    }

    pub fn observer_count(&self) -> usize {
        self.observers.as_ref().map_or(0, |o| o.len())
    }
}

impl std::fmt::Debug for Reference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reference")
            .field("table", &self.table)
            .field("value", &self.value)
            .field("kind", &self.kind)
            .field("observers", &self.observer_count())
            .finish()
    }
}
