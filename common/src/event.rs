use serde::{Deserialize, Serialize};
use std::fmt;

use crate::call::Value;

/// A runtime event as read back from a block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEvent {
    pub module: String,
    pub name: String,
    /// Index of the emitting extrinsic; `None` for block initialization and
    /// finalization events.
    pub extrinsic_index: Option<u32>,
    pub fields: Vec<(String, Value)>,
}

impl LedgerEvent {
    pub fn new(module: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            name: name.into(),
            extrinsic_index: None,
            fields: Vec::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    pub fn at_extrinsic(mut self, index: u32) -> Self {
        self.extrinsic_index = Some(index);
        self
    }

    pub fn is(&self, module: &str, name: &str) -> bool {
        self.module == module && self.name == name
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }
}

impl fmt::Display for LedgerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}{{", self.module, self.name)?;
        for (i, (name, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", name, value)?;
        }
        write!(f, "}}")
    }
}

/// Predicate over events: module and name must be equal, and every listed
/// field must be present with an equal value. Unlisted fields are ignored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventMatcher {
    module: String,
    name: String,
    fields: Vec<(String, Value)>,
}

impl EventMatcher {
    pub fn new(module: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            name: name.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    pub fn matches(&self, event: &LedgerEvent) -> bool {
        event.is(&self.module, &self.name)
            && self
                .fields
                .iter()
                .all(|(name, expected)| event.field(name) == Some(expected))
    }
}

impl fmt::Display for EventMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.module, self.name)?;
        if !self.fields.is_empty() {
            let fields: Vec<String> = self
                .fields
                .iter()
                .map(|(name, value)| format!("{}: {}", name, value))
                .collect();
            write!(f, "{{{}}}", fields.join(", "))?;
        }
        Ok(())
    }
}
