//! Binding schemas
//!
//! A `ToolBinder` declares one callable operation: its name, input and
//! output contracts, and whether an implementation is optional.

use rsc_core::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;

/// Schema for one callable remote operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolBinder {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
    #[serde(rename = "outputSchema", default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
    #[serde(default)]
    pub optional: bool,
}

/// Wire form of a bound tool, as listed by `GET /tools`
pub type ToolDefinition = ToolBinder;

impl ToolBinder {
    /// A required binder accepting any object
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            input_schema: json!({"type": "object"}),
            output_schema: None,
            optional: false,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn input(mut self, schema: Value) -> Self {
        self.input_schema = schema;
        self
    }

    pub fn output(mut self, schema: Value) -> Self {
        self.output_schema = Some(schema);
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

/// Ordered set of binders with unique names
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<ToolBinder>", into = "Vec<ToolBinder>")]
pub struct BinderSet {
    binders: Vec<ToolBinder>,
}

impl BinderSet {
    /// Build a set, rejecting duplicate names
    pub fn new(binders: Vec<ToolBinder>) -> Result<Self> {
        let mut seen = HashSet::new();
        for binder in &binders {
            if binder.name.trim().is_empty() {
                return Err(Error::construction("Binder name must not be empty"));
            }
            if !seen.insert(binder.name.as_str()) {
                return Err(Error::construction(format!(
                    "Duplicate binder name: {}",
                    binder.name
                )));
            }
        }
        Ok(Self { binders })
    }

    /// Union of two sets; names must stay unique
    pub fn merge(mut self, other: BinderSet) -> Result<Self> {
        self.binders.extend(other.binders);
        Self::new(self.binders)
    }

    pub fn get(&self, name: &str) -> Option<&ToolBinder> {
        self.binders.iter().find(|b| b.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ToolBinder> {
        self.binders.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.binders.iter().map(|b| b.name.as_str())
    }

    /// Names of every non-optional binder
    pub fn required_names(&self) -> impl Iterator<Item = &str> {
        self.binders
            .iter()
            .filter(|b| !b.optional)
            .map(|b| b.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.binders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.binders.is_empty()
    }
}

impl TryFrom<Vec<ToolBinder>> for BinderSet {
    type Error = Error;

    fn try_from(binders: Vec<ToolBinder>) -> Result<Self> {
        Self::new(binders)
    }
}

impl From<BinderSet> for Vec<ToolBinder> {
    fn from(set: BinderSet) -> Self {
        set.binders
    }
}
