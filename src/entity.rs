//! Entity snapshots.
//!
//! The graph store owns entities; the engine only ever sees snapshots — an
//! id, a type label, and a property map — read through the graph driver at
//! the start of a firing or returned as query result rows.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Property name → value mapping.
pub type PropertyMap = HashMap<String, Value>;

/// A snapshot of one graph entity.
///
/// `id` is the stable external identifier (e.g. `"BP_10001"`); `entity_type`
/// is the node label the graph indexes on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Stable external identifier.
    pub id: String,
    /// Type label.
    pub entity_type: String,
    /// Current property values.
    pub properties: PropertyMap,
}

impl Entity {
    /// Creates a snapshot with no properties.
    #[must_use]
    pub fn new(id: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            entity_type: entity_type.into(),
            properties: PropertyMap::new(),
        }
    }

    /// Builder-style property insertion, mainly for tests and fixtures.
    #[must_use]
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Reads a property; absent properties read as null.
    #[must_use]
    pub fn property(&self, name: &str) -> Value {
        self.properties.get(name).cloned().unwrap_or(Value::Null)
    }

    /// Writes a property, returning the previous value (null if absent).
    pub fn set_property(&mut self, name: impl Into<String>, value: Value) -> Value {
        self.properties
            .insert(name.into(), value)
            .unwrap_or(Value::Null)
    }
}
