//! Evaluation contexts.
//!
//! A context lives for exactly one rule firing or one action execution. It
//! carries the `this` entity, the old-value map for `CHANGED`, the variable
//! environment, the graph driver handle for `EXISTS`, and the firing's frozen
//! timestamp.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::entity::{Entity, PropertyMap};
use crate::dsl::ast::PathExpr;
use crate::graph::GraphDriver;
use crate::value::Value;

/// A variable binding: either an entity (loop variables, `this`) or a scalar
/// (action parameters).
#[derive(Debug, Clone)]
pub enum Binding {
    /// An entity snapshot bound by a `FOR` clause or `TRIGGER` target.
    Entity(Entity),
    /// A scalar value bound by an action parameter.
    Scalar(Value),
}

/// Context for evaluating expressions during one firing.
#[derive(Clone)]
pub struct EvaluationContext {
    /// The current entity (`this`).
    pub this: Entity,
    /// Previous values for the triggering property (`CHANGED`, `OLD`).
    pub old_values: PropertyMap,
    /// The firing's frozen wall-clock instant; every `NOW()` in one firing
    /// observes this value.
    pub now: DateTime<Utc>,
    driver: Option<Arc<dyn GraphDriver>>,
    bindings: HashMap<String, Binding>,
}

impl std::fmt::Debug for EvaluationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvaluationContext")
            .field("this", &self.this)
            .field("old_values", &self.old_values)
            .field("now", &self.now)
            .field("bindings", &self.bindings.keys())
            .finish_non_exhaustive()
    }
}

impl EvaluationContext {
    /// Creates a context for the given entity, freezing `now` at call time.
    #[must_use]
    pub fn new(this: Entity) -> Self {
        Self {
            this,
            old_values: PropertyMap::new(),
            now: Utc::now(),
            driver: None,
            bindings: HashMap::new(),
        }
    }

    /// Attaches the graph driver used by `EXISTS` patterns.
    #[must_use]
    pub fn with_driver(mut self, driver: Arc<dyn GraphDriver>) -> Self {
        self.driver = Some(driver);
        self
    }

    /// Sets the old-value map consulted by `CHANGED`.
    #[must_use]
    pub fn with_old_values(mut self, old_values: PropertyMap) -> Self {
        self.old_values = old_values;
        self
    }

    /// Overrides the frozen timestamp (the engine freezes one per firing).
    #[must_use]
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    /// Binds a loop variable to an entity snapshot.
    pub fn bind_entity(&mut self, name: impl Into<String>, entity: Entity) {
        self.bindings.insert(name.into(), Binding::Entity(entity));
    }

    /// Binds an action parameter to a scalar value.
    pub fn bind_scalar(&mut self, name: impl Into<String>, value: Value) {
        self.bindings.insert(name.into(), Binding::Scalar(value));
    }

    /// The graph driver, when one is attached.
    #[must_use]
    pub fn driver(&self) -> Option<&Arc<dyn GraphDriver>> {
        self.driver.as_ref()
    }

    /// Looks up an entity binding; `this` resolves to the current entity.
    #[must_use]
    pub fn entity(&self, name: &str) -> Option<&Entity> {
        if name == "this" {
            return Some(&self.this);
        }
        match self.bindings.get(name) {
            Some(Binding::Entity(entity)) => Some(entity),
            _ => None,
        }
    }

    /// All entity bindings currently in scope (excluding `this`).
    pub fn entity_bindings(&self) -> impl Iterator<Item = (&str, &Entity)> {
        self.bindings.iter().filter_map(|(name, binding)| match binding {
            Binding::Entity(entity) => Some((name.as_str(), entity)),
            Binding::Scalar(_) => None,
        })
    }

    /// Replaces an entity binding's snapshot after a write (so later
    /// statements observe the new value). `this` updates the current entity.
    pub fn refresh_entity(&mut self, name: &str, property: &str, value: Value) {
        if name == "this" {
            self.this.set_property(property, value);
            return;
        }
        if let Some(Binding::Entity(entity)) = self.bindings.get_mut(name) {
            entity.set_property(property, value);
        }
    }

    /// Resolves a dotted path against the environment.
    ///
    /// `this.X` reads the current entity; `v.X` reads the entity bound to
    /// `v`; a bare name reads a scalar binding. Unresolved paths yield null,
    /// never an error.
    #[must_use]
    pub fn resolve_path(&self, path: &PathExpr) -> Value {
        let head = path.head();

        if path.segments.len() == 1 {
            return match self.bindings.get(head) {
                Some(Binding::Scalar(value)) => value.clone(),
                _ => Value::Null,
            };
        }

        let entity = match self.entity(head) {
            Some(entity) => entity,
            None => return Value::Null,
        };

        // Properties hold scalars; any navigation past one segment is null.
        if path.segments.len() > 2 {
            return Value::Null;
        }
        entity.property(&path.segments[1])
    }

    /// The old value recorded for a property, when the firing knows one.
    #[must_use]
    pub fn old_value(&self, property: &str) -> Option<&Value> {
        self.old_values.get(property)
    }
}
