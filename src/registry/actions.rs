//! The action registry.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::dsl::ast::{ActionDef, Declaration};
use crate::dsl::{parse, parse_file};
use crate::error::{EngineResult, ExecutionError};

/// Stores action definitions keyed by `(entity_type, action_name)`.
///
/// Action names are unique per entity type; registering a duplicate is an
/// error rather than a silent replacement.
#[derive(Debug, Default)]
pub struct ActionRegistry {
    actions: RwLock<HashMap<String, Arc<ActionDef>>>,
}

impl ActionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one action definition.
    ///
    /// # Errors
    /// `DuplicateRegistration` when `(entity_type, name)` is already taken.
    pub fn register(&self, action: ActionDef) -> EngineResult<()> {
        let key = action.qualified_name();
        let mut actions = self.actions.write();
        if actions.contains_key(&key) {
            return Err(ExecutionError::DuplicateRegistration { name: key }.into());
        }
        actions.insert(key, Arc::new(action));
        Ok(())
    }

    /// Looks up an action by entity type and name.
    #[must_use]
    pub fn lookup(&self, entity_type: &str, name: &str) -> Option<Arc<ActionDef>> {
        self.actions
            .read()
            .get(&format!("{entity_type}.{name}"))
            .cloned()
    }

    /// All actions declared for one entity type.
    #[must_use]
    pub fn list_by_entity(&self, entity_type: &str) -> Vec<Arc<ActionDef>> {
        self.actions
            .read()
            .values()
            .filter(|action| action.entity_type == entity_type)
            .cloned()
            .collect()
    }

    /// All registered actions.
    #[must_use]
    pub fn get_all(&self) -> Vec<Arc<ActionDef>> {
        self.actions.read().values().cloned().collect()
    }

    /// Removes an action. Returns whether it was present.
    pub fn unregister(&self, entity_type: &str, name: &str) -> bool {
        self.actions
            .write()
            .remove(&format!("{entity_type}.{name}"))
            .is_some()
    }

    /// Removes every registered action.
    pub fn clear(&self) {
        self.actions.write().clear();
    }

    /// Number of registered actions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.read().len()
    }

    /// True when no actions are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.read().is_empty()
    }

    /// True when `(entity_type, name)` is registered.
    #[must_use]
    pub fn contains(&self, entity_type: &str, name: &str) -> bool {
        self.actions
            .read()
            .contains_key(&format!("{entity_type}.{name}"))
    }

    /// Parses DSL text and registers the action declarations it contains.
    ///
    /// Returns everything the text declared (rules included) so callers can
    /// feed the remainder to the rule registry.
    ///
    /// # Errors
    /// Parse errors, and `DuplicateRegistration` against existing entries.
    pub fn load_from_text(&self, text: &str) -> EngineResult<Vec<Declaration>> {
        let declarations = parse(text)?;
        self.register_parsed(&declarations)?;
        Ok(declarations)
    }

    /// Parses a `.dsl` file and registers the action declarations.
    ///
    /// # Errors
    /// As [`load_from_text`](Self::load_from_text), plus I/O failures.
    pub fn load_from_file(&self, path: impl AsRef<Path>) -> EngineResult<Vec<Declaration>> {
        let declarations = parse_file(path)?;
        self.register_parsed(&declarations)?;
        Ok(declarations)
    }

    fn register_parsed(&self, declarations: &[Declaration]) -> EngineResult<()> {
        for declaration in declarations {
            if let Declaration::Action(action) = declaration {
                self.register(action.clone())?;
            }
        }
        Ok(())
    }
}
