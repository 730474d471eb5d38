//! The rule registry and trigger index.

use std::cmp::Reverse;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::dsl::ast::{Declaration, RuleDef, Trigger};
use crate::dsl::{parse, parse_file};
use crate::error::{EngineResult, ExecutionError};

#[derive(Debug, Default)]
struct Inner {
    rules: HashMap<String, Arc<RuleDef>>,
    /// Trigger key → rule names in registration order.
    trigger_index: HashMap<String, Vec<String>>,
}

/// Stores rule definitions indexed by trigger key.
///
/// Rule names are unique. Trigger buckets preserve registration order;
/// lookups return rules sorted by descending priority with registration
/// order breaking ties.
#[derive(Debug, Default)]
pub struct RuleRegistry {
    inner: RwLock<Inner>,
}

impl RuleRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one rule definition.
    ///
    /// # Errors
    /// `DuplicateRegistration` when the rule name is already taken.
    pub fn register(&self, rule: RuleDef) -> EngineResult<()> {
        let mut inner = self.inner.write();
        if inner.rules.contains_key(&rule.name) {
            return Err(ExecutionError::DuplicateRegistration {
                name: rule.name.clone(),
            }
            .into());
        }
        let key = rule.trigger.key();
        inner
            .trigger_index
            .entry(key)
            .or_default()
            .push(rule.name.clone());
        inner.rules.insert(rule.name.clone(), Arc::new(rule));
        Ok(())
    }

    /// Looks up a rule by name.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<Arc<RuleDef>> {
        self.inner.read().rules.get(name).cloned()
    }

    /// Rules matching a trigger, highest priority first (stable on ties).
    #[must_use]
    pub fn get_by_trigger(&self, trigger: &Trigger) -> Vec<Arc<RuleDef>> {
        self.rules_for_key(&trigger.key())
    }

    /// Rules in the bucket for a raw trigger key, highest priority first.
    #[must_use]
    pub fn rules_for_key(&self, key: &str) -> Vec<Arc<RuleDef>> {
        let inner = self.inner.read();
        let Some(names) = inner.trigger_index.get(key) else {
            return Vec::new();
        };
        let mut rules: Vec<Arc<RuleDef>> = names
            .iter()
            .filter_map(|name| inner.rules.get(name).cloned())
            .collect();
        // Stable sort keeps registration order within equal priorities.
        rules.sort_by_key(|rule| Reverse(rule.priority));
        rules
    }

    /// All registered rules.
    #[must_use]
    pub fn get_all(&self) -> Vec<Arc<RuleDef>> {
        self.inner.read().rules.values().cloned().collect()
    }

    /// Removes a rule by name. Returns whether it was present.
    pub fn unregister(&self, name: &str) -> bool {
        let mut inner = self.inner.write();
        let Some(rule) = inner.rules.remove(name) else {
            return false;
        };
        let key = rule.trigger.key();
        if let Some(bucket) = inner.trigger_index.get_mut(&key) {
            bucket.retain(|n| n != name);
            if bucket.is_empty() {
                inner.trigger_index.remove(&key);
            }
        }
        true
    }

    /// Removes every registered rule.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.rules.clear();
        inner.trigger_index.clear();
    }

    /// Number of registered rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().rules.len()
    }

    /// True when no rules are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().rules.is_empty()
    }

    /// True when a rule with this name is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.inner.read().rules.contains_key(name)
    }

    /// Parses DSL text and registers the rule declarations it contains.
    ///
    /// Returns everything the text declared (actions included).
    ///
    /// # Errors
    /// Parse errors, and `DuplicateRegistration` against existing entries.
    pub fn load_from_text(&self, text: &str) -> EngineResult<Vec<Declaration>> {
        let declarations = parse(text)?;
        self.register_parsed(&declarations)?;
        Ok(declarations)
    }

    /// Parses a `.dsl` file and registers the rule declarations.
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
            if let Declaration::Rule(rule) = declaration {
                self.register(rule.clone())?;
            }
        }
        Ok(())
    }
}
