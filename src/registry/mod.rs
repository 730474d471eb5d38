//! Action and rule registries.
//!
//! Both registries are read-mostly: lookups take a shared lock, registration
//! takes the exclusive lock. They are owned values — the host constructs
//! them, loads DSL into them, and hands them to the engine; nothing here is
//! process-global.

/// Action definitions keyed by `(entity_type, name)`.
pub mod actions;
/// Rule definitions indexed by trigger key.
pub mod rules;

pub use actions::ActionRegistry;
pub use rules::RuleRegistry;
