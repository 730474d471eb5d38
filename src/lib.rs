//! # Rulegraph - Reactive Rules over a Labeled Property Graph
//!
//! Rulegraph layers an event-driven rule engine over an external graph
//! store. Hosts author two kinds of declarations in a small DSL: **actions**
//! (named operations on an entity with preconditions and effects) and
//! **rules** (event-triggered computations that match graph patterns and
//! apply effects or invoke actions). When the graph mutates, the engine
//! matches rules against the change, evaluates guards against live graph
//! state, and propagates effects under a bounded cascade policy.
//!
//! ## Core Concepts
//!
//! - **Entity**: a typed, identified node snapshot read through the driver
//! - **Trigger**: the declared shape of an event a rule reacts to
//! - **Firing**: one matched execution of one rule against one event
//! - **Cascade**: the transitive closure of firings from one top-level event
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use rulegraph::{ActionRegistry, ChangeEvent, EventEmitter, RuleEngine, RuleRegistry, Value};
//!
//! let actions = Arc::new(ActionRegistry::new());
//! let rules = Arc::new(RuleRegistry::new());
//! rules.load_from_file("rules/supplier_blocking.dsl")?;
//!
//! let engine = Arc::new(RuleEngine::new(actions, rules, driver));
//! let emitter = EventEmitter::new();
//! emitter.subscribe(engine.clone());
//!
//! // The host's mutation layer reports every observed property change.
//! emitter.emit(&ChangeEvent::update(
//!     "Supplier", "BP_10001", "status",
//!     Value::String("Active".into()),
//!     Value::String("Suspended".into()),
//! )).await;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod entity;
pub mod error;
pub mod event;
pub mod value;

// Language: tokens, AST, parser
pub mod dsl;

// Evaluation pipeline
pub mod builtins;
pub mod context;
pub mod eval;
pub mod query;

// Registries, execution, and dispatch
pub mod emitter;
pub mod engine;
pub mod exec;
pub mod graph;
pub mod registry;

// Re-export primary types at crate root for convenience
pub use context::EvaluationContext;
pub use dsl::{parse, parse_file, ActionDef, Declaration, ForClause, RuleDef, Stmt, Trigger};
pub use emitter::{EventEmitter, EventSubscriber, SubscriberId};
pub use engine::{
    CancelToken, DiagnosticsSink, EngineConfig, FiringReport, FiringState, RuleEngine,
};
pub use entity::{Entity, PropertyMap};
pub use error::{EngineError, EngineResult, ErrorKind};
pub use eval::ExpressionEvaluator;
pub use event::{Actor, ActorKind, ChangeEvent, TriggerKind};
pub use exec::{ActionExecutor, ExecutionResult};
pub use graph::{GraphDriver, ResultRow};
pub use query::{BoundVar, QueryTranslator, TranslatedQuery};
pub use registry::{ActionRegistry, RuleRegistry};
pub use value::Value;
