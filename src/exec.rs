//! Action execution: preconditions, effects, and persistence.
//!
//! The executor resolves an action, validates the supplied parameters,
//! evaluates preconditions in declaration order (first falsy stops with its
//! declared failure message), then applies the effect block. `this.*` writes
//! accumulate in the result's `changes` mapping and are persisted as one
//! parameterized update per property; writes to loop-bound entities go to
//! the graph immediately. Results are returned, never raised across the
//! boundary.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::context::EvaluationContext;
use crate::dsl::ast::{ActionDef, Stmt};
use crate::emitter::EventEmitter;
use crate::entity::{Entity, PropertyMap};
use crate::error::{EngineError, ErrorKind};
use crate::eval::ExpressionEvaluator;
use crate::event::{Actor, ChangeEvent};
use crate::graph::{write_property, GraphDriver};
use crate::query::{BoundVar, QueryTranslator};
use crate::registry::ActionRegistry;
use crate::value::Value;

/// Result of executing an action. Never raises across the boundary.
#[derive(Debug, Clone, Default)]
pub struct ExecutionResult {
    /// Whether the action executed successfully.
    pub success: bool,
    /// Error message when execution failed.
    pub error: Option<String>,
    /// Taxonomy kind of the failure, when one applies.
    pub error_kind: Option<ErrorKind>,
    /// Property changes applied to the target entity.
    pub changes: PropertyMap,
}

impl ExecutionResult {
    fn ok(changes: PropertyMap) -> Self {
        Self {
            success: true,
            error: None,
            error_kind: None,
            changes,
        }
    }

    fn fail(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
            error_kind: Some(kind),
            changes: PropertyMap::new(),
        }
    }
}

/// Executes action definitions against the graph.
pub struct ActionExecutor {
    registry: Arc<ActionRegistry>,
    driver: Arc<dyn GraphDriver>,
    emitter: Option<Arc<EventEmitter>>,
    translator: QueryTranslator,
    max_depth: u32,
}

impl ActionExecutor {
    /// Creates an executor over a registry and graph driver.
    #[must_use]
    pub fn new(registry: Arc<ActionRegistry>, driver: Arc<dyn GraphDriver>) -> Self {
        Self {
            registry,
            driver,
            emitter: None,
            translator: QueryTranslator::new(),
            max_depth: 10,
        }
    }

    /// Attaches an emitter; events for persisted writes are published on the
    /// direct (host-invoked) path. The rule engine constructs its internal
    /// executor without one and folds changes into its own cascade instead.
    #[must_use]
    pub fn with_emitter(mut self, emitter: Arc<EventEmitter>) -> Self {
        self.emitter = Some(emitter);
        self
    }

    /// Executes an action against an entity snapshot.
    pub async fn execute(
        &self,
        entity_type: &str,
        action_name: &str,
        entity_id: &str,
        properties: PropertyMap,
        params: HashMap<String, Value>,
    ) -> ExecutionResult {
        self.execute_as(entity_type, action_name, entity_id, properties, params, None)
            .await
    }

    /// Executes an action with actor attribution on the emitted events.
    pub async fn execute_as(
        &self,
        entity_type: &str,
        action_name: &str,
        entity_id: &str,
        properties: PropertyMap,
        params: HashMap<String, Value>,
        actor: Option<Actor>,
    ) -> ExecutionResult {
        let (result, events) = self
            .execute_collecting(entity_type, action_name, entity_id, properties, params, 0)
            .await;

        if let Some(emitter) = &self.emitter {
            for event in events {
                let event = match &actor {
                    Some(actor) => event.with_actor(actor.clone()),
                    None => event,
                };
                emitter.emit(&event).await;
            }
        }
        result
    }

    /// Engine entry point: executes and hands back the change events the
    /// effect produced instead of emitting them.
    pub(crate) async fn execute_collecting(
        &self,
        entity_type: &str,
        action_name: &str,
        entity_id: &str,
        properties: PropertyMap,
        params: HashMap<String, Value>,
        depth: u32,
    ) -> (ExecutionResult, Vec<ChangeEvent>) {
        if depth >= self.max_depth {
            warn!(
                action = %format!("{entity_type}.{action_name}"),
                depth,
                "action trigger depth bound hit"
            );
            return (
                ExecutionResult::fail(
                    ErrorKind::CascadeOverflow,
                    format!("action trigger depth {depth} exceeds bound"),
                ),
                Vec::new(),
            );
        }

        let Some(action) = self.registry.lookup(entity_type, action_name) else {
            return (
                ExecutionResult::fail(
                    ErrorKind::ActionNotFound,
                    format!("Action {entity_type}.{action_name} not found"),
                ),
                Vec::new(),
            );
        };

        if let Err(reason) = validate_params(&action, &params) {
            return (
                ExecutionResult::fail(ErrorKind::Semantic, format!("Invalid parameters: {reason}")),
                Vec::new(),
            );
        }

        let entity = Entity {
            id: entity_id.to_string(),
            entity_type: entity_type.to_string(),
            properties,
        };
        let original = entity.clone();

        let mut ctx = EvaluationContext::new(entity).with_driver(Arc::clone(&self.driver));
        for (name, value) in params {
            ctx.bind_scalar(name, value);
        }

        // Preconditions, in declaration order; first falsy stops evaluation.
        for (index, precondition) in action.preconditions.iter().enumerate() {
            let evaluator = ExpressionEvaluator::new(&ctx);
            match evaluator.evaluate_truthy(&precondition.condition).await {
                Ok(true) => {}
                Ok(false) => {
                    debug!(
                        action = %action.qualified_name(),
                        precondition = precondition.label.as_deref().unwrap_or("unnamed"),
                        "precondition failed"
                    );
                    return (
                        ExecutionResult::fail(
                            ErrorKind::PreconditionFailure,
                            precondition.on_failure.clone(),
                        ),
                        Vec::new(),
                    );
                }
                Err(e) => {
                    let label = precondition
                        .label
                        .clone()
                        .unwrap_or_else(|| format!("#{index}"));
                    warn!(
                        action = %action.qualified_name(),
                        precondition = %label,
                        error = %e,
                        "precondition raised"
                    );
                    return (
                        ExecutionResult::fail(ErrorKind::PreconditionError, e.to_string()),
                        Vec::new(),
                    );
                }
            }
        }

        // All preconditions passed; apply the effect.
        let mut changes = PropertyMap::new();
        let mut events = Vec::new();
        if let Err(e) = self
            .apply_statements(&action.effect, &mut ctx, &mut changes, &mut events, depth)
            .await
        {
            warn!(action = %action.qualified_name(), error = %e, "effect failed");
            return (ExecutionResult::fail(e.kind(), e.to_string()), events);
        }

        // Persist this-entity changes, one parameterized update per property.
        for (property, value) in &changes {
            if let Err(e) =
                write_property(&*self.driver, entity_type, entity_id, property, value.clone())
                    .await
            {
                warn!(
                    action = %action.qualified_name(),
                    property = %property,
                    error = %e,
                    "failed to persist change"
                );
                return (ExecutionResult::fail(ErrorKind::GraphIo, e.to_string()), events);
            }
            let old = original.property(property);
            if !crate::eval::equal(&old, value) {
                events.push(ChangeEvent::update(
                    entity_type,
                    entity_id,
                    property.clone(),
                    old,
                    value.clone(),
                ));
            }
        }

        debug!(
            action = %action.qualified_name(),
            entity = entity_id,
            changed = changes.len(),
            "action executed"
        );
        (ExecutionResult::ok(changes), events)
    }

    /// Applies effect statements sequentially, updating the working snapshot
    /// so later expressions observe earlier writes.
    fn apply_statements<'a>(
        &'a self,
        statements: &'a [Stmt],
        ctx: &'a mut EvaluationContext,
        changes: &'a mut PropertyMap,
        events: &'a mut Vec<ChangeEvent>,
        depth: u32,
    ) -> Pin<Box<dyn Future<Output = Result<(), EngineError>> + Send + 'a>> {
        Box::pin(async move {
            for statement in statements {
                match statement {
                    Stmt::Set { target, value } => {
                        let evaluated = {
                            let evaluator = ExpressionEvaluator::new(ctx);
                            evaluator.evaluate(value).await.map_err(EngineError::Eval)?
                        };
                        let Some(property) = target.property().map(str::to_string) else {
                            continue;
                        };
                        if target.is_this() {
                            changes.insert(property.clone(), evaluated.clone());
                            ctx.refresh_entity("this", &property, evaluated);
                        } else {
                            let head = target.head().to_string();
                            let Some(bound) = ctx.entity(&head).cloned() else {
                                return Err(crate::error::ExecutionError::UnboundTarget {
                                    name: head,
                                }
                                .into());
                            };
                            write_property(
                                &*self.driver,
                                &bound.entity_type,
                                &bound.id,
                                &property,
                                evaluated.clone(),
                            )
                            .await?;
                            let old = bound.property(&property);
                            events.push(ChangeEvent::update(
                                bound.entity_type.clone(),
                                bound.id.clone(),
                                property.clone(),
                                old,
                                evaluated.clone(),
                            ));
                            ctx.refresh_entity(&head, &property, evaluated);
                        }
                    }
                    Stmt::Trigger {
                        entity_type,
                        action,
                        target,
                        args,
                    } => {
                        let Some(bound) = ctx.entity(target).cloned() else {
                            return Err(crate::error::ExecutionError::UnboundTarget {
                                name: target.clone(),
                            }
                            .into());
                        };
                        let mut params = HashMap::new();
                        if let Some(args) = args {
                            for (name, expr) in args {
                                let evaluator = ExpressionEvaluator::new(ctx);
                                let value =
                                    evaluator.evaluate(expr).await.map_err(EngineError::Eval)?;
                                params.insert(name.clone(), value);
                            }
                        }
                        let (result, nested_events) = self
                            .execute_collecting(
                                entity_type,
                                action,
                                &bound.id,
                                bound.properties.clone(),
                                params,
                                depth + 1,
                            )
                            .await;
                        events.extend(nested_events);
                        if !result.success {
                            // A failed nested action does not abort the
                            // enclosing effect; it is reported and skipped.
                            warn!(
                                action = %format!("{entity_type}.{action}"),
                                target = %bound.id,
                                error = result.error.as_deref().unwrap_or("unknown"),
                                "triggered action failed"
                            );
                        }
                    }
                    Stmt::For(clause) => {
                        let mut bound_vars =
                            vec![BoundVar::new("this", &ctx.this.entity_type, &ctx.this.id)];
                        for (name, entity) in ctx.entity_bindings() {
                            bound_vars.push(BoundVar::new(name, &entity.entity_type, &entity.id));
                        }
                        let translated = self
                            .translator
                            .translate(clause, &bound_vars)
                            .map_err(EngineError::Translation)?;
                        let rows = self
                            .driver
                            .run(&translated.query, translated.params.clone())
                            .await
                            .map_err(EngineError::Graph)?;
                        for row in rows {
                            let Some(row_entity) = row.get(&clause.variable) else {
                                continue;
                            };
                            let mut scope = ctx.clone();
                            scope.bind_entity(clause.variable.clone(), row_entity.clone());
                            if let Some(residual) = &translated.residual {
                                let evaluator = ExpressionEvaluator::new(&scope);
                                if !evaluator
                                    .evaluate_truthy(residual)
                                    .await
                                    .map_err(EngineError::Eval)?
                                {
                                    continue;
                                }
                            }
                            self.apply_statements(
                                &clause.statements,
                                &mut scope,
                                changes,
                                events,
                                depth,
                            )
                            .await?;
                        }
                    }
                }
            }
            Ok(())
        })
    }
}

fn validate_params(action: &ActionDef, params: &HashMap<String, Value>) -> Result<(), String> {
    for name in params.keys() {
        if !action.parameters.iter().any(|p| &p.name == name) {
            return Err(format!("unknown parameter '{name}'"));
        }
    }
    for declared in &action.parameters {
        if !declared.optional && !params.contains_key(&declared.name) {
            return Err(format!("missing required parameter '{}'", declared.name));
        }
    }
    Ok(())
}
