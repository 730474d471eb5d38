//! The rule engine core.
//!
//! The engine consumes change events, matches rules through the trigger
//! index, compiles their `FOR` clauses to graph queries, and executes the
//! matched bodies. Writes performed by rule statements become synthetic
//! change events that fold back into the same cascade, bounded by depth and
//! queue size. All cascade bookkeeping is firing-scoped state threaded
//! through the recursion; the engine itself holds none.

use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, trace, warn};

use crate::context::EvaluationContext;
use crate::dsl::ast::{Declaration, RuleDef, Stmt};
use crate::emitter::EventSubscriber;
use crate::entity::{Entity, PropertyMap};
use crate::error::{EngineError, EngineResult, ErrorKind, ExecutionError};
use crate::eval::ExpressionEvaluator;
use crate::event::{ChangeEvent, TriggerKind};
use crate::exec::ActionExecutor;
use crate::graph::{fetch_entity, write_property, GraphDriver};
use crate::query::{BoundVar, QueryTranslator};
use crate::registry::{ActionRegistry, RuleRegistry};

/// Engine limits.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum cascade depth; events beyond it are dropped.
    pub max_cascade_depth: u32,
    /// Maximum pending events per cascade; enqueues beyond it are dropped.
    pub max_queue: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_cascade_depth: 10,
            max_queue: 256,
        }
    }
}

/// Cooperative cancellation flag for one firing and its cascade.
///
/// Checked at every suspension point (graph I/O, queue pops). In-flight
/// writes are not rolled back; no further statements execute once the token
/// is cancelled.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Creates an un-cancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// True once cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Lifecycle of one rule firing, reported on failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FiringState {
    /// Matched in the trigger index, not yet compiled.
    Pending,
    /// Query compiled and executed.
    Matched,
    /// Processing result row `n`.
    Iterating(usize),
    /// All rows processed.
    Completed,
    /// A statement or the compilation failed.
    Failed,
}

/// Diagnostic record for one firing or action execution.
#[derive(Debug, Clone)]
pub struct FiringReport {
    /// Rule name or qualified action name.
    pub name: String,
    /// Entity the firing targeted.
    pub entity_id: String,
    /// Whether the firing completed.
    pub success: bool,
    /// Taxonomy kind on failure.
    pub error_kind: Option<ErrorKind>,
    /// Failure message, when any.
    pub message: Option<String>,
    /// Cascade depth of the firing.
    pub depth: u32,
}

/// Host-supplied sink for firing reports.
///
/// Rule failures are log-only unless a sink is attached.
pub trait DiagnosticsSink: Send + Sync {
    /// Receives one report.
    fn report(&self, report: &FiringReport);
}

/// Firing-scoped cascade bookkeeping: the FIFO event queue and the visited
/// set. Never shared across firings.
struct CascadeState {
    queue: VecDeque<(ChangeEvent, u32)>,
    /// `(rule, entity, depth)` triples already fired in this cascade.
    visited: HashSet<(String, String, u32)>,
}

impl CascadeState {
    fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            visited: HashSet::new(),
        }
    }
}

/// Event-driven rule engine over a labeled property graph.
pub struct RuleEngine {
    actions: Arc<ActionRegistry>,
    rules: Arc<RuleRegistry>,
    driver: Arc<dyn GraphDriver>,
    executor: ActionExecutor,
    translator: QueryTranslator,
    config: EngineConfig,
    diagnostics: Option<Arc<dyn DiagnosticsSink>>,
}

impl RuleEngine {
    /// Creates an engine over explicit registries and a graph driver.
    ///
    /// The registries are owned values supplied by the host; the engine
    /// holds no process-wide state.
    #[must_use]
    pub fn new(
        actions: Arc<ActionRegistry>,
        rules: Arc<RuleRegistry>,
        driver: Arc<dyn GraphDriver>,
    ) -> Self {
        // The internal executor carries no emitter: cascade events from
        // triggered actions are folded into this engine's own queue instead
        // of fanning out a second time.
        let executor = ActionExecutor::new(Arc::clone(&actions), Arc::clone(&driver));
        Self {
            actions,
            rules,
            driver,
            executor,
            translator: QueryTranslator::new(),
            config: EngineConfig::default(),
            diagnostics: None,
        }
    }

    /// Overrides the default limits.
    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Attaches a diagnostics sink receiving per-firing reports.
    #[must_use]
    pub fn with_diagnostics(mut self, sink: Arc<dyn DiagnosticsSink>) -> Self {
        self.diagnostics = Some(sink);
        self
    }

    /// The action registry this engine dispatches `TRIGGER` statements to.
    #[must_use]
    pub fn actions(&self) -> &Arc<ActionRegistry> {
        &self.actions
    }

    /// The rule registry this engine matches against.
    #[must_use]
    pub fn rules(&self) -> &Arc<RuleRegistry> {
        &self.rules
    }

    /// Loads rule declarations from a `.dsl` file into the rule registry.
    ///
    /// # Errors
    /// Parse and registration errors.
    pub fn load_rules_from_file(
        &self,
        path: impl AsRef<std::path::Path>,
    ) -> EngineResult<Vec<Declaration>> {
        self.rules.load_from_file(path)
    }

    /// Loads rule declarations from DSL text into the rule registry.
    ///
    /// # Errors
    /// Parse and registration errors.
    pub fn load_rules_from_text(&self, text: &str) -> EngineResult<Vec<Declaration>> {
        self.rules.load_from_text(text)
    }

    /// Consumes one change event and drives its cascade to completion.
    pub async fn on_event(&self, event: ChangeEvent) {
        self.on_event_cancellable(event, &CancelToken::new()).await;
    }

    /// As [`on_event`](Self::on_event), with caller-driven cancellation.
    ///
    /// Cancellation is checked before every graph call and at every queue
    /// pop; it propagates to every cascaded firing of this event.
    pub async fn on_event_cancellable(&self, event: ChangeEvent, cancel: &CancelToken) {
        let mut state = CascadeState::new();
        state.queue.push_back((event, 1));

        while let Some((event, depth)) = state.queue.pop_front() {
            if cancel.is_cancelled() {
                debug!(entity = %event.entity_id, "cascade cancelled");
                break;
            }
            if depth > self.config.max_cascade_depth {
                warn!(
                    kind = %ErrorKind::CascadeOverflow,
                    key = %event.trigger_key(),
                    entity = %event.entity_id,
                    depth,
                    "cascade depth bound hit; dropping event"
                );
                continue;
            }
            self.dispatch_event(&event, depth, &mut state, cancel).await;
        }
    }

    /// Fires the priority bucket for one event.
    async fn dispatch_event(
        &self,
        event: &ChangeEvent,
        depth: u32,
        state: &mut CascadeState,
        cancel: &CancelToken,
    ) {
        let key = event.trigger_key();
        let bucket = self.rules.rules_for_key(&key);
        if bucket.is_empty() {
            return;
        }

        let entity = match fetch_entity(&*self.driver, &event.entity_type, &event.entity_id).await
        {
            Ok(Some(entity)) => entity,
            // Lifecycle events (DELETE in particular) can outlive their
            // entity; fire with a bare snapshot so their rules still run.
            Ok(None) if event.kind != TriggerKind::Update => {
                Entity::new(&event.entity_id, &event.entity_type)
            }
            Ok(None) => {
                debug!(key = %key, entity = %event.entity_id, "triggering entity not found");
                return;
            }
            Err(e) => {
                warn!(key = %key, entity = %event.entity_id, error = %e, "snapshot fetch failed");
                return;
            }
        };

        for rule in bucket {
            if cancel.is_cancelled() {
                break;
            }
            let visit = (rule.name.clone(), event.entity_id.clone(), depth);
            if !state.visited.insert(visit) {
                debug!(rule = %rule.name, entity = %event.entity_id, "already fired in this generation");
                continue;
            }
            match self.fire_rule(&rule, event, &entity, depth, state, cancel).await {
                Ok(()) => {
                    self.report(FiringReport {
                        name: rule.name.clone(),
                        entity_id: event.entity_id.clone(),
                        success: true,
                        error_kind: None,
                        message: None,
                        depth,
                    });
                }
                Err(EngineError::Execution(ExecutionError::Cancelled)) => {
                    debug!(rule = %rule.name, "firing cancelled");
                    break;
                }
                Err(e) => {
                    // One rule's failure never aborts its bucket siblings.
                    warn!(rule = %rule.name, kind = %e.kind(), error = %e, "rule firing failed");
                    self.report(FiringReport {
                        name: rule.name.clone(),
                        entity_id: event.entity_id.clone(),
                        success: false,
                        error_kind: Some(e.kind()),
                        message: Some(e.to_string()),
                        depth,
                    });
                }
            }
        }
    }

    /// Runs one rule body against one triggering event.
    async fn fire_rule(
        &self,
        rule: &RuleDef,
        event: &ChangeEvent,
        trigger_entity: &Entity,
        depth: u32,
        state: &mut CascadeState,
        cancel: &CancelToken,
    ) -> EngineResult<()> {
        let mut firing = FiringState::Pending;
        debug!(rule = %rule.name, state = ?firing, "firing");
        let body = &rule.body;

        // The triggering entity anchors the outer FOR when the types line up;
        // otherwise the clause scans its declared type.
        let bound = if body.entity_type == event.entity_type {
            vec![BoundVar::new(
                &body.variable,
                &body.entity_type,
                &event.entity_id,
            )]
        } else {
            Vec::new()
        };
        let translated = self.translator.translate(body, &bound)?;

        if cancel.is_cancelled() {
            return Err(ExecutionError::Cancelled.into());
        }
        let rows = self
            .driver
            .run(&translated.query, translated.params.clone())
            .await
            .map_err(EngineError::Graph)?;
        firing = FiringState::Matched;
        debug!(rule = %rule.name, state = ?firing, rows = rows.len(), "query executed");

        // One frozen instant and one old-value map (triggering property
        // only) per firing.
        let now = Utc::now();
        let mut old_values = PropertyMap::new();
        if let Some(property) = &event.property {
            old_values.insert(property.clone(), event.old_value.clone());
        }

        for (index, row) in rows.iter().enumerate() {
            firing = FiringState::Iterating(index);
            trace!(rule = %rule.name, state = ?firing, "processing row");
            if cancel.is_cancelled() {
                return Err(ExecutionError::Cancelled.into());
            }
            let Some(row_entity) = row.get(&body.variable) else {
                continue;
            };

            let mut ctx = EvaluationContext::new(trigger_entity.clone())
                .with_driver(Arc::clone(&self.driver))
                .with_old_values(old_values.clone())
                .with_now(now);
            ctx.bind_entity(body.variable.clone(), row_entity.clone());

            if let Some(residual) = &translated.residual {
                let evaluator = ExpressionEvaluator::new(&ctx);
                if !evaluator
                    .evaluate_truthy(residual)
                    .await
                    .map_err(EngineError::Eval)?
                {
                    continue;
                }
            }

            if let Err(e) = self
                .run_statements(&body.statements, &mut ctx, depth, state, cancel)
                .await
            {
                firing = FiringState::Failed;
                debug!(rule = %rule.name, state = ?firing, row = index, "firing failed");
                return Err(e);
            }
        }

        firing = FiringState::Completed;
        debug!(rule = %rule.name, state = ?firing, rows = rows.len(), "firing completed");
        Ok(())
    }

    /// Executes rule-body statements in declaration order. Nested statements
    /// drain inline; the change events they produce join the cascade queue
    /// and drain after the current event's whole bucket finishes.
    fn run_statements<'a>(
        &'a self,
        statements: &'a [Stmt],
        ctx: &'a mut EvaluationContext,
        depth: u32,
        state: &'a mut CascadeState,
        cancel: &'a CancelToken,
    ) -> Pin<Box<dyn Future<Output = EngineResult<()>> + Send + 'a>> {
        Box::pin(async move {
            for statement in statements {
                if cancel.is_cancelled() {
                    return Err(ExecutionError::Cancelled.into());
                }
                match statement {
                    Stmt::Set { target, value } => {
                        let evaluated = {
                            let evaluator = ExpressionEvaluator::new(ctx);
                            evaluator.evaluate(value).await.map_err(EngineError::Eval)?
                        };
                        let Some(property) = target.property().map(str::to_string) else {
                            continue;
                        };
                        let head = target.head().to_string();
                        let Some(bound) = ctx.entity(&head).cloned() else {
                            return Err(ExecutionError::UnboundTarget { name: head }.into());
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
                        ctx.refresh_entity(&head, &property, evaluated.clone());
                        // Synthetic event even when old == new; downstream
                        // CHANGED predicates see old = new and stay false.
                        self.enqueue(
                            state,
                            ChangeEvent::update(
                                bound.entity_type.clone(),
                                bound.id.clone(),
                                property,
                                old,
                                evaluated,
                            ),
                            depth + 1,
                        );
                    }
                    Stmt::Trigger {
                        entity_type,
                        action,
                        target,
                        args,
                    } => {
                        let Some(bound) = ctx.entity(target).cloned() else {
                            return Err(ExecutionError::UnboundTarget {
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

                        let (result, events) = self
                            .executor
                            .execute_collecting(
                                entity_type,
                                action,
                                &bound.id,
                                bound.properties.clone(),
                                params,
                                0,
                            )
                            .await;
                        for event in events {
                            self.enqueue(state, event, depth + 1);
                        }
                        self.report(FiringReport {
                            name: format!("{entity_type}.{action}"),
                            entity_id: bound.id.clone(),
                            success: result.success,
                            error_kind: result.error_kind,
                            message: result.error.clone(),
                            depth,
                        });
                        if !result.success {
                            debug!(
                                action = %format!("{entity_type}.{action}"),
                                entity = %bound.id,
                                error = result.error.as_deref().unwrap_or("unknown"),
                                "triggered action did not apply"
                            );
                        }
                    }
                    Stmt::For(clause) => {
                        let bound_vars: Vec<BoundVar> = ctx
                            .entity_bindings()
                            .map(|(name, entity)| {
                                BoundVar::new(name, &entity.entity_type, &entity.id)
                            })
                            .collect();
                        let translated = self.translator.translate(clause, &bound_vars)?;
                        if cancel.is_cancelled() {
                            return Err(ExecutionError::Cancelled.into());
                        }
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
                            self.run_statements(&clause.statements, &mut scope, depth, state, cancel)
                                .await?;
                        }
                    }
                }
            }
            Ok(())
        })
    }

    /// Appends a synthetic event to the cascade queue, subject to the queue
    /// bound.
    fn enqueue(&self, state: &mut CascadeState, event: ChangeEvent, depth: u32) {
        if state.queue.len() >= self.config.max_queue {
            warn!(
                kind = %ErrorKind::CascadeOverflow,
                key = %event.trigger_key(),
                entity = %event.entity_id,
                "cascade queue bound hit; dropping event"
            );
            return;
        }
        state.queue.push_back((event, depth));
    }

    fn report(&self, report: FiringReport) {
        if let Some(sink) = &self.diagnostics {
            sink.report(&report);
        }
    }
}

#[async_trait]
impl EventSubscriber for RuleEngine {
    async fn deliver(&self, event: &ChangeEvent) {
        self.on_event(event.clone()).await;
    }
}
