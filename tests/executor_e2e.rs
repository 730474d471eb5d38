//! End-to-end action execution scenarios: preconditions, effects,
//! persistence, and the emitter hookup on the direct host path.

mod support;

use std::sync::Arc;

use rulegraph::{
    ActionExecutor, ActionRegistry, ChangeEvent, Entity, ErrorKind, EventEmitter, PropertyMap,
    RuleEngine, RuleRegistry, Value,
};
use std::collections::HashMap;

use support::InMemoryGraph;

fn registry(dsl: &str) -> Arc<ActionRegistry> {
    let registry = ActionRegistry::new();
    registry.load_from_text(dsl).unwrap();
    Arc::new(registry)
}

/// S2: the first falsy precondition reports its message; later ones are
/// never evaluated.
#[tokio::test]
async fn precondition_short_circuit() {
    let graph = Arc::new(InMemoryGraph::new());
    let executor = ActionExecutor::new(
        registry(
            r#"
            ACTION PurchaseOrder.submit {
              PRECONDITION P1: this.status == "Draft" ON_FAILURE: "Must be draft"
              PRECONDITION P2: this.amount > 0 ON_FAILURE: "Amount must be positive"
            }
            "#,
        ),
        Arc::clone(&graph) as Arc<dyn rulegraph::GraphDriver>,
    );

    let result = executor
        .execute(
            "PurchaseOrder",
            "submit",
            "PO_9",
            PropertyMap::from([
                ("status".to_string(), Value::String("Open".into())),
                ("amount".to_string(), Value::Int(100)),
            ]),
            HashMap::new(),
        )
        .await;

    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("Must be draft"));
    assert_eq!(graph.write_count(), 0);
}

/// S3: effects write through to the graph and the changes mapping matches
/// exactly what was written.
#[tokio::test]
async fn effect_writes_persist() {
    let graph = Arc::new(InMemoryGraph::new());
    graph.insert(Entity::new("PO_5", "PurchaseOrder").with_property("status", "Open"));

    let executor = ActionExecutor::new(
        registry(
            r#"
            ACTION PurchaseOrder.cancel {
              PRECONDITION: this.status == "Open" ON_FAILURE: "Must be open"
              EFFECT {
                SET this.status = "Cancelled";
                SET this.cancelledAt = NOW();
              }
            }
            "#,
        ),
        Arc::clone(&graph) as Arc<dyn rulegraph::GraphDriver>,
    );

    let result = executor
        .execute(
            "PurchaseOrder",
            "cancel",
            "PO_5",
            graph.entity("PurchaseOrder", "PO_5").unwrap().properties,
            HashMap::new(),
        )
        .await;

    assert!(result.success);
    assert_eq!(
        result.changes.get("status"),
        Some(&Value::String("Cancelled".into()))
    );
    assert!(matches!(result.changes.get("cancelledAt"), Some(Value::Timestamp(_))));

    // The graph saw exactly the changes mapping, nothing else.
    let stored = graph.entity("PurchaseOrder", "PO_5").unwrap();
    assert_eq!(stored.property("status"), Value::String("Cancelled".into()));
    assert!(stored.property("cancelledAt").is_timestamp());
    let written: std::collections::HashSet<String> =
        graph.writes().iter().map(|w| w.property.clone()).collect();
    let changed: std::collections::HashSet<String> = result.changes.keys().cloned().collect();
    assert_eq!(written, changed);
}

/// On the direct host path the executor emits change events, which reach a
/// subscribed rule engine and cascade.
#[tokio::test]
async fn direct_execution_feeds_the_rule_engine() {
    let graph = Arc::new(InMemoryGraph::new());
    graph.insert(Entity::new("PO_5", "PurchaseOrder").with_property("status", "Open"));

    let actions = registry(
        r#"
        ACTION PurchaseOrder.cancel {
          PRECONDITION: this.status == "Open" ON_FAILURE: "Must be open"
          EFFECT { SET this.status = "Cancelled"; }
        }
        "#,
    );

    let rules = Arc::new(RuleRegistry::new());
    rules
        .load_from_text(
            r#"
            RULE AuditCancel {
              ON UPDATE(PurchaseOrder.status)
              FOR (po:PurchaseOrder WHERE po.status == "Cancelled") {
                SET po.audited = true;
              }
            }
            "#,
        )
        .unwrap();

    let engine = Arc::new(RuleEngine::new(
        Arc::clone(&actions),
        rules,
        Arc::clone(&graph) as Arc<dyn rulegraph::GraphDriver>,
    ));
    let emitter = Arc::new(EventEmitter::new());
    emitter.subscribe(engine);

    let executor = ActionExecutor::new(
        actions,
        Arc::clone(&graph) as Arc<dyn rulegraph::GraphDriver>,
    )
    .with_emitter(Arc::clone(&emitter));

    let result = executor
        .execute(
            "PurchaseOrder",
            "cancel",
            "PO_5",
            graph.entity("PurchaseOrder", "PO_5").unwrap().properties,
            HashMap::new(),
        )
        .await;
    assert!(result.success);

    let stored = graph.entity("PurchaseOrder", "PO_5").unwrap();
    assert_eq!(stored.property("status"), Value::String("Cancelled".into()));
    assert_eq!(stored.property("audited"), Value::Bool(true));
}

/// An effect's nested `FOR` iterates related entities through the graph,
/// writing them directly.
#[tokio::test]
async fn effect_for_clause_updates_related_entities() {
    let graph = Arc::new(InMemoryGraph::new());
    graph.insert(Entity::new("BP_1", "Supplier").with_property("status", "Active"));
    graph.insert(Entity::new("PO_1", "PurchaseOrder").with_property("status", "Open"));
    graph.insert(Entity::new("PO_2", "PurchaseOrder").with_property("status", "Open"));
    graph.insert(Entity::new("PO_3", "PurchaseOrder").with_property("status", "Delivered"));
    graph.link("PO_1", "orderedFrom", "BP_1");
    graph.link("PO_3", "orderedFrom", "BP_1");

    let executor = ActionExecutor::new(
        registry(
            r#"
            ACTION Supplier.block {
              PRECONDITION: this.status == "Active" ON_FAILURE: "already blocked"
              EFFECT {
                SET this.status = "Blocked";
                FOR (po:PurchaseOrder WHERE po -[orderedFrom]-> this AND po.status == "Open") {
                  SET po.status = "OnHold";
                }
              }
            }
            "#,
        ),
        Arc::clone(&graph) as Arc<dyn rulegraph::GraphDriver>,
    );

    let result = executor
        .execute(
            "Supplier",
            "block",
            "BP_1",
            graph.entity("Supplier", "BP_1").unwrap().properties,
            HashMap::new(),
        )
        .await;

    assert!(result.success, "unexpected error: {:?}", result.error);
    // `changes` covers the target entity only.
    assert_eq!(result.changes.len(), 1);
    assert_eq!(
        graph.entity("Supplier", "BP_1").unwrap().property("status"),
        Value::String("Blocked".into())
    );
    // PO_1 is linked and open: held. PO_2 is unlinked, PO_3 not open.
    assert_eq!(
        graph.entity("PurchaseOrder", "PO_1").unwrap().property("status"),
        Value::String("OnHold".into())
    );
    assert_eq!(
        graph.entity("PurchaseOrder", "PO_2").unwrap().property("status"),
        Value::String("Open".into())
    );
    assert_eq!(
        graph.entity("PurchaseOrder", "PO_3").unwrap().property("status"),
        Value::String("Delivered".into())
    );
}

/// A filtered `EXISTS` in an effect's `FOR` guard narrows the iteration by
/// the filter, not just by edge existence.
#[tokio::test]
async fn effect_for_with_filtered_exists() {
    let graph = Arc::new(InMemoryGraph::new());
    graph.insert(Entity::new("BP_1", "Supplier").with_property("status", "Active"));
    graph.insert(
        Entity::new("PO_1", "PurchaseOrder")
            .with_property("status", "Open")
            .with_property("amount", 5_000i64),
    );
    graph.insert(
        Entity::new("PO_2", "PurchaseOrder")
            .with_property("status", "Open")
            .with_property("amount", 100i64),
    );
    graph.insert(
        Entity::new("PO_3", "PurchaseOrder")
            .with_property("status", "Open")
            .with_property("amount", 5_000i64),
    );
    graph.link("PO_1", "orderedFrom", "BP_1");
    graph.link("PO_2", "orderedFrom", "BP_1");
    // PO_3 is not linked to the supplier.

    let executor = ActionExecutor::new(
        registry(
            r#"
            ACTION Supplier.holdBigOrders {
              PRECONDITION: this.status == "Active" ON_FAILURE: "inactive"
              EFFECT {
                FOR (po:PurchaseOrder WHERE EXISTS(po -[orderedFrom]-> this WHERE po.amount > 1000)) {
                  SET po.status = "OnHold";
                }
              }
            }
            "#,
        ),
        Arc::clone(&graph) as Arc<dyn rulegraph::GraphDriver>,
    );

    let result = executor
        .execute(
            "Supplier",
            "holdBigOrders",
            "BP_1",
            graph.entity("Supplier", "BP_1").unwrap().properties,
            HashMap::new(),
        )
        .await;

    assert!(result.success, "unexpected error: {:?}", result.error);
    assert_eq!(
        graph.entity("PurchaseOrder", "PO_1").unwrap().property("status"),
        Value::String("OnHold".into())
    );
    // Linked but under the amount filter: untouched.
    assert_eq!(
        graph.entity("PurchaseOrder", "PO_2").unwrap().property("status"),
        Value::String("Open".into())
    );
    // Over the filter but unlinked: untouched.
    assert_eq!(
        graph.entity("PurchaseOrder", "PO_3").unwrap().property("status"),
        Value::String("Open".into())
    );
}

/// A precondition comparing against null yields false, not an error.
#[tokio::test]
async fn null_comparison_fails_precondition_cleanly() {
    let graph = Arc::new(InMemoryGraph::new());
    let executor = ActionExecutor::new(
        registry(
            r#"
            ACTION T.go {
              PRECONDITION: this.amount > 0 ON_FAILURE: "Amount must be positive"
            }
            "#,
        ),
        Arc::clone(&graph) as Arc<dyn rulegraph::GraphDriver>,
    );

    let result = executor
        .execute("T", "go", "t1", PropertyMap::new(), HashMap::new())
        .await;
    assert!(!result.success);
    assert_eq!(result.error_kind, Some(ErrorKind::PreconditionFailure));
    assert_eq!(result.error.as_deref(), Some("Amount must be positive"));

    // IS NULL sees the null and passes.
    let executor = ActionExecutor::new(
        registry(
            r#"
            ACTION T.go {
              PRECONDITION: this.amount IS NULL ON_FAILURE: "already priced"
            }
            "#,
        ),
        Arc::clone(&graph) as Arc<dyn rulegraph::GraphDriver>,
    );
    let result = executor
        .execute("T", "go", "t1", PropertyMap::new(), HashMap::new())
        .await;
    assert!(result.success);
}

/// Emitted events carry actor attribution on the direct path.
#[tokio::test]
async fn actor_attribution_rides_on_events() {
    use parking_lot::Mutex;

    let graph = Arc::new(InMemoryGraph::new());
    graph.insert(Entity::new("t1", "T").with_property("ready", true));

    let seen: Arc<Mutex<Vec<ChangeEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let emitter = Arc::new(EventEmitter::new());
    {
        let seen = Arc::clone(&seen);
        emitter.subscribe_fn(move |event| seen.lock().push(event.clone()));
    }

    let executor = ActionExecutor::new(
        registry(
            r#"
            ACTION T.mark {
              PRECONDITION: this.ready == true ON_FAILURE: "not ready"
              EFFECT { SET this.marked = true; }
            }
            "#,
        ),
        Arc::clone(&graph) as Arc<dyn rulegraph::GraphDriver>,
    )
    .with_emitter(emitter);

    let result = executor
        .execute_as(
            "T",
            "mark",
            "t1",
            graph.entity("T", "t1").unwrap().properties,
            HashMap::new(),
            Some(rulegraph::Actor::new("scheduler", rulegraph::ActorKind::System)),
        )
        .await;
    assert!(result.success);

    let events = seen.lock();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].property.as_deref(), Some("marked"));
    let actor = events[0].actor.as_ref().unwrap();
    assert_eq!(actor.name, "scheduler");
}
