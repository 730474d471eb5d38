//! Change events and trigger keys.
//!
//! Every observed mutation of the graph becomes a [`ChangeEvent`]. The rule
//! engine indexes rules by the event's trigger key and folds the events its
//! own writes produce back into the cascade.

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// The kind of mutation a trigger reacts to (and an event reports).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerKind {
    /// A property changed value.
    Update,
    /// An entity was created.
    Create,
    /// An entity was deleted.
    Delete,
    /// A relationship was established.
    Link,
    /// A periodic sweep over entities of a type.
    Scan,
}

impl TriggerKind {
    /// The DSL keyword for this kind.
    #[must_use]
    pub const fn keyword(self) -> &'static str {
        match self {
            Self::Update => "UPDATE",
            Self::Create => "CREATE",
            Self::Delete => "DELETE",
            Self::Link => "LINK",
            Self::Scan => "SCAN",
        }
    }
}

impl std::fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Who caused a mutation or invoked an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorKind {
    /// A human operator.
    User,
    /// An autonomous agent.
    Agent,
    /// The system itself (cascading rules, scheduled sweeps).
    System,
}

/// Attribution carried on events and execution reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Display name of the actor.
    pub name: String,
    /// Actor classification.
    pub kind: ActorKind,
}

impl Actor {
    /// Creates an actor record.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: ActorKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// One observed property change (or lifecycle event) on one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// What kind of mutation occurred.
    pub kind: TriggerKind,
    /// Type label of the mutated entity.
    pub entity_type: String,
    /// Stable id of the mutated entity.
    pub entity_id: String,
    /// The changed property (`UPDATE` events only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property: Option<String>,
    /// Value before the change.
    pub old_value: Value,
    /// Value after the change.
    pub new_value: Value,
    /// Who caused the change, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<Actor>,
}

impl ChangeEvent {
    /// Creates an `UPDATE` event for a property change.
    #[must_use]
    pub fn update(
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        property: impl Into<String>,
        old_value: Value,
        new_value: Value,
    ) -> Self {
        Self {
            kind: TriggerKind::Update,
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            property: Some(property.into()),
            old_value,
            new_value,
            actor: None,
        }
    }

    /// Creates a lifecycle event (`CREATE`, `DELETE`, `LINK`, `SCAN`).
    #[must_use]
    pub fn lifecycle(
        kind: TriggerKind,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            property: None,
            old_value: Value::Null,
            new_value: Value::Null,
            actor: None,
        }
    }

    /// Attaches actor attribution.
    #[must_use]
    pub fn with_actor(mut self, actor: Actor) -> Self {
        self.actor = Some(actor);
        self
    }

    /// The key this event is dispatched under.
    ///
    /// `UPDATE|<entity_type>|<property>` for updates, `<KIND>|<entity_type>`
    /// for everything else.
    #[must_use]
    pub fn trigger_key(&self) -> String {
        trigger_key(self.kind, &self.entity_type, self.property.as_deref())
    }
}

/// Builds a trigger index key from its parts.
///
/// The property is included only for `UPDATE`; other kinds ignore it.
#[must_use]
pub fn trigger_key(kind: TriggerKind, entity_type: &str, property: Option<&str>) -> String {
    match (kind, property) {
        (TriggerKind::Update, Some(p)) => format!("{}|{entity_type}|{p}", kind.keyword()),
        _ => format!("{}|{entity_type}", kind.keyword()),
    }
}
