//! Store events emitted after every persisted mutation.
//!
//! Every store mutation publishes a [`StoreEvent`] through the
//! [`super::EventBus`]. The module registry listens to configuration events
//! to keep its instance cache current; the pipeline reconciler listens to
//! endpoint events to keep live pipelines in step with stored endpoints.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{Configuration, Endpoint};

/// A stored record of any managed entity kind.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "entity", content = "record")]
pub enum Entity {
    /// A module configuration.
    Configuration(Configuration),
    /// An endpoint with its bindings.
    Endpoint(Endpoint),
}

impl Entity {
    /// Entity name used in event names (`Configuration`, `Endpoint`).
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "Configuration",
            Self::Endpoint(_) => "Endpoint",
        }
    }

    /// Returns the endpoint record, if this is one.
    #[must_use]
    pub const fn as_endpoint(&self) -> Option<&Endpoint> {
        match self {
            Self::Endpoint(endpoint) => Some(endpoint),
            Self::Configuration(_) => None,
        }
    }

    /// Returns the configuration record, if this is one.
    #[must_use]
    pub const fn as_configuration(&self) -> Option<&Configuration> {
        match self {
            Self::Configuration(cfg) => Some(cfg),
            Self::Endpoint(_) => None,
        }
    }
}

/// Mutation kind, the `<operation>` segment of an event name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// A record was created.
    Create,
    /// A record or child was updated.
    Update,
    /// A record or child was deleted.
    Delete,
    /// A child was appended to a parent's list.
    Add,
    /// A parent's child list was reordered.
    Reorder,
}

impl Operation {
    /// Lower-case event name segment.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Add => "add",
            Self::Reorder => "reorder",
        }
    }
}

/// Domain event emitted after every store mutation.
///
/// Parent records are carried after the mutation with relationships
/// resolved, so subscribers never need to go back to the store.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum StoreEvent {
    /// Emitted after a record is created.
    Created {
        /// The persisted record.
        record: Entity,
        /// Emission timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Emitted after a record is updated.
    Updated {
        /// The record after the merge.
        record: Entity,
        /// Top-level fields the update touched, plus fields declared
        /// always-mutable for the entity.
        changed: Vec<String>,
        /// Emission timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Emitted after a record is removed.
    Deleted {
        /// The record as it was before removal.
        record: Entity,
        /// Emission timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Emitted after a child is appended to a parent list.
    ChildAdded {
        /// Parent after the append.
        parent: Entity,
        /// Child list name.
        child_key: String,
        /// The new child.
        child: serde_json::Value,
        /// Emission timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Emitted after a child is merged with a delta.
    ChildUpdated {
        /// Parent after the update.
        parent: Entity,
        /// Child list name.
        child_key: String,
        /// The child after the update.
        child: serde_json::Value,
        /// Emission timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Emitted after a child is removed from a parent list.
    ChildDeleted {
        /// Parent after the removal.
        parent: Entity,
        /// Child list name.
        child_key: String,
        /// The removed child.
        child: serde_json::Value,
        /// Emission timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Emitted after a parent's child list is reordered.
    ChildrenReordered {
        /// Parent after the reorder.
        parent: Entity,
        /// Child list name.
        child_key: String,
        /// Emission timestamp.
        timestamp: DateTime<Utc>,
    },
}

impl StoreEvent {
    /// Domain segment shared by every store event name.
    pub const DOMAIN: &'static str = "store";

    /// Returns the operation segment of this event.
    #[must_use]
    pub const fn operation(&self) -> Operation {
        match self {
            Self::Created { .. } => Operation::Create,
            Self::Updated { .. } | Self::ChildUpdated { .. } => Operation::Update,
            Self::Deleted { .. } | Self::ChildDeleted { .. } => Operation::Delete,
            Self::ChildAdded { .. } => Operation::Add,
            Self::ChildrenReordered { .. } => Operation::Reorder,
        }
    }

    /// The record (or parent record) the event is about.
    #[must_use]
    pub const fn entity(&self) -> &Entity {
        match self {
            Self::Created { record, .. }
            | Self::Updated { record, .. }
            | Self::Deleted { record, .. } => record,
            Self::ChildAdded { parent, .. }
            | Self::ChildUpdated { parent, .. }
            | Self::ChildDeleted { parent, .. }
            | Self::ChildrenReordered { parent, .. } => parent,
        }
    }

    /// Child list name for child events.
    #[must_use]
    pub fn child_key(&self) -> Option<&str> {
        match self {
            Self::ChildAdded { child_key, .. }
            | Self::ChildUpdated { child_key, .. }
            | Self::ChildDeleted { child_key, .. }
            | Self::ChildrenReordered { child_key, .. } => Some(child_key),
            Self::Created { .. } | Self::Updated { .. } | Self::Deleted { .. } => None,
        }
    }

    /// Dotted event name: `store.<operation>.<Entity>[.<childKey>]`.
    #[must_use]
    pub fn name(&self) -> String {
        event_name(self.operation(), self.entity().name(), self.child_key())
    }
}

/// Builds a store event name without needing an event value, for
/// subscribers.
#[must_use]
pub fn event_name(operation: Operation, entity: &str, child_key: Option<&str>) -> String {
    match child_key {
        Some(key) => format!(
            "{}.{}.{entity}.{key}",
            StoreEvent::DOMAIN,
            operation.as_str()
        ),
        None => format!("{}.{}.{entity}", StoreEvent::DOMAIN, operation.as_str()),
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::DocumentId;

    fn endpoint() -> Endpoint {
        Endpoint {
            id: DocumentId::new(),
            host: "a.example".into(),
            name: None,
            description: None,
            region: None,
            middleware: Vec::new(),
            adapters: Vec::new(),
        }
    }

    #[test]
    fn record_events_have_three_segments() {
        let event = StoreEvent::Deleted {
            record: Entity::Endpoint(endpoint()),
            timestamp: Utc::now(),
        };
        assert_eq!(event.name(), "store.delete.Endpoint");
    }

    #[test]
    fn child_events_append_child_key() {
        let event = StoreEvent::ChildrenReordered {
            parent: Entity::Endpoint(endpoint()),
            child_key: "adapters".into(),
            timestamp: Utc::now(),
        };
        assert_eq!(event.name(), "store.reorder.Endpoint.adapters");
        assert_eq!(event.operation(), Operation::Reorder);
    }

    #[test]
    fn event_name_helper_matches_event() {
        assert_eq!(
            event_name(Operation::Add, "Endpoint", Some("middleware")),
            "store.add.Endpoint.middleware"
        );
        assert_eq!(
            event_name(Operation::Create, "Configuration", None),
            "store.create.Configuration"
        );
    }

    #[test]
    fn update_carries_changed_fields() {
        let event = StoreEvent::Updated {
            record: Entity::Endpoint(endpoint()),
            changed: vec!["host".into()],
            timestamp: Utc::now(),
        };
        assert_eq!(event.name(), "store.update.Endpoint");
        let json = serde_json::to_value(&event).unwrap_or_default();
        assert_eq!(json["changed"], serde_json::json!(["host"]));
    }

    #[test]
    fn serializes_with_event_type_tag() {
        let event = StoreEvent::Created {
            record: Entity::Endpoint(endpoint()),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&event).unwrap_or_default();
        assert!(json.contains("\"event_type\":\"created\""));
        assert!(json.contains("\"entity\":\"Endpoint\""));
    }
}
