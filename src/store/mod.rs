//! Store engine: one generic document store parametrized per entity kind.
//!
//! A [`DocumentStore`] pairs a [`crate::persistence::DocumentBackend`] with
//! [`StoreOptions`] describing the entity: its create-input projection,
//! child lists, relationships, unique fields and validator. Every mutation
//! emits a [`crate::domain::StoreEvent`] on the shared bus.

pub mod document_store;
pub mod merge;
pub mod options;
pub mod populate;

use std::fmt;

use serde::Serialize;
use serde::de::DeserializeOwned;

pub use document_store::{ChildChange, DocumentStore};
pub use options::{ChildFactory, DocumentValidator, KeyMap, Relationship, StoreOptions};

use crate::domain::{Configuration, DocumentId, Endpoint, Entity};

/// Collection holding configurations.
pub const CONFIGURATIONS: &str = "configurations";
/// Collection holding endpoints.
pub const ENDPOINTS: &str = "endpoints";

/// A record type a [`DocumentStore`] can manage.
pub trait Document:
    Serialize + DeserializeOwned + Clone + Send + Sync + fmt::Debug + 'static
{
    /// The record's identifier.
    fn id(&self) -> DocumentId;

    /// Wraps a copy of the record for event payloads.
    fn to_entity(&self) -> Entity;
}

impl Document for Configuration {
    fn id(&self) -> DocumentId {
        self.id
    }

    fn to_entity(&self) -> Entity {
        Entity::Configuration(self.clone())
    }
}

impl Document for Endpoint {
    fn id(&self) -> DocumentId {
        self.id
    }

    fn to_entity(&self) -> Entity {
        Entity::Endpoint(self.clone())
    }
}
