//! Domain layer: record types, identifiers, and the event system.
//!
//! This module contains the control plane's domain model: document
//! identity, the three managed entity kinds (configurations, bindings,
//! endpoints), the typed store events and the bus that carries them.

pub mod binding;
pub mod configuration;
pub mod document_id;
pub mod endpoint;
pub mod event_bus;
pub mod store_event;

pub use binding::{Binding, Reference, Verb};
pub use configuration::Configuration;
pub use document_id::DocumentId;
pub use endpoint::{Endpoint, PipelineKey};
pub use event_bus::EventBus;
pub use store_event::{Entity, Operation, StoreEvent, event_name};
