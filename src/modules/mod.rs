//! Module registry: processing modules, their parameter schemas, and the
//! stage instances built from configurations.
//!
//! Modules implement [`Plugin`] and are discovered once at boot from a
//! [`UnitTree`]. The [`ModuleRegistry`] validates configurations against
//! module schemas and keeps one built stage per configuration in its
//! [`InstanceCache`]; pipelines reach those stages through
//! [`StageHandle`]s.

pub mod builtin;
pub mod discovery;
pub mod instance;
pub mod plugin;
pub mod registry;
pub mod schema;

pub use discovery::{ModuleDescriptor, UnitNode, UnitTree};
pub use instance::{InstanceCache, StageHandle};
pub use plugin::Plugin;
pub use registry::ModuleRegistry;
pub use schema::{ParameterSchema, PropertySchema, PropertyType};
