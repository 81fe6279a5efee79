//! Service layer: assembles the control plane from its components.
//!
//! [`ControlPlane`] owns the configuration and endpoint stores, the module
//! registry and the pipeline reconciler, all sharing one
//! [`crate::domain::EventBus`]. [`BindingFactory`] materializes endpoint
//! bindings and checks their configuration references.

pub mod binding_factory;
pub mod control_plane;

pub use binding_factory::BindingFactory;
pub use control_plane::ControlPlane;
