//! # relay-control-plane
//!
//! Control plane for runtime-composed request pipelines.
//!
//! Operators manage three kinds of records over an admin REST API:
//! processing-module **configurations**, **endpoints** (routing namespaces
//! with a unique host) and the ordered **bindings** that attach
//! configurations to an endpoint's `middleware` and `adapters` pipelines.
//! Every store mutation is announced on a synchronous event bus; the module
//! registry and the pipeline reconciler subscribe to it and keep the live
//! serving state in step with what is stored.
//!
//! ## Architecture
//!
//! ```text
//! Clients (admin HTTP, served traffic)
//!     │
//!     ├── Admin handlers (api/)         ── serving fallback (api/handlers/serve)
//!     │                                          │
//!     ├── ControlPlane (service/)               RootDispatcher (pipeline/)
//!     │                                          │
//!     ├── DocumentStore<T> (store/)  ──events──► ModuleRegistry (modules/)
//!     ├── EventBus (domain/)         ──events──► PipelineReconciler (pipeline/)
//!     │
//!     └── DocumentBackend: memory or PostgreSQL (persistence/)
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod modules;
pub mod persistence;
pub mod pipeline;
pub mod service;
pub mod store;
