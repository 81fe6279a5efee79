//! Request pipelines: stages, per-endpoint dispatch tables, the root
//! dispatcher and the reconciler that keeps them in step with the store.

pub mod dispatch;
pub mod reconciler;
pub mod request;
pub mod root;
pub mod stage;

pub use dispatch::{DispatchTable, MountedStage, PathPattern};
pub use reconciler::PipelineReconciler;
pub use request::RequestContext;
pub use root::RootDispatcher;
pub use stage::{Stage, StageOutcome, StageResponse};
