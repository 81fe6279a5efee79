//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::service::ControlPlane;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The control plane behind the admin and serving surfaces.
    pub control_plane: Arc<ControlPlane>,
    /// Base URL for `url` links; `None` derives it from the `Host` header.
    pub public_base_url: Option<String>,
}

impl AppState {
    /// Creates state around an assembled control plane.
    #[must_use]
    pub fn new(control_plane: Arc<ControlPlane>, public_base_url: Option<String>) -> Self {
        Self {
            control_plane,
            public_base_url,
        }
    }
}
