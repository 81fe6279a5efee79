//! Request bodies accepted by the admin surface.
//!
//! Fields not listed here are ignored on create.

use serde::Deserialize;
use utoipa::ToSchema;

/// Body of `POST /admin/endpoints`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateEndpointRequest {
    /// Host name, unique across endpoints.
    pub host: String,
    /// Human-readable name.
    pub name: Option<String>,
    /// Free-form description.
    pub description: Option<String>,
    /// Deployment region label.
    pub region: Option<String>,
}

/// Body of `POST /admin/configurations`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateConfigurationRequest {
    /// Canonical name of the module; ignored on module-scoped routes.
    pub module: Option<String>,
    /// Human-readable name.
    pub name: String,
    /// Module parameters, checked against the module's schema.
    pub parameters: Option<serde_json::Value>,
    /// Free-form description.
    pub description: Option<String>,
}

/// Body of `POST /admin/endpoints/{endpoint}/{childKey}`; an array of
/// these adds several bindings at once.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateBindingRequest {
    /// HTTP verb, or `all`.
    pub verb: String,
    /// Path pattern; defaults to `/`.
    pub path: Option<String>,
    /// Id of the configuration to run.
    pub configuration: String,
}
