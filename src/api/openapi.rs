//! `OpenAPI` document for the admin and system surfaces.

use axum::Json;
use axum::response::IntoResponse;
use utoipa::OpenApi;

use super::handlers::{binding, configuration, endpoint, module, system};

/// `OpenAPI` documentation for the control plane.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "relay-control-plane",
        version = env!("CARGO_PKG_VERSION"),
        description = "Admin API for endpoints, pipelines, configurations and modules."
    ),
    paths(
        get_openapi_json,
        system::health_handler,
        endpoint::list_endpoints,
        endpoint::create_endpoint,
        endpoint::get_endpoint,
        endpoint::update_endpoint,
        endpoint::delete_endpoint,
        binding::list_bindings,
        binding::create_binding,
        binding::reorder_bindings,
        binding::get_binding,
        binding::update_binding,
        binding::delete_binding,
        configuration::list_configurations,
        configuration::create_configuration,
        configuration::get_configuration,
        configuration::update_configuration,
        configuration::delete_configuration,
        module::list_modules,
        module::get_module,
        module::list_module_configurations,
        module::create_module_configuration,
        module::get_module_configuration,
        module::update_module_configuration,
        module::delete_module_configuration,
    ),
    components(
        schemas(
            crate::error::ErrorResponse,
            crate::error::ErrorBody,
            crate::api::dto::Page,
            crate::api::dto::PaginationMeta,
            crate::api::dto::CreateEndpointRequest,
            crate::api::dto::CreateConfigurationRequest,
            crate::api::dto::CreateBindingRequest,
            system::HealthResponse,
        )
    ),
    tags(
        (name = "OpenAPI", description = "OpenAPI specification endpoint"),
        (name = "System", description = "Service health"),
        (name = "Endpoints", description = "Routing namespaces"),
        (name = "Pipelines", description = "Ordered middleware and adapter bindings"),
        (name = "Configurations", description = "Parameterized module instances"),
        (name = "Modules", description = "Discovered processing modules"),
    ),
)]
pub struct ApiDoc;

/// Path the `OpenAPI` document is served from.
pub const OPENAPI_PATH: &str = "/admin/openapi.json";

/// `GET /admin/openapi.json`: The `OpenAPI` document.
#[utoipa::path(
    get,
    path = "/admin/openapi.json",
    tag = "OpenAPI",
    summary = "OpenAPI document",
    responses(
        (status = 200, description = "OpenAPI 3.1 document", content_type = "application/json"),
    )
)]
pub async fn get_openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}
