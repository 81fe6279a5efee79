//! Module catalog handlers and module-scoped configuration CRUD.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::Value;

use super::{json_body, parse_id};
use crate::api::dto::{CreateConfigurationRequest, Page, PaginationParams};
use crate::api::links::AdminLinks;
use crate::app_state::AppState;
use crate::error::{ControlPlaneError, ErrorResponse};

/// `GET /admin/modules`: List discovered modules.
///
/// # Errors
///
/// Returns [`ControlPlaneError::Internal`] if a descriptor cannot be
/// serialized.
#[utoipa::path(
    get,
    path = "/admin/modules",
    tag = "Modules",
    summary = "List modules",
    description = "Returns every discovered module with its parameter schema and bound configurations.",
    params(PaginationParams),
    responses(
        (status = 200, description = "Paginated module list", body = Page),
    )
)]
pub async fn list_modules(
    State(state): State<AppState>,
    links: AdminLinks,
    Query(params): Query<PaginationParams>,
) -> Result<impl IntoResponse, ControlPlaneError> {
    let linked = state
        .control_plane
        .registry()
        .modules()
        .iter()
        .map(|module| links.module(module))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(params.paginate(linked)))
}

/// `GET /admin/modules/{module}`: Get a module.
///
/// # Errors
///
/// Returns [`ControlPlaneError::NotFound`] for an unknown canonical name.
#[utoipa::path(
    get,
    path = "/admin/modules/{module}",
    tag = "Modules",
    summary = "Get a module",
    params(("module" = String, Path, description = "Canonical module name, e.g. `adapters.echo`")),
    responses(
        (status = 200, description = "Module", body = Value),
        (status = 404, description = "Module not found", body = ErrorResponse),
    )
)]
pub async fn get_module(
    State(state): State<AppState>,
    links: AdminLinks,
    Path(module): Path<String>,
) -> Result<impl IntoResponse, ControlPlaneError> {
    let module = state.control_plane.module(&module)?;
    Ok(Json(links.module(&module)?))
}

/// `GET /admin/modules/{module}/configurations`: List a module's
/// configurations.
///
/// # Errors
///
/// Returns [`ControlPlaneError::NotFound`] for an unknown module.
#[utoipa::path(
    get,
    path = "/admin/modules/{module}/configurations",
    tag = "Modules",
    summary = "List a module's configurations",
    params(
        ("module" = String, Path, description = "Canonical module name"),
        PaginationParams,
    ),
    responses(
        (status = 200, description = "Paginated configuration list", body = Page),
        (status = 404, description = "Module not found", body = ErrorResponse),
    )
)]
pub async fn list_module_configurations(
    State(state): State<AppState>,
    links: AdminLinks,
    Path(module): Path<String>,
    Query(params): Query<PaginationParams>,
) -> Result<impl IntoResponse, ControlPlaneError> {
    let linked = state
        .control_plane
        .module_configurations(&module)?
        .iter()
        .map(|cfg| links.configuration(cfg))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(params.paginate(linked)))
}

/// `POST /admin/modules/{module}/configurations`: Create a configuration
/// for a module.
///
/// # Errors
///
/// Returns [`ControlPlaneError::NotFound`] for an unknown module and
/// [`ControlPlaneError::Validation`] if the parameters do not satisfy the
/// module's schema.
#[utoipa::path(
    post,
    path = "/admin/modules/{module}/configurations",
    tag = "Modules",
    summary = "Create a module configuration",
    description = "The module named in the path is used regardless of any `module` field in the body.",
    params(("module" = String, Path, description = "Canonical module name")),
    request_body = CreateConfigurationRequest,
    responses(
        (status = 201, description = "Configuration created", body = Value),
        (status = 400, description = "Invalid configuration", body = ErrorResponse),
        (status = 404, description = "Module not found", body = ErrorResponse),
    )
)]
pub async fn create_module_configuration(
    State(state): State<AppState>,
    links: AdminLinks,
    Path(module): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, ControlPlaneError> {
    let input = json_body(payload)?;
    let cfg = state
        .control_plane
        .create_module_configuration(&module, &input)
        .await?;
    Ok((StatusCode::CREATED, Json(links.configuration(&cfg)?)))
}

/// `GET /admin/modules/{module}/configurations/{configuration}`: Get a
/// module configuration.
///
/// # Errors
///
/// Returns [`ControlPlaneError::NotFound`] if the module is unknown or the
/// configuration does not belong to it.
#[utoipa::path(
    get,
    path = "/admin/modules/{module}/configurations/{configuration}",
    tag = "Modules",
    summary = "Get a module configuration",
    params(
        ("module" = String, Path, description = "Canonical module name"),
        ("configuration" = String, Path, description = "Configuration id"),
    ),
    responses(
        (status = 200, description = "Configuration", body = Value),
        (status = 404, description = "Module or configuration not found", body = ErrorResponse),
    )
)]
pub async fn get_module_configuration(
    State(state): State<AppState>,
    links: AdminLinks,
    Path((module, configuration)): Path<(String, String)>,
) -> Result<impl IntoResponse, ControlPlaneError> {
    let id = parse_id("Configuration", &configuration)?;
    let cfg = state.control_plane.module_configuration(&module, id)?;
    Ok(Json(links.configuration(&cfg)?))
}

/// `PUT /admin/modules/{module}/configurations/{configuration}`: Update a
/// module configuration.
///
/// # Errors
///
/// Returns [`ControlPlaneError::NotFound`] as for
/// [`get_module_configuration`] and
/// [`ControlPlaneError::ConfigurationMismatch`] if the body moves the
/// configuration to another module.
#[utoipa::path(
    put,
    path = "/admin/modules/{module}/configurations/{configuration}",
    tag = "Modules",
    summary = "Update a module configuration",
    params(
        ("module" = String, Path, description = "Canonical module name"),
        ("configuration" = String, Path, description = "Configuration id"),
    ),
    request_body = Value,
    responses(
        (status = 200, description = "Updated configuration", body = Value),
        (status = 400, description = "Invalid configuration", body = ErrorResponse),
        (status = 404, description = "Module or configuration not found", body = ErrorResponse),
        (status = 422, description = "Body names another module", body = ErrorResponse),
    )
)]
pub async fn update_module_configuration(
    State(state): State<AppState>,
    links: AdminLinks,
    Path((module, configuration)): Path<(String, String)>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, ControlPlaneError> {
    let id = parse_id("Configuration", &configuration)?;
    let delta = json_body(payload)?;
    let cfg = state
        .control_plane
        .update_module_configuration(&module, id, &delta)
        .await?;
    Ok(Json(links.configuration(&cfg)?))
}

/// `DELETE /admin/modules/{module}/configurations/{configuration}`:
/// Delete a module configuration.
///
/// # Errors
///
/// Returns [`ControlPlaneError::NotFound`] as for
/// [`get_module_configuration`].
#[utoipa::path(
    delete,
    path = "/admin/modules/{module}/configurations/{configuration}",
    tag = "Modules",
    summary = "Delete a module configuration",
    params(
        ("module" = String, Path, description = "Canonical module name"),
        ("configuration" = String, Path, description = "Configuration id"),
    ),
    responses(
        (status = 204, description = "Configuration deleted"),
        (status = 404, description = "Module or configuration not found", body = ErrorResponse),
    )
)]
pub async fn delete_module_configuration(
    State(state): State<AppState>,
    Path((module, configuration)): Path<(String, String)>,
) -> Result<impl IntoResponse, ControlPlaneError> {
    let id = parse_id("Configuration", &configuration)?;
    state
        .control_plane
        .delete_module_configuration(&module, id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Module catalog routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/modules", get(list_modules))
        .route("/modules/{module}", get(get_module))
        .route(
            "/modules/{module}/configurations",
            get(list_module_configurations).post(create_module_configuration),
        )
        .route(
            "/modules/{module}/configurations/{configuration}",
            get(get_module_configuration)
                .put(update_module_configuration)
                .delete(delete_module_configuration),
        )
}
