//! Configuration CRUD handlers.

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

/// `GET /admin/configurations`: List configurations.
///
/// # Errors
///
/// Returns [`ControlPlaneError`] on storage failures.
#[utoipa::path(
    get,
    path = "/admin/configurations",
    tag = "Configurations",
    summary = "List configurations",
    params(PaginationParams),
    responses(
        (status = 200, description = "Paginated configuration list", body = Page),
    )
)]
pub async fn list_configurations(
    State(state): State<AppState>,
    links: AdminLinks,
    Query(params): Query<PaginationParams>,
) -> Result<impl IntoResponse, ControlPlaneError> {
    let configurations = state.control_plane.configurations().list().await?;
    let linked = configurations
        .iter()
        .map(|cfg| links.configuration(cfg))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(params.paginate(linked)))
}

/// `POST /admin/configurations`: Create a configuration.
///
/// # Errors
///
/// Returns [`ControlPlaneError::ConfigurationMismatch`] for an unknown
/// module and [`ControlPlaneError::Validation`] if the parameters do not
/// satisfy the module's schema.
#[utoipa::path(
    post,
    path = "/admin/configurations",
    tag = "Configurations",
    summary = "Create a configuration",
    description = "Validates the parameters against the module's schema and builds an instance.",
    request_body = CreateConfigurationRequest,
    responses(
        (status = 201, description = "Configuration created", body = Value),
        (status = 400, description = "Invalid configuration", body = ErrorResponse),
        (status = 422, description = "Unknown module", body = ErrorResponse),
    )
)]
pub async fn create_configuration(
    State(state): State<AppState>,
    links: AdminLinks,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, ControlPlaneError> {
    let input = json_body(payload)?;
    let cfg = state.control_plane.configurations().create(&input).await?;
    Ok((StatusCode::CREATED, Json(links.configuration(&cfg)?)))
}

/// `GET /admin/configurations/{configuration}`: Get a configuration.
///
/// # Errors
///
/// Returns [`ControlPlaneError::NotFound`] if the configuration does not
/// exist.
#[utoipa::path(
    get,
    path = "/admin/configurations/{configuration}",
    tag = "Configurations",
    summary = "Get a configuration",
    params(("configuration" = String, Path, description = "Configuration id")),
    responses(
        (status = 200, description = "Configuration", body = Value),
        (status = 404, description = "Configuration not found", body = ErrorResponse),
    )
)]
pub async fn get_configuration(
    State(state): State<AppState>,
    links: AdminLinks,
    Path(configuration): Path<String>,
) -> Result<impl IntoResponse, ControlPlaneError> {
    let id = parse_id("Configuration", &configuration)?;
    let cfg = state.control_plane.configurations().by_id(id).await?;
    Ok(Json(links.configuration(&cfg)?))
}

/// `PUT /admin/configurations/{configuration}`: Update a configuration.
///
/// # Errors
///
/// Returns [`ControlPlaneError::NotFound`] if the configuration does not
/// exist, or the validation errors of
/// [`create_configuration`].
#[utoipa::path(
    put,
    path = "/admin/configurations/{configuration}",
    tag = "Configurations",
    summary = "Update a configuration",
    description = "Merges the body into the configuration; `parameters` is replaced wholesale and the instance is rebuilt.",
    params(("configuration" = String, Path, description = "Configuration id")),
    request_body = Value,
    responses(
        (status = 200, description = "Updated configuration", body = Value),
        (status = 400, description = "Invalid configuration", body = ErrorResponse),
        (status = 404, description = "Configuration not found", body = ErrorResponse),
        (status = 422, description = "Unknown module", body = ErrorResponse),
    )
)]
pub async fn update_configuration(
    State(state): State<AppState>,
    links: AdminLinks,
    Path(configuration): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, ControlPlaneError> {
    let id = parse_id("Configuration", &configuration)?;
    let delta = json_body(payload)?;
    let cfg = state.control_plane.configurations().update(id, &delta).await?;
    Ok(Json(links.configuration(&cfg)?))
}

/// `DELETE /admin/configurations/{configuration}`: Delete a
/// configuration.
///
/// Bindings that still reference it stay in place and fail when served.
///
/// # Errors
///
/// Returns [`ControlPlaneError::NotFound`] if the configuration does not
/// exist.
#[utoipa::path(
    delete,
    path = "/admin/configurations/{configuration}",
    tag = "Configurations",
    summary = "Delete a configuration",
    params(("configuration" = String, Path, description = "Configuration id")),
    responses(
        (status = 204, description = "Configuration deleted"),
        (status = 404, description = "Configuration not found", body = ErrorResponse),
    )
)]
pub async fn delete_configuration(
    State(state): State<AppState>,
    Path(configuration): Path<String>,
) -> Result<impl IntoResponse, ControlPlaneError> {
    let id = parse_id("Configuration", &configuration)?;
    state.control_plane.configurations().remove(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Configuration management routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/configurations",
            get(list_configurations).post(create_configuration),
        )
        .route(
            "/configurations/{configuration}",
            get(get_configuration)
                .put(update_configuration)
                .delete(delete_configuration),
        )
}
