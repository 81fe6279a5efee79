//! Endpoint CRUD handlers: create, list, get, update, delete.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::Value;

use super::{json_body, parse_id};
use crate::api::dto::{CreateEndpointRequest, Page, PaginationParams};
use crate::api::links::AdminLinks;
use crate::app_state::AppState;
use crate::error::{ControlPlaneError, ErrorResponse};

/// `GET /admin/endpoints`: List endpoints.
///
/// # Errors
///
/// Returns [`ControlPlaneError`] on storage failures.
#[utoipa::path(
    get,
    path = "/admin/endpoints",
    tag = "Endpoints",
    summary = "List endpoints",
    description = "Returns a paginated list of endpoints with their bindings and resolved configurations.",
    params(PaginationParams),
    responses(
        (status = 200, description = "Paginated endpoint list", body = Page),
    )
)]
pub async fn list_endpoints(
    State(state): State<AppState>,
    links: AdminLinks,
    Query(params): Query<PaginationParams>,
) -> Result<impl IntoResponse, ControlPlaneError> {
    let endpoints = state.control_plane.endpoints().list().await?;
    let linked = endpoints
        .iter()
        .map(|e| links.endpoint(e))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(params.paginate(linked)))
}

/// `POST /admin/endpoints`: Create an endpoint.
///
/// # Errors
///
/// Returns [`ControlPlaneError::Conflict`] if the host is taken.
#[utoipa::path(
    post,
    path = "/admin/endpoints",
    tag = "Endpoints",
    summary = "Create an endpoint",
    description = "Creates an endpoint with empty pipelines and mounts it under `/<id>`.",
    request_body = CreateEndpointRequest,
    responses(
        (status = 201, description = "Endpoint created", body = Value),
        (status = 400, description = "Invalid endpoint", body = ErrorResponse),
        (status = 409, description = "Host already in use", body = ErrorResponse),
    )
)]
pub async fn create_endpoint(
    State(state): State<AppState>,
    links: AdminLinks,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, ControlPlaneError> {
    let input = json_body(payload)?;
    let endpoint = state.control_plane.endpoints().create(&input).await?;
    Ok((StatusCode::CREATED, Json(links.endpoint(&endpoint)?)))
}

/// `GET /admin/endpoints/{endpoint}`: Get an endpoint.
///
/// # Errors
///
/// Returns [`ControlPlaneError::NotFound`] if the endpoint does not exist.
#[utoipa::path(
    get,
    path = "/admin/endpoints/{endpoint}",
    tag = "Endpoints",
    summary = "Get an endpoint",
    params(("endpoint" = String, Path, description = "Endpoint id")),
    responses(
        (status = 200, description = "Endpoint", body = Value),
        (status = 404, description = "Endpoint not found", body = ErrorResponse),
    )
)]
pub async fn get_endpoint(
    State(state): State<AppState>,
    links: AdminLinks,
    Path(endpoint): Path<String>,
) -> Result<impl IntoResponse, ControlPlaneError> {
    let id = parse_id("Endpoint", &endpoint)?;
    let endpoint = state.control_plane.endpoints().by_id(id).await?;
    Ok(Json(links.endpoint(&endpoint)?))
}

/// `PUT /admin/endpoints/{endpoint}`: Merge changes into an endpoint.
///
/// # Errors
///
/// Returns [`ControlPlaneError::NotFound`] if the endpoint does not exist,
/// [`ControlPlaneError::InvalidRequest`] if the body touches a pipeline.
#[utoipa::path(
    put,
    path = "/admin/endpoints/{endpoint}",
    tag = "Endpoints",
    summary = "Update an endpoint",
    description = "Merges the body into the endpoint. Pipelines are changed through their own routes.",
    params(("endpoint" = String, Path, description = "Endpoint id")),
    request_body = Value,
    responses(
        (status = 200, description = "Updated endpoint", body = Value),
        (status = 400, description = "Invalid update", body = ErrorResponse),
        (status = 404, description = "Endpoint not found", body = ErrorResponse),
        (status = 409, description = "Host already in use", body = ErrorResponse),
    )
)]
pub async fn update_endpoint(
    State(state): State<AppState>,
    links: AdminLinks,
    Path(endpoint): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, ControlPlaneError> {
    let id = parse_id("Endpoint", &endpoint)?;
    let delta = json_body(payload)?;
    let endpoint = state.control_plane.endpoints().update(id, &delta).await?;
    Ok(Json(links.endpoint(&endpoint)?))
}

/// `DELETE /admin/endpoints/{endpoint}`: Delete an endpoint.
///
/// # Errors
///
/// Returns [`ControlPlaneError::NotFound`] if the endpoint does not exist.
#[utoipa::path(
    delete,
    path = "/admin/endpoints/{endpoint}",
    tag = "Endpoints",
    summary = "Delete an endpoint",
    description = "Removes the endpoint and unmounts its pipeline. Configurations are left in place.",
    params(("endpoint" = String, Path, description = "Endpoint id")),
    responses(
        (status = 204, description = "Endpoint deleted"),
        (status = 404, description = "Endpoint not found", body = ErrorResponse),
    )
)]
pub async fn delete_endpoint(
    State(state): State<AppState>,
    Path(endpoint): Path<String>,
) -> Result<impl IntoResponse, ControlPlaneError> {
    let id = parse_id("Endpoint", &endpoint)?;
    state.control_plane.endpoints().remove(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Endpoint management routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/endpoints", get(list_endpoints).post(create_endpoint))
        .route(
            "/endpoints/{endpoint}",
            get(get_endpoint)
                .put(update_endpoint)
                .delete(delete_endpoint),
        )
}
