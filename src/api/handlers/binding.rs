//! Pipeline handlers: the `middleware` and `adapters` lists of an endpoint.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::Value;

use super::{json_body, parse_id};
use crate::api::dto::CreateBindingRequest;
use crate::api::links::AdminLinks;
use crate::app_state::AppState;
use crate::domain::{Binding, DocumentId, Endpoint, PipelineKey};
use crate::error::{ControlPlaneError, ErrorResponse};

fn pipeline_key(raw: &str) -> Result<PipelineKey, ControlPlaneError> {
    raw.parse()
        .map_err(|_| ControlPlaneError::not_found("pipeline", raw))
}

fn linked_bindings(
    links: &AdminLinks,
    endpoint: &Endpoint,
    key: PipelineKey,
) -> Result<Value, ControlPlaneError> {
    endpoint
        .bindings(key)
        .iter()
        .map(|b| links.binding(endpoint.id, key, b))
        .collect::<Result<Vec<_>, _>>()
        .map(Value::Array)
}

/// Reads a reorder body: an array of binding ids, or of objects carrying
/// an `id`.
fn binding_order(body: &Value) -> Result<Vec<DocumentId>, ControlPlaneError> {
    let Some(items) = body.as_array() else {
        return Err(ControlPlaneError::InvalidRequest(
            "reorder body must be an array of binding ids".into(),
        ));
    };
    items
        .iter()
        .map(|item| {
            let raw = match item {
                Value::Object(obj) => obj.get("id").and_then(Value::as_str),
                other => other.as_str(),
            };
            raw.and_then(|s| s.parse().ok()).ok_or_else(|| {
                ControlPlaneError::Reorder(format!("{item} is not a binding id"))
            })
        })
        .collect()
}

/// `GET /admin/endpoints/{endpoint}/{pipeline}`: List a pipeline.
///
/// # Errors
///
/// Returns [`ControlPlaneError::NotFound`] if the endpoint or pipeline
/// does not exist.
#[utoipa::path(
    get,
    path = "/admin/endpoints/{endpoint}/{pipeline}",
    tag = "Pipelines",
    summary = "List a pipeline",
    description = "Returns the bindings of `middleware` or `adapters`, in execution order.",
    params(
        ("endpoint" = String, Path, description = "Endpoint id"),
        ("pipeline" = String, Path, description = "`middleware` or `adapters`"),
    ),
    responses(
        (status = 200, description = "Bindings in order", body = Value),
        (status = 404, description = "Endpoint or pipeline not found", body = ErrorResponse),
    )
)]
pub async fn list_bindings(
    State(state): State<AppState>,
    links: AdminLinks,
    Path((endpoint, pipeline)): Path<(String, String)>,
) -> Result<impl IntoResponse, ControlPlaneError> {
    let id = parse_id("Endpoint", &endpoint)?;
    let key = pipeline_key(&pipeline)?;
    let bindings: Vec<Binding> = state
        .control_plane
        .endpoints()
        .list_child(id, key.as_str())
        .await?;
    let linked = bindings
        .iter()
        .map(|b| links.binding(id, key, b))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(linked))
}

/// `POST /admin/endpoints/{endpoint}/{pipeline}`: Append bindings.
///
/// An object appends one binding and returns it. An array appends all of
/// them in one write and returns the whole pipeline.
///
/// # Errors
///
/// Returns [`ControlPlaneError::Validation`] for a malformed binding and
/// [`ControlPlaneError::NotFound`] if the endpoint, pipeline or referenced
/// configuration does not exist.
#[utoipa::path(
    post,
    path = "/admin/endpoints/{endpoint}/{pipeline}",
    tag = "Pipelines",
    summary = "Append bindings",
    description = "Appends one binding (object body) or several (array body) to the pipeline.",
    params(
        ("endpoint" = String, Path, description = "Endpoint id"),
        ("pipeline" = String, Path, description = "`middleware` or `adapters`"),
    ),
    request_body = CreateBindingRequest,
    responses(
        (status = 201, description = "Binding or pipeline after the append", body = Value),
        (status = 400, description = "Invalid binding", body = ErrorResponse),
        (status = 404, description = "Endpoint, pipeline or configuration not found", body = ErrorResponse),
    )
)]
pub async fn create_binding(
    State(state): State<AppState>,
    links: AdminLinks,
    Path((endpoint, pipeline)): Path<(String, String)>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, ControlPlaneError> {
    let id = parse_id("Endpoint", &endpoint)?;
    let key = pipeline_key(&pipeline)?;
    let input = json_body(payload)?;
    let endpoints = state.control_plane.endpoints();

    let body = if let Value::Array(items) = &input {
        let endpoint = endpoints.add_children(id, key.as_str(), items).await?;
        linked_bindings(&links, &endpoint, key)?
    } else {
        let change = endpoints.create_child(id, key.as_str(), &input).await?;
        let binding: Binding = serde_json::from_value(change.child)
            .map_err(|e| ControlPlaneError::Internal(format!("stored binding is invalid: {e}")))?;
        links.binding(id, key, &binding)?
    };
    Ok((StatusCode::CREATED, Json(body)))
}

/// `PUT /admin/endpoints/{endpoint}/{pipeline}`: Reorder a pipeline.
///
/// # Errors
///
/// Returns [`ControlPlaneError::Reorder`] unless the body is a permutation
/// of the current binding ids.
#[utoipa::path(
    put,
    path = "/admin/endpoints/{endpoint}/{pipeline}",
    tag = "Pipelines",
    summary = "Reorder a pipeline",
    description = "Takes every current binding id exactly once, in the new execution order.",
    params(
        ("endpoint" = String, Path, description = "Endpoint id"),
        ("pipeline" = String, Path, description = "`middleware` or `adapters`"),
    ),
    request_body = Vec<String>,
    responses(
        (status = 200, description = "Pipeline in its new order", body = Value),
        (status = 400, description = "Body is not an array", body = ErrorResponse),
        (status = 422, description = "Not a permutation of the current ids", body = ErrorResponse),
        (status = 404, description = "Endpoint or pipeline not found", body = ErrorResponse),
    )
)]
pub async fn reorder_bindings(
    State(state): State<AppState>,
    links: AdminLinks,
    Path((endpoint, pipeline)): Path<(String, String)>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, ControlPlaneError> {
    let id = parse_id("Endpoint", &endpoint)?;
    let key = pipeline_key(&pipeline)?;
    let order = binding_order(&json_body(payload)?)?;
    let endpoint = state
        .control_plane
        .endpoints()
        .reorder_children(id, key.as_str(), &order)
        .await?;
    Ok(Json(linked_bindings(&links, &endpoint, key)?))
}

/// `GET /admin/endpoints/{endpoint}/{pipeline}/{binding}`: Get a binding.
///
/// # Errors
///
/// Returns [`ControlPlaneError::NotFound`] if any path segment names
/// nothing.
#[utoipa::path(
    get,
    path = "/admin/endpoints/{endpoint}/{pipeline}/{binding}",
    tag = "Pipelines",
    summary = "Get a binding",
    params(
        ("endpoint" = String, Path, description = "Endpoint id"),
        ("pipeline" = String, Path, description = "`middleware` or `adapters`"),
        ("binding" = String, Path, description = "Binding id"),
    ),
    responses(
        (status = 200, description = "Binding", body = Value),
        (status = 404, description = "Not found", body = ErrorResponse),
    )
)]
pub async fn get_binding(
    State(state): State<AppState>,
    links: AdminLinks,
    Path((endpoint, pipeline, binding)): Path<(String, String, String)>,
) -> Result<impl IntoResponse, ControlPlaneError> {
    let id = parse_id("Endpoint", &endpoint)?;
    let key = pipeline_key(&pipeline)?;
    let binding_id = parse_id(key.as_str(), &binding)?;
    let binding: Binding = state
        .control_plane
        .endpoints()
        .child_by_id(id, key.as_str(), binding_id)
        .await?;
    Ok(Json(links.binding(id, key, &binding)?))
}

/// `PUT /admin/endpoints/{endpoint}/{pipeline}/{binding}`: Update a
/// binding.
///
/// # Errors
///
/// Returns [`ControlPlaneError::NotFound`] if any path segment names
/// nothing, [`ControlPlaneError::Validation`] if the merged binding is
/// invalid.
#[utoipa::path(
    put,
    path = "/admin/endpoints/{endpoint}/{pipeline}/{binding}",
    tag = "Pipelines",
    summary = "Update a binding",
    description = "Merges the body into the binding; the binding keeps its id and position.",
    params(
        ("endpoint" = String, Path, description = "Endpoint id"),
        ("pipeline" = String, Path, description = "`middleware` or `adapters`"),
        ("binding" = String, Path, description = "Binding id"),
    ),
    request_body = Value,
    responses(
        (status = 200, description = "Updated binding", body = Value),
        (status = 400, description = "Invalid binding", body = ErrorResponse),
        (status = 404, description = "Not found", body = ErrorResponse),
    )
)]
pub async fn update_binding(
    State(state): State<AppState>,
    links: AdminLinks,
    Path((endpoint, pipeline, binding)): Path<(String, String, String)>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, ControlPlaneError> {
    let id = parse_id("Endpoint", &endpoint)?;
    let key = pipeline_key(&pipeline)?;
    let binding_id = parse_id(key.as_str(), &binding)?;
    let delta = json_body(payload)?;
    let change = state
        .control_plane
        .endpoints()
        .update_child(id, key.as_str(), binding_id, &delta)
        .await?;
    let binding: Binding = serde_json::from_value(change.child)
        .map_err(|e| ControlPlaneError::Internal(format!("stored binding is invalid: {e}")))?;
    Ok(Json(links.binding(id, key, &binding)?))
}

/// `DELETE /admin/endpoints/{endpoint}/{pipeline}/{binding}`: Remove a
/// binding.
///
/// # Errors
///
/// Returns [`ControlPlaneError::NotFound`] if any path segment names
/// nothing.
#[utoipa::path(
    delete,
    path = "/admin/endpoints/{endpoint}/{pipeline}/{binding}",
    tag = "Pipelines",
    summary = "Remove a binding",
    params(
        ("endpoint" = String, Path, description = "Endpoint id"),
        ("pipeline" = String, Path, description = "`middleware` or `adapters`"),
        ("binding" = String, Path, description = "Binding id"),
    ),
    responses(
        (status = 204, description = "Binding removed"),
        (status = 404, description = "Not found", body = ErrorResponse),
    )
)]
pub async fn delete_binding(
    State(state): State<AppState>,
    Path((endpoint, pipeline, binding)): Path<(String, String, String)>,
) -> Result<impl IntoResponse, ControlPlaneError> {
    let id = parse_id("Endpoint", &endpoint)?;
    let key = pipeline_key(&pipeline)?;
    let binding_id = parse_id(key.as_str(), &binding)?;
    state
        .control_plane
        .endpoints()
        .delete_child_by_id(id, key.as_str(), binding_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Pipeline management routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/endpoints/{endpoint}/{pipeline}",
            get(list_bindings)
                .post(create_binding)
                .put(reorder_bindings),
        )
        .route(
            "/endpoints/{endpoint}/{pipeline}/{binding}",
            get(get_binding)
                .put(update_binding)
                .delete(delete_binding),
        )
}
