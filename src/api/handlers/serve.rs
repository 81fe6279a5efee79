//! Serving fallback: every request outside `/admin` and `/health` runs
//! through the pipeline mounted for its first path segment.

use axum::body::{Body, to_bytes};
use axum::extract::{Request, State};
use axum::response::{IntoResponse, Response};

use crate::api::links::base_url;
use crate::app_state::AppState;
use crate::error::ControlPlaneError;
use crate::pipeline::RequestContext;

/// Largest request body buffered for stages.
pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Dispatches a request through the live pipelines.
///
/// Unknown namespaces and requests that no stage answers get `404`; a
/// failing stage gets `500` naming the binding.
pub async fn serve(State(state): State<AppState>, request: Request<Body>) -> Response {
    match context(&state, request).await {
        Ok(mut ctx) => match state.control_plane.root().dispatch(&mut ctx) {
            Ok(response) => response.into_response(),
            Err(err) => err.into_response(),
        },
        Err(err) => err.into_response(),
    }
}

async fn context(
    state: &AppState,
    request: Request<Body>,
) -> Result<RequestContext, ControlPlaneError> {
    let (parts, body) = request.into_parts();
    let body = to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| ControlPlaneError::InvalidRequest(format!("cannot read body: {e}")))?;

    let base = base_url(state.public_base_url.as_deref(), &parts.headers);
    let original = parts
        .uri
        .path_and_query()
        .map_or_else(|| parts.uri.path().to_string(), ToString::to_string);

    let mut ctx = RequestContext::new(parts.method, parts.uri.path());
    ctx.query = parts.uri.query().map(str::to_string);
    ctx.full_url = format!("{base}{original}");
    ctx.base_url = base;
    ctx.headers = parts.headers;
    ctx.body = body;
    tracing::debug!(method = %ctx.method, url = %ctx.full_url, "serving request");
    Ok(ctx)
}
