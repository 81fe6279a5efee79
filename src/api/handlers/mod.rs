//! Admin endpoint handlers organized by resource.

pub mod binding;
pub mod configuration;
pub mod endpoint;
pub mod module;
pub mod serve;
pub mod system;

use axum::Json;
use axum::Router;
use axum::extract::rejection::JsonRejection;
use serde_json::Value;

use crate::app_state::AppState;
use crate::domain::DocumentId;
use crate::error::ControlPlaneError;

/// Composes all resource routes under `/admin`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(endpoint::routes())
        .merge(binding::routes())
        .merge(configuration::routes())
        .merge(module::routes())
}

/// Parses a path id. A malformed id cannot name a record, so it reports
/// [`ControlPlaneError::NotFound`].
pub(crate) fn parse_id(entity: &str, raw: &str) -> Result<DocumentId, ControlPlaneError> {
    raw.parse()
        .map_err(|_| ControlPlaneError::not_found(entity, raw))
}

/// Unwraps a JSON body, reporting malformed bodies in the admin error
/// format.
pub(crate) fn json_body(
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Value, ControlPlaneError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ControlPlaneError::InvalidRequest(rejection.body_text()))
}
