//! The unit of work a binding mounts on an endpoint.

use std::fmt;

use axum::body::{Body, Bytes};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};

use super::RequestContext;
use crate::error::ControlPlaneError;

/// A response produced by a stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageResponse {
    /// Status code.
    pub status: StatusCode,
    /// `Content-Type` header value.
    pub content_type: &'static str,
    /// Response body.
    pub body: Bytes,
}

impl StageResponse {
    /// A `200 OK` plain-text response.
    #[must_use]
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            status: StatusCode::OK,
            content_type: "text/plain; charset=utf-8",
            body: Bytes::from(body.into()),
        }
    }

    /// A `200 OK` JSON response.
    #[must_use]
    pub fn json(value: &serde_json::Value) -> Self {
        Self {
            status: StatusCode::OK,
            content_type: "application/json",
            body: Bytes::from(value.to_string()),
        }
    }
}

impl IntoResponse for StageResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(self.content_type),
        );
        response
    }
}

/// What happens after a stage runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    /// Continue with the next matching stage.
    Next,
    /// Stop the pipeline and send this response.
    Respond(StageResponse),
}

/// A request handler built from a module and one of its configurations.
///
/// Stages are synchronous and must not block; they are shared across
/// concurrent requests.
pub trait Stage: Send + Sync + fmt::Debug {
    /// Handles one request.
    ///
    /// # Errors
    ///
    /// Any error ends the request with an error response; the pipeline stays
    /// mounted.
    fn handle(&self, ctx: &mut RequestContext) -> Result<StageOutcome, ControlPlaneError>;
}
