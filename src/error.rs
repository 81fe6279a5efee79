//! Control plane error types with HTTP status code mapping.
//!
//! [`ControlPlaneError`] is the central error type for the crate. Every
//! component (store engine, module registry, reconciler, admin surface)
//! returns it, and each variant maps to a taxonomy kind, a numeric code and
//! an HTTP status.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 1001,
///     "kind": "ValidationError",
///     "message": "invalid parameters for module sample: repeat must be >= 1"
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code, taxonomy kind and message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code.
    pub code: u32,
    /// Taxonomy kind (e.g. `"NotFoundError"`).
    pub kind: &'static str,
    /// Human-readable error message.
    pub message: String,
}

/// Server-side error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category             | HTTP Status                 |
/// |-----------|----------------------|-----------------------------|
/// | 1000–1999 | Validation / request | 400 Bad Request             |
/// | 2000–2999 | State                | 404 / 409 / 422             |
/// | 3000–3999 | Server               | 500 Internal Server Error   |
/// | 4000–4999 | Pipeline             | 422 / 500                   |
#[derive(Debug, Clone, thiserror::Error)]
pub enum ControlPlaneError {
    /// Parameters or record shape failed validation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Malformed admin request (unknown child key, bad body shape).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A record or child record with the given id does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity or child key the lookup targeted.
        entity: String,
        /// Identifier that was not found.
        id: String,
    },

    /// Uniqueness violation (e.g. duplicate endpoint host).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Referenced module is missing, or no instance is cached for a
    /// configuration at invocation time.
    #[error("configuration mismatch: {0}")]
    ConfigurationMismatch(String),

    /// Supplied child order is not a permutation of the current children.
    #[error("invalid reorder: {0}")]
    Reorder(String),

    /// A pipeline stage failed while handling a request.
    #[error("stage {binding} failed: {message}")]
    StageFailure {
        /// Binding id of the failing stage.
        binding: String,
        /// Failure description.
        message: String,
    },

    /// Storage backend failure.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ControlPlaneError {
    /// Shorthand for [`ControlPlaneError::NotFound`].
    pub fn not_found(entity: impl Into<String>, id: impl ToString) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Returns the taxonomy kind surfaced to admin clients.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "ValidationError",
            Self::InvalidRequest(_) => "InvalidRequest",
            Self::NotFound { .. } => "NotFoundError",
            Self::Conflict(_) => "ConflictError",
            Self::ConfigurationMismatch(_) => "ConfigurationMismatchError",
            Self::Reorder(_) => "ReorderError",
            Self::StageFailure { .. } => "StageFailure",
            Self::Persistence(_) => "PersistenceError",
            Self::Internal(_) => "InternalError",
        }
    }

    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::Validation(_) => 1001,
            Self::InvalidRequest(_) => 1002,
            Self::NotFound { .. } => 2001,
            Self::Conflict(_) => 2002,
            Self::Reorder(_) => 2003,
            Self::Persistence(_) => 3001,
            Self::Internal(_) => 3000,
            Self::ConfigurationMismatch(_) => 4001,
            Self::StageFailure { .. } => 4002,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Reorder(_) | Self::ConfigurationMismatch(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::StageFailure { .. } | Self::Persistence(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<sqlx::Error> for ControlPlaneError {
    fn from(err: sqlx::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}

impl IntoResponse for ControlPlaneError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                kind: self.kind(),
                message: self.to_string(),
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_kinds_are_stable() {
        assert_eq!(
            ControlPlaneError::Validation("x".into()).kind(),
            "ValidationError"
        );
        assert_eq!(
            ControlPlaneError::not_found("Endpoint", "abc").kind(),
            "NotFoundError"
        );
        assert_eq!(
            ControlPlaneError::Reorder("x".into()).kind(),
            "ReorderError"
        );
        assert_eq!(
            ControlPlaneError::ConfigurationMismatch("x".into()).kind(),
            "ConfigurationMismatchError"
        );
    }

    #[test]
    fn conflict_maps_to_409() {
        let err = ControlPlaneError::Conflict("host taken".into());
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(err.error_code(), 2002);
    }

    #[test]
    fn not_found_message_names_entity() {
        let err = ControlPlaneError::not_found("Endpoint.middleware", "42");
        assert_eq!(err.to_string(), "Endpoint.middleware not found: 42");
    }

    #[test]
    fn into_response_sets_status() {
        let response = ControlPlaneError::Validation("bad".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
