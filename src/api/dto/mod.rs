//! Data Transfer Objects for admin request/response serialization.
//!
//! Handlers accept raw JSON and hand it to the stores, which own
//! projection and validation; the request types here document the
//! accepted shapes in the OpenAPI description.

pub mod admin_dto;
pub mod common_dto;

pub use admin_dto::*;
pub use common_dto::*;
