//! HTTP layer: admin handlers, DTOs, links, `OpenAPI` and router
//! composition.
//!
//! Admin endpoints are mounted under `/admin`; everything the router does
//! not match falls through to the serving pipelines.

pub mod dto;
pub mod handlers;
pub mod links;
pub mod openapi;

use axum::Router;
use axum::routing::get;

use crate::app_state::AppState;

/// Builds the complete router: admin API, system routes, `OpenAPI` and the
/// serving fallback.
pub fn build_router() -> Router<AppState> {
    let admin = handlers::routes().route("/openapi.json", get(openapi::get_openapi_json));
    let router = Router::new()
        .nest("/admin", admin)
        .merge(handlers::system::routes())
        .fallback(handlers::serve::serve);

    #[cfg(feature = "swagger-ui")]
    let router = router.merge(
        utoipa_swagger_ui::SwaggerUi::new("/admin/docs")
            .config(utoipa_swagger_ui::Config::from(openapi::OPENAPI_PATH)),
    );

    router
}
