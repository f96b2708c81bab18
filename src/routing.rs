//! Application router configuration.

use axum::{
    Json, Router,
    http::header::CACHE_CONTROL,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::json;
use tower_http::limit::RequestBodyLimitLayer;

use crate::{
    AppState, endpoints,
    logging::{MAX_REQUEST_BODY_LENGTH, logging_middleware},
    recurring::run_recurring_endpoint,
};

/// Return a router with all the app's routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(endpoints::HEALTH, get(get_health))
        .route(
            endpoints::RUN_RECURRING,
            get(run_recurring_endpoint).post(run_recurring_endpoint),
        )
        .layer(middleware::from_fn(logging_middleware))
        .layer(RequestBodyLimitLayer::new(MAX_REQUEST_BODY_LENGTH))
        .with_state(state)
}

/// Report that the server is up.
async fn get_health() -> Response {
    ([(CACHE_CONTROL, "no-store")], Json(json!({ "status": "ok" }))).into_response()
}
