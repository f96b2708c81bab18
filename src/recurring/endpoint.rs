//! The HTTP endpoint the periodic trigger calls.

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode, header::CACHE_CONTROL},
    response::{IntoResponse, Response},
};
use time::OffsetDateTime;

use crate::{app_state::RecurringState, cron_auth::authorize, recurring::run_due_rules};

/// Run every due recurring rule and respond with a summary.
///
/// The caller must present the cron secret in the `x-cron-secret` header or
/// as a bearer token. Responds with 401 and does nothing otherwise.
pub async fn run_recurring_endpoint(
    State(state): State<RecurringState>,
    headers: HeaderMap,
) -> Response {
    if let Err(error) = authorize(state.cron_secret.as_ref(), &headers) {
        return error.into_response();
    }

    match run_due_rules(&state.ledger_store, OffsetDateTime::now_utc()) {
        Ok(summary) => (
            StatusCode::OK,
            [(CACHE_CONTROL, "no-store")],
            Json(summary.report()),
        )
            .into_response(),
        Err(error) => error.into_response(),
    }
}
