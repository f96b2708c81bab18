//! Wallet Ledger is a personal multi-wallet, multi-currency ledger.
//!
//! This library provides the recurring-transaction scheduler: a job, invoked
//! periodically over HTTP or from the command line, that turns due recurrence
//! rules into concrete ledger transactions exactly once per occurrence and
//! advances each rule's schedule.

#![warn(missing_docs)]

use std::{net::SocketAddr, time::Duration};

use axum::{
    Json,
    http::{StatusCode, header::CACHE_CONTROL},
    response::{IntoResponse, Response},
};
use axum_server::Handle;
use serde_json::json;
use tokio::signal;

mod app_state;
mod config;
mod cron_auth;
mod database_id;
mod db;
mod endpoints;
mod logging;
mod recurring;
mod routing;
mod timestamp;
mod transaction;

pub use app_state::AppState;
pub use config::{Args, Config};
pub use cron_auth::CronSecret;
pub use database_id::{RuleId, TransactionId, UserId, WalletId};
pub use db::initialize as initialize_db;
pub use logging::{LOG_BODY_LENGTH_LIMIT, logging_middleware};
pub use recurring::{
    Frequency, InsertOutcome, LedgerStore, NewRecurringRule, RecurringRule, RunReport, RunSummary,
    SQLiteLedgerStore, TransactionKind, advance, create_recurring_rule, in_window, run_due_rules,
    set_rule_active,
};
pub use routing::build_router;
pub use transaction::{MaterializedTransaction, NewTransaction};

/// An async task that waits for either the ctrl+c or terminate signal, whichever comes first, and
/// then signals the server to shut down gracefully.
///
/// `handle` is a handle to an Axum `Server`.
pub async fn graceful_shutdown(handle: Handle<SocketAddr>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::debug!("Received ctrl+c signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
        _ = terminate => {
            tracing::debug!("Received terminate signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
    }
}

/// The errors that may occur in the application.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// The trigger credential was missing, did not match, or no credential
    /// has been configured on the server.
    #[error("unauthorized")]
    Unauthorized,

    /// The requested resource was not found.
    ///
    /// Internally, this error may occur when a query returns no rows.
    #[error("the requested resource could not be found")]
    NotFound,

    /// An unhandled/unexpected SQL error.
    #[error("an unexpected SQL error occurred: {0}")]
    SqlError(rusqlite::Error),

    /// Could not acquire the database lock
    #[error("could not acquire the database lock")]
    DatabaseLockError,

    /// A frequency code read from the database is not one of `daily`,
    /// `weekly` or `monthly`.
    #[error("\"{0}\" is not a valid frequency")]
    InvalidFrequency(String),

    /// A transaction type read from the database is not one of `income` or
    /// `expense`.
    #[error("\"{0}\" is not a valid transaction type")]
    InvalidTransactionKind(String),

    /// Advancing a schedule would produce a date outside the supported range.
    #[error("the next occurrence is outside the supported date range")]
    ScheduleOutOfRange,

    /// A recurring rule failed validation when it was created.
    #[error("invalid recurring rule: {0}")]
    InvalidRule(String),

    /// Tried to update a rule that does not exist
    #[error("tried to update a rule that is not in the database")]
    UpdateMissingRule,
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        match value {
            rusqlite::Error::QueryReturnedNoRows => Error::NotFound,
            error => {
                tracing::error!("an unhandled SQL error occurred: {}", error);
                Error::SqlError(error)
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match self {
            Error::Unauthorized => StatusCode::UNAUTHORIZED,
            Error::NotFound => StatusCode::NOT_FOUND,
            // Any errors that are not handled above are not intended to be shown to the client.
            ref error => {
                tracing::error!("An unexpected error occurred: {}", error);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (
            status,
            [(CACHE_CONTROL, "no-store")],
            Json(json!({ "error": self.to_string() })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod error_tests {
    use axum::{http::StatusCode, response::IntoResponse};

    use crate::Error;

    #[test]
    fn unauthorized_maps_to_401() {
        let response = Error::Unauthorized.into_response();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers().get("cache-control").unwrap(), "no-store");
    }

    #[test]
    fn database_errors_map_to_500() {
        let response = Error::DatabaseLockError.into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn no_rows_maps_to_not_found() {
        let error: Error = rusqlite::Error::QueryReturnedNoRows.into();

        assert_eq!(error, Error::NotFound);
    }
}
