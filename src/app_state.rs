//! Implements a struct that holds the state of the REST server.

use std::sync::{Arc, Mutex};

use axum::extract::FromRef;
use rusqlite::Connection;

use crate::{Error, cron_auth::CronSecret, db::initialize, recurring::SQLiteLedgerStore};

/// The state of the REST server.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The credential the periodic trigger must present. `None` rejects every
    /// trigger.
    pub cron_secret: Option<CronSecret>,

    /// Unscoped access to every user's rules and transactions.
    pub ledger_store: SQLiteLedgerStore,

    /// The database connection
    pub db_connection: Arc<Mutex<Connection>>,
}

impl AppState {
    /// Create a new [AppState] with a SQLite database connection.
    ///
    /// This function will initialize the database by adding the tables for the domain models.
    ///
    /// # Errors
    /// Returns an error if the database cannot be initialized.
    pub fn new(db_connection: Connection, cron_secret: Option<CronSecret>) -> Result<Self, Error> {
        initialize(&db_connection)?;

        let connection = Arc::new(Mutex::new(db_connection));

        Ok(Self {
            cron_secret,
            ledger_store: SQLiteLedgerStore::new(connection.clone()),
            db_connection: connection,
        })
    }
}

/// The state needed to run recurring rules from a request.
#[derive(Debug, Clone)]
pub struct RecurringState {
    /// The credential the periodic trigger must present.
    pub cron_secret: Option<CronSecret>,
    /// The store the rules are read from and the transactions written to.
    pub ledger_store: SQLiteLedgerStore,
}

impl FromRef<AppState> for RecurringState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            cron_secret: state.cron_secret.clone(),
            ledger_store: state.ledger_store.clone(),
        }
    }
}
