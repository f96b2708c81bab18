//! Defines the store the scheduler reads rules from and writes transactions to.

use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::Connection;
use time::OffsetDateTime;

use crate::{
    Error,
    database_id::RuleId,
    recurring::rule::{RecurringRule, advance_next_run_at, get_due_rules},
    transaction::{
        MaterializedTransaction, NewTransaction, insert_transaction, matching_transaction_exists,
    },
};

/// The result of asking a [LedgerStore] to insert a transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    /// The transaction was stored.
    Inserted(MaterializedTransaction),
    /// The rule already has a transaction at this instant, nothing was written.
    AlreadyExists,
}

/// Administrative access to every user's rules and transactions.
///
/// The scheduler acts across all users in a single pass, so it needs a store
/// that is not scoped to one user's session. Implementations must make each
/// method a single atomic operation against the underlying data.
pub trait LedgerStore {
    /// Get every active rule with `next_run_at <= now`.
    fn due_rules(&self, now: OffsetDateTime) -> Result<Vec<RecurringRule>, Error>;

    /// Check whether a transaction matching `transaction` already exists.
    ///
    /// Must not modify the store.
    fn transaction_exists(&self, transaction: &NewTransaction) -> Result<bool, Error>;

    /// Insert `transaction`, unless its rule already has a transaction at the
    /// same instant.
    fn insert_transaction(&self, transaction: &NewTransaction) -> Result<InsertOutcome, Error>;

    /// Set a rule's `next_run_at` to `next` if it is still `due`.
    ///
    /// Returns `false` if the rule had already been moved off `due`.
    fn advance_rule(
        &self,
        rule_id: RuleId,
        due: OffsetDateTime,
        next: OffsetDateTime,
    ) -> Result<bool, Error>;
}

/// Stores rules and transactions in a SQLite database.
#[derive(Debug, Clone)]
pub struct SQLiteLedgerStore {
    connection: Arc<Mutex<Connection>>,
}

impl SQLiteLedgerStore {
    /// Create a new store for the SQLite `connection`.
    ///
    /// The database must have been set up with [crate::initialize_db].
    pub fn new(connection: Arc<Mutex<Connection>>) -> Self {
        Self { connection }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, Error> {
        self.connection.lock().map_err(|error| {
            tracing::error!("could not acquire database lock: {error}");
            Error::DatabaseLockError
        })
    }
}

impl LedgerStore for SQLiteLedgerStore {
    fn due_rules(&self, now: OffsetDateTime) -> Result<Vec<RecurringRule>, Error> {
        let connection = self.lock()?;
        get_due_rules(now, &connection)
    }

    fn transaction_exists(&self, transaction: &NewTransaction) -> Result<bool, Error> {
        let connection = self.lock()?;
        matching_transaction_exists(transaction, &connection)
    }

    fn insert_transaction(&self, transaction: &NewTransaction) -> Result<InsertOutcome, Error> {
        let connection = self.lock()?;
        let outcome = match insert_transaction(transaction, &connection)? {
            Some(inserted) => InsertOutcome::Inserted(inserted),
            None => InsertOutcome::AlreadyExists,
        };

        Ok(outcome)
    }

    fn advance_rule(
        &self,
        rule_id: RuleId,
        due: OffsetDateTime,
        next: OffsetDateTime,
    ) -> Result<bool, Error> {
        let connection = self.lock()?;
        advance_next_run_at(rule_id, due, next, &connection)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use rusqlite::Connection;
    use time::macros::datetime;

    use crate::{
        db::initialize,
        recurring::{
            rule::{create_recurring_rule, test_utils::monthly_rent},
            store::{InsertOutcome, LedgerStore, SQLiteLedgerStore},
        },
        transaction::{NewTransaction, TransactionKind},
    };

    fn get_test_store() -> SQLiteLedgerStore {
        let connection = Connection::open_in_memory().unwrap();
        initialize(&connection).unwrap();
        SQLiteLedgerStore::new(Arc::new(Mutex::new(connection)))
    }

    #[test]
    fn second_insert_for_same_occurrence_already_exists() {
        let store = get_test_store();
        let due = datetime!(2025-01-01 0:00 UTC);
        let rule = create_recurring_rule(monthly_rent(due), &store.lock().unwrap()).unwrap();
        let transaction = NewTransaction {
            user_id: rule.user_id,
            wallet_id: rule.wallet_id,
            category_id: rule.category_id,
            kind: TransactionKind::Expense,
            amount_minor: rule.amount_minor,
            currency_code: rule.currency_code.clone(),
            occurred_at: due,
            description: rule.description.clone(),
            recurring_rule_id: Some(rule.id),
        };

        let first = store.insert_transaction(&transaction).unwrap();
        let second = store.insert_transaction(&transaction).unwrap();

        assert!(matches!(first, InsertOutcome::Inserted(_)));
        assert_eq!(second, InsertOutcome::AlreadyExists);
        assert_eq!(store.transaction_exists(&transaction), Ok(true));
    }

    #[test]
    fn poisoned_lock_is_reported() {
        let store = get_test_store();
        let connection = store.connection.clone();
        let _ = std::thread::spawn(move || {
            let _guard = connection.lock().unwrap();
            panic!("poison the lock");
        })
        .join();

        let result = store.due_rules(datetime!(2025-01-01 0:00 UTC));

        assert_eq!(result, Err(crate::Error::DatabaseLockError));
    }
}
