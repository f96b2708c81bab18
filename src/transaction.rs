//! Defines the ledger transaction model and the queries the scheduler needs against it.
//!
//! Transactions are owned by the wider ledger. The scheduler only ever inserts
//! them and looks them up by exact match, it never edits or deletes them.

use std::{fmt::Display, str::FromStr};

use rusqlite::{
    Connection, OptionalExtension, Row, ToSql,
    types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef},
};
use time::OffsetDateTime;

use crate::{
    Error,
    database_id::{CategoryId, RuleId, TransactionId, UserId, WalletId},
    timestamp::{get_instant, to_unix_seconds},
};

// ============================================================================
// MODELS
// ============================================================================

/// Whether a transaction adds money to or takes money out of a wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionKind {
    /// Money earned.
    Income,
    /// Money spent.
    Expense,
}

impl TransactionKind {
    /// The name used for the kind in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Income => "income",
            TransactionKind::Expense => "expense",
        }
    }
}

impl Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "income" => Ok(TransactionKind::Income),
            "expense" => Ok(TransactionKind::Expense),
            other => Err(Error::InvalidTransactionKind(other.to_owned())),
        }
    }
}

impl ToSql for TransactionKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for TransactionKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|error| FromSqlError::Other(Box::new(error)))
    }
}

/// A transaction stored in the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterializedTransaction {
    /// The ID of the transaction.
    pub id: TransactionId,
    /// The user that owns the transaction.
    pub user_id: UserId,
    /// The wallet the money moved in or out of.
    pub wallet_id: WalletId,
    /// The category of the transaction, e.g. "Rent".
    pub category_id: Option<CategoryId>,
    /// Income or expense.
    pub kind: TransactionKind,
    /// The amount in the currency's minor units, e.g. cents.
    pub amount_minor: i64,
    /// The ISO 4217 code of the currency, e.g. "NZD".
    pub currency_code: String,
    /// When the transaction happened.
    pub occurred_at: OffsetDateTime,
    /// A text description of what the transaction was for.
    pub description: Option<String>,
    /// The recurring rule that produced this transaction, if any.
    pub recurring_rule_id: Option<RuleId>,
}

/// The fields needed to insert a [MaterializedTransaction].
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    /// The user that owns the transaction.
    pub user_id: UserId,
    /// The wallet the money moved in or out of.
    pub wallet_id: WalletId,
    /// The category of the transaction.
    pub category_id: Option<CategoryId>,
    /// Income or expense.
    pub kind: TransactionKind,
    /// The amount in the currency's minor units.
    pub amount_minor: i64,
    /// The ISO 4217 code of the currency.
    pub currency_code: String,
    /// When the transaction happened.
    pub occurred_at: OffsetDateTime,
    /// A text description of what the transaction was for.
    pub description: Option<String>,
    /// The recurring rule that produced this transaction, if any.
    pub recurring_rule_id: Option<RuleId>,
}

// ============================================================================
// DATABASE FUNCTIONS
// ============================================================================

/// Insert a transaction unless its recurring rule already has one at the same instant.
///
/// Returns `None` when the `(recurring_rule_id, occurred_at)` pair is already
/// taken. Transactions without a recurring rule are always inserted.
///
/// # Errors
/// This function will return a [Error::SqlError] if there is an SQL error.
pub fn insert_transaction(
    transaction: &NewTransaction,
    connection: &Connection,
) -> Result<Option<MaterializedTransaction>, Error> {
    connection
        .prepare(
            "INSERT INTO \"transaction\"
                (user_id, wallet_id, category_id, type, amount_minor, currency_code,
                 occurred_at, description, recurring_rule_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT (recurring_rule_id, occurred_at) DO NOTHING
             RETURNING id, user_id, wallet_id, category_id, type, amount_minor, currency_code,
                 occurred_at, description, recurring_rule_id",
        )?
        .query_row(
            (
                transaction.user_id,
                transaction.wallet_id,
                transaction.category_id,
                transaction.kind,
                transaction.amount_minor,
                &transaction.currency_code,
                to_unix_seconds(transaction.occurred_at),
                &transaction.description,
                transaction.recurring_rule_id,
            ),
            map_transaction_row,
        )
        .optional()
        .map_err(|error| error.into())
}

/// Check whether a transaction matching `transaction` already exists.
///
/// A match is either a transaction from the same recurring rule at the same
/// instant, or one with the same user, wallet, amount, currency, kind and
/// instant. Category and description are not compared.
///
/// # Errors
/// This function will return a [Error::SqlError] if there is an SQL error.
pub fn matching_transaction_exists(
    transaction: &NewTransaction,
    connection: &Connection,
) -> Result<bool, Error> {
    connection
        .prepare(
            "SELECT EXISTS(
                SELECT 1 FROM \"transaction\"
                WHERE occurred_at = :occurred_at
                  AND (
                    (recurring_rule_id IS NOT NULL AND recurring_rule_id = :rule_id)
                    OR (user_id = :user_id
                        AND wallet_id = :wallet_id
                        AND amount_minor = :amount_minor
                        AND currency_code = :currency_code
                        AND type = :type)
                  )
            )",
        )?
        .query_row(
            rusqlite::named_params! {
                ":occurred_at": to_unix_seconds(transaction.occurred_at),
                ":rule_id": transaction.recurring_rule_id,
                ":user_id": transaction.user_id,
                ":wallet_id": transaction.wallet_id,
                ":amount_minor": transaction.amount_minor,
                ":currency_code": transaction.currency_code,
                ":type": transaction.kind,
            },
            |row| row.get(0),
        )
        .map_err(|error| error.into())
}

/// Get every transaction produced by the recurring rule `rule_id`, oldest first.
///
/// # Errors
/// This function will return a [Error::SqlError] if there is an SQL error.
#[cfg(test)]
pub fn get_transactions_for_rule(
    rule_id: RuleId,
    connection: &Connection,
) -> Result<Vec<MaterializedTransaction>, Error> {
    connection
        .prepare(
            "SELECT id, user_id, wallet_id, category_id, type, amount_minor, currency_code,
                occurred_at, description, recurring_rule_id
             FROM \"transaction\"
             WHERE recurring_rule_id = :rule_id
             ORDER BY occurred_at ASC",
        )?
        .query_map(&[(":rule_id", &rule_id)], map_transaction_row)?
        .map(|maybe_transaction| maybe_transaction.map_err(|error| error.into()))
        .collect()
}

/// Get the total number of transactions in the database.
///
/// # Errors
/// This function will return a [Error::SqlError] there is some SQL error.
#[cfg(test)]
pub fn count_transactions(connection: &Connection) -> Result<u32, Error> {
    connection
        .query_row("SELECT COUNT(id) FROM \"transaction\";", [], |row| {
            row.get(0)
        })
        .map_err(|error| error.into())
}

/// Create the transaction table in the database.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL error.
pub fn create_transaction_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS \"transaction\" (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                wallet_id INTEGER NOT NULL,
                category_id INTEGER,
                type TEXT NOT NULL CHECK (type IN ('income', 'expense')),
                amount_minor INTEGER NOT NULL,
                currency_code TEXT NOT NULL,
                occurred_at INTEGER NOT NULL,
                description TEXT,
                recurring_rule_id INTEGER,
                FOREIGN KEY(recurring_rule_id) REFERENCES recurring_rule(id)
                    ON UPDATE CASCADE ON DELETE SET NULL
                )",
        (),
    )?;

    // Ensure the sequence starts at 1
    connection.execute(
        "INSERT OR IGNORE INTO sqlite_sequence (name, seq) VALUES ('transaction', 0)",
        (),
    )?;

    // One transaction per rule occurrence. NULL rule IDs never conflict.
    connection.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_transaction_rule_occurrence
            ON \"transaction\"(recurring_rule_id, occurred_at);",
        (),
    )?;

    // Composite lookup used when checking for an existing occurrence.
    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_transaction_occurrence_match
            ON \"transaction\"(user_id, wallet_id, occurred_at);",
        (),
    )?;

    Ok(())
}

/// Map a database row to a [MaterializedTransaction].
pub fn map_transaction_row(row: &Row) -> Result<MaterializedTransaction, rusqlite::Error> {
    Ok(MaterializedTransaction {
        id: row.get(0)?,
        user_id: row.get(1)?,
        wallet_id: row.get(2)?,
        category_id: row.get(3)?,
        kind: row.get(4)?,
        amount_minor: row.get(5)?,
        currency_code: row.get(6)?,
        occurred_at: get_instant(row, 7)?,
        description: row.get(8)?,
        recurring_rule_id: row.get(9)?,
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod database_tests {
    use rusqlite::Connection;
    use time::macros::datetime;

    use crate::{
        Error,
        db::initialize,
        transaction::{
            NewTransaction, TransactionKind, count_transactions, insert_transaction,
            matching_transaction_exists,
        },
    };

    fn get_test_connection() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        conn
    }

    fn manual_transaction() -> NewTransaction {
        NewTransaction {
            user_id: 1,
            wallet_id: 2,
            category_id: None,
            kind: TransactionKind::Expense,
            amount_minor: 120_000,
            currency_code: "NZD".to_owned(),
            occurred_at: datetime!(2025-01-01 0:00 UTC),
            description: Some("Rent".to_owned()),
            recurring_rule_id: None,
        }
    }

    #[test]
    fn insert_succeeds() {
        let conn = get_test_connection();
        let want = manual_transaction();

        let got = insert_transaction(&want, &conn)
            .expect("Could not insert transaction")
            .expect("Transaction was not inserted");

        assert_eq!(got.id, 1);
        assert_eq!(got.amount_minor, want.amount_minor);
        assert_eq!(got.kind, want.kind);
        assert_eq!(got.occurred_at, want.occurred_at);
        assert_eq!(got.description, want.description);
    }

    #[test]
    fn manual_transactions_never_conflict() {
        let conn = get_test_connection();
        let transaction = manual_transaction();

        insert_transaction(&transaction, &conn).unwrap();
        let second = insert_transaction(&transaction, &conn).unwrap();

        assert!(second.is_some());
        assert_eq!(count_transactions(&conn), Ok(2));
    }

    #[test]
    fn insert_for_same_rule_occurrence_is_skipped() {
        let conn = get_test_connection();
        conn.execute("PRAGMA foreign_keys = OFF;", ()).unwrap();
        let transaction = NewTransaction {
            recurring_rule_id: Some(7),
            ..manual_transaction()
        };

        insert_transaction(&transaction, &conn).unwrap();
        let second = insert_transaction(&transaction, &conn).unwrap();

        assert_eq!(second, None);
        assert_eq!(count_transactions(&conn), Ok(1));
    }

    #[test]
    fn finds_composite_match() {
        let conn = get_test_connection();
        let transaction = manual_transaction();
        insert_transaction(&transaction, &conn).unwrap();

        let candidate = NewTransaction {
            description: Some("Different description".to_owned()),
            category_id: Some(3),
            ..transaction
        };

        assert_eq!(matching_transaction_exists(&candidate, &conn), Ok(true));
    }

    #[test]
    fn different_amount_is_not_a_match() {
        let conn = get_test_connection();
        let transaction = manual_transaction();
        insert_transaction(&transaction, &conn).unwrap();

        let candidate = NewTransaction {
            amount_minor: transaction.amount_minor + 1,
            ..transaction
        };

        assert_eq!(matching_transaction_exists(&candidate, &conn), Ok(false));
    }

    #[test]
    fn different_instant_is_not_a_match() {
        let conn = get_test_connection();
        let transaction = manual_transaction();
        insert_transaction(&transaction, &conn).unwrap();

        let candidate = NewTransaction {
            occurred_at: datetime!(2025-01-01 0:00:01 UTC),
            ..transaction
        };

        assert_eq!(matching_transaction_exists(&candidate, &conn), Ok(false));
    }

    #[test]
    fn parse_rejects_unknown_kind() {
        let got = "transfer".parse::<TransactionKind>();

        assert_eq!(
            got,
            Err(Error::InvalidTransactionKind("transfer".to_owned()))
        );
    }
}
