//! Defines the recurring rule model and its database queries.

use std::{fmt::Display, str::FromStr};

use rusqlite::{
    Connection, Row, ToSql,
    types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef},
};
use time::{Date, OffsetDateTime, UtcOffset};

use crate::{
    Error,
    database_id::{CategoryId, RuleId, UserId, WalletId},
    timestamp::{get_instant, to_unix_seconds},
    transaction::TransactionKind,
};

// ============================================================================
// MODELS
// ============================================================================

/// The calendar unit a recurring rule repeats on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frequency {
    /// Every `interval` days.
    Daily,
    /// Every `interval` weeks.
    Weekly,
    /// Every `interval` calendar months.
    Monthly,
}

impl Frequency {
    /// The name used for the frequency in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
        }
    }
}

impl Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(Frequency::Daily),
            "weekly" => Ok(Frequency::Weekly),
            "monthly" => Ok(Frequency::Monthly),
            other => Err(Error::InvalidFrequency(other.to_owned())),
        }
    }
}

impl ToSql for Frequency {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for Frequency {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|error| FromSqlError::Other(Box::new(error)))
    }
}

/// A user's standing instruction to produce a transaction on a schedule,
/// e.g. "pay rent on the 1st of every month".
#[derive(Debug, Clone, PartialEq)]
pub struct RecurringRule {
    /// The ID of the rule.
    pub id: RuleId,
    /// The user that owns the rule and the transactions it produces.
    pub user_id: UserId,
    /// The wallet the transactions are recorded against.
    pub wallet_id: WalletId,
    /// The category given to produced transactions.
    pub category_id: Option<CategoryId>,
    /// Income or expense.
    pub kind: TransactionKind,
    /// The amount in the currency's minor units, e.g. cents.
    pub amount_minor: i64,
    /// The ISO 4217 code of the currency, e.g. "NZD".
    pub currency_code: String,
    /// Copied onto produced transactions.
    pub description: Option<String>,
    /// The calendar unit the rule repeats on.
    pub frequency: Frequency,
    /// How many units of `frequency` lie between occurrences.
    ///
    /// Values below 1 are treated as 1 when advancing the schedule.
    pub interval: i64,
    /// Informational only, the next occurrence is derived from `next_run_at`.
    pub day_of_month: Option<u8>,
    /// Informational only, 0 is Monday.
    pub day_of_week: Option<u8>,
    /// The first date the rule may fire on. `None` means the rule has always
    /// been started.
    pub start_date: Option<Date>,
    /// The last date the rule may fire on. `None` means the rule never ends.
    pub end_date: Option<Date>,
    /// The next instant the rule is due.
    pub next_run_at: OffsetDateTime,
    /// Inactive (paused) rules are never run.
    pub is_active: bool,
}

/// The fields needed to create a [RecurringRule].
#[derive(Debug, Clone, PartialEq)]
pub struct NewRecurringRule {
    /// The user that owns the rule.
    pub user_id: UserId,
    /// The wallet the transactions are recorded against.
    pub wallet_id: WalletId,
    /// The category given to produced transactions.
    pub category_id: Option<CategoryId>,
    /// Income or expense.
    pub kind: TransactionKind,
    /// The amount in the currency's minor units.
    pub amount_minor: i64,
    /// The ISO 4217 code of the currency.
    pub currency_code: String,
    /// Copied onto produced transactions.
    pub description: Option<String>,
    /// The calendar unit the rule repeats on.
    pub frequency: Frequency,
    /// How many units of `frequency` lie between occurrences, at least 1.
    pub interval: i64,
    /// Informational day-of-month hint.
    pub day_of_month: Option<u8>,
    /// Informational day-of-week hint.
    pub day_of_week: Option<u8>,
    /// The first date the rule may fire on.
    pub start_date: Option<Date>,
    /// The last date the rule may fire on.
    pub end_date: Option<Date>,
    /// The first occurrence.
    pub first_run_at: OffsetDateTime,
}

impl NewRecurringRule {
    /// Check the invariants a rule must hold before it is stored.
    ///
    /// # Errors
    /// Returns [Error::InvalidRule] if `interval` is less than 1, if
    /// `end_date` is before `start_date`, or if the UTC date of
    /// `first_run_at` is before `start_date`.
    pub fn validate(&self) -> Result<(), Error> {
        if self.interval < 1 {
            return Err(Error::InvalidRule(format!(
                "interval must be at least 1, got {}",
                self.interval
            )));
        }

        if let (Some(start_date), Some(end_date)) = (self.start_date, self.end_date)
            && end_date < start_date
        {
            return Err(Error::InvalidRule(format!(
                "the end date {end_date} is before the start date {start_date}"
            )));
        }

        let first_run_date = self.first_run_at.to_offset(UtcOffset::UTC).date();
        if let Some(start_date) = self.start_date
            && first_run_date < start_date
        {
            return Err(Error::InvalidRule(format!(
                "the first occurrence on {first_run_date} is before the start date {start_date}"
            )));
        }

        Ok(())
    }
}

// ============================================================================
// DATABASE FUNCTIONS
// ============================================================================

const RULE_COLUMNS: &str = "id, user_id, wallet_id, category_id, type, amount_minor, \
    currency_code, description, frequency, interval, day_of_month, day_of_week, start_date, \
    end_date, next_run_at, is_active";

/// Create a recurring rule in the database.
///
/// # Errors
/// This function will return a:
/// - [Error::InvalidRule] if the rule fails [NewRecurringRule::validate],
/// - or [Error::SqlError] if there is an SQL error.
pub fn create_recurring_rule(
    rule: NewRecurringRule,
    connection: &Connection,
) -> Result<RecurringRule, Error> {
    rule.validate()?;

    connection
        .prepare(&format!(
            "INSERT INTO recurring_rule
                (user_id, wallet_id, category_id, type, amount_minor, currency_code, description,
                 frequency, interval, day_of_month, day_of_week, start_date, end_date, next_run_at,
                 is_active)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, 1)
             RETURNING {RULE_COLUMNS}"
        ))?
        .query_row(
            rusqlite::params![
                rule.user_id,
                rule.wallet_id,
                rule.category_id,
                rule.kind,
                rule.amount_minor,
                rule.currency_code,
                rule.description,
                rule.frequency,
                rule.interval,
                rule.day_of_month,
                rule.day_of_week,
                rule.start_date,
                rule.end_date,
                to_unix_seconds(rule.first_run_at),
            ],
            map_rule_row,
        )
        .map_err(|error| error.into())
}

/// Retrieve a recurring rule by its ID.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if `rule_id` does not refer to a rule,
/// - or [Error::SqlError] if there is some other SQL error.
#[cfg(test)]
pub fn get_recurring_rule(rule_id: RuleId, connection: &Connection) -> Result<RecurringRule, Error> {
    connection
        .prepare(&format!(
            "SELECT {RULE_COLUMNS} FROM recurring_rule WHERE id = :id"
        ))?
        .query_row(&[(":id", &rule_id)], map_rule_row)
        .map_err(|error| error.into())
}

/// Retrieve every active rule that is due at or before `now`, oldest due first.
///
/// # Errors
/// This function will return a [Error::SqlError] if there is an SQL error,
/// including a stored frequency or type that cannot be parsed.
pub fn get_due_rules(
    now: OffsetDateTime,
    connection: &Connection,
) -> Result<Vec<RecurringRule>, Error> {
    connection
        .prepare(&format!(
            "SELECT {RULE_COLUMNS} FROM recurring_rule
             WHERE is_active = 1 AND next_run_at <= :now
             ORDER BY next_run_at ASC, id ASC"
        ))?
        .query_map(&[(":now", &to_unix_seconds(now))], map_rule_row)?
        .map(|maybe_rule| maybe_rule.map_err(|error| error.into()))
        .collect()
}

/// Move a rule's `next_run_at` from `due` to `next`.
///
/// The update only applies if the rule is still due at `due`, so two
/// invocations that processed the same occurrence cannot advance the rule
/// twice. Returns whether the rule was updated.
///
/// # Errors
/// This function will return a [Error::SqlError] if there is an SQL error.
pub fn advance_next_run_at(
    rule_id: RuleId,
    due: OffsetDateTime,
    next: OffsetDateTime,
    connection: &Connection,
) -> Result<bool, Error> {
    let rows_affected = connection.execute(
        "UPDATE recurring_rule SET next_run_at = ?1 WHERE id = ?2 AND next_run_at = ?3",
        (to_unix_seconds(next), rule_id, to_unix_seconds(due)),
    )?;

    Ok(rows_affected == 1)
}

/// Pause or resume a rule.
///
/// # Errors
/// This function will return a:
/// - [Error::UpdateMissingRule] if `rule_id` does not refer to a rule,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn set_rule_active(
    rule_id: RuleId,
    is_active: bool,
    connection: &Connection,
) -> Result<(), Error> {
    let rows_affected = connection.execute(
        "UPDATE recurring_rule SET is_active = ?1 WHERE id = ?2",
        (is_active, rule_id),
    )?;

    if rows_affected == 0 {
        return Err(Error::UpdateMissingRule);
    }

    Ok(())
}

/// Create the recurring rule table in the database.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL error.
pub fn create_recurring_rule_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS recurring_rule (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                wallet_id INTEGER NOT NULL,
                category_id INTEGER,
                type TEXT NOT NULL CHECK (type IN ('income', 'expense')),
                amount_minor INTEGER NOT NULL,
                currency_code TEXT NOT NULL,
                description TEXT,
                frequency TEXT NOT NULL CHECK (frequency IN ('daily', 'weekly', 'monthly')),
                interval INTEGER NOT NULL DEFAULT 1 CHECK (interval >= 1),
                day_of_month INTEGER,
                day_of_week INTEGER,
                start_date TEXT,
                end_date TEXT,
                next_run_at INTEGER NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                CHECK (start_date IS NULL OR end_date IS NULL OR start_date <= end_date)
            );",
        (),
    )?;

    // Ensure the sequence starts at 1
    connection.execute(
        "INSERT OR IGNORE INTO sqlite_sequence (name, seq) VALUES ('recurring_rule', 0)",
        (),
    )?;

    // The scheduler selects on these two columns every run.
    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_recurring_rule_due
            ON recurring_rule(is_active, next_run_at)",
        (),
    )?;

    Ok(())
}

fn map_rule_row(row: &Row) -> Result<RecurringRule, rusqlite::Error> {
    Ok(RecurringRule {
        id: row.get(0)?,
        user_id: row.get(1)?,
        wallet_id: row.get(2)?,
        category_id: row.get(3)?,
        kind: row.get(4)?,
        amount_minor: row.get(5)?,
        currency_code: row.get(6)?,
        description: row.get(7)?,
        frequency: row.get(8)?,
        interval: row.get(9)?,
        day_of_month: row.get(10)?,
        day_of_week: row.get(11)?,
        start_date: row.get(12)?,
        end_date: row.get(13)?,
        next_run_at: get_instant(row, 14)?,
        is_active: row.get(15)?,
    })
}


#[cfg(test)]
mod tests {
    use rusqlite::Connection;
    use time::macros::{date, datetime};

    use crate::{
        Error,
        db::initialize,
        recurring::rule::{
            Frequency, NewRecurringRule, advance_next_run_at, create_recurring_rule,
            get_due_rules, get_recurring_rule, set_rule_active, test_utils::monthly_rent,
        },
    };

    fn get_test_connection() -> Connection {
        let connection = Connection::open_in_memory().unwrap();
        initialize(&connection).expect("Could not initialize database");
        connection
    }

    #[test]
    fn create_rule_succeeds() {
        let connection = get_test_connection();
        let new_rule = monthly_rent(datetime!(2025-01-01 0:00 UTC));

        let rule = create_recurring_rule(new_rule.clone(), &connection)
            .expect("Could not create rule");

        assert_eq!(rule.id, 1);
        assert_eq!(rule.frequency, Frequency::Monthly);
        assert_eq!(rule.next_run_at, new_rule.first_run_at);
        assert!(rule.is_active);
        assert_eq!(get_recurring_rule(rule.id, &connection), Ok(rule));
    }

    #[test]
    fn create_rule_fails_on_zero_interval() {
        let connection = get_test_connection();
        let new_rule = NewRecurringRule {
            interval: 0,
            ..monthly_rent(datetime!(2025-01-01 0:00 UTC))
        };

        let result = create_recurring_rule(new_rule, &connection);

        assert!(matches!(result, Err(Error::InvalidRule(_))));
    }

    #[test]
    fn create_rule_fails_when_end_is_before_start() {
        let connection = get_test_connection();
        let new_rule = NewRecurringRule {
            start_date: Some(date!(2025 - 02 - 01)),
            end_date: Some(date!(2025 - 01 - 31)),
            ..monthly_rent(datetime!(2025-02-01 0:00 UTC))
        };

        let result = create_recurring_rule(new_rule, &connection);

        assert!(matches!(result, Err(Error::InvalidRule(_))));
    }

    #[test]
    fn create_rule_fails_when_first_run_is_before_start() {
        let connection = get_test_connection();
        let new_rule = NewRecurringRule {
            start_date: Some(date!(2025 - 06 - 01)),
            ..monthly_rent(datetime!(2025-05-01 0:00 UTC))
        };

        let result = create_recurring_rule(new_rule, &connection);

        assert!(matches!(result, Err(Error::InvalidRule(_))));
    }

    #[test]
    fn first_run_is_compared_with_start_date_in_utc() {
        // 2025-06-01 09:00 in New Zealand is still 31 May in UTC.
        let new_rule = NewRecurringRule {
            start_date: Some(date!(2025 - 06 - 01)),
            ..monthly_rent(datetime!(2025-06-01 9:00 +12:00))
        };

        assert!(matches!(new_rule.validate(), Err(Error::InvalidRule(_))));
    }

    #[test]
    fn first_run_on_start_date_is_valid() {
        let new_rule = NewRecurringRule {
            start_date: Some(date!(2025 - 06 - 01)),
            ..monthly_rent(datetime!(2025-06-01 0:00 UTC))
        };

        assert_eq!(new_rule.validate(), Ok(()));
    }

    #[test]
    fn start_and_end_on_same_day_is_valid() {
        let new_rule = NewRecurringRule {
            start_date: Some(date!(2025 - 02 - 01)),
            end_date: Some(date!(2025 - 02 - 01)),
            ..monthly_rent(datetime!(2025-02-01 0:00 UTC))
        };

        assert_eq!(new_rule.validate(), Ok(()));
    }

    #[test]
    fn get_due_rules_selects_due_and_active_only() {
        let connection = get_test_connection();
        let now = datetime!(2025-01-15 0:00 UTC);
        let overdue =
            create_recurring_rule(monthly_rent(datetime!(2024-01-01 0:00 UTC)), &connection)
                .unwrap();
        let due_now = create_recurring_rule(monthly_rent(now), &connection).unwrap();
        create_recurring_rule(monthly_rent(datetime!(2025-01-15 0:00:01 UTC)), &connection)
            .unwrap();
        let paused =
            create_recurring_rule(monthly_rent(datetime!(2020-01-01 0:00 UTC)), &connection)
                .unwrap();
        set_rule_active(paused.id, false, &connection).unwrap();

        let due_rules = get_due_rules(now, &connection).expect("Could not get due rules");

        assert_eq!(due_rules, vec![overdue, due_now]);
    }

    #[test]
    fn advance_updates_rule_still_at_due_instant() {
        let connection = get_test_connection();
        let due = datetime!(2025-01-01 0:00 UTC);
        let next = datetime!(2025-02-01 0:00 UTC);
        let rule = create_recurring_rule(monthly_rent(due), &connection).unwrap();

        let updated = advance_next_run_at(rule.id, due, next, &connection);

        assert_eq!(updated, Ok(true));
        assert_eq!(
            get_recurring_rule(rule.id, &connection).unwrap().next_run_at,
            next
        );
    }

    #[test]
    fn advance_does_not_apply_twice_for_one_occurrence() {
        let connection = get_test_connection();
        let due = datetime!(2025-01-01 0:00 UTC);
        let next = datetime!(2025-02-01 0:00 UTC);
        let rule = create_recurring_rule(monthly_rent(due), &connection).unwrap();
        advance_next_run_at(rule.id, due, next, &connection).unwrap();

        let later = datetime!(2025-03-01 0:00 UTC);

        let updated = advance_next_run_at(rule.id, due, later, &connection);

        assert_eq!(updated, Ok(false));
        assert_eq!(
            get_recurring_rule(rule.id, &connection).unwrap().next_run_at,
            next
        );
    }

    #[test]
    fn set_active_fails_on_missing_rule() {
        let connection = get_test_connection();

        assert_eq!(
            set_rule_active(42, false, &connection),
            Err(Error::UpdateMissingRule)
        );
    }

    #[test]
    fn invalid_frequency_in_database_fails_load() {
        let connection = get_test_connection();
        connection
            .execute_batch(
                "DROP TABLE \"transaction\";
                 DROP TABLE recurring_rule;
                 CREATE TABLE recurring_rule AS SELECT
                    1 AS id, 1 AS user_id, 1 AS wallet_id, NULL AS category_id,
                    'expense' AS type, 100 AS amount_minor, 'NZD' AS currency_code,
                    NULL AS description, 'fortnightly' AS frequency, 1 AS interval,
                    NULL AS day_of_month, NULL AS day_of_week, NULL AS start_date,
                    NULL AS end_date, 0 AS next_run_at, 1 AS is_active;",
            )
            .unwrap();

        let result = get_due_rules(datetime!(2025-01-01 0:00 UTC), &connection);

        assert!(matches!(
            result,
            Err(Error::SqlError(rusqlite::Error::FromSqlConversionFailure(8, _, _)))
        ));
    }
}
