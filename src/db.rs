//! Creates the database schema.

use rusqlite::Connection;

use crate::{recurring::create_recurring_rule_table, transaction::create_transaction_table};

/// Create all of the database tables for the application.
///
/// Safe to call on an existing database, tables and indices are only created
/// if they do not already exist.
///
/// # Errors
/// This function will return an error if a table or index cannot be created.
pub fn initialize(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute_batch("PRAGMA foreign_keys = ON;")?;

    let transaction = connection.unchecked_transaction()?;
    create_recurring_rule_table(&transaction)?;
    create_transaction_table(&transaction)?;
    transaction.commit()
}

#[cfg(test)]
mod tests {
    use rusqlite::Connection;

    use super::initialize;

    fn table_exists(name: &str, connection: &Connection) -> bool {
        connection
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
                [name],
                |row| row.get(0),
            )
            .unwrap()
    }

    #[test]
    fn creates_tables() {
        let connection = Connection::open_in_memory().unwrap();

        initialize(&connection).expect("Could not initialize database");

        assert!(table_exists("recurring_rule", &connection));
        assert!(table_exists("transaction", &connection));
    }

    #[test]
    fn initialize_is_idempotent() {
        let connection = Connection::open_in_memory().unwrap();

        initialize(&connection).unwrap();

        assert_eq!(initialize(&connection), Ok(()));
    }
}
