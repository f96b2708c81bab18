//! The recurring-transaction scheduler.
//!
//! Recurring rules describe transactions that repeat on a calendar schedule.
//! A run loads every due rule, checks its start/end window, skips occurrences
//! that already have a transaction, inserts the transaction for the rest and
//! moves each rule's `next_run_at` on by one period.

mod endpoint;
mod materialize;
mod orchestrator;
mod rule;
mod schedule;
mod store;
mod window;

pub use endpoint::run_recurring_endpoint;
pub use orchestrator::{RunReport, RunSummary, run_due_rules};
pub use rule::{
    Frequency, NewRecurringRule, RecurringRule, create_recurring_rule,
    create_recurring_rule_table, set_rule_active,
};
pub use schedule::advance;
pub use store::{InsertOutcome, LedgerStore, SQLiteLedgerStore};
pub use window::in_window;

pub use crate::transaction::TransactionKind;
