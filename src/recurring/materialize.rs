//! Turns one due occurrence of a rule into a ledger transaction.

use time::OffsetDateTime;

use crate::{
    Error,
    recurring::{
        rule::RecurringRule,
        store::{InsertOutcome, LedgerStore},
    },
    transaction::NewTransaction,
};

/// Build the transaction for the occurrence of `rule` due at `due`.
pub fn occurrence_transaction(rule: &RecurringRule, due: OffsetDateTime) -> NewTransaction {
    NewTransaction {
        user_id: rule.user_id,
        wallet_id: rule.wallet_id,
        category_id: rule.category_id,
        kind: rule.kind,
        amount_minor: rule.amount_minor,
        currency_code: rule.currency_code.clone(),
        occurred_at: due,
        description: rule.description.clone(),
        recurring_rule_id: Some(rule.id),
    }
}

/// Whether the occurrence of `rule` at `due` already has a transaction.
///
/// # Errors
/// Returns an error if the store cannot be read.
pub fn already_materialized(
    store: &impl LedgerStore,
    rule: &RecurringRule,
    due: OffsetDateTime,
) -> Result<bool, Error> {
    store.transaction_exists(&occurrence_transaction(rule, due))
}

/// Insert the transaction for the occurrence of `rule` at `due`.
///
/// Callers should check [already_materialized] first. The insert is still
/// conditional on the rule not having a transaction at `due`, in which case
/// [InsertOutcome::AlreadyExists] is returned and nothing is written.
///
/// # Errors
/// Returns an error if the insert fails. Nothing is written in that case.
pub fn materialize(
    store: &impl LedgerStore,
    rule: &RecurringRule,
    due: OffsetDateTime,
) -> Result<InsertOutcome, Error> {
    store.insert_transaction(&occurrence_transaction(rule, due))
}
