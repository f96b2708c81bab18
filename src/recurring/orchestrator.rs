//! Runs every due recurring rule once: window check, duplicate check,
//! materialization, then schedule advancement.
//!
//! Nothing here holds a lock across rules. Overlapping runs are expected and
//! are made safe by the duplicate check, the conditional insert, and the
//! conditional schedule update.

use serde::Serialize;
use time::{Date, OffsetDateTime, UtcOffset};

use crate::{
    Error,
    recurring::{
        materialize::{already_materialized, materialize},
        rule::RecurringRule,
        schedule::advance,
        store::{InsertOutcome, LedgerStore},
        window::in_window,
    },
};

/// What happened during one run of [run_due_rules].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// The UTC date of the run.
    pub date: Date,
    /// The number of due rules that were inside their window and evaluated.
    pub processed: u32,
    /// The number of transactions created.
    pub created: u32,
    /// The number of rules whose schedule was advanced.
    pub updated: u32,
    /// The number of due rules skipped because they were outside their window.
    pub skipped_out_of_window: u32,
    /// The number of occurrences that already had a transaction.
    pub duplicates: u32,
    /// The number of rules whose transaction could not be created.
    pub materialize_failures: u32,
    /// The number of rules whose schedule could not be advanced.
    pub advance_failures: u32,
}

impl RunSummary {
    fn new(date: Date) -> Self {
        Self {
            date,
            processed: 0,
            created: 0,
            updated: 0,
            skipped_out_of_window: 0,
            duplicates: 0,
            materialize_failures: 0,
            advance_failures: 0,
        }
    }

    /// The part of the summary reported to whoever triggered the run.
    pub fn report(&self) -> RunReport {
        RunReport {
            date: self.date.to_string(),
            processed: self.processed,
            created: self.created,
            updated: self.updated,
        }
    }
}

/// The JSON body returned to the trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// The UTC date of the run as `YYYY-MM-DD`.
    pub date: String,
    /// The number of rules evaluated.
    pub processed: u32,
    /// The number of transactions created.
    pub created: u32,
    /// The number of schedules advanced.
    pub updated: u32,
}

/// Materialize every due, active, in-window rule in `store` and advance its schedule.
///
/// `now` is the reference time for the run: rules with `next_run_at <= now`
/// are due, and the UTC date of `now` is checked against each rule's window.
/// Rules outside their window are left untouched.
///
/// A failure on one rule is logged and does not stop the others. A rule whose
/// transaction could not be created keeps its schedule so the same occurrence
/// is retried by the next run.
///
/// # Errors
/// Returns an error only if the due rules cannot be loaded, in which case no
/// rule has been touched.
pub fn run_due_rules(store: &impl LedgerStore, now: OffsetDateTime) -> Result<RunSummary, Error> {
    let now = now.to_offset(UtcOffset::UTC);
    let today = now.date();

    let due_rules = store.due_rules(now).inspect_err(|error| {
        tracing::error!("Could not load due recurring rules: {error}");
    })?;

    tracing::debug!("Loaded {} due recurring rules", due_rules.len());

    let mut summary = RunSummary::new(today);

    for rule in &due_rules {
        if !in_window(rule, today) {
            tracing::debug!(
                rule_id = rule.id,
                start_date = ?rule.start_date,
                end_date = ?rule.end_date,
                "Skipping rule outside its active window"
            );
            summary.skipped_out_of_window += 1;
            continue;
        }

        summary.processed += 1;
        process_rule(store, rule, &mut summary);
    }

    tracing::info!(
        date = %summary.date,
        processed = summary.processed,
        created = summary.created,
        updated = summary.updated,
        skipped_out_of_window = summary.skipped_out_of_window,
        duplicates = summary.duplicates,
        materialize_failures = summary.materialize_failures,
        advance_failures = summary.advance_failures,
        "Finished running recurring rules"
    );

    Ok(summary)
}

fn process_rule(store: &impl LedgerStore, rule: &RecurringRule, summary: &mut RunSummary) {
    let due = rule.next_run_at;

    let is_duplicate = match already_materialized(store, rule, due) {
        Ok(is_duplicate) => is_duplicate,
        Err(error) => {
            tracing::error!(rule_id = rule.id, %due, "Could not check for an existing transaction: {error}");
            summary.materialize_failures += 1;
            return;
        }
    };

    if is_duplicate {
        tracing::info!(rule_id = rule.id, %due, "Occurrence already has a transaction");
        summary.duplicates += 1;
    } else {
        match materialize(store, rule, due) {
            Ok(InsertOutcome::Inserted(transaction)) => {
                tracing::info!(
                    rule_id = rule.id,
                    transaction_id = transaction.id,
                    %due,
                    "Created transaction for recurring rule"
                );
                summary.created += 1;
            }
            Ok(InsertOutcome::AlreadyExists) => {
                tracing::info!(rule_id = rule.id, %due, "Occurrence was materialized concurrently");
                summary.duplicates += 1;
            }
            Err(error) => {
                tracing::error!(rule_id = rule.id, %due, "Could not create transaction: {error}");
                summary.materialize_failures += 1;
                return;
            }
        }
    }

    let next = match advance(due, rule.frequency, rule.interval) {
        Ok(next) => next,
        Err(error) => {
            tracing::error!(rule_id = rule.id, %due, "Could not compute next occurrence: {error}");
            summary.advance_failures += 1;
            return;
        }
    };

    match store.advance_rule(rule.id, due, next) {
        Ok(true) => {
            tracing::debug!(rule_id = rule.id, %due, %next, "Advanced recurring rule");
            summary.updated += 1;
        }
        Ok(false) => {
            tracing::debug!(rule_id = rule.id, %due, "Rule was already advanced by another run");
        }
        Err(error) => {
            tracing::error!(rule_id = rule.id, %due, %next, "Could not advance recurring rule: {error}");
            summary.advance_failures += 1;
        }
    }
}
