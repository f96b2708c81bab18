use time::Date;

use crate::recurring::rule::RecurringRule;

/// Whether `today` falls inside the rule's inclusive `[start_date, end_date]` window.
///
/// A missing start date means the rule has always been started, and a missing
/// end date means it never ends.
pub fn in_window(rule: &RecurringRule, today: Date) -> bool {
    if rule.start_date.is_some_and(|start_date| today < start_date) {
        return false;
    }

    if rule.end_date.is_some_and(|end_date| today > end_date) {
        return false;
    }

    true
}
