use std::error::Error;
use std::path::Path;
use std::process::exit;

use clap::Parser;
use rusqlite::Connection;
use time::{Duration, OffsetDateTime, Time};

use wallet_ledger::{
    Frequency, NewRecurringRule, TransactionKind, create_recurring_rule, initialize_db,
};

/// A utility for creating a test database with sample recurring rules.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// File path to save the SQLite database to.
    #[arg(long, short)]
    output_path: String,
}

/// Create and populate a database for manual testing.
fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let output_path = Path::new(&args.output_path);

    match output_path.extension() {
        None => {
            eprintln!("Output path must include a file extension (e.g., 'my_database.db').");
            exit(1);
        }
        Some(extension) if extension.is_empty() => {
            eprintln!("Output path must include a file extension (e.g., 'my_database.db').");
            exit(1);
        }
        _ => {}
    }

    if output_path.is_file() {
        eprintln!("File already exists at {output_path:#?}!");
        exit(1);
    }

    println!("Creating database at {output_path:#?}");
    let conn = Connection::open(output_path)?;

    initialize_db(&conn)?;

    println!("Creating sample recurring rules...");

    let midnight_today = OffsetDateTime::now_utc().replace_time(Time::MIDNIGHT);

    for rule in sample_rules(midnight_today) {
        let rule = create_recurring_rule(rule, &conn)?;
        println!(
            "  {} every {} {} from {}",
            rule.description.as_deref().unwrap_or("(no description)"),
            rule.interval,
            rule.frequency,
            rule.next_run_at
        );
    }

    println!("Success!");

    Ok(())
}

/// Rules that are due now, overdue and in the future, so a single run exercises
/// materialization, catch-up and skipping.
fn sample_rules(today: OffsetDateTime) -> Vec<NewRecurringRule> {
    let rule = |kind, amount_minor, description: &str, frequency, interval, first_run_at| {
        NewRecurringRule {
            user_id: 1,
            wallet_id: 1,
            category_id: None,
            kind,
            amount_minor,
            currency_code: "NZD".to_owned(),
            description: Some(description.to_owned()),
            frequency,
            interval,
            day_of_month: None,
            day_of_week: None,
            start_date: None,
            end_date: None,
            first_run_at,
        }
    };

    vec![
        rule(
            TransactionKind::Expense,
            450,
            "Coffee",
            Frequency::Daily,
            1,
            today,
        ),
        rule(
            TransactionKind::Income,
            250_000,
            "Salary",
            Frequency::Weekly,
            2,
            today - Duration::weeks(3),
        ),
        rule(
            TransactionKind::Expense,
            120_000,
            "Rent",
            Frequency::Monthly,
            1,
            today + Duration::days(7),
        ),
    ]
}
