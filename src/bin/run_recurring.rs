use std::{
    error::Error,
    path::PathBuf,
    sync::{Arc, Mutex},
};

use clap::Parser;
use rusqlite::Connection;
use time::OffsetDateTime;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

use wallet_ledger::{SQLiteLedgerStore, initialize_db, run_due_rules};

/// Run every due recurring rule once and print the run summary as JSON.
///
/// For schedulers that start a process instead of making an HTTP request.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// File path to the application SQLite database.
    #[arg(long)]
    db_path: PathBuf,
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(
                    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
                ),
        )
        .init();

    let args = Args::parse();

    let conn = Connection::open(&args.db_path)?;
    initialize_db(&conn)?;
    let store = SQLiteLedgerStore::new(Arc::new(Mutex::new(conn)));

    let summary = run_due_rules(&store, OffsetDateTime::now_utc())?;

    println!("{}", serde_json::to_string(&summary.report())?);

    Ok(())
}
