pub mod bills;
pub mod init;
pub mod recurring;
pub mod run;
pub mod status;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use crate::error::Result;
use crate::models::parse_date;

/// Resolve `--today`, falling back to the local calendar date.
pub(crate) fn resolve_today(today: Option<&str>) -> Result<NaiveDate> {
    match today {
        Some(raw) => parse_date(raw),
        None => Ok(chrono::Local::now().date_naive()),
    }
}

pub(crate) fn parse_date_opt(raw: Option<&str>) -> Result<Option<NaiveDate>> {
    raw.map(parse_date).transpose()
}

#[derive(Parser)]
#[command(name = "lebarone", about = "Track bills and income, and generate recurring ones as they come due.")]
pub struct Cli {
    /// Log filter, e.g. warn, debug, lebarone=trace (RUST_LOG takes precedence)
    #[arg(long = "log-level", global = true, default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Choose a data directory and initialize the database.
    Init {
        /// Path for lebarone data (default: ~/Documents/lebarone)
        #[arg(long = "data-dir")]
        data_dir: Option<String>,
    },
    /// Generate every recurring bill and income entry due up to today.
    Run {
        /// Treat this date as today: YYYY-MM-DD
        #[arg(long)]
        today: Option<String>,
        /// Print the pass as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage recurring definitions.
    Recurring {
        #[command(subcommand)]
        command: RecurringCommands,
    },
    /// List and pay generated or manual bills.
    Bills {
        #[command(subcommand)]
        command: BillsCommands,
    },
    /// Show current database and summary statistics.
    Status,
}

#[derive(Subcommand)]
pub enum RecurringCommands {
    /// Add a recurring expense or income.
    Add {
        /// Payee or payer name
        payee: String,
        #[arg(long)]
        amount: f64,
        /// expense or income
        #[arg(long = "type", default_value = "expense")]
        transaction_type: String,
        /// day, week, month or year
        #[arg(long, default_value = "month")]
        frequency: String,
        /// Number of frequency units between occurrences
        #[arg(long, default_value = "1")]
        interval: u32,
        /// First occurrence: YYYY-MM-DD
        #[arg(long)]
        start: String,
        /// Last possible occurrence (inclusive): YYYY-MM-DD
        #[arg(long)]
        end: Option<String>,
        /// Category name
        #[arg(long)]
        category: Option<String>,
    },
    /// List recurring definitions.
    List,
    /// Update a recurring definition.
    Update {
        /// Definition ID (shown in `lebarone recurring list`)
        id: i64,
        #[arg(long)]
        payee: Option<String>,
        #[arg(long)]
        amount: Option<f64>,
        #[arg(long = "type")]
        transaction_type: Option<String>,
        #[arg(long)]
        frequency: Option<String>,
        #[arg(long)]
        interval: Option<u32>,
        #[arg(long)]
        start: Option<String>,
        #[arg(long, conflicts_with = "no_end")]
        end: Option<String>,
        /// Remove the end date
        #[arg(long = "no-end")]
        no_end: bool,
        #[arg(long)]
        category: Option<String>,
    },
    /// Delete a recurring definition. Bills it already generated are kept.
    Delete {
        id: i64,
    },
    /// Preview the next occurrences of a definition.
    Upcoming {
        id: i64,
        #[arg(long, default_value = "5")]
        count: usize,
    },
}

#[derive(Subcommand)]
pub enum BillsCommands {
    /// Add a one-off bill or income entry.
    Add {
        payee: String,
        #[arg(long)]
        amount: f64,
        /// expense or income
        #[arg(long = "type", default_value = "expense")]
        transaction_type: String,
        /// Due date: YYYY-MM-DD
        #[arg(long)]
        due: String,
        /// Category name
        #[arg(long)]
        category: Option<String>,
    },
    /// List bills by due date.
    List {
        /// Only show unpaid bills
        #[arg(long)]
        unpaid: bool,
    },
    /// Mark a bill as paid.
    Pay {
        id: i64,
        /// Payment date: YYYY-MM-DD (default: today)
        #[arg(long)]
        date: Option<String>,
    },
}
