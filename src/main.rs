mod cadence;
mod cli;
mod db;
mod error;
mod fmt;
mod materializer;
mod models;
mod settings;

use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use cli::recurring::DefinitionChanges;
use cli::{BillsCommands, Cli, Commands, RecurringCommands};

fn main() {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();

    let result = match cli.command {
        Commands::Init { data_dir } => cli::init::run(data_dir),
        Commands::Run { today, json } => cli::run::run(today.as_deref(), json),
        Commands::Recurring { command } => match command {
            RecurringCommands::Add {
                payee,
                amount,
                transaction_type,
                frequency,
                interval,
                start,
                end,
                category,
            } => cli::recurring::add(
                &payee,
                amount,
                &transaction_type,
                &frequency,
                interval,
                &start,
                end.as_deref(),
                category.as_deref(),
            ),
            RecurringCommands::List => cli::recurring::list(),
            RecurringCommands::Update {
                id,
                payee,
                amount,
                transaction_type,
                frequency,
                interval,
                start,
                end,
                no_end,
                category,
            } => cli::recurring::update(
                id,
                &DefinitionChanges {
                    payee: payee.as_deref(),
                    amount,
                    transaction_type: transaction_type.as_deref(),
                    frequency: frequency.as_deref(),
                    interval,
                    start: start.as_deref(),
                    end: end.as_deref(),
                    no_end,
                    category: category.as_deref(),
                },
            ),
            RecurringCommands::Delete { id } => cli::recurring::delete(id),
            RecurringCommands::Upcoming { id, count } => cli::recurring::upcoming(id, count),
        },
        Commands::Bills { command } => match command {
            BillsCommands::Add {
                payee,
                amount,
                transaction_type,
                due,
                category,
            } => cli::bills::add(&payee, amount, &transaction_type, &due, category.as_deref()),
            BillsCommands::List { unpaid } => cli::bills::list(unpaid),
            BillsCommands::Pay { id, date } => cli::bills::pay(id, date.as_deref()),
        },
        Commands::Status => cli::status::run(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
