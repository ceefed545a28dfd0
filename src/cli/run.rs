use chrono::NaiveDate;
use colored::Colorize;
use comfy_table::{Cell, Table};
use serde::Serialize;

use crate::cli::resolve_today;
use crate::db::{self, get_connection};
use crate::error::Result;
use crate::fmt::money;
use crate::materializer::{
    materialize_due_instances, materialize_with_limit, DefinitionError, DEFAULT_ITERATION_LIMIT,
};
use crate::models::{TransactionInstance, TransactionType};
use crate::settings::{db_path, load_settings};

#[derive(Serialize)]
struct RunReport<'a> {
    today: NaiveDate,
    generated_count: usize,
    inserted: usize,
    skipped: usize,
    created_instances: &'a [TransactionInstance],
    errors: &'a [DefinitionError],
    runaway: &'a [i64],
}

pub fn run(today: Option<&str>, json: bool) -> Result<()> {
    let today = resolve_today(today)?;
    let settings = load_settings();
    let mut conn = get_connection(&db_path())?;

    let loaded = db::load_definitions(&conn)?;
    let existing = db::load_instances_for_definitions(&conn)?;
    let mut result = match settings.max_catch_up_iterations {
        DEFAULT_ITERATION_LIMIT => materialize_due_instances(&loaded.definitions, &existing, today),
        limit => materialize_with_limit(&loaded.definitions, &existing, today, limit),
    };
    result.errors.extend(loaded.rejected);
    let outcome = db::persist_pass(&mut conn, &result)?;

    if json {
        let report = RunReport {
            today,
            generated_count: result.generated_count,
            inserted: outcome.inserted,
            skipped: outcome.skipped,
            created_instances: &result.created_instances,
            errors: &result.errors,
            runaway: &result.runaway,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if !result.created_instances.is_empty() {
        let mut table = Table::new();
        table.set_header(vec!["Due", "Payee", "Type", "Amount", "Recurring ID"]);
        for inst in &result.created_instances {
            let amount = match inst.transaction_type {
                TransactionType::Income => money(inst.amount).green().to_string(),
                TransactionType::Expense => money(inst.amount).red().to_string(),
            };
            table.add_row(vec![
                Cell::new(inst.due_date),
                Cell::new(&inst.payee_name),
                Cell::new(inst.transaction_type),
                Cell::new(amount),
                Cell::new(inst.recurring_definition_id.map(|id| id.to_string()).unwrap_or_default()),
            ]);
        }
        println!("{table}");
    }

    println!("Generated {} bill(s) due through {today}.", result.generated_count);
    if outcome.skipped > 0 {
        println!(
            "{}",
            format!("{} already stored by another run, skipped.", outcome.skipped).yellow()
        );
    }
    for err in &result.errors {
        println!(
            "{}",
            format!("Warning: recurring {} skipped: {}", err.definition_id, err.reason).yellow()
        );
    }
    for id in &result.runaway {
        println!(
            "{}",
            format!("Warning: recurring {id} has more occurrences pending; run again to continue.").yellow()
        );
    }
    Ok(())
}
