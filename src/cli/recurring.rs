use chrono::NaiveDate;
use colored::Colorize;
use comfy_table::{Cell, Table};
use rusqlite::Connection;

use crate::cadence::{upcoming_occurrences, validate_interval};
use crate::cli::parse_date_opt;
use crate::db::{self, get_connection, NewRecurring};
use crate::error::{LebaroneError, Result};
use crate::fmt::{cadence_label, money};
use crate::models::{parse_date, RecurringDefinition};
use crate::settings::db_path;

fn resolve_category(conn: &Connection, name: Option<&str>) -> Result<Option<i64>> {
    name.map(|n| db::category_id_by_name(conn, n)).transpose()
}

fn check_date_bounds(start: NaiveDate, end: Option<NaiveDate>) -> Result<()> {
    match end {
        Some(end) if end < start => Err(LebaroneError::Other(format!(
            "end date {end} is before start date {start}"
        ))),
        _ => Ok(()),
    }
}

#[allow(clippy::too_many_arguments)]
pub fn add(
    payee: &str,
    amount: f64,
    transaction_type: &str,
    frequency: &str,
    interval: u32,
    start: &str,
    end: Option<&str>,
    category: Option<&str>,
) -> Result<()> {
    validate_interval(interval)?;
    let conn = get_connection(&db_path())?;
    let new = NewRecurring {
        payee_name: payee.to_string(),
        amount,
        transaction_type: transaction_type.parse()?,
        category_id: resolve_category(&conn, category)?,
        frequency: frequency.parse()?,
        interval,
        start_date: parse_date(start)?,
        end_date: parse_date_opt(end)?,
    };
    check_date_bounds(new.start_date, new.end_date)?;
    let id = db::insert_definition(&conn, &new)?;
    println!(
        "Added recurring {id}: {payee} {}, first due {}",
        cadence_label(new.frequency, new.interval).to_lowercase(),
        new.start_date
    );
    Ok(())
}

pub fn list() -> Result<()> {
    let conn = get_connection(&db_path())?;
    let loaded = db::load_definitions(&conn)?;
    let categories = db::category_names(&conn)?;

    let mut table = Table::new();
    table.set_header(vec!["ID", "Payee", "Type", "Amount", "Cadence", "Next Due", "Ends", "Category"]);
    for def in loaded.definitions {
        let category = def
            .category_id
            .and_then(|id| categories.get(&id).cloned())
            .unwrap_or_default();
        table.add_row(vec![
            Cell::new(def.id),
            Cell::new(&def.payee_name),
            Cell::new(def.transaction_type),
            Cell::new(money(def.amount)),
            Cell::new(cadence_label(def.frequency, def.interval)),
            Cell::new(def.next_due_date),
            Cell::new(def.end_date.map(|d| d.to_string()).unwrap_or_default()),
            Cell::new(category),
        ]);
    }
    println!("Recurring\n{table}");
    for err in &loaded.rejected {
        println!(
            "{}",
            format!("Warning: recurring {} unreadable: {}", err.definition_id, err.reason).yellow()
        );
    }
    Ok(())
}

/// Changes requested by `recurring update`; `None` leaves a field alone.
#[derive(Debug, Default)]
pub struct DefinitionChanges<'a> {
    pub payee: Option<&'a str>,
    pub amount: Option<f64>,
    pub transaction_type: Option<&'a str>,
    pub frequency: Option<&'a str>,
    pub interval: Option<u32>,
    pub start: Option<&'a str>,
    pub end: Option<&'a str>,
    pub no_end: bool,
    pub category: Option<&'a str>,
}

/// Apply edits to a definition. A cadence change takes effect from the
/// current cursor. A definition that has never generated anything follows
/// its start date; otherwise a start date moved forward is picked up by the
/// cursor reset in the next materialization pass.
pub fn apply_changes(
    conn: &Connection,
    def: &mut RecurringDefinition,
    changes: &DefinitionChanges<'_>,
) -> Result<()> {
    if let Some(payee) = changes.payee {
        def.payee_name = payee.to_string();
    }
    if let Some(amount) = changes.amount {
        def.amount = amount;
    }
    if let Some(kind) = changes.transaction_type {
        def.transaction_type = kind.parse()?;
    }
    if let Some(frequency) = changes.frequency {
        def.frequency = frequency.parse()?;
    }
    if let Some(interval) = changes.interval {
        validate_interval(interval)?;
        def.interval = interval;
    }
    if let Some(start) = changes.start {
        def.start_date = parse_date(start)?;
        if def.last_generated_date.is_none() {
            def.next_due_date = def.start_date;
        }
    }
    if changes.no_end {
        def.end_date = None;
    } else if let Some(end) = changes.end {
        def.end_date = Some(parse_date(end)?);
    }
    if changes.category.is_some() {
        def.category_id = resolve_category(conn, changes.category)?;
    }
    check_date_bounds(def.start_date, def.end_date)
}

pub fn update(id: i64, changes: &DefinitionChanges<'_>) -> Result<()> {
    let conn = get_connection(&db_path())?;
    let mut def = db::get_definition(&conn, id)?;
    apply_changes(&conn, &mut def, changes)?;
    db::save_definition(&conn, &def)?;
    println!("Updated recurring {id}: {}", def.payee_name);
    Ok(())
}

pub fn delete(id: i64) -> Result<()> {
    let conn = get_connection(&db_path())?;
    let def = db::get_definition(&conn, id)?;
    db::delete_definition(&conn, id)?;
    println!("Deleted recurring {id}: {} (generated bills kept)", def.payee_name);
    Ok(())
}

pub fn upcoming(id: i64, count: usize) -> Result<()> {
    let conn = get_connection(&db_path())?;
    let def = db::get_definition(&conn, id)?;
    let dates = upcoming_occurrences(&def, count)?;
    if dates.is_empty() {
        println!("{} has no further occurrences.", def.payee_name);
        return Ok(());
    }
    println!(
        "{} ({}, {})",
        def.payee_name,
        money(def.amount),
        cadence_label(def.frequency, def.interval).to_lowercase()
    );
    for date in dates {
        println!("  {date}");
    }
    Ok(())
}
