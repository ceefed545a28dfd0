use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::cli::{parse_date_opt, resolve_today};
use crate::db::{self, get_connection};
use crate::error::Result;
use crate::fmt::money;
use crate::models::{parse_date, TransactionInstance, TransactionType};
use crate::settings::db_path;

pub fn add(
    payee: &str,
    amount: f64,
    transaction_type: &str,
    due: &str,
    category: Option<&str>,
) -> Result<()> {
    let conn = get_connection(&db_path())?;
    let bill = TransactionInstance {
        id: None,
        payee_name: payee.to_string(),
        amount,
        transaction_type: transaction_type.parse()?,
        category_id: category.map(|name| db::category_id_by_name(&conn, name)).transpose()?,
        due_date: parse_date(due)?,
        is_paid: false,
        payment_date: None,
        recurring_definition_id: None,
    };
    let id = db::insert_instance(&conn, &bill)?;
    println!("Added bill {id}: {payee} {} due {}", money(amount), bill.due_date);
    Ok(())
}

pub fn list(unpaid_only: bool) -> Result<()> {
    let conn = get_connection(&db_path())?;
    let bills = db::list_instances(&conn, unpaid_only)?;
    let categories = db::category_names(&conn)?;

    let mut table = Table::new();
    table.set_header(vec!["ID", "Due", "Payee", "Amount", "Category", "Paid", "Recurring"]);
    for bill in bills {
        let amount = match bill.transaction_type {
            TransactionType::Income => money(bill.amount).green().to_string(),
            TransactionType::Expense => money(bill.amount).red().to_string(),
        };
        let paid = if bill.is_paid {
            bill.payment_date.map(|d| d.to_string()).unwrap_or_else(|| "yes".to_string())
        } else {
            String::new()
        };
        table.add_row(vec![
            Cell::new(bill.id.unwrap_or_default()),
            Cell::new(bill.due_date),
            Cell::new(&bill.payee_name),
            Cell::new(amount),
            Cell::new(
                bill.category_id
                    .and_then(|id| categories.get(&id).cloned())
                    .unwrap_or_default(),
            ),
            Cell::new(paid),
            Cell::new(bill.recurring_definition_id.map(|id| id.to_string()).unwrap_or_default()),
        ]);
    }
    println!("Bills\n{table}");
    Ok(())
}

pub fn pay(id: i64, date: Option<&str>) -> Result<()> {
    let payment_date = match parse_date_opt(date)? {
        Some(d) => d,
        None => resolve_today(None)?,
    };
    let conn = get_connection(&db_path())?;
    db::mark_paid(&conn, id, payment_date)?;
    println!("Marked bill {id} paid on {payment_date}");
    Ok(())
}
