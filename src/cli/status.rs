use crate::db::get_connection;
use crate::error::Result;
use crate::settings::{db_path, load_settings};

pub fn run() -> Result<()> {
    let settings = load_settings();
    let db_path = db_path();

    println!("User:       {}", if settings.user_name.is_empty() { "(not set)" } else { &settings.user_name });
    println!("Data dir:   {}", settings.data_dir);
    println!("Database:   {}", db_path.display());

    if db_path.exists() {
        let conn = get_connection(&db_path)?;

        let recurring: i64 = conn.query_row("SELECT count(*) FROM recurring_definitions", [], |r| r.get(0))?;
        let bills: i64 = conn.query_row("SELECT count(*) FROM transactions", [], |r| r.get(0))?;
        let unpaid: i64 = conn.query_row(
            "SELECT count(*) FROM transactions WHERE is_paid = 0",
            [],
            |r| r.get(0),
        )?;
        let next_due: Option<String> = conn.query_row(
            "SELECT min(next_due_date) FROM recurring_definitions \
             WHERE end_date IS NULL OR next_due_date <= end_date",
            [],
            |r| r.get(0),
        )?;

        println!();
        println!("Recurring:     {recurring}");
        println!("Bills:         {bills}");
        println!("Unpaid:        {unpaid}");
        println!("Next due:      {}", next_due.as_deref().unwrap_or("-"));
    } else {
        println!();
        println!("Database not found. Run `lebarone init` to set up.");
    }

    Ok(())
}
