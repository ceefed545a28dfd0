use std::collections::HashMap;
use std::path::Path;

use chrono::NaiveDate;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{Connection, OptionalExtension, Row};
use tracing::{debug, warn};

use crate::error::{LebaroneError, Result};
use crate::materializer::{DefinitionError, MaterializeResult};
use crate::models::{FrequencyUnit, RecurringDefinition, TransactionInstance, TransactionType};

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS categories (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    category_type TEXT NOT NULL,
    is_active INTEGER DEFAULT 1
);

CREATE TABLE IF NOT EXISTS recurring_definitions (
    id INTEGER PRIMARY KEY,
    payee_name TEXT NOT NULL,
    amount REAL NOT NULL,
    transaction_type TEXT NOT NULL CHECK (transaction_type IN ('expense', 'income')),
    category_id INTEGER,
    frequency TEXT NOT NULL CHECK (frequency IN ('day', 'week', 'month', 'year')),
    interval INTEGER NOT NULL CHECK (interval >= 1),
    start_date TEXT NOT NULL,
    end_date TEXT,
    next_due_date TEXT NOT NULL,
    last_generated_date TEXT,
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now')),
    FOREIGN KEY (category_id) REFERENCES categories(id)
);

CREATE TABLE IF NOT EXISTS transactions (
    id INTEGER PRIMARY KEY,
    payee_name TEXT NOT NULL,
    amount REAL NOT NULL,
    transaction_type TEXT NOT NULL CHECK (transaction_type IN ('expense', 'income')),
    category_id INTEGER,
    due_date TEXT NOT NULL,
    is_paid INTEGER DEFAULT 0,
    payment_date TEXT,
    recurring_definition_id INTEGER,
    created_at TEXT DEFAULT (datetime('now')),
    FOREIGN KEY (category_id) REFERENCES categories(id),
    FOREIGN KEY (recurring_definition_id) REFERENCES recurring_definitions(id) ON DELETE SET NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_transactions_recurring_due
    ON transactions (recurring_definition_id, due_date)
    WHERE recurring_definition_id IS NOT NULL;
";

// (name, category_type)
const DEFAULT_CATEGORIES: &[(&str, &str)] = &[
    // Expenses
    ("Housing", "expense"),
    ("Transportation", "expense"),
    ("Food", "expense"),
    ("Health", "expense"),
    ("Education", "expense"),
    ("Leisure", "expense"),
    ("Utilities", "expense"),
    ("Clothing", "expense"),
    ("Personal Care", "expense"),
    ("Taxes", "expense"),
    ("Donations", "expense"),
    ("Investments (Out)", "expense"),
    ("Other Expenses", "expense"),
    // Income
    ("Salary", "income"),
    ("Freelance", "income"),
    ("Sales", "income"),
    ("Rent Received", "income"),
    ("Investments (In)", "income"),
    ("Gifts Received", "income"),
    ("Refunds", "income"),
    ("Other Income", "income"),
];

impl FromSql for FrequencyUnit {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse::<FrequencyUnit>()
            .map_err(|e: LebaroneError| FromSqlError::Other(Box::new(e)))
    }
}

impl ToSql for FrequencyUnit {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for TransactionType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse::<TransactionType>()
            .map_err(|e: LebaroneError| FromSqlError::Other(Box::new(e)))
    }
}

impl ToSql for TransactionType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

pub fn get_connection(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;

    let count: i64 = conn.query_row("SELECT count(*) FROM categories", [], |row| row.get(0))?;
    if count == 0 {
        for (name, category_type) in DEFAULT_CATEGORIES {
            conn.execute(
                "INSERT INTO categories (name, category_type) VALUES (?1, ?2)",
                rusqlite::params![name, category_type],
            )?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Categories
// ---------------------------------------------------------------------------

pub fn category_id_by_name(conn: &Connection, name: &str) -> Result<i64> {
    conn.query_row(
        "SELECT id FROM categories WHERE name = ?1 COLLATE NOCASE AND is_active = 1",
        [name],
        |row| row.get(0),
    )
    .optional()?
    .ok_or_else(|| LebaroneError::NotFound(format!("category '{name}'")))
}

pub fn category_names(conn: &Connection) -> Result<HashMap<i64, String>> {
    let mut stmt = conn.prepare("SELECT id, name FROM categories")?;
    let names: HashMap<i64, String> = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<std::result::Result<_, _>>()?;
    Ok(names)
}

// ---------------------------------------------------------------------------
// Recurring definitions
// ---------------------------------------------------------------------------

/// Fields supplied when a recurring definition is created. The cursor
/// starts at `start_date`.
#[derive(Debug, Clone)]
pub struct NewRecurring {
    pub payee_name: String,
    pub amount: f64,
    pub transaction_type: TransactionType,
    pub category_id: Option<i64>,
    pub frequency: FrequencyUnit,
    pub interval: u32,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
}

const DEFINITION_COLUMNS: &str = "id, payee_name, amount, transaction_type, category_id, frequency, \
     interval, start_date, end_date, next_due_date, last_generated_date";

fn definition_from_row(row: &Row<'_>) -> rusqlite::Result<RecurringDefinition> {
    Ok(RecurringDefinition {
        id: row.get(0)?,
        payee_name: row.get(1)?,
        amount: row.get(2)?,
        transaction_type: row.get(3)?,
        category_id: row.get(4)?,
        frequency: row.get(5)?,
        interval: row.get(6)?,
        start_date: row.get(7)?,
        end_date: row.get(8)?,
        next_due_date: row.get(9)?,
        last_generated_date: row.get(10)?,
    })
}

pub fn insert_definition(conn: &Connection, new: &NewRecurring) -> Result<i64> {
    conn.execute(
        "INSERT INTO recurring_definitions \
         (payee_name, amount, transaction_type, category_id, frequency, interval, start_date, end_date, next_due_date) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?7)",
        rusqlite::params![
            new.payee_name,
            new.amount,
            new.transaction_type,
            new.category_id,
            new.frequency,
            new.interval,
            new.start_date,
            new.end_date,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_definition(conn: &Connection, id: i64) -> Result<RecurringDefinition> {
    conn.query_row(
        &format!("SELECT {DEFINITION_COLUMNS} FROM recurring_definitions WHERE id = ?1"),
        [id],
        definition_from_row,
    )
    .optional()?
    .ok_or_else(|| LebaroneError::NotFound(format!("recurring definition {id}")))
}

/// Stored definitions split into the rows that mapped cleanly and the rows
/// that did not.
#[derive(Debug, Default)]
pub struct LoadedDefinitions {
    pub definitions: Vec<RecurringDefinition>,
    pub rejected: Vec<DefinitionError>,
}

/// Load every definition. A row whose columns do not map onto the engine's
/// types is reported in `rejected` and does not stop the others loading.
pub fn load_definitions(conn: &Connection) -> Result<LoadedDefinitions> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {DEFINITION_COLUMNS} FROM recurring_definitions ORDER BY next_due_date, id"
    ))?;
    let mut rows = stmt.query([])?;
    let mut loaded = LoadedDefinitions::default();
    while let Some(row) = rows.next()? {
        let id: i64 = row.get(0)?;
        match definition_from_row(row) {
            Ok(def) => loaded.definitions.push(def),
            Err(e) => {
                warn!(definition_id = id, error = %e, "unreadable recurring definition");
                loaded.rejected.push(DefinitionError { definition_id: id, reason: e.to_string() });
            }
        }
    }
    Ok(loaded)
}

/// Overwrite every stored field of a definition, cursor included.
pub fn save_definition(conn: &Connection, def: &RecurringDefinition) -> Result<()> {
    let changed = conn.execute(
        "UPDATE recurring_definitions SET payee_name = ?1, amount = ?2, transaction_type = ?3, \
         category_id = ?4, frequency = ?5, interval = ?6, start_date = ?7, end_date = ?8, \
         next_due_date = ?9, last_generated_date = ?10, updated_at = datetime('now') WHERE id = ?11",
        rusqlite::params![
            def.payee_name,
            def.amount,
            def.transaction_type,
            def.category_id,
            def.frequency,
            def.interval,
            def.start_date,
            def.end_date,
            def.next_due_date,
            def.last_generated_date,
            def.id,
        ],
    )?;
    if changed == 0 {
        return Err(LebaroneError::NotFound(format!("recurring definition {}", def.id)));
    }
    Ok(())
}

/// Generated instances stay behind with their back-reference cleared.
pub fn delete_definition(conn: &Connection, id: i64) -> Result<()> {
    let changed = conn.execute("DELETE FROM recurring_definitions WHERE id = ?1", [id])?;
    if changed == 0 {
        return Err(LebaroneError::NotFound(format!("recurring definition {id}")));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Transaction instances
// ---------------------------------------------------------------------------

const INSTANCE_COLUMNS: &str = "id, payee_name, amount, transaction_type, category_id, due_date, \
     is_paid, payment_date, recurring_definition_id";

fn instance_from_row(row: &Row<'_>) -> rusqlite::Result<TransactionInstance> {
    Ok(TransactionInstance {
        id: row.get(0)?,
        payee_name: row.get(1)?,
        amount: row.get(2)?,
        transaction_type: row.get(3)?,
        category_id: row.get(4)?,
        due_date: row.get(5)?,
        is_paid: row.get(6)?,
        payment_date: row.get(7)?,
        recurring_definition_id: row.get(8)?,
    })
}

/// Every instance that carries a recurring back-reference; enough for the
/// materializer's duplicate check.
pub fn load_instances_for_definitions(conn: &Connection) -> Result<Vec<TransactionInstance>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {INSTANCE_COLUMNS} FROM transactions WHERE recurring_definition_id IS NOT NULL"
    ))?;
    let rows = stmt
        .query_map([], instance_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn list_instances(conn: &Connection, unpaid_only: bool) -> Result<Vec<TransactionInstance>> {
    let filter = if unpaid_only { "WHERE is_paid = 0" } else { "" };
    let mut stmt = conn.prepare(&format!(
        "SELECT {INSTANCE_COLUMNS} FROM transactions {filter} ORDER BY due_date, id"
    ))?;
    let rows = stmt
        .query_map([], instance_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn insert_instance(conn: &Connection, inst: &TransactionInstance) -> Result<i64> {
    conn.execute(
        "INSERT INTO transactions \
         (payee_name, amount, transaction_type, category_id, due_date, is_paid, payment_date, recurring_definition_id) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        rusqlite::params![
            inst.payee_name,
            inst.amount,
            inst.transaction_type,
            inst.category_id,
            inst.due_date,
            inst.is_paid,
            inst.payment_date,
            inst.recurring_definition_id,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn mark_paid(conn: &Connection, id: i64, payment_date: NaiveDate) -> Result<()> {
    let changed = conn.execute(
        "UPDATE transactions SET is_paid = 1, payment_date = ?1 WHERE id = ?2",
        rusqlite::params![payment_date, id],
    )?;
    if changed == 0 {
        return Err(LebaroneError::NotFound(format!("transaction {id}")));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Materialization pass
// ---------------------------------------------------------------------------

pub struct PersistOutcome {
    pub inserted: usize,
    /// Instances another writer stored first; dropped by the unique index.
    pub skipped: usize,
}

/// Store the output of one materialization pass atomically.
pub fn persist_pass(conn: &mut Connection, result: &MaterializeResult) -> Result<PersistOutcome> {
    let tx = conn.transaction()?;
    let mut inserted = 0usize;
    {
        let mut insert = tx.prepare_cached(
            "INSERT OR IGNORE INTO transactions \
             (payee_name, amount, transaction_type, category_id, due_date, is_paid, recurring_definition_id) \
             VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
        )?;
        for inst in &result.created_instances {
            inserted += insert.execute(rusqlite::params![
                inst.payee_name,
                inst.amount,
                inst.transaction_type,
                inst.category_id,
                inst.due_date,
                inst.recurring_definition_id,
            ])?;
        }

        let mut cursor = tx.prepare_cached(
            "UPDATE recurring_definitions SET next_due_date = ?1, last_generated_date = ?2, \
             updated_at = datetime('now') WHERE id = ?3",
        )?;
        for def in &result.updated_definitions {
            cursor.execute(rusqlite::params![def.next_due_date, def.last_generated_date, def.id])?;
        }
    }
    tx.commit()?;

    let skipped = result.created_instances.len() - inserted;
    debug!(inserted, skipped, definitions = result.updated_definitions.len(), "persisted pass");
    Ok(PersistOutcome { inserted, skipped })
}
