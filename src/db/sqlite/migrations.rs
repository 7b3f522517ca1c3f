//! SQLite database migrations

use crate::error::Result;
use rusqlite::Connection;

/// Run all database migrations
pub fn run_migrations(conn: &Connection) -> Result<()> {
    // Create migrations table
    conn.execute(
        "CREATE TABLE IF NOT EXISTS migrations (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    run_migration(conn, "001_companies", CREATE_COMPANIES_TABLE)?;
    run_migration(conn, "002_activity_logs", CREATE_ACTIVITY_LOGS_TABLE)?;

    tracing::info!("Database migrations completed");
    Ok(())
}

fn run_migration(conn: &Connection, name: &str, sql: &str) -> Result<()> {
    // Check if migration already applied
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM migrations WHERE name = ?)",
        [name],
        |row| row.get(0),
    )?;

    if !exists {
        tracing::info!("Running migration: {}", name);
        conn.execute_batch(sql)?;
        conn.execute("INSERT INTO migrations (name) VALUES (?)", [name])?;
    }

    Ok(())
}

const CREATE_COMPANIES_TABLE: &str = r#"
CREATE TABLE companies (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    siren TEXT NOT NULL UNIQUE,
    siret_siege TEXT,
    legal_name TEXT NOT NULL,
    legal_form TEXT,
    created_on TEXT,
    address TEXT,
    email TEXT,
    phone TEXT,
    vat_number TEXT,
    annual_revenue REAL,
    net_income REAL,
    headcount INTEGER,
    share_capital REAL,
    naf_code TEXT,
    naf_label TEXT,
    primary_officer TEXT,
    officers TEXT NOT NULL DEFAULT '[]',
    status TEXT NOT NULL DEFAULT 'to contact',
    source_url TEXT,
    prospection_score REAL,
    score_breakdown TEXT,
    last_scraped_at TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
CREATE INDEX IF NOT EXISTS idx_companies_revenue ON companies(annual_revenue);
CREATE INDEX IF NOT EXISTS idx_companies_status ON companies(status);
CREATE INDEX IF NOT EXISTS idx_companies_score ON companies(prospection_score);
"#;

const CREATE_ACTIVITY_LOGS_TABLE: &str = r#"
CREATE TABLE activity_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    siren TEXT NOT NULL,
    action TEXT NOT NULL,
    details TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);
CREATE INDEX IF NOT EXISTS idx_activity_logs_siren ON activity_logs(siren);
"#;
