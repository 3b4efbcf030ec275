//! Local SQLite database layer for Forecourt Console.
//!
//! Uses rusqlite with WAL mode. Provides schema migrations, settings
//! helpers, and the managed connection state shared by all command
//! handlers. The store is the single source of truth for stations, pumps,
//! products, prices, sales, and bank deposits; role-based visibility is
//! computed from the ownership edges at query time, never stored.

use rusqlite::{params, Connection};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{error, info, warn};

/// Managed state holding the database connection.
///
/// One connection behind a mutex: multi-write operations run inside
/// `BEGIN IMMEDIATE` transactions, so concurrent sale submissions against
/// the same pump serialize here rather than racing on the meter reading.
pub struct DbState {
    pub conn: Mutex<Connection>,
    pub db_path: PathBuf,
}

/// Current schema version. Bump when adding new migrations.
const CURRENT_SCHEMA_VERSION: i32 = 3;

/// Initialize the database at `{data_dir}/forecourt.db`.
///
/// Creates the directory if needed, opens the connection, sets pragmas,
/// and runs any pending migrations. On corruption or open failure,
/// deletes the file and retries once.
pub fn init(data_dir: &Path) -> Result<DbState, String> {
    fs::create_dir_all(data_dir).map_err(|e| format!("Failed to create data dir: {e}"))?;

    let db_path = data_dir.join("forecourt.db");
    info!("Opening database at {}", db_path.display());

    let conn = match open_and_configure(&db_path) {
        Ok(c) => c,
        Err(first_err) => {
            warn!(
                "Database open failed ({}), deleting and retrying once",
                first_err
            );
            if db_path.exists() {
                let _ = fs::remove_file(&db_path);
                // Also remove WAL/SHM files if present
                let wal = db_path.with_extension("db-wal");
                let shm = db_path.with_extension("db-shm");
                let _ = fs::remove_file(&wal);
                let _ = fs::remove_file(&shm);
            }
            open_and_configure(&db_path)
                .map_err(|e| format!("Database open failed after retry: {e}"))?
        }
    };

    run_migrations(&conn)?;

    info!("Database initialized (schema v{CURRENT_SCHEMA_VERSION})");

    Ok(DbState {
        conn: Mutex::new(conn),
        db_path,
    })
}

/// Open the database file and apply pragmas.
fn open_and_configure(path: &Path) -> Result<Connection, String> {
    let conn = Connection::open(path).map_err(|e| format!("sqlite open: {e}"))?;

    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;",
    )
    .map_err(|e| format!("pragma setup: {e}"))?;

    Ok(conn)
}

/// Run all pending migrations up to `CURRENT_SCHEMA_VERSION`.
fn run_migrations(conn: &Connection) -> Result<(), String> {
    // Ensure schema_version table exists first
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT DEFAULT (datetime('now'))
        );",
    )
    .map_err(|e| format!("create schema_version: {e}"))?;

    let current: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current >= CURRENT_SCHEMA_VERSION {
        info!("Database schema up to date (v{current})");
        return Ok(());
    }

    info!("Migrating database from v{current} to v{CURRENT_SCHEMA_VERSION}");

    if current < 1 {
        migrate_v1(conn)?;
    }
    if current < 2 {
        migrate_v2(conn)?;
    }
    if current < 3 {
        migrate_v3(conn)?;
    }

    Ok(())
}

/// Migration v1: network topology, pumps, products, prices, sales.
fn migrate_v1(conn: &Connection) -> Result<(), String> {
    conn.execute_batch(
        "
        -- local_settings (category/key/value store)
        CREATE TABLE IF NOT EXISTS local_settings (
            id TEXT PRIMARY KEY DEFAULT (lower(hex(randomblob(16)))),
            setting_category TEXT NOT NULL,
            setting_key TEXT NOT NULL,
            setting_value TEXT NOT NULL,
            updated_at TEXT DEFAULT (datetime('now')),
            UNIQUE(setting_category, setting_key)
        );

        -- Oil marketing companies
        CREATE TABLE IF NOT EXISTS omcs (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            created_at TEXT DEFAULT (datetime('now'))
        );

        -- Dealers
        CREATE TABLE IF NOT EXISTS dealers (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            created_at TEXT DEFAULT (datetime('now'))
        );

        -- Stations. dealer_id / omc_id are both optional and non-exclusive;
        -- scope visibility is derived from these edges at query time.
        CREATE TABLE IF NOT EXISTS stations (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            dealer_id TEXT REFERENCES dealers(id),
            omc_id TEXT REFERENCES omcs(id),
            created_at TEXT DEFAULT (datetime('now'))
        );

        -- Fuel products
        CREATE TABLE IF NOT EXISTS products (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            fuel_type TEXT NOT NULL,
            unit TEXT NOT NULL DEFAULT 'litre',
            created_at TEXT DEFAULT (datetime('now'))
        );

        -- Station+product unit prices (the price-resolution table)
        CREATE TABLE IF NOT EXISTS station_prices (
            station_id TEXT NOT NULL REFERENCES stations(id),
            product_id TEXT NOT NULL REFERENCES products(id),
            unit_price REAL NOT NULL,
            updated_at TEXT DEFAULT (datetime('now')),
            PRIMARY KEY (station_id, product_id)
        );

        -- Pumps. current_meter_reading is the authoritative opening value
        -- for the next sale on that pump; advanced exactly once per sale.
        CREATE TABLE IF NOT EXISTS pumps (
            id TEXT PRIMARY KEY,
            station_id TEXT NOT NULL REFERENCES stations(id),
            pump_number INTEGER NOT NULL,
            fuel_type TEXT NOT NULL,
            current_meter_reading REAL NOT NULL DEFAULT 0,
            created_at TEXT DEFAULT (datetime('now')),
            updated_at TEXT DEFAULT (datetime('now'))
        );

        -- Sales. litres_sold / total_amount / variance are derived columns,
        -- written only by the calculator. Soft-deleted via status='cancelled'.
        CREATE TABLE IF NOT EXISTS sales (
            id TEXT PRIMARY KEY,
            station_id TEXT NOT NULL REFERENCES stations(id),
            pump_id TEXT NOT NULL REFERENCES pumps(id),
            pump_number INTEGER NOT NULL,
            product_id TEXT NOT NULL REFERENCES products(id),
            opening_meter REAL NOT NULL,
            closing_meter REAL NOT NULL,
            unit_price REAL NOT NULL,
            litres_sold REAL NOT NULL,
            total_amount REAL NOT NULL,
            cash_received REAL NOT NULL,
            variance REAL NOT NULL,
            payment_method TEXT NOT NULL DEFAULT 'cash',
            customer_type TEXT NOT NULL DEFAULT 'retail',
            status TEXT NOT NULL DEFAULT 'completed',
            transaction_time TEXT NOT NULL,
            created_by TEXT,
            is_void INTEGER NOT NULL DEFAULT 0,
            notes TEXT,
            created_at TEXT DEFAULT (datetime('now')),
            updated_at TEXT DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_sales_station ON sales(station_id);
        CREATE INDEX IF NOT EXISTS idx_sales_time ON sales(transaction_time);
        CREATE INDEX IF NOT EXISTS idx_pumps_station ON pumps(station_id);

        -- Record migration
        INSERT INTO schema_version (version) VALUES (1);
        ",
    )
    .map_err(|e| {
        error!("Migration v1 failed: {e}");
        format!("migration v1: {e}")
    })?;

    info!("Applied migration v1 (network, pumps, products, sales)");
    Ok(())
}

/// Migration v2: bank deposits.
fn migrate_v2(conn: &Connection) -> Result<(), String> {
    conn.execute_batch(
        "
        -- Bank deposits. Forward-only status lifecycle
        -- (pending -> confirmed -> reconciled); deleted_at is the soft-delete
        -- stamp, mirroring the sales cancellation pattern.
        CREATE TABLE IF NOT EXISTS bank_deposits (
            id TEXT PRIMARY KEY,
            station_id TEXT NOT NULL REFERENCES stations(id),
            amount REAL NOT NULL,
            bank_name TEXT NOT NULL,
            account_number TEXT NOT NULL,
            reference_number TEXT,
            depositor_name TEXT,
            status TEXT NOT NULL DEFAULT 'pending',
            notes TEXT,
            reconciliation_date TEXT,
            created_by TEXT,
            deleted_at TEXT,
            created_at TEXT DEFAULT (datetime('now')),
            updated_at TEXT DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_deposits_station ON bank_deposits(station_id);
        CREATE INDEX IF NOT EXISTS idx_deposits_status ON bank_deposits(status);

        INSERT INTO schema_version (version) VALUES (2);
        ",
    )
    .map_err(|e| {
        error!("Migration v2 failed: {e}");
        format!("migration v2: {e}")
    })?;

    info!("Applied migration v2 (bank_deposits table)");
    Ok(())
}

/// Migration v3: persisted report snapshots.
fn migrate_v3(conn: &Connection) -> Result<(), String> {
    conn.execute_batch(
        "
        -- Frozen daily reports, one per (station, date). The fingerprint
        -- covers the fixed financial field set and is recomputed on
        -- verification, never trusted from outside.
        CREATE TABLE IF NOT EXISTS report_snapshots (
            id TEXT PRIMARY KEY,
            station_id TEXT NOT NULL REFERENCES stations(id),
            report_date TEXT NOT NULL,
            total_sales REAL NOT NULL,
            cash_collected REAL NOT NULL,
            status TEXT NOT NULL DEFAULT 'final',
            fingerprint TEXT NOT NULL,
            report_json TEXT,
            created_at TEXT DEFAULT (datetime('now')),
            updated_at TEXT DEFAULT (datetime('now')),
            UNIQUE(station_id, report_date)
        );

        INSERT INTO schema_version (version) VALUES (3);
        ",
    )
    .map_err(|e| {
        error!("Migration v3 failed: {e}");
        format!("migration v3: {e}")
    })?;

    info!("Applied migration v3 (report_snapshots table)");
    Ok(())
}

// ---------------------------------------------------------------------------
// Settings helpers
// ---------------------------------------------------------------------------

/// Get a single setting value.
pub fn get_setting(conn: &Connection, category: &str, key: &str) -> Option<String> {
    conn.query_row(
        "SELECT setting_value FROM local_settings WHERE setting_category = ?1 AND setting_key = ?2",
        params![category, key],
        |row| row.get(0),
    )
    .ok()
}

/// Insert or update a setting.
pub fn set_setting(
    conn: &Connection,
    category: &str,
    key: &str,
    value: &str,
) -> Result<(), String> {
    conn.execute(
        "INSERT INTO local_settings (setting_category, setting_key, setting_value, updated_at)
         VALUES (?1, ?2, ?3, datetime('now'))
         ON CONFLICT(setting_category, setting_key) DO UPDATE SET
            setting_value = excluded.setting_value,
            updated_at = excluded.updated_at",
        params![category, key, value],
    )
    .map_err(|e| format!("set_setting: {e}"))?;
    Ok(())
}

/// Run all migrations on the given connection (test helper, not public API).
#[cfg(test)]
pub fn run_migrations_for_test(conn: &Connection) {
    run_migrations(conn).expect("run_migrations should succeed in test");
}

// ===========================================================================
// Tests
// ===========================================================================
