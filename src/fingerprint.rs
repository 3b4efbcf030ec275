//! Document integrity fingerprints for shared report copies.
//!
//! A report snapshot handed to an external party (printed, exported,
//! emailed) carries an 8-character fingerprint over its financial fields.
//! Verification recomputes the value from the stored record and compares
//! case-insensitively; any mismatch is treated as tampered, never partially
//! trusted.
//!
//! This is a rolling 32-bit hash, NOT a cryptographic one — it catches
//! accidental and casual edits, not a determined forger. If authenticity
//! guarantees are ever needed, substitute a keyed MAC (e.g. HMAC-SHA256)
//! while keeping the same field-set contract.

use chrono::Utc;
use rusqlite::{params, params_from_iter};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::db::DbState;
use crate::meter::round2;
use crate::scope::{self, Identity};
use crate::{value_str, PosError};

// ---------------------------------------------------------------------------
// Hash
// ---------------------------------------------------------------------------

/// Compute the fingerprint over the fixed, ordered field subset
/// `{id, report_date, station_id, total_sales, status, cash_collected}`.
///
/// Currency fields are canonicalized to 2 decimal places before hashing so
/// the fingerprint is insensitive to float formatting.
pub fn fingerprint(
    id: &str,
    report_date: &str,
    station_id: &str,
    total_sales: f64,
    status: &str,
    cash_collected: f64,
) -> String {
    let canonical = format!(
        "{id}|{report_date}|{station_id}|{total_sales:.2}|{status}|{cash_collected:.2}"
    );

    let mut hash: i32 = 0;
    for ch in canonical.chars() {
        hash = hash.wrapping_mul(31).wrapping_add(ch as i32);
    }

    format!("{:08X}", hash.unsigned_abs())
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

/// Freeze a station's daily report and fingerprint it.
///
/// **Idempotent:** if a snapshot already exists for this (station, date),
/// returns the existing one without creating a duplicate.
pub fn generate_snapshot(
    db: &DbState,
    identity: &Identity,
    payload: &Value,
) -> Result<Value, PosError> {
    let conn = db.conn.lock()?;

    let station_id = value_str(payload, &["stationId", "station_id"])
        .or_else(|| identity.station_id.clone())
        .ok_or_else(|| PosError::validation("Missing stationId"))?;
    scope::authorize_station(&conn, identity, &station_id)?;

    let report_date = value_str(payload, &["date", "reportDate", "report_date"])
        .unwrap_or_else(|| chrono::Local::now().format("%Y-%m-%d").to_string());

    // Idempotence check
    let existing: Option<String> = conn
        .query_row(
            "SELECT id FROM report_snapshots WHERE station_id = ?1 AND report_date = ?2",
            params![station_id, report_date],
            |row| row.get(0),
        )
        .ok();
    if let Some(existing_id) = existing {
        let snapshot = snapshot_json(&conn, &existing_id)?;
        return Ok(serde_json::json!({
            "success": true,
            "existing": true,
            "snapshotId": existing_id,
            "snapshot": snapshot,
        }));
    }

    // Aggregate the day's figures from the sales ledger
    let total_sales: f64 = conn
        .query_row(
            "SELECT COALESCE(SUM(total_amount), 0)
             FROM sales
             WHERE station_id = ?1 AND substr(transaction_time, 1, 10) = ?2
               AND status != 'cancelled' AND is_void = 0",
            params![station_id, report_date],
            |row| row.get(0),
        )
        .unwrap_or(0.0);
    let cash_collected: f64 = conn
        .query_row(
            "SELECT COALESCE(SUM(cash_received), 0)
             FROM sales
             WHERE station_id = ?1 AND substr(transaction_time, 1, 10) = ?2
               AND payment_method = 'cash'
               AND status = 'completed' AND is_void = 0",
            params![station_id, report_date],
            |row| row.get(0),
        )
        .unwrap_or(0.0);

    let snapshot_id = Uuid::new_v4().to_string();
    let total_sales = round2(total_sales);
    let cash_collected = round2(cash_collected);
    let status = "final";
    let hash = fingerprint(
        &snapshot_id,
        &report_date,
        &station_id,
        total_sales,
        status,
        cash_collected,
    );
    let now = Utc::now().to_rfc3339();

    let report_json = serde_json::json!({
        "id": snapshot_id,
        "reportDate": report_date,
        "stationId": station_id,
        "totalSales": total_sales,
        "cashCollected": cash_collected,
        "status": status,
        "fingerprint": hash,
    })
    .to_string();

    conn.execute(
        "INSERT INTO report_snapshots (
            id, station_id, report_date, total_sales, cash_collected,
            status, fingerprint, report_json, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
        params![
            snapshot_id,
            station_id,
            report_date,
            total_sales,
            cash_collected,
            status,
            hash,
            report_json,
            now,
        ],
    )?;

    info!(
        snapshot_id = %snapshot_id,
        station_id = %station_id,
        report_date = %report_date,
        fingerprint = %hash,
        "Report snapshot generated"
    );

    let snapshot = snapshot_json(&conn, &snapshot_id)?;
    Ok(serde_json::json!({
        "success": true,
        "existing": false,
        "snapshotId": snapshot_id,
        "snapshot": snapshot,
    }))
}

/// Verify an externally supplied fingerprint against a stored snapshot.
///
/// The fingerprint is always recomputed from the stored financial fields —
/// the persisted hash column is informational, never trusted for
/// verification.
pub fn verify_snapshot(
    db: &DbState,
    identity: &Identity,
    payload: &Value,
) -> Result<Value, PosError> {
    let conn = db.conn.lock()?;

    let snapshot_id = value_str(payload, &["snapshotId", "snapshot_id", "id"])
        .ok_or_else(|| PosError::validation("Missing snapshotId"))?;
    let supplied = value_str(payload, &["hash", "fingerprint"])
        .ok_or_else(|| PosError::validation("Missing hash"))?;

    let scope_filter = scope::scope_filter(identity)?;
    let (clause, scope_params) = scope_filter.sql("station_id");
    let sql = format!(
        "SELECT station_id, report_date, total_sales, cash_collected, status
         FROM report_snapshots WHERE id = ? AND {clause}"
    );
    let mut bind: Vec<String> = vec![snapshot_id.clone()];
    bind.extend(scope_params);

    let (station_id, report_date, total_sales, cash_collected, status) = conn
        .query_row(&sql, params_from_iter(bind.iter()), |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, f64>(2)?,
                row.get::<_, f64>(3)?,
                row.get::<_, String>(4)?,
            ))
        })
        .map_err(|_| PosError::not_found(format!("Snapshot not found: {snapshot_id}")))?;

    let expected = fingerprint(
        &snapshot_id,
        &report_date,
        &station_id,
        total_sales,
        &status,
        cash_collected,
    );

    if !expected.eq_ignore_ascii_case(supplied.trim()) {
        return Err(PosError::Tampered);
    }

    Ok(serde_json::json!({
        "success": true,
        "snapshotId": snapshot_id,
        "verified": true,
        "fingerprint": expected,
    }))
}

fn snapshot_json(conn: &rusqlite::Connection, snapshot_id: &str) -> Result<Value, PosError> {
    conn.query_row(
        "SELECT id, station_id, report_date, total_sales, cash_collected,
                status, fingerprint, created_at
         FROM report_snapshots WHERE id = ?1",
        params![snapshot_id],
        |row| {
            Ok(serde_json::json!({
                "id": row.get::<_, String>(0)?,
                "stationId": row.get::<_, String>(1)?,
                "reportDate": row.get::<_, String>(2)?,
                "totalSales": row.get::<_, f64>(3)?,
                "cashCollected": row.get::<_, f64>(4)?,
                "status": row.get::<_, String>(5)?,
                "fingerprint": row.get::<_, String>(6)?,
                "createdAt": row.get::<_, String>(7)?,
            }))
        },
    )
    .map_err(|_| PosError::not_found(format!("Snapshot not found: {snapshot_id}")))
}

// ===========================================================================
// Tests
// ===========================================================================
