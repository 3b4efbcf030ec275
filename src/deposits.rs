//! Bank-deposit reconciliation lifecycle.
//!
//! A deposit moves `pending -> confirmed -> reconciled`, forward only, with
//! `reconciled` terminal. Every transition is compare-and-set on the current
//! status so two actors racing on the same deposit cannot silently overwrite
//! each other — the loser gets `InvalidTransition` and the status is left
//! untouched.
//!
//! **Rules:**
//! - `amount > 0`; `account_number` at least 8 characters
//! - edit/delete only while `pending`, except admin at any status
//! - deletion is a soft delete (`deleted_at`), mirroring the sales
//!   cancellation pattern, so the ledger history stays auditable
//! - `reconciliation_date` is set if and only if status is `reconciled`

use chrono::Utc;
use rusqlite::{params, params_from_iter};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::DbState;
use crate::meter::round2;
use crate::scope::{self, Identity};
use crate::PosError;

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate_amount(amount: f64) -> Result<(), PosError> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(PosError::validation(
            "Deposit amount must be greater than zero",
        ));
    }
    Ok(())
}

fn validate_account_number(account_number: &str) -> Result<(), PosError> {
    if account_number.trim().len() < 8 {
        return Err(PosError::validation(
            "Account number must be at least 8 characters",
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Create
// ---------------------------------------------------------------------------

/// Record a new deposit. Always starts in `pending`.
pub fn create_deposit(
    db: &DbState,
    identity: &Identity,
    payload: &Value,
) -> Result<Value, PosError> {
    if !scope::can_record_sales(identity.role) {
        return Err(PosError::Forbidden);
    }

    let conn = db.conn.lock()?;

    let station_id = str_field(payload, "stationId")
        .or_else(|| str_field(payload, "station_id"))
        .or_else(|| identity.station_id.clone())
        .ok_or_else(|| PosError::validation("Missing stationId"))?;
    scope::authorize_station(&conn, identity, &station_id)?;

    let station_exists: bool = conn
        .query_row(
            "SELECT 1 FROM stations WHERE id = ?1",
            params![station_id],
            |_| Ok(true),
        )
        .unwrap_or(false);
    if !station_exists {
        return Err(PosError::not_found(format!(
            "Station not found: {station_id}"
        )));
    }

    let amount = num_field(payload, "amount")
        .ok_or_else(|| PosError::validation("Missing amount"))?;
    validate_amount(amount)?;

    let bank_name = str_field(payload, "bankName")
        .or_else(|| str_field(payload, "bank_name"))
        .ok_or_else(|| PosError::validation("Missing bankName"))?;
    let account_number = str_field(payload, "accountNumber")
        .or_else(|| str_field(payload, "account_number"))
        .ok_or_else(|| PosError::validation("Missing accountNumber"))?;
    validate_account_number(&account_number)?;

    let reference_number =
        str_field(payload, "referenceNumber").or_else(|| str_field(payload, "reference_number"));
    let depositor_name =
        str_field(payload, "depositorName").or_else(|| str_field(payload, "depositor_name"));
    let notes = str_field(payload, "notes");
    let created_by = str_field(payload, "createdBy").or_else(|| str_field(payload, "created_by"));

    let deposit_id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();

    conn.execute(
        "INSERT INTO bank_deposits (
            id, station_id, amount, bank_name, account_number,
            reference_number, depositor_name, status, notes,
            created_by, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'pending', ?8, ?9, ?10, ?10)",
        params![
            deposit_id,
            station_id,
            round2(amount),
            bank_name,
            account_number,
            reference_number,
            depositor_name,
            notes,
            created_by,
            now,
        ],
    )?;

    info!(
        deposit_id = %deposit_id,
        station_id = %station_id,
        amount = %amount,
        "Deposit recorded"
    );

    Ok(serde_json::json!({
        "success": true,
        "depositId": deposit_id,
        "status": "pending",
        "message": format!("Deposit of {amount:.2} recorded"),
    }))
}

// ---------------------------------------------------------------------------
// Transitions
// ---------------------------------------------------------------------------

/// Confirm a pending deposit. Sets status, stamps nothing else.
pub fn confirm_deposit(
    db: &DbState,
    identity: &Identity,
    payload: &Value,
) -> Result<Value, PosError> {
    transition(db, identity, payload, "confirmed", &["pending"])
}

/// Reconcile a deposit from `pending` or `confirmed`. Stamps
/// `reconciliation_date`.
pub fn reconcile_deposit(
    db: &DbState,
    identity: &Identity,
    payload: &Value,
) -> Result<Value, PosError> {
    transition(db, identity, payload, "reconciled", &["pending", "confirmed"])
}

/// Compare-and-set status transition. The `UPDATE` is predicated on the
/// current status: zero rows affected means either the deposit is gone or
/// another actor advanced it first, and the status is left untouched.
fn transition(
    db: &DbState,
    identity: &Identity,
    payload: &Value,
    to: &str,
    allowed_from: &[&str],
) -> Result<Value, PosError> {
    if !scope::can_edit_records(identity.role) {
        return Err(PosError::Forbidden);
    }

    let conn = db.conn.lock()?;

    let deposit_id = str_field(payload, "depositId")
        .or_else(|| str_field(payload, "deposit_id"))
        .or_else(|| str_field(payload, "id"))
        .ok_or_else(|| PosError::validation("Missing depositId"))?;

    // Callers may pin the transition to the status they observed
    // (optimistic concurrency); defaults to any legal source state.
    let expected = str_field(payload, "expectedStatus")
        .or_else(|| str_field(payload, "expected_status"));
    if let Some(ref exp) = expected {
        if !allowed_from.contains(&exp.as_str()) {
            return Err(PosError::InvalidTransition {
                from: exp.clone(),
                to: to.to_string(),
            });
        }
    }

    let current = fetch_status_in_scope(&conn, identity, &deposit_id)?;

    let from_set: Vec<&str> = match expected.as_deref() {
        Some(exp) => vec![exp],
        None => allowed_from.to_vec(),
    };

    let now = Utc::now().to_rfc3339();
    let placeholders = from_set.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
    let sql = if to == "reconciled" {
        format!(
            "UPDATE bank_deposits SET status = ?, reconciliation_date = ?, updated_at = ?
             WHERE id = ? AND deleted_at IS NULL AND status IN ({placeholders})"
        )
    } else {
        format!(
            "UPDATE bank_deposits SET status = ?, updated_at = ?
             WHERE id = ? AND deleted_at IS NULL AND status IN ({placeholders})"
        )
    };

    let mut bind: Vec<String> = vec![to.to_string()];
    if to == "reconciled" {
        bind.push(now.clone());
    }
    bind.push(now.clone());
    bind.push(deposit_id.clone());
    bind.extend(from_set.iter().map(|s| s.to_string()));

    let rows = conn.execute(&sql, params_from_iter(bind.iter()))?;
    if rows != 1 {
        // CAS lost: the deposit moved underneath us (or was already past
        // the source states). Report where it actually is.
        warn!(
            deposit_id = %deposit_id,
            from = %current,
            to = %to,
            "Rejected deposit transition"
        );
        return Err(PosError::InvalidTransition {
            from: current,
            to: to.to_string(),
        });
    }

    info!(deposit_id = %deposit_id, from = %current, to = %to, "Deposit transitioned");

    Ok(serde_json::json!({
        "success": true,
        "depositId": deposit_id,
        "status": to,
        "reconciliationDate": (if to == "reconciled" { Some(now) } else { None }),
    }))
}

// ---------------------------------------------------------------------------
// Edit / delete
// ---------------------------------------------------------------------------

/// Edit deposit fields. Only `pending` deposits are editable, except by
/// admin. Status changes go through the transition calls, never here.
pub fn update_deposit(
    db: &DbState,
    identity: &Identity,
    payload: &Value,
) -> Result<Value, PosError> {
    if !scope::can_edit_records(identity.role) {
        return Err(PosError::Forbidden);
    }

    let conn = db.conn.lock()?;

    let deposit_id = str_field(payload, "depositId")
        .or_else(|| str_field(payload, "deposit_id"))
        .or_else(|| str_field(payload, "id"))
        .ok_or_else(|| PosError::validation("Missing depositId"))?;

    let status = fetch_status_in_scope(&conn, identity, &deposit_id)?;
    if status != "pending" && !scope::can_override_deposit_lock(identity.role) {
        return Err(PosError::validation(format!(
            "Only pending deposits can be edited (current status: {status})"
        )));
    }

    if let Some(amount) = num_field(payload, "amount") {
        validate_amount(amount)?;
    }
    if let Some(account) = str_field(payload, "accountNumber")
        .or_else(|| str_field(payload, "account_number"))
    {
        validate_account_number(&account)?;
    }

    let now = Utc::now().to_rfc3339();
    conn.execute(
        "UPDATE bank_deposits SET
            amount = COALESCE(?1, amount),
            bank_name = COALESCE(?2, bank_name),
            account_number = COALESCE(?3, account_number),
            reference_number = COALESCE(?4, reference_number),
            depositor_name = COALESCE(?5, depositor_name),
            notes = COALESCE(?6, notes),
            updated_at = ?7
         WHERE id = ?8",
        params![
            num_field(payload, "amount").map(round2),
            str_field(payload, "bankName").or_else(|| str_field(payload, "bank_name")),
            str_field(payload, "accountNumber").or_else(|| str_field(payload, "account_number")),
            str_field(payload, "referenceNumber")
                .or_else(|| str_field(payload, "reference_number")),
            str_field(payload, "depositorName").or_else(|| str_field(payload, "depositor_name")),
            str_field(payload, "notes"),
            now,
            deposit_id,
        ],
    )?;

    info!(deposit_id = %deposit_id, "Deposit updated");

    Ok(serde_json::json!({ "success": true, "depositId": deposit_id }))
}

/// Soft-delete a deposit from the active ledger. Same authority rule as
/// edit; the row survives for audit.
pub fn delete_deposit(
    db: &DbState,
    identity: &Identity,
    payload: &Value,
) -> Result<Value, PosError> {
    if !scope::can_edit_records(identity.role) {
        return Err(PosError::Forbidden);
    }

    let conn = db.conn.lock()?;

    let deposit_id = str_field(payload, "depositId")
        .or_else(|| str_field(payload, "deposit_id"))
        .or_else(|| str_field(payload, "id"))
        .ok_or_else(|| PosError::validation("Missing depositId"))?;

    let status = fetch_status_in_scope(&conn, identity, &deposit_id)?;
    if status != "pending" && !scope::can_override_deposit_lock(identity.role) {
        return Err(PosError::validation(format!(
            "Only pending deposits can be deleted (current status: {status})"
        )));
    }

    let now = Utc::now().to_rfc3339();
    conn.execute(
        "UPDATE bank_deposits SET deleted_at = ?1, updated_at = ?1 WHERE id = ?2",
        params![now, deposit_id],
    )?;

    info!(deposit_id = %deposit_id, "Deposit removed from active ledger");

    Ok(serde_json::json!({ "success": true, "depositId": deposit_id }))
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// List active (non-deleted) deposits visible to the identity, newest first.
pub fn list_deposits(
    db: &DbState,
    identity: &Identity,
    payload: &Value,
) -> Result<Value, PosError> {
    let conn = db.conn.lock()?;

    let scope_filter = scope::scope_filter(identity)?;
    let (clause, scope_params) = scope_filter.sql("station_id");

    let mut conditions = vec![clause, "deleted_at IS NULL".to_string()];
    let mut bind: Vec<String> = scope_params;

    if let Some(station_id) =
        str_field(payload, "stationId").or_else(|| str_field(payload, "station_id"))
    {
        scope::authorize_station(&conn, identity, &station_id)?;
        conditions.push("station_id = ?".to_string());
        bind.push(station_id);
    }
    if let Some(status) = str_field(payload, "status") {
        conditions.push("status = ?".to_string());
        bind.push(status);
    }

    let sql = format!(
        "SELECT id, station_id, amount, bank_name, account_number,
                reference_number, depositor_name, status, notes,
                reconciliation_date, created_by, created_at
         FROM bank_deposits WHERE {} ORDER BY created_at DESC",
        conditions.join(" AND ")
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(bind.iter()), |row| {
        Ok(serde_json::json!({
            "id": row.get::<_, String>(0)?,
            "stationId": row.get::<_, String>(1)?,
            "amount": row.get::<_, f64>(2)?,
            "bankName": row.get::<_, String>(3)?,
            "accountNumber": row.get::<_, String>(4)?,
            "referenceNumber": row.get::<_, Option<String>>(5)?,
            "depositorName": row.get::<_, Option<String>>(6)?,
            "status": row.get::<_, String>(7)?,
            "notes": row.get::<_, Option<String>>(8)?,
            "reconciliationDate": row.get::<_, Option<String>>(9)?,
            "createdBy": row.get::<_, Option<String>>(10)?,
            "createdAt": row.get::<_, String>(11)?,
        }))
    })?;

    let mut deposits = Vec::new();
    for row in rows {
        match row {
            Ok(v) => deposits.push(v),
            Err(e) => warn!("skipping malformed deposit row: {e}"),
        }
    }

    Ok(serde_json::json!({ "success": true, "deposits": deposits }))
}

/// Cash context for a station: what completed cash sales collected, what
/// the active deposits already cover, and the undeposited remainder.
pub fn deposit_context(
    db: &DbState,
    identity: &Identity,
    payload: &Value,
) -> Result<Value, PosError> {
    let conn = db.conn.lock()?;

    let station_id = str_field(payload, "stationId")
        .or_else(|| str_field(payload, "station_id"))
        .or_else(|| identity.station_id.clone())
        .ok_or_else(|| PosError::validation("Missing stationId"))?;
    scope::authorize_station(&conn, identity, &station_id)?;

    let cash_collected: f64 = conn
        .query_row(
            "SELECT COALESCE(SUM(cash_received), 0)
             FROM sales
             WHERE station_id = ?1 AND payment_method = 'cash'
               AND status = 'completed' AND is_void = 0",
            params![station_id],
            |row| row.get(0),
        )
        .unwrap_or(0.0);

    let deposited_total: f64 = conn
        .query_row(
            "SELECT COALESCE(SUM(amount), 0)
             FROM bank_deposits
             WHERE station_id = ?1 AND deleted_at IS NULL",
            params![station_id],
            |row| row.get(0),
        )
        .unwrap_or(0.0);

    Ok(serde_json::json!({
        "success": true,
        "stationId": station_id,
        "cashCollected": round2(cash_collected),
        "depositedTotal": round2(deposited_total),
        "undepositedCash": round2(cash_collected - deposited_total),
    }))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Fetch a deposit's status within the caller's scope. Out-of-scope rows
/// look exactly like missing rows.
fn fetch_status_in_scope(
    conn: &rusqlite::Connection,
    identity: &Identity,
    deposit_id: &str,
) -> Result<String, PosError> {
    let scope_filter = scope::scope_filter(identity)?;
    let (clause, scope_params) = scope_filter.sql("station_id");
    let sql = format!(
        "SELECT status FROM bank_deposits WHERE id = ? AND deleted_at IS NULL AND {clause}"
    );
    let mut bind: Vec<String> = vec![deposit_id.to_string()];
    bind.extend(scope_params);

    conn.query_row(&sql, params_from_iter(bind.iter()), |row| row.get(0))
        .map_err(|_| PosError::not_found(format!("Deposit not found: {deposit_id}")))
}

fn str_field(v: &Value, key: &str) -> Option<String> {
    v.get(key).and_then(Value::as_str).map(String::from)
}

fn num_field(v: &Value, key: &str) -> Option<f64> {
    v.get(key).and_then(Value::as_f64)
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::scope::Role;
    use rusqlite::Connection;

    fn test_db() -> DbState {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;
             PRAGMA synchronous = NORMAL;",
        )
        .expect("pragma setup");
        db::run_migrations_for_test(&conn);
        DbState {
            conn: std::sync::Mutex::new(conn),
            db_path: std::path::PathBuf::from(":memory:"),
        }
    }

    fn seed_station(db: &DbState) {
        let conn = db.conn.lock().unwrap();
        conn.execute_batch(
            "INSERT INTO stations (id, name) VALUES ('st-1', 'Airport Rd'), ('st-2', 'Harbour View');",
        )
        .expect("seed stations");
    }

    fn manager(station: &str) -> Identity {
        Identity::for_station(Role::StationManager, station)
    }

    fn seed_deposit(db: &DbState, amount: f64) -> String {
        let result = create_deposit(
            db,
            &manager("st-1"),
            &serde_json::json!({
                "stationId": "st-1",
                "amount": amount,
                "bankName": "GCB",
                "accountNumber": "00112233445",
                "depositorName": "K. Mensah",
            }),
        )
        .unwrap();
        result["depositId"].as_str().unwrap().to_string()
    }

    #[test]
    fn test_create_starts_pending() {
        let db = test_db();
        seed_station(&db);
        let id = seed_deposit(&db, 5000.0);

        let conn = db.conn.lock().unwrap();
        let (status, recon_date): (String, Option<String>) = conn
            .query_row(
                "SELECT status, reconciliation_date FROM bank_deposits WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(status, "pending");
        assert_eq!(recon_date, None);
    }

    #[test]
    fn test_amount_and_account_validation() {
        let db = test_db();
        seed_station(&db);

        let err = create_deposit(
            &db,
            &manager("st-1"),
            &serde_json::json!({
                "stationId": "st-1", "amount": 0.0,
                "bankName": "GCB", "accountNumber": "00112233445",
            }),
        )
        .unwrap_err();
        assert_eq!(err.kind(), "validation");

        let err = create_deposit(
            &db,
            &manager("st-1"),
            &serde_json::json!({
                "stationId": "st-1", "amount": 100.0,
                "bankName": "GCB", "accountNumber": "1234567",
            }),
        )
        .unwrap_err();
        assert!(err.to_string().contains("at least 8"));
    }

    #[test]
    fn test_confirm_then_reconcile_succeeds() {
        let db = test_db();
        seed_station(&db);
        let id = seed_deposit(&db, 5000.0);
        let identity = manager("st-1");

        let confirmed =
            confirm_deposit(&db, &identity, &serde_json::json!({ "depositId": id })).unwrap();
        assert_eq!(confirmed["status"], "confirmed");

        let reconciled =
            reconcile_deposit(&db, &identity, &serde_json::json!({ "depositId": id })).unwrap();
        assert_eq!(reconciled["status"], "reconciled");
        assert!(reconciled["reconciliationDate"].as_str().is_some());

        // reconciliation_date persisted with the terminal status
        let conn = db.conn.lock().unwrap();
        let (status, recon_date): (String, Option<String>) = conn
            .query_row(
                "SELECT status, reconciliation_date FROM bank_deposits WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(status, "reconciled");
        assert!(recon_date.is_some());
    }

    #[test]
    fn test_status_never_regresses() {
        let db = test_db();
        seed_station(&db);
        let id = seed_deposit(&db, 5000.0);
        let identity = manager("st-1");

        reconcile_deposit(&db, &identity, &serde_json::json!({ "depositId": id })).unwrap();

        let err =
            confirm_deposit(&db, &identity, &serde_json::json!({ "depositId": id })).unwrap_err();
        assert_eq!(err.kind(), "invalid_transition");
        assert!(err.to_string().contains("reconciled"));

        // Status untouched by the failed transition
        let conn = db.conn.lock().unwrap();
        let status: String = conn
            .query_row(
                "SELECT status FROM bank_deposits WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(status, "reconciled");
    }

    #[test]
    fn test_cas_on_expected_status() {
        let db = test_db();
        seed_station(&db);
        let id = seed_deposit(&db, 2000.0);
        let identity = manager("st-1");

        // Another actor confirms first
        confirm_deposit(&db, &identity, &serde_json::json!({ "depositId": id })).unwrap();

        // A caller that still believes the deposit is pending loses the race
        let err = reconcile_deposit(
            &db,
            &identity,
            &serde_json::json!({ "depositId": id, "expectedStatus": "pending" }),
        )
        .unwrap_err();
        assert_eq!(err.kind(), "invalid_transition");

        // Retrying with the real status works
        reconcile_deposit(
            &db,
            &identity,
            &serde_json::json!({ "depositId": id, "expectedStatus": "confirmed" }),
        )
        .unwrap();
    }

    #[test]
    fn test_edit_locked_after_pending_except_admin() {
        let db = test_db();
        seed_station(&db);
        let id = seed_deposit(&db, 3000.0);
        let identity = manager("st-1");

        confirm_deposit(&db, &identity, &serde_json::json!({ "depositId": id })).unwrap();

        let err = update_deposit(
            &db,
            &identity,
            &serde_json::json!({ "depositId": id, "notes": "late edit" }),
        )
        .unwrap_err();
        assert_eq!(err.kind(), "validation");

        // Admin may edit at any status
        let admin = Identity::new(Role::Admin);
        update_deposit(
            &db,
            &admin,
            &serde_json::json!({ "depositId": id, "notes": "head-office correction" }),
        )
        .unwrap();
    }

    #[test]
    fn test_delete_is_soft() {
        let db = test_db();
        seed_station(&db);
        let id = seed_deposit(&db, 1500.0);
        let identity = manager("st-1");

        delete_deposit(&db, &identity, &serde_json::json!({ "depositId": id })).unwrap();

        // Gone from the active ledger
        let listed = list_deposits(&db, &identity, &serde_json::json!({})).unwrap();
        assert_eq!(listed["deposits"].as_array().unwrap().len(), 0);

        // Row survives for audit
        let conn = db.conn.lock().unwrap();
        let deleted_at: Option<String> = conn
            .query_row(
                "SELECT deleted_at FROM bank_deposits WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .unwrap();
        assert!(deleted_at.is_some());
    }

    #[test]
    fn test_out_of_scope_deposit_invisible() {
        let db = test_db();
        seed_station(&db);
        let id = seed_deposit(&db, 1000.0);

        let err = confirm_deposit(
            &db,
            &manager("st-2"),
            &serde_json::json!({ "depositId": id }),
        )
        .unwrap_err();
        // Scoped fetch fails as not-found — existence is not leaked
        assert_eq!(err.kind(), "not_found");
    }

    #[test]
    fn test_readonly_roles_cannot_transition() {
        let db = test_db();
        seed_station(&db);
        let id = seed_deposit(&db, 1000.0);

        let omc = Identity {
            role: Role::Omc,
            station_id: None,
            dealer_id: None,
            omc_id: Some("omc-1".into()),
        };
        let err =
            confirm_deposit(&db, &omc, &serde_json::json!({ "depositId": id })).unwrap_err();
        assert_eq!(err.kind(), "forbidden");
    }

    #[test]
    fn test_deposit_context_tracks_undeposited_cash() {
        let db = test_db();
        seed_station(&db);
        let identity = manager("st-1");

        // Seed cash sales directly: 800 collected
        {
            let conn = db.conn.lock().unwrap();
            conn.execute_batch(
                "INSERT INTO products (id, name, fuel_type) VALUES ('prod-pet', 'Petrol 95', 'petrol');
                 INSERT INTO pumps (id, station_id, pump_number, fuel_type, current_meter_reading)
                    VALUES ('pump-1', 'st-1', 1, 'petrol', 0);
                 INSERT INTO sales (id, station_id, pump_id, pump_number, product_id,
                        opening_meter, closing_meter, unit_price, litres_sold, total_amount,
                        cash_received, variance, payment_method, status, transaction_time)
                    VALUES ('sale-1', 'st-1', 'pump-1', 1, 'prod-pet',
                            0, 50, 10.0, 50, 500.0, 500.0, 0, 'cash', 'completed', '2025-03-01T08:00:00Z'),
                           ('sale-2', 'st-1', 'pump-1', 1, 'prod-pet',
                            50, 80, 10.0, 30, 300.0, 300.0, 0, 'cash', 'completed', '2025-03-01T09:00:00Z'),
                           ('sale-3', 'st-1', 'pump-1', 1, 'prod-pet',
                            80, 90, 10.0, 10, 100.0, 100.0, 0, 'card', 'completed', '2025-03-01T10:00:00Z');",
            )
            .unwrap();
        }

        seed_deposit(&db, 600.0);

        let ctx = deposit_context(&db, &identity, &serde_json::json!({})).unwrap();
        assert_eq!(ctx["cashCollected"], 800.0); // card sale excluded
        assert_eq!(ctx["depositedTotal"], 600.0);
        assert_eq!(ctx["undepositedCash"], 200.0);
    }
}
