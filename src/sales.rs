//! Sale recording for Forecourt Console.
//!
//! Turns pump meter readings into persisted financial transactions. The
//! pure arithmetic lives in [`crate::meter`]; this module owns price
//! resolution, scope checks, and the one atomic unit in the system:
//! inserting the sale and advancing the pump's `current_meter_reading`
//! together, so a stale reading is never used as the next opening value.
//!
//! **Rules:**
//! - A pump's fuel type must resolve to exactly one product; otherwise the
//!   price cannot be resolved and the operation is rejected
//! - A manual unit price overrides the resolved station price but never the
//!   computed volume
//! - Sales are soft-deleted via `status = 'cancelled'`, never removed;
//!   voiding additionally sets `is_void` and is irreversible
//! - Editing a past sale re-derives litres/total/variance but does not
//!   rewind the pump counter — the pump is mutated exactly once per sale

use chrono::Utc;
use rusqlite::{params, params_from_iter, Connection};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::DbState;
use crate::meter;
use crate::scope::{self, Identity};
use crate::PosError;

const PAYMENT_METHODS: &[&str] = &["cash", "mobile_money", "card", "credit"];
const CUSTOMER_TYPES: &[&str] = &["retail", "commercial", "fleet"];
const EDITABLE_STATUSES: &[&str] = &["completed", "pending", "refunded", "cancelled"];

// ---------------------------------------------------------------------------
// Price + product resolution
// ---------------------------------------------------------------------------

/// Resolve the single product matching a pump's fuel type.
fn resolve_product_for_pump(conn: &Connection, fuel_type: &str) -> Result<String, PosError> {
    let mut stmt = conn.prepare("SELECT id FROM products WHERE fuel_type = ?1 ORDER BY id")?;
    let ids: Vec<String> = stmt
        .query_map(params![fuel_type], |row| row.get(0))?
        .filter_map(|r| r.ok())
        .collect();

    match ids.len() {
        0 => Err(PosError::not_found(format!(
            "No product matches fuel type '{fuel_type}'"
        ))),
        1 => Ok(ids.into_iter().next().unwrap_or_default()),
        _ => Err(PosError::validation(format!(
            "Fuel type '{fuel_type}' matches more than one product"
        ))),
    }
}

/// Look up the station+product unit price. `None` blocks sale computation.
pub fn resolve_station_price(
    conn: &Connection,
    station_id: &str,
    product_id: &str,
) -> Result<Option<f64>, PosError> {
    let price = conn
        .query_row(
            "SELECT unit_price FROM station_prices WHERE station_id = ?1 AND product_id = ?2",
            params![station_id, product_id],
            |row| row.get(0),
        )
        .ok();
    Ok(price)
}

/// Resolve the pump row (station binding, number, fuel type, meter).
fn fetch_pump(
    conn: &Connection,
    pump_id: &str,
) -> Result<(String, i64, String, f64), PosError> {
    conn.query_row(
        "SELECT station_id, pump_number, fuel_type, current_meter_reading
         FROM pumps WHERE id = ?1",
        params![pump_id],
        |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, f64>(3)?,
            ))
        },
    )
    .map_err(|_| PosError::not_found(format!("Pump not found: {pump_id}")))
}

// ---------------------------------------------------------------------------
// Preview (pure recompute path)
// ---------------------------------------------------------------------------

/// Recompute a sale preview without writing anything.
///
/// The UI calls this on every input change (opening, closing, product,
/// manual price); same resolution rules as [`create_sale`], no side effects.
pub fn compute_preview(
    db: &DbState,
    identity: &Identity,
    payload: &Value,
) -> Result<Value, PosError> {
    let conn = db.conn.lock()?;

    let pump_id = str_field(payload, "pumpId")
        .or_else(|| str_field(payload, "pump_id"))
        .ok_or_else(|| PosError::validation("Missing pumpId"))?;

    let (station_id, pump_number, fuel_type, pump_meter) = fetch_pump(&conn, &pump_id)?;
    scope::authorize_station(&conn, identity, &station_id)?;

    let product_id = match str_field(payload, "productId").or_else(|| str_field(payload, "product_id"))
    {
        Some(id) => id,
        None => resolve_product_for_pump(&conn, &fuel_type)?,
    };

    let opening = num_field(payload, "openingMeter")
        .or_else(|| num_field(payload, "opening_meter"))
        .unwrap_or(pump_meter);
    let closing = num_field(payload, "closingMeter")
        .or_else(|| num_field(payload, "closing_meter"))
        .ok_or_else(|| PosError::validation("Missing closingMeter"))?;

    // Manual price overrides the resolved one but not the volume.
    let unit_price = match num_field(payload, "unitPrice").or_else(|| num_field(payload, "unit_price"))
    {
        Some(p) => p,
        None => resolve_station_price(&conn, &station_id, &product_id)?.ok_or_else(|| {
            PosError::not_found(format!(
                "No unit price configured for product {product_id} at this station"
            ))
        })?,
    };

    let cash = num_field(payload, "cashReceived").or_else(|| num_field(payload, "cash_received"));
    let computation = meter::compute_sale(opening, closing, unit_price, cash)?;

    Ok(serde_json::json!({
        "success": true,
        "stationId": station_id,
        "pumpId": pump_id,
        "pumpNumber": pump_number,
        "productId": product_id,
        "openingMeter": opening,
        "closingMeter": closing,
        "unitPrice": unit_price,
        "computation": computation,
    }))
}

// ---------------------------------------------------------------------------
// Create sale
// ---------------------------------------------------------------------------

/// Record a sale and advance the pump meter as one atomic unit.
///
/// The pump's `current_meter_reading` is the authoritative opening value;
/// an explicit `openingMeter` in the payload overrides it (back-captured
/// tickets) but the closing reading always becomes the new pump meter.
pub fn create_sale(db: &DbState, identity: &Identity, payload: &Value) -> Result<Value, PosError> {
    if !scope::can_record_sales(identity.role) {
        return Err(PosError::Forbidden);
    }

    let conn = db.conn.lock()?;

    let pump_id = str_field(payload, "pumpId")
        .or_else(|| str_field(payload, "pump_id"))
        .ok_or_else(|| PosError::validation("Missing pumpId"))?;

    let (station_id, pump_number, fuel_type, pump_meter) = fetch_pump(&conn, &pump_id)?;
    scope::authorize_station(&conn, identity, &station_id)?;

    let product_id = match str_field(payload, "productId").or_else(|| str_field(payload, "product_id"))
    {
        Some(id) => {
            let known: bool = conn
                .query_row("SELECT 1 FROM products WHERE id = ?1", params![id], |_| Ok(true))
                .unwrap_or(false);
            if !known {
                return Err(PosError::not_found(format!("Product not found: {id}")));
            }
            id
        }
        None => resolve_product_for_pump(&conn, &fuel_type)?,
    };

    let opening = num_field(payload, "openingMeter")
        .or_else(|| num_field(payload, "opening_meter"))
        .unwrap_or(pump_meter);
    let closing = num_field(payload, "closingMeter")
        .or_else(|| num_field(payload, "closing_meter"))
        .ok_or_else(|| PosError::validation("Missing closingMeter"))?;

    let unit_price = match num_field(payload, "unitPrice").or_else(|| num_field(payload, "unit_price"))
    {
        Some(p) => p,
        None => resolve_station_price(&conn, &station_id, &product_id)?.ok_or_else(|| {
            PosError::not_found(format!(
                "No unit price configured for product {product_id} at this station"
            ))
        })?,
    };

    let payment_method = str_field(payload, "paymentMethod")
        .or_else(|| str_field(payload, "payment_method"))
        .unwrap_or_else(|| "cash".to_string());
    if !PAYMENT_METHODS.contains(&payment_method.as_str()) {
        return Err(PosError::validation(format!(
            "Unknown payment method: {payment_method}"
        )));
    }
    let customer_type = str_field(payload, "customerType")
        .or_else(|| str_field(payload, "customer_type"))
        .unwrap_or_else(|| "retail".to_string());
    if !CUSTOMER_TYPES.contains(&customer_type.as_str()) {
        return Err(PosError::validation(format!(
            "Unknown customer type: {customer_type}"
        )));
    }

    let cash = num_field(payload, "cashReceived").or_else(|| num_field(payload, "cash_received"));
    let computation = meter::compute_sale(opening, closing, unit_price, cash)?;

    let sale_id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();
    let transaction_time = str_field(payload, "transactionTime")
        .or_else(|| str_field(payload, "transaction_time"))
        .unwrap_or_else(|| now.clone());
    let created_by = str_field(payload, "createdBy").or_else(|| str_field(payload, "created_by"));
    let notes = str_field(payload, "notes");

    // Sale insert + pump meter advance are one logical unit.
    conn.execute_batch("BEGIN IMMEDIATE")?;

    let result = (|| -> Result<(), PosError> {
        conn.execute(
            "INSERT INTO sales (
                id, station_id, pump_id, pump_number, product_id,
                opening_meter, closing_meter, unit_price,
                litres_sold, total_amount, cash_received, variance,
                payment_method, customer_type, status, transaction_time,
                created_by, is_void, notes, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12,
                      ?13, ?14, 'completed', ?15, ?16, 0, ?17, ?18, ?18)",
            params![
                sale_id,
                station_id,
                pump_id,
                pump_number,
                product_id,
                opening,
                closing,
                unit_price,
                computation.litres_sold,
                computation.total_amount,
                computation.cash_received,
                computation.variance,
                payment_method,
                customer_type,
                transaction_time,
                created_by,
                notes,
                now,
            ],
        )?;

        let rows = conn.execute(
            "UPDATE pumps SET current_meter_reading = ?1, updated_at = ?2 WHERE id = ?3",
            params![closing, now, pump_id],
        )?;
        if rows != 1 {
            return Err(PosError::not_found(format!("Pump not found: {pump_id}")));
        }

        Ok(())
    })();

    match result {
        Ok(()) => {
            conn.execute_batch("COMMIT")?;
        }
        Err(e) => {
            if let Err(rollback_err) = conn.execute_batch("ROLLBACK") {
                // The sale row may have landed without the meter advance.
                warn!(
                    sale_id = %sale_id,
                    pump_id = %pump_id,
                    error = %rollback_err,
                    "Rollback failed after partial sale write"
                );
                return Err(PosError::InconsistentWrite(format!(
                    "sale {sale_id} may be recorded without advancing pump {pump_id}: {rollback_err}"
                )));
            }
            return Err(e);
        }
    }

    info!(
        sale_id = %sale_id,
        station_id = %station_id,
        pump_id = %pump_id,
        litres = %computation.litres_sold,
        total = %computation.total_amount,
        "Sale recorded"
    );

    Ok(serde_json::json!({
        "success": true,
        "saleId": sale_id,
        "sale": {
            "id": sale_id,
            "stationId": station_id,
            "pumpId": pump_id,
            "pumpNumber": pump_number,
            "productId": product_id,
            "openingMeter": opening,
            "closingMeter": closing,
            "unitPrice": unit_price,
            "litresSold": computation.litres_sold,
            "totalAmount": computation.total_amount,
            "cashReceived": computation.cash_received,
            "variance": computation.variance,
            "paymentMethod": payment_method,
            "customerType": customer_type,
            "status": "completed",
            "transactionTime": transaction_time,
        },
        "message": format!("Sale recorded for pump {pump_number}"),
    }))
}

// ---------------------------------------------------------------------------
// Update sale
// ---------------------------------------------------------------------------

/// Edit a sale's meters, price, payment fields, status, or notes.
///
/// Any change to opening, closing, or product re-runs the computation; a
/// manual `unitPrice` overrides the previously stored price. Cancelled
/// sales are immutable. The pump counter is never touched here.
pub fn update_sale(db: &DbState, identity: &Identity, payload: &Value) -> Result<Value, PosError> {
    if !scope::can_edit_records(identity.role) {
        return Err(PosError::Forbidden);
    }

    let conn = db.conn.lock()?;

    let sale_id = str_field(payload, "saleId")
        .or_else(|| str_field(payload, "sale_id"))
        .or_else(|| str_field(payload, "id"))
        .ok_or_else(|| PosError::validation("Missing saleId"))?;

    let scope_filter = scope::scope_filter(identity)?;
    let (clause, scope_params) = scope_filter.sql("station_id");
    let sql = format!(
        "SELECT station_id, product_id, opening_meter, closing_meter, unit_price,
                cash_received, payment_method, customer_type, status, notes
         FROM sales WHERE id = ? AND {clause}"
    );
    let mut bind: Vec<String> = vec![sale_id.clone()];
    bind.extend(scope_params);

    let current = conn
        .query_row(&sql, params_from_iter(bind.iter()), |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, f64>(2)?,
                row.get::<_, f64>(3)?,
                row.get::<_, f64>(4)?,
                row.get::<_, f64>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, String>(7)?,
                row.get::<_, String>(8)?,
                row.get::<_, Option<String>>(9)?,
            ))
        })
        .map_err(|_| PosError::not_found(format!("Sale not found: {sale_id}")))?;

    let (
        _station_id,
        cur_product,
        cur_opening,
        cur_closing,
        cur_price,
        cur_cash,
        cur_method,
        cur_customer,
        cur_status,
        cur_notes,
    ) = current;

    if cur_status == "cancelled" {
        return Err(PosError::validation("Cancelled sales cannot be edited"));
    }

    let opening = num_field(payload, "openingMeter")
        .or_else(|| num_field(payload, "opening_meter"))
        .unwrap_or(cur_opening);
    let closing = num_field(payload, "closingMeter")
        .or_else(|| num_field(payload, "closing_meter"))
        .unwrap_or(cur_closing);
    let product_id = str_field(payload, "productId")
        .or_else(|| str_field(payload, "product_id"))
        .unwrap_or(cur_product);
    let unit_price = num_field(payload, "unitPrice")
        .or_else(|| num_field(payload, "unit_price"))
        .unwrap_or(cur_price);
    // An explicit cash override re-derives variance; otherwise the stored
    // cash amount is kept and variance follows the new total.
    let cash = num_field(payload, "cashReceived")
        .or_else(|| num_field(payload, "cash_received"))
        .unwrap_or(cur_cash);

    let payment_method = str_field(payload, "paymentMethod")
        .or_else(|| str_field(payload, "payment_method"))
        .unwrap_or(cur_method);
    if !PAYMENT_METHODS.contains(&payment_method.as_str()) {
        return Err(PosError::validation(format!(
            "Unknown payment method: {payment_method}"
        )));
    }
    let customer_type = str_field(payload, "customerType")
        .or_else(|| str_field(payload, "customer_type"))
        .unwrap_or(cur_customer);
    if !CUSTOMER_TYPES.contains(&customer_type.as_str()) {
        return Err(PosError::validation(format!(
            "Unknown customer type: {customer_type}"
        )));
    }
    let status = str_field(payload, "status").unwrap_or(cur_status);
    if !EDITABLE_STATUSES.contains(&status.as_str()) {
        return Err(PosError::validation(format!("Unknown status: {status}")));
    }
    let notes = str_field(payload, "notes").or(cur_notes);

    let computation = meter::compute_sale(opening, closing, unit_price, Some(cash))?;
    let now = Utc::now().to_rfc3339();

    conn.execute(
        "UPDATE sales SET
            product_id = ?1, opening_meter = ?2, closing_meter = ?3,
            unit_price = ?4, litres_sold = ?5, total_amount = ?6,
            cash_received = ?7, variance = ?8, payment_method = ?9,
            customer_type = ?10, status = ?11, notes = ?12, updated_at = ?13
         WHERE id = ?14",
        params![
            product_id,
            opening,
            closing,
            unit_price,
            computation.litres_sold,
            computation.total_amount,
            computation.cash_received,
            computation.variance,
            payment_method,
            customer_type,
            status,
            notes,
            now,
            sale_id,
        ],
    )?;

    info!(sale_id = %sale_id, status = %status, "Sale updated");

    Ok(serde_json::json!({
        "success": true,
        "saleId": sale_id,
        "litresSold": computation.litres_sold,
        "totalAmount": computation.total_amount,
        "variance": computation.variance,
        "status": status,
    }))
}

// ---------------------------------------------------------------------------
// Void sale
// ---------------------------------------------------------------------------

/// Void a sale: sets `is_void` and forces `status = 'cancelled'`.
/// Irreversible; the row stays for audit and is excluded from all totals.
pub fn void_sale(db: &DbState, identity: &Identity, payload: &Value) -> Result<Value, PosError> {
    if !scope::can_edit_records(identity.role) {
        return Err(PosError::Forbidden);
    }

    let conn = db.conn.lock()?;

    let sale_id = str_field(payload, "saleId")
        .or_else(|| str_field(payload, "sale_id"))
        .or_else(|| str_field(payload, "id"))
        .ok_or_else(|| PosError::validation("Missing saleId"))?;
    let reason = str_field(payload, "reason");

    let scope_filter = scope::scope_filter(identity)?;
    let (clause, scope_params) = scope_filter.sql("station_id");
    let sql = format!("SELECT is_void FROM sales WHERE id = ? AND {clause}");
    let mut bind: Vec<String> = vec![sale_id.clone()];
    bind.extend(scope_params);

    let is_void: i64 = conn
        .query_row(&sql, params_from_iter(bind.iter()), |row| row.get(0))
        .map_err(|_| PosError::not_found(format!("Sale not found: {sale_id}")))?;

    if is_void != 0 {
        return Err(PosError::validation("Sale is already voided"));
    }

    let now = Utc::now().to_rfc3339();
    conn.execute(
        "UPDATE sales SET is_void = 1, status = 'cancelled',
            notes = COALESCE(?1, notes), updated_at = ?2
         WHERE id = ?3",
        params![reason, now, sale_id],
    )?;

    info!(sale_id = %sale_id, "Sale voided");

    Ok(serde_json::json!({
        "success": true,
        "saleId": sale_id,
        "status": "cancelled",
        "isVoid": true,
    }))
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// List sales visible to the identity, newest first.
///
/// An explicit `stationId` filter outside the caller's scope is `Forbidden`
/// — not an empty list.
pub fn list_sales(db: &DbState, identity: &Identity, payload: &Value) -> Result<Value, PosError> {
    let conn = db.conn.lock()?;

    let scope_filter = scope::scope_filter(identity)?;
    let (clause, scope_params) = scope_filter.sql("station_id");

    let mut conditions = vec![clause];
    let mut bind: Vec<String> = scope_params;

    if let Some(station_id) = str_field(payload, "stationId").or_else(|| str_field(payload, "station_id"))
    {
        scope::authorize_station(&conn, identity, &station_id)?;
        conditions.push("station_id = ?".to_string());
        bind.push(station_id);
    }
    if let Some(from) = str_field(payload, "fromDate").or_else(|| str_field(payload, "from_date")) {
        conditions.push("substr(transaction_time, 1, 10) >= ?".to_string());
        bind.push(from);
    }
    if let Some(to) = str_field(payload, "toDate").or_else(|| str_field(payload, "to_date")) {
        conditions.push("substr(transaction_time, 1, 10) <= ?".to_string());
        bind.push(to);
    }
    if let Some(status) = str_field(payload, "status") {
        conditions.push("status = ?".to_string());
        bind.push(status);
    }

    let sql = format!(
        "SELECT id, station_id, pump_id, pump_number, product_id,
                opening_meter, closing_meter, unit_price, litres_sold,
                total_amount, cash_received, variance, payment_method,
                customer_type, status, transaction_time, created_by,
                is_void, notes
         FROM sales WHERE {} ORDER BY transaction_time DESC",
        conditions.join(" AND ")
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(bind.iter()), sale_row_to_json)?;

    let mut sales = Vec::new();
    for row in rows {
        match row {
            Ok(v) => sales.push(v),
            Err(e) => warn!("skipping malformed sale row: {e}"),
        }
    }

    Ok(serde_json::json!({ "success": true, "sales": sales }))
}

/// Fetch one sale by id within the caller's scope.
pub fn get_sale(db: &DbState, identity: &Identity, sale_id: &str) -> Result<Value, PosError> {
    let conn = db.conn.lock()?;

    let scope_filter = scope::scope_filter(identity)?;
    let (clause, scope_params) = scope_filter.sql("station_id");
    let sql = format!(
        "SELECT id, station_id, pump_id, pump_number, product_id,
                opening_meter, closing_meter, unit_price, litres_sold,
                total_amount, cash_received, variance, payment_method,
                customer_type, status, transaction_time, created_by,
                is_void, notes
         FROM sales WHERE id = ? AND {clause}"
    );
    let mut bind: Vec<String> = vec![sale_id.to_string()];
    bind.extend(scope_params);

    let sale = conn
        .query_row(&sql, params_from_iter(bind.iter()), sale_row_to_json)
        .map_err(|_| PosError::not_found(format!("Sale not found: {sale_id}")))?;

    Ok(serde_json::json!({ "success": true, "sale": sale }))
}

fn sale_row_to_json(row: &rusqlite::Row<'_>) -> rusqlite::Result<Value> {
    Ok(serde_json::json!({
        "id": row.get::<_, String>(0)?,
        "stationId": row.get::<_, String>(1)?,
        "pumpId": row.get::<_, String>(2)?,
        "pumpNumber": row.get::<_, i64>(3)?,
        "productId": row.get::<_, String>(4)?,
        "openingMeter": row.get::<_, f64>(5)?,
        "closingMeter": row.get::<_, f64>(6)?,
        "unitPrice": row.get::<_, f64>(7)?,
        "litresSold": row.get::<_, f64>(8)?,
        "totalAmount": row.get::<_, f64>(9)?,
        "cashReceived": row.get::<_, f64>(10)?,
        "variance": row.get::<_, f64>(11)?,
        "paymentMethod": row.get::<_, String>(12)?,
        "customerType": row.get::<_, String>(13)?,
        "status": row.get::<_, String>(14)?,
        "transactionTime": row.get::<_, String>(15)?,
        "createdBy": row.get::<_, Option<String>>(16)?,
        "isVoid": row.get::<_, i64>(17)? != 0,
        "notes": row.get::<_, Option<String>>(18)?,
    }))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

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

    /// Seed two stations, products, prices, and pumps.
    fn seed_network(db: &DbState) {
        let conn = db.conn.lock().unwrap();
        conn.execute_batch(
            "INSERT INTO omcs (id, name) VALUES ('omc-1', 'PetroMax');
             INSERT INTO dealers (id, name) VALUES ('dlr-1', 'Mensah Fuels');
             INSERT INTO stations (id, name, dealer_id, omc_id)
                VALUES ('st-1', 'Airport Rd', 'dlr-1', 'omc-1'),
                       ('st-2', 'Harbour View', 'dlr-1', 'omc-1');
             INSERT INTO products (id, name, fuel_type)
                VALUES ('prod-pet', 'Petrol 95', 'petrol'),
                       ('prod-die', 'Diesel', 'diesel');
             INSERT INTO station_prices (station_id, product_id, unit_price)
                VALUES ('st-1', 'prod-pet', 14.50),
                       ('st-1', 'prod-die', 13.25),
                       ('st-2', 'prod-pet', 14.75);
             INSERT INTO pumps (id, station_id, pump_number, fuel_type, current_meter_reading)
                VALUES ('pump-1', 'st-1', 1, 'petrol', 1000.0),
                       ('pump-2', 'st-1', 2, 'diesel', 5000.0),
                       ('pump-3', 'st-2', 1, 'petrol', 200.0);",
        )
        .expect("seed network");
    }

    fn manager(station: &str) -> Identity {
        Identity::for_station(Role::StationManager, station)
    }

    #[test]
    fn test_create_sale_from_pump_meter() {
        let db = test_db();
        seed_network(&db);

        let payload = serde_json::json!({
            "pumpId": "pump-1",
            "closingMeter": 1250.5,
        });
        let result = create_sale(&db, &manager("st-1"), &payload).unwrap();
        assert_eq!(result["success"], true);
        assert_eq!(result["sale"]["openingMeter"], 1000.0);
        assert_eq!(result["sale"]["litresSold"], 250.5);
        assert_eq!(result["sale"]["totalAmount"], 3632.25);
        assert_eq!(result["sale"]["cashReceived"], 3632.25);
        assert_eq!(result["sale"]["variance"], 0.0);
        assert_eq!(result["sale"]["productId"], "prod-pet");

        // Pump meter advanced to closing
        let conn = db.conn.lock().unwrap();
        let meter: f64 = conn
            .query_row(
                "SELECT current_meter_reading FROM pumps WHERE id = 'pump-1'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(meter, 1250.5);
    }

    #[test]
    fn test_next_sale_opens_at_previous_closing() {
        let db = test_db();
        seed_network(&db);
        let identity = manager("st-1");

        create_sale(&db, &identity, &serde_json::json!({ "pumpId": "pump-1", "closingMeter": 1100.0 }))
            .unwrap();
        let second = create_sale(
            &db,
            &identity,
            &serde_json::json!({ "pumpId": "pump-1", "closingMeter": 1180.0 }),
        )
        .unwrap();
        assert_eq!(second["sale"]["openingMeter"], 1100.0);
        assert_eq!(second["sale"]["litresSold"], 80.0);
    }

    #[test]
    fn test_closing_below_opening_writes_nothing() {
        let db = test_db();
        seed_network(&db);

        let err = create_sale(
            &db,
            &manager("st-1"),
            &serde_json::json!({ "pumpId": "pump-1", "closingMeter": 900.0 }),
        )
        .unwrap_err();
        assert_eq!(err.kind(), "validation");

        let conn = db.conn.lock().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM sales", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
        let meter: f64 = conn
            .query_row(
                "SELECT current_meter_reading FROM pumps WHERE id = 'pump-1'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(meter, 1000.0, "pump meter must be untouched");
    }

    #[test]
    fn test_missing_price_blocks_sale() {
        let db = test_db();
        seed_network(&db);
        // st-2 has no diesel price; give it a diesel pump
        {
            let conn = db.conn.lock().unwrap();
            conn.execute(
                "INSERT INTO pumps (id, station_id, pump_number, fuel_type, current_meter_reading)
                 VALUES ('pump-4', 'st-2', 2, 'diesel', 0.0)",
                [],
            )
            .unwrap();
        }

        let err = create_sale(
            &db,
            &manager("st-2"),
            &serde_json::json!({ "pumpId": "pump-4", "closingMeter": 50.0 }),
        )
        .unwrap_err();
        assert_eq!(err.kind(), "not_found");
        assert!(err.to_string().contains("No unit price"));
    }

    #[test]
    fn test_ambiguous_fuel_type_rejected() {
        let db = test_db();
        seed_network(&db);
        {
            let conn = db.conn.lock().unwrap();
            conn.execute(
                "INSERT INTO products (id, name, fuel_type) VALUES ('prod-pet2', 'Petrol 98', 'petrol')",
                [],
            )
            .unwrap();
        }

        let err = create_sale(
            &db,
            &manager("st-1"),
            &serde_json::json!({ "pumpId": "pump-1", "closingMeter": 1100.0 }),
        )
        .unwrap_err();
        assert_eq!(err.kind(), "validation");
        assert!(err.to_string().contains("more than one product"));
    }

    #[test]
    fn test_manual_price_overrides_resolved() {
        let db = test_db();
        seed_network(&db);

        let result = create_sale(
            &db,
            &manager("st-1"),
            &serde_json::json!({ "pumpId": "pump-1", "closingMeter": 1100.0, "unitPrice": 10.0 }),
        )
        .unwrap();
        assert_eq!(result["sale"]["unitPrice"], 10.0);
        assert_eq!(result["sale"]["totalAmount"], 1000.0);
    }

    #[test]
    fn test_cash_override_records_shortage() {
        let db = test_db();
        seed_network(&db);

        let result = create_sale(
            &db,
            &manager("st-1"),
            &serde_json::json!({
                "pumpId": "pump-1",
                "closingMeter": 1250.5,
                "cashReceived": 3600.0,
            }),
        )
        .unwrap();
        assert_eq!(result["sale"]["variance"], -32.25);
    }

    #[test]
    fn test_out_of_scope_station_forbidden() {
        let db = test_db();
        seed_network(&db);

        // Manager of st-2 submitting against a st-1 pump
        let err = create_sale(
            &db,
            &manager("st-2"),
            &serde_json::json!({ "pumpId": "pump-1", "closingMeter": 1100.0 }),
        )
        .unwrap_err();
        assert_eq!(err.kind(), "forbidden");
    }

    #[test]
    fn test_list_filtered_to_out_of_scope_station_forbidden() {
        let db = test_db();
        seed_network(&db);

        let err = list_sales(
            &db,
            &manager("st-1"),
            &serde_json::json!({ "stationId": "st-2" }),
        )
        .unwrap_err();
        assert_eq!(err.kind(), "forbidden");
    }

    #[test]
    fn test_attendant_creates_but_cannot_void() {
        let db = test_db();
        seed_network(&db);
        let attendant = Identity::for_station(Role::Attendant, "st-1");

        let result = create_sale(
            &db,
            &attendant,
            &serde_json::json!({ "pumpId": "pump-1", "closingMeter": 1050.0 }),
        )
        .unwrap();
        let sale_id = result["saleId"].as_str().unwrap().to_string();

        let err = void_sale(&db, &attendant, &serde_json::json!({ "saleId": sale_id }))
            .unwrap_err();
        assert_eq!(err.kind(), "forbidden");
    }

    #[test]
    fn test_void_is_irreversible_and_forces_cancelled() {
        let db = test_db();
        seed_network(&db);
        let identity = manager("st-1");

        let created = create_sale(
            &db,
            &identity,
            &serde_json::json!({ "pumpId": "pump-1", "closingMeter": 1050.0 }),
        )
        .unwrap();
        let sale_id = created["saleId"].as_str().unwrap().to_string();

        let voided = void_sale(&db, &identity, &serde_json::json!({ "saleId": sale_id }))
            .unwrap();
        assert_eq!(voided["status"], "cancelled");

        // Second void rejected
        let err = void_sale(&db, &identity, &serde_json::json!({ "saleId": sale_id }))
            .unwrap_err();
        assert_eq!(err.kind(), "validation");

        // Cancelled sale is immutable
        let err = update_sale(
            &db,
            &identity,
            &serde_json::json!({ "saleId": sale_id, "closingMeter": 1060.0 }),
        )
        .unwrap_err();
        assert!(err.to_string().contains("Cancelled"));
    }

    #[test]
    fn test_update_recomputes_derived_fields() {
        let db = test_db();
        seed_network(&db);
        let identity = manager("st-1");

        let created = create_sale(
            &db,
            &identity,
            &serde_json::json!({ "pumpId": "pump-1", "closingMeter": 1100.0 }),
        )
        .unwrap();
        let sale_id = created["saleId"].as_str().unwrap().to_string();

        // Correct the closing meter: litres and total must re-derive
        let updated = update_sale(
            &db,
            &identity,
            &serde_json::json!({ "saleId": sale_id, "closingMeter": 1120.0, "cashReceived": 1740.0 }),
        )
        .unwrap();
        assert_eq!(updated["litresSold"], 120.0);
        assert_eq!(updated["totalAmount"], 1740.0);
        assert_eq!(updated["variance"], 0.0);

        // Pump meter stays where the original sale left it
        let conn = db.conn.lock().unwrap();
        let meter: f64 = conn
            .query_row(
                "SELECT current_meter_reading FROM pumps WHERE id = 'pump-1'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(meter, 1100.0);
    }

    #[test]
    fn test_get_sale_not_leaked_across_scopes() {
        let db = test_db();
        seed_network(&db);

        let created = create_sale(
            &db,
            &manager("st-1"),
            &serde_json::json!({ "pumpId": "pump-1", "closingMeter": 1100.0 }),
        )
        .unwrap();
        let sale_id = created["saleId"].as_str().unwrap().to_string();

        // Visible within scope
        assert!(get_sale(&db, &manager("st-1"), &sale_id).is_ok());
        // From the other station the record simply does not exist
        let err = get_sale(&db, &manager("st-2"), &sale_id).unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[test]
    fn test_preview_has_no_side_effects() {
        let db = test_db();
        seed_network(&db);

        let preview = compute_preview(
            &db,
            &manager("st-1"),
            &serde_json::json!({ "pumpId": "pump-1", "closingMeter": 1250.5 }),
        )
        .unwrap();
        assert_eq!(preview["computation"]["litresSold"], 250.5);
        assert_eq!(preview["computation"]["totalAmount"], 3632.25);

        let conn = db.conn.lock().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM sales", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
        let meter: f64 = conn
            .query_row(
                "SELECT current_meter_reading FROM pumps WHERE id = 'pump-1'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(meter, 1000.0);
    }
}
