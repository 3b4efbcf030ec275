//! Network topology registry: OMCs, dealers, stations, products, pumps,
//! and station prices.
//!
//! Plain CRUD feeding the reconciliation core — the ownership edges written
//! here are what [`crate::scope`] derives visibility from, and
//! `station_prices` is the price-resolution table behind every sale
//! computation. Topology changes are admin-only; station managers may set
//! their own station's prices.

use chrono::Utc;
use rusqlite::params;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::DbState;
use crate::scope::{self, Identity, Role};
use crate::PosError;

// ---------------------------------------------------------------------------
// Topology writes (admin only)
// ---------------------------------------------------------------------------

fn require_admin(identity: &Identity) -> Result<(), PosError> {
    if identity.role != Role::Admin {
        return Err(PosError::Forbidden);
    }
    Ok(())
}

/// Register an OMC, dealer, or station. `kind` selects the table.
pub fn register_party(
    db: &DbState,
    identity: &Identity,
    kind: &str,
    payload: &Value,
) -> Result<Value, PosError> {
    require_admin(identity)?;

    let conn = db.conn.lock()?;
    let name = str_field(payload, "name").ok_or_else(|| PosError::validation("Missing name"))?;
    let id = str_field(payload, "id").unwrap_or_else(|| Uuid::new_v4().to_string());

    match kind {
        "omc" => {
            conn.execute(
                "INSERT INTO omcs (id, name) VALUES (?1, ?2)",
                params![id, name],
            )?;
        }
        "dealer" => {
            conn.execute(
                "INSERT INTO dealers (id, name) VALUES (?1, ?2)",
                params![id, name],
            )?;
        }
        "station" => {
            let dealer_id =
                str_field(payload, "dealerId").or_else(|| str_field(payload, "dealer_id"));
            let omc_id = str_field(payload, "omcId").or_else(|| str_field(payload, "omc_id"));
            conn.execute(
                "INSERT INTO stations (id, name, dealer_id, omc_id) VALUES (?1, ?2, ?3, ?4)",
                params![id, name, dealer_id, omc_id],
            )?;
        }
        other => {
            return Err(PosError::validation(format!(
                "Unknown party kind: {other}"
            )));
        }
    }

    info!(kind = %kind, id = %id, name = %name, "Party registered");
    Ok(serde_json::json!({ "success": true, "id": id, "kind": kind }))
}

/// Register a fuel product.
pub fn register_product(
    db: &DbState,
    identity: &Identity,
    payload: &Value,
) -> Result<Value, PosError> {
    require_admin(identity)?;

    let conn = db.conn.lock()?;
    let name = str_field(payload, "name").ok_or_else(|| PosError::validation("Missing name"))?;
    let fuel_type = str_field(payload, "fuelType")
        .or_else(|| str_field(payload, "fuel_type"))
        .ok_or_else(|| PosError::validation("Missing fuelType"))?;
    let unit = str_field(payload, "unit").unwrap_or_else(|| "litre".to_string());
    let id = str_field(payload, "id").unwrap_or_else(|| Uuid::new_v4().to_string());

    conn.execute(
        "INSERT INTO products (id, name, fuel_type, unit) VALUES (?1, ?2, ?3, ?4)",
        params![id, name, fuel_type, unit],
    )?;

    info!(product_id = %id, fuel_type = %fuel_type, "Product registered");
    Ok(serde_json::json!({ "success": true, "productId": id }))
}

/// Register a pump at a station. The initial meter reading becomes the
/// opening value for its first sale.
pub fn register_pump(
    db: &DbState,
    identity: &Identity,
    payload: &Value,
) -> Result<Value, PosError> {
    require_admin(identity)?;

    let conn = db.conn.lock()?;
    let station_id = str_field(payload, "stationId")
        .or_else(|| str_field(payload, "station_id"))
        .ok_or_else(|| PosError::validation("Missing stationId"))?;
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

    let pump_number = payload
        .get("pumpNumber")
        .or_else(|| payload.get("pump_number"))
        .and_then(Value::as_i64)
        .ok_or_else(|| PosError::validation("Missing pumpNumber"))?;
    let fuel_type = str_field(payload, "fuelType")
        .or_else(|| str_field(payload, "fuel_type"))
        .ok_or_else(|| PosError::validation("Missing fuelType"))?;
    let initial_meter = payload
        .get("initialMeterReading")
        .or_else(|| payload.get("initial_meter_reading"))
        .and_then(Value::as_f64)
        .unwrap_or(0.0);
    if initial_meter < 0.0 {
        return Err(PosError::validation("Meter readings cannot be negative"));
    }
    let id = str_field(payload, "id").unwrap_or_else(|| Uuid::new_v4().to_string());
    let now = Utc::now().to_rfc3339();

    conn.execute(
        "INSERT INTO pumps (id, station_id, pump_number, fuel_type,
                            current_meter_reading, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
        params![id, station_id, pump_number, fuel_type, initial_meter, now],
    )?;

    info!(pump_id = %id, station_id = %station_id, pump_number = %pump_number, "Pump registered");
    Ok(serde_json::json!({ "success": true, "pumpId": id }))
}

/// Set (upsert) the unit price for a product at a station.
///
/// Admin anywhere; a station manager only for their own station.
pub fn set_station_price(
    db: &DbState,
    identity: &Identity,
    payload: &Value,
) -> Result<Value, PosError> {
    if !scope::can_edit_records(identity.role) {
        return Err(PosError::Forbidden);
    }

    let conn = db.conn.lock()?;
    let station_id = str_field(payload, "stationId")
        .or_else(|| str_field(payload, "station_id"))
        .or_else(|| identity.station_id.clone())
        .ok_or_else(|| PosError::validation("Missing stationId"))?;
    scope::authorize_station(&conn, identity, &station_id)?;

    let product_id = str_field(payload, "productId")
        .or_else(|| str_field(payload, "product_id"))
        .ok_or_else(|| PosError::validation("Missing productId"))?;
    let unit_price = payload
        .get("unitPrice")
        .or_else(|| payload.get("unit_price"))
        .and_then(Value::as_f64)
        .ok_or_else(|| PosError::validation("Missing unitPrice"))?;
    if !unit_price.is_finite() || unit_price <= 0.0 {
        return Err(PosError::validation("Unit price must be greater than zero"));
    }

    conn.execute(
        "INSERT INTO station_prices (station_id, product_id, unit_price, updated_at)
         VALUES (?1, ?2, ?3, datetime('now'))
         ON CONFLICT(station_id, product_id) DO UPDATE SET
            unit_price = excluded.unit_price,
            updated_at = excluded.updated_at",
        params![station_id, product_id, unit_price],
    )?;

    info!(
        station_id = %station_id,
        product_id = %product_id,
        unit_price = %unit_price,
        "Station price set"
    );
    Ok(serde_json::json!({
        "success": true,
        "stationId": station_id,
        "productId": product_id,
        "unitPrice": unit_price,
    }))
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// List pumps for a station in the caller's scope (drives the sale form).
pub fn list_pumps(db: &DbState, identity: &Identity, payload: &Value) -> Result<Value, PosError> {
    let conn = db.conn.lock()?;

    let station_id = str_field(payload, "stationId")
        .or_else(|| str_field(payload, "station_id"))
        .or_else(|| identity.station_id.clone())
        .ok_or_else(|| PosError::validation("Missing stationId"))?;
    scope::authorize_station(&conn, identity, &station_id)?;

    let mut stmt = conn.prepare(
        "SELECT id, pump_number, fuel_type, current_meter_reading
         FROM pumps WHERE station_id = ?1 ORDER BY pump_number ASC",
    )?;
    let rows = stmt.query_map(params![station_id], |row| {
        Ok(serde_json::json!({
            "id": row.get::<_, String>(0)?,
            "pumpNumber": row.get::<_, i64>(1)?,
            "fuelType": row.get::<_, String>(2)?,
            "currentMeterReading": row.get::<_, f64>(3)?,
        }))
    })?;

    let mut pumps = Vec::new();
    for row in rows {
        match row {
            Ok(v) => pumps.push(v),
            Err(e) => warn!("skipping malformed pump row: {e}"),
        }
    }

    Ok(serde_json::json!({ "success": true, "stationId": station_id, "pumps": pumps }))
}

/// List all fuel products.
pub fn list_products(db: &DbState) -> Result<Value, PosError> {
    let conn = db.conn.lock()?;

    let mut stmt =
        conn.prepare("SELECT id, name, fuel_type, unit FROM products ORDER BY name ASC")?;
    let rows = stmt.query_map([], |row| {
        Ok(serde_json::json!({
            "id": row.get::<_, String>(0)?,
            "name": row.get::<_, String>(1)?,
            "fuelType": row.get::<_, String>(2)?,
            "unit": row.get::<_, String>(3)?,
        }))
    })?;

    let products: Vec<Value> = rows.filter_map(|r| r.ok()).collect();
    Ok(serde_json::json!({ "success": true, "products": products }))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn str_field(v: &Value, key: &str) -> Option<String> {
    v.get(key).and_then(Value::as_str).map(String::from)
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
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

    fn admin() -> Identity {
        Identity::new(Role::Admin)
    }

    #[test]
    fn test_register_topology_and_price() {
        let db = test_db();
        let identity = admin();

        register_party(&db, &identity, "omc", &serde_json::json!({ "id": "omc-1", "name": "PetroMax" }))
            .unwrap();
        register_party(
            &db,
            &identity,
            "station",
            &serde_json::json!({ "id": "st-1", "name": "Airport Rd", "omcId": "omc-1" }),
        )
        .unwrap();
        register_product(
            &db,
            &identity,
            &serde_json::json!({ "id": "prod-pet", "name": "Petrol 95", "fuelType": "petrol" }),
        )
        .unwrap();
        register_pump(
            &db,
            &identity,
            &serde_json::json!({
                "stationId": "st-1", "pumpNumber": 1,
                "fuelType": "petrol", "initialMeterReading": 1000.0,
            }),
        )
        .unwrap();
        set_station_price(
            &db,
            &identity,
            &serde_json::json!({ "stationId": "st-1", "productId": "prod-pet", "unitPrice": 14.5 }),
        )
        .unwrap();

        let conn = db.conn.lock().unwrap();
        let price: f64 = conn
            .query_row(
                "SELECT unit_price FROM station_prices WHERE station_id = 'st-1' AND product_id = 'prod-pet'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(price, 14.5);
    }

    #[test]
    fn test_topology_writes_are_admin_only() {
        let db = test_db();
        let manager = Identity::for_station(Role::StationManager, "st-1");

        let err = register_party(&db, &manager, "omc", &serde_json::json!({ "name": "X" }))
            .unwrap_err();
        assert_eq!(err.kind(), "forbidden");
        let err = register_pump(
            &db,
            &manager,
            &serde_json::json!({ "stationId": "st-1", "pumpNumber": 1, "fuelType": "petrol" }),
        )
        .unwrap_err();
        assert_eq!(err.kind(), "forbidden");
    }

    #[test]
    fn test_manager_sets_price_for_own_station_only() {
        let db = test_db();
        let identity = admin();
        register_party(&db, &identity, "station", &serde_json::json!({ "id": "st-1", "name": "A" }))
            .unwrap();
        register_party(&db, &identity, "station", &serde_json::json!({ "id": "st-2", "name": "B" }))
            .unwrap();
        register_product(
            &db,
            &identity,
            &serde_json::json!({ "id": "prod-pet", "name": "Petrol 95", "fuelType": "petrol" }),
        )
        .unwrap();

        let manager = Identity::for_station(Role::StationManager, "st-1");
        set_station_price(
            &db,
            &manager,
            &serde_json::json!({ "productId": "prod-pet", "unitPrice": 14.9 }),
        )
        .unwrap();

        let err = set_station_price(
            &db,
            &manager,
            &serde_json::json!({ "stationId": "st-2", "productId": "prod-pet", "unitPrice": 14.9 }),
        )
        .unwrap_err();
        assert_eq!(err.kind(), "forbidden");
    }

    #[test]
    fn test_price_upsert_overwrites() {
        let db = test_db();
        let identity = admin();
        register_party(&db, &identity, "station", &serde_json::json!({ "id": "st-1", "name": "A" }))
            .unwrap();
        register_product(
            &db,
            &identity,
            &serde_json::json!({ "id": "prod-pet", "name": "Petrol 95", "fuelType": "petrol" }),
        )
        .unwrap();

        for price in [14.5, 15.0] {
            set_station_price(
                &db,
                &identity,
                &serde_json::json!({ "stationId": "st-1", "productId": "prod-pet", "unitPrice": price }),
            )
            .unwrap();
        }

        let conn = db.conn.lock().unwrap();
        let (price, count): (f64, i64) = conn
            .query_row(
                "SELECT unit_price, (SELECT COUNT(*) FROM station_prices) FROM station_prices",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(price, 15.0);
        assert_eq!(count, 1);
    }

    #[test]
    fn test_list_pumps_scoped() {
        let db = test_db();
        let identity = admin();
        register_party(&db, &identity, "station", &serde_json::json!({ "id": "st-1", "name": "A" }))
            .unwrap();
        register_pump(
            &db,
            &identity,
            &serde_json::json!({ "stationId": "st-1", "pumpNumber": 2, "fuelType": "diesel" }),
        )
        .unwrap();
        register_pump(
            &db,
            &identity,
            &serde_json::json!({ "stationId": "st-1", "pumpNumber": 1, "fuelType": "petrol" }),
        )
        .unwrap();

        let listed = list_pumps(
            &db,
            &Identity::for_station(Role::Attendant, "st-1"),
            &serde_json::json!({}),
        )
        .unwrap();
        let pumps = listed["pumps"].as_array().unwrap();
        assert_eq!(pumps.len(), 2);
        assert_eq!(pumps[0]["pumpNumber"], 1);

        let err = list_pumps(
            &db,
            &Identity::for_station(Role::Attendant, "st-2"),
            &serde_json::json!({ "stationId": "st-1" }),
        )
        .unwrap_err();
        assert_eq!(err.kind(), "forbidden");
    }
}
